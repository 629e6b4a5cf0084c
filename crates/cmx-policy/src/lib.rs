//! cmx-policy
//!
//! Access decisions for the commission desk.
//!
//! Precedence:
//! 1. Staff passes every ownership check.
//! 2. Only Staff may close a conversation, transition an order or list users.
//! 3. A Customer may act only on targets it owns. Conversations resolve
//!    ownership through their parent order.
//!
//! Pure deterministic logic. No IO. Existence of the target is the caller's
//! job and must be established before calling [`decide`], so a missing
//! entity surfaces as not-found even for an actor who would be denied.

mod engine;
mod types;

pub use engine::{decide, list_scope};
pub use types::*;
