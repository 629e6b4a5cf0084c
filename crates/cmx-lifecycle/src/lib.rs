//! cmx-lifecycle
//!
//! The order and conversation state machines and the operations that drive
//! them through a [`Store`].
//!
//! ```text
//!   Order:         REVIEW ──► PROCESSING ──► COMPLETED (term.)
//!                    ▲
//!                    │ close() advances the order (same write)
//!   Conversation:  Open ──► Closed (term.)
//! ```
//!
//! Coupling runs one way: `conversation` asks `order` for the post-review
//! status when it closes. `order` reads the conversation's `is_open` flag
//! for its PROCESSING guard and never calls back into `conversation`.
//!
//! Every entry point consults [`cmx_policy::decide`]; there are no inline
//! role checks here.

use std::sync::Arc;

use cmx_db::Store;
use cmx_policy::{Action, Target};
use cmx_schemas::Actor;

pub mod conversation;
mod error;
pub mod order;
mod users;

pub use conversation::{
    ClosedConversation, ConversationEvent, ConversationState, ConversationTransitionError,
};
pub use error::DeskError;
pub use order::OrderTransitionError;

/// Entry point for every lifecycle operation. Cheap to clone.
#[derive(Clone)]
pub struct Desk {
    store: Arc<dyn Store>,
}

impl Desk {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

/// Run the access policy and turn a denial into `Forbidden`.
pub(crate) fn authorize(actor: &Actor, action: Action, target: &Target) -> Result<(), DeskError> {
    let decision = cmx_policy::decide(actor, action, target);
    match decision.denial_message() {
        None => Ok(()),
        Some(msg) => {
            tracing::debug!(
                actor_id = %actor.id,
                role = %actor.role,
                action = action.as_str(),
                reason = ?decision.reason,
                "access denied"
            );
            Err(DeskError::Forbidden(msg.to_string()))
        }
    }
}
