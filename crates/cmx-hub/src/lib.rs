//! cmx-hub
//!
//! Realtime fan-out for conversation rooms.
//!
//! - [`RealtimeHub`]: connection registry, per-room membership, broadcast.
//!   Policy-free; callers authorize a join before calling [`RealtimeHub::join`].
//! - [`ConnectionGate`]: verifies the handshake bearer token before a
//!   connection is registered.
//! - [`ClientFrame`] / [`ServerFrame`]: the JSON wire protocol.

mod frames;
mod gate;
mod hub;

pub use frames::{ClientFrame, ServerFrame};
pub use gate::{ConnectionGate, GateRejection};
pub use hub::{ConnectionId, DeliveryReport, HubClosed, RealtimeHub, DEFAULT_OUTBOUND_BUFFER};
