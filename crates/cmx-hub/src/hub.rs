//! Connection registry and room membership.
//!
//! One `tokio::sync::Mutex` guards both maps. Sends are `try_send` on a
//! bounded per-connection queue and happen after the lock is released.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use cmx_auth::IdentityContext;
use cmx_schemas::{Conversation, Message};

use crate::ServerFrame;

pub const DEFAULT_OUTBOUND_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ConnectionId(u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Outcome of one broadcast. Observability only; failures are not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Registration refused because the hub has shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubClosed;

impl std::fmt::Display for HubClosed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("realtime hub is shut down")
    }
}

impl std::error::Error for HubClosed {}

struct Connection {
    identity: IdentityContext,
    tx: mpsc::Sender<ServerFrame>,
    rooms: HashSet<Uuid>,
}

#[derive(Default)]
struct Registry {
    connections: HashMap<ConnectionId, Connection>,
    rooms: HashMap<Uuid, HashSet<ConnectionId>>,
    closed: bool,
}

impl Registry {
    fn remove_from_room(&mut self, room_id: Uuid, id: ConnectionId) {
        if let Some(members) = self.rooms.get_mut(&room_id) {
            members.remove(&id);
            if members.is_empty() {
                self.rooms.remove(&room_id);
            }
        }
    }
}

/// Cheap to clone; clones share one registry.
#[derive(Clone)]
pub struct RealtimeHub {
    registry: Arc<Mutex<Registry>>,
    next_id: Arc<AtomicU64>,
    outbound_buffer: usize,
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new(DEFAULT_OUTBOUND_BUFFER)
    }
}

impl RealtimeHub {
    pub fn new(outbound_buffer: usize) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            next_id: Arc::new(AtomicU64::new(1)),
            outbound_buffer: outbound_buffer.max(1),
        }
    }

    /// Admit an authenticated connection. The receiver yields every frame
    /// addressed to it and ends once the connection is dropped or the hub
    /// shuts down.
    pub async fn register(
        &self,
        identity: IdentityContext,
    ) -> Result<(ConnectionId, mpsc::Receiver<ServerFrame>), HubClosed> {
        let (tx, rx) = mpsc::channel(self.outbound_buffer);
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));

        let mut reg = self.registry.lock().await;
        if reg.closed {
            return Err(HubClosed);
        }
        reg.connections.insert(
            id,
            Connection {
                identity,
                tx,
                rooms: HashSet::new(),
            },
        );
        debug!(connection = %id, user_id = %identity.user_id(), "connection registered");
        Ok((id, rx))
    }

    /// Add `id` to the room. Returns false for an unknown connection.
    pub async fn join(&self, id: ConnectionId, room_id: Uuid) -> bool {
        let mut reg = self.registry.lock().await;
        let Some(conn) = reg.connections.get_mut(&id) else {
            return false;
        };
        conn.rooms.insert(room_id);
        reg.rooms.entry(room_id).or_default().insert(id);
        debug!(connection = %id, %room_id, "joined room");
        true
    }

    /// Remove `id` from the room. No-op for non-members.
    pub async fn leave(&self, id: ConnectionId, room_id: Uuid) {
        let mut reg = self.registry.lock().await;
        if let Some(conn) = reg.connections.get_mut(&id) {
            conn.rooms.remove(&room_id);
        }
        reg.remove_from_room(room_id, id);
        debug!(connection = %id, %room_id, "left room");
    }

    /// Deliver `frame` to every current member of the room.
    pub async fn broadcast(&self, room_id: Uuid, frame: ServerFrame) -> DeliveryReport {
        let targets: Vec<(ConnectionId, mpsc::Sender<ServerFrame>)> = {
            let reg = self.registry.lock().await;
            match reg.rooms.get(&room_id) {
                None => Vec::new(),
                Some(members) => members
                    .iter()
                    .filter_map(|id| reg.connections.get(id).map(|c| (*id, c.tx.clone())))
                    .collect(),
            }
        };

        let mut report = DeliveryReport::default();
        for (id, tx) in targets {
            match tx.try_send(frame.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    let reason = match e {
                        mpsc::error::TrySendError::Full(_) => "queue_full",
                        mpsc::error::TrySendError::Closed(_) => "receiver_closed",
                    };
                    warn!(connection = %id, %room_id, reason, "realtime delivery dropped");
                }
            }
        }
        report
    }

    pub async fn broadcast_message(&self, message: &Message) -> DeliveryReport {
        self.broadcast(
            message.conversation_id,
            ServerFrame::Message {
                message: message.clone(),
            },
        )
        .await
    }

    pub async fn broadcast_closed(&self, conversation: &Conversation) -> DeliveryReport {
        self.broadcast(
            conversation.id,
            ServerFrame::ConversationClosed {
                conversation: conversation.clone(),
            },
        )
        .await
    }

    /// Drop the connection and every membership it holds. Idempotent;
    /// returns whether anything was removed.
    pub async fn on_disconnect(&self, id: ConnectionId) -> bool {
        let mut reg = self.registry.lock().await;
        let Some(conn) = reg.connections.remove(&id) else {
            return false;
        };
        for room_id in conn.rooms {
            reg.remove_from_room(room_id, id);
        }
        debug!(connection = %id, user_id = %conn.identity.user_id(), "connection removed");
        true
    }

    /// Send `Shutdown` to every connection, then drop all registrations.
    /// Later `register` calls fail with [`HubClosed`].
    pub async fn shutdown(&self) {
        let drained: Vec<(ConnectionId, Connection)> = {
            let mut reg = self.registry.lock().await;
            reg.closed = true;
            reg.rooms.clear();
            reg.connections.drain().collect()
        };

        let count = drained.len();
        for (id, conn) in drained {
            if conn.tx.try_send(ServerFrame::Shutdown).is_err() {
                warn!(connection = %id, "shutdown notice dropped");
            }
        }
        info!(connections = count, "realtime hub shut down");
    }

    pub async fn connection_count(&self) -> usize {
        self.registry.lock().await.connections.len()
    }

    /// Current members, sorted.
    pub async fn room_members(&self, room_id: Uuid) -> Vec<ConnectionId> {
        let reg = self.registry.lock().await;
        let mut members: Vec<ConnectionId> = reg
            .rooms
            .get(&room_id)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default();
        members.sort();
        members
    }
}
