//! Conversation lifecycle.
//!
//! Open (initial) ──close──► Closed (terminal). Messages are accepted only
//! while open. Closing is staff-only, happens once, and advances the owning
//! order to its post-review status in the same store write.
//!
//! A conversation is opened only by [`Desk::create_order`]; it never exists
//! without its order.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use cmx_db::{AppendOutcome, CloseOutcome, CloseRequest};
use cmx_policy::{Action, Target};
use cmx_schemas::{Actor, Conversation, ConversationDetail, Message, NewMessage, Order, OrderStatus};

use crate::{authorize, order, Desk, DeskError};

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationState {
    Open,
    /// **Terminal.**
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationEvent {
    Post,
    Close,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTransitionError {
    pub from: ConversationState,
    pub event: ConversationEvent,
}

impl std::fmt::Display for ConversationTransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.from, self.event) {
            (ConversationState::Closed, ConversationEvent::Post) => {
                f.write_str("Conversation is closed")
            }
            (ConversationState::Closed, ConversationEvent::Close) => {
                f.write_str("Conversation is already closed")
            }
            (from, event) => write!(f, "illegal conversation transition: {from:?} + {event:?}"),
        }
    }
}

impl std::error::Error for ConversationTransitionError {}

impl ConversationState {
    pub fn of(c: &Conversation) -> Self {
        if c.is_open {
            ConversationState::Open
        } else {
            ConversationState::Closed
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ConversationState::Closed)
    }

    /// Resulting state, or an error if `event` is illegal here.
    pub fn apply(self, event: ConversationEvent) -> Result<Self, ConversationTransitionError> {
        match (self, event) {
            (ConversationState::Open, ConversationEvent::Post) => Ok(ConversationState::Open),
            (ConversationState::Open, ConversationEvent::Close) => Ok(ConversationState::Closed),
            (from, event) => Err(ConversationTransitionError { from, event }),
        }
    }
}

impl From<ConversationTransitionError> for DeskError {
    fn from(e: ConversationTransitionError) -> Self {
        DeskError::Forbidden(e.to_string())
    }
}

/// Result of a successful close: the conversation and the order it moved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedConversation {
    pub conversation: Conversation,
    pub order: Order,
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

impl Desk {
    /// Look up a conversation and the owner of its parent order.
    async fn conversation_with_owner(
        &self,
        conversation_id: Uuid,
    ) -> Result<(Conversation, Uuid), DeskError> {
        let conversation = self
            .store
            .find_conversation(conversation_id)
            .await?
            .ok_or_else(|| DeskError::not_found("Conversation"))?;
        let order = self
            .store
            .find_order(conversation.order_id)
            .await?
            .ok_or_else(|| DeskError::not_found("Order"))?;
        Ok((conversation, order.owner_id))
    }

    pub async fn read_conversation(
        &self,
        actor: &Actor,
        conversation_id: Uuid,
    ) -> Result<ConversationDetail, DeskError> {
        let (conversation, owner) = self.conversation_with_owner(conversation_id).await?;
        authorize(
            actor,
            Action::ReadConversation,
            &Target::Conversation {
                order_owner_id: owner,
            },
        )?;

        let messages = self.store.list_messages(conversation.id).await?;
        Ok(ConversationDetail {
            conversation,
            messages,
        })
    }

    /// Gate for subscribing a realtime connection to a conversation room.
    pub async fn authorize_join(
        &self,
        actor: &Actor,
        conversation_id: Uuid,
    ) -> Result<Conversation, DeskError> {
        let (conversation, owner) = self.conversation_with_owner(conversation_id).await?;
        authorize(
            actor,
            Action::JoinRoom,
            &Target::Conversation {
                order_owner_id: owner,
            },
        )?;
        Ok(conversation)
    }

    /// Append a message. Refused once the conversation is closed.
    pub async fn post_message(
        &self,
        actor: &Actor,
        conversation_id: Uuid,
        content: &str,
    ) -> Result<Message, DeskError> {
        let (conversation, owner) = self.conversation_with_owner(conversation_id).await?;
        authorize(
            actor,
            Action::PostMessage,
            &Target::Conversation {
                order_owner_id: owner,
            },
        )?;
        ConversationState::of(&conversation).apply(ConversationEvent::Post)?;

        if content.trim().is_empty() {
            return Err(DeskError::BadRequest("message content must not be empty".to_string()));
        }

        // The store re-checks `is_open` under its own lock; that check is
        // authoritative against a concurrent close.
        let outcome = self
            .store
            .append_message(&NewMessage {
                conversation_id,
                author_id: actor.id,
                content: content.to_string(),
            })
            .await?;

        match outcome {
            AppendOutcome::Appended(message) => Ok(message),
            AppendOutcome::Missing => Err(DeskError::not_found("Conversation")),
            AppendOutcome::Closed => Err(ConversationTransitionError {
                from: ConversationState::Closed,
                event: ConversationEvent::Post,
            }
            .into()),
        }
    }

    /// Close a conversation and advance its order. Staff only, once.
    pub async fn close_conversation(
        &self,
        actor: &Actor,
        conversation_id: Uuid,
        summary: &str,
    ) -> Result<ClosedConversation, DeskError> {
        // Role gate precedes the lookup for staff-only actions.
        authorize(actor, Action::CloseConversation, &Target::Collection)?;

        let summary = summary.trim();
        if summary.is_empty() {
            return Err(DeskError::BadRequest("summary must not be empty".to_string()));
        }

        let (conversation, owner) = self.conversation_with_owner(conversation_id).await?;
        authorize(
            actor,
            Action::CloseConversation,
            &Target::Conversation {
                order_owner_id: owner,
            },
        )?;
        ConversationState::of(&conversation).apply(ConversationEvent::Close)?;

        let req = CloseRequest {
            conversation_id,
            summary: summary.to_string(),
            closed_at: Utc::now(),
            order_from: OrderStatus::Review,
            order_to: order::post_review_status(),
        };

        match self.store.close_conversation(&req).await? {
            CloseOutcome::Closed {
                conversation,
                order,
            } => {
                if order.status != req.order_to {
                    // Only possible if the order left REVIEW without a close.
                    warn!(
                        order_id = %order.id,
                        status = %order.status,
                        "conversation closed but order was not in REVIEW"
                    );
                }
                info!(
                    conversation_id = %conversation.id,
                    order_id = %order.id,
                    order_status = %order.status,
                    actor_id = %actor.id,
                    "conversation closed"
                );
                Ok(ClosedConversation {
                    conversation,
                    order,
                })
            }
            CloseOutcome::Missing => Err(DeskError::not_found("Conversation")),
            CloseOutcome::AlreadyClosed => Err(ConversationTransitionError {
                from: ConversationState::Closed,
                event: ConversationEvent::Close,
            }
            .into()),
        }
    }
}
