//! cmx-schemas
//!
//! Shared record types for the commission desk: actors, orders, their
//! conversations and messages, plus the pagination contract.
//!
//! Plain data only. State machines live in `cmx-lifecycle`, access decisions
//! in `cmx-policy`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

mod pagination;

pub use pagination::{Page, Paginated, DEFAULT_LIMIT, DEFAULT_PAGE, MAX_LIMIT};

// ---------------------------------------------------------------------------
// Role / Actor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Customer,
    Staff,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "CUSTOMER",
            Role::Staff => "STAFF",
        }
    }

    /// Case-insensitive parse of the wire form.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CUSTOMER" => Some(Role::Customer),
            "STAFF" => Some(Role::Staff),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authenticated party behind a request or realtime connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self { id, role }
    }

    pub fn is_staff(&self) -> bool {
        self.role == Role::Staff
    }
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    /// Unique across all users.
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn actor(&self) -> Actor {
        Actor::new(self.id, self.role)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub role: Role,
}

// ---------------------------------------------------------------------------
// Order
// ---------------------------------------------------------------------------

/// Order status. Forward-only: REVIEW -> PROCESSING -> COMPLETED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Review,
    Processing,
    Completed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Review => "REVIEW",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Completed => "COMPLETED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "REVIEW" => Some(OrderStatus::Review),
            "PROCESSING" => Some(OrderStatus::Processing),
            "COMPLETED" => Some(OrderStatus::Completed),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub status: OrderStatus,
    pub description: String,
    /// Opaque customer-supplied map.
    pub specifications: Value,
    pub quantity: i32,
    /// Opaque map; `{}` when the customer sent none.
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Submission payload for a new order. The owner comes from the caller's
/// identity, never from the body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub description: String,
    pub specifications: Value,
    pub quantity: i32,
    #[serde(default)]
    pub metadata: Option<Value>,
}

// ---------------------------------------------------------------------------
// Conversation / Message
// ---------------------------------------------------------------------------

/// The single conversation attached to an order.
///
/// `is_open` flips true -> false at most once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub order_id: Uuid,
    pub is_open: bool,
    /// Empty until close.
    pub summary: String,
    pub closed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: Uuid,
    pub author_id: Uuid,
    pub content: String,
}

// ---------------------------------------------------------------------------
// Read models
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationDetail {
    pub conversation: Conversation,
    /// Ascending by `created_at`.
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDetail {
    pub order: Order,
    pub conversation: ConversationDetail,
}

/// List row: the order with its conversation header (no messages).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSummary {
    pub order: Order,
    pub conversation: Conversation,
}

/// Result of a successful order submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedOrder {
    pub order: Order,
    pub conversation: Conversation,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_and_status_wire_forms_round_trip() {
        assert_eq!(serde_json::to_value(Role::Staff).unwrap(), "STAFF");
        assert_eq!(Role::parse("customer"), Some(Role::Customer));
        assert_eq!(Role::parse("ADMIN"), None);

        assert_eq!(
            serde_json::to_value(OrderStatus::Processing).unwrap(),
            "PROCESSING"
        );
        assert_eq!(OrderStatus::parse(" completed "), Some(OrderStatus::Completed));
        assert_eq!(OrderStatus::parse("PENDING"), None);
    }

    #[test]
    fn new_order_metadata_is_optional() {
        let raw = r#"{"description":"mug","specifications":{"color":"red"},"quantity":2}"#;
        let n: NewOrder = serde_json::from_str(raw).unwrap();
        assert!(n.metadata.is_none());
        assert_eq!(n.quantity, 2);
    }
}
