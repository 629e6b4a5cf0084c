//! Order lifecycle.
//!
//! REVIEW (initial) ──► PROCESSING ──► COMPLETED (terminal). Forward-only,
//! one step at a time. PROCESSING is reachable only once the order's
//! conversation is closed.

use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use cmx_db::{OrderFilter, StatusUpdate};
use cmx_policy::{Action, OrderScope, Target};
use cmx_schemas::{
    Actor, ConversationDetail, CreatedOrder, NewOrder, Order, OrderDetail, OrderStatus,
    OrderSummary, Page, Paginated,
};

use crate::{authorize, Desk, DeskError};

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// The only legal next status, if any.
pub fn successor(status: OrderStatus) -> Option<OrderStatus> {
    match status {
        OrderStatus::Review => Some(OrderStatus::Processing),
        OrderStatus::Processing => Some(OrderStatus::Completed),
        OrderStatus::Completed => None,
    }
}

pub fn is_terminal(status: OrderStatus) -> bool {
    successor(status).is_none()
}

/// Status an order moves to when its conversation closes.
pub fn post_review_status() -> OrderStatus {
    OrderStatus::Processing
}

/// Rejected status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTransitionError {
    pub from: OrderStatus,
    pub to: OrderStatus,
}

impl std::fmt::Display for OrderTransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "illegal order transition: {} -> {}", self.from, self.to)
    }
}

impl std::error::Error for OrderTransitionError {}

/// Accept `from -> to` only when `to` is the immediate successor.
pub fn check_transition(from: OrderStatus, to: OrderStatus) -> Result<(), OrderTransitionError> {
    if successor(from) == Some(to) {
        Ok(())
    } else {
        Err(OrderTransitionError { from, to })
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

fn validate_new_order(new: &NewOrder) -> Result<(), DeskError> {
    if new.quantity < 1 {
        return Err(DeskError::BadRequest("quantity must be at least 1".to_string()));
    }
    if !new.specifications.is_object() {
        return Err(DeskError::BadRequest(
            "specifications must be an object".to_string(),
        ));
    }
    if let Some(meta) = &new.metadata {
        if !matches!(meta, Value::Object(_)) {
            return Err(DeskError::BadRequest("metadata must be an object".to_string()));
        }
    }
    Ok(())
}

impl Desk {
    /// Submit an order. Its conversation opens in the same store write.
    pub async fn create_order(
        &self,
        actor: &Actor,
        new: NewOrder,
    ) -> Result<CreatedOrder, DeskError> {
        authorize(actor, Action::CreateOrder, &Target::Collection)?;
        validate_new_order(&new)?;

        let created = self.store.create_order(actor.id, &new).await?;
        info!(
            order_id = %created.order.id,
            conversation_id = %created.conversation.id,
            owner_id = %actor.id,
            "order created; conversation opened"
        );
        Ok(created)
    }

    /// Order with its conversation and messages (ascending).
    pub async fn read_order(&self, actor: &Actor, order_id: Uuid) -> Result<OrderDetail, DeskError> {
        let order = self
            .store
            .find_order(order_id)
            .await?
            .ok_or_else(|| DeskError::not_found("Order"))?;
        authorize(
            actor,
            Action::ReadOrder,
            &Target::Order {
                owner_id: order.owner_id,
            },
        )?;

        let conversation = self
            .store
            .find_conversation_by_order(order.id)
            .await?
            .ok_or_else(|| DeskError::not_found("Conversation"))?;
        let messages = self.store.list_messages(conversation.id).await?;

        Ok(OrderDetail {
            order,
            conversation: ConversationDetail {
                conversation,
                messages,
            },
        })
    }

    /// Newest first. Customers see their own orders, staff see all.
    pub async fn list_orders(
        &self,
        actor: &Actor,
        page: Page,
    ) -> Result<Paginated<OrderSummary>, DeskError> {
        authorize(actor, Action::ListOrders, &Target::Collection)?;

        let filter = match cmx_policy::list_scope(actor) {
            OrderScope::All => OrderFilter { owner_id: None },
            OrderScope::OwnedBy(owner) => OrderFilter {
                owner_id: Some(owner),
            },
        };
        let (rows, total) = self.store.list_orders(filter, page).await?;
        Ok(Paginated::new(rows, total, page))
    }

    /// Move an order one step forward. Staff only.
    pub async fn transition_order(
        &self,
        actor: &Actor,
        order_id: Uuid,
        target: OrderStatus,
    ) -> Result<Order, DeskError> {
        // Role gate precedes the lookup for staff-only actions.
        authorize(actor, Action::TransitionOrder, &Target::Collection)?;

        let order = self
            .store
            .find_order(order_id)
            .await?
            .ok_or_else(|| DeskError::not_found("Order"))?;
        authorize(
            actor,
            Action::TransitionOrder,
            &Target::Order {
                owner_id: order.owner_id,
            },
        )?;

        let needs_closed_conversation = target == OrderStatus::Processing;
        if needs_closed_conversation {
            let open = self
                .store
                .find_conversation_by_order(order.id)
                .await?
                .map_or(false, |c| c.is_open);
            if open {
                return Err(conversation_open_error());
            }
        }

        check_transition(order.status, target).map_err(|e| DeskError::Forbidden(e.to_string()))?;

        match self
            .store
            .update_order_status(order.id, order.status, target, needs_closed_conversation)
            .await?
        {
            StatusUpdate::Updated(updated) => {
                info!(
                    order_id = %updated.id,
                    from = %order.status,
                    to = %updated.status,
                    actor_id = %actor.id,
                    "order transitioned"
                );
                Ok(updated)
            }
            StatusUpdate::Missing => Err(DeskError::not_found("Order")),
            StatusUpdate::ConversationOpen => Err(conversation_open_error()),
            StatusUpdate::StaleStatus(current) => Err(DeskError::Forbidden(
                OrderTransitionError {
                    from: current,
                    to: target,
                }
                .to_string(),
            )),
        }
    }
}

fn conversation_open_error() -> DeskError {
    DeskError::Forbidden("Cannot move to PROCESSING while the conversation is open".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_single_steps_only() {
        use OrderStatus::*;
        assert!(check_transition(Review, Processing).is_ok());
        assert!(check_transition(Processing, Completed).is_ok());

        for (from, to) in [
            (Review, Review),
            (Review, Completed),
            (Processing, Review),
            (Processing, Processing),
            (Completed, Processing),
            (Completed, Completed),
        ] {
            let err = check_transition(from, to).unwrap_err();
            assert_eq!(err, OrderTransitionError { from, to });
        }
    }

    #[test]
    fn completed_is_terminal() {
        assert!(is_terminal(OrderStatus::Completed));
        assert!(!is_terminal(OrderStatus::Review));
        assert_eq!(successor(OrderStatus::Review), Some(post_review_status()));
    }

    #[test]
    fn validation_rejects_zero_quantity_and_non_object_maps() {
        let mut n = NewOrder {
            description: "x".to_string(),
            specifications: serde_json::json!({}),
            quantity: 0,
            metadata: None,
        };
        assert!(matches!(validate_new_order(&n), Err(DeskError::BadRequest(_))));

        n.quantity = 1;
        n.specifications = serde_json::json!([1, 2]);
        assert!(matches!(validate_new_order(&n), Err(DeskError::BadRequest(_))));

        n.specifications = serde_json::json!({"k": "v"});
        n.metadata = Some(serde_json::json!("nope"));
        assert!(matches!(validate_new_order(&n), Err(DeskError::BadRequest(_))));

        n.metadata = None;
        assert!(validate_new_order(&n).is_ok());
    }
}
