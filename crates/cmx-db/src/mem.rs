//! In-process [`Store`] backed by one mutex.
//!
//! Each call takes the lock once, so every conditional update is atomic with
//! respect to every other call, the same as a single Postgres statement.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tokio::sync::Mutex;
use uuid::Uuid;

use cmx_schemas::{
    Conversation, CreatedOrder, Message, NewMessage, NewOrder, NewUser, Order, OrderStatus,
    OrderSummary, Page, User,
};

use crate::{
    AppendOutcome, CloseOutcome, CloseRequest, OrderFilter, StatusUpdate, Store, StoreError,
    StoreResult,
};

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    /// Insertion order doubles as `created_at` order.
    orders: Vec<Order>,
    conversations: HashMap<Uuid, Conversation>,
    conversation_by_order: HashMap<Uuid, Uuid>,
    messages: HashMap<Uuid, Vec<Message>>,
}

impl Tables {
    fn order_mut(&mut self, id: Uuid) -> Option<&mut Order> {
        self.orders.iter_mut().find(|o| o.id == id)
    }

    fn conversation_for_order(&self, order_id: Uuid) -> Option<&Conversation> {
        self.conversation_by_order
            .get(&order_id)
            .and_then(|cid| self.conversations.get(cid))
    }
}

#[derive(Default)]
pub struct MemStore {
    tables: Mutex<Tables>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemStore {
    async fn create_user(&self, new: &NewUser) -> StoreResult<User> {
        let mut t = self.tables.lock().await;
        if t.users.iter().any(|u| u.email == new.email) {
            return Err(StoreError::Conflict {
                constraint: "uq_users_email".to_string(),
            });
        }
        let user = User {
            id: Uuid::new_v4(),
            email: new.email.clone(),
            role: new.role,
            created_at: Utc::now(),
        };
        t.users.push(user.clone());
        Ok(user)
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        Ok(self.tables.lock().await.users.clone())
    }

    async fn create_order(&self, owner_id: Uuid, new: &NewOrder) -> StoreResult<CreatedOrder> {
        let now = Utc::now();
        let order = Order {
            id: Uuid::new_v4(),
            owner_id,
            status: OrderStatus::Review,
            description: new.description.clone(),
            specifications: new.specifications.clone(),
            quantity: new.quantity,
            metadata: new.metadata.clone().unwrap_or_else(|| json!({})),
            created_at: now,
            updated_at: now,
        };
        let conversation = Conversation {
            id: Uuid::new_v4(),
            order_id: order.id,
            is_open: true,
            summary: String::new(),
            closed_at: None,
            created_at: now,
        };

        let mut t = self.tables.lock().await;
        t.orders.push(order.clone());
        t.conversation_by_order.insert(order.id, conversation.id);
        t.conversations.insert(conversation.id, conversation.clone());
        t.messages.insert(conversation.id, Vec::new());

        Ok(CreatedOrder {
            order,
            conversation,
        })
    }

    async fn find_order(&self, id: Uuid) -> StoreResult<Option<Order>> {
        let t = self.tables.lock().await;
        Ok(t.orders.iter().find(|o| o.id == id).cloned())
    }

    async fn list_orders(
        &self,
        filter: OrderFilter,
        page: Page,
    ) -> StoreResult<(Vec<OrderSummary>, u64)> {
        let t = self.tables.lock().await;
        let matching: Vec<&Order> = t
            .orders
            .iter()
            .rev()
            .filter(|o| filter.owner_id.map_or(true, |owner| o.owner_id == owner))
            .collect();
        let total = matching.len() as u64;

        let rows = matching
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit as usize)
            .filter_map(|o| {
                t.conversation_for_order(o.id).map(|c| OrderSummary {
                    order: o.clone(),
                    conversation: c.clone(),
                })
            })
            .collect();

        Ok((rows, total))
    }

    async fn update_order_status(
        &self,
        id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
        require_closed_conversation: bool,
    ) -> StoreResult<StatusUpdate> {
        let mut t = self.tables.lock().await;

        let conversation_open = t.conversation_for_order(id).map_or(false, |c| c.is_open);
        let Some(order) = t.order_mut(id) else {
            return Ok(StatusUpdate::Missing);
        };
        if order.status != from {
            return Ok(StatusUpdate::StaleStatus(order.status));
        }
        if require_closed_conversation && conversation_open {
            return Ok(StatusUpdate::ConversationOpen);
        }

        order.status = to;
        order.updated_at = Utc::now();
        Ok(StatusUpdate::Updated(order.clone()))
    }

    async fn find_conversation(&self, id: Uuid) -> StoreResult<Option<Conversation>> {
        Ok(self.tables.lock().await.conversations.get(&id).cloned())
    }

    async fn find_conversation_by_order(
        &self,
        order_id: Uuid,
    ) -> StoreResult<Option<Conversation>> {
        let t = self.tables.lock().await;
        Ok(t.conversation_for_order(order_id).cloned())
    }

    async fn list_messages(&self, conversation_id: Uuid) -> StoreResult<Vec<Message>> {
        let t = self.tables.lock().await;
        Ok(t.messages.get(&conversation_id).cloned().unwrap_or_default())
    }

    async fn append_message(&self, new: &NewMessage) -> StoreResult<AppendOutcome> {
        let mut t = self.tables.lock().await;
        match t.conversations.get(&new.conversation_id) {
            None => return Ok(AppendOutcome::Missing),
            Some(c) if !c.is_open => return Ok(AppendOutcome::Closed),
            Some(_) => {}
        }

        let message = Message {
            id: Uuid::new_v4(),
            conversation_id: new.conversation_id,
            author_id: new.author_id,
            content: new.content.clone(),
            created_at: Utc::now(),
        };
        t.messages
            .entry(new.conversation_id)
            .or_default()
            .push(message.clone());
        Ok(AppendOutcome::Appended(message))
    }

    async fn close_conversation(&self, req: &CloseRequest) -> StoreResult<CloseOutcome> {
        let mut t = self.tables.lock().await;

        let order_id = match t.conversations.get(&req.conversation_id) {
            None => return Ok(CloseOutcome::Missing),
            Some(c) if !c.is_open => return Ok(CloseOutcome::AlreadyClosed),
            Some(c) => c.order_id,
        };

        let Some(order) = t.order_mut(order_id) else {
            return Err(StoreError::Backend(anyhow::anyhow!(
                "conversation {} references missing order {}",
                req.conversation_id,
                order_id
            )));
        };
        if order.status == req.order_from {
            order.status = req.order_to;
            order.updated_at = req.closed_at;
        }
        let order = order.clone();

        let conversation = t
            .conversations
            .get_mut(&req.conversation_id)
            .ok_or_else(|| anyhow::anyhow!("conversation vanished under lock"))?;
        conversation.is_open = false;
        conversation.summary = req.summary.clone();
        conversation.closed_at = Some(req.closed_at);

        Ok(CloseOutcome::Closed {
            conversation: conversation.clone(),
            order,
        })
    }
}
