//! Postgres [`Store`].
//!
//! Terminal transitions are single conditional statements (`... where
//! is_open`, `... where status = $from`), so two racing callers cannot both
//! succeed. Order+conversation creation and close+advance each run in one
//! transaction.

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

use cmx_schemas::{
    Conversation, CreatedOrder, Message, NewMessage, NewOrder, NewUser, Order, OrderStatus,
    OrderSummary, Page, Role, User,
};

use crate::{
    AppendOutcome, CloseOutcome, CloseRequest, OrderFilter, StatusUpdate, Store, StoreResult,
};

const ORDER_COLUMNS: &str = "id, owner_id, status, description, specifications, quantity, \
                             metadata, created_at, updated_at";
const CONVERSATION_COLUMNS: &str = "id, order_id, is_open, summary, closed_at, created_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn user_from_row(row: &PgRow) -> StoreResult<User> {
    let role: String = row.try_get("role")?;
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        role: Role::parse(&role).ok_or_else(|| anyhow!("invalid role in users row: {role}"))?,
        created_at: row.try_get("created_at")?,
    })
}

fn order_from_row(row: &PgRow) -> StoreResult<Order> {
    let status: String = row.try_get("status")?;
    Ok(Order {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        status: OrderStatus::parse(&status)
            .ok_or_else(|| anyhow!("invalid order status in orders row: {status}"))?,
        description: row.try_get("description")?,
        specifications: row.try_get("specifications")?,
        quantity: row.try_get("quantity")?,
        metadata: row.try_get("metadata")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn conversation_from_row(row: &PgRow) -> StoreResult<Conversation> {
    Ok(Conversation {
        id: row.try_get("id")?,
        order_id: row.try_get("order_id")?,
        is_open: row.try_get("is_open")?,
        summary: row.try_get("summary")?,
        closed_at: row.try_get("closed_at")?,
        created_at: row.try_get("created_at")?,
    })
}

fn message_from_row(row: &PgRow) -> StoreResult<Message> {
    Ok(Message {
        id: row.try_get("id")?,
        conversation_id: row.try_get("conversation_id")?,
        author_id: row.try_get("author_id")?,
        content: row.try_get("content")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl Store for PgStore {
    async fn create_user(&self, new: &NewUser) -> StoreResult<User> {
        let row = sqlx::query(
            r#"
            insert into users (id, email, role, created_at)
            values ($1, $2, $3, $4)
            returning id, email, role, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.email)
        .bind(new.role.as_str())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        user_from_row(&row)
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        let rows = sqlx::query("select id, email, role, created_at from users order by created_at")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(user_from_row).collect()
    }

    async fn create_order(&self, owner_id: Uuid, new: &NewOrder) -> StoreResult<CreatedOrder> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let order_row = sqlx::query(&format!(
            r#"
            insert into orders (
              id, owner_id, status, description, specifications, quantity, metadata,
              created_at, updated_at
            ) values (
              $1, $2, 'REVIEW', $3, $4, $5, $6, $7, $7
            )
            returning {ORDER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(owner_id)
        .bind(&new.description)
        .bind(&new.specifications)
        .bind(new.quantity)
        .bind(new.metadata.clone().unwrap_or_else(|| json!({})))
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;
        let order = order_from_row(&order_row)?;

        let conversation_row = sqlx::query(&format!(
            r#"
            insert into conversations (id, order_id, is_open, summary, closed_at, created_at)
            values ($1, $2, true, '', null, $3)
            returning {CONVERSATION_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(order.id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;
        let conversation = conversation_from_row(&conversation_row)?;

        tx.commit().await?;

        Ok(CreatedOrder {
            order,
            conversation,
        })
    }

    async fn find_order(&self, id: Uuid) -> StoreResult<Option<Order>> {
        let row = sqlx::query(&format!("select {ORDER_COLUMNS} from orders where id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(order_from_row).transpose()
    }

    async fn list_orders(
        &self,
        filter: OrderFilter,
        page: Page,
    ) -> StoreResult<(Vec<OrderSummary>, u64)> {
        let (total,): (i64,) = sqlx::query_as::<_, (i64,)>(
            "select count(*)::bigint from orders where ($1::uuid is null or owner_id = $1)",
        )
        .bind(filter.owner_id)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query(
            r#"
            select
              o.id, o.owner_id, o.status, o.description, o.specifications, o.quantity,
              o.metadata, o.created_at, o.updated_at,
              c.id as c_id, c.is_open as c_is_open, c.summary as c_summary,
              c.closed_at as c_closed_at, c.created_at as c_created_at
            from orders o
            join conversations c on c.order_id = o.id
            where ($1::uuid is null or o.owner_id = $1)
            order by o.created_at desc, o.id desc
            offset $2
            limit $3
            "#,
        )
        .bind(filter.owner_id)
        .bind(page.offset() as i64)
        .bind(i64::from(page.limit))
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let order = order_from_row(row)?;
            let conversation = Conversation {
                id: row.try_get("c_id")?,
                order_id: order.id,
                is_open: row.try_get("c_is_open")?,
                summary: row.try_get("c_summary")?,
                closed_at: row.try_get("c_closed_at")?,
                created_at: row.try_get("c_created_at")?,
            };
            out.push(OrderSummary {
                order,
                conversation,
            });
        }

        Ok((out, total.max(0) as u64))
    }

    async fn update_order_status(
        &self,
        id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
        require_closed_conversation: bool,
    ) -> StoreResult<StatusUpdate> {
        let updated = sqlx::query(&format!(
            r#"
            update orders o
            set status = $3,
                updated_at = $4
            where o.id = $1
              and o.status = $2
              and (
                $5 = false
                or not exists (
                  select 1 from conversations c where c.order_id = o.id and c.is_open
                )
              )
            returning {ORDER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(Utc::now())
        .bind(require_closed_conversation)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = updated {
            return Ok(StatusUpdate::Updated(order_from_row(&row)?));
        }

        // The conditional write matched nothing: work out which guard held.
        let Some(current) = self.find_order(id).await? else {
            return Ok(StatusUpdate::Missing);
        };
        if current.status != from {
            return Ok(StatusUpdate::StaleStatus(current.status));
        }
        if require_closed_conversation {
            return Ok(StatusUpdate::ConversationOpen);
        }
        Ok(StatusUpdate::StaleStatus(current.status))
    }

    async fn find_conversation(&self, id: Uuid) -> StoreResult<Option<Conversation>> {
        let row = sqlx::query(&format!(
            "select {CONVERSATION_COLUMNS} from conversations where id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(conversation_from_row).transpose()
    }

    async fn find_conversation_by_order(
        &self,
        order_id: Uuid,
    ) -> StoreResult<Option<Conversation>> {
        let row = sqlx::query(&format!(
            "select {CONVERSATION_COLUMNS} from conversations where order_id = $1"
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(conversation_from_row).transpose()
    }

    async fn list_messages(&self, conversation_id: Uuid) -> StoreResult<Vec<Message>> {
        let rows = sqlx::query(
            r#"
            select id, conversation_id, author_id, content, created_at
            from messages
            where conversation_id = $1
            order by created_at asc, id asc
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(message_from_row).collect()
    }

    async fn append_message(&self, new: &NewMessage) -> StoreResult<AppendOutcome> {
        let mut tx = self.pool.begin().await?;

        // Share lock: a concurrent close waits for this insert to commit.
        let open: Option<(bool,)> =
            sqlx::query_as::<_, (bool,)>("select is_open from conversations where id = $1 for share")
                .bind(new.conversation_id)
                .fetch_optional(&mut *tx)
                .await?;

        match open {
            None => return Ok(AppendOutcome::Missing),
            Some((false,)) => return Ok(AppendOutcome::Closed),
            Some((true,)) => {}
        }

        let row = sqlx::query(
            r#"
            insert into messages (id, conversation_id, author_id, content, created_at)
            values ($1, $2, $3, $4, $5)
            returning id, conversation_id, author_id, content, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.conversation_id)
        .bind(new.author_id)
        .bind(&new.content)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;
        let message = message_from_row(&row)?;

        tx.commit().await?;
        Ok(AppendOutcome::Appended(message))
    }

    async fn close_conversation(&self, req: &CloseRequest) -> StoreResult<CloseOutcome> {
        let mut tx = self.pool.begin().await?;

        let closed = sqlx::query(&format!(
            r#"
            update conversations
            set is_open = false,
                summary = $2,
                closed_at = $3
            where id = $1
              and is_open
            returning {CONVERSATION_COLUMNS}
            "#
        ))
        .bind(req.conversation_id)
        .bind(&req.summary)
        .bind(req.closed_at)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = closed else {
            tx.rollback().await?;
            debug!(conversation_id = %req.conversation_id, "close matched no open conversation");
            return match self.find_conversation(req.conversation_id).await? {
                None => Ok(CloseOutcome::Missing),
                Some(_) => Ok(CloseOutcome::AlreadyClosed),
            };
        };
        let conversation = conversation_from_row(&row)?;

        // Parent update in the same transaction. Only a REVIEW order moves.
        sqlx::query(
            r#"
            update orders
            set status = $3,
                updated_at = $4
            where id = $1
              and status = $2
            "#,
        )
        .bind(conversation.order_id)
        .bind(req.order_from.as_str())
        .bind(req.order_to.as_str())
        .bind(req.closed_at)
        .execute(&mut *tx)
        .await?;

        let order_row = sqlx::query(&format!("select {ORDER_COLUMNS} from orders where id = $1"))
            .bind(conversation.order_id)
            .fetch_one(&mut *tx)
            .await?;
        let order = order_from_row(&order_row)?;

        tx.commit().await?;

        Ok(CloseOutcome::Closed {
            conversation,
            order,
        })
    }
}
