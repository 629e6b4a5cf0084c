//! cmx-db
//!
//! Durable record store for the commission desk.
//!
//! [`Store`] is the seam the lifecycle layer talks to. Two implementations:
//! - [`MemStore`]: in-process, used by tests and by the daemon when no
//!   database URL is configured.
//! - [`PgStore`]: Postgres via sqlx, schema in `migrations/`.
//!
//! Every state-changing call that guards a lifecycle invariant is a
//! conditional update, so concurrent callers cannot both win a terminal
//! transition.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use cmx_schemas::{
    Conversation, CreatedOrder, Message, NewMessage, NewOrder, NewUser, Order, OrderStatus,
    OrderSummary, Page, User,
};

mod mem;
mod pg;

pub use mem::MemStore;
pub use pg::PgStore;
pub use sqlx::PgPool;

pub const ENV_DB_URL: &str = "CMX_DATABASE_URL";

pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;
    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    tracing::info!("db migrations applied");
    Ok(())
}

/// Simple status query (connectivity + schema presence).
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='orders'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok: one == 1,
        has_orders_table: exists,
    })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_orders_table: bool,
}

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    Conflict { constraint: String },
    /// Anything else the backend reported. Not retried.
    Backend(anyhow::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Conflict { constraint } => {
                write!(f, "unique constraint violated: {constraint}")
            }
            StoreError::Backend(e) => write!(f, "store backend error: {e:#}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &e {
            // Postgres unique_violation
            if db_err.code().as_deref() == Some("23505") {
                return StoreError::Conflict {
                    constraint: db_err.constraint().unwrap_or("unknown").to_string(),
                };
            }
        }
        StoreError::Backend(anyhow::Error::new(e))
    }
}

impl From<anyhow::Error> for StoreError {
    fn from(e: anyhow::Error) -> Self {
        StoreError::Backend(e)
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Conditional-update outcomes
// ---------------------------------------------------------------------------

/// Row filter for order listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OrderFilter {
    /// `None` = every order.
    pub owner_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdate {
    Updated(Order),
    Missing,
    /// The order is no longer in the expected `from` status.
    StaleStatus(OrderStatus),
    /// The guard required a closed conversation and it is still open.
    ConversationOpen,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppendOutcome {
    Appended(Message),
    Missing,
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CloseOutcome {
    Closed {
        conversation: Conversation,
        /// The owning order after the coupled status change.
        order: Order,
    },
    Missing,
    AlreadyClosed,
}

/// Parameters of a conversation close, including the coupled order move.
#[derive(Debug, Clone)]
pub struct CloseRequest {
    pub conversation_id: Uuid,
    pub summary: String,
    pub closed_at: DateTime<Utc>,
    /// The order moves `order_from -> order_to` in the same write.
    pub order_from: OrderStatus,
    pub order_to: OrderStatus,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Store: Send + Sync {
    /// Fails with [`StoreError::Conflict`] on a duplicate email.
    async fn create_user(&self, new: &NewUser) -> StoreResult<User>;
    async fn list_users(&self) -> StoreResult<Vec<User>>;

    /// Insert an order in REVIEW together with its open conversation.
    /// Both rows commit or neither does.
    async fn create_order(&self, owner_id: Uuid, new: &NewOrder) -> StoreResult<CreatedOrder>;
    async fn find_order(&self, id: Uuid) -> StoreResult<Option<Order>>;
    /// Newest first. Returns the page plus the unpaged total.
    async fn list_orders(
        &self,
        filter: OrderFilter,
        page: Page,
    ) -> StoreResult<(Vec<OrderSummary>, u64)>;
    /// Compare-and-set `from -> to`. With `require_closed_conversation`, the
    /// write also requires the order's conversation to be closed.
    async fn update_order_status(
        &self,
        id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
        require_closed_conversation: bool,
    ) -> StoreResult<StatusUpdate>;

    async fn find_conversation(&self, id: Uuid) -> StoreResult<Option<Conversation>>;
    async fn find_conversation_by_order(&self, order_id: Uuid)
        -> StoreResult<Option<Conversation>>;
    /// Ascending by `created_at`.
    async fn list_messages(&self, conversation_id: Uuid) -> StoreResult<Vec<Message>>;
    /// Appends only while the conversation is open.
    async fn append_message(&self, new: &NewMessage) -> StoreResult<AppendOutcome>;
    /// Close an open conversation and move its order, in one write.
    async fn close_conversation(&self, req: &CloseRequest) -> StoreResult<CloseOutcome>;
}
