//! Axum router and HTTP handlers for cmx-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. Handlers are thin: parse, call [`cmx_lifecycle::Desk`],
//! fan out to the hub where a write is visible in realtime.

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequestParts, Path, Query, State},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use tracing::{debug, info};
use uuid::Uuid;

use cmx_auth::{authenticate, IdentityContext};
use cmx_schemas::{Actor, NewOrder, NewUser, OrderStatus, Page, Role};

use crate::{
    api_types::{
        CloseConversationRequest, CreateUserRequest, HealthResponse, ListQuery,
        PostMessageRequest, TransitionRequest,
    },
    error::ApiError,
    state::AppState,
    ws,
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/users", post(create_user).get(list_users))
        .route("/v1/orders", post(create_order).get(list_orders))
        .route("/v1/orders/:id", get(read_order))
        .route("/v1/orders/:id/status", patch(transition_order))
        .route("/v1/conversations/:id", get(read_conversation))
        .route("/v1/conversations/:id/messages", post(post_message))
        .route("/v1/conversations/:id/close", post(close_conversation))
        .route("/v1/ws", get(ws::ws_handler))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Extractors
// ---------------------------------------------------------------------------

/// The verified caller of an HTTP request.
pub struct Caller(pub IdentityContext);

impl Caller {
    pub fn actor(&self) -> &Actor {
        &self.0.actor
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        st: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        authenticate(st.tokens.as_ref(), header)
            .map(Caller)
            .map_err(|e| {
                debug!(reason = e.reason(), "request unauthenticated");
                ApiError::Unauthorized(e.to_string())
            })
    }
}

fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim()).map_err(|_| ApiError::bad_request(format!("invalid id: {raw}")))
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service.to_string(),
            version: st.build.version.to_string(),
            connections: st.hub.connection_count().await,
            config_hash: st.config_hash.clone(),
        }),
    )
}

// ---------------------------------------------------------------------------
// /v1/users
// ---------------------------------------------------------------------------

pub(crate) async fn create_user(
    State(st): State<Arc<AppState>>,
    body: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body?;
    let role = Role::parse(&req.role)
        .ok_or_else(|| ApiError::bad_request(format!("unknown role: {}", req.role)))?;
    let user = st
        .desk
        .create_user(NewUser {
            email: req.email,
            role,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub(crate) async fn list_users(
    State(st): State<Arc<AppState>>,
    caller: Caller,
) -> Result<impl IntoResponse, ApiError> {
    let users = st.desk.list_users(caller.actor()).await?;
    Ok(Json(users))
}

// ---------------------------------------------------------------------------
// /v1/orders
// ---------------------------------------------------------------------------

pub(crate) async fn create_order(
    State(st): State<Arc<AppState>>,
    caller: Caller,
    body: Result<Json<NewOrder>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(new) = body?;
    let created = st.desk.create_order(caller.actor(), new).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub(crate) async fn list_orders(
    State(st): State<Arc<AppState>>,
    caller: Caller,
    Query(q): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = Page::from_raw(q.page.as_deref(), q.limit.as_deref());
    let listing = st.desk.list_orders(caller.actor(), page).await?;
    Ok(Json(listing))
}

pub(crate) async fn read_order(
    State(st): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let detail = st.desk.read_order(caller.actor(), id).await?;
    Ok(Json(detail))
}

pub(crate) async fn transition_order(
    State(st): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
    body: Result<Json<TransitionRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let Json(req) = body?;
    let target = OrderStatus::parse(&req.status)
        .ok_or_else(|| ApiError::bad_request(format!("unknown status: {}", req.status)))?;
    let order = st.desk.transition_order(caller.actor(), id, target).await?;
    Ok(Json(order))
}

// ---------------------------------------------------------------------------
// /v1/conversations
// ---------------------------------------------------------------------------

pub(crate) async fn read_conversation(
    State(st): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let detail = st.desk.read_conversation(caller.actor(), id).await?;
    Ok(Json(detail))
}

pub(crate) async fn post_message(
    State(st): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
    body: Result<Json<PostMessageRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let Json(req) = body?;
    let message = st.desk.post_message(caller.actor(), id, &req.content).await?;

    let report = st.hub.broadcast_message(&message).await;
    debug!(
        conversation_id = %id,
        delivered = report.delivered,
        failed = report.failed,
        "message fanned out"
    );
    Ok((StatusCode::CREATED, Json(message)))
}

pub(crate) async fn close_conversation(
    State(st): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
    body: Result<Json<CloseConversationRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let Json(req) = body?;
    let closed = st
        .desk
        .close_conversation(caller.actor(), id, &req.summary)
        .await?;

    let report = st.hub.broadcast_closed(&closed.conversation).await;
    info!(
        conversation_id = %id,
        delivered = report.delivered,
        "close notice fanned out"
    );
    Ok(Json(closed))
}
