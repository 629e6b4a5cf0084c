//! Request and response types for the daemon's HTTP endpoints.
//!
//! Domain records (orders, conversations, messages) are returned as their
//! `cmx_schemas` types directly; only envelopes live here.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: String,
    pub version: String,
    /// Live realtime connections.
    pub connections: usize,
    pub config_hash: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    /// "not_found" | "forbidden" | "conflict" | "bad_request" | "unauthorized" | "internal"
    pub kind: String,
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    /// "CUSTOMER" | "STAFF", case-insensitive.
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRequest {
    /// "REVIEW" | "PROCESSING" | "COMPLETED", case-insensitive.
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostMessageRequest {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseConversationRequest {
    pub summary: String,
}

/// Raw pagination query. Kept as strings so junk clamps instead of 400ing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}
