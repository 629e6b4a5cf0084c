//! HTTP mapping for desk errors.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::error;

use cmx_lifecycle::DeskError;

use crate::api_types::ErrorBody;

#[derive(Debug)]
pub enum ApiError {
    Desk(DeskError),
    Unauthorized(String),
}

impl From<DeskError> for ApiError {
    fn from(e: DeskError) -> Self {
        ApiError::Desk(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError::Desk(DeskError::BadRequest(e.body_text()))
    }
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError::Desk(DeskError::BadRequest(msg.into()))
    }
}

/// Status code for a desk error. Shared with the realtime session.
pub fn status_for(e: &DeskError) -> StatusCode {
    match e {
        DeskError::NotFound(_) => StatusCode::NOT_FOUND,
        DeskError::Forbidden(_) => StatusCode::FORBIDDEN,
        DeskError::Conflict(_) => StatusCode::CONFLICT,
        DeskError::BadRequest(_) => StatusCode::BAD_REQUEST,
        DeskError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Client-facing message. Store failures are logged and redacted.
pub fn public_message(e: &DeskError) -> String {
    match e {
        DeskError::Store(inner) => {
            error!(error = %inner, "store failure");
            "internal error".to_string()
        }
        other => other.to_string(),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Desk(e) => (
                status_for(&e),
                ErrorBody {
                    error: public_message(&e),
                    kind: e.kind().to_string(),
                },
            ),
            ApiError::Unauthorized(msg) => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    error: msg,
                    kind: "unauthorized".to_string(),
                },
            ),
        };
        (status, Json(body)).into_response()
    }
}
