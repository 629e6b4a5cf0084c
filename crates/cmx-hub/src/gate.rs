//! Handshake authentication for realtime connections.

use std::sync::Arc;

use tracing::warn;

use cmx_auth::{authenticate, AuthError, IdentityContext, TokenService};

/// A refused handshake. No retry; the client must reconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateRejection {
    pub reason: &'static str,
    pub detail: String,
}

impl std::fmt::Display for GateRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "connection rejected ({}): {}", self.reason, self.detail)
    }
}

impl std::error::Error for GateRejection {}

impl From<AuthError> for GateRejection {
    fn from(e: AuthError) -> Self {
        GateRejection {
            reason: e.reason(),
            detail: e.to_string(),
        }
    }
}

#[derive(Clone)]
pub struct ConnectionGate {
    tokens: Arc<dyn TokenService>,
}

impl ConnectionGate {
    pub fn new(tokens: Arc<dyn TokenService>) -> Self {
        Self { tokens }
    }

    /// Verify the `Authorization` header value of a connection attempt.
    pub fn admit(&self, authorization: Option<&str>) -> Result<IdentityContext, GateRejection> {
        authenticate(self.tokens.as_ref(), authorization).map_err(|e| {
            let rejection = GateRejection::from(e);
            warn!(reason = rejection.reason, "realtime connection rejected");
            rejection
        })
    }
}
