//! cmx-auth
//!
//! Bearer-token identity for HTTP requests and realtime handshakes.
//!
//! - [`TokenService`]: sign and verify [`Claims`]. [`JwtTokens`] is the HS256
//!   implementation.
//! - [`IdentityContext`]: the verified caller, derived once per request or
//!   connection.
//! - [`bearer_token`]: `Authorization` header parsing.
//!
//! Credentials (passwords, login) are not handled here.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cmx_schemas::{Actor, Role};

mod bearer;
mod jwt;

pub use bearer::{bearer_token, BearerError};
pub use jwt::JwtTokens;

/// Token payload. `sub` is the user id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    /// Unix seconds.
    pub iat: i64,
    /// Unix seconds.
    pub exp: i64,
}

impl Claims {
    pub fn for_actor(actor: Actor, issued_at: i64, ttl_secs: u64) -> Self {
        let ttl = i64::try_from(ttl_secs).unwrap_or(i64::MAX);
        Self {
            sub: actor.id,
            role: actor.role,
            iat: issued_at,
            exp: issued_at.saturating_add(ttl),
        }
    }

    pub fn actor(&self) -> Actor {
        Actor::new(self.sub, self.role)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Signature valid but `exp` has passed.
    Expired,
    /// Bad signature, wrong algorithm, or undecodable payload.
    Invalid(String),
    Signing(String),
    EmptySecret,
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::Expired => f.write_str("token expired"),
            TokenError::Invalid(m) => write!(f, "invalid token: {m}"),
            TokenError::Signing(m) => write!(f, "token signing failed: {m}"),
            TokenError::EmptySecret => f.write_str("token secret is empty"),
        }
    }
}

impl std::error::Error for TokenError {}

/// Sign and verify capability consumed by the daemon and the CLI.
pub trait TokenService: Send + Sync {
    fn sign(&self, claims: &Claims) -> Result<String, TokenError>;
    fn verify(&self, token: &str) -> Result<Claims, TokenError>;

    /// Lifetime given to tokens from [`TokenService::issue`].
    fn ttl_secs(&self) -> u64;

    /// Sign a token for `actor` valid from now for [`TokenService::ttl_secs`].
    fn issue(&self, actor: Actor) -> Result<String, TokenError> {
        let now = chrono::Utc::now().timestamp();
        self.sign(&Claims::for_actor(actor, now, self.ttl_secs()))
    }
}

/// The authenticated caller, fixed for the life of a request or connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityContext {
    pub actor: Actor,
    /// Unix seconds.
    pub expires_at: i64,
}

impl IdentityContext {
    pub fn from_claims(claims: &Claims) -> Self {
        Self {
            actor: claims.actor(),
            expires_at: claims.exp,
        }
    }

    pub fn user_id(&self) -> Uuid {
        self.actor.id
    }

    pub fn role(&self) -> Role {
        self.actor.role
    }
}

/// Parse the header value and verify the token in one step.
pub fn authenticate(
    tokens: &dyn TokenService,
    authorization: Option<&str>,
) -> Result<IdentityContext, AuthError> {
    let raw = bearer_token(authorization).map_err(AuthError::Bearer)?;
    let claims = tokens.verify(raw).map_err(AuthError::Token)?;
    Ok(IdentityContext::from_claims(&claims))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    Bearer(BearerError),
    Token(TokenError),
}

impl AuthError {
    /// Short reason code for logs. Never includes the token.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::Bearer(BearerError::Missing) => "missing_token",
            AuthError::Bearer(BearerError::Malformed) => "malformed_header",
            AuthError::Token(_) => "invalid_token",
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::Bearer(e) => write!(f, "{e}"),
            AuthError::Token(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for AuthError {}
