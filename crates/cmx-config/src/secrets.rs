//! Runtime secret resolution.
//!
//! Config stores env var NAMES only. [`resolve_secrets`] reads them once at
//! startup; the result is passed to constructors. Errors name the variable,
//! never its value.

use anyhow::{bail, Result};

use crate::DeskConfig;

/// Secrets read from the environment. Values are redacted in `Debug`.
#[derive(Clone)]
pub struct ResolvedSecrets {
    pub token_secret: String,
    /// `None` selects the in-memory store.
    pub database_url: Option<String>,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field("token_secret", &"<REDACTED>")
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "<REDACTED>"),
            )
            .finish()
    }
}

fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

pub fn resolve_secrets(cfg: &DeskConfig) -> Result<ResolvedSecrets> {
    resolve_secrets_with(cfg, resolve_env)
}

/// Same as [`resolve_secrets`] with an injectable lookup.
pub fn resolve_secrets_with<F>(cfg: &DeskConfig, lookup: F) -> Result<ResolvedSecrets>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(token_secret) = lookup(&cfg.auth.token_secret_env) else {
        bail!(
            "SECRETS_MISSING: required env var '{}' (token signing secret) is not set or empty",
            cfg.auth.token_secret_env
        );
    };

    Ok(ResolvedSecrets {
        token_secret,
        database_url: lookup(&cfg.database.url_env),
    })
}
