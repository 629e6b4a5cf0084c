//! Typed view of the merged configuration.
//!
//! Every key has a default, so an empty document is a valid config.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::LoadedConfig;

pub const DEFAULT_ADDR: &str = "127.0.0.1:8900";
pub const DEFAULT_DB_URL_ENV: &str = "CMX_DATABASE_URL";
pub const DEFAULT_TOKEN_SECRET_ENV: &str = "CMX_TOKEN_SECRET";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DeskConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub hub: HubConfig,
    pub cors: CorsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Name of the env var holding the Postgres URL.
    pub url_env: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url_env: DEFAULT_DB_URL_ENV.to_string(),
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Name of the env var holding the HS256 signing secret.
    pub token_secret_env: String,
    pub token_ttl_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_secret_env: DEFAULT_TOKEN_SECRET_ENV.to_string(),
            token_ttl_secs: 86_400,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Per-connection outbound queue capacity.
    pub outbound_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            outbound_buffer: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        let origins = [
            "http://localhost",
            "http://127.0.0.1",
            "http://localhost:3000",
            "http://127.0.0.1:3000",
            "http://localhost:5173",
            "http://127.0.0.1:5173",
        ];
        Self {
            allowed_origins: origins.iter().map(|o| o.to_string()).collect(),
        }
    }
}

impl DeskConfig {
    pub fn from_loaded(loaded: &LoadedConfig) -> Result<Self> {
        let cfg: DeskConfig = serde_json::from_value(loaded.config_json.clone())
            .context("config does not match the desk schema")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.max_connections == 0 {
            bail!("CONFIG_INVALID database.max_connections must be >= 1");
        }
        if self.hub.outbound_buffer == 0 {
            bail!("CONFIG_INVALID hub.outbound_buffer must be >= 1");
        }
        if self.auth.token_ttl_secs == 0 {
            bail!("CONFIG_INVALID auth.token_ttl_secs must be >= 1");
        }
        for (key, name) in [
            ("database.url_env", &self.database.url_env),
            ("auth.token_secret_env", &self.auth.token_secret_env),
        ] {
            if !is_env_var_name(name) {
                bail!("CONFIG_INVALID {key} must name an env var, got '{name}'");
            }
        }
        Ok(())
    }
}

fn is_env_var_name(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
        && !s.starts_with(|c: char| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_empty_document() {
        let cfg = DeskConfig::from_loaded(&LoadedConfig::empty()).unwrap();
        assert_eq!(cfg, DeskConfig::default());
        assert_eq!(cfg.server.addr, DEFAULT_ADDR);
        assert_eq!(cfg.hub.outbound_buffer, 64);
        assert_eq!(cfg.auth.token_ttl_secs, 86_400);
    }

    #[test]
    fn env_var_names_only() {
        assert!(is_env_var_name("CMX_TOKEN_SECRET"));
        assert!(!is_env_var_name("cmx_token"));
        assert!(!is_env_var_name("1ABC"));
        assert!(!is_env_var_name("hunter2 secret"));
    }
}
