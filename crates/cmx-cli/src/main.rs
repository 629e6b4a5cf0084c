use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use cmx_auth::{JwtTokens, TokenService};
use cmx_config::{DeskConfig, LoadedConfig, ResolvedSecrets};
use cmx_db::PgStore;
use cmx_lifecycle::Desk;
use cmx_schemas::{Actor, NewUser, Role};

#[derive(Parser)]
#[command(name = "cmx")]
#[command(about = "Commission desk operator CLI", long_about = None)]
struct Cli {
    /// Layered config paths in merge order. Falls back to CMX_CONFIG.
    #[arg(long = "config", global = true)]
    config_paths: Vec<String>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Sign bearer tokens for development and operators
    Token {
        #[command(subcommand)]
        cmd: TokenCmd,
    },

    /// User directory
    User {
        #[command(subcommand)]
        cmd: UserCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> local...)
        #[arg(required = true)]
        paths: Vec<String>,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,
    /// Apply SQL migrations.
    Migrate,
}

#[derive(Subcommand)]
enum TokenCmd {
    /// Sign a token for an existing user id.
    Issue {
        #[arg(long)]
        user_id: String,

        /// CUSTOMER | STAFF
        #[arg(long)]
        role: String,

        /// Overrides auth.token_ttl_secs
        #[arg(long)]
        ttl_secs: Option<u64>,
    },
}

#[derive(Subcommand)]
enum UserCmd {
    /// Insert a user and print it with a fresh token.
    Create {
        #[arg(long)]
        email: String,

        /// CUSTOMER | STAFF
        #[arg(long)]
        role: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env.local if present (dev convenience).
    let _ = dotenvy::from_filename(".env.local");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let cfg = desk_config(&cli.config_paths)?;
            let pool = connect(&cfg).await?;
            match cmd {
                DbCmd::Status => {
                    let s = cmx_db::status(&pool).await?;
                    println!("db_ok={} has_orders_table={}", s.ok, s.has_orders_table);
                }
                DbCmd::Migrate => {
                    cmx_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::Token { cmd } => match cmd {
            TokenCmd::Issue {
                user_id,
                role,
                ttl_secs,
            } => {
                let cfg = desk_config(&cli.config_paths)?;
                let secrets = cmx_config::resolve_secrets(&cfg)?;
                let user_id = Uuid::parse_str(&user_id).context("invalid user_id uuid")?;
                let role = parse_role(&role)?;
                let tokens = token_service(&cfg, &secrets, ttl_secs)?;

                let token = tokens.issue(Actor::new(user_id, role))?;
                println!("user_id={}", user_id);
                println!("role={}", role);
                println!("ttl_secs={}", tokens.ttl_secs());
                println!("token={}", token);
            }
        },

        Commands::User { cmd } => match cmd {
            UserCmd::Create { email, role } => {
                let cfg = desk_config(&cli.config_paths)?;
                let secrets = cmx_config::resolve_secrets(&cfg)?;
                let role = parse_role(&role)?;
                let tokens = token_service(&cfg, &secrets, None)?;

                let pool = connect(&cfg).await?;
                cmx_db::migrate(&pool).await?;
                let desk = Desk::new(Arc::new(PgStore::new(pool)));
                let user = desk
                    .create_user(NewUser { email, role })
                    .await
                    .map_err(|e| anyhow!("user create failed ({}): {e}", e.kind()))?;
                let token = tokens.issue(user.actor())?;

                println!("{}", serde_json::to_string_pretty(&user)?);
                println!("token={}", token);
            }
        },

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = cmx_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }
    }

    Ok(())
}

fn desk_config(paths: &[String]) -> Result<DeskConfig> {
    let loaded: LoadedConfig = if paths.is_empty() {
        cmx_config::load_from_env()?
    } else {
        let refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
        cmx_config::load_layered_yaml(&refs)?
    };
    DeskConfig::from_loaded(&loaded)
}

fn parse_role(raw: &str) -> Result<Role> {
    Role::parse(raw).ok_or_else(|| anyhow!("invalid role '{raw}'; expected CUSTOMER | STAFF"))
}

fn token_service(
    cfg: &DeskConfig,
    secrets: &ResolvedSecrets,
    ttl_override: Option<u64>,
) -> Result<JwtTokens> {
    let ttl = ttl_override.unwrap_or(cfg.auth.token_ttl_secs);
    if ttl == 0 {
        bail!("--ttl-secs must be >= 1");
    }
    Ok(JwtTokens::new(secrets.token_secret.as_bytes(), ttl)?)
}

async fn connect(cfg: &DeskConfig) -> Result<cmx_db::PgPool> {
    let url = std::env::var(&cfg.database.url_env)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .with_context(|| format!("missing env var {}", cfg.database.url_env))?;
    cmx_db::connect(&url, cfg.database.max_connections).await
}
