//! cmx-daemon entry point.
//!
//! Thin: loads config and secrets, picks a store, builds the shared state,
//! wires middleware, and serves until ctrl-c. The realtime hub is shut down
//! as part of graceful shutdown.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use cmx_auth::{JwtTokens, TokenService};
use cmx_config::{DeskConfig, ResolvedSecrets, UnusedKeyPolicy};
use cmx_daemon::{routes, state};
use cmx_db::{MemStore, PgStore, Store};
use cmx_hub::RealtimeHub;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env.local if present (dev convenience).
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let loaded = cmx_config::load_from_env().context("config load failed")?;
    let report = cmx_config::report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn)?;
    if !report.is_clean() {
        warn!(unused = ?report.unused_leaf_pointers, "config has keys the daemon does not read");
    }
    let cfg = DeskConfig::from_loaded(&loaded)?;
    let secrets = cmx_config::resolve_secrets(&cfg)?;
    info!(config_hash = %loaded.config_hash, "config loaded");

    let store = open_store(&cfg, &secrets).await?;
    let tokens: Arc<dyn TokenService> = Arc::new(
        JwtTokens::new(secrets.token_secret.as_bytes(), cfg.auth.token_ttl_secs)
            .context("token service init failed")?,
    );
    let hub = RealtimeHub::new(cfg.hub.outbound_buffer);

    let shared = Arc::new(state::AppState::new(
        store,
        tokens,
        hub.clone(),
        loaded.config_hash.clone(),
    ));

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors(&cfg.cors.allowed_origins));

    let addr = match bind_addr_from_env() {
        Some(addr) => addr,
        None => cfg
            .server
            .addr
            .parse::<SocketAddr>()
            .with_context(|| format!("invalid server.addr: {}", cfg.server.addr))?,
    };
    info!("cmx-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal(hub))
        .await
        .context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var("CMX_DAEMON_ADDR").ok()?.parse().ok()
}

async fn open_store(cfg: &DeskConfig, secrets: &ResolvedSecrets) -> anyhow::Result<Arc<dyn Store>> {
    match &secrets.database_url {
        Some(url) => {
            let pool = cmx_db::connect(url, cfg.database.max_connections).await?;
            cmx_db::migrate(&pool).await?;
            info!("store: postgres");
            Ok(Arc::new(PgStore::new(pool)))
        }
        None => {
            warn!(
                env = %cfg.database.url_env,
                "no database url; using in-memory store (data is lost on exit)"
            );
            Ok(Arc::new(MemStore::new()))
        }
    }
}

/// Resolve on ctrl-c, after telling every realtime connection to go away.
async fn shutdown_signal(hub: RealtimeHub) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "ctrl-c handler failed; shutting down");
    }
    info!("shutdown requested");
    hub.shutdown().await;
}

fn cors(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PATCH])
        .allow_headers(tower_http::cors::Any)
}
