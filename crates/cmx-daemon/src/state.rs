//! Shared runtime state for cmx-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. The realtime hub is
//! owned here: created at startup, shut down when the server stops.

use std::sync::Arc;

use cmx_auth::TokenService;
use cmx_db::Store;
use cmx_hub::{ConnectionGate, RealtimeHub};
use cmx_lifecycle::Desk;

/// Static build metadata included in health responses.
#[derive(Clone, Debug)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

#[derive(Clone)]
pub struct AppState {
    pub build: BuildInfo,
    pub desk: Desk,
    pub tokens: Arc<dyn TokenService>,
    pub gate: ConnectionGate,
    pub hub: RealtimeHub,
    /// SHA-256 of the canonical config the daemon booted with.
    pub config_hash: String,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        tokens: Arc<dyn TokenService>,
        hub: RealtimeHub,
        config_hash: String,
    ) -> Self {
        Self {
            build: BuildInfo {
                service: "cmx-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            desk: Desk::new(store),
            gate: ConnectionGate::new(Arc::clone(&tokens)),
            tokens,
            hub,
            config_hash,
        }
    }
}
