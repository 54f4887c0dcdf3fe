//! Relay server core
//!
//! Owns the HTTP listener and the control-channel listener (a WebSocket
//! upgrade on the same port), plus the two pieces of shared state: the
//! tunnel registry and the request correlator. Both are held by the
//! [`AppState`] passed to every handler; there is no ambient global state.

use std::sync::Arc;

use axum::{Router, routing::get};
use relay_common::constants::CONTROL_CHANNEL_PATH;

pub mod allocator;
pub mod config;
pub mod correlator;
pub mod handlers;
pub mod registry;

use config::ServerConfig;
use correlator::RequestCorrelator;
use registry::TunnelRegistry;

/// Shared state threaded through all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub registry: Arc<TunnelRegistry>,
    pub correlator: Arc<RequestCorrelator>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(TunnelRegistry::new()),
            correlator: Arc::new(RequestCorrelator::new()),
        }
    }
}

/// Assemble the router: the control channel lives on a fixed path, every
/// other method/path/host combination is candidate tunnel traffic.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(CONTROL_CHANNEL_PATH, get(handlers::channel_handler))
        .fallback(handlers::forward_handler)
        .with_state(state)
}

/// Strip an optional `:port` suffix from a Host header value
pub fn strip_port(host: &str) -> &str {
    match host.rsplit_once(':') {
        Some((name, port)) if !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}

/// Leading DNS label of a Host header value
pub fn host_label(host: &str) -> &str {
    strip_port(host).split('.').next().unwrap_or("")
}
