//! HTTP routes and shared handler state.

pub mod download;
pub mod handlers;
pub mod upload;

use crate::config::ServerConfig;
use crate::error::{AppError, Result};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::HeaderMap,
    routing::{get, post},
};
use metbox_core::ClipStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ClipStore>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(store: Arc<ClipStore>, config: Arc<ServerConfig>) -> Self {
        Self { store, config }
    }
}

/// Build the application router.
pub fn create_router(state: AppState) -> Router {
    let body_limit = usize::try_from(state.config.max_content_length).unwrap_or(usize::MAX);

    Router::new()
        .route("/clip/create", post(handlers::clip::create))
        .route("/clip/get/:code", get(handlers::clip::get))
        .route("/clip/upload", post(handlers::clip::upload))
        .route("/clip/reap", post(handlers::clip::reap))
        .route(
            "/updater",
            get(handlers::updater::manifest).post(handlers::updater::manifest),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Runs synchronous store work off the async workers.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Internal(format!("blocking task failed: {e}")))?
}

/// Client address from the configured proxy header, else the socket peer.
pub fn client_ip(headers: &HeaderMap, header: &str, peer: Option<SocketAddr>) -> Option<String> {
    headers
        .get(header)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
}
