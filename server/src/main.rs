//! metbox - Main Entry Point

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use metbox_core::ClipStore;
use metbox_server::{
    api::{self, AppState},
    config::ServerConfig,
    error::Result,
    scheduler,
};

const DEFAULT_LOG_FILTER: &str = "metbox_server=info,metbox_core=info,tower_http=info";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing: RUST_LOG, else LOG_LEVEL, else the default filter
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        std::env::var("LOG_LEVEL")
            .ok()
            .and_then(|level| EnvFilter::try_new(level).ok())
            .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
    });
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Arc::new(ServerConfig::from_env()?);
    tracing::info!("Starting metbox");

    let store = Arc::new(ClipStore::open(config.core_config())?);
    tracing::info!(data_dir = %store.data_dir().display(), "Clip store opened");

    scheduler::spawn_pending_verification(store.clone());
    scheduler::spawn_reaper(store.clone(), config.reap_interval);

    let app = api::create_router(AppState::new(store, config.clone()));
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    tracing::info!("Listening on {}", config.bind_address);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
