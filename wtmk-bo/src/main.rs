//! wtmk-bo - Batch Orchestrator Microservice
//!
//! **Module Identity:**
//! - Name: wtmk-bo (Batch Orchestrator)
//! - Port: 5733 (default)
//!
//! Tracks watermark batches to completion: triggers backend processing,
//! polls the Batch Store, aggregates per-item progress, and exposes
//! status/cancel over HTTP + SSE.

use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use wtmk_common::events::EventBus;

use wtmk_bo::config::BoConfig;
use wtmk_bo::store::HttpBatchStore;
use wtmk_bo::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting wtmk-bo (Batch Orchestrator) microservice");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Resolve configuration (ENV -> TOML -> defaults)
    let config = BoConfig::load()?;
    info!("Batch Store: {}", config.store_url);
    info!(
        "Poll interval: {}ms, tick timeout: {}ms",
        config.poll_interval.as_millis(),
        config.tick_timeout.as_millis()
    );

    // Batch Store client
    let store = HttpBatchStore::new(config.store_url.clone(), config.tick_timeout)
        .map_err(|e| anyhow::anyhow!("Failed to build store client: {}", e))?;

    // Event bus for SSE broadcasting
    let event_bus = EventBus::new(100);
    info!("Event bus initialized");

    let bind_address = config.bind_address.clone();
    let state = AppState::new(Arc::new(store), event_bus, config);
    let app = wtmk_bo::build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!("Listening on http://{}", bind_address);
    info!("Health check: http://{}/health", bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
