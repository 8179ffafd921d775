//! wtmk-bo library interface for testing
//!
//! Exposes public APIs for integration testing

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod store;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;
use wtmk_common::events::EventBus;

use crate::config::BoConfig;
use crate::services::BatchSession;
use crate::store::BatchStore;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Batch Store / backend client
    pub store: Arc<dyn BatchStore>,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Active orchestration sessions, keyed by batch. Also enforces the
    /// at-most-one-trigger-per-batch property for this process.
    pub sessions: Arc<RwLock<HashMap<Uuid, Arc<BatchSession>>>>,
    /// Resolved service configuration
    pub config: BoConfig,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last fatal session error, for diagnostics
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(store: Arc<dyn BatchStore>, event_bus: EventBus, config: BoConfig) -> Self {
        Self {
            store,
            event_bus,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            config,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Session for a batch, if one exists in this process
    pub async fn session(&self, batch_id: Uuid) -> Option<Arc<BatchSession>> {
        self.sessions.read().await.get(&batch_id).cloned()
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::batch_routes())
        .route("/events", get(api::event_stream))
        .merge(api::health_routes())
        .with_state(state)
}
