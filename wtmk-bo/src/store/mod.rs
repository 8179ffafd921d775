//! Batch Store access
//!
//! **[BO-INT-010]** The Batch Store and transformation backend are one
//! external service, authoritative for batch and item state. This module
//! defines the core-facing contract plus the raw wire records the monitor
//! decodes via `models::batch`.

mod http;

pub use http::HttpBatchStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;
use wtmk_common::events::BatchStatus;

/// Batch Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Batch id unknown to the store
    #[error("Batch not found: {0}")]
    NotFound(Uuid),

    /// Network communication error
    #[error("Network error: {0}")]
    Network(String),

    /// Store API returned an error response
    #[error("Store API error {0}: {1}")]
    Api(u16, String),

    /// Failed to parse a store response body
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Raw batch record as the store reports it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRecord {
    pub id: Uuid,
    /// Lifecycle state string ("pending", "processing", "completed", "failed")
    pub status: String,
    /// Opaque watermark settings payload, passed through unmodified
    #[serde(default)]
    pub settings: Value,
    /// "batch" or "single"; absent means "batch"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

/// Raw item record as the store reports it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemRecord {
    pub id: Uuid,
    pub name: String,
    pub size: u64,
    /// Lifecycle state string ("queued", "processing", "completed", "failed")
    pub status: String,
    /// Percent complete while processing; the store may omit it
    #[serde(default)]
    pub progress: Option<i64>,
    /// Failure message, populated only for failed items
    #[serde(default)]
    pub error: Option<String>,
}

/// Core-facing Batch Store contract
///
/// Object-safe so the orchestrator can hold `Arc<dyn BatchStore>` and
/// tests can substitute a scripted in-memory store.
#[async_trait]
pub trait BatchStore: Send + Sync {
    /// Fetch the batch record
    async fn get_batch(&self, batch_id: Uuid) -> Result<BatchRecord, StoreError>;

    /// Fetch all item records for the batch
    async fn get_batch_items(&self, batch_id: Uuid) -> Result<Vec<ItemRecord>, StoreError>;

    /// Force the batch status (cancellation path only)
    async fn update_batch_status(
        &self,
        batch_id: Uuid,
        status: BatchStatus,
    ) -> Result<(), StoreError>;

    /// Trigger backend processing of the batch
    ///
    /// Long-running: resolves only when the backend reports batch-level
    /// terminal status. Callers must not assume any upper bound on its
    /// duration, which is why the monitor runs concurrently.
    async fn trigger_processing(&self, batch_id: Uuid) -> Result<(), StoreError>;
}

/// Wire string for a status update request
pub(crate) fn status_wire_name(status: BatchStatus) -> &'static str {
    match status {
        BatchStatus::Pending => "pending",
        BatchStatus::Processing => "processing",
        BatchStatus::Completed => "completed",
        BatchStatus::Failed => "failed",
    }
}
