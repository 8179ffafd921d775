//! Shared test helpers: a scripted in-memory Batch Store
//!
//! Tests mutate the store between polls to simulate backend progress, and
//! control exactly when (and how) the long-running processing trigger
//! resolves.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use uuid::Uuid;
use wtmk_bo::store::{BatchRecord, BatchStore, ItemRecord, StoreError};
use wtmk_common::events::BatchStatus;

type TriggerResult = Result<(), String>;

pub struct MockBatchStore {
    batch: Mutex<Option<BatchRecord>>,
    items: Mutex<Vec<ItemRecord>>,
    /// When set, all reads fail with a simulated network error
    fail_reads: AtomicBool,
    /// When non-zero, every read sleeps this long before answering
    read_delay_ms: AtomicU64,
    trigger_calls: AtomicUsize,
    trigger_tx: watch::Sender<Option<TriggerResult>>,
    trigger_rx: watch::Receiver<Option<TriggerResult>>,
    status_updates: Mutex<Vec<BatchStatus>>,
}

impl MockBatchStore {
    /// Store holding one batch in the given state
    pub fn with_batch(batch_id: Uuid, status: &str, items: Vec<ItemRecord>) -> Arc<Self> {
        let (trigger_tx, trigger_rx) = watch::channel(None);
        Arc::new(Self {
            batch: Mutex::new(Some(batch_record(batch_id, status))),
            items: Mutex::new(items),
            fail_reads: AtomicBool::new(false),
            read_delay_ms: AtomicU64::new(0),
            trigger_calls: AtomicUsize::new(0),
            trigger_tx,
            trigger_rx,
            status_updates: Mutex::new(Vec::new()),
        })
    }

    /// Store that knows no batches at all
    pub fn empty() -> Arc<Self> {
        let (trigger_tx, trigger_rx) = watch::channel(None);
        Arc::new(Self {
            batch: Mutex::new(None),
            items: Mutex::new(Vec::new()),
            fail_reads: AtomicBool::new(false),
            read_delay_ms: AtomicU64::new(0),
            trigger_calls: AtomicUsize::new(0),
            trigger_tx,
            trigger_rx,
            status_updates: Mutex::new(Vec::new()),
        })
    }

    pub async fn set_batch_status(&self, status: &str) {
        if let Some(batch) = self.batch.lock().await.as_mut() {
            batch.status = status.to_string();
        }
    }

    pub async fn set_items(&self, items: Vec<ItemRecord>) {
        *self.items.lock().await = items;
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_read_delay(&self, delay: Duration) {
        self.read_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    async fn delay_reads(&self) {
        let ms = self.read_delay_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    /// Number of times the processing trigger was invoked
    pub fn trigger_calls(&self) -> usize {
        self.trigger_calls.load(Ordering::SeqCst)
    }

    /// Resolve the in-flight trigger call (Ok = backend reports done)
    pub fn complete_trigger(&self, result: Result<(), &str>) {
        let _ = self
            .trigger_tx
            .send(Some(result.map_err(|m| m.to_string())));
    }

    /// Statuses forced via `update_batch_status` (the cancellation path)
    pub async fn status_updates(&self) -> Vec<BatchStatus> {
        self.status_updates.lock().await.clone()
    }
}

#[async_trait]
impl BatchStore for MockBatchStore {
    async fn get_batch(&self, batch_id: Uuid) -> Result<BatchRecord, StoreError> {
        self.delay_reads().await;
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Network("simulated outage".to_string()));
        }
        self.batch
            .lock()
            .await
            .clone()
            .ok_or(StoreError::NotFound(batch_id))
    }

    async fn get_batch_items(&self, batch_id: Uuid) -> Result<Vec<ItemRecord>, StoreError> {
        self.delay_reads().await;
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Network("simulated outage".to_string()));
        }
        if self.batch.lock().await.is_none() {
            return Err(StoreError::NotFound(batch_id));
        }
        Ok(self.items.lock().await.clone())
    }

    async fn update_batch_status(
        &self,
        _batch_id: Uuid,
        status: BatchStatus,
    ) -> Result<(), StoreError> {
        self.status_updates.lock().await.push(status);
        if let Some(batch) = self.batch.lock().await.as_mut() {
            batch.status = match status {
                BatchStatus::Pending => "pending",
                BatchStatus::Processing => "processing",
                BatchStatus::Completed => "completed",
                BatchStatus::Failed => "failed",
            }
            .to_string();
        }
        Ok(())
    }

    async fn trigger_processing(&self, _batch_id: Uuid) -> Result<(), StoreError> {
        self.trigger_calls.fetch_add(1, Ordering::SeqCst);
        let mut rx = self.trigger_rx.clone();
        loop {
            let resolved = rx.borrow().clone();
            if let Some(result) = resolved {
                return result.map_err(|m| StoreError::Api(500, m));
            }
            if rx.changed().await.is_err() {
                // Sender dropped without a result: hold the call open
                // forever, like a backend that never answers.
                futures::future::pending::<()>().await;
            }
        }
    }
}

pub fn batch_record(batch_id: Uuid, status: &str) -> BatchRecord {
    BatchRecord {
        id: batch_id,
        status: status.to_string(),
        settings: serde_json::json!({
            "text": "CONFIDENTIAL",
            "opacity": 0.4,
            "size": 36,
            "color": "#888888"
        }),
        mode: None,
    }
}

pub fn item(name: &str, status: &str, progress: i64) -> ItemRecord {
    ItemRecord {
        id: Uuid::new_v4(),
        name: name.to_string(),
        size: 2048,
        status: status.to_string(),
        progress: Some(progress),
        error: None,
    }
}

pub fn failed_item(name: &str, error: &str) -> ItemRecord {
    ItemRecord {
        id: Uuid::new_v4(),
        name: name.to_string(),
        size: 2048,
        status: "failed".to_string(),
        progress: None,
        error: Some(error.to_string()),
    }
}
