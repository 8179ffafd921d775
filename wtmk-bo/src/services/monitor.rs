//! Polling Monitor
//!
//! **[BO-MON-010]** Background observation loop for one batch: at a fixed
//! cadence it reads batch + item records from the Batch Store, decodes and
//! aggregates them, and publishes the resulting snapshot. It stops when the
//! batch reaches a terminal status or the shared cancellation token fires.
//!
//! A failed tick (transient fetch error, timeout, malformed record) is
//! logged and skipped; the last-known-good snapshot stays published.
//! **[BO-MON-020]** Sustained failure is escalated after
//! `degraded_threshold` consecutive failed ticks via `MonitorDegraded`
//! rather than looping silently forever.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;
use wtmk_common::events::{BatchStatus, BatchSummary, EventBus, ItemSnapshot, WtmkEvent};

use crate::models::{Batch, DecodeError, Item};
use crate::store::{BatchStore, StoreError};

/// Monitor policy knobs, resolved from `BoConfig`
#[derive(Debug, Clone, Copy)]
pub struct MonitorConfig {
    /// Poll cadence. Clamped to `MIN_POLL_INTERVAL` at config load so the
    /// store is never flooded.
    pub poll_interval: Duration,
    /// Upper bound for one tick's fetch work; exceeding it is a transient
    /// failure, not a stop condition.
    pub tick_timeout: Duration,
    /// Consecutive failed ticks before a `MonitorDegraded` event
    pub degraded_threshold: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
            tick_timeout: Duration::from_millis(5000),
            degraded_threshold: 3,
        }
    }
}

/// One published observation of a batch
#[derive(Debug, Clone)]
pub struct BatchSnapshot {
    pub batch_status: BatchStatus,
    pub items: Vec<ItemSnapshot>,
    pub summary: BatchSummary,
    pub taken_at: chrono::DateTime<chrono::Utc>,
}

/// Why a single tick failed
#[derive(Debug, Error)]
enum TickError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("Tick deadline exceeded ({0:?})")]
    Timeout(Duration),
}

/// Handle to a running monitor task
///
/// `stop()` is idempotent: cancelling an already-cancelled token (or one
/// whose loop self-terminated on a terminal status) is a no-op.
pub struct MonitorHandle {
    token: CancellationToken,
    terminal_rx: watch::Receiver<Option<BatchStatus>>,
    latest: Arc<RwLock<Option<BatchSnapshot>>>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Request the poll loop to stop
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Watch channel that flips to `Some(status)` when the monitor
    /// observes a terminal batch status
    pub fn terminal_watch(&self) -> watch::Receiver<Option<BatchStatus>> {
        self.terminal_rx.clone()
    }

    /// Last successfully published snapshot
    pub async fn latest(&self) -> Option<BatchSnapshot> {
        self.latest.read().await.clone()
    }

    /// Wait for the poll loop to exit
    pub async fn join(self) {
        let _ = self.task.await;
    }
}

/// Polling monitor for one batch
pub struct BatchMonitor;

impl BatchMonitor {
    /// Start the recurring observation loop
    ///
    /// `token` is the session's stop flag, shared with the cancellation
    /// path; `latest` is the shared last-known-good slot the session (and
    /// the status API) reads from.
    pub fn start(
        batch_id: Uuid,
        store: Arc<dyn BatchStore>,
        event_bus: EventBus,
        config: MonitorConfig,
        token: CancellationToken,
        latest: Arc<RwLock<Option<BatchSnapshot>>>,
    ) -> MonitorHandle {
        let (terminal_tx, terminal_rx) = watch::channel(None);

        let loop_token = token.clone();
        let loop_latest = latest.clone();
        let task = tokio::spawn(async move {
            poll_loop(
                batch_id,
                store,
                event_bus,
                config,
                loop_token,
                loop_latest,
                terminal_tx,
            )
            .await;
        });

        MonitorHandle {
            token,
            terminal_rx,
            latest,
            task,
        }
    }
}

async fn poll_loop(
    batch_id: Uuid,
    store: Arc<dyn BatchStore>,
    event_bus: EventBus,
    config: MonitorConfig,
    token: CancellationToken,
    latest: Arc<RwLock<Option<BatchSnapshot>>>,
    terminal_tx: watch::Sender<Option<BatchStatus>>,
) {
    let mut interval = time::interval(config.poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut consecutive_failures: u32 = 0;
    let mut degradation_reported = false;

    info!(
        batch_id = %batch_id,
        interval_ms = config.poll_interval.as_millis() as u64,
        "Batch monitor started"
    );

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                info!(batch_id = %batch_id, "Batch monitor stopped by session");
                break;
            }

            _ = interval.tick() => {
                match run_tick(batch_id, store.as_ref(), config.tick_timeout).await {
                    Ok(snapshot) => {
                        consecutive_failures = 0;
                        degradation_reported = false;

                        let terminal = snapshot.batch_status.is_terminal();
                        publish(&event_bus, batch_id, &snapshot, &latest).await;

                        if terminal {
                            info!(
                                batch_id = %batch_id,
                                status = ?snapshot.batch_status,
                                "Terminal batch status observed, monitor self-terminating"
                            );
                            let _ = terminal_tx.send(Some(snapshot.batch_status));
                            break;
                        }
                    }
                    Err(e) => {
                        consecutive_failures += 1;
                        warn!(
                            batch_id = %batch_id,
                            consecutive_failures,
                            error = %e,
                            "Poll tick failed, retaining last-known-good state"
                        );

                        if consecutive_failures >= config.degraded_threshold
                            && !degradation_reported
                        {
                            degradation_reported = true;
                            event_bus.emit_lossy(WtmkEvent::MonitorDegraded {
                                batch_id,
                                consecutive_failures,
                                last_error: e.to_string(),
                                timestamp: chrono::Utc::now(),
                            });
                        }
                    }
                }
            }
        }
    }
}

/// One fetch-decode-aggregate cycle
///
/// The two store reads are awaited in sequence within the tick, so a
/// slower, staler read can never be applied over a fresher one; every
/// successful tick replaces the published snapshot wholesale.
async fn run_tick(
    batch_id: Uuid,
    store: &dyn BatchStore,
    tick_timeout: Duration,
) -> Result<BatchSnapshot, TickError> {
    let fetched = time::timeout(tick_timeout, async {
        let batch_record = store.get_batch(batch_id).await?;
        let item_records = store.get_batch_items(batch_id).await?;
        Ok::<_, StoreError>((batch_record, item_records))
    })
    .await
    .map_err(|_| TickError::Timeout(tick_timeout))?;

    let (batch_record, item_records) = fetched?;

    let batch = Batch::from_record(&batch_record)?;
    let items: Vec<ItemSnapshot> = item_records
        .iter()
        .map(|r| Item::from_record(r).map(|i| i.snapshot()))
        .collect::<Result<_, _>>()?;
    let summary = BatchSummary::aggregate(&items);

    debug!(
        batch_id = %batch_id,
        status = ?batch.status,
        progress = summary.overall_progress,
        "Poll tick succeeded"
    );

    Ok(BatchSnapshot {
        batch_status: batch.status,
        items,
        summary,
        taken_at: chrono::Utc::now(),
    })
}

async fn publish(
    event_bus: &EventBus,
    batch_id: Uuid,
    snapshot: &BatchSnapshot,
    latest: &Arc<RwLock<Option<BatchSnapshot>>>,
) {
    *latest.write().await = Some(snapshot.clone());
    event_bus.emit_lossy(WtmkEvent::BatchProgressUpdate {
        batch_id,
        batch_status: snapshot.batch_status,
        items: snapshot.items.clone(),
        summary: snapshot.summary,
        timestamp: snapshot.taken_at,
    });
}
