//! Orchestrator session
//!
//! **[BO-WF-020]** Drives one batch from "not yet started" through
//! processing to a terminal state:
//!
//! NotStarted → Starting → Running → Terminal(Completed|Failed)
//!                             ↘ Cancelling → Terminal(Failed)
//!
//! Two concurrent activities run per session: the awaited backend
//! processing trigger (unbounded duration) and the Polling Monitor. They
//! share exactly two pieces of mutable state: the cancellation token (the
//! stop flag, explicitly shared rather than captured at loop creation)
//! and the latest published snapshot, which is replaced wholesale per
//! tick. The session reaches Terminal on whichever terminal signal
//! arrives first, then stops the monitor and reconciles with one final
//! authoritative store read.
//!
//! **[BO-WF-030]** Cancellation is advisory: the backend does not support
//! preemption, so `cancel()` forces the batch to `failed` from the
//! client's point of view and stops observation, but backend-side work on
//! in-flight items may continue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;
use wtmk_common::events::{BatchStatus, BatchSummary, EventBus, WtmkEvent};

use crate::models::{Batch, Item};
use crate::services::monitor::{BatchMonitor, BatchSnapshot, MonitorConfig, MonitorHandle};
use crate::store::{BatchStore, StoreError};

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NotStarted,
    Starting,
    Running,
    Cancelling,
    Terminal(BatchStatus),
}

impl SessionState {
    /// Stable label for API responses and logs
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::NotStarted => "not_started",
            SessionState::Starting => "starting",
            SessionState::Running => "running",
            SessionState::Cancelling => "cancelling",
            SessionState::Terminal(BatchStatus::Failed) => "failed",
            SessionState::Terminal(_) => "completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Terminal(_))
    }
}

/// Fatal session errors
///
/// Only these cross the session boundary; transient fetch errors are
/// absorbed by the monitor and affect freshness, not correctness.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Batch or items could not be loaded at session start. The session
    /// never starts and has no side effects.
    #[error("Session initialization failed: {0}")]
    Initialization(String),

    /// The backend processing trigger itself failed
    #[error("Backend processing failed: {0}")]
    Processing(StoreError),
}

/// Result of a `cancel()` request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Session was Running and is now Terminal(Failed)
    Cancelled {
        items_finished: usize,
        items_abandoned: usize,
    },
    /// Session was not Running; nothing changed
    NotRunning { state: SessionState },
}

/// Orchestration session for one batch
pub struct BatchSession {
    batch_id: Uuid,
    store: Arc<dyn BatchStore>,
    event_bus: EventBus,
    config: MonitorConfig,
    state: RwLock<SessionState>,
    /// Shared stop flag, consulted by the poll loop and the trigger awaiter
    cancel_token: CancellationToken,
    /// Distinguishes user cancellation from process teardown
    cancel_requested: AtomicBool,
    /// Guards against a second `run()` re-triggering backend work
    started: AtomicBool,
    latest: Arc<RwLock<Option<BatchSnapshot>>>,
}

impl BatchSession {
    pub fn new(
        batch_id: Uuid,
        store: Arc<dyn BatchStore>,
        event_bus: EventBus,
        config: MonitorConfig,
    ) -> Self {
        Self {
            batch_id,
            store,
            event_bus,
            config,
            state: RwLock::new(SessionState::NotStarted),
            cancel_token: CancellationToken::new(),
            cancel_requested: AtomicBool::new(false),
            started: AtomicBool::new(false),
            latest: Arc::new(RwLock::new(None)),
        }
    }

    pub fn batch_id(&self) -> Uuid {
        self.batch_id
    }

    pub async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    /// Last snapshot published by this session's monitor
    pub async fn latest_snapshot(&self) -> Option<BatchSnapshot> {
        self.latest.read().await.clone()
    }

    /// Drive the batch to a terminal state
    ///
    /// Initializes from the store, triggers backend processing when the
    /// batch is still `pending` (and only then — a resumed session on an
    /// already-`processing` batch attaches a monitor without re-triggering),
    /// then awaits the first terminal signal from either the trigger call
    /// or the monitor.
    pub async fn run(&self) -> Result<BatchStatus, SessionError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(SessionError::Initialization(
                "session already started".to_string(),
            ));
        }

        // One-shot load; any failure here is fatal and side-effect free.
        let (batch, initial_items) = self.initialize().await?;

        let needs_trigger = match batch.status {
            BatchStatus::Pending => {
                *self.state.write().await = SessionState::Starting;
                true
            }
            BatchStatus::Processing => {
                info!(
                    batch_id = %self.batch_id,
                    "Attaching to already-processing batch, backend trigger skipped"
                );
                false
            }
            terminal => {
                // Nothing left to orchestrate.
                info!(batch_id = %self.batch_id, status = ?terminal, "Batch already terminal");
                *self.state.write().await = SessionState::Terminal(terminal);
                return Ok(terminal);
            }
        };

        let monitor = BatchMonitor::start(
            self.batch_id,
            self.store.clone(),
            self.event_bus.clone(),
            self.config,
            self.cancel_token.clone(),
            self.latest.clone(),
        );
        let mut terminal_watch = monitor.terminal_watch();

        *self.state.write().await = SessionState::Running;
        self.event_bus.emit_lossy(WtmkEvent::BatchSessionStarted {
            batch_id: self.batch_id,
            mode: batch.mode,
            resumed: !needs_trigger,
            timestamp: chrono::Utc::now(),
        });

        info!(
            batch_id = %self.batch_id,
            mode = ?batch.mode,
            items = initial_items.len(),
            trigger = needs_trigger,
            "Session running"
        );

        // The trigger call resolves only when the backend reports
        // batch-level completion; a resumed session substitutes a future
        // that never resolves and relies on the monitor's signal.
        let trigger_fut = async {
            if needs_trigger {
                self.store.trigger_processing(self.batch_id).await
            } else {
                futures::future::pending::<Result<(), StoreError>>().await
            }
        };
        tokio::pin!(trigger_fut);

        // Completion race: first terminal signal wins.
        let terminal_hint = tokio::select! {
            result = &mut trigger_fut => {
                match result {
                    Ok(()) => {
                        info!(batch_id = %self.batch_id, "Backend trigger resolved");
                        None
                    }
                    Err(e) => {
                        return self.fail_processing(monitor, e).await;
                    }
                }
            }
            changed = terminal_watch.changed() => {
                if changed.is_err() {
                    // Monitor exited without a terminal observation, which
                    // only happens on the stop signal.
                    return Ok(self.finish_cancelled(monitor).await);
                }
                let observed = *terminal_watch.borrow();
                info!(batch_id = %self.batch_id, status = ?observed, "Monitor observed terminal status");
                observed
            }
            _ = self.cancel_token.cancelled() => {
                return Ok(self.finish_cancelled(monitor).await);
            }
        };

        // Stop the monitor if it has not already self-terminated, then
        // reconcile the two signals against one authoritative re-read.
        monitor.stop();
        monitor.join().await;

        let final_status = self.reconcile(terminal_hint).await;
        *self.state.write().await = SessionState::Terminal(final_status);

        let summary = self.current_summary().await;
        match final_status {
            BatchStatus::Failed => {
                self.event_bus.emit_lossy(WtmkEvent::BatchSessionFailed {
                    batch_id: self.batch_id,
                    reason: "Batch reported failed by the processing backend".to_string(),
                    timestamp: chrono::Utc::now(),
                });
            }
            _ => {
                self.event_bus.emit_lossy(WtmkEvent::BatchSessionCompleted {
                    batch_id: self.batch_id,
                    mode: batch.mode,
                    summary,
                    timestamp: chrono::Utc::now(),
                });
            }
        }

        info!(batch_id = %self.batch_id, status = ?final_status, "Session terminal");
        Ok(final_status)
    }

    /// Request advisory cancellation
    ///
    /// Only effective while Running: sets the shared stop flag, forces
    /// `failed` in the Batch Store, and transitions to Terminal(Failed).
    /// In any other state this is a no-op — user intent after the fact is
    /// not a fault.
    pub async fn cancel(&self) -> CancelOutcome {
        {
            let mut state = self.state.write().await;
            if *state != SessionState::Running {
                return CancelOutcome::NotRunning { state: *state };
            }
            *state = SessionState::Cancelling;
        }

        self.cancel_requested.store(true, Ordering::SeqCst);
        self.cancel_token.cancel();

        // Force the client-observed status. Backend work on in-flight
        // items is not preempted and may continue consuming resources.
        if let Err(e) = self
            .store
            .update_batch_status(self.batch_id, BatchStatus::Failed)
            .await
        {
            warn!(
                batch_id = %self.batch_id,
                error = %e,
                "Failed to persist cancelled status to store; session is terminal regardless"
            );
        }

        *self.state.write().await = SessionState::Terminal(BatchStatus::Failed);

        let (finished, abandoned) = match self.latest_snapshot().await {
            Some(snapshot) => {
                let finished = snapshot.summary.terminal_count();
                (finished, snapshot.summary.total - finished)
            }
            None => (0, 0),
        };

        self.event_bus.emit_lossy(WtmkEvent::BatchSessionCancelled {
            batch_id: self.batch_id,
            items_finished: finished,
            items_abandoned: abandoned,
            timestamp: chrono::Utc::now(),
        });

        info!(
            batch_id = %self.batch_id,
            items_finished = finished,
            items_abandoned = abandoned,
            "Session cancelled by user"
        );

        CancelOutcome::Cancelled {
            items_finished: finished,
            items_abandoned: abandoned,
        }
    }

    /// Pause is accepted by the orchestrator boundary but has no effect:
    /// neither the backend nor the poll loop supports suspension. This is
    /// a documented limitation of the processing backend.
    pub async fn pause(&self) -> SessionState {
        warn!(
            batch_id = %self.batch_id,
            "Pause requested but not supported; processing and polling continue"
        );
        self.state().await
    }

    async fn initialize(&self) -> Result<(Batch, Vec<Item>), SessionError> {
        let batch_record = self
            .store
            .get_batch(self.batch_id)
            .await
            .map_err(|e| SessionError::Initialization(e.to_string()))?;
        let item_records = self
            .store
            .get_batch_items(self.batch_id)
            .await
            .map_err(|e| SessionError::Initialization(e.to_string()))?;

        let batch = Batch::from_record(&batch_record)
            .map_err(|e| SessionError::Initialization(e.to_string()))?;
        let items = item_records
            .iter()
            .map(Item::from_record)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| SessionError::Initialization(e.to_string()))?;

        Ok((batch, items))
    }

    /// Final authoritative re-read. A terminal status from the store wins;
    /// if the store still reports non-terminal (the trigger resolved ahead
    /// of the store's own bookkeeping), the hint from the winning signal
    /// is used, defaulting to Completed for a cleanly resolved trigger.
    async fn reconcile(&self, hint: Option<BatchStatus>) -> BatchStatus {
        let reread = match self.store.get_batch(self.batch_id).await {
            Ok(record) => Batch::from_record(&record).ok().map(|b| b.status),
            Err(e) => {
                warn!(
                    batch_id = %self.batch_id,
                    error = %e,
                    "Reconciliation re-read failed, trusting in-flight signal"
                );
                None
            }
        };

        match reread {
            Some(status) if status.is_terminal() => status,
            _ => hint.unwrap_or(BatchStatus::Completed),
        }
    }

    async fn fail_processing(
        &self,
        monitor: MonitorHandle,
        cause: StoreError,
    ) -> Result<BatchStatus, SessionError> {
        error!(batch_id = %self.batch_id, error = %cause, "Backend trigger failed");

        monitor.stop();
        monitor.join().await;
        *self.state.write().await = SessionState::Terminal(BatchStatus::Failed);

        self.event_bus.emit_lossy(WtmkEvent::BatchSessionFailed {
            batch_id: self.batch_id,
            reason: format!("Processing trigger failed: {}", cause),
            timestamp: chrono::Utc::now(),
        });

        Err(SessionError::Processing(cause))
    }

    async fn finish_cancelled(&self, monitor: MonitorHandle) -> BatchStatus {
        monitor.join().await;

        if !self.cancel_requested.load(Ordering::SeqCst) {
            // Teardown without a user cancel request: mark terminal
            // locally, leave the store untouched.
            warn!(batch_id = %self.batch_id, "Session stopped by teardown signal");
            *self.state.write().await = SessionState::Terminal(BatchStatus::Failed);
        }
        // Otherwise cancel() has already transitioned the state, updated
        // the store, and emitted BatchSessionCancelled.

        BatchStatus::Failed
    }

    async fn current_summary(&self) -> BatchSummary {
        self.latest_snapshot()
            .await
            .map(|s| s.summary)
            .unwrap_or_default()
    }
}
