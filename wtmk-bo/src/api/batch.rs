//! Batch orchestration API handlers
//!
//! POST /batch/:id/start, GET /batch/:id/status, POST /batch/:id/cancel,
//! POST /batch/:id/pause

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;
use wtmk_common::events::{BatchMode, BatchStatus, BatchSummary, ItemSnapshot};

use crate::{
    error::{ApiError, ApiResult},
    models::{Batch, Item},
    services::{BatchSession, CancelOutcome, SessionError},
    AppState,
};

/// POST /batch/:id/start response
#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub batch_id: Uuid,
    pub state: &'static str,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

/// GET /batch/:id/status response
#[derive(Debug, Serialize)]
pub struct BatchStatusResponse {
    pub batch_id: Uuid,
    /// Orchestration state if a session is active in this process
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_state: Option<&'static str>,
    pub batch_status: BatchStatus,
    pub mode: BatchMode,
    pub items: Vec<ItemSnapshot>,
    pub summary: BatchSummary,
}

/// POST /batch/:id/cancel response
#[derive(Debug, Serialize)]
pub struct CancelSessionResponse {
    pub batch_id: Uuid,
    pub state: &'static str,
    pub cancelled: bool,
    pub items_finished: usize,
    pub items_abandoned: usize,
}

/// POST /batch/:id/pause response
#[derive(Debug, Serialize)]
pub struct PauseSessionResponse {
    pub batch_id: Uuid,
    pub accepted: bool,
    pub effective: bool,
    pub note: &'static str,
}

/// POST /batch/:id/start
///
/// Attach an orchestration session to the batch and drive it in a
/// background task. 409 if a non-terminal session already exists for the
/// batch in this process — together with the session's resume logic this
/// keeps the backend processing trigger at-most-once per batch.
pub async fn start_session(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
) -> ApiResult<Json<StartSessionResponse>> {
    {
        let mut sessions = state.sessions.write().await;
        if let Some(existing) = sessions.get(&batch_id) {
            if !existing.state().await.is_terminal() {
                return Err(ApiError::Conflict(format!(
                    "Session already active for batch {}",
                    batch_id
                )));
            }
        }

        let session = Arc::new(BatchSession::new(
            batch_id,
            state.store.clone(),
            state.event_bus.clone(),
            state.config.monitor_config(),
        ));
        sessions.insert(batch_id, session.clone());

        let last_error = state.last_error.clone();
        let registry = state.sessions.clone();
        tokio::spawn(async move {
            tracing::info!(batch_id = %batch_id, "Background session task started");
            match session.run().await {
                Ok(status) => {
                    tracing::info!(batch_id = %batch_id, status = ?status, "Session task finished");
                }
                Err(e) => {
                    tracing::error!(batch_id = %batch_id, error = %e, "Session task failed");
                    *last_error.write().await = Some(e.to_string());

                    // A session that never started has no side effects to
                    // keep around; evict it so a retried start is accepted
                    // instead of hitting the duplicate-session conflict.
                    if matches!(e, SessionError::Initialization(_)) {
                        let mut sessions = registry.write().await;
                        if sessions
                            .get(&batch_id)
                            .is_some_and(|s| Arc::ptr_eq(s, &session))
                        {
                            sessions.remove(&batch_id);
                        }
                    }
                }
            }
        });
    }

    tracing::info!(batch_id = %batch_id, "Orchestration session accepted");

    Ok(Json(StartSessionResponse {
        batch_id,
        state: "starting",
        started_at: chrono::Utc::now(),
    }))
}

/// GET /batch/:id/status
///
/// Latest monitor snapshot when a session is active; otherwise one
/// authoritative read from the Batch Store.
pub async fn get_status(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
) -> ApiResult<Json<BatchStatusResponse>> {
    if let Some(session) = state.session(batch_id).await {
        if let Some(snapshot) = session.latest_snapshot().await {
            // Mode comes from the store record; the snapshot does not
            // carry it, so read the cached record for labeling.
            let mode = read_mode(&state, batch_id).await;
            return Ok(Json(BatchStatusResponse {
                batch_id,
                session_state: Some(session.state().await.label()),
                batch_status: snapshot.batch_status,
                mode,
                items: snapshot.items,
                summary: snapshot.summary,
            }));
        }
        // Session accepted but no tick published yet: fall through to a
        // direct store read, keeping the session state label.
        let (batch, items, summary) = read_store(&state, batch_id).await?;
        return Ok(Json(BatchStatusResponse {
            batch_id,
            session_state: Some(session.state().await.label()),
            batch_status: batch.status,
            mode: batch.mode,
            items,
            summary,
        }));
    }

    let (batch, items, summary) = read_store(&state, batch_id).await?;
    Ok(Json(BatchStatusResponse {
        batch_id,
        session_state: None,
        batch_status: batch.status,
        mode: batch.mode,
        items,
        summary,
    }))
}

/// POST /batch/:id/cancel
///
/// Advisory cancellation. A session that is not Running reports
/// `cancelled: false` with its current state; that is a no-op, not an
/// error. Backend-side work on in-flight items is not preempted.
pub async fn cancel_session(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
) -> ApiResult<Json<CancelSessionResponse>> {
    let session = state
        .session(batch_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("No session for batch {}", batch_id)))?;

    let response = match session.cancel().await {
        CancelOutcome::Cancelled {
            items_finished,
            items_abandoned,
        } => CancelSessionResponse {
            batch_id,
            state: "failed",
            cancelled: true,
            items_finished,
            items_abandoned,
        },
        CancelOutcome::NotRunning { state } => CancelSessionResponse {
            batch_id,
            state: state.label(),
            cancelled: false,
            items_finished: 0,
            items_abandoned: 0,
        },
    };

    Ok(Json(response))
}

/// POST /batch/:id/pause
///
/// Accepted but ineffective: the backend cannot suspend work and the
/// monitor keeps observing. Documented limitation.
pub async fn pause_session(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
) -> ApiResult<Json<PauseSessionResponse>> {
    if let Some(session) = state.session(batch_id).await {
        session.pause().await;
    }

    Ok(Json(PauseSessionResponse {
        batch_id,
        accepted: true,
        effective: false,
        note: "Pause is not supported by the processing backend; processing continues",
    }))
}

async fn read_mode(state: &AppState, batch_id: Uuid) -> BatchMode {
    match state.store.get_batch(batch_id).await {
        Ok(record) => Batch::from_record(&record)
            .map(|b| b.mode)
            .unwrap_or(BatchMode::Batch),
        Err(_) => BatchMode::Batch,
    }
}

async fn read_store(
    state: &AppState,
    batch_id: Uuid,
) -> ApiResult<(Batch, Vec<ItemSnapshot>, BatchSummary)> {
    let batch_record = state.store.get_batch(batch_id).await?;
    let item_records = state.store.get_batch_items(batch_id).await?;

    let batch = Batch::from_record(&batch_record)
        .map_err(|e| ApiError::Internal(format!("Malformed batch record: {}", e)))?;
    let items: Vec<ItemSnapshot> = item_records
        .iter()
        .map(|r| Item::from_record(r).map(|i| i.snapshot()))
        .collect::<Result<_, _>>()
        .map_err(|e| ApiError::Internal(format!("Malformed item record: {}", e)))?;
    let summary = BatchSummary::aggregate(&items);

    Ok((batch, items, summary))
}

/// Build batch orchestration routes
pub fn batch_routes() -> Router<AppState> {
    Router::new()
        .route("/batch/:batch_id/start", post(start_session))
        .route("/batch/:batch_id/status", get(get_status))
        .route("/batch/:batch_id/cancel", post(cancel_session))
        .route("/batch/:batch_id/pause", post(pause_session))
}
