//! Batch lifecycle type definitions
//!
//! Supporting types for wtmk-bo batch progress tracking. These live in the
//! common crate so event payloads and service models share one vocabulary.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// **[BO-WF-010]** Batch lifecycle state
///
/// The authoritative copy lives in the Batch Store; orchestrator-side
/// copies are caches refreshed by polling. `Completed` and `Failed` are
/// terminal: once reported, the store never changes them again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    /// Created, processing not yet triggered
    Pending,
    /// Backend is working through the items
    Processing,
    /// All items reached a terminal state, batch succeeded
    Completed,
    /// Batch failed or was cancelled by the user
    Failed,
}

impl BatchStatus {
    /// Terminal states never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchStatus::Completed | BatchStatus::Failed)
    }
}

/// **[BO-WF-011]** Per-item lifecycle state
///
/// Transitions are forward-only: queued → processing → {completed, failed}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl ItemStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemStatus::Completed | ItemStatus::Failed)
    }
}

/// Presentation mode for a batch
///
/// `Single` is a batch of exactly one document. The distinction only
/// affects labeling and navigation in clients, never orchestrator control
/// flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchMode {
    Batch,
    Single,
}

/// One item's observed state, as published on each monitor tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSnapshot {
    /// Item identifier, unique within its batch
    pub id: Uuid,
    /// Original document name
    pub name: String,
    /// Document size in bytes
    pub size: u64,
    /// Current lifecycle state
    pub status: ItemStatus,
    /// Percent complete (0-100), meaningful only while processing;
    /// 100 once completed
    pub progress: u8,
    /// Failure message, present only when status is `failed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// **[BO-AGG-010]** Aggregated view of a batch's items
///
/// `overall_progress` counts whole items that reached a terminal state; a
/// half-processed item contributes nothing until it completes or fails.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Percentage of items in a terminal state (0.0 - 100.0)
    pub overall_progress: f64,
    /// Items completed successfully
    pub completed: usize,
    /// Items that failed
    pub failed: usize,
    /// Items still queued or processing
    pub remaining: usize,
    /// Total items in the batch
    pub total: usize,
}

impl BatchSummary {
    /// Aggregate item snapshots into a summary
    ///
    /// Pure and order-independent: permuting the input yields an identical
    /// summary, and repeated calls with the same input are idempotent.
    /// An empty item set yields zero progress (never divides by zero).
    pub fn aggregate(items: &[ItemSnapshot]) -> Self {
        let total = items.len();
        let completed = items
            .iter()
            .filter(|i| i.status == ItemStatus::Completed)
            .count();
        let failed = items
            .iter()
            .filter(|i| i.status == ItemStatus::Failed)
            .count();
        let remaining = total - completed - failed;

        let overall_progress = if total > 0 {
            (completed + failed) as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        Self {
            overall_progress,
            completed,
            failed,
            remaining,
            total,
        }
    }

    /// Count of items in a terminal state
    pub fn terminal_count(&self) -> usize {
        self.completed + self.failed
    }
}

impl Default for BatchSummary {
    fn default() -> Self {
        Self {
            overall_progress: 0.0,
            completed: 0,
            failed: 0,
            remaining: 0,
            total: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(status: ItemStatus, progress: u8) -> ItemSnapshot {
        ItemSnapshot {
            id: Uuid::new_v4(),
            name: "doc.pdf".to_string(),
            size: 1024,
            status,
            progress,
            error: None,
        }
    }

    #[test]
    fn aggregate_empty_set_is_all_zeros() {
        let summary = BatchSummary::aggregate(&[]);
        assert_eq!(summary.overall_progress, 0.0);
        assert_eq!(summary.completed, 0);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.remaining, 0);
        assert_eq!(summary.total, 0);
    }

    #[test]
    fn aggregate_counts_only_terminal_items() {
        // One completed, one failed, one still processing at 40%:
        // the in-flight item contributes nothing to overall progress.
        let items = vec![
            item(ItemStatus::Completed, 100),
            item(ItemStatus::Failed, 0),
            item(ItemStatus::Processing, 40),
        ];
        let summary = BatchSummary::aggregate(&items);
        assert!((summary.overall_progress - 66.666).abs() < 0.01);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.remaining, 1);
        assert_eq!(summary.total, 3);
    }

    #[test]
    fn aggregate_all_queued_is_zero_progress() {
        let items = vec![
            item(ItemStatus::Queued, 0),
            item(ItemStatus::Queued, 0),
            item(ItemStatus::Queued, 0),
        ];
        let summary = BatchSummary::aggregate(&items);
        assert_eq!(summary.overall_progress, 0.0);
        assert_eq!(summary.remaining, 3);
    }

    #[test]
    fn aggregate_is_order_independent() {
        let mut items = vec![
            item(ItemStatus::Completed, 100),
            item(ItemStatus::Processing, 75),
            item(ItemStatus::Failed, 0),
            item(ItemStatus::Queued, 0),
        ];
        let forward = BatchSummary::aggregate(&items);
        items.reverse();
        let reversed = BatchSummary::aggregate(&items);
        assert_eq!(forward, reversed);
    }

    #[test]
    fn aggregate_is_idempotent() {
        let items = vec![item(ItemStatus::Completed, 100), item(ItemStatus::Queued, 0)];
        assert_eq!(
            BatchSummary::aggregate(&items),
            BatchSummary::aggregate(&items)
        );
    }

    #[test]
    fn aggregate_stays_in_range_for_any_mix() {
        for completed in 0..4usize {
            for failed in 0..4usize {
                let mut items = Vec::new();
                items.extend((0..completed).map(|_| item(ItemStatus::Completed, 100)));
                items.extend((0..failed).map(|_| item(ItemStatus::Failed, 0)));
                items.push(item(ItemStatus::Processing, 50));
                let summary = BatchSummary::aggregate(&items);
                assert!(summary.overall_progress >= 0.0);
                assert!(summary.overall_progress <= 100.0);
                assert!(summary.terminal_count() <= summary.total);
            }
        }
    }

    #[test]
    fn fully_terminal_batch_reports_one_hundred_percent() {
        let items = vec![
            item(ItemStatus::Completed, 100),
            item(ItemStatus::Failed, 0),
        ];
        let summary = BatchSummary::aggregate(&items);
        assert_eq!(summary.overall_progress, 100.0);
        assert_eq!(summary.remaining, 0);
    }

    #[test]
    fn status_terminality() {
        assert!(BatchStatus::Completed.is_terminal());
        assert!(BatchStatus::Failed.is_terminal());
        assert!(!BatchStatus::Pending.is_terminal());
        assert!(!BatchStatus::Processing.is_terminal());
        assert!(ItemStatus::Completed.is_terminal());
        assert!(!ItemStatus::Queued.is_terminal());
    }
}
