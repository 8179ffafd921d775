//! Item Progress Model
//!
//! **[BO-WF-011]** Typed batch/item state decoded from raw Batch Store
//! records. Pure translation: no side effects, malformed input is rejected
//! with `DecodeError`.

use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;
use wtmk_common::events::{BatchMode, BatchStatus, ItemSnapshot, ItemStatus};

use crate::store::{BatchRecord, ItemRecord};

/// Record translation errors
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Batch status string not in the store's vocabulary
    #[error("Unknown batch status: {0:?}")]
    UnknownBatchStatus(String),

    /// Item status string not in the store's vocabulary
    #[error("Unknown item status: {0:?}")]
    UnknownItemStatus(String),

    /// Unknown batch mode string
    #[error("Unknown batch mode: {0:?}")]
    UnknownMode(String),

    /// Item progress outside [0, 100]
    #[error("Item progress out of range: {0}")]
    ProgressOutOfRange(i64),
}

/// Orchestrator-side cached copy of a batch record
///
/// The authoritative copy lives in the Batch Store; this cache is
/// refreshed on every monitor tick. `settings` is the opaque watermark
/// configuration (text, opacity, size, color) passed through to the
/// backend and never interpreted here.
#[derive(Debug, Clone)]
pub struct Batch {
    pub id: Uuid,
    pub status: BatchStatus,
    pub settings: Value,
    pub mode: BatchMode,
}

impl Batch {
    /// Translate a raw store record into the typed model
    pub fn from_record(record: &BatchRecord) -> Result<Self, DecodeError> {
        let status = parse_batch_status(&record.status)?;
        let mode = match record.mode.as_deref() {
            None | Some("batch") => BatchMode::Batch,
            Some("single") => BatchMode::Single,
            Some(other) => return Err(DecodeError::UnknownMode(other.to_string())),
        };

        Ok(Self {
            id: record.id,
            status,
            settings: record.settings.clone(),
            mode,
        })
    }
}

/// One document within a batch
#[derive(Debug, Clone)]
pub struct Item {
    pub id: Uuid,
    pub name: String,
    pub size: u64,
    pub status: ItemStatus,
    pub progress: u8,
    pub error: Option<String>,
}

impl Item {
    /// Translate a raw store record into the typed model
    ///
    /// Progress is only meaningful while processing: a completed item is
    /// normalized to 100 regardless of what the store last wrote, and
    /// queued/failed items are normalized to 0.
    pub fn from_record(record: &ItemRecord) -> Result<Self, DecodeError> {
        let status = match record.status.as_str() {
            "queued" => ItemStatus::Queued,
            "processing" => ItemStatus::Processing,
            "completed" => ItemStatus::Completed,
            "failed" => ItemStatus::Failed,
            other => return Err(DecodeError::UnknownItemStatus(other.to_string())),
        };

        let raw = record.progress.unwrap_or(0);
        if !(0..=100).contains(&raw) {
            return Err(DecodeError::ProgressOutOfRange(raw));
        }
        let progress = match status {
            ItemStatus::Completed => 100,
            ItemStatus::Processing => raw as u8,
            ItemStatus::Queued | ItemStatus::Failed => 0,
        };

        Ok(Self {
            id: record.id,
            name: record.name.clone(),
            size: record.size,
            status,
            progress,
            error: if status == ItemStatus::Failed {
                record.error.clone()
            } else {
                None
            },
        })
    }

    /// Snapshot form used in published progress updates
    pub fn snapshot(&self) -> ItemSnapshot {
        ItemSnapshot {
            id: self.id,
            name: self.name.clone(),
            size: self.size,
            status: self.status,
            progress: self.progress,
            error: self.error.clone(),
        }
    }
}

fn parse_batch_status(raw: &str) -> Result<BatchStatus, DecodeError> {
    match raw {
        "pending" => Ok(BatchStatus::Pending),
        "processing" => Ok(BatchStatus::Processing),
        "completed" => Ok(BatchStatus::Completed),
        "failed" => Ok(BatchStatus::Failed),
        other => Err(DecodeError::UnknownBatchStatus(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn batch_record(status: &str) -> BatchRecord {
        BatchRecord {
            id: Uuid::new_v4(),
            status: status.to_string(),
            settings: json!({"text": "CONFIDENTIAL", "opacity": 0.4}),
            mode: None,
        }
    }

    fn item_record(status: &str, progress: Option<i64>) -> ItemRecord {
        ItemRecord {
            id: Uuid::new_v4(),
            name: "report.pdf".to_string(),
            size: 4096,
            status: status.to_string(),
            progress,
            error: None,
        }
    }

    #[test]
    fn decodes_all_batch_statuses() {
        for (raw, expected) in [
            ("pending", BatchStatus::Pending),
            ("processing", BatchStatus::Processing),
            ("completed", BatchStatus::Completed),
            ("failed", BatchStatus::Failed),
        ] {
            let batch = Batch::from_record(&batch_record(raw)).unwrap();
            assert_eq!(batch.status, expected);
        }
    }

    #[test]
    fn unknown_batch_status_is_rejected() {
        let err = Batch::from_record(&batch_record("paused")).unwrap_err();
        assert!(matches!(err, DecodeError::UnknownBatchStatus(_)));
    }

    #[test]
    fn settings_pass_through_unmodified() {
        let record = batch_record("pending");
        let batch = Batch::from_record(&record).unwrap();
        assert_eq!(batch.settings, record.settings);
    }

    #[test]
    fn mode_defaults_to_batch() {
        let batch = Batch::from_record(&batch_record("pending")).unwrap();
        assert_eq!(batch.mode, BatchMode::Batch);

        let mut record = batch_record("pending");
        record.mode = Some("single".to_string());
        let batch = Batch::from_record(&record).unwrap();
        assert_eq!(batch.mode, BatchMode::Single);
    }

    #[test]
    fn completed_item_normalizes_progress_to_100() {
        let item = Item::from_record(&item_record("completed", Some(73))).unwrap();
        assert_eq!(item.status, ItemStatus::Completed);
        assert_eq!(item.progress, 100);
    }

    #[test]
    fn processing_item_keeps_reported_progress() {
        let item = Item::from_record(&item_record("processing", Some(40))).unwrap();
        assert_eq!(item.progress, 40);
    }

    #[test]
    fn out_of_range_progress_is_rejected() {
        let err = Item::from_record(&item_record("processing", Some(140))).unwrap_err();
        assert!(matches!(err, DecodeError::ProgressOutOfRange(140)));
        let err = Item::from_record(&item_record("processing", Some(-5))).unwrap_err();
        assert!(matches!(err, DecodeError::ProgressOutOfRange(-5)));
    }

    #[test]
    fn error_message_only_survives_on_failed_items() {
        let mut record = item_record("completed", Some(100));
        record.error = Some("stale error from a retry".to_string());
        let item = Item::from_record(&record).unwrap();
        assert_eq!(item.error, None);

        let mut record = item_record("failed", None);
        record.error = Some("corrupt page".to_string());
        let item = Item::from_record(&record).unwrap();
        assert_eq!(item.error.as_deref(), Some("corrupt page"));
    }

    #[test]
    fn unknown_item_status_is_rejected() {
        let err = Item::from_record(&item_record("uploading", None)).unwrap_err();
        assert!(matches!(err, DecodeError::UnknownItemStatus(_)));
    }
}
