use obs_domain::{ProcessingOutcome, Record, RecordType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub in_progress: bool,
    pub length: usize,
}

/// Snapshot returned by the health check
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    pub primary_queue: QueueStatus,
    pub dependent_queue: QueueStatus,
    pub staged_dependency_count: usize,
}

/// One row of the local queue summary
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueueSummaryEntry {
    pub uuid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<i64>,
    pub record_type: RecordType,
    pub processing_outcome: ProcessingOutcome,
    pub has_blocked_action: bool,
    pub is_eventually_deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wow_updated_at: Option<String>,
}

impl From<&Record> for QueueSummaryEntry {
    fn from(record: &Record) -> Self {
        Self {
            uuid: record.obs.uuid.clone(),
            remote_id: record.obs.remote_id,
            record_type: record.record_type(),
            processing_outcome: record.processing_outcome(),
            has_blocked_action: record.has_blocked_action(),
            is_eventually_deleted: record.is_eventually_deleted(),
            wow_updated_at: record.wow_meta.change.wow_updated_at.clone(),
        }
    }
}

/// Projections of the durable record store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalQueue {
    pub summary: Vec<QueueSummaryEntry>,
    /// Records the UI may show and edit: everything not currently in flight
    pub ui_visible: Vec<Record>,
}
