use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::error::PulseError;
use crate::model::{ColorRecord, ProcessingType};

/// Acknowledgement for one committed batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitReceipt {
    pub processing_type: ProcessingType,
    pub records_written: usize,
    pub committed_at: DateTime<Utc>,
}

/// Destination for processed colors.
///
/// `append` stamps every record with `processing_type` and the commit time
/// before storing it. `read_all` returns records in commit order; with a
/// limit, only the most recent `limit` are returned.
pub trait OutputSink: Send + Sync {
    fn append(
        &self,
        records: &[ColorRecord],
        processing_type: ProcessingType,
    ) -> Result<CommitReceipt, PulseError>;

    fn read_all(&self, limit: Option<usize>) -> Result<Vec<ColorRecord>, PulseError>;
}

/// Copy `records`, stamped for a commit made at `at`.
pub fn stamped(
    records: &[ColorRecord],
    processing_type: ProcessingType,
    at: DateTime<Utc>,
) -> Vec<ColorRecord> {
    records
        .iter()
        .cloned()
        .map(|mut r| {
            r.stamp(processing_type, at);
            r
        })
        .collect()
}

/// Keep the last `limit` items (all of them when `limit` is `None`).
pub fn tail<T>(mut items: Vec<T>, limit: Option<usize>) -> Vec<T> {
    if let Some(limit) = limit {
        if items.len() > limit {
            items.drain(..items.len() - limit);
        }
    }
    items
}

/// In-process sink, used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<ColorRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl OutputSink for MemorySink {
    fn append(
        &self,
        records: &[ColorRecord],
        processing_type: ProcessingType,
    ) -> Result<CommitReceipt, PulseError> {
        let committed_at = Utc::now();
        let batch = stamped(records, processing_type, committed_at);
        self.records.lock().extend(batch);
        Ok(CommitReceipt {
            processing_type,
            records_written: records.len(),
            committed_at,
        })
    }

    fn read_all(&self, limit: Option<usize>) -> Result<Vec<ColorRecord>, PulseError> {
        Ok(tail(self.records.lock().clone(), limit))
    }
}
