//! Checkpoint records: one append-only entry per stage transition or
//! committed batch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cursor::StageCursor;
use crate::state::{RunId, StageName, StageStatus};

/// A single checkpoint entry for `(run_id, stage)`.
///
/// The store keeps every entry; the most recently appended one decides
/// how the stage resumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub run_id: RunId,
    pub stage: StageName,
    pub status: StageStatus,
    pub cursor: StageCursor,
    /// Rows committed by this stage in this run so far.
    pub rows_committed: u64,
    /// Batches committed by this stage in this run so far.
    pub batches_committed: u64,
    /// Set when the stage was marked completed without being executed.
    #[serde(default)]
    pub skipped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl CheckpointRecord {
    /// First record for a stage that is being entered.
    #[must_use]
    pub fn entered(run_id: RunId, stage: StageName) -> Self {
        Self {
            run_id,
            stage,
            status: StageStatus::InProgress,
            cursor: StageCursor::Start,
            rows_committed: 0,
            batches_committed: 0,
            skipped: false,
            error_message: None,
            updated_at: Utc::now(),
        }
    }

    /// Derive the next record from this one with a new status.
    ///
    /// Cursor and counters carry over; the error message is cleared.
    #[must_use]
    pub fn transition(&self, status: StageStatus) -> Self {
        Self {
            status,
            error_message: None,
            updated_at: Utc::now(),
            ..self.clone()
        }
    }

    /// Whether this record shows any committed work.
    #[must_use]
    pub fn has_progress(&self) -> bool {
        self.batches_committed > 0 || self.status == StageStatus::Completed
    }
}

/// What a history purge removes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearScope {
    /// Every run and every checkpoint.
    All,
    /// One run and its checkpoints.
    Run(RunId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entered_record_starts_at_beginning() {
        let rec = CheckpointRecord::entered(RunId::new("r"), StageName::new("customer"));
        assert_eq!(rec.status, StageStatus::InProgress);
        assert!(rec.cursor.is_start());
        assert_eq!(rec.rows_committed, 0);
        assert!(!rec.has_progress());
    }

    #[test]
    fn transition_keeps_cursor_and_counters() {
        let mut rec = CheckpointRecord::entered(RunId::new("r"), StageName::new("customer"));
        rec.cursor = StageCursor::offset(300);
        rec.rows_committed = 300;
        rec.batches_committed = 3;
        rec.error_message = Some("boom".into());

        let next = rec.transition(StageStatus::Completed);
        assert_eq!(next.status, StageStatus::Completed);
        assert_eq!(next.cursor, StageCursor::offset(300));
        assert_eq!(next.rows_committed, 300);
        assert_eq!(next.batches_committed, 3);
        assert!(next.error_message.is_none());
    }

    #[test]
    fn completed_skip_counts_as_progress() {
        let rec = CheckpointRecord::entered(RunId::new("r"), StageName::new("product"))
            .transition(StageStatus::Completed);
        assert!(rec.has_progress());
    }
}
