//! Column encodings shared by the SQL backends.

use chrono::{DateTime, SecondsFormat, Utc};

use bankforge_types::checkpoint::CheckpointRecord;
use bankforge_types::cursor::StageCursor;
use bankforge_types::state::{RunId, RunRecord, RunStatus, StageName, StageStatus};

use crate::error::{self, StateError};

/// Column order used by every run `SELECT`.
pub(crate) const RUN_COLUMNS: &str = "run_id, status, started_at, updated_at, error_message";

/// Column order used by every checkpoint `SELECT`.
pub(crate) const CHECKPOINT_COLUMNS: &str = "run_id, stage, status, cursor, rows_committed, \
     batches_committed, skipped, error_message, updated_at";

/// A run row as read from the database, before decoding.
pub(crate) struct RawRun {
    pub run_id: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub error_message: Option<String>,
}

impl RawRun {
    pub(crate) fn decode(self) -> error::Result<RunRecord> {
        Ok(RunRecord {
            run_id: RunId::new(self.run_id),
            status: decode_run_status(&self.status)?,
            started_at: decode_ts(&self.started_at)?,
            updated_at: decode_ts(&self.updated_at)?,
            error_message: self.error_message,
        })
    }
}

/// A checkpoint row as read from the database, before decoding.
pub(crate) struct RawCheckpoint {
    pub run_id: String,
    pub stage: String,
    pub status: String,
    pub cursor: String,
    pub rows_committed: i64,
    pub batches_committed: i64,
    pub skipped: bool,
    pub error_message: Option<String>,
    pub updated_at: String,
}

impl RawCheckpoint {
    pub(crate) fn decode(self) -> error::Result<CheckpointRecord> {
        Ok(CheckpointRecord {
            run_id: RunId::new(self.run_id),
            stage: StageName::new(self.stage),
            status: decode_stage_status(&self.status)?,
            cursor: decode_cursor(&self.cursor)?,
            rows_committed: decode_count(self.rows_committed)?,
            batches_committed: decode_count(self.batches_committed)?,
            skipped: self.skipped,
            error_message: self.error_message,
            updated_at: decode_ts(&self.updated_at)?,
        })
    }
}

/// Timestamps are stored as RFC 3339 text with fixed nanosecond precision so
/// lexical order matches chronological order.
pub(crate) fn encode_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn decode_ts(raw: &str) -> error::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StateError::CorruptRecord(format!("bad timestamp '{raw}': {e}")))
}

pub(crate) fn encode_cursor(cursor: &StageCursor) -> error::Result<String> {
    Ok(serde_json::to_string(cursor)?)
}

pub(crate) fn decode_cursor(raw: &str) -> error::Result<StageCursor> {
    Ok(serde_json::from_str(raw)?)
}

pub(crate) fn decode_run_status(raw: &str) -> error::Result<RunStatus> {
    raw.parse()
        .map_err(|e: bankforge_types::state::UnknownStatus| StateError::CorruptRecord(e.to_string()))
}

pub(crate) fn decode_stage_status(raw: &str) -> error::Result<StageStatus> {
    raw.parse()
        .map_err(|e: bankforge_types::state::UnknownStatus| StateError::CorruptRecord(e.to_string()))
}

/// Counters are `u64` in memory and signed 64-bit in both databases.
#[allow(clippy::cast_possible_wrap)]
pub(crate) fn encode_count(value: u64) -> i64 {
    value as i64
}

pub(crate) fn decode_count(value: i64) -> error::Result<u64> {
    u64::try_from(value)
        .map_err(|_| StateError::CorruptRecord(format!("negative counter {value}")))
}

/// Statuses that "resume latest" may pick up.
pub(crate) const RESUMABLE_STATUSES: [RunStatus; 3] =
    [RunStatus::Running, RunStatus::Paused, RunStatus::Failed];
