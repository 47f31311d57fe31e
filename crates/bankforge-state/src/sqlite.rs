//! `SQLite`-backed implementation of [`CheckpointStore`].
//!
//! Uses a single `Mutex<Connection>` for thread safety.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use bankforge_types::checkpoint::{CheckpointRecord, ClearScope};
use bankforge_types::state::{RunId, RunRecord, RunStatus, StageName};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row};

use crate::backend::CheckpointStore;
use crate::error::{self, StateError};
use crate::sql::{
    self, RawCheckpoint, RawRun, CHECKPOINT_COLUMNS, RESUMABLE_STATUSES, RUN_COLUMNS,
};

/// Idempotent DDL for the checkpoint tables.
const CREATE_TABLES: &str = r"
PRAGMA synchronous = FULL;

CREATE TABLE IF NOT EXISTS generation_runs (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL UNIQUE,
    status TEXT NOT NULL,
    started_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    error_message TEXT
);

CREATE TABLE IF NOT EXISTS stage_checkpoints (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL,
    stage TEXT NOT NULL,
    status TEXT NOT NULL,
    cursor TEXT NOT NULL,
    rows_committed INTEGER NOT NULL DEFAULT 0,
    batches_committed INTEGER NOT NULL DEFAULT 0,
    skipped INTEGER NOT NULL DEFAULT 0,
    error_message TEXT,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_checkpoints_run_stage
    ON stage_checkpoints (run_id, stage, id);
";

/// `SQLite`-backed checkpoint storage.
///
/// Create with [`SqliteCheckpointStore::open`] for file-backed persistence
/// or [`SqliteCheckpointStore::in_memory`] for tests.
pub struct SqliteCheckpointStore {
    conn: Mutex<Connection>,
}

impl SqliteCheckpointStore {
    /// Open or create a `SQLite` checkpoint database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Io`] if the directory can't be created,
    /// or [`StateError::Backend`] if the database can't be opened.
    pub fn open(path: &Path) -> error::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(|e| StateError::backend_context("open", e))?;
        Self::init(conn)
    }

    /// Create an in-memory `SQLite` store (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Backend`] if the in-memory database can't
    /// be initialized.
    pub fn in_memory() -> error::Result<Self> {
        let conn = Connection::open_in_memory().map_err(StateError::backend)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> error::Result<Self> {
        conn.execute_batch(CREATE_TABLES)
            .map_err(|e| StateError::backend_context("create tables", e))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the connection lock.
    fn lock_conn(&self) -> error::Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StateError::LockPoisoned)
    }

    fn raw_run(row: &Row<'_>) -> rusqlite::Result<RawRun> {
        Ok(RawRun {
            run_id: row.get(0)?,
            status: row.get(1)?,
            started_at: row.get(2)?,
            updated_at: row.get(3)?,
            error_message: row.get(4)?,
        })
    }

    fn raw_checkpoint(row: &Row<'_>) -> rusqlite::Result<RawCheckpoint> {
        Ok(RawCheckpoint {
            run_id: row.get(0)?,
            stage: row.get(1)?,
            status: row.get(2)?,
            cursor: row.get(3)?,
            rows_committed: row.get(4)?,
            batches_committed: row.get(5)?,
            skipped: row.get(6)?,
            error_message: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn query_checkpoints(
        conn: &Connection,
        op: &'static str,
        query: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> error::Result<Vec<CheckpointRecord>> {
        let mut stmt = conn
            .prepare(query)
            .map_err(|e| StateError::backend_context(op, e))?;
        let raws = stmt
            .query_map(params, Self::raw_checkpoint)
            .map_err(|e| StateError::backend_context(op, e))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| StateError::backend_context(op, e))?;
        raws.into_iter().map(RawCheckpoint::decode).collect()
    }

    #[cfg(test)]
    fn checkpoint_row_count(&self) -> error::Result<i64> {
        let conn = self.lock_conn()?;
        conn.query_row("SELECT COUNT(*) FROM stage_checkpoints", [], |row| {
            row.get(0)
        })
        .map_err(StateError::backend)
    }
}

impl CheckpointStore for SqliteCheckpointStore {
    fn create_run(&self, run: &RunRecord) -> error::Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO generation_runs (run_id, status, started_at, updated_at, error_message) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                run.run_id.as_str(),
                run.status.as_str(),
                sql::encode_ts(&run.started_at),
                sql::encode_ts(&run.updated_at),
                run.error_message,
            ],
        )
        .map_err(|e| StateError::backend_context("create_run", e))?;
        Ok(())
    }

    fn set_run_status(
        &self,
        run_id: &RunId,
        status: RunStatus,
        error_message: Option<&str>,
    ) -> error::Result<bool> {
        let conn = self.lock_conn()?;
        let updated = conn
            .execute(
                "UPDATE generation_runs SET status = ?1, error_message = ?2, updated_at = ?3 \
                 WHERE run_id = ?4",
                rusqlite::params![
                    status.as_str(),
                    error_message,
                    sql::encode_ts(&Utc::now()),
                    run_id.as_str(),
                ],
            )
            .map_err(|e| StateError::backend_context("set_run_status", e))?;
        Ok(updated > 0)
    }

    fn get_run(&self, run_id: &RunId) -> error::Result<Option<RunRecord>> {
        let conn = self.lock_conn()?;
        let raw = conn
            .query_row(
                &format!("SELECT {RUN_COLUMNS} FROM generation_runs WHERE run_id = ?1"),
                [run_id.as_str()],
                Self::raw_run,
            )
            .optional()
            .map_err(|e| StateError::backend_context("get_run", e))?;
        raw.map(RawRun::decode).transpose()
    }

    fn latest_resumable_run(&self) -> error::Result<Option<RunRecord>> {
        let conn = self.lock_conn()?;
        let raw = conn
            .query_row(
                &format!(
                    "SELECT {RUN_COLUMNS} FROM generation_runs \
                     WHERE status IN (?1, ?2, ?3) \
                     ORDER BY updated_at DESC, seq DESC LIMIT 1"
                ),
                rusqlite::params![
                    RESUMABLE_STATUSES[0].as_str(),
                    RESUMABLE_STATUSES[1].as_str(),
                    RESUMABLE_STATUSES[2].as_str(),
                ],
                Self::raw_run,
            )
            .optional()
            .map_err(|e| StateError::backend_context("latest_resumable_run", e))?;
        raw.map(RawRun::decode).transpose()
    }

    fn list_runs(&self, limit: usize) -> error::Result<Vec<RunRecord>> {
        let conn = self.lock_conn()?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {RUN_COLUMNS} FROM generation_runs \
                 ORDER BY updated_at DESC, seq DESC LIMIT ?1"
            ))
            .map_err(|e| StateError::backend_context("list_runs", e))?;
        let raws = stmt
            .query_map([limit], Self::raw_run)
            .map_err(|e| StateError::backend_context("list_runs", e))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| StateError::backend_context("list_runs", e))?;
        raws.into_iter().map(RawRun::decode).collect()
    }

    fn append_checkpoint(&self, record: &CheckpointRecord) -> error::Result<()> {
        let cursor = sql::encode_cursor(&record.cursor)?;
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO stage_checkpoints \
             (run_id, stage, status, cursor, rows_committed, batches_committed, skipped, \
              error_message, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
                record.run_id.as_str(),
                record.stage.as_str(),
                record.status.as_str(),
                cursor,
                sql::encode_count(record.rows_committed),
                sql::encode_count(record.batches_committed),
                record.skipped,
                record.error_message,
                sql::encode_ts(&record.updated_at),
            ],
        )
        .map_err(|e| StateError::backend_context("append_checkpoint", e))?;
        Ok(())
    }

    fn latest_checkpoint(
        &self,
        run_id: &RunId,
        stage: &StageName,
    ) -> error::Result<Option<CheckpointRecord>> {
        let conn = self.lock_conn()?;
        let raw = conn
            .query_row(
                &format!(
                    "SELECT {CHECKPOINT_COLUMNS} FROM stage_checkpoints \
                     WHERE run_id = ?1 AND stage = ?2 ORDER BY id DESC LIMIT 1"
                ),
                [run_id.as_str(), stage.as_str()],
                Self::raw_checkpoint,
            )
            .optional()
            .map_err(|e| StateError::backend_context("latest_checkpoint", e))?;
        raw.map(RawCheckpoint::decode).transpose()
    }

    fn latest_checkpoints(&self, run_id: &RunId) -> error::Result<Vec<CheckpointRecord>> {
        let conn = self.lock_conn()?;
        Self::query_checkpoints(
            &conn,
            "latest_checkpoints",
            &format!(
                "SELECT {CHECKPOINT_COLUMNS} FROM stage_checkpoints WHERE id IN \
                 (SELECT MAX(id) FROM stage_checkpoints WHERE run_id = ?1 GROUP BY stage) \
                 ORDER BY stage"
            ),
            &[&run_id.as_str()],
        )
    }

    fn checkpoint_history(
        &self,
        run_id: &RunId,
        stage: &StageName,
    ) -> error::Result<Vec<CheckpointRecord>> {
        let conn = self.lock_conn()?;
        Self::query_checkpoints(
            &conn,
            "checkpoint_history",
            &format!(
                "SELECT {CHECKPOINT_COLUMNS} FROM stage_checkpoints \
                 WHERE run_id = ?1 AND stage = ?2 ORDER BY id"
            ),
            &[&run_id.as_str(), &stage.as_str()],
        )
    }

    fn clear(&self, scope: &ClearScope) -> error::Result<u64> {
        let conn = self.lock_conn()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| StateError::backend_context("clear: begin tx", e))?;
        let removed = match scope {
            ClearScope::All => {
                tx.execute("DELETE FROM stage_checkpoints", [])
                    .map_err(|e| StateError::backend_context("clear: checkpoints", e))?;
                tx.execute("DELETE FROM generation_runs", [])
                    .map_err(|e| StateError::backend_context("clear: runs", e))?
            }
            ClearScope::Run(run_id) => {
                tx.execute(
                    "DELETE FROM stage_checkpoints WHERE run_id = ?1",
                    [run_id.as_str()],
                )
                .map_err(|e| StateError::backend_context("clear: checkpoints", e))?;
                tx.execute(
                    "DELETE FROM generation_runs WHERE run_id = ?1",
                    [run_id.as_str()],
                )
                .map_err(|e| StateError::backend_context("clear: runs", e))?
            }
        };
        tx.commit()
            .map_err(|e| StateError::backend_context("clear: commit", e))?;
        Ok(removed as u64)
    }
}
