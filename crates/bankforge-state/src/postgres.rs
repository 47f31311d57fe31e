//! `PostgreSQL`-backed implementation of [`CheckpointStore`].
//!
//! Uses the sync `postgres` crate with a single `Mutex<Client>` for
//! thread safety. The `postgres` crate manages its own internal tokio
//! runtime, so this works from any thread.

use std::sync::{Mutex, MutexGuard};

use bankforge_types::checkpoint::{CheckpointRecord, ClearScope};
use bankforge_types::state::{RunId, RunRecord, RunStatus, StageName};
use chrono::Utc;
use postgres::{Client, NoTls, Row};

use crate::backend::CheckpointStore;
use crate::error::{self, StateError};
use crate::sql::{
    self, RawCheckpoint, RawRun, CHECKPOINT_COLUMNS, RESUMABLE_STATUSES, RUN_COLUMNS,
};

/// Idempotent DDL for the checkpoint tables (`PostgreSQL` dialect).
const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS generation_runs (
    seq BIGSERIAL PRIMARY KEY,
    run_id TEXT NOT NULL UNIQUE,
    status TEXT NOT NULL,
    started_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    error_message TEXT
);

CREATE TABLE IF NOT EXISTS stage_checkpoints (
    id BIGSERIAL PRIMARY KEY,
    run_id TEXT NOT NULL,
    stage TEXT NOT NULL,
    status TEXT NOT NULL,
    cursor TEXT NOT NULL,
    rows_committed BIGINT NOT NULL DEFAULT 0,
    batches_committed BIGINT NOT NULL DEFAULT 0,
    skipped BOOLEAN NOT NULL DEFAULT FALSE,
    error_message TEXT,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_checkpoints_run_stage
    ON stage_checkpoints (run_id, stage, id);
";

/// `PostgreSQL`-backed checkpoint storage.
///
/// Create with [`PostgresCheckpointStore::open`] providing a libpq-style
/// connection string (e.g. `"host=localhost dbname=bankforge user=postgres"`).
pub struct PostgresCheckpointStore {
    client: Mutex<Client>,
}

impl PostgresCheckpointStore {
    /// Connect to a `PostgreSQL` database and initialize checkpoint tables.
    ///
    /// `connstr` is a libpq-style connection string or `PostgreSQL` URI:
    /// - `"host=localhost port=5432 dbname=bankforge user=postgres"`
    /// - `"postgresql://postgres@localhost/bankforge"`
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Backend`] if connection or DDL execution fails.
    pub fn open(connstr: &str) -> error::Result<Self> {
        let mut client =
            Client::connect(connstr, NoTls).map_err(|e| StateError::backend_context("connect", e))?;
        client
            .batch_execute(CREATE_TABLES)
            .map_err(|e| StateError::backend_context("create tables", e))?;
        Ok(Self {
            client: Mutex::new(client),
        })
    }

    /// Acquire the client lock.
    fn lock_client(&self) -> error::Result<MutexGuard<'_, Client>> {
        self.client.lock().map_err(|_| StateError::LockPoisoned)
    }

    fn raw_run(row: &Row) -> RawRun {
        RawRun {
            run_id: row.get(0),
            status: row.get(1),
            started_at: row.get(2),
            updated_at: row.get(3),
            error_message: row.get(4),
        }
    }

    fn raw_checkpoint(row: &Row) -> RawCheckpoint {
        RawCheckpoint {
            run_id: row.get(0),
            stage: row.get(1),
            status: row.get(2),
            cursor: row.get(3),
            rows_committed: row.get(4),
            batches_committed: row.get(5),
            skipped: row.get(6),
            error_message: row.get(7),
            updated_at: row.get(8),
        }
    }

    fn decode_runs(rows: &[Row]) -> error::Result<Vec<RunRecord>> {
        rows.iter().map(|r| Self::raw_run(r).decode()).collect()
    }

    fn decode_checkpoints(rows: &[Row]) -> error::Result<Vec<CheckpointRecord>> {
        rows.iter()
            .map(|r| Self::raw_checkpoint(r).decode())
            .collect()
    }
}

impl CheckpointStore for PostgresCheckpointStore {
    fn create_run(&self, run: &RunRecord) -> error::Result<()> {
        let mut client = self.lock_client()?;
        client
            .execute(
                "INSERT INTO generation_runs (run_id, status, started_at, updated_at, error_message) \
                 VALUES ($1, $2, $3, $4, $5)",
                &[
                    &run.run_id.as_str(),
                    &run.status.as_str(),
                    &sql::encode_ts(&run.started_at),
                    &sql::encode_ts(&run.updated_at),
                    &run.error_message,
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
        let mut client = self.lock_client()?;
        let updated = client
            .execute(
                "UPDATE generation_runs SET status = $1, error_message = $2, updated_at = $3 \
                 WHERE run_id = $4",
                &[
                    &status.as_str(),
                    &error_message,
                    &sql::encode_ts(&Utc::now()),
                    &run_id.as_str(),
                ],
            )
            .map_err(|e| StateError::backend_context("set_run_status", e))?;
        Ok(updated > 0)
    }

    fn get_run(&self, run_id: &RunId) -> error::Result<Option<RunRecord>> {
        let mut client = self.lock_client()?;
        let rows = client
            .query(
                &format!("SELECT {RUN_COLUMNS} FROM generation_runs WHERE run_id = $1"),
                &[&run_id.as_str()],
            )
            .map_err(|e| StateError::backend_context("get_run", e))?;
        rows.first()
            .map(|r| Self::raw_run(r).decode())
            .transpose()
    }

    fn latest_resumable_run(&self) -> error::Result<Option<RunRecord>> {
        let mut client = self.lock_client()?;
        let rows = client
            .query(
                &format!(
                    "SELECT {RUN_COLUMNS} FROM generation_runs \
                     WHERE status IN ($1, $2, $3) \
                     ORDER BY updated_at DESC, seq DESC LIMIT 1"
                ),
                &[
                    &RESUMABLE_STATUSES[0].as_str(),
                    &RESUMABLE_STATUSES[1].as_str(),
                    &RESUMABLE_STATUSES[2].as_str(),
                ],
            )
            .map_err(|e| StateError::backend_context("latest_resumable_run", e))?;
        rows.first()
            .map(|r| Self::raw_run(r).decode())
            .transpose()
    }

    fn list_runs(&self, limit: usize) -> error::Result<Vec<RunRecord>> {
        let mut client = self.lock_client()?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = client
            .query(
                &format!(
                    "SELECT {RUN_COLUMNS} FROM generation_runs \
                     ORDER BY updated_at DESC, seq DESC LIMIT $1"
                ),
                &[&limit],
            )
            .map_err(|e| StateError::backend_context("list_runs", e))?;
        Self::decode_runs(&rows)
    }

    fn append_checkpoint(&self, record: &CheckpointRecord) -> error::Result<()> {
        let cursor = sql::encode_cursor(&record.cursor)?;
        let mut client = self.lock_client()?;
        client
            .execute(
                "INSERT INTO stage_checkpoints \
                 (run_id, stage, status, cursor, rows_committed, batches_committed, skipped, \
                  error_message, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
                &[
                    &record.run_id.as_str(),
                    &record.stage.as_str(),
                    &record.status.as_str(),
                    &cursor,
                    &sql::encode_count(record.rows_committed),
                    &sql::encode_count(record.batches_committed),
                    &record.skipped,
                    &record.error_message,
                    &sql::encode_ts(&record.updated_at),
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
        let mut client = self.lock_client()?;
        let rows = client
            .query(
                &format!(
                    "SELECT {CHECKPOINT_COLUMNS} FROM stage_checkpoints \
                     WHERE run_id = $1 AND stage = $2 ORDER BY id DESC LIMIT 1"
                ),
                &[&run_id.as_str(), &stage.as_str()],
            )
            .map_err(|e| StateError::backend_context("latest_checkpoint", e))?;
        rows.first()
            .map(|r| Self::raw_checkpoint(r).decode())
            .transpose()
    }

    fn latest_checkpoints(&self, run_id: &RunId) -> error::Result<Vec<CheckpointRecord>> {
        let mut client = self.lock_client()?;
        let rows = client
            .query(
                &format!(
                    "SELECT {CHECKPOINT_COLUMNS} FROM stage_checkpoints WHERE id IN \
                     (SELECT MAX(id) FROM stage_checkpoints WHERE run_id = $1 GROUP BY stage) \
                     ORDER BY stage"
                ),
                &[&run_id.as_str()],
            )
            .map_err(|e| StateError::backend_context("latest_checkpoints", e))?;
        Self::decode_checkpoints(&rows)
    }

    fn checkpoint_history(
        &self,
        run_id: &RunId,
        stage: &StageName,
    ) -> error::Result<Vec<CheckpointRecord>> {
        let mut client = self.lock_client()?;
        let rows = client
            .query(
                &format!(
                    "SELECT {CHECKPOINT_COLUMNS} FROM stage_checkpoints \
                     WHERE run_id = $1 AND stage = $2 ORDER BY id"
                ),
                &[&run_id.as_str(), &stage.as_str()],
            )
            .map_err(|e| StateError::backend_context("checkpoint_history", e))?;
        Self::decode_checkpoints(&rows)
    }

    fn clear(&self, scope: &ClearScope) -> error::Result<u64> {
        let mut client = self.lock_client()?;
        let mut tx = client
            .transaction()
            .map_err(|e| StateError::backend_context("clear: begin tx", e))?;
        let removed = match scope {
            ClearScope::All => {
                tx.execute("DELETE FROM stage_checkpoints", &[])
                    .map_err(|e| StateError::backend_context("clear: checkpoints", e))?;
                tx.execute("DELETE FROM generation_runs", &[])
                    .map_err(|e| StateError::backend_context("clear: runs", e))?
            }
            ClearScope::Run(run_id) => {
                tx.execute(
                    "DELETE FROM stage_checkpoints WHERE run_id = $1",
                    &[&run_id.as_str()],
                )
                .map_err(|e| StateError::backend_context("clear: checkpoints", e))?;
                tx.execute(
                    "DELETE FROM generation_runs WHERE run_id = $1",
                    &[&run_id.as_str()],
                )
                .map_err(|e| StateError::backend_context("clear: runs", e))?
            }
        };
        tx.commit()
            .map_err(|e| StateError::backend_context("clear: commit", e))?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bankforge_types::cursor::StageCursor;

    /// Helper: get Postgres connection string from env.
    fn test_connstr() -> String {
        std::env::var("TEST_POSTGRES_URL").expect("TEST_POSTGRES_URL not set")
    }

    /// Helper: clean up test tables before each test.
    fn clean_tables(store: &PostgresCheckpointStore) {
        store
            .lock_client()
            .unwrap()
            .batch_execute("DELETE FROM stage_checkpoints; DELETE FROM generation_runs;")
            .unwrap();
    }

    #[test]
    #[ignore = "requires TEST_POSTGRES_URL"]
    fn run_lifecycle() {
        let store = PostgresCheckpointStore::open(&test_connstr()).unwrap();
        clean_tables(&store);

        let run_id = RunId::new("RUN_pg_test");
        store.create_run(&RunRecord::started(run_id.clone())).unwrap();
        assert!(store
            .set_run_status(&run_id, RunStatus::Paused, None)
            .unwrap());

        let latest = store.latest_resumable_run().unwrap().unwrap();
        assert_eq!(latest.run_id, run_id);
        assert_eq!(latest.status, RunStatus::Paused);
    }

    #[test]
    #[ignore = "requires TEST_POSTGRES_URL"]
    fn checkpoint_latest_and_clear() {
        let store = PostgresCheckpointStore::open(&test_connstr()).unwrap();
        clean_tables(&store);

        let run_id = RunId::new("RUN_pg_cp");
        store.create_run(&RunRecord::started(run_id.clone())).unwrap();
        let stage = StageName::new("customer");
        for offset in [100u64, 200] {
            let mut rec = CheckpointRecord::entered(run_id.clone(), stage.clone());
            rec.cursor = StageCursor::offset(offset);
            rec.rows_committed = offset;
            store.append_checkpoint(&rec).unwrap();
        }

        let latest = store.latest_checkpoint(&run_id, &stage).unwrap().unwrap();
        assert_eq!(latest.cursor, StageCursor::offset(200));
        assert_eq!(store.checkpoint_history(&run_id, &stage).unwrap().len(), 2);

        assert_eq!(store.clear(&ClearScope::Run(run_id.clone())).unwrap(), 1);
        assert!(store.get_run(&run_id).unwrap().is_none());
    }
}
