//! Checkpoint store trait definition.
//!
//! [`CheckpointStore`] defines the storage contract for run rows and the
//! append-only checkpoint log. Model types live in
//! [`bankforge_types::state`] and [`bankforge_types::checkpoint`].

use bankforge_types::checkpoint::{CheckpointRecord, ClearScope};
use bankforge_types::state::{RunId, RunRecord, RunStatus, StageName};

use crate::error;

/// Storage contract for generation runs and stage checkpoints.
///
/// Every method is synchronous and durable on return. Implementations
/// must be `Send + Sync` for use behind `Arc<dyn CheckpointStore>`.
pub trait CheckpointStore: Send + Sync {
    /// Insert a new run row.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure,
    /// including a duplicate run id.
    fn create_run(&self, run: &RunRecord) -> error::Result<()>;

    /// Update a run's status and error message, bumping `updated_at`.
    ///
    /// Returns `false` when no run with that id exists.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn set_run_status(
        &self,
        run_id: &RunId,
        status: RunStatus,
        error_message: Option<&str>,
    ) -> error::Result<bool>;

    /// Fetch one run.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn get_run(&self, run_id: &RunId) -> error::Result<Option<RunRecord>>;

    /// Most recently updated run whose status is `running`, `paused` or
    /// `failed`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn latest_resumable_run(&self) -> error::Result<Option<RunRecord>>;

    /// Runs ordered by most recent update first, at most `limit` of them.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn list_runs(&self, limit: usize) -> error::Result<Vec<RunRecord>>;

    /// Append a checkpoint entry. Earlier entries are never modified.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn append_checkpoint(&self, record: &CheckpointRecord) -> error::Result<()>;

    /// Latest checkpoint entry for `(run_id, stage)`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn latest_checkpoint(
        &self,
        run_id: &RunId,
        stage: &StageName,
    ) -> error::Result<Option<CheckpointRecord>>;

    /// Latest checkpoint entry for every stage of a run, ordered by stage
    /// name.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn latest_checkpoints(&self, run_id: &RunId) -> error::Result<Vec<CheckpointRecord>>;

    /// Every checkpoint entry for `(run_id, stage)` in append order.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn checkpoint_history(
        &self,
        run_id: &RunId,
        stage: &StageName,
    ) -> error::Result<Vec<CheckpointRecord>>;

    /// Delete run rows and checkpoints in `scope`, returning the number of
    /// runs removed.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn clear(&self, scope: &ClearScope) -> error::Result<u64>;
}
