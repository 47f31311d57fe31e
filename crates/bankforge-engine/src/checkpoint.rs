//! Checkpoint manager: the only component that writes run rows and stage
//! checkpoints.
//!
//! Every operation is synchronous and durable before it returns. Stage
//! progress is append-only; the latest entry per `(run, stage)` decides how
//! a stage resumes.

use std::collections::HashMap;
use std::sync::Arc;

use bankforge_state::CheckpointStore;
use bankforge_types::checkpoint::{CheckpointRecord, ClearScope};
use bankforge_types::cursor::StageCursor;
use bankforge_types::state::{RunId, RunRecord, RunStatus, StageName, StageStatus};
use chrono::Utc;
use rand::Rng;

use crate::error::CheckpointError;
use crate::status::RunStatusReport;

type Result<T> = std::result::Result<T, CheckpointError>;

/// Which run [`CheckpointManager::start_or_resume`] works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunSelector {
    /// A new run.
    Fresh,
    /// The most recently updated run that is not completed.
    Latest,
}

/// What [`CheckpointManager::clear_history`] removes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryScope {
    All,
    Run(RunId),
    /// Only the most recently updated run.
    Latest,
}

/// Where execution starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeContext {
    pub run_id: RunId,
    pub resumed: bool,
    /// Whether the run already holds committed batches or completed stages.
    pub has_progress: bool,
}

/// Committed position of a stage that is in progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageProgress {
    pub cursor: StageCursor,
    pub rows_committed: u64,
    pub batches_committed: u64,
}

impl From<&CheckpointRecord> for StageProgress {
    fn from(record: &CheckpointRecord) -> Self {
        Self {
            cursor: record.cursor.clone(),
            rows_committed: record.rows_committed,
            batches_committed: record.batches_committed,
        }
    }
}

/// Owns the access pattern of a [`CheckpointStore`].
#[derive(Clone)]
pub struct CheckpointManager {
    store: Arc<dyn CheckpointStore>,
}

impl CheckpointManager {
    #[must_use]
    pub fn new(store: Arc<dyn CheckpointStore>) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    /// Start a new run or reopen the latest resumable one.
    ///
    /// A reopened run is set back to `running` under its original id.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::NoResumableRun`] for `Latest` when no run
    /// qualifies, or a store error.
    pub fn start_or_resume(
        &self,
        selector: RunSelector,
        order: &[StageName],
    ) -> Result<ResumeContext> {
        match selector {
            RunSelector::Fresh => {
                let run = RunRecord::started(new_run_id());
                self.store.create_run(&run)?;
                tracing::info!(run_id = run.run_id.as_str(), "Started generation run");
                Ok(ResumeContext {
                    run_id: run.run_id,
                    resumed: false,
                    has_progress: false,
                })
            }
            RunSelector::Latest => {
                let run = self
                    .store
                    .latest_resumable_run()?
                    .ok_or(CheckpointError::NoResumableRun)?;
                self.store
                    .set_run_status(&run.run_id, RunStatus::Running, None)?;

                let latest: HashMap<StageName, CheckpointRecord> = self
                    .store
                    .latest_checkpoints(&run.run_id)?
                    .into_iter()
                    .map(|r| (r.stage.clone(), r))
                    .collect();
                let has_progress = latest.values().any(CheckpointRecord::has_progress);

                // Logged only; the executor re-reads stage records.
                let next = order.iter().find_map(|s| match latest.get(s) {
                    Some(r) if r.status == StageStatus::Completed => None,
                    Some(r) => Some((s, r.cursor.clone())),
                    None => Some((s, StageCursor::Start)),
                });
                tracing::info!(
                    run_id = run.run_id.as_str(),
                    previous_status = run.status.as_str(),
                    next_stage = next.as_ref().map(|(s, _)| s.as_str()),
                    cursor = next.as_ref().map(|(_, c)| c.to_string()),
                    "Resuming generation run"
                );
                Ok(ResumeContext {
                    run_id: run.run_id,
                    resumed: true,
                    has_progress,
                })
            }
        }
    }

    /// Mark `stage` in progress and return its committed position.
    ///
    /// Idempotent for a stage already in progress. A failed stage is
    /// re-entered at its last good cursor.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::StageAlreadyCompleted`] or a store error.
    pub fn begin_stage(&self, run_id: &RunId, stage: &StageName) -> Result<StageProgress> {
        let latest = self.store.latest_checkpoint(run_id, stage)?;
        match latest {
            None => {
                let record = CheckpointRecord::entered(run_id.clone(), stage.clone());
                self.store.append_checkpoint(&record)?;
                Ok(StageProgress::from(&record))
            }
            Some(record) => match record.status {
                StageStatus::InProgress => Ok(StageProgress::from(&record)),
                StageStatus::NotStarted | StageStatus::Failed => {
                    let next = record.transition(StageStatus::InProgress);
                    self.store.append_checkpoint(&next)?;
                    Ok(StageProgress::from(&next))
                }
                StageStatus::Completed => Err(CheckpointError::StageAlreadyCompleted {
                    run_id: run_id.clone(),
                    stage: stage.clone(),
                }),
            },
        }
    }

    /// Record one committed batch.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::StageNotInProgress`] if the stage was not
    /// begun, [`CheckpointError::CursorRegression`] if `cursor` lies before
    /// the committed one, or a store error.
    pub fn record_batch_progress(
        &self,
        run_id: &RunId,
        stage: &StageName,
        cursor: &StageCursor,
        rows_committed: u64,
    ) -> Result<StageProgress> {
        let current = self.in_progress(run_id, stage)?;
        if !cursor.advances_from(&current.cursor) {
            return Err(CheckpointError::CursorRegression {
                stage: stage.clone(),
                from: current.cursor,
                to: cursor.clone(),
            });
        }

        let next = CheckpointRecord {
            cursor: cursor.clone(),
            rows_committed: current.rows_committed + rows_committed,
            batches_committed: current.batches_committed + 1,
            updated_at: Utc::now(),
            ..current
        };
        self.store.append_checkpoint(&next)?;
        Ok(StageProgress::from(&next))
    }

    /// Mark an in-progress stage completed.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::StageNotInProgress`] or a store error.
    pub fn complete_stage(&self, run_id: &RunId, stage: &StageName) -> Result<StageProgress> {
        let current = self.in_progress(run_id, stage)?;
        let next = current.transition(StageStatus::Completed);
        self.store.append_checkpoint(&next)?;
        Ok(StageProgress::from(&next))
    }

    /// Mark a stage failed, keeping its last good cursor.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub fn fail_stage(&self, run_id: &RunId, stage: &StageName, summary: &str) -> Result<()> {
        let base = self
            .store
            .latest_checkpoint(run_id, stage)?
            .unwrap_or_else(|| CheckpointRecord::entered(run_id.clone(), stage.clone()));
        let mut next = base.transition(StageStatus::Failed);
        next.error_message = Some(summary.to_string());
        self.store.append_checkpoint(&next)?;
        Ok(())
    }

    /// Mark a stage completed without executing it.
    ///
    /// Returns `false` if it was already completed.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub fn skip_stage(&self, run_id: &RunId, stage: &StageName) -> Result<bool> {
        let base = match self.store.latest_checkpoint(run_id, stage)? {
            Some(r) if r.status == StageStatus::Completed => return Ok(false),
            Some(r) => r,
            None => CheckpointRecord::entered(run_id.clone(), stage.clone()),
        };
        let mut next = base.transition(StageStatus::Completed);
        next.skipped = true;
        self.store.append_checkpoint(&next)?;
        Ok(true)
    }

    /// # Errors
    ///
    /// Returns [`CheckpointError::UnknownRun`] or a store error.
    pub fn pause_run(&self, run_id: &RunId) -> Result<()> {
        self.set_run_status(run_id, RunStatus::Paused, None)
    }

    /// # Errors
    ///
    /// Returns [`CheckpointError::UnknownRun`] or a store error.
    pub fn complete_run(&self, run_id: &RunId) -> Result<()> {
        self.set_run_status(run_id, RunStatus::Completed, None)
    }

    /// # Errors
    ///
    /// Returns [`CheckpointError::UnknownRun`] or a store error.
    pub fn fail_run(&self, run_id: &RunId, summary: &str) -> Result<()> {
        self.set_run_status(run_id, RunStatus::Failed, Some(summary))
    }

    /// Delete run rows and checkpoints in `scope`. Generated data is never
    /// touched. Returns the number of runs removed.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub fn clear_history(&self, scope: &HistoryScope) -> Result<u64> {
        let removed = match scope {
            HistoryScope::All => self.store.clear(&ClearScope::All)?,
            HistoryScope::Run(run_id) => self.store.clear(&ClearScope::Run(run_id.clone()))?,
            HistoryScope::Latest => match self.store.list_runs(1)?.into_iter().next() {
                Some(run) => self.store.clear(&ClearScope::Run(run.run_id))?,
                None => 0,
            },
        };
        tracing::info!(scope = ?scope, runs_removed = removed, "Cleared checkpoint history");
        Ok(removed)
    }

    /// Status of `run_id`, or of the most recently updated run.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::UnknownRun`] for an explicit id that does
    /// not exist, or a store error.
    pub fn status(
        &self,
        run_id: Option<&RunId>,
        order: &[StageName],
    ) -> Result<Option<RunStatusReport>> {
        let run = match run_id {
            Some(id) => Some(
                self.store
                    .get_run(id)?
                    .ok_or_else(|| CheckpointError::UnknownRun(id.clone()))?,
            ),
            None => self.store.list_runs(1)?.into_iter().next(),
        };
        let Some(run) = run else {
            return Ok(None);
        };
        let latest = self.store.latest_checkpoints(&run.run_id)?;
        Ok(Some(RunStatusReport::build(run, order, latest)))
    }

    /// Runs ordered by most recent update first.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub fn list_runs(&self, limit: usize) -> Result<Vec<RunRecord>> {
        Ok(self.store.list_runs(limit)?)
    }

    /// Latest checkpoint of `stage` in the run.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub fn stage_record(
        &self,
        run_id: &RunId,
        stage: &StageName,
    ) -> Result<Option<CheckpointRecord>> {
        Ok(self.store.latest_checkpoint(run_id, stage)?)
    }

    fn in_progress(&self, run_id: &RunId, stage: &StageName) -> Result<CheckpointRecord> {
        match self.store.latest_checkpoint(run_id, stage)? {
            Some(r) if r.status == StageStatus::InProgress => Ok(r),
            _ => Err(CheckpointError::StageNotInProgress {
                run_id: run_id.clone(),
                stage: stage.clone(),
            }),
        }
    }

    fn set_run_status(
        &self,
        run_id: &RunId,
        status: RunStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        if self.store.set_run_status(run_id, status, error_message)? {
            Ok(())
        } else {
            Err(CheckpointError::UnknownRun(run_id.clone()))
        }
    }
}

/// `RUN_<8 hex>_<yyyymmddHHMMSS>`.
fn new_run_id() -> RunId {
    let suffix: u32 = rand::thread_rng().gen();
    RunId::new(format!(
        "RUN_{suffix:08x}_{}",
        Utc::now().format("%Y%m%d%H%M%S")
    ))
}
