//! Generation run outcomes and per-stage summaries.

use std::time::Duration;

use bankforge_types::cursor::StageCursor;
use bankforge_types::state::{RunId, StageName};

/// Per-stage numbers for one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSummary {
    pub stage: StageName,
    /// Total rows committed by the stage in this run, across resumes.
    pub rows_committed: u64,
    /// Rows committed by this execution only.
    pub rows_this_run: u64,
    pub batches: u64,
    pub skipped: bool,
    pub elapsed: Duration,
}

/// Summary of one execution of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub run_id: RunId,
    pub resumed: bool,
    pub stages: Vec<StageSummary>,
    pub elapsed: Duration,
}

impl RunSummary {
    #[must_use]
    pub fn rows_this_run(&self) -> u64 {
        self.stages.iter().map(|s| s.rows_this_run).sum()
    }

    #[must_use]
    pub fn rows_committed(&self) -> u64 {
        self.stages.iter().map(|s| s.rows_committed).sum()
    }
}

/// Why a run failed and whether it can be resumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunFailure {
    /// `None` when no run could be started or found.
    pub run_id: Option<RunId>,
    pub stage: Option<StageName>,
    /// Last committed cursor of the failing stage.
    pub cursor: Option<StageCursor>,
    pub reason: String,
    /// The run holds committed progress a resume can continue from.
    pub resumable: bool,
    pub summary: Option<RunSummary>,
}

/// Result of [`GenerationExecutor::run`](crate::executor::GenerationExecutor::run).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(RunSummary),
    /// Cancelled; the run is paused at its last committed batch.
    Interrupted(RunSummary),
    Failed(RunFailure),
    /// Rejected before any checkpoint or data mutation.
    ConfigurationError(String),
}

impl RunOutcome {
    /// Process exit code for the CLI.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Completed(_) => 0,
            Self::Failed(_) => 1,
            Self::ConfigurationError(_) => 2,
            Self::Interrupted(_) => 130,
        }
    }

    #[must_use]
    pub fn summary(&self) -> Option<&RunSummary> {
        match self {
            Self::Completed(s) | Self::Interrupted(s) => Some(s),
            Self::Failed(f) => f.summary.as_ref(),
            Self::ConfigurationError(_) => None,
        }
    }
}

/// Result of a configuration check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub config_ok: bool,
    pub registry_ok: bool,
    pub state_ok: bool,
    pub target_ok: bool,
    pub stage_count: usize,
    pub errors: Vec<String>,
}

impl CheckResult {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.config_ok && self.registry_ok && self.state_ok && self.target_ok
    }
}
