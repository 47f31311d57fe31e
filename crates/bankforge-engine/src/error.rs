//! Engine error taxonomy.

use bankforge_state::StateError;
use bankforge_types::cursor::StageCursor;
use bankforge_types::state::{RunId, StageName};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Checkpoint manager failures.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("no resumable run found")]
    NoResumableRun,

    #[error("unknown run '{0}'")]
    UnknownRun(RunId),

    #[error("stage '{stage}' is already completed in run '{run_id}'")]
    StageAlreadyCompleted { run_id: RunId, stage: StageName },

    #[error("stage '{stage}' is not in progress in run '{run_id}'")]
    StageNotInProgress { run_id: RunId, stage: StageName },

    #[error("cursor for stage '{stage}' moved backwards from {from} to {to}")]
    CursorRegression {
        stage: StageName,
        from: StageCursor,
        to: StageCursor,
    },

    #[error("checkpoint store: {0}")]
    Store(#[from] StateError),
}

/// Stage registry validation failures. All are raised before any
/// checkpoint or data mutation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown stage '{0}'")]
    UnknownStage(StageName),

    #[error("stage '{stage}' depends on unknown stage '{dependency}'")]
    UnknownDependency {
        stage: StageName,
        dependency: StageName,
    },

    #[error("stage '{0}' is registered more than once")]
    DuplicateStage(StageName),

    #[error("stage name '{0}' is not a lower-case identifier")]
    InvalidStageName(StageName),

    #[error("dependency cycle among stages: {}", join_names(.0))]
    CyclicDependency(Vec<StageName>),

    #[error("stage '{stage}' reads '{reference}' without declaring it as a dependency")]
    UndeclaredReference {
        stage: StageName,
        reference: StageName,
    },

    #[error("stage '{0}' declares more than one driving window")]
    MultipleWindows(StageName),

    #[error("stage '{stage}' scopes '{reference}' to a window it does not declare")]
    ScopedWithoutWindow {
        stage: StageName,
        reference: StageName,
    },
}

fn join_names(names: &[StageName]) -> String {
    names
        .iter()
        .map(StageName::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Failure inside an entity generator.
#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    #[error("reference data for '{0}' was not loaded")]
    MissingReference(StageName),

    #[error("reference set '{0}' is empty")]
    EmptyReference(StageName),

    #[error("cursor {0} is not valid for this generator")]
    UnexpectedCursor(StageCursor),

    #[error("{0}")]
    Failed(String),
}

/// Failure reading from or writing to the target store.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("cannot open target store: {0}")]
    Open(#[source] BoxError),

    #[error("target store error for '{stage}': {source}")]
    Backend {
        stage: StageName,
        #[source]
        source: BoxError,
    },

    #[error("stage '{0}' cannot be used as a table name")]
    InvalidTable(StageName),

    #[error("target store lock poisoned")]
    LockPoisoned,

    #[error("row encoding failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("batch for '{stage}' rejected: {reason}")]
    Rejected { stage: StageName, reason: String },
}

impl ImportError {
    /// Wrap a driver error with the stage it was operating on.
    pub fn backend<E>(stage: &StageName, err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend {
            stage: stage.clone(),
            source: Box::new(err),
        }
    }
}

/// Why a generation run stopped before completing.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("generator for '{stage}' failed: {source}")]
    Generator {
        stage: StageName,
        #[source]
        source: GeneratorError,
    },

    #[error("import into '{stage}' failed: {source}")]
    Import {
        stage: StageName,
        #[source]
        source: ImportError,
    },

    #[error("loading reference data '{reference}' for '{stage}' failed: {source}")]
    Reference {
        stage: StageName,
        reference: StageName,
        #[source]
        source: ImportError,
    },

    #[error("generator for '{stage}' made no progress at {cursor}")]
    GeneratorStalled { stage: StageName, cursor: StageCursor },

    #[error("stage '{stage}' cannot start: dependency '{dependency}' is not completed")]
    DependencyNotCompleted {
        stage: StageName,
        dependency: StageName,
    },
}

impl ExecutorError {
    /// Whether the checkpoint log is left in a state a later resume can
    /// continue from.
    ///
    /// Generation, import and checkpoint-write failures all stop after the
    /// last durable checkpoint and are resumable. Missing runs and registry
    /// problems need operator action first.
    #[must_use]
    pub fn is_resumable(&self) -> bool {
        match self {
            Self::Checkpoint(CheckpointError::NoResumableRun | CheckpointError::UnknownRun(_))
            | Self::Registry(_) => false,
            Self::Checkpoint(_)
            | Self::Generator { .. }
            | Self::Import { .. }
            | Self::Reference { .. }
            | Self::GeneratorStalled { .. }
            | Self::DependencyNotCompleted { .. } => true,
        }
    }

    /// Stage the error is attributed to, if any.
    #[must_use]
    pub fn stage(&self) -> Option<&StageName> {
        match self {
            Self::Generator { stage, .. }
            | Self::Import { stage, .. }
            | Self::Reference { stage, .. }
            | Self::GeneratorStalled { stage, .. }
            | Self::DependencyNotCompleted { stage, .. } => Some(stage),
            Self::Checkpoint(CheckpointError::CursorRegression { stage, .. }) => Some(stage),
            Self::Checkpoint(_) | Self::Registry(_) => None,
        }
    }
}
