//! Checkpointed, stage-ordered generation of synthetic bank data.
//!
//! The [`GenerationExecutor`] walks a validated [`StageRegistry`], pulls
//! bounded batches from each stage's [`EntityGenerator`], commits them
//! through a [`BatchImporter`] and checkpoints every batch so an
//! interrupted run resumes exactly where it stopped.
//!
//! [`EntityGenerator`]: generator::EntityGenerator
//! [`BatchImporter`]: import::BatchImporter

#![warn(clippy::pedantic)]

pub mod catalog;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod executor;
pub mod generator;
pub mod import;
pub mod orchestrator;
pub mod registry;
pub mod resolve;
pub mod result;
pub mod status;
pub mod target;
pub mod validate;

pub use checkpoint::{CheckpointManager, HistoryScope, RunSelector};
pub use error::{CheckpointError, ExecutorError, RegistryError};
pub use executor::{GenerationExecutor, RunOptions};
pub use orchestrator::{
    check_generation, clear_generation_history, generation_status, list_generation_runs,
    resolve_registry, run_generation, validate_generation,
};
pub use registry::{StageRegistry, StageRegistryBuilder};
pub use result::{CheckResult, RunOutcome, RunSummary};
pub use status::RunStatusReport;
pub use validate::ValidationReport;
