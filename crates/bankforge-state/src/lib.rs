//! Run and checkpoint persistence for the bankforge pipeline.
//!
//! Provides the [`CheckpointStore`] trait together with a
//! [`SqliteCheckpointStore`] for local runs and a
//! [`PostgresCheckpointStore`] for shared state.

#![warn(clippy::pedantic)]

pub mod backend;
pub mod error;
pub mod postgres;
mod sql;
pub mod sqlite;

pub use backend::CheckpointStore;
pub use error::StateError;
pub use postgres::PostgresCheckpointStore;
pub use sqlite::SqliteCheckpointStore;

/// Common imports for store consumers.
pub mod prelude {
    pub use crate::backend::CheckpointStore;
    pub use crate::error::StateError;
    pub use crate::postgres::PostgresCheckpointStore;
    pub use crate::sqlite::SqliteCheckpointStore;
    pub use bankforge_types::checkpoint::{CheckpointRecord, ClearScope};
    pub use bankforge_types::cursor::StageCursor;
    pub use bankforge_types::state::{RunId, RunRecord, RunStatus, StageName, StageStatus};
}
