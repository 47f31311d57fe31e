//! Checkpoint store error types.

use std::error::Error as StdError;

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Errors produced by [`CheckpointStore`](crate::CheckpointStore) operations.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// Underlying database driver failure, optionally tagged with the
    /// store operation that was running.
    #[error("state backend error{}: {source}", context_suffix(.context))]
    Backend {
        context: Option<&'static str>,
        #[source]
        source: BoxError,
    },

    /// File-system I/O failure (e.g. creating the database directory).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal mutex was poisoned by a panicked thread.
    #[error("state backend lock poisoned")]
    LockPoisoned,

    /// A cursor could not be encoded to or decoded from JSON.
    #[error("cursor serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored row holds a value this version cannot interpret.
    #[error("corrupt checkpoint record: {0}")]
    CorruptRecord(String),
}

#[allow(clippy::ref_option)]
fn context_suffix(context: &Option<&'static str>) -> String {
    context.map(|c| format!(" ({c})")).unwrap_or_default()
}

impl StateError {
    /// Wrap a driver error without operation context.
    pub fn backend<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Backend {
            context: None,
            source: Box::new(err),
        }
    }

    /// Wrap a driver error and name the operation that failed.
    pub fn backend_context<E>(context: &'static str, err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Backend {
            context: Some(context),
            source: Box::new(err),
        }
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, StateError>;
