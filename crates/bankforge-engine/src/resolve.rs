//! Store construction from configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use bankforge_state::{CheckpointStore, PostgresCheckpointStore, SqliteCheckpointStore};

use crate::config::types::{StateBackendKind, StateConfig, TargetConfig};
use crate::target::SqliteTargetStore;

/// Checkpoint database used when `state.connection` is not set.
#[must_use]
pub fn default_state_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".bankforge").join("state.db")
}

/// Open the configured checkpoint store.
///
/// # Errors
///
/// Returns an error if the store cannot be opened or initialised.
pub fn create_checkpoint_store(config: &StateConfig) -> Result<Arc<dyn CheckpointStore>> {
    match config.backend {
        StateBackendKind::Sqlite => {
            let store = if let Some(path) = &config.connection {
                SqliteCheckpointStore::open(Path::new(path))
                    .with_context(|| format!("Failed to open checkpoint DB: {path}"))?
            } else {
                SqliteCheckpointStore::open(&default_state_path())
                    .context("Failed to open default checkpoint DB")?
            };
            Ok(Arc::new(store) as Arc<dyn CheckpointStore>)
        }
        StateBackendKind::Postgres => {
            let connstr = config
                .connection
                .as_deref()
                .context("state.connection is required for the postgres backend")?;
            let store = PostgresCheckpointStore::open(connstr)
                .context("Failed to open Postgres checkpoint store")?;
            Ok(Arc::new(store) as Arc<dyn CheckpointStore>)
        }
    }
}

/// Open the target database.
///
/// # Errors
///
/// Returns an error if the database cannot be opened.
pub fn open_target_store(config: &TargetConfig) -> Result<Arc<SqliteTargetStore>> {
    let store = SqliteTargetStore::open(&config.path)
        .with_context(|| format!("Failed to open target DB: {}", config.path.display()))?;
    Ok(Arc::new(store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bankforge_types::state::RunId;

    #[test]
    fn sqlite_store_opens_at_configured_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("cp.db");
        let config = StateConfig {
            backend: StateBackendKind::Sqlite,
            connection: Some(path.to_string_lossy().into_owned()),
        };
        let store = create_checkpoint_store(&config).unwrap();
        assert!(store.get_run(&RunId::new("none")).unwrap().is_none());
        assert!(path.exists());
    }

    #[test]
    fn postgres_without_connection_is_an_error() {
        let config = StateConfig {
            backend: StateBackendKind::Postgres,
            connection: None,
        };
        let err = create_checkpoint_store(&config).err().unwrap();
        assert!(err.to_string().contains("state.connection is required"));
    }

    #[test]
    fn target_store_opens() {
        let dir = tempfile::tempdir().unwrap();
        let config = TargetConfig {
            path: dir.path().join("bank.db"),
        };
        assert!(open_target_store(&config).is_ok());
    }
}
