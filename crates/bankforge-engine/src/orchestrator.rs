//! Entry points that wire configuration, stores and the bank catalogue
//! into a [`GenerationExecutor`].

use std::sync::Arc;

use anyhow::{bail, Result};
use bankforge_state::CheckpointStore;
use bankforge_types::state::{RunId, RunRecord, StageName};
use tokio_util::sync::CancellationToken;

use crate::catalog::{bank_registry, bank_validation_rules};
use crate::checkpoint::{CheckpointManager, HistoryScope};
use crate::config::types::GenerationConfig;
use crate::config::validator::validate_config;
use crate::executor::{GenerationExecutor, RunOptions};
use crate::registry::StageRegistry;
use crate::resolve::{create_checkpoint_store, open_target_store};
use crate::result::{CheckResult, RunFailure, RunOutcome};
use crate::status::RunStatusReport;
use crate::validate::{validate_target, ValidationReport};

/// Validate `config`, open both stores and run the bank catalogue.
///
/// Configuration and registry problems are reported as
/// [`RunOutcome::ConfigurationError`] before anything is written.
pub fn run_generation(
    config: &GenerationConfig,
    options: &RunOptions,
    cancel: &CancellationToken,
) -> RunOutcome {
    if let Err(e) = validate_config(config) {
        return RunOutcome::ConfigurationError(format!("{e:#}"));
    }
    let registry = match bank_registry(config) {
        Ok(registry) => registry,
        Err(e) => return RunOutcome::ConfigurationError(e.to_string()),
    };

    let store = match create_checkpoint_store(&config.state) {
        Ok(store) => store,
        Err(e) => return infrastructure_failure(&e),
    };
    let target = match open_target_store(&config.target) {
        Ok(target) => target,
        Err(e) => return infrastructure_failure(&e),
    };

    tracing::info!(
        stages = registry.len(),
        batch_size = options.batch_size,
        resume = options.resume,
        skip_to = options.skip_to.as_ref().map(StageName::as_str),
        target = %config.target.path.display(),
        "Starting bank data generation"
    );

    GenerationExecutor::new(registry, store, target.clone(), target)
        .with_reference_page_size(config.run.reference_page_size)
        .run(options, cancel)
}

fn infrastructure_failure(error: &anyhow::Error) -> RunOutcome {
    tracing::error!(error = %format!("{error:#}"), "Could not open stores");
    RunOutcome::Failed(RunFailure {
        run_id: None,
        stage: None,
        cursor: None,
        reason: format!("{error:#}"),
        resumable: false,
        summary: None,
    })
}

/// Parse-level checks plus store connectivity, without generating data.
#[must_use]
pub fn check_generation(config: &GenerationConfig) -> CheckResult {
    let mut errors = Vec::new();

    let config_ok = match validate_config(config) {
        Ok(()) => true,
        Err(e) => {
            errors.push(format!("{e:#}"));
            false
        }
    };

    let (registry_ok, stage_count) = match bank_registry(config) {
        Ok(registry) => (true, registry.len()),
        Err(e) => {
            errors.push(e.to_string());
            (false, 0)
        }
    };

    let state_ok = match create_checkpoint_store(&config.state) {
        Ok(_) => {
            tracing::info!("Checkpoint store: OK");
            true
        }
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Checkpoint store: FAILED");
            errors.push(format!("{e:#}"));
            false
        }
    };

    let target_ok = match open_target_store(&config.target) {
        Ok(_) => {
            tracing::info!("Target store: OK");
            true
        }
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Target store: FAILED");
            errors.push(format!("{e:#}"));
            false
        }
    };

    CheckResult {
        config_ok,
        registry_ok,
        state_ok,
        target_ok,
        stage_count,
        errors,
    }
}

/// Registry built from `config` after validation.
///
/// # Errors
///
/// Returns an error if the config or the catalogue is invalid.
pub fn resolve_registry(config: &GenerationConfig) -> Result<StageRegistry> {
    validate_config(config)?;
    Ok(bank_registry(config)?)
}

fn open_manager(config: &GenerationConfig) -> Result<CheckpointManager> {
    let store: Arc<dyn CheckpointStore> = create_checkpoint_store(&config.state)?;
    Ok(CheckpointManager::new(store))
}

/// Status of one run, or of the most recently updated run, with the row
/// count of every stage table when the target database exists.
///
/// # Errors
///
/// Returns an error if a store cannot be opened or read, or the run does
/// not exist.
pub fn generation_status(
    config: &GenerationConfig,
    run_id: Option<&RunId>,
) -> Result<Option<RunStatusReport>> {
    let registry = bank_registry(config)?;
    let manager = open_manager(config)?;
    let Some(report) = manager.status(run_id, &registry.order())? else {
        return Ok(None);
    };
    if !config.target.path.exists() {
        return Ok(Some(report));
    }
    let target = open_target_store(&config.target)?;
    Ok(Some(report.with_target_rows(|stage| target.row_count(stage))?))
}

/// Check the generated dataset: row volumes, required fields, field types
/// and references between tables.
///
/// # Errors
///
/// Returns an error if the config is invalid, the target database does
/// not exist or cannot be read.
pub fn validate_generation(config: &GenerationConfig) -> Result<ValidationReport> {
    let registry = resolve_registry(config)?;
    if !config.target.path.exists() {
        bail!(
            "Target database {} does not exist; run generation first",
            config.target.path.display()
        );
    }
    let target = open_target_store(&config.target)?;
    Ok(validate_target(
        &target,
        &registry.order(),
        &bank_validation_rules(config),
        config.run.reference_page_size,
    )?)
}

/// Recent runs, most recently updated first.
///
/// # Errors
///
/// Returns an error if the store cannot be opened or read.
pub fn list_generation_runs(config: &GenerationConfig, limit: usize) -> Result<Vec<RunRecord>> {
    Ok(open_manager(config)?.list_runs(limit)?)
}

/// Purge checkpoint history. Generated data is left alone.
///
/// # Errors
///
/// Returns an error if the store cannot be opened or written.
pub fn clear_generation_history(config: &GenerationConfig, scope: &HistoryScope) -> Result<u64> {
    Ok(open_manager(config)?.clear_history(scope)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parser::parse_config_str;
    use crate::import::BatchImporter;

    fn config_in(dir: &std::path::Path, customers: u64) -> GenerationConfig {
        let yaml = format!(
            r#"
version: "1.0"
run:
  batch_size: 7
  reference_page_size: 4
state:
  backend: sqlite
  connection: {state}
target:
  path: {target}
volumes:
  bank_managers: 3
  deposit_types: 2
  products: 4
  customers: {customers}
  accounts_per_customer: {{ min: 1, max: 2 }}
  transactions_per_account: {{ min: 1, max: 3 }}
period:
  start_date: 2024-01-01
  end_date: 2024-01-31
"#,
            state = dir.join("state.db").display(),
            target = dir.join("bank.db").display(),
        );
        parse_config_str(&yaml).unwrap()
    }

    #[test]
    fn invalid_config_is_rejected_before_stores_open() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path(), 10);
        config.version = "2.0".into();
        let outcome = run_generation(&config, &RunOptions::default(), &CancellationToken::new());
        assert!(matches!(outcome, RunOutcome::ConfigurationError(_)));
        assert!(!dir.path().join("state.db").exists());
        assert!(!dir.path().join("bank.db").exists());
    }

    #[test]
    fn check_reports_every_component() {
        let dir = tempfile::tempdir().unwrap();
        let result = check_generation(&config_in(dir.path(), 10));
        assert!(result.is_ok(), "{:?}", result.errors);
        assert_eq!(result.stage_count, 13);
    }

    #[test]
    fn validation_needs_generated_target() {
        let dir = tempfile::tempdir().unwrap();
        let err = validate_generation(&config_in(dir.path(), 5)).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
        assert!(!dir.path().join("bank.db").exists());
    }

    #[test]
    fn validation_flags_tampered_rows() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), 6);
        let options = RunOptions {
            batch_size: config.run.batch_size,
            ..RunOptions::default()
        };
        let outcome = run_generation(&config, &options, &CancellationToken::new());
        assert!(matches!(outcome, RunOutcome::Completed(_)), "{outcome:?}");

        let target = open_target_store(&config.target).unwrap();
        target
            .import(
                &StageName::new("fund_account"),
                &[bankforge_types::row::Row::new("FA-C99999999-01")
                    .with("customer_id", "C99999999")
                    .with("deposit_type_id", "DT001")
                    .with("balance", 1.0)
                    .with("status", "active")],
            )
            .unwrap();
        drop(target);

        let report = validate_generation(&config).unwrap();
        assert_eq!(report.issues.len(), 1, "{:?}", report.issues);
        assert_eq!(report.issues[0].stage, StageName::new("fund_account"));
        assert_eq!(report.issues[0].sample, vec!["FA-C99999999-01"]);
    }

    #[test]
    fn status_and_clear_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), 5);
        let options = RunOptions {
            batch_size: config.run.batch_size,
            ..RunOptions::default()
        };
        let outcome = run_generation(&config, &options, &CancellationToken::new());
        assert!(matches!(outcome, RunOutcome::Completed(_)), "{outcome:?}");

        let report = generation_status(&config, None).unwrap().unwrap();
        assert!(report.current_stage.is_none());
        assert_eq!(report.completed_stages(), 13);
        let customers = report
            .stages
            .iter()
            .find(|s| s.stage.as_str() == "customer")
            .unwrap();
        assert_eq!(customers.target_rows, Some(5));
        assert!(report
            .stages
            .iter()
            .all(|s| s.target_rows.is_some_and(|rows| rows <= s.rows_committed)));
        assert_eq!(list_generation_runs(&config, 10).unwrap().len(), 1);

        let validation = validate_generation(&config).unwrap();
        assert!(validation.is_ok(), "{:?}", validation.issues);
        assert_eq!(validation.stages.len(), 13);

        assert_eq!(clear_generation_history(&config, &HistoryScope::All).unwrap(), 1);
        assert!(generation_status(&config, None).unwrap().is_none());
    }
}
