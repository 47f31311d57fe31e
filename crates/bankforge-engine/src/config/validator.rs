//! Semantic validation for parsed generation configuration values.

use anyhow::{bail, Result};

use crate::config::types::{CountRange, GenerationConfig, StateBackendKind};

/// Customer keys carry an eight-digit sequence.
const MAX_CUSTOMERS: u64 = 99_999_999;

fn validate_range(range: CountRange, name: &str, errors: &mut Vec<String>) {
    if range.min > range.max {
        errors.push(format!(
            "volumes.{name}: min ({}) must not exceed max ({})",
            range.min, range.max
        ));
    }
}

/// Validate a parsed generation configuration.
/// Returns `Ok(())` if valid, Err with all validation errors if not.
///
/// # Errors
///
/// Returns an error listing every validation failure found in the config.
pub fn validate_config(config: &GenerationConfig) -> Result<()> {
    let mut errors = Vec::new();

    if config.version != "1.0" {
        errors.push(format!(
            "Unsupported config version '{}', expected '1.0'",
            config.version
        ));
    }

    if config.run.batch_size == 0 {
        errors.push("run.batch_size must be at least 1".to_string());
    }
    if config.run.reference_page_size == 0 {
        errors.push("run.reference_page_size must be at least 1".to_string());
    }

    if config.target.path.as_os_str().is_empty() {
        errors.push("target.path must not be empty".to_string());
    }

    if config.state.backend == StateBackendKind::Postgres
        && config
            .state
            .connection
            .as_deref()
            .map_or(true, |c| c.trim().is_empty())
    {
        errors.push("state.connection is required for the postgres backend".to_string());
    }

    let volumes = &config.volumes;
    if volumes.customers > MAX_CUSTOMERS {
        errors.push(format!(
            "volumes.customers ({}) must not exceed {MAX_CUSTOMERS}",
            volumes.customers
        ));
    }
    // Customers reference managers, accounts reference deposit types and
    // investments reference products; empty parents leave them dangling.
    if volumes.customers > 0 {
        if volumes.bank_managers == 0 {
            errors.push("volumes.bank_managers must be at least 1 when customers > 0".into());
        }
        if volumes.deposit_types == 0 {
            errors.push("volumes.deposit_types must be at least 1 when customers > 0".into());
        }
        if volumes.products == 0 {
            errors.push("volumes.products must be at least 1 when customers > 0".into());
        }
    }

    validate_range(volumes.accounts_per_customer, "accounts_per_customer", &mut errors);
    validate_range(volumes.loans_per_customer, "loans_per_customer", &mut errors);
    validate_range(
        volumes.investments_per_customer,
        "investments_per_customer",
        &mut errors,
    );
    validate_range(volumes.events_per_customer, "events_per_customer", &mut errors);
    validate_range(
        volumes.transactions_per_account,
        "transactions_per_account",
        &mut errors,
    );
    // Account keys carry a two-digit sequence.
    if volumes.accounts_per_customer.max > 99 {
        errors.push("volumes.accounts_per_customer.max must not exceed 99".to_string());
    }

    if config.period.end_date < config.period.start_date {
        errors.push(format!(
            "period.end_date ({}) is before period.start_date ({})",
            config.period.end_date, config.period.start_date
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        bail!("Config validation failed:\n  - {}", errors.join("\n  - "));
    }
}
