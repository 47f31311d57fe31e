//! Generation config types deserialized from YAML.

use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Top-level generation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenerationConfig {
    pub version: String,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub state: StateConfig,
    pub target: TargetConfig,
    #[serde(default)]
    pub volumes: VolumeConfig,
    #[serde(default)]
    pub period: PeriodConfig,
}

/// Batch sizing and determinism knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Rows (fixed-volume stages) or upstream keys (per-parent stages) per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Page size used when loading upstream key sets.
    #[serde(default = "default_reference_page_size")]
    pub reference_page_size: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_batch_size() -> usize {
    1000
}

fn default_reference_page_size() -> usize {
    5000
}

fn default_seed() -> u64 {
    42
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            reference_page_size: default_reference_page_size(),
            seed: default_seed(),
        }
    }
}

/// Checkpoint store backend type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateBackendKind {
    #[default]
    Sqlite,
    Postgres,
}

/// Checkpoint store configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateConfig {
    #[serde(default)]
    pub backend: StateBackendKind,
    /// File path for `sqlite`, connection string for `postgres`.
    pub connection: Option<String>,
}

/// Where generated rows are imported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetConfig {
    pub path: PathBuf,
}

/// Inclusive `min..=max` count drawn per parent entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CountRange {
    pub min: u32,
    pub max: u32,
}

impl CountRange {
    #[must_use]
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }
}

/// Entity volumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct VolumeConfig {
    pub bank_managers: u64,
    pub deposit_types: u64,
    pub products: u64,
    pub customers: u64,
    pub accounts_per_customer: CountRange,
    pub loans_per_customer: CountRange,
    pub investments_per_customer: CountRange,
    pub events_per_customer: CountRange,
    pub transactions_per_account: CountRange,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            bank_managers: 50,
            deposit_types: 10,
            products: 30,
            customers: 10_000,
            accounts_per_customer: CountRange::new(1, 3),
            loans_per_customer: CountRange::new(0, 2),
            investments_per_customer: CountRange::new(0, 3),
            events_per_customer: CountRange::new(0, 12),
            transactions_per_account: CountRange::new(5, 40),
        }
    }
}

/// Business-date window that event and transaction dates fall into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PeriodConfig {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl Default for PeriodConfig {
    fn default() -> Self {
        Self {
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or(NaiveDate::MIN),
            end_date: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap_or(NaiveDate::MIN),
        }
    }
}

impl PeriodConfig {
    /// Number of days in the window, inclusive of both ends.
    #[must_use]
    pub fn days(&self) -> i64 {
        (self.end_date - self.start_date).num_days() + 1
    }
}
