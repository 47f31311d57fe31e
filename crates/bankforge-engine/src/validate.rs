//! Integrity checks over a generated target dataset.
//!
//! Checks run against what is stored, not against checkpoints: required
//! fields are present, fields hold the expected JSON type, references name
//! an existing parent row, and fixed-volume stages hold the configured
//! number of rows. Keys are primary keys, so uniqueness needs no check.

use std::collections::HashMap;
use std::fmt;

use bankforge_types::row::Row;
use bankforge_types::state::StageName;
use serde_json::Value;

use crate::error::ImportError;
use crate::target::SqliteTargetStore;

/// Offending row keys kept per issue.
const SAMPLE: usize = 5;

/// JSON type a field must hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
    Bool,
}

impl FieldKind {
    fn matches(self, value: &Value) -> bool {
        match self {
            Self::Text => value.is_string(),
            Self::Number => value.is_number(),
            Self::Bool => value.is_boolean(),
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Bool => "bool",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FieldRule {
    field: &'static str,
    kind: FieldKind,
    required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ForeignKey {
    stage: StageName,
    field: &'static str,
    parent: StageName,
}

/// What [`validate_target`] checks.
#[derive(Debug, Clone, Default)]
pub struct ValidationRules {
    fields: HashMap<StageName, Vec<FieldRule>>,
    foreign_keys: Vec<ForeignKey>,
    expected_rows: HashMap<StageName, u64>,
}

impl ValidationRules {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `field` must be present, non-empty and of `kind`.
    #[must_use]
    pub fn field(self, stage: &str, field: &'static str, kind: FieldKind) -> Self {
        self.push_field(stage, field, kind, true)
    }

    /// `field` may be absent or null, but must be of `kind` when set.
    #[must_use]
    pub fn optional_field(self, stage: &str, field: &'static str, kind: FieldKind) -> Self {
        self.push_field(stage, field, kind, false)
    }

    /// Every non-null `field` of `stage` must name a row key of `parent`.
    #[must_use]
    pub fn foreign_key(mut self, stage: &str, field: &'static str, parent: &str) -> Self {
        self.foreign_keys.push(ForeignKey {
            stage: StageName::new(stage),
            field,
            parent: StageName::new(parent),
        });
        self
    }

    #[must_use]
    pub fn expect_rows(mut self, stage: &str, rows: u64) -> Self {
        self.expected_rows.insert(StageName::new(stage), rows);
        self
    }

    fn push_field(mut self, stage: &str, field: &'static str, kind: FieldKind, required: bool) -> Self {
        self.fields
            .entry(StageName::new(stage))
            .or_default()
            .push(FieldRule {
                field,
                kind,
                required,
            });
        self
    }
}

/// Kind of integrity problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueKind {
    MissingField { field: String },
    WrongType { field: String, expected: FieldKind },
    DanglingReference { field: String, parent: StageName },
    RowCount { expected: u64, actual: u64 },
}

/// One problem found in one stage table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub stage: StageName,
    pub kind: IssueKind,
    /// Rows affected; for `RowCount` the size of the difference.
    pub count: u64,
    /// First few offending row keys.
    pub sample: Vec<String>,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            IssueKind::MissingField { field } => {
                write!(f, "{}: {} rows missing '{field}'", self.stage, self.count)?;
            }
            IssueKind::WrongType { field, expected } => write!(
                f,
                "{}: {} rows where '{field}' is not {expected}",
                self.stage, self.count
            )?,
            IssueKind::DanglingReference { field, parent } => write!(
                f,
                "{}: {} rows where '{field}' has no {parent} row",
                self.stage, self.count
            )?,
            IssueKind::RowCount { expected, actual } => write!(
                f,
                "{}: {actual} rows, expected {expected}",
                self.stage
            )?,
        }
        if !self.sample.is_empty() {
            write!(f, " (e.g. {})", self.sample.join(", "))?;
        }
        Ok(())
    }
}

/// Row count of one stage table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageCheck {
    pub stage: StageName,
    pub rows: u64,
    pub expected: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationReport {
    pub stages: Vec<StageCheck>,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.issues.is_empty()
    }

    #[must_use]
    pub fn total_rows(&self) -> u64 {
        self.stages.iter().map(|s| s.rows).sum()
    }
}

/// Per-rule tally while scanning a stage.
#[derive(Default)]
struct Tally {
    missing: u64,
    missing_sample: Vec<String>,
    wrong: u64,
    wrong_sample: Vec<String>,
}

fn note(count: &mut u64, sample: &mut Vec<String>, key: &str) {
    *count += 1;
    if sample.len() < SAMPLE {
        sample.push(key.to_string());
    }
}

fn check_row(row: &Row, rules: &[FieldRule], tallies: &mut [Tally]) {
    for (rule, tally) in rules.iter().zip(tallies.iter_mut()) {
        match row.get(rule.field) {
            None | Some(Value::Null) => {
                if rule.required {
                    note(&mut tally.missing, &mut tally.missing_sample, &row.key);
                }
            }
            Some(Value::String(s)) if s.is_empty() && rule.required => {
                note(&mut tally.missing, &mut tally.missing_sample, &row.key);
            }
            Some(value) if !rule.kind.matches(value) => {
                note(&mut tally.wrong, &mut tally.wrong_sample, &row.key);
            }
            Some(_) => {}
        }
    }
}

/// Check every stage in `order` against `rules`, reading rows in pages of
/// `page_size`.
///
/// # Errors
///
/// Returns [`ImportError`] if the target cannot be read.
pub fn validate_target(
    target: &SqliteTargetStore,
    order: &[StageName],
    rules: &ValidationRules,
    page_size: usize,
) -> Result<ValidationReport, ImportError> {
    let page_size = page_size.max(1);
    let mut report = ValidationReport::default();

    for stage in order {
        let rows = target.row_count(stage)?;
        let expected = rules.expected_rows.get(stage).copied();
        tracing::debug!(stage = stage.as_str(), rows, "Validating stage");
        report.stages.push(StageCheck {
            stage: stage.clone(),
            rows,
            expected,
        });
        if let Some(expected) = expected.filter(|e| *e != rows) {
            report.issues.push(ValidationIssue {
                stage: stage.clone(),
                kind: IssueKind::RowCount {
                    expected,
                    actual: rows,
                },
                count: expected.abs_diff(rows),
                sample: Vec::new(),
            });
        }

        let Some(field_rules) = rules.fields.get(stage) else {
            continue;
        };
        let mut tallies: Vec<Tally> = field_rules.iter().map(|_| Tally::default()).collect();
        let mut after: Option<String> = None;
        loop {
            let page = target.page_rows(stage, after.as_deref(), page_size)?;
            for row in &page {
                check_row(row, field_rules, &mut tallies);
            }
            if page.len() < page_size {
                break;
            }
            after = page.last().map(|r| r.key.clone());
        }
        for (rule, tally) in field_rules.iter().zip(tallies) {
            if tally.missing > 0 {
                report.issues.push(ValidationIssue {
                    stage: stage.clone(),
                    kind: IssueKind::MissingField {
                        field: rule.field.to_string(),
                    },
                    count: tally.missing,
                    sample: tally.missing_sample,
                });
            }
            if tally.wrong > 0 {
                report.issues.push(ValidationIssue {
                    stage: stage.clone(),
                    kind: IssueKind::WrongType {
                        field: rule.field.to_string(),
                        expected: rule.kind,
                    },
                    count: tally.wrong,
                    sample: tally.wrong_sample,
                });
            }
        }
    }

    for fk in &rules.foreign_keys {
        let (count, sample) = target.dangling_references(&fk.stage, fk.field, &fk.parent, SAMPLE)?;
        if count > 0 {
            report.issues.push(ValidationIssue {
                stage: fk.stage.clone(),
                kind: IssueKind::DanglingReference {
                    field: fk.field.to_string(),
                    parent: fk.parent.clone(),
                },
                count,
                sample,
            });
        }
    }

    for issue in &report.issues {
        tracing::warn!(issue = %issue, "Validation issue");
    }
    tracing::info!(
        stages = report.stages.len(),
        rows = report.total_rows(),
        issues = report.issues.len(),
        "Validation finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::BatchImporter;

    fn stages(names: &[&str]) -> Vec<StageName> {
        names.iter().map(|n| StageName::new(*n)).collect()
    }

    fn seeded() -> SqliteTargetStore {
        let store = SqliteTargetStore::in_memory().unwrap();
        store
            .import(
                &StageName::new("customer"),
                &[
                    Row::new("C1").with("name", "Li Wei"),
                    Row::new("C2").with("name", "Wang Fang"),
                ],
            )
            .unwrap();
        store
            .import(
                &StageName::new("fund_account"),
                &[
                    Row::new("FA-C1-01").with("customer_id", "C1").with("balance", 10.5),
                    Row::new("FA-C2-01").with("customer_id", "C2").with("balance", 3),
                ],
            )
            .unwrap();
        store
    }

    fn rules() -> ValidationRules {
        ValidationRules::new()
            .field("customer", "name", FieldKind::Text)
            .field("fund_account", "customer_id", FieldKind::Text)
            .field("fund_account", "balance", FieldKind::Number)
            .optional_field("fund_account", "note", FieldKind::Text)
            .foreign_key("fund_account", "customer_id", "customer")
            .expect_rows("customer", 2)
    }

    #[test]
    fn clean_dataset_passes() {
        let report = validate_target(
            &seeded(),
            &stages(&["customer", "fund_account"]),
            &rules(),
            1,
        )
        .unwrap();
        assert!(report.is_ok(), "{:?}", report.issues);
        assert_eq!(report.total_rows(), 4);
        assert_eq!(report.stages[0].expected, Some(2));
    }

    #[test]
    fn every_kind_of_issue_is_reported() {
        let store = seeded();
        store
            .import(
                &StageName::new("fund_account"),
                &[
                    Row::new("FA-C3-01").with("customer_id", "C3").with("balance", 1),
                    Row::new("FA-C1-02").with("customer_id", "").with("balance", "lots"),
                    Row::new("FA-C1-03").with("customer_id", "C1").with("balance", 2).with("note", 7),
                ],
            )
            .unwrap();
        let rules = rules().expect_rows("customer", 3);
        let report = validate_target(
            &store,
            &stages(&["customer", "fund_account"]),
            &rules,
            2,
        )
        .unwrap();

        let kinds: Vec<_> = report.issues.iter().map(|i| (&i.kind, i.count)).collect();
        assert!(kinds.contains(&(&IssueKind::RowCount { expected: 3, actual: 2 }, 1)));
        assert!(kinds.contains(&(
            &IssueKind::MissingField {
                field: "customer_id".into()
            },
            1
        )));
        assert!(kinds.contains(&(
            &IssueKind::WrongType {
                field: "balance".into(),
                expected: FieldKind::Number
            },
            1
        )));
        assert!(kinds.contains(&(
            &IssueKind::WrongType {
                field: "note".into(),
                expected: FieldKind::Text
            },
            1
        )));
        let dangling = report
            .issues
            .iter()
            .find(|i| matches!(i.kind, IssueKind::DanglingReference { .. }))
            .unwrap();
        // The empty id dangles too.
        assert_eq!(dangling.count, 2);
        assert_eq!(dangling.sample, vec!["FA-C1-02", "FA-C3-01"]);
        assert!(dangling
            .to_string()
            .starts_with("fund_account: 2 rows where 'customer_id' has no customer row"));
    }

    #[test]
    fn empty_target_reports_missing_volume() {
        let store = SqliteTargetStore::in_memory().unwrap();
        let report = validate_target(&store, &stages(&["customer"]), &rules(), 10).unwrap();
        assert_eq!(report.stages[0].rows, 0);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].to_string(), "customer: 0 rows, expected 2");
    }
}
