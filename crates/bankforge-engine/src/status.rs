//! Operator-facing run status.

use std::collections::HashMap;

use bankforge_types::checkpoint::CheckpointRecord;
use bankforge_types::cursor::StageCursor;
use bankforge_types::state::{RunRecord, StageName, StageStatus};
use chrono::{DateTime, Utc};

/// Progress of one stage within a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub stage: StageName,
    pub status: StageStatus,
    pub cursor: StageCursor,
    pub rows_committed: u64,
    pub batches_committed: u64,
    pub skipped: bool,
    pub error_message: Option<String>,
    /// `None` when the stage has no checkpoint yet.
    pub updated_at: Option<DateTime<Utc>>,
    /// Rows currently in the target table. Can trail `rows_committed` when
    /// a resumed batch replaced rows; `None` when the target was not read.
    pub target_rows: Option<u64>,
}

impl StageReport {
    fn not_started(stage: StageName) -> Self {
        Self {
            stage,
            status: StageStatus::NotStarted,
            cursor: StageCursor::Start,
            rows_committed: 0,
            batches_committed: 0,
            skipped: false,
            error_message: None,
            updated_at: None,
            target_rows: None,
        }
    }

    fn from_record(record: CheckpointRecord) -> Self {
        Self {
            stage: record.stage,
            status: record.status,
            cursor: record.cursor,
            rows_committed: record.rows_committed,
            batches_committed: record.batches_committed,
            skipped: record.skipped,
            error_message: record.error_message,
            updated_at: Some(record.updated_at),
            target_rows: None,
        }
    }
}

/// Run status, current stage and per-stage progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStatusReport {
    pub run: RunRecord,
    /// Stage that is in flight or would run next; `None` once every stage
    /// completed.
    pub current_stage: Option<StageName>,
    /// Stages in execution order. Stages recorded in the run but no longer
    /// registered are listed last.
    pub stages: Vec<StageReport>,
}

impl RunStatusReport {
    /// Merge the latest checkpoint per stage into the registry order.
    #[must_use]
    pub fn build(run: RunRecord, order: &[StageName], latest: Vec<CheckpointRecord>) -> Self {
        let mut by_stage: HashMap<StageName, CheckpointRecord> = latest
            .into_iter()
            .map(|r| (r.stage.clone(), r))
            .collect();

        let mut stages: Vec<StageReport> = order
            .iter()
            .map(|name| {
                by_stage.remove(name).map_or_else(
                    || StageReport::not_started(name.clone()),
                    StageReport::from_record,
                )
            })
            .collect();
        let mut extra: Vec<StageReport> =
            by_stage.into_values().map(StageReport::from_record).collect();
        extra.sort_by(|a, b| a.stage.cmp(&b.stage));
        stages.extend(extra);

        let current_stage = stages
            .iter()
            .find(|s| s.status != StageStatus::Completed)
            .map(|s| s.stage.clone());

        Self {
            run,
            current_stage,
            stages,
        }
    }

    /// Fill in [`StageReport::target_rows`] for every stage.
    ///
    /// # Errors
    ///
    /// Returns the first error from `count`.
    pub fn with_target_rows<E>(
        mut self,
        count: impl Fn(&StageName) -> Result<u64, E>,
    ) -> Result<Self, E> {
        for stage in &mut self.stages {
            stage.target_rows = Some(count(&stage.stage)?);
        }
        Ok(self)
    }

    #[must_use]
    pub fn rows_committed(&self) -> u64 {
        self.stages.iter().map(|s| s.rows_committed).sum()
    }

    #[must_use]
    pub fn completed_stages(&self) -> usize {
        self.stages
            .iter()
            .filter(|s| s.status == StageStatus::Completed)
            .count()
    }

    #[must_use]
    pub fn is_resumable(&self) -> bool {
        self.run.status.is_resumable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bankforge_types::state::{RunId, RunStatus};

    fn record(stage: &str, status: StageStatus, rows: u64) -> CheckpointRecord {
        let mut rec = CheckpointRecord::entered(RunId::new("r1"), StageName::new(stage));
        rec.status = status;
        rec.rows_committed = rows;
        rec
    }

    fn order() -> Vec<StageName> {
        ["bank_manager", "customer", "fund_account"]
            .into_iter()
            .map(StageName::new)
            .collect()
    }

    #[test]
    fn missing_stages_report_not_started() {
        let report = RunStatusReport::build(
            RunRecord::started(RunId::new("r1")),
            &order(),
            vec![
                record("bank_manager", StageStatus::Completed, 50),
                record("customer", StageStatus::InProgress, 700),
            ],
        );
        let statuses: Vec<_> = report.stages.iter().map(|s| s.status).collect();
        assert_eq!(
            statuses,
            vec![
                StageStatus::Completed,
                StageStatus::InProgress,
                StageStatus::NotStarted
            ]
        );
        assert_eq!(report.current_stage, Some(StageName::new("customer")));
        assert_eq!(report.rows_committed(), 750);
        assert_eq!(report.completed_stages(), 1);
        assert!(report.stages[2].updated_at.is_none());
    }

    #[test]
    fn finished_run_has_no_current_stage() {
        let mut run = RunRecord::started(RunId::new("r1"));
        run.status = RunStatus::Completed;
        let report = RunStatusReport::build(
            run,
            &order(),
            order()
                .iter()
                .map(|s| record(s.as_str(), StageStatus::Completed, 1))
                .collect(),
        );
        assert!(report.current_stage.is_none());
        assert!(!report.is_resumable());
    }

    #[test]
    fn unregistered_stages_listed_last() {
        let report = RunStatusReport::build(
            RunRecord::started(RunId::new("r1")),
            &order(),
            vec![record("legacy", StageStatus::Completed, 3)],
        );
        assert_eq!(report.stages.len(), 4);
        assert_eq!(report.stages[3].stage, StageName::new("legacy"));
    }

    #[test]
    fn target_rows_filled_per_stage() {
        let report = RunStatusReport::build(
            RunRecord::started(RunId::new("r1")),
            &order(),
            vec![record("bank_manager", StageStatus::Completed, 50)],
        );
        assert!(report.stages.iter().all(|s| s.target_rows.is_none()));

        let report = report
            .with_target_rows(|s| Ok::<_, ()>(if s.as_str() == "bank_manager" { 48 } else { 0 }))
            .unwrap();
        let counts: Vec<_> = report.stages.iter().map(|s| s.target_rows).collect();
        assert_eq!(counts, vec![Some(48), Some(0), Some(0)]);

        let failed = RunStatusReport::build(RunRecord::started(RunId::new("r1")), &order(), vec![])
            .with_target_rows(|_| Err("target unreadable"));
        assert_eq!(failed.unwrap_err(), "target unreadable");
    }
}
