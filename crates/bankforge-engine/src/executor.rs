//! Generation executor: walks the registry from the resume point and drives
//! every stage batch by batch through generation, import and checkpointing.
//!
//! Control flow is strictly sequential. The checkpoint for batch N is
//! durable before batch N+1 is generated, and a batch is either imported
//! and checkpointed or not counted at all.

use std::sync::Arc;
use std::time::Instant;

use bankforge_state::CheckpointStore;
use bankforge_types::cursor::StageCursor;
use bankforge_types::state::{RunId, StageName, StageStatus};
use tokio_util::sync::CancellationToken;

use crate::checkpoint::{CheckpointManager, HistoryScope, ResumeContext, RunSelector};
use crate::error::{CheckpointError, ExecutorError, GeneratorError};
use crate::generator::{ReferenceNeed, ReferenceSet, UpstreamRefs};
use crate::import::{load_all_keys, BatchImporter, ReferenceSource};
use crate::registry::{StageDef, StageRegistry};
use crate::result::{RunFailure, RunOutcome, RunSummary, StageSummary};

/// Per-invocation options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Reopen the latest resumable run instead of starting a new one.
    pub resume: bool,
    /// Mark every stage before this one completed without executing it.
    pub skip_to: Option<StageName>,
    pub batch_size: usize,
    /// Purge all checkpoint history before starting.
    pub clear_history: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            resume: false,
            skip_to: None,
            batch_size: 1000,
            clear_history: false,
        }
    }
}

enum Flow {
    Finished,
    Cancelled,
}

/// Live numbers for the stage being executed.
struct StageRun {
    summary: StageSummary,
    /// Last committed cursor.
    cursor: StageCursor,
}

impl StageRun {
    fn new(stage: StageName) -> Self {
        Self {
            summary: StageSummary {
                stage,
                rows_committed: 0,
                rows_this_run: 0,
                batches: 0,
                skipped: false,
                elapsed: std::time::Duration::ZERO,
            },
            cursor: StageCursor::Start,
        }
    }
}

struct Failure {
    error: ExecutorError,
    stage: Option<StageName>,
    cursor: Option<StageCursor>,
}

impl From<ExecutorError> for Failure {
    fn from(error: ExecutorError) -> Self {
        Self {
            stage: error.stage().cloned(),
            error,
            cursor: None,
        }
    }
}

impl From<CheckpointError> for Failure {
    fn from(error: CheckpointError) -> Self {
        ExecutorError::from(error).into()
    }
}

/// Reference data prepared when a stage starts.
struct StageReferences {
    refs: UpstreamRefs,
    window: Option<StageName>,
    /// Loaded per batch from the window keys.
    scoped: Vec<(StageName, &'static str)>,
}

/// Drives a [`StageRegistry`] against a checkpoint store and a target.
pub struct GenerationExecutor {
    registry: StageRegistry,
    checkpoints: CheckpointManager,
    importer: Arc<dyn BatchImporter>,
    references: Arc<dyn ReferenceSource>,
    reference_page_size: usize,
}

impl GenerationExecutor {
    #[must_use]
    pub fn new(
        registry: StageRegistry,
        store: Arc<dyn CheckpointStore>,
        importer: Arc<dyn BatchImporter>,
        references: Arc<dyn ReferenceSource>,
    ) -> Self {
        Self {
            registry,
            checkpoints: CheckpointManager::new(store),
            importer,
            references,
            reference_page_size: 5000,
        }
    }

    /// Page size for loading lookup key sets.
    #[must_use]
    pub fn with_reference_page_size(mut self, page_size: usize) -> Self {
        self.reference_page_size = page_size.max(1);
        self
    }

    #[must_use]
    pub fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    #[must_use]
    pub fn checkpoints(&self) -> &CheckpointManager {
        &self.checkpoints
    }

    /// Execute the registry until every stage completes, a stage fails or
    /// `cancel` fires.
    pub fn run(&self, options: &RunOptions, cancel: &CancellationToken) -> RunOutcome {
        let started = Instant::now();
        if let Err(reason) = self.validate_options(options) {
            tracing::error!(reason = reason.as_str(), "Rejected run options");
            return RunOutcome::ConfigurationError(reason);
        }

        if options.clear_history {
            if let Err(e) = self.checkpoints.clear_history(&HistoryScope::All) {
                return RunOutcome::Failed(setup_failure(&ExecutorError::from(e)));
            }
        }

        let selector = if options.resume {
            RunSelector::Latest
        } else {
            RunSelector::Fresh
        };
        let ctx = match self
            .checkpoints
            .start_or_resume(selector, &self.registry.order())
        {
            Ok(ctx) => ctx,
            Err(e) => {
                let error = ExecutorError::from(e);
                tracing::error!(error = %error, "Could not start generation run");
                return RunOutcome::Failed(setup_failure(&error));
            }
        };

        let mut stages = Vec::with_capacity(self.registry.len());
        let result = self.execute(&ctx, options, cancel, &mut stages);
        let summary = RunSummary {
            run_id: ctx.run_id.clone(),
            resumed: ctx.resumed,
            stages,
            elapsed: started.elapsed(),
        };

        match result {
            Ok(Flow::Finished) => match self.checkpoints.complete_run(&ctx.run_id) {
                Ok(()) => {
                    tracing::info!(
                        run_id = ctx.run_id.as_str(),
                        rows = summary.rows_this_run(),
                        elapsed_secs = summary.elapsed.as_secs_f64(),
                        "Generation run completed"
                    );
                    RunOutcome::Completed(summary)
                }
                Err(e) => {
                    let failure = Failure::from(e);
                    self.finish_failed(&ctx, failure, summary)
                }
            },
            Ok(Flow::Cancelled) => {
                if let Err(e) = self.checkpoints.pause_run(&ctx.run_id) {
                    return self.finish_failed(&ctx, Failure::from(e), summary);
                }
                tracing::warn!(
                    run_id = ctx.run_id.as_str(),
                    rows = summary.rows_this_run(),
                    "Generation run interrupted; resume to continue"
                );
                RunOutcome::Interrupted(summary)
            }
            Err(failure) => self.finish_failed(&ctx, failure, summary),
        }
    }

    fn validate_options(&self, options: &RunOptions) -> Result<(), String> {
        if options.batch_size == 0 {
            return Err("batch size must be at least 1".to_string());
        }
        if options.clear_history && options.resume {
            return Err("clearing history and resuming are mutually exclusive".to_string());
        }
        if let Some(target) = &options.skip_to {
            self.registry
                .require(target)
                .map_err(|e| format!("cannot skip to stage: {e}"))?;
        }
        Ok(())
    }

    fn execute(
        &self,
        ctx: &ResumeContext,
        options: &RunOptions,
        cancel: &CancellationToken,
        summaries: &mut Vec<StageSummary>,
    ) -> Result<Flow, Failure> {
        let run_id = &ctx.run_id;
        let skip_before = options
            .skip_to
            .as_ref()
            .and_then(|s| self.registry.position(s))
            .unwrap_or(0);

        for (position, def) in self.registry.stages().iter().enumerate() {
            if position < skip_before && self.checkpoints.skip_stage(run_id, &def.name)? {
                tracing::warn!(
                    run_id = run_id.as_str(),
                    stage = def.name.as_str(),
                    "Stage marked completed without running"
                );
            }

            if let Some(record) = self.checkpoints.stage_record(run_id, &def.name)? {
                if record.status == StageStatus::Completed {
                    tracing::debug!(
                        run_id = run_id.as_str(),
                        stage = def.name.as_str(),
                        "Stage already completed"
                    );
                    let mut done = StageRun::new(def.name.clone());
                    done.summary.rows_committed = record.rows_committed;
                    done.summary.batches = record.batches_committed;
                    done.summary.skipped = record.skipped;
                    summaries.push(done.summary);
                    continue;
                }
            }

            let mut stage_run = StageRun::new(def.name.clone());
            let stage_started = Instant::now();
            let result = self.run_stage(run_id, def, options.batch_size, cancel, &mut stage_run);
            stage_run.summary.elapsed = stage_started.elapsed();
            let cursor = stage_run.cursor.clone();
            summaries.push(stage_run.summary);

            match result {
                Ok(Flow::Finished) => {}
                Ok(Flow::Cancelled) => return Ok(Flow::Cancelled),
                Err(error) => {
                    return Err(Failure {
                        error,
                        stage: Some(def.name.clone()),
                        cursor: Some(cursor),
                    })
                }
            }
        }
        Ok(Flow::Finished)
    }

    fn run_stage(
        &self,
        run_id: &RunId,
        def: &StageDef,
        batch_size: usize,
        cancel: &CancellationToken,
        stage_run: &mut StageRun,
    ) -> Result<Flow, ExecutorError> {
        let stage = &def.name;
        for dep in &def.deps {
            let done = self
                .checkpoints
                .stage_record(run_id, dep)?
                .is_some_and(|r| r.status == StageStatus::Completed);
            if !done {
                return Err(ExecutorError::DependencyNotCompleted {
                    stage: stage.clone(),
                    dependency: dep.clone(),
                });
            }
        }

        let progress = self.checkpoints.begin_stage(run_id, stage)?;
        stage_run.cursor = progress.cursor.clone();
        stage_run.summary.rows_committed = progress.rows_committed;
        stage_run.summary.batches = progress.batches_committed;
        tracing::info!(
            run_id = run_id.as_str(),
            stage = stage.as_str(),
            cursor = %progress.cursor,
            rows = progress.rows_committed,
            "Stage started"
        );

        let StageReferences {
            mut refs,
            window,
            scoped,
        } = self.load_references(def)?;
        let mut cursor = progress.cursor;

        loop {
            if cancel.is_cancelled() {
                tracing::warn!(
                    run_id = run_id.as_str(),
                    stage = stage.as_str(),
                    cursor = %cursor,
                    "Cancellation requested; stopping before next batch"
                );
                return Ok(Flow::Cancelled);
            }

            if let Some(window_stage) = &window {
                let after = cursor.as_last_key().map_err(|()| ExecutorError::Generator {
                    stage: stage.clone(),
                    source: GeneratorError::UnexpectedCursor(cursor.clone()),
                })?;
                let keys = self
                    .references
                    .page_keys(window_stage, after, batch_size)
                    .map_err(|source| ExecutorError::Reference {
                        stage: stage.clone(),
                        reference: window_stage.clone(),
                        source,
                    })?;
                for (reference, prefix) in &scoped {
                    let owned = self.load_scoped(stage, reference, prefix, &keys)?;
                    refs.insert_lookup(reference.clone(), owned);
                }
                refs.set_window(keys);
            }

            let batch = def
                .generator
                .produce_batch(&refs, &cursor, batch_size)
                .map_err(|source| ExecutorError::Generator {
                    stage: stage.clone(),
                    source,
                })?;
            if !batch.exhausted && batch.next_cursor == cursor {
                return Err(ExecutorError::GeneratorStalled {
                    stage: stage.clone(),
                    cursor,
                });
            }

            if cancel.is_cancelled() {
                tracing::warn!(
                    run_id = run_id.as_str(),
                    stage = stage.as_str(),
                    cursor = %cursor,
                    rows = batch.rows.len(),
                    "Cancellation requested; abandoning uncommitted batch"
                );
                return Ok(Flow::Cancelled);
            }

            let committed = if batch.rows.is_empty() {
                0
            } else {
                let committed = self
                    .importer
                    .import(stage, &batch.rows)
                    .map_err(|source| ExecutorError::Import {
                        stage: stage.clone(),
                        source,
                    })?;
                if committed != batch.rows.len() as u64 {
                    tracing::warn!(
                        stage = stage.as_str(),
                        generated = batch.rows.len(),
                        committed,
                        "Importer committed a different number of rows than generated"
                    );
                }
                committed
            };

            if committed > 0 || batch.next_cursor != cursor {
                let progress = self.checkpoints.record_batch_progress(
                    run_id,
                    stage,
                    &batch.next_cursor,
                    committed,
                )?;
                stage_run.cursor = progress.cursor;
                stage_run.summary.rows_committed = progress.rows_committed;
                stage_run.summary.batches = progress.batches_committed;
                stage_run.summary.rows_this_run += committed;
                tracing::debug!(
                    run_id = run_id.as_str(),
                    stage = stage.as_str(),
                    cursor = %batch.next_cursor,
                    rows = committed,
                    total_rows = progress.rows_committed,
                    "Batch committed"
                );
            }

            cursor = batch.next_cursor;
            if batch.exhausted {
                break;
            }
        }

        self.checkpoints.complete_stage(run_id, stage)?;
        tracing::info!(
            run_id = run_id.as_str(),
            stage = stage.as_str(),
            rows = stage_run.summary.rows_committed,
            batches = stage_run.summary.batches,
            "Stage completed"
        );
        Ok(Flow::Finished)
    }

    /// Load every lookup the stage declares and name its window stage.
    fn load_references(&self, def: &StageDef) -> Result<StageReferences, ExecutorError> {
        let mut loaded = StageReferences {
            refs: UpstreamRefs::new(),
            window: None,
            scoped: Vec::new(),
        };
        for need in def.generator.references() {
            match need {
                ReferenceNeed::Lookup(reference) => {
                    let keys =
                        load_all_keys(self.references.as_ref(), &reference, self.reference_page_size)
                            .map_err(|source| ExecutorError::Reference {
                                stage: def.name.clone(),
                                reference: reference.clone(),
                                source,
                            })?;
                    tracing::debug!(
                        stage = def.name.as_str(),
                        reference = reference.as_str(),
                        keys = keys.len(),
                        "Loaded reference keys"
                    );
                    loaded
                        .refs
                        .insert_lookup(reference, ReferenceSet::new(keys));
                }
                ReferenceNeed::Window(reference) => loaded.window = Some(reference),
                ReferenceNeed::Scoped { stage, prefix } => loaded.scoped.push((stage, prefix)),
            }
        }
        Ok(loaded)
    }

    /// Keys of `reference` owned by the current window.
    fn load_scoped(
        &self,
        stage: &StageName,
        reference: &StageName,
        prefix: &str,
        window: &[String],
    ) -> Result<ReferenceSet, ExecutorError> {
        let Some((start, end)) = ReferenceNeed::scope_range(prefix, window) else {
            return Ok(ReferenceSet::default());
        };
        let keys = self
            .references
            .range_keys(reference, &start, end.as_deref())
            .map_err(|source| ExecutorError::Reference {
                stage: stage.clone(),
                reference: reference.clone(),
                source,
            })?;
        tracing::trace!(
            stage = stage.as_str(),
            reference = reference.as_str(),
            keys = keys.len(),
            "Loaded scoped reference keys"
        );
        Ok(ReferenceSet::new(keys))
    }

    fn finish_failed(
        &self,
        ctx: &ResumeContext,
        failure: Failure,
        summary: RunSummary,
    ) -> RunOutcome {
        let reason = failure.error.to_string();
        let store_failed = matches!(
            failure.error,
            ExecutorError::Checkpoint(CheckpointError::Store(_))
        );
        tracing::error!(
            run_id = ctx.run_id.as_str(),
            stage = failure.stage.as_ref().map(StageName::as_str),
            cursor = failure.cursor.as_ref().map(ToString::to_string),
            error = reason.as_str(),
            "Generation run failed"
        );

        // A broken checkpoint store gets no further writes.
        if !store_failed {
            if let Some(stage) = &failure.stage {
                if let Err(e) = self.checkpoints.fail_stage(&ctx.run_id, stage, &reason) {
                    tracing::error!(error = %e, "Could not record stage failure");
                }
            }
            if let Err(e) = self.checkpoints.fail_run(&ctx.run_id, &reason) {
                tracing::error!(error = %e, "Could not record run failure");
            }
        }

        // Every stage summarised ahead of the failing one has completed.
        let progressed = ctx.has_progress
            || summary
                .stages
                .iter()
                .any(|s| s.batches > 0 || Some(&s.stage) != failure.stage.as_ref());
        RunOutcome::Failed(RunFailure {
            run_id: Some(ctx.run_id.clone()),
            stage: failure.stage,
            cursor: failure.cursor,
            resumable: failure.error.is_resumable() && progressed,
            reason,
            summary: Some(summary),
        })
    }
}

fn setup_failure(error: &ExecutorError) -> RunFailure {
    RunFailure {
        run_id: None,
        stage: None,
        cursor: None,
        reason: error.to_string(),
        resumable: false,
        summary: None,
    }
}
