//! Criterion benchmarks for the SQLite checkpoint store.
//!
//! These measure the checkpoint append that follows every imported batch
//! and the latest-record lookups done on resume and status queries.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use bankforge_state::prelude::*;

fn bench_append_checkpoint(c: &mut Criterion) {
    let mut group = c.benchmark_group("checkpoint/append");

    group.bench_function("in_progress_batch", |b| {
        let store = SqliteCheckpointStore::in_memory().unwrap();
        let run_id = RunId::new("RUN_bench");
        let stage = StageName::new("customer");
        let mut offset = 0u64;

        b.iter(|| {
            offset += 1000;
            let mut rec = CheckpointRecord::entered(run_id.clone(), stage.clone());
            rec.cursor = StageCursor::offset(offset);
            rec.rows_committed = offset;
            rec.batches_committed = offset / 1000;
            store.append_checkpoint(&rec).unwrap();
        });
    });

    group.finish();
}

fn bench_latest_checkpoints(c: &mut Criterion) {
    let mut group = c.benchmark_group("checkpoint/latest_per_stage");

    // History depth per stage: resume reads only the newest entry.
    for depth in [1u64, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("history", depth), &depth, |b, &depth| {
            let store = SqliteCheckpointStore::in_memory().unwrap();
            let run_id = RunId::new("RUN_bench");
            let stages: Vec<StageName> = (0..13)
                .map(|i| StageName::new(format!("stage_{i:02}")))
                .collect();
            for stage in &stages {
                for n in 1..=depth {
                    let mut rec = CheckpointRecord::entered(run_id.clone(), stage.clone());
                    rec.cursor = StageCursor::offset(n * 100);
                    rec.batches_committed = n;
                    store.append_checkpoint(&rec).unwrap();
                }
            }

            b.iter(|| {
                let latest = store.latest_checkpoints(&run_id).unwrap();
                assert_eq!(latest.len(), stages.len());
            });
        });
    }

    group.finish();
}

fn bench_run_status(c: &mut Criterion) {
    let mut group = c.benchmark_group("checkpoint/run_status");

    group.bench_function("create_and_pause", |b| {
        let store = SqliteCheckpointStore::in_memory().unwrap();
        let mut n = 0u64;

        b.iter(|| {
            n += 1;
            let run_id = RunId::new(format!("RUN_{n:08x}"));
            store.create_run(&RunRecord::started(run_id.clone())).unwrap();
            store
                .set_run_status(&run_id, RunStatus::Paused, None)
                .unwrap();
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_append_checkpoint,
    bench_latest_checkpoints,
    bench_run_status
);
criterion_main!(benches);
