use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use bankforge_engine::result::{RunFailure, RunSummary};
use bankforge_engine::{run_generation, RunOptions, RunOutcome};
use bankforge_types::state::StageName;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::load_config;

/// Flags of the `run` command.
pub struct RunArgs {
    pub resume: bool,
    pub skip_to: Option<String>,
    pub batch_size: Option<usize>,
    pub clear_history: bool,
}

/// Execute the `run` command: generate, checkpoint, and report.
///
/// SIGINT and SIGTERM stop the run after the batch in flight; a later
/// `run --resume` continues from there. A second signal exits at once with
/// status 130.
pub async fn execute(config_path: &Path, args: RunArgs) -> Result<ExitCode> {
    let mut config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            println!("Configuration error: {e:#}");
            return Ok(ExitCode::from(2));
        }
    };
    if let Some(batch_size) = args.batch_size {
        config.run.batch_size = batch_size;
    }

    let options = RunOptions {
        resume: args.resume,
        skip_to: args.skip_to.map(StageName::new),
        batch_size: config.run.batch_size,
        clear_history: args.clear_history,
    };

    let cancel = CancellationToken::new();
    let signals = cancel_on_signal(cancel.clone());
    let outcome = tokio::task::spawn_blocking(move || run_generation(&config, &options, &cancel))
        .await
        .context("Generation task panicked")?;
    signals.abort();

    print_outcome(&outcome);
    Ok(exit_code(&outcome))
}

fn exit_code(outcome: &RunOutcome) -> ExitCode {
    ExitCode::from(u8::try_from(outcome.exit_code()).unwrap_or(1))
}

/// Exit status for a run abandoned by a second signal.
const FORCED_EXIT: u8 = 130;

/// Cancel `token` on the first SIGINT or SIGTERM and exit the process on
/// the second.
fn cancel_on_signal(token: CancellationToken) -> JoinHandle<()> {
    let (tx, rx) = mpsc::channel(4);
    tokio::spawn(forward_signals(tx));
    tokio::spawn(async move {
        if let Some(code) = escalate(&token, rx).await {
            std::process::exit(i32::from(code));
        }
    })
}

/// First signal cancels `token` so the run stops after the batch in flight.
/// A signal received after that returns the forced exit status; the batch
/// in flight is abandoned and the last checkpoint stands.
async fn escalate(
    token: &CancellationToken,
    mut signals: mpsc::Receiver<&'static str>,
) -> Option<u8> {
    while let Some(signal) = signals.recv().await {
        if token.is_cancelled() {
            tracing::error!(signal, "Received second signal, exiting without waiting");
            return Some(FORCED_EXIT);
        }
        tracing::warn!(
            signal,
            "Stopping after the current batch; signal again to exit immediately"
        );
        token.cancel();
    }
    None
}

async fn forward_signals(tx: mpsc::Sender<&'static str>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigint, mut sigterm) =
            match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
                (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
                (Err(e), _) | (_, Err(e)) => {
                    tracing::error!(error = %e, "Could not install signal handlers");
                    return;
                }
            };
        loop {
            let name = tokio::select! {
                _ = sigint.recv() => "SIGINT",
                _ = sigterm.recv() => "SIGTERM",
            };
            if tx.send(name).await.is_err() {
                return;
            }
        }
    }
    #[cfg(not(unix))]
    {
        while tokio::signal::ctrl_c().await.is_ok() {
            if tx.send("Ctrl-C").await.is_err() {
                return;
            }
        }
    }
}

fn print_outcome(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Completed(summary) => {
            println!("Run '{}' completed successfully.", summary.run_id);
            print_summary(summary);
        }
        RunOutcome::Interrupted(summary) => {
            println!("Run '{}' interrupted.", summary.run_id);
            print_summary(summary);
            println!("\nResume with: bankforge run --resume");
        }
        RunOutcome::Failed(failure) => print_failure(failure),
        RunOutcome::ConfigurationError(reason) => {
            println!("Configuration error: {reason}");
        }
    }
}

fn print_failure(failure: &RunFailure) {
    match &failure.run_id {
        Some(run_id) => println!("Run '{run_id}' failed."),
        None => println!("Run could not start."),
    }
    if let Some(stage) = &failure.stage {
        println!("  Stage:     {stage}");
    }
    if let Some(cursor) = &failure.cursor {
        println!("  Cursor:    {cursor}");
    }
    println!("  Reason:    {}", failure.reason);
    if let Some(summary) = &failure.summary {
        print_summary(summary);
    }
    if failure.resumable {
        println!("\nCommitted progress is kept. Resume with: bankforge run --resume");
    }
}

fn print_summary(summary: &RunSummary) {
    if summary.resumed {
        println!("  Resumed:   yes");
    }
    println!("  Rows this run:   {}", summary.rows_this_run());
    println!("  Rows committed:  {}", summary.rows_committed());
    println!("  Duration:        {:.2}s", summary.elapsed.as_secs_f64());
    if summary.elapsed.as_secs_f64() > 0.0 {
        #[allow(clippy::cast_precision_loss)]
        let rate = summary.rows_this_run() as f64 / summary.elapsed.as_secs_f64();
        println!("  Throughput:      {rate:.0} rows/sec");
    }
    println!();
    println!("  {:22} {:>12} {:>12} {:>8} {:>9}", "STAGE", "ROWS", "THIS RUN", "BATCHES", "SECS");
    for s in &summary.stages {
        let note = if s.skipped { "  (skipped)" } else { "" };
        println!(
            "  {:22} {:>12} {:>12} {:>8} {:>9.2}{}",
            s.stage.as_str(),
            s.rows_committed,
            s.rows_this_run,
            s.batches,
            s.elapsed.as_secs_f64(),
            note
        );
    }
}
