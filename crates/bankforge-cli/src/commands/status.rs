use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;
use bankforge_engine::{generation_status, list_generation_runs};
use bankforge_types::state::RunId;

use super::load_config;

/// Execute the `status` command: one run's stages, or a list of runs.
pub fn execute(config_path: &Path, run: Option<&str>, list: bool, limit: usize) -> Result<ExitCode> {
    let config = load_config(config_path)?;

    if list {
        let runs = list_generation_runs(&config, limit)?;
        if runs.is_empty() {
            println!("No runs recorded.");
            return Ok(ExitCode::SUCCESS);
        }
        println!("{:32} {:10} {:20} {:20}", "RUN", "STATUS", "STARTED", "UPDATED");
        for r in runs {
            println!(
                "{:32} {:10} {:20} {:20}",
                r.run_id.as_str(),
                r.status.as_str(),
                r.started_at.format("%Y-%m-%d %H:%M:%S"),
                r.updated_at.format("%Y-%m-%d %H:%M:%S"),
            );
        }
        return Ok(ExitCode::SUCCESS);
    }

    let run_id = run.map(RunId::new);
    let Some(report) = generation_status(&config, run_id.as_ref())? else {
        println!("No runs recorded.");
        return Ok(ExitCode::SUCCESS);
    };

    println!("Run:           {}", report.run.run_id);
    println!("Status:        {}", report.run.status);
    println!(
        "Started:       {}",
        report.run.started_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!(
        "Updated:       {}",
        report.run.updated_at.format("%Y-%m-%d %H:%M:%S")
    );
    if let Some(message) = &report.run.error_message {
        println!("Error:         {message}");
    }
    match &report.current_stage {
        Some(stage) => println!("Current stage: {stage}"),
        None => println!("Current stage: none (all stages completed)"),
    }
    println!("Rows:          {}", report.rows_committed());
    println!("Resumable:     {}", if report.is_resumable() { "yes" } else { "no" });
    println!();

    println!(
        "{:22} {:12} {:>12} {:>12} {:>8}  CURSOR",
        "STAGE", "STATUS", "ROWS", "IN TARGET", "BATCHES"
    );
    for s in &report.stages {
        let status = if s.skipped {
            format!("{} (skip)", s.status)
        } else {
            s.status.to_string()
        };
        let in_target = s
            .target_rows
            .map_or_else(|| "-".to_string(), |rows| rows.to_string());
        println!(
            "{:22} {:12} {:>12} {:>12} {:>8}  {}",
            s.stage.as_str(),
            status,
            s.rows_committed,
            in_target,
            s.batches_committed,
            s.cursor
        );
        if let Some(message) = &s.error_message {
            println!("  error: {message}");
        }
    }
    Ok(ExitCode::SUCCESS)
}
