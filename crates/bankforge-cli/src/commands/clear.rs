use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;
use bankforge_engine::{clear_generation_history, HistoryScope};
use bankforge_types::state::RunId;

use super::load_config;

/// Execute the `clear` command: purge checkpoint history.
pub fn execute(config_path: &Path, all: bool, run: Option<&str>, last: bool) -> Result<ExitCode> {
    let scope = match (all, run, last) {
        (true, None, false) => HistoryScope::All,
        (false, Some(id), false) => HistoryScope::Run(RunId::new(id)),
        (false, None, true) => HistoryScope::Latest,
        _ => anyhow::bail!("Choose exactly one of --all, --run <ID> or --last"),
    };

    let config = load_config(config_path)?;
    let removed = clear_generation_history(&config, &scope)?;
    tracing::info!(removed, scope = ?scope, "Checkpoint history cleared");

    println!("Removed {removed} run(s) from checkpoint history.");
    println!("Generated data in {} was not touched.", config.target.path.display());
    Ok(ExitCode::SUCCESS)
}
