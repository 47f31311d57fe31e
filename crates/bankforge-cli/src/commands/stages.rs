use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;
use bankforge_engine::resolve_registry;
use bankforge_types::state::StageName;

use super::load_config;

/// Execute the `stages` command: print the execution order.
pub fn execute(config_path: &Path) -> Result<ExitCode> {
    let config = load_config(config_path)?;
    let registry = resolve_registry(&config)?;

    println!("{} stages in execution order:", registry.len());
    for (i, stage) in registry.stages().iter().enumerate() {
        let deps = stage
            .deps
            .iter()
            .map(StageName::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        if deps.is_empty() {
            println!("  {:>2}. {}", i + 1, stage.name.as_str());
        } else {
            println!("  {:>2}. {:24} <- {}", i + 1, stage.name.as_str(), deps);
        }
    }
    Ok(ExitCode::SUCCESS)
}
