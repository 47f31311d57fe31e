use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;
use bankforge_engine::check_generation;

use super::load_config;

/// Execute the `check` command: validate config, registry and stores.
pub fn execute(config_path: &Path) -> Result<ExitCode> {
    let config = load_config(config_path)?;
    let result = check_generation(&config);

    print_check("Config", result.config_ok);
    print_check("Stage registry", result.registry_ok);
    print_check("Checkpoint store", result.state_ok);
    print_check("Target store", result.target_ok);
    if result.registry_ok {
        println!("  {} stages registered", result.stage_count);
    }
    for error in &result.errors {
        println!("  {error}");
    }

    if result.is_ok() {
        println!("\nAll checks passed.");
        Ok(ExitCode::SUCCESS)
    } else {
        anyhow::bail!("One or more checks failed")
    }
}

fn print_check(label: &str, ok: bool) {
    println!("{:18} {}", format!("{label}:"), if ok { "OK" } else { "FAILED" });
}
