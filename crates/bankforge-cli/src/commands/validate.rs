use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;
use bankforge_engine::validate_generation;

use super::load_config;

/// Execute the `validate` command: integrity checks over the target data.
pub fn execute(config_path: &Path) -> Result<ExitCode> {
    let config = load_config(config_path)?;
    let report = validate_generation(&config)?;

    println!("{:22} {:>12} {:>12}", "STAGE", "ROWS", "EXPECTED");
    for s in &report.stages {
        let expected = s.expected.map_or_else(|| "-".to_string(), |e| e.to_string());
        println!("{:22} {:>12} {:>12}", s.stage.as_str(), s.rows, expected);
    }
    println!();

    if report.is_ok() {
        println!("No issues in {} rows.", report.total_rows());
        return Ok(ExitCode::SUCCESS);
    }
    println!("{} issue(s):", report.issues.len());
    for issue in &report.issues {
        println!("  {issue}");
    }
    Ok(ExitCode::FAILURE)
}
