pub mod check;
pub mod clear;
pub mod run;
pub mod stages;
pub mod status;
pub mod validate;

use std::path::Path;

use anyhow::{Context, Result};
use bankforge_engine::config::parser;
use bankforge_engine::config::types::GenerationConfig;

/// Parse the generation config at `path`.
pub(crate) fn load_config(path: &Path) -> Result<GenerationConfig> {
    parser::parse_config(path)
        .with_context(|| format!("Failed to parse generation config: {}", path.display()))
}
