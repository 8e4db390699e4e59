//! Pipeline configuration loading.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;
use yieldtune_training::PipelineConfig;

pub const LOCAL_CONFIG_FILE: &str = "yieldtune.toml";

/// Load the pipeline configuration.
///
/// Precedence:
/// 1. `--config <path>` (must exist)
/// 2. `./yieldtune.toml` if present
/// 3. Defaults
pub fn load_config(explicit: Option<&Path>) -> Result<PipelineConfig> {
    if let Some(path) = explicit {
        return PipelineConfig::load_from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()));
    }

    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.is_file() {
        debug!(path = %local.display(), "using local configuration");
        return PipelineConfig::load_from_file(&local)
            .with_context(|| format!("Failed to load configuration from {}", local.display()));
    }

    debug!("no configuration file, using defaults");
    Ok(PipelineConfig::default())
}
