//! Daemon configuration: an optional TOML file, then `RAE_*` overrides.

use std::path::Path;

use anyhow::{Context, Result};
use rae_core::EngineConfig;

/// Load the engine configuration.
///
/// Missing sections keep their defaults. Environment overrides are applied
/// after the file, and the result is validated before it is returned.
pub fn load(path: Option<&Path>) -> Result<EngineConfig> {
    let mut config = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            toml::from_str::<EngineConfig>(&raw)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => EngineConfig::default(),
    };
    config
        .apply_env_overrides()
        .context("applying RAE_* environment overrides")?;
    config.validate().context("invalid engine configuration")?;
    Ok(config)
}
