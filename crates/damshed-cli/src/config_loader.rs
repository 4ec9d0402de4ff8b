//! Configuration loading utilities for CLI commands

use anyhow::{Context, Result};
use damshed_core::config::{CliConfigOverrides, LayeredConfig, RunConfig};
use std::env;
use std::path::{Path, PathBuf};

use crate::errors;

/// Configuration file looked up in the workspace when --config is absent
pub const CONFIG_FILE: &str = "damshed.toml";

/// Layered configuration plus the file it was read from, if any
pub struct LoadedConfig {
    pub layered: LayeredConfig,
    pub file: Option<PathBuf>,
}

impl LoadedConfig {
    pub fn resolve(&self) -> Result<RunConfig> {
        Ok(self.layered.resolve()?)
    }
}

/// Locate the configuration file.
///
/// An explicit path must exist; the workspace default is optional.
fn config_file(explicit: Option<&Path>, overrides: &CliConfigOverrides) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if !path.is_file() {
            return Err(errors::config_file_not_found(path).into());
        }
        return Ok(Some(path.to_path_buf()));
    }

    let root = overrides
        .workspace
        .clone()
        .or_else(|| env::var_os("DAMSHED_WORKSPACE").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."));
    let candidate = root.join(CONFIG_FILE);
    Ok(candidate.is_file().then_some(candidate))
}

/// Load layered configuration: defaults, file, environment, then CLI overrides
pub fn load_config(explicit: Option<&Path>, overrides: CliConfigOverrides) -> Result<LoadedConfig> {
    let file = config_file(explicit, &overrides)?;

    let mut layered = LayeredConfig::with_defaults();
    if let Some(path) = &file {
        tracing::debug!(path = %path.display(), "Loading configuration file");
        layered = layered
            .load_from_file(path)
            .with_context(|| format!("Failed to load configuration file {}", path.display()))?;
    }

    let mut layered = layered.load_from_env();
    layered.update_from_cli(overrides);

    Ok(LoadedConfig { layered, file })
}
