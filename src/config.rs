// src/config.rs

//! Configuration loading utilities.
//!
//! Both loaders apply the environment overrides (`SITEWATCH_WEBHOOK_URL`,
//! `GITHUB_TOKEN`) after reading the file.

use std::path::Path;

use crate::error::{AppError, Result};
use crate::models::Config;

/// Default configuration file name.
pub const DEFAULT_CONFIG_PATH: &str = "sitewatch.toml";

/// Load configuration from a TOML file.
///
/// Falls back to defaults if loading fails.
pub fn load_config(path: &Path) -> Config {
    let mut config = Config::load_or_default(path);
    config.apply_env();
    config
}

/// Load configuration from a TOML file and validate it.
///
/// A missing or unreadable file is an error here.
pub fn load_validated(path: &Path) -> Result<Config> {
    let mut config = Config::load(path)
        .map_err(|e| AppError::config(format!("Failed to load {}: {e}", path.display())))?;
    config.apply_env();
    config.validate()?;
    Ok(config)
}
