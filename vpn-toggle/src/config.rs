// Configuration file parser

//! Configuration file parsing and validation
//!
//! This module handles loading TOML configuration files and validating
//! their contents (timing bounds, paths, exclusion names).

use crate::types::Config;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Upper bound for the settle wait; anything longer is a typo
const MAX_SETTLE_DELAY_MS: u64 = 60_000;

/// Default configuration location: `<config_dir>/vpn-toggle/config.toml`
pub fn default_config_path() -> Result<PathBuf> {
    let dir = dirs::config_dir().context("Could not determine user configuration directory")?;
    Ok(dir.join("vpn-toggle").join("config.toml"))
}

/// Load configuration from TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;

    let config: Config = toml::from_str(&contents).context("Failed to parse config file")?;

    validate_config(&config)?;
    Ok(config)
}

/// Load configuration, falling back to defaults when the file does not exist
///
/// Only used for the default location; a path given explicitly on the
/// command line goes through [`load_config`] so a typo is reported.
pub fn load_config_or_default<P: AsRef<Path>>(path: P) -> Result<Config> {
    if !path.as_ref().exists() {
        return Ok(Config::default());
    }
    load_config(path)
}

/// Validate configuration values
fn validate_config(config: &Config) -> Result<()> {
    if config.general.log_level.trim().is_empty() {
        anyhow::bail!("log_level cannot be empty");
    }

    if config.general.settle_delay_ms > MAX_SETTLE_DELAY_MS {
        anyhow::bail!(
            "settle_delay_ms must be <= {}, got {}",
            MAX_SETTLE_DELAY_MS,
            config.general.settle_delay_ms
        );
    }

    for name in &config.general.excluded_services {
        if name.trim().is_empty() {
            anyhow::bail!("excluded_services cannot contain empty names");
        }
    }

    if config.gateway.networksetup_path.as_os_str().is_empty() {
        anyhow::bail!("networksetup_path cannot be empty");
    }

    if config.watch.poll_interval_ms == 0 {
        anyhow::bail!("poll_interval_ms must be > 0");
    }

    Ok(())
}
