// Last used VPN persistence

//! Persistent "last successfully connected service" key
//!
//! Stored as a single key in a small TOML settings file under the user's
//! configuration directory, so it survives restarts. Absent file or key
//! means no prior selection.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

const APP_DIR: &str = "vpn-toggle";
const SETTINGS_FILE: &str = "settings.toml";

/// On-disk layout of the settings file
#[derive(Debug, Default, Serialize, Deserialize)]
struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_used_vpn: Option<String>,
}

/// Default settings location: `<config_dir>/vpn-toggle/settings.toml`
pub fn default_settings_path() -> Result<PathBuf> {
    let dir = dirs::config_dir().context("Could not determine user configuration directory")?;
    Ok(dir.join(APP_DIR).join(SETTINGS_FILE))
}

/// Store for the last used service name
#[derive(Debug)]
pub struct LastUsedStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process
    lock: Mutex<()>,
}

impl LastUsedStore {
    /// Create a store backed by the given settings file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Settings file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remember `name` as the last successfully connected service
    pub fn save(&self, name: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut settings = self.read_settings()?;
        settings.last_used_vpn = Some(name.to_string());
        self.write_settings(&settings)?;
        log::debug!("Saved last used VPN: {}", name);
        Ok(())
    }

    /// Last saved service name, if any
    pub fn load(&self) -> Result<Option<String>> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.read_settings()?.last_used_vpn)
    }

    /// Forget the saved name
    pub fn clear(&self) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut settings = self.read_settings()?;
        if settings.last_used_vpn.take().is_none() {
            return Ok(());
        }
        self.write_settings(&settings)
    }

    fn read_settings(&self) -> Result<Settings> {
        if !self.path.exists() {
            return Ok(Settings::default());
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings file {:?}", self.path))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse settings file {:?}", self.path))
    }

    /// Write to a sibling temp file, then rename into place
    fn write_settings(&self, settings: &Settings) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                fs::create_dir_all(dir).context("Failed to create settings directory")?;
            }
        }

        let contents = toml::to_string(settings).context("Failed to serialize settings")?;
        let tmp_path = self.path.with_extension("toml.tmp");
        fs::write(&tmp_path, contents).context("Failed to write settings file")?;
        fs::rename(&tmp_path, &self.path).context("Failed to replace settings file")?;

        Ok(())
    }
}
