// Shared types between components

//! Shared data structures
//!
//! This module defines the connection data model used by every component
//! (parser, registry, controller) and the configuration structures loaded
//! from the TOML config file.

use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;

/// Live status of one VPN service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Status {
    /// Tunnel is up
    Connected,
    /// Connect issued, not yet confirmed
    Connecting,
    /// Disconnect issued, not yet confirmed
    Disconnecting,
    /// Tunnel is down
    #[default]
    Disconnected,
    /// Last status read was unrecognized or failed. Not terminal.
    Invalid,
}

impl Status {
    /// Lowercase word as printed by the OS (and written to the snapshot file)
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Connected => "connected",
            Status::Connecting => "connecting",
            Status::Disconnecting => "disconnecting",
            Status::Disconnected => "disconnected",
            Status::Invalid => "invalid",
        }
    }

    /// Whether this status counts towards the aggregate "any active" flag
    pub fn is_active(&self) -> bool {
        matches!(self, Status::Connected | Status::Connecting)
    }

    /// Optimistic markers set while an action is outstanding
    pub fn is_transient(&self) -> bool {
        matches!(self, Status::Connecting | Status::Disconnecting)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A VPN-capable network service configured in the OS
///
/// Identity is the name: the OS exposes no stable id for named services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    /// Service name, unique within one discovery
    pub name: String,
    /// OS service-type label (`VPN`, `L2TP`, ...)
    pub hardware_port: String,
    /// Device name, may legitimately be empty
    pub device: String,
    /// Last known status
    pub status: Status,
}

impl Connection {
    /// Create a connection in the initial Disconnected state
    pub fn new(name: impl Into<String>, hardware_port: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hardware_port: hardware_port.into(),
            device: String::new(),
            status: Status::Disconnected,
        }
    }

    /// Builder method to set the device
    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = device.into();
        self
    }

    /// Builder method to set the status
    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }
}

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    /// `[general]` section
    #[serde(default)]
    pub general: GeneralConfig,
    /// `[gateway]` section
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// `[watch]` section
    #[serde(default)]
    pub watch: WatchConfig,
    /// `[storage]` section
    #[serde(default)]
    pub storage: StorageConfig,
}

/// General configuration options
#[derive(Debug, Deserialize, Clone)]
pub struct GeneralConfig {
    /// Default `env_logger` filter, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Wait after connect/disconnect before re-checking status
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// Extra service names to hide, on top of the built-in exclusions
    #[serde(default)]
    pub excluded_services: Vec<String>,
    /// Where the daemon exports snapshots for status bars
    #[serde(default)]
    pub state_file: Option<PathBuf>,
}

/// Settings for the OS command gateway
#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    /// Path of the `networksetup` binary
    #[serde(default = "default_networksetup_path")]
    pub networksetup_path: PathBuf,
}

/// Network change observer settings
#[derive(Debug, Deserialize, Clone)]
pub struct WatchConfig {
    /// How often interface addresses are sampled
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Quiet period before a change is reported
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

/// Persistent settings location
#[derive(Debug, Deserialize, Clone, Default)]
pub struct StorageConfig {
    /// Defaults to `<config_dir>/vpn-toggle/settings.toml`
    #[serde(default)]
    pub settings_file: Option<PathBuf>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            settle_delay_ms: default_settle_delay_ms(),
            excluded_services: Vec::new(),
            state_file: None,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            networksetup_path: default_networksetup_path(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

// Default values for configuration
fn default_log_level() -> String {
    "info".to_string()
}

fn default_settle_delay_ms() -> u64 {
    2000
}

fn default_networksetup_path() -> PathBuf {
    PathBuf::from("/usr/sbin/networksetup")
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_debounce_ms() -> u64 {
    500
}
