use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O Error")]
    Io(#[from] std::io::Error),
    #[error("Config parse Error")]
    Parse(#[from] serde_json::Error),
}

/// Top-level daemon configuration, loaded from a JSON file. Everything
/// except `subnet` has a default.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Subnet to sweep, e.g. `192.168.1.0/24`
    pub subnet: String,
    #[serde(default = "default_interface")]
    pub interface: String,
    #[serde(default = "default_discovery_interval")]
    pub discovery_interval_seconds: u64,
    #[serde(default = "default_polling_interval")]
    pub polling_interval_seconds: u64,
    #[serde(default = "default_ping_count")]
    pub ping_count: u32,
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout_seconds: u64,
    /// Upper bound on concurrently running probes per polling cycle
    #[serde(default = "default_parallel_probes")]
    pub parallel_probes: usize,
    #[serde(default = "default_devices_dir")]
    pub devices_dir: PathBuf,
    /// Sentinel path whose presence requests an immediate discovery run
    #[serde(default = "default_trigger_path")]
    pub trigger_path: PathBuf,
    /// When set, unchanged device states still get a log line at most
    /// once per this many seconds. None (the default) disables
    /// heartbeats entirely.
    #[serde(default)]
    pub heartbeat_interval_seconds: Option<u64>,
    /// Local OUI table for vendor resolution, consulted before any
    /// network lookup
    #[serde(default)]
    pub oui_table_path: Option<PathBuf>,
    /// Whether vendor resolution may fall back to a network lookup
    #[serde(default = "default_vendor_lookup")]
    pub vendor_lookup: bool,
    /// Ordered per-device overrides; the first pattern matching a
    /// device's vendor label wins
    #[serde(default)]
    pub device_overrides: Vec<DeviceOverride>,
}

fn default_interface() -> String {
    "eth0".to_string()
}

fn default_discovery_interval() -> u64 {
    300
}

fn default_polling_interval() -> u64 {
    3
}

fn default_ping_count() -> u32 {
    3
}

fn default_ping_timeout() -> u64 {
    1
}

fn default_parallel_probes() -> usize {
    16
}

fn default_devices_dir() -> PathBuf {
    PathBuf::from("devices")
}

fn default_trigger_path() -> PathBuf {
    PathBuf::from("discover.now")
}

fn default_vendor_lookup() -> bool {
    true
}

impl MonitorConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Global per-device defaults, before any overlay is applied
    pub fn defaults(&self) -> DeviceConfig {
        DeviceConfig {
            ping_count: self.ping_count,
            ping_timeout_seconds: self.ping_timeout_seconds,
            polling_interval_seconds: self.polling_interval_seconds,
            disabled: false,
        }
    }
}

/// Effective per-device settings after overlay resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceConfig {
    pub ping_count: u32,
    pub ping_timeout_seconds: u64,
    pub polling_interval_seconds: u64,
    pub disabled: bool,
}

impl DeviceConfig {
    pub fn merged(mut self, overlay: &DeviceOverride) -> Self {
        if let Some(ping_count) = overlay.ping_count {
            self.ping_count = ping_count;
        }
        if let Some(timeout) = overlay.ping_timeout_seconds {
            self.ping_timeout_seconds = timeout;
        }
        if let Some(interval) = overlay.polling_interval_seconds {
            self.polling_interval_seconds = interval;
        }
        if let Some(disabled) = overlay.disabled {
            self.disabled = disabled;
        }
        self
    }
}

/// A partial configuration keyed by a vendor-label regex. Only the
/// fields present override the defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceOverride {
    pub pattern: String,
    #[serde(default)]
    pub ping_count: Option<u32>,
    #[serde(default)]
    pub ping_timeout_seconds: Option<u64>,
    #[serde(default)]
    pub polling_interval_seconds: Option<u64>,
    #[serde(default)]
    pub disabled: Option<bool>,
}
