use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use chrono::{DateTime, Local};
use regex::Regex;

use crate::{
    config::{DeviceConfig, DeviceOverride},
    Mac, UNKNOWN_VENDOR,
};

/// [`DeviceState`] tracks whether a device is answering probes.
/// `Unknown` only exists between first discovery and first poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Unknown,
    Online,
    Offline,
}

impl DeviceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceState::Unknown => "unknown",
            DeviceState::Online => "online",
            DeviceState::Offline => "offline",
        }
    }
}

impl std::fmt::Display for DeviceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One known device, keyed by MAC. The IP is advisory and may go stale
/// between sweeps.
#[derive(Debug, Clone)]
pub struct Device {
    pub mac: Mac,
    pub ip: String,
    pub vendor: String,
    pub state: DeviceState,
    pub last_transition: DateTime<Local>,
    pub last_poll: Option<DateTime<Local>>,
    /// Last time anything was appended to this device's log
    pub last_record: Option<DateTime<Local>>,
}

impl Device {
    /// Whether this device's effective polling interval has elapsed
    pub fn due(&self, cfg: &DeviceConfig, now: DateTime<Local>) -> bool {
        match self.last_poll {
            None => true,
            Some(t) => (now - t).num_seconds() >= cfg.polling_interval_seconds as i64,
        }
    }
}

/// An observed online/offline edge, returned by
/// [`DeviceRegistry::apply_probe`] so logging and persistence happen
/// outside the registry lock
#[derive(Debug, Clone)]
pub struct Transition {
    pub mac: Mac,
    pub ip: String,
    pub vendor: String,
    pub from: DeviceState,
    pub to: DeviceState,
    pub at: DateTime<Local>,
    pub seconds_since_last: i64,
}

struct Overlay {
    pattern: Regex,
    overrides: DeviceOverride,
}

/// The shared in-memory map of known devices, mutated by both the
/// discovery and polling loops. Every operation takes the single
/// registry lock for O(1)-ish work and never performs I/O while
/// holding it. Overlay patterns are compiled once at construction; a
/// malformed pattern is skipped with a warning and its devices fall
/// back to the global defaults.
pub struct DeviceRegistry {
    devices: Mutex<HashMap<Mac, Device>>,
    overlays: Vec<Overlay>,
    defaults: DeviceConfig,
}

impl DeviceRegistry {
    pub fn new(defaults: DeviceConfig, overrides: &[DeviceOverride]) -> Self {
        let overlays = overrides
            .iter()
            .filter_map(|o| match Regex::new(&o.pattern) {
                Ok(pattern) => Some(Overlay {
                    pattern,
                    overrides: o.clone(),
                }),
                Err(e) => {
                    log::warn!(
                        "Skipping malformed device override pattern {:?}: {e:}",
                        o.pattern
                    );
                    None
                }
            })
            .collect();

        Self {
            devices: Mutex::new(HashMap::new()),
            overlays,
            defaults,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Mac, Device>> {
        self.devices.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert-or-merge a sweep observation by MAC. Existing state,
    /// transition timestamp, and poll bookkeeping are preserved; only
    /// the advisory IP (and vendor label, when resolution succeeded)
    /// are refreshed. Re-applying an unchanged sweep is a no-op.
    pub fn upsert(&self, mac: Mac, ip: String, vendor: String, now: DateTime<Local>) {
        let mut devices = self.lock();
        devices
            .entry(mac.clone())
            .and_modify(|d| {
                d.ip.clone_from(&ip);
                if vendor != UNKNOWN_VENDOR {
                    d.vendor.clone_from(&vendor);
                }
            })
            .or_insert_with(|| {
                log::info!("New device discovered: {vendor:} ({mac:}) at {ip:}");
                Device {
                    mac,
                    ip,
                    vendor,
                    state: DeviceState::Unknown,
                    last_transition: now,
                    last_poll: None,
                    last_record: None,
                }
            });
    }

    /// Warm-start insert from the persisted store. Never clobbers a
    /// device the loops have already touched.
    pub fn seed(&self, device: Device) {
        let mut devices = self.lock();
        devices.entry(device.mac.clone()).or_insert(device);
    }

    /// Point-in-time copy of all known devices. Callers iterate the
    /// copy; the loops are never blocked by a slow consumer.
    pub fn snapshot(&self) -> Vec<Device> {
        self.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Resolve the effective configuration for a device: first overlay
    /// (in declaration order) whose pattern matches the vendor label,
    /// merged over the global defaults.
    pub fn effective_config(&self, device: &Device) -> DeviceConfig {
        for overlay in &self.overlays {
            if overlay.pattern.is_match(&device.vendor) {
                return self.defaults.merged(&overlay.overrides);
            }
        }
        self.defaults
    }

    /// Apply one probe result. A success moves any non-online state to
    /// online; an exhausted failure moves any non-offline state to
    /// offline; an unchanged result is no transition. Poll bookkeeping
    /// is updated either way.
    pub fn apply_probe(&self, mac: &str, online: bool, now: DateTime<Local>) -> Option<Transition> {
        let mut devices = self.lock();
        let device = devices.get_mut(mac)?;
        device.last_poll = Some(now);

        let to = if online {
            DeviceState::Online
        } else {
            DeviceState::Offline
        };
        if device.state == to {
            return None;
        }

        let from = device.state;
        let seconds_since_last = (now - device.last_transition).num_seconds();
        device.state = to;
        device.last_transition = now;
        device.last_record = Some(now);

        Some(Transition {
            mac: device.mac.clone(),
            ip: device.ip.clone(),
            vendor: device.vendor.clone(),
            from,
            to,
            at: now,
            seconds_since_last,
        })
    }

    /// Heartbeat gate for unchanged states: true (and bumps the record
    /// timestamp) at most once per `every_secs` per device
    pub fn heartbeat_due(&self, mac: &str, every_secs: u64, now: DateTime<Local>) -> bool {
        let mut devices = self.lock();
        if let Some(device) = devices.get_mut(mac) {
            let due = match device.last_record {
                None => true,
                Some(t) => (now - t).num_seconds() >= every_secs as i64,
            };
            if due {
                device.last_record = Some(now);
            }
            due
        } else {
            false
        }
    }
}
