//! The `nmindd` crate is the net-minder daemon: it wires the
//! [`nmind_monitor`] loops to the [`nmindb`] store, owns startup
//! (config, logging, registry warm-start) and shutdown.

use chrono::{Local, TimeZone};
use nmind_monitor::{Device, DeviceRegistry, DeviceState, UNKNOWN_VENDOR};
use nmindb::DeviceStore;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetMinderError {
    #[error("I/O Error")]
    Io(#[from] std::io::Error),
    #[error("Config Error")]
    Config(#[from] nmind_monitor::ConfigError),
    #[error("Store Error")]
    Store(#[from] nmindb::StoreError),
}

pub type NetMinderResult<T> = Result<T, NetMinderError>;

/// Seed the registry from the last recorded line of every device log,
/// so a restart resumes from the last durably observed state instead
/// of re-learning the subnet from scratch. Returns the seeded count.
pub fn warm_registry(registry: &DeviceRegistry, store: &DeviceStore) -> usize {
    let mut seeded = 0;
    for entry in store.last_entries() {
        let state = match entry.status.as_str() {
            "online" => DeviceState::Online,
            "offline" => DeviceState::Offline,
            _ => DeviceState::Unknown,
        };
        let last_transition = Local
            .from_local_datetime(&entry.timestamp)
            .single()
            .unwrap_or_else(Local::now);

        registry.seed(Device {
            mac: entry.mac,
            ip: entry.ip,
            // labels come back with the next sweep
            vendor: UNKNOWN_VENDOR.to_string(),
            state,
            last_transition,
            last_poll: None,
            last_record: None,
        });
        seeded += 1;
    }
    seeded
}

#[cfg(test)]
mod tests {
    use super::warm_registry;
    use nmind_monitor::{DeviceConfig, DeviceRegistry, DeviceState};
    use nmindb::{DeviceStore, LogEntry, TIMESTAMP_FMT};

    fn defaults() -> DeviceConfig {
        DeviceConfig {
            ping_count: 3,
            ping_timeout_seconds: 1,
            polling_interval_seconds: 3,
            disabled: false,
        }
    }

    #[test]
    fn check_registry_warm_start() {
        let dir = std::env::temp_dir().join(format!("nmindd-warm-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let store = DeviceStore::new(&dir).unwrap();

        let ts =
            chrono::NaiveDateTime::parse_from_str("2026-08-27T10:15:00", TIMESTAMP_FMT).unwrap();
        store
            .record(&LogEntry {
                timestamp: ts,
                ip: "192.168.1.10".to_string(),
                mac: "aa:bb:cc:dd:ee:01".to_string(),
                status: "online".to_string(),
                seconds_since_transition: 5,
            })
            .unwrap();
        store
            .record(&LogEntry {
                timestamp: ts,
                ip: "192.168.1.11".to_string(),
                mac: "aa:bb:cc:dd:ee:02".to_string(),
                status: "offline".to_string(),
                seconds_since_transition: 90,
            })
            .unwrap();

        let registry = DeviceRegistry::new(defaults(), &[]);
        assert_eq!(warm_registry(&registry, &store), 2);

        let devices = registry.snapshot();
        assert_eq!(devices.len(), 2);
        let offline = devices
            .iter()
            .find(|d| d.mac == "aa:bb:cc:dd:ee:02")
            .unwrap();
        assert_eq!(offline.state, DeviceState::Offline);
        assert_eq!(offline.ip, "192.168.1.11");
        // warm devices are immediately pollable
        assert!(offline.last_poll.is_none());
    }
}
