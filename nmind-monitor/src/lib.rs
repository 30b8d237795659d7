//! The `nmind-monitor` crate defines the monitoring core for the
//! net-minder system: two independently scheduled loops sharing one
//! device registry, plus the external-tool clients they drive.
//!
//! The crate exposes a top-level [`monitor`] entry point which spawns
//! long-lived tasks that act in coordination to meet the following
//! responsibilities:
//! 1. Periodically sweep the whole subnet for devices via a
//!    [`Scanner`] implementation (arp-scan primary, nmap fallback,
//!    selected once at startup by availability probing), resolve
//!    vendor labels via a [`VendorResolver`], and merge every observed
//!    `{ip, mac}` into the shared [`DeviceRegistry`]. Absence from a
//!    sweep is never treated as evidence a device went offline.
//! 2. Periodically poll all known, non-disabled devices with liveness
//!    probes via a [`ProbeBackend`]:
//!    a. Per-device start offsets from the stagger planner spread the
//!       probes evenly across the polling window instead of bursting
//!       them all at once
//!    b. A device is declared online the instant one probe succeeds;
//!       offline only after all configured probes fail
//!    c. Every transition is applied to the registry, appended to the
//!       [`nmindb::DeviceStore`], and logged
//! 3. Watch for the discovery trigger sentinel on a faster cadence
//!    ([`TRIGGER_POLL_SECS`]) so a manual discovery request is
//!    serviced without waiting out a full discovery interval. The
//!    discovery loop deletes the sentinel after servicing it.
//!
//! Per-device configuration is resolved through ordered regex overlays
//! on the vendor label (first declared match wins), so e.g. a chatty
//! vendor's devices can be polled less often than the global default.
//!
//! No error from the scanner, prober, or store may take down a loop:
//! each cycle body logs its failures and the loop keeps its schedule.

mod client;
mod config;
mod monitor;
mod probe;
mod registry;
mod stagger;

pub use client::{
    detect_scanner, ArpScanClient, NmapScanClient, OuiResolver, ScanClientError, Scanner,
    VendorResolver,
};
pub use config::{ConfigError, DeviceConfig, DeviceOverride, MonitorConfig};
pub use monitor::{monitor, MonitorHandle};
pub use probe::{check_device, PingClient, ProbeBackend};
pub use registry::{Device, DeviceRegistry, DeviceState, Transition};
pub use stagger::offsets;

/// [`Mac`] is a lowercase `aa:bb:cc:dd:ee:ff` hardware address, the
/// stable identity of a device (IPs move around under DHCP)
pub type Mac = String;

/// One subnet sweep observation: `(mac, ip)`
pub type ScanEntry = (Mac, String);

/// Vendor label used when resolution fails or is unavailable
pub const UNKNOWN_VENDOR: &str = "unknown";

// Cadence for checking the discovery trigger sentinel, independent of
// (and much faster than) the discovery interval itself
pub const TRIGGER_POLL_SECS: u64 = 5;
