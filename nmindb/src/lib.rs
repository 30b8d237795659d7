//! The `nmindb` crate defines the persistence layer for the net-minder
//! system. Device state history is kept as one append-only CSV file per
//! device under a configured directory, via [`DeviceStore`], to do the
//! following:
//!    1. Record every observed online/offline transition (and optional
//!       heartbeat) as an immutable [`LogEntry`] line, durable (fsynced)
//!       before the call returns
//!    2. Keep devices as independent failure domains: each device file
//!       has its own lock, and a corrupt or unreadable file for one
//!       device never blocks reads or writes for another
//!    3. Re-derive the latest known state of every device from the last
//!       parseable line of its file, so the registry can be warmed after
//!       a restart or crash without a database

mod entry;
mod store;

pub use entry::{LogEntry, TIMESTAMP_FMT};
pub use store::{sanitize_name, DeviceStore, StoreError};
