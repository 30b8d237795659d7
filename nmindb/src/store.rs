use std::{
    collections::HashMap,
    fs::{self, OpenOptions},
    io::Write,
    path::PathBuf,
    sync::{Arc, Mutex, PoisonError},
};

use thiserror::Error;

use crate::LogEntry;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O Error")]
    Io(#[from] std::io::Error),
}

/// Derive a filesystem name from a device identifier. Keeps only
/// characters that are safe in a bare shell argument and strips any
/// leading `-`/`_` so the name can never be read as a command flag by
/// tooling that later inspects the directory.
pub fn sanitize_name(id: &str) -> String {
    let kept = id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ':' | '.' | '_' | '-'))
        .collect::<String>();
    kept.trim_start_matches(['-', '_']).to_string()
}

/// [`DeviceStore`] appends state log lines to one file per device under
/// a single directory. Each device file has its own lock; there is
/// deliberately no store-wide lock around file I/O, so a stuck or
/// corrupt file for one device cannot block appends for another.
pub struct DeviceStore {
    dir: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DeviceStore {
    /// Creates the devices directory if absent. Failure here is the one
    /// store error treated as fatal by the daemon.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &std::path::Path {
        &self.dir
    }

    fn file_lock(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Append one [`LogEntry`] to the device's file, creating it on
    /// demand. The write is fsynced before returning: a success here
    /// means the line survives a crash.
    pub fn record(&self, entry: &LogEntry) -> Result<(), StoreError> {
        let name = sanitize_name(&entry.mac);
        let path = self.dir.join(format!("{name}.csv"));

        let lock = self.file_lock(&name);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(entry.to_line().as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_all()?;
        Ok(())
    }

    /// The last parseable line of every device file, for warming the
    /// registry at startup. Corrupt lines and unreadable files are
    /// logged and skipped; they never fail the scan.
    pub fn last_entries(&self) -> Vec<LogEntry> {
        let listing = match fs::read_dir(&self.dir) {
            Ok(listing) => listing,
            Err(e) => {
                log::warn!("Unable to list device logs in {:?}: {e:}", self.dir);
                return Vec::new();
            }
        };

        let mut entries = Vec::new();
        for item in listing.flatten() {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some("csv") {
                continue;
            }

            let name = match path.file_stem().and_then(|s| s.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };

            let lock = self.file_lock(&name);
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

            let contents = match fs::read_to_string(&path) {
                Ok(contents) => contents,
                Err(e) => {
                    log::error!("Unable to read device log {path:?}: {e:}");
                    continue;
                }
            };

            if let Some(entry) = contents.lines().rev().find_map(LogEntry::parse) {
                entries.push(entry);
            } else if !contents.is_empty() {
                log::warn!("No parseable lines in device log {path:?}");
            }
        }
        entries
    }
}
