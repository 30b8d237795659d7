use std::{collections::HashMap, path::Path, time::Duration};

use crate::{client::VendorResolver, UNKNOWN_VENDOR};

const LOOKUP_URL: &str = "https://api.macvendors.com";
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(3);

/// [`VendorResolver`] backed by a local OUI table with an optional
/// network fallback. Neither source being available is non-fatal; a
/// device just keeps the `unknown` label until a later sweep.
pub struct OuiResolver {
    table: HashMap<String, String>,
    http: Option<reqwest::Client>,
}

impl OuiResolver {
    pub fn new(table_path: Option<&Path>, network_fallback: bool) -> Self {
        let table = match table_path {
            Some(path) => match std::fs::read_to_string(path) {
                Ok(raw) => Self::parse_table(&raw),
                Err(e) => {
                    log::warn!("Unable to read OUI table {path:?}: {e:}");
                    HashMap::new()
                }
            },
            None => HashMap::new(),
        };

        let http = if network_fallback {
            reqwest::Client::builder()
                .timeout(LOOKUP_TIMEOUT)
                .build()
                .map_err(|e| log::warn!("Unable to build vendor lookup client: {e:}"))
                .ok()
        } else {
            None
        };

        if !table.is_empty() {
            log::info!("Loaded {} OUI prefixes", table.len());
        }

        Self { table, http }
    }

    /// Table lines are `<prefix> <vendor name>`, prefix as `00:11:22`
    /// or bare `001122` hex, `#` comments and blanks skipped
    fn parse_table(raw: &str) -> HashMap<String, String> {
        raw.lines()
            .filter_map(|line| {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    return None;
                }
                let (prefix, vendor) = line.split_once(char::is_whitespace)?;
                let key = normalize_prefix(prefix)?;
                let vendor = vendor.trim();
                if vendor.is_empty() {
                    return None;
                }
                Some((key, vendor.to_string()))
            })
            .collect()
    }

    fn local_lookup(&self, mac: &str) -> Option<String> {
        let key = normalize_prefix(mac)?;
        self.table.get(&key).cloned()
    }

    async fn network_lookup(&self, mac: &str) -> Option<String> {
        let client = self.http.as_ref()?;
        match client.get(format!("{LOOKUP_URL}/{mac}")).send().await {
            Ok(resp) if resp.status().is_success() => {
                let vendor = resp.text().await.ok()?;
                let vendor = vendor.trim();
                (!vendor.is_empty()).then(|| vendor.to_string())
            }
            Ok(resp) => {
                log::debug!("Vendor lookup for {mac:} returned {}", resp.status());
                None
            }
            Err(e) => {
                log::debug!("Vendor lookup failed for {mac:}: {e:}");
                None
            }
        }
    }
}

/// First three octets as six lowercase hex digits
fn normalize_prefix(raw: &str) -> Option<String> {
    let hex = raw
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(6)
        .collect::<String>()
        .to_ascii_lowercase();
    (hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit())).then_some(hex)
}

#[async_trait::async_trait]
impl VendorResolver for OuiResolver {
    async fn resolve(&self, mac: &str) -> String {
        if let Some(vendor) = self.local_lookup(mac) {
            return vendor;
        }
        if let Some(vendor) = self.network_lookup(mac).await {
            return vendor;
        }
        UNKNOWN_VENDOR.to_string()
    }
}
