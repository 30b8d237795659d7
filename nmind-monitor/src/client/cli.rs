use std::{process::Stdio, sync::Arc, time::Duration};

use tokio::process::Command;

use crate::{
    client::{ScanClientError, Scanner},
    Mac, ScanEntry,
};

// Sweep deadlines. arp-scan walks the subnet once; nmap host discovery
// can take considerably longer on sparse /24s.
const ARP_SCAN_TIMEOUT: Duration = Duration::from_secs(120);
const NMAP_TIMEOUT: Duration = Duration::from_secs(300);

/// Select a [`Scanner`] implementation by probing tool availability
/// once at startup, rather than re-deciding per sweep
pub async fn detect_scanner(interface: &str) -> Arc<dyn Scanner> {
    if tool_available("arp-scan").await {
        log::info!("Using arp-scan on {interface:} for discovery sweeps");
        Arc::new(ArpScanClient::new(interface))
    } else if tool_available("nmap").await {
        log::warn!("arp-scan not available, falling back to nmap host discovery");
        Arc::new(NmapScanClient)
    } else {
        log::error!(
            "Neither arp-scan nor nmap is available; sweeps will fail until one is installed"
        );
        Arc::new(ArpScanClient::new(interface))
    }
}

async fn tool_available(tool: &str) -> bool {
    Command::new(tool)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}

async fn run_for_stdout(
    mut cmd: Command,
    deadline: Duration,
) -> Result<String, ScanClientError> {
    let output = tokio::time::timeout(deadline, cmd.output())
        .await
        .map_err(|_| ScanClientError::ScanErr(format!("Command timed out after {deadline:?}")))??;

    if output.status.success() {
        Ok(std::str::from_utf8(&output.stdout)?.to_string())
    } else {
        Err(ScanClientError::ScanErr(format!(
            "Failed CLI Command: exit status {:?}",
            output.status
        )))
    }
}

fn parse_mac(raw: &str) -> Option<Mac> {
    let octets = raw.split(':').collect::<Vec<_>>();
    if octets.len() == 6
        && octets
            .iter()
            .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()))
    {
        Some(raw.to_ascii_lowercase())
    } else {
        None
    }
}

/// Primary [`Scanner`]: one `arp-scan` pass over the subnet
pub struct ArpScanClient {
    interface: String,
}

impl ArpScanClient {
    pub fn new(interface: &str) -> Self {
        Self {
            interface: interface.to_string(),
        }
    }

    /// Data lines look like `192.168.1.1\taa:bb:cc:dd:ee:ff\tVendor`;
    /// banner and summary lines fail the ip/mac checks and drop out
    fn parse_scan_output(res: &str) -> Vec<ScanEntry> {
        res.lines()
            .filter_map(|line| {
                let parts = line.split_whitespace().collect::<Vec<_>>();
                if parts.len() < 2 {
                    return None;
                }
                parts[0].parse::<std::net::Ipv4Addr>().ok()?;
                parse_mac(parts[1]).map(|mac| (mac, parts[0].to_string()))
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl Scanner for ArpScanClient {
    async fn scan(&self, subnet: &str) -> Result<Vec<ScanEntry>, ScanClientError> {
        let mut cmd = Command::new("arp-scan");
        cmd.arg(format!("--interface={}", self.interface)).arg(subnet);
        let stdout = run_for_stdout(cmd, ARP_SCAN_TIMEOUT).await?;
        Ok(Self::parse_scan_output(&stdout))
    }
}

/// Fallback [`Scanner`]: `nmap -sn` host discovery, with MACs filled
/// in from the kernel ARP cache afterwards. Slower and lossier than
/// arp-scan; hosts whose MAC never shows up in the cache are skipped
/// (a later sweep will catch them).
pub struct NmapScanClient;

impl NmapScanClient {
    /// Grepable output: `Host: 192.168.1.1 (router.lan)\tStatus: Up`
    fn parse_grepable_hosts(res: &str) -> Vec<String> {
        res.lines()
            .filter_map(|line| {
                if !line.contains("Host:") || !line.contains("Up") {
                    return None;
                }
                let parts = line.split_whitespace().collect::<Vec<_>>();
                let ip = parts.get(1)?;
                ip.parse::<std::net::Ipv4Addr>().ok()?;
                Some(ip.to_string())
            })
            .collect()
    }

    /// `arp -n <ip>` table line: `192.168.1.42  ether  aa:bb:...  C  eth0`
    fn parse_arp_cache(res: &str, ip: &str) -> Option<Mac> {
        res.lines().find_map(|line| {
            if !line.contains(ip) {
                return None;
            }
            let parts = line.split_whitespace().collect::<Vec<_>>();
            parts.get(2).and_then(|raw| parse_mac(raw))
        })
    }

    async fn cached_mac(ip: &str) -> Option<Mac> {
        let mut cmd = Command::new("arp");
        cmd.args(["-n", ip]);
        match run_for_stdout(cmd, Duration::from_secs(5)).await {
            Ok(stdout) => Self::parse_arp_cache(&stdout, ip),
            Err(e) => {
                log::debug!("ARP cache lookup failed for {ip:}: {e:}");
                None
            }
        }
    }
}

#[async_trait::async_trait]
impl Scanner for NmapScanClient {
    async fn scan(&self, subnet: &str) -> Result<Vec<ScanEntry>, ScanClientError> {
        let mut cmd = Command::new("nmap");
        cmd.args(["-sn", "-oG", "-", subnet]);
        let stdout = run_for_stdout(cmd, NMAP_TIMEOUT).await?;

        let mut entries = Vec::new();
        for ip in Self::parse_grepable_hosts(&stdout) {
            if let Some(mac) = Self::cached_mac(&ip).await {
                entries.push((mac, ip));
            } else {
                log::debug!("No ARP cache entry for {ip:}, skipping this sweep");
            }
        }
        Ok(entries)
    }
}
