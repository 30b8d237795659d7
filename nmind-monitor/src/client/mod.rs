/// Mod for the external-tool collaborators: subnet scanners (arp-scan
/// primary, nmap fallback) and vendor-label resolution. The loops only
/// ever see the traits; concrete clients are chosen at startup.
mod cli;
mod vendor;

pub use cli::{detect_scanner, ArpScanClient, NmapScanClient};
pub use vendor::OuiResolver;

use thiserror::Error;

use crate::ScanEntry;

#[derive(Error, Debug)]
pub enum ScanClientError {
    #[error("I/O Error")]
    Io(#[from] std::io::Error),
    #[error("Str utf8 parse Error")]
    StrParse(#[from] std::str::Utf8Error),
    #[error("Scan Client Error {0}")]
    ScanErr(String),
}

/// Trait to allow different implementations of the full-subnet sweep.
/// A sweep is best-effort and lossy on crowded subnets; an empty
/// result is valid output, not an error.
#[async_trait::async_trait]
pub trait Scanner: Send + Sync {
    async fn scan(&self, subnet: &str) -> Result<Vec<ScanEntry>, ScanClientError>;
}

/// Trait for MAC-to-vendor-label resolution. The surface is
/// infallible: any lookup failure degrades to
/// [`crate::UNKNOWN_VENDOR`].
#[async_trait::async_trait]
pub trait VendorResolver: Send + Sync {
    async fn resolve(&self, mac: &str) -> String;
}
