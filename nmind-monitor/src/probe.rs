use std::{process::Stdio, time::Duration};

use tokio::process::Command;

/// Trait to allow different implementations of the single-probe
/// backend; the polling loop and tests only see this seam
#[async_trait::async_trait]
pub trait ProbeBackend: Send + Sync {
    /// One liveness probe against `ip`, bounded by `timeout`
    async fn probe(&self, ip: &str, timeout: Duration) -> bool;
}

/// ping(8)-based [`ProbeBackend`]: one echo request per probe, with
/// the reply deadline handed to ping itself via `-W`
pub struct PingClient;

#[async_trait::async_trait]
impl ProbeBackend for PingClient {
    async fn probe(&self, ip: &str, timeout: Duration) -> bool {
        let deadline = timeout.as_secs().max(1);
        let mut cmd = Command::new("ping");
        cmd.args(["-c", "1", "-W", &deadline.to_string(), ip])
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        // Outer guard: ping can outlive -W on resolver or interface
        // stalls. A hung probe just burns its budget; nothing is
        // force-cancelled beyond this.
        match tokio::time::timeout(timeout + Duration::from_secs(1), cmd.status()).await {
            Ok(Ok(status)) => status.success(),
            Ok(Err(e)) => {
                log::error!("Unable to spawn ping for {ip:}: {e:}");
                false
            }
            Err(_) => false,
        }
    }
}

/// Batched liveness check: up to `ping_count` probes, declaring online
/// the instant any one succeeds (the rest of the batch is skipped) and
/// offline only once all of them fail. The asymmetry is intentional —
/// alive devices confirm in one round trip, while a dead verdict costs
/// the full `ping_count * timeout` and so resists transient loss.
pub async fn check_device(
    backend: &dyn ProbeBackend,
    ip: &str,
    ping_count: u32,
    timeout: Duration,
) -> bool {
    for _ in 0..ping_count.max(1) {
        if backend.probe(ip, timeout).await {
            return true;
        }
    }
    false
}
