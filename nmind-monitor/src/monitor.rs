use std::{path::PathBuf, sync::Arc, time::Duration};

use chrono::Local;
use futures::StreamExt;
use nmindb::{DeviceStore, LogEntry};
use tokio::{
    sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    task::JoinHandle,
};

use crate::{
    client::{Scanner, VendorResolver},
    config::MonitorConfig,
    probe::{check_device, ProbeBackend},
    registry::DeviceRegistry,
    stagger, Transition, TRIGGER_POLL_SECS,
};

/// Handles to the three long-lived monitor tasks. Dropping the handle
/// aborts them, so the loops never hold up process shutdown.
pub struct MonitorHandle {
    discovery: JoinHandle<()>,
    polling: JoinHandle<()>,
    trigger: JoinHandle<()>,
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.discovery.abort();
        self.polling.abort();
        self.trigger.abort();
    }
}

/// Spawn the discovery loop, the polling loop, and the trigger
/// watcher against a shared registry and store. The loops run until
/// the returned handle is dropped.
pub fn monitor(
    cfg: MonitorConfig,
    registry: Arc<DeviceRegistry>,
    store: Arc<DeviceStore>,
    scanner: Arc<dyn Scanner>,
    vendors: Arc<dyn VendorResolver>,
    prober: Arc<dyn ProbeBackend>,
) -> MonitorHandle {
    let (trigger_tx, trigger_rx) = unbounded_channel();

    let trigger = spawn_trigger_watcher(
        cfg.trigger_path.clone(),
        Duration::from_secs(TRIGGER_POLL_SECS),
        trigger_tx,
    );
    let discovery = spawn_discovery_loop(cfg.clone(), registry.clone(), scanner, vendors, trigger_rx);
    let polling = spawn_polling_loop(cfg, registry, store, prober);

    MonitorHandle {
        discovery,
        polling,
        trigger,
    }
}

/// Watch for the discovery trigger sentinel. When the file shows up,
/// signal the discovery loop once and wait for the loop to delete the
/// sentinel (after servicing) before rearming.
fn spawn_trigger_watcher(
    path: PathBuf,
    every: Duration,
    tx: UnboundedSender<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(every);
        loop {
            tick.tick().await;
            if tx.is_closed() {
                break;
            }
            if path.exists() {
                log::info!("Discovery trigger {path:?} observed");
                if tx.send(()).is_err() {
                    break;
                }
                while path.exists() {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
        log::warn!("Trigger watcher task exiting");
    })
}

fn spawn_discovery_loop(
    cfg: MonitorConfig,
    registry: Arc<DeviceRegistry>,
    scanner: Arc<dyn Scanner>,
    vendors: Arc<dyn VendorResolver>,
    mut trigger_rx: UnboundedReceiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let interval = Duration::from_secs(cfg.discovery_interval_seconds);
        log::info!("Discovery task started (interval {interval:?})");

        let mut triggered = false;
        loop {
            run_discovery_cycle(
                &cfg.subnet,
                registry.as_ref(),
                scanner.as_ref(),
                vendors.as_ref(),
            )
            .await;

            // Sentinel is only cleared once its request was serviced
            if triggered {
                triggered = false;
                if let Err(e) = std::fs::remove_file(&cfg.trigger_path) {
                    log::warn!("Unable to clear trigger {:?}: {e:}", cfg.trigger_path);
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                sig = trigger_rx.recv() => {
                    if sig.is_none() {
                        break;
                    }
                    log::info!("Out-of-cycle discovery requested");
                    triggered = true;
                }
            }
        }
        log::warn!("Discovery task exiting");
    })
}

/// One full sweep: scan, resolve vendor labels, merge into the
/// registry. Devices absent from the sweep are left untouched — only
/// direct probes may change state. A failed or empty scan is a no-op
/// merge and the loop keeps its schedule.
pub async fn run_discovery_cycle(
    subnet: &str,
    registry: &DeviceRegistry,
    scanner: &dyn Scanner,
    vendors: &dyn VendorResolver,
) {
    log::info!("Starting subnet sweep of {subnet:}");
    match scanner.scan(subnet).await {
        Ok(entries) => {
            log::info!("Sweep complete: found {} devices", entries.len());
            let now = Local::now();
            for (mac, ip) in entries {
                let vendor = vendors.resolve(&mac).await;
                registry.upsert(mac, ip, vendor, now);
            }
        }
        Err(e) => {
            log::error!("Subnet sweep failed, registry left as-is: {e:}");
        }
    }
}

fn spawn_polling_loop(
    cfg: MonitorConfig,
    registry: Arc<DeviceRegistry>,
    store: Arc<DeviceStore>,
    prober: Arc<dyn ProbeBackend>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let interval = Duration::from_secs(cfg.polling_interval_seconds);
        log::info!("Polling task started (interval {interval:?})");
        loop {
            run_polling_cycle(&cfg, registry.as_ref(), store.as_ref(), prober.clone()).await;
            tokio::time::sleep(interval).await;
        }
    })
}

/// One polling cycle: snapshot the registry, keep the devices whose
/// effective interval has elapsed, fan staggered probes out over a
/// bounded worker pool, and apply/persist/log every transition. The
/// cycle awaits all of its workers, so a device's transition and
/// store append always land before its next cycle's probe.
pub async fn run_polling_cycle(
    cfg: &MonitorConfig,
    registry: &DeviceRegistry,
    store: &DeviceStore,
    prober: Arc<dyn ProbeBackend>,
) {
    let now = Local::now();
    let due = registry
        .snapshot()
        .into_iter()
        .filter_map(|device| {
            let device_cfg = registry.effective_config(&device);
            if device_cfg.disabled || !device.due(&device_cfg, now) {
                None
            } else {
                Some((device, device_cfg))
            }
        })
        .collect::<Vec<_>>();

    if due.is_empty() {
        return;
    }

    let window = Duration::from_secs(cfg.polling_interval_seconds);
    let offsets = stagger::offsets(due.len(), window);
    let heartbeat = cfg.heartbeat_interval_seconds;
    let limit = cfg.parallel_probes.max(1);

    futures::stream::iter(due.into_iter().zip(offsets))
        .for_each_concurrent(limit, |((device, device_cfg), offset)| {
            let prober = prober.clone();
            async move {
                tokio::time::sleep(offset).await;

                let timeout = Duration::from_secs(device_cfg.ping_timeout_seconds);
                let online =
                    check_device(prober.as_ref(), &device.ip, device_cfg.ping_count, timeout)
                        .await;

                let polled_at = Local::now();
                if let Some(transition) = registry.apply_probe(&device.mac, online, polled_at) {
                    log::info!(
                        "Device {} ({}): {} -> {}",
                        transition.vendor,
                        transition.mac,
                        transition.from,
                        transition.to
                    );
                    persist(store, &transition);
                } else if let Some(every) = heartbeat {
                    if registry.heartbeat_due(&device.mac, every, polled_at) {
                        let entry = LogEntry {
                            timestamp: polled_at.naive_local(),
                            ip: device.ip.clone(),
                            mac: device.mac.clone(),
                            status: device.state.as_str().to_string(),
                            seconds_since_transition: (polled_at - device.last_transition)
                                .num_seconds(),
                        };
                        if let Err(e) = store.record(&entry) {
                            log::error!("Unable to record heartbeat for {}: {e:}", device.mac);
                        }
                    }
                }
            }
        })
        .await;
}

/// Store failures are isolated per device: the registry already holds
/// the new state, so the worst case is a gap in that one device's log
fn persist(store: &DeviceStore, transition: &Transition) {
    let entry = LogEntry {
        timestamp: transition.at.naive_local(),
        ip: transition.ip.clone(),
        mac: transition.mac.clone(),
        status: transition.to.as_str().to_string(),
        seconds_since_transition: transition.seconds_since_last,
    };
    if let Err(e) = store.record(&entry) {
        log::error!("Unable to record transition for {}: {e:}", transition.mac);
    }
}

#[cfg(test)]
mod tests {
    use super::{run_discovery_cycle, run_polling_cycle, spawn_trigger_watcher};
    use crate::{
        client::{ScanClientError, Scanner, VendorResolver},
        config::MonitorConfig,
        probe::ProbeBackend,
        registry::{DeviceRegistry, DeviceState},
        ScanEntry,
    };
    use nmindb::DeviceStore;
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
        time::Duration,
    };

    struct MockScanner {
        entries: Mutex<Vec<ScanEntry>>,
    }

    impl MockScanner {
        fn new(entries: Vec<ScanEntry>) -> Self {
            Self {
                entries: Mutex::new(entries),
            }
        }
    }

    #[async_trait::async_trait]
    impl Scanner for MockScanner {
        async fn scan(&self, _subnet: &str) -> Result<Vec<ScanEntry>, ScanClientError> {
            Ok(self.entries.lock().unwrap().clone())
        }
    }

    struct FixedVendors(HashMap<String, String>);

    #[async_trait::async_trait]
    impl VendorResolver for FixedVendors {
        async fn resolve(&self, mac: &str) -> String {
            self.0
                .get(mac)
                .cloned()
                .unwrap_or_else(|| crate::UNKNOWN_VENDOR.to_string())
        }
    }

    /// Per-IP scripted probe results, with attempt counting
    struct ScriptedProber {
        scripts: Mutex<HashMap<String, Vec<bool>>>,
        calls: Mutex<HashMap<String, usize>>,
    }

    impl ScriptedProber {
        fn new(scripts: &[(&str, &[bool])]) -> Self {
            let scripts = scripts
                .iter()
                .map(|(ip, script)| {
                    let mut script = script.to_vec();
                    script.reverse();
                    (ip.to_string(), script)
                })
                .collect();
            Self {
                scripts: Mutex::new(scripts),
                calls: Mutex::new(HashMap::new()),
            }
        }

        fn calls_for(&self, ip: &str) -> usize {
            self.calls.lock().unwrap().get(ip).copied().unwrap_or(0)
        }
    }

    #[async_trait::async_trait]
    impl ProbeBackend for ScriptedProber {
        async fn probe(&self, ip: &str, _timeout: Duration) -> bool {
            *self.calls.lock().unwrap().entry(ip.to_string()).or_insert(0) += 1;
            self.scripts
                .lock()
                .unwrap()
                .get_mut(ip)
                .and_then(|script| script.pop())
                .unwrap_or(false)
        }
    }

    fn test_cfg(tag: &str) -> MonitorConfig {
        let dir = std::env::temp_dir().join(format!("nmind-{tag}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        serde_json::from_value(serde_json::json!({
            "subnet": "192.168.1.0/24",
            "polling_interval_seconds": 0,
            "ping_count": 3,
            "devices_dir": dir,
        }))
        .expect("Unable to build test config")
    }

    fn registry_with(cfg: &MonitorConfig, devices: &[(&str, &str, &str)]) -> DeviceRegistry {
        let registry = DeviceRegistry::new(cfg.defaults(), &cfg.device_overrides);
        let now = chrono::Local::now();
        for (mac, ip, vendor) in devices {
            registry.upsert(mac.to_string(), ip.to_string(), vendor.to_string(), now);
        }
        registry
    }

    #[tokio::test]
    async fn check_transitions_recorded_and_short_circuited() {
        let cfg = test_cfg("poll");
        let registry = registry_with(
            &cfg,
            &[
                ("aa:bb:cc:dd:ee:0x", "192.168.1.10", "Acme"),
                ("aa:bb:cc:dd:ee:0y", "192.168.1.11", "Acme"),
                ("aa:bb:cc:dd:ee:0z", "192.168.1.12", "Acme"),
            ],
        );
        let store = DeviceStore::new(&cfg.devices_dir).unwrap();
        let prober = Arc::new(ScriptedProber::new(&[
            ("192.168.1.10", &[false, false, false][..]),
            ("192.168.1.11", &[false, true][..]),
            ("192.168.1.12", &[true][..]),
        ]));

        run_polling_cycle(&cfg, &registry, &store, prober.clone()).await;

        let states = registry
            .snapshot()
            .into_iter()
            .map(|d| (d.ip.clone(), d.state))
            .collect::<HashMap<_, _>>();
        assert_eq!(states["192.168.1.10"], DeviceState::Offline);
        assert_eq!(states["192.168.1.11"], DeviceState::Online);
        assert_eq!(states["192.168.1.12"], DeviceState::Online);

        // X exhausted the batch; Y stopped after its second probe
        assert_eq!(prober.calls_for("192.168.1.10"), 3);
        assert_eq!(prober.calls_for("192.168.1.11"), 2);
        assert_eq!(prober.calls_for("192.168.1.12"), 1);

        // X's log gained exactly one line, ending offline
        let x_log =
            std::fs::read_to_string(cfg.devices_dir.join("aa:bb:cc:dd:ee:0x.csv")).unwrap();
        let lines = x_log.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains(",offline,"));
    }

    #[tokio::test]
    async fn check_no_transition_no_store_line() {
        let cfg = test_cfg("steady");
        let registry = registry_with(&cfg, &[("aa:bb:cc:dd:ee:01", "192.168.1.20", "Acme")]);
        let store = DeviceStore::new(&cfg.devices_dir).unwrap();
        let prober = Arc::new(ScriptedProber::new(&[(
            "192.168.1.20",
            &[true, true][..],
        )]));

        run_polling_cycle(&cfg, &registry, &store, prober.clone()).await;
        run_polling_cycle(&cfg, &registry, &store, prober.clone()).await;

        // one transition (unknown -> online), then steady state
        let log =
            std::fs::read_to_string(cfg.devices_dir.join("aa:bb:cc:dd:ee:01.csv")).unwrap();
        assert_eq!(log.lines().count(), 1);
        assert_eq!(prober.calls_for("192.168.1.20"), 2);
    }

    #[tokio::test]
    async fn check_override_cadence_respected() {
        let mut cfg = test_cfg("cadence");
        cfg.device_overrides = vec![crate::config::DeviceOverride {
            pattern: "Tuya.*".to_string(),
            ping_count: None,
            ping_timeout_seconds: None,
            polling_interval_seconds: Some(60),
            disabled: None,
        }];
        let registry = registry_with(
            &cfg,
            &[
                ("aa:bb:cc:dd:ee:02", "192.168.1.30", "TuyaSmartPlug"),
                ("aa:bb:cc:dd:ee:03", "192.168.1.31", "Acme"),
            ],
        );
        let store = DeviceStore::new(&cfg.devices_dir).unwrap();
        let prober = Arc::new(ScriptedProber::new(&[
            ("192.168.1.30", &[true, true][..]),
            ("192.168.1.31", &[true, true][..]),
        ]));

        run_polling_cycle(&cfg, &registry, &store, prober.clone()).await;
        run_polling_cycle(&cfg, &registry, &store, prober.clone()).await;

        // the Tuya device's 60s cadence means the immediate second
        // cycle skips it; the default device (0s here) is re-probed
        assert_eq!(prober.calls_for("192.168.1.30"), 1);
        assert_eq!(prober.calls_for("192.168.1.31"), 2);
    }

    #[tokio::test]
    async fn check_disabled_devices_skipped() {
        let mut cfg = test_cfg("disabled");
        cfg.device_overrides = vec![crate::config::DeviceOverride {
            pattern: "Cam".to_string(),
            ping_count: None,
            ping_timeout_seconds: None,
            polling_interval_seconds: None,
            disabled: Some(true),
        }];
        let registry = registry_with(&cfg, &[("aa:bb:cc:dd:ee:04", "192.168.1.40", "AcmeCam")]);
        let store = DeviceStore::new(&cfg.devices_dir).unwrap();
        let prober = Arc::new(ScriptedProber::new(&[]));

        run_polling_cycle(&cfg, &registry, &store, prober.clone()).await;

        assert_eq!(prober.calls_for("192.168.1.40"), 0);
        assert_eq!(registry.snapshot()[0].state, DeviceState::Unknown);
    }

    #[tokio::test]
    async fn check_discovery_merge_is_idempotent() {
        let cfg = test_cfg("merge");
        let registry = DeviceRegistry::new(cfg.defaults(), &cfg.device_overrides);
        let scanner = MockScanner::new(vec![
            ("aa:bb:cc:dd:ee:05".to_string(), "192.168.1.50".to_string()),
        ]);
        let vendors = FixedVendors(HashMap::from([(
            "aa:bb:cc:dd:ee:05".to_string(),
            "Acme".to_string(),
        )]));

        run_discovery_cycle("192.168.1.0/24", &registry, &scanner, &vendors).await;
        let before = registry.snapshot();

        // probe it online, then re-discover with a changed IP
        registry.apply_probe("aa:bb:cc:dd:ee:05", true, chrono::Local::now());
        *scanner.entries.lock().unwrap() =
            vec![("aa:bb:cc:dd:ee:05".to_string(), "192.168.1.99".to_string())];
        run_discovery_cycle("192.168.1.0/24", &registry, &scanner, &vendors).await;

        let after = registry.snapshot();
        assert_eq!(before.len(), 1);
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].ip, "192.168.1.99");
        assert_eq!(after[0].state, DeviceState::Online);
    }

    #[tokio::test]
    async fn check_heartbeat_lines_emitted_when_configured() {
        let mut cfg = test_cfg("heartbeat");
        cfg.heartbeat_interval_seconds = Some(0);
        let registry = registry_with(&cfg, &[("aa:bb:cc:dd:ee:06", "192.168.1.60", "Acme")]);
        let store = DeviceStore::new(&cfg.devices_dir).unwrap();
        let prober = Arc::new(ScriptedProber::new(&[(
            "192.168.1.60",
            &[true, true, true][..],
        )]));

        for _ in 0..3 {
            run_polling_cycle(&cfg, &registry, &store, prober.clone()).await;
        }

        // one transition line plus heartbeats for the steady cycles
        let log =
            std::fs::read_to_string(cfg.devices_dir.join("aa:bb:cc:dd:ee:06.csv")).unwrap();
        assert_eq!(log.lines().count(), 3);
        assert!(log.lines().skip(1).all(|l| l.contains(",online,")));
    }

    #[tokio::test]
    async fn check_trigger_watcher_signals_on_sentinel() {
        let path = std::env::temp_dir().join(format!("nmind-trigger-{}", std::process::id()));
        let _ = std::fs::remove_file(&path);

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let watcher = spawn_trigger_watcher(path.clone(), Duration::from_millis(10), tx);

        // no sentinel yet: nothing arrives
        assert!(
            tokio::time::timeout(Duration::from_millis(50), rx.recv())
                .await
                .is_err()
        );

        std::fs::write(&path, b"").unwrap();
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("watcher should have signalled")
            .expect("watcher channel closed");

        std::fs::remove_file(&path).unwrap();
        watcher.abort();
    }
}
