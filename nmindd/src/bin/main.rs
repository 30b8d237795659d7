use std::sync::Arc;

use nmind_monitor::{detect_scanner, monitor, DeviceRegistry, MonitorConfig, OuiResolver, PingClient};
use nmindb::DeviceStore;
use nmindd::{warm_registry, NetMinderResult};
use tracing_appender::rolling;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::FmtSubscriber;

use tracing_log::LogTracer;

#[tokio::main]
async fn main() -> NetMinderResult<()> {
    LogTracer::init().expect("Unable to set up log tracer");

    let log = rolling::daily("./logs", "net-minder");
    let (nb, _guard) = tracing_appender::non_blocking(log);

    let sub = FmtSubscriber::builder()
        .with_max_level(tracing::Level::INFO)
        .with_writer(nb.and(std::io::stdout))
        .finish();

    tracing::subscriber::set_global_default(sub).expect("Unable to set up tracing subscriber");

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.json".to_string());
    let cfg = MonitorConfig::load(&config_path).map_err(|e| {
        log::error!("Unable to load config {config_path:}: {e:}");
        e
    })?;

    // the one store failure that is fatal: no devices directory means
    // no durable history at all
    let store = Arc::new(DeviceStore::new(&cfg.devices_dir).map_err(|e| {
        log::error!("Unable to create devices dir {:?}: {e:}", cfg.devices_dir);
        e
    })?);

    let registry = Arc::new(DeviceRegistry::new(cfg.defaults(), &cfg.device_overrides));
    let seeded = warm_registry(&registry, &store);
    if seeded > 0 {
        log::info!("Restored {seeded:} devices from {:?}", cfg.devices_dir);
    }

    let scanner = detect_scanner(&cfg.interface).await;
    let vendors = Arc::new(OuiResolver::new(
        cfg.oui_table_path.as_deref(),
        cfg.vendor_lookup,
    ));

    let _handle = monitor(
        cfg,
        registry,
        store,
        scanner,
        vendors,
        Arc::new(PingClient),
    );

    log::info!("net-minder started");
    tokio::signal::ctrl_c().await?;
    log::info!("Shutting down");

    Ok(())
}
