//! Monitor binary that polls the Connect API for every station on the account.

use std::{io, sync::Arc};

use charger_monitor::{
    shutdown::spawn_signal_listener, shutdown_channel, MonitorError, PrometheusPublisher,
    PublisherSet, StationMonitor,
};
use charger_monitor_connect::ConnectClient;
use charger_monitor_domain::config::MonitorConfig;
use charger_monitor_domain::services::telemetry::{init_telemetry, TelemetryConfig};
use charger_monitor_storage::SeaOrmStorage;
use tracing::{debug, info};

#[tokio::main]
async fn main() -> io::Result<()> {
    match bootstrap().await {
        Ok(()) => Ok(()),
        Err(MonitorError::Cancelled(reason)) => {
            info!(%reason, "monitor stopped");
            Ok(())
        }
        Err(err) => {
            eprintln!("[monitor] bootstrap failed: {err}");
            Err(io::Error::other(err.to_string()))
        }
    }
}

async fn bootstrap() -> Result<(), MonitorError> {
    let config = MonitorConfig::load_from_env()?;
    let telemetry_config = TelemetryConfig::from_env("MONITOR");
    let telemetry = init_telemetry(&telemetry_config)?;
    info!(?config, "starting charger monitor");

    let mut builder = SeaOrmStorage::builder()
        .database_url(config.database_url())
        .sql_logging(config.database_sql_logging());
    if let Some(max) = config.database_max_connections() {
        builder = builder.max_connections(max);
    }
    let storage = builder.build().await?;
    let client = ConnectClient::from_config(&config).map_err(MonitorError::Client)?;
    let prometheus = Arc::new(PrometheusPublisher::new());
    let publishers = PublisherSet::new(prometheus.clone(), prometheus, Arc::new(storage));

    let monitor = StationMonitor::new(
        Arc::new(client),
        publishers.clone(),
        config.max_concurrent_jobs(),
    );
    let (trigger, signal) = shutdown_channel();
    spawn_signal_listener(trigger);

    let outcome = monitor.monitor_stations(signal).await;
    publishers.close().await;
    debug!(metrics = %telemetry.render_metrics(), "final metrics snapshot");
    outcome
}
