use std::{sync::Arc, time::Duration};

use charger_monitor_connect::{FetchError, StationSource};
use charger_monitor_domain::{
    config::ConfigError, model::Station, services::telemetry::TelemetryError,
};
use charger_monitor_storage::StorageError;
use strum::IntoEnumIterator;
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    pipeline::{PublisherSet, StationPipeline},
    scheduler::{JobKind, JobScheduler, JobTimings, SchedulerError},
    shutdown::{ShutdownReason, ShutdownSignal},
};

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("connect client error: {0}")]
    Client(#[source] FetchError),
    #[error("failed to enumerate stations: {0}")]
    Enumeration(#[source] FetchError),
    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
    #[error("monitoring cancelled: {0}")]
    Cancelled(ShutdownReason),
}

/// Polls every station on the account with one state job and one history job
/// each. Stations are enumerated once at start; a new station requires a
/// restart.
pub struct StationMonitor {
    pipeline: Arc<StationPipeline>,
    scheduler: JobScheduler,
    timings: JobTimings,
}

impl StationMonitor {
    pub fn new(
        source: Arc<dyn StationSource>,
        publishers: PublisherSet,
        max_concurrent_jobs: usize,
    ) -> Self {
        Self::with_pipeline(StationPipeline::new(source, publishers), max_concurrent_jobs)
    }

    pub fn with_pipeline(pipeline: StationPipeline, max_concurrent_jobs: usize) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            scheduler: JobScheduler::new(max_concurrent_jobs),
            timings: JobTimings::default(),
        }
    }

    pub fn with_timings(mut self, timings: JobTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn scheduler(&self) -> &JobScheduler {
        &self.scheduler
    }

    /// Enumerates stations, registers their jobs and starts the scheduler.
    /// Returns the number of stations monitored.
    pub async fn start(&self) -> Result<usize, MonitorError> {
        let stations = self
            .pipeline
            .source()
            .list_stations()
            .await
            .map_err(MonitorError::Enumeration)?;

        self.register_jobs(&stations)?;
        self.scheduler.start()?;
        info!(
            stations = stations.len(),
            jobs = self.scheduler.job_count(),
            "monitoring stations"
        );
        Ok(stations.len())
    }

    /// Runs until `shutdown` fires, then stops every job. The only successful
    /// exit is cancellation, reported as [`MonitorError::Cancelled`].
    pub async fn monitor_stations(
        &self,
        mut shutdown: ShutdownSignal,
    ) -> Result<(), MonitorError> {
        let early = tokio::select! {
            started = self.start() => {
                started?;
                None
            }
            reason = shutdown.wait() => Some(reason),
        };
        let reason = match early {
            Some(reason) => {
                info!(%reason, "shutdown requested while enumerating stations");
                reason
            }
            None => shutdown.wait().await,
        };

        info!(%reason, "stopping station monitor");
        if let Err(err) = self.scheduler.shutdown().await {
            warn!(error = %err, "scheduler did not stop cleanly");
        }

        Err(MonitorError::Cancelled(reason))
    }

    fn register_jobs(&self, stations: &[Station]) -> Result<(), SchedulerError> {
        let mut rng = rand::thread_rng();
        for station in stations {
            info!(station_id = %station.id, "creating monitor jobs for station");
            for kind in JobKind::iter() {
                let every = self.timings.for_kind(kind).sample(&mut rng);
                self.schedule_station_job(station, kind, every)?;
            }
        }
        Ok(())
    }

    fn schedule_station_job(
        &self,
        station: &Station,
        kind: JobKind,
        every: Duration,
    ) -> Result<(), SchedulerError> {
        let pipeline = Arc::clone(&self.pipeline);
        let station_id = station.id.clone();
        self.scheduler.schedule(
            format!("{}:{kind}", station.id),
            kind,
            every,
            move || {
                let pipeline = Arc::clone(&pipeline);
                let station_id = station_id.clone();
                async move {
                    match kind {
                        JobKind::State => pipeline.refresh_state(&station_id).await,
                        JobKind::History => pipeline
                            .publish_history(&station_id)
                            .await
                            .map(|_report| ()),
                    }
                }
            },
        )?;
        Ok(())
    }
}
