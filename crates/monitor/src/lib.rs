//! Station monitor library: per-station recurring jobs that poll the Connect
//! API and push snapshots, statistics and charging history into the sinks.
//! The `charger-monitor` binary wires it to the environment.

pub mod pipeline;
pub mod prometheus;
pub mod scheduler;
pub mod shutdown;
pub mod worker;

pub use pipeline::{DedupGate, HistoryReport, JobError, PublisherSet, StationPipeline};
pub use prometheus::PrometheusPublisher;
pub use scheduler::{
    JitterRange, JobHandle, JobKind, JobScheduler, JobTimings, SchedulerError, SchedulerState,
};
pub use shutdown::{shutdown_channel, ShutdownReason, ShutdownSignal, ShutdownTrigger};
pub use worker::{MonitorError, StationMonitor};
