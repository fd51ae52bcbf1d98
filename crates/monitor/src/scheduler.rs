//! Independently timed recurring jobs.
//!
//! Each job runs in its own task with its own period, so a slow or failing job
//! never delays another one. Job bodies share a bounded pool of permits. Shutdown
//! is broadcast through a watch channel and observed between ticks; a body that
//! is already executing runs to completion.

use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard,
    },
    time::Duration,
};

use metrics::counter;
use rand::Rng;
use strum_macros::{Display, EnumIter, IntoStaticStr};
use thiserror::Error;
use tokio::{
    sync::{watch, Semaphore},
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum JobKind {
    /// Station snapshot and transaction statistics.
    State,
    /// Finished-transaction history.
    History,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    Running,
    ShuttingDown,
    Stopped,
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("scheduler is {0} and no longer accepts jobs")]
    NotAccepting(SchedulerState),
    #[error("scheduler cannot start while {0}")]
    NotIdle(SchedulerState),
    #[error("job `{0}` has a zero interval")]
    ZeroInterval(String),
    #[error("job `{job}` could not be joined: {message}")]
    Join { job: String, message: String },
}

/// Half-open `[min, max)` range from which a job's period is drawn once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JitterRange {
    min: Duration,
    max: Duration,
}

impl JitterRange {
    pub const STATE: Self = Self::minutes(5, 20);
    pub const HISTORY: Self = Self::minutes(60, 90);

    pub const fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    const fn minutes(min: u64, max: u64) -> Self {
        Self::new(Duration::from_secs(min * 60), Duration::from_secs(max * 60))
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        if max <= min {
            return self.min;
        }
        Duration::from_millis(rng.gen_range(min..max))
    }
}

/// Period ranges per job kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobTimings {
    pub state: JitterRange,
    pub history: JitterRange,
}

impl JobTimings {
    pub fn for_kind(&self, kind: JobKind) -> JitterRange {
        match kind {
            JobKind::State => self.state,
            JobKind::History => self.history,
        }
    }
}

impl Default for JobTimings {
    fn default() -> Self {
        Self {
            state: JitterRange::STATE,
            history: JitterRange::HISTORY,
        }
    }
}

/// Read-only view of a registered job.
#[derive(Debug, Clone)]
pub struct JobHandle {
    name: Arc<str>,
    kind: JobKind,
    interval: Duration,
    runs: Arc<AtomicU64>,
}

impl JobHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Completed executions, successful or not.
    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::SeqCst)
    }
}

type JobFuture = Pin<Box<dyn Future<Output = Result<(), String>> + Send>>;
type JobTask = Arc<dyn Fn() -> JobFuture + Send + Sync>;

struct Job {
    handle: JobHandle,
    task: JobTask,
}

impl Job {
    async fn execute(&self) {
        let kind: &'static str = self.handle.kind.into();
        // Run the body in its own task so a panic surfaces as a join error.
        let outcome = tokio::spawn((self.task)()).await;
        self.handle.runs.fetch_add(1, Ordering::SeqCst);

        let result = match outcome {
            Ok(Ok(())) => {
                debug!(job = %self.handle.name, "job finished");
                "ok"
            }
            Ok(Err(message)) => {
                warn!(job = %self.handle.name, error = %message, "job failed");
                "error"
            }
            Err(err) if err.is_panic() => {
                error!(job = %self.handle.name, "job panicked");
                "panic"
            }
            Err(_) => {
                warn!(job = %self.handle.name, "job was cancelled");
                "cancelled"
            }
        };
        counter!("monitor_jobs_total", "kind" => kind, "result" => result).increment(1);
    }
}

pub struct JobScheduler {
    state: Mutex<SchedulerState>,
    permits: Arc<Semaphore>,
    shutdown_tx: watch::Sender<bool>,
    pending: Mutex<Vec<Arc<Job>>>,
    handles: Mutex<Vec<JobHandle>>,
    timers: Mutex<Vec<(Arc<str>, JoinHandle<()>)>>,
}

impl JobScheduler {
    pub fn new(max_concurrent_jobs: usize) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            state: Mutex::new(SchedulerState::Idle),
            permits: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
            shutdown_tx,
            pending: Mutex::new(Vec::new()),
            handles: Mutex::new(Vec::new()),
            timers: Mutex::new(Vec::new()),
        }
    }

    pub fn state(&self) -> SchedulerState {
        *lock(&self.state)
    }

    pub fn jobs(&self) -> Vec<JobHandle> {
        lock(&self.handles).clone()
    }

    pub fn job_count(&self) -> usize {
        lock(&self.handles).len()
    }

    /// Registers a recurring job. The first execution happens one `interval`
    /// after the scheduler starts (or after registration, if already running).
    pub fn schedule<F, Fut, E>(
        &self,
        name: impl Into<String>,
        kind: JobKind,
        interval: Duration,
        task: F,
    ) -> Result<JobHandle, SchedulerError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let name: String = name.into();
        if interval.is_zero() {
            return Err(SchedulerError::ZeroInterval(name));
        }

        let handle = JobHandle {
            name: Arc::from(name),
            kind,
            interval,
            runs: Arc::new(AtomicU64::new(0)),
        };
        let task: JobTask = Arc::new(move || {
            let body = task();
            Box::pin(async move { body.await.map_err(|err| err.to_string()) })
        });
        let job = Arc::new(Job {
            handle: handle.clone(),
            task,
        });

        let state = lock(&self.state);
        match *state {
            SchedulerState::Idle => lock(&self.pending).push(job),
            SchedulerState::Running => self.spawn_timer(job),
            other => return Err(SchedulerError::NotAccepting(other)),
        }
        lock(&self.handles).push(handle.clone());
        debug!(job = %handle.name, %kind, interval_secs = interval.as_secs(), "job scheduled");

        Ok(handle)
    }

    /// Moves `Idle → Running` and starts the timers of every registered job.
    pub fn start(&self) -> Result<(), SchedulerError> {
        let mut state = lock(&self.state);
        if *state != SchedulerState::Idle {
            return Err(SchedulerError::NotIdle(*state));
        }
        *state = SchedulerState::Running;

        let pending = std::mem::take(&mut *lock(&self.pending));
        info!(jobs = pending.len(), "scheduler started");
        for job in pending {
            self.spawn_timer(job);
        }
        Ok(())
    }

    /// Stops issuing ticks and waits for every timer, including executions
    /// already in flight.
    pub async fn shutdown(&self) -> Result<(), SchedulerError> {
        {
            let mut state = lock(&self.state);
            if *state == SchedulerState::Stopped {
                return Ok(());
            }
            *state = SchedulerState::ShuttingDown;
        }
        self.shutdown_tx.send_replace(true);

        let timers = std::mem::take(&mut *lock(&self.timers));
        let mut first_error = None;
        for (name, timer) in timers {
            if let Err(err) = timer.await {
                warn!(job = %name, error = %err, "job timer did not stop cleanly");
                first_error.get_or_insert(SchedulerError::Join {
                    job: name.to_string(),
                    message: err.to_string(),
                });
            }
        }

        *lock(&self.state) = SchedulerState::Stopped;
        info!("scheduler stopped");
        first_error.map_or(Ok(()), Err)
    }

    fn spawn_timer(&self, job: Arc<Job>) {
        let name = Arc::clone(&job.handle.name);
        let timer = tokio::spawn(run_timer(
            job,
            Arc::clone(&self.permits),
            self.shutdown_tx.subscribe(),
        ));
        lock(&self.timers).push((name, timer));
    }
}

impl fmt::Debug for JobScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobScheduler")
            .field("state", &self.state())
            .field("jobs", &self.job_count())
            .finish()
    }
}

async fn run_timer(job: Arc<Job>, permits: Arc<Semaphore>, mut shutdown: watch::Receiver<bool>) {
    let interval = job.handle.interval;
    let mut ticker = interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            _ = ticker.tick() => {}
        }

        let permit = tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            permit = Arc::clone(&permits).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };
        job.execute().await;
        drop(permit);
    }

    debug!(job = %job.handle.name, "job timer stopped");
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
