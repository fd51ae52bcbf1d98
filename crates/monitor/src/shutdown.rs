use std::{fmt, sync::Arc};

use tokio::sync::watch;
use tracing::{info, warn};

/// Why the monitor stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    Interrupt,
    Terminate,
    Requested(String),
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupt => f.write_str("interrupt signal"),
            Self::Terminate => f.write_str("terminate signal"),
            Self::Requested(reason) => f.write_str(reason),
        }
    }
}

/// Sending half of the process-wide cancellation signal. Only the first
/// reason is kept.
#[derive(Debug, Clone)]
pub struct ShutdownTrigger {
    tx: Arc<watch::Sender<Option<ShutdownReason>>>,
}

/// Receiving half; cheap to clone for every component that must observe it.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<Option<ShutdownReason>>,
}

pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(None);
    (
        ShutdownTrigger { tx: Arc::new(tx) },
        ShutdownSignal { rx },
    )
}

impl ShutdownTrigger {
    pub fn trigger(&self, reason: ShutdownReason) {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
    }
}

impl ShutdownSignal {
    pub fn reason(&self) -> Option<ShutdownReason> {
        self.rx.borrow().clone()
    }

    /// Resolves once a reason has been triggered. A dropped trigger counts as a
    /// request to stop.
    pub async fn wait(&mut self) -> ShutdownReason {
        loop {
            let current = self.rx.borrow_and_update().clone();
            if let Some(reason) = current {
                return reason;
            }
            if self.rx.changed().await.is_err() {
                return ShutdownReason::Requested("shutdown trigger dropped".to_string());
            }
        }
    }
}

/// Waits for Ctrl-C or, on Unix, SIGTERM.
pub async fn wait_for_os_signal() -> ShutdownReason {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = ctrl_c() => ShutdownReason::Interrupt,
                    _ = terminate.recv() => ShutdownReason::Terminate,
                }
            }
            Err(err) => {
                warn!(error = %err, "SIGTERM handler unavailable, listening for Ctrl-C only");
                ctrl_c().await;
                ShutdownReason::Interrupt
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c().await;
        ShutdownReason::Interrupt
    }
}

/// Triggers `trigger` when the process receives a termination signal.
pub fn spawn_signal_listener(trigger: ShutdownTrigger) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let reason = wait_for_os_signal().await;
        info!(%reason, "shutdown signal received");
        trigger.trigger(reason);
    })
}

async fn ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "Ctrl-C handler unavailable");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_reason_wins() {
        let (trigger, mut signal) = shutdown_channel();
        assert_eq!(signal.reason(), None);

        trigger.trigger(ShutdownReason::Terminate);
        trigger.trigger(ShutdownReason::Interrupt);

        assert_eq!(signal.wait().await, ShutdownReason::Terminate);
        assert_eq!(signal.reason(), Some(ShutdownReason::Terminate));
    }

    #[tokio::test]
    async fn wait_resolves_after_late_trigger() {
        let (trigger, mut signal) = shutdown_channel();
        let waiter = tokio::spawn(async move { signal.wait().await });
        tokio::task::yield_now().await;

        trigger.trigger(ShutdownReason::Requested("test finished".to_string()));
        let reason = waiter.await.expect("waiter joins");
        assert_eq!(reason.to_string(), "test finished");
    }

    #[tokio::test]
    async fn dropped_trigger_stops_waiters() {
        let (trigger, mut signal) = shutdown_channel();
        drop(trigger);
        assert!(matches!(signal.wait().await, ShutdownReason::Requested(_)));
    }
}
