//! Graceful shutdown coordination (§4.A / §5): listens for SIGTERM/SIGINT,
//! then gives in-flight work a bounded budget to wind down before the
//! process exits.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    Signal,
    Requested,
}

/// Cloneable handle for components that need to observe shutdown and
/// react cooperatively (e.g. the job manager refusing new submissions).
#[derive(Clone)]
pub struct ShutdownHandle {
    rx: watch::Receiver<bool>,
}

impl ShutdownHandle {
    pub fn is_shutting_down(&self) -> bool {
        *self.rx.borrow()
    }

    pub async fn wait(&mut self) {
        let _ = self.rx.wait_for(|v| *v).await;
    }
}

pub struct ShutdownCoordinator {
    tx: watch::Sender<bool>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            rx: self.tx.subscribe(),
        }
    }

    pub fn trigger(&self, reason: ShutdownReason) {
        info!(target: "resource", ?reason, "shutdown triggered");
        let _ = self.tx.send(true);
    }

    /// Waits for SIGTERM/SIGINT (Ctrl-C), then triggers shutdown.
    #[cfg(unix)]
    pub async fn wait_for_signal(&self) {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {},
            _ = sigint.recv() => {},
        }
        self.trigger(ShutdownReason::Signal);
    }

    #[cfg(not(unix))]
    pub async fn wait_for_signal(&self) {
        let _ = tokio::signal::ctrl_c().await;
        self.trigger(ShutdownReason::Signal);
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs `drain` to completion, but logs and proceeds anyway if it exceeds
/// `budget` — shutdown must never hang the process indefinitely.
pub async fn drain_within_budget<F>(budget: Duration, drain: F)
where
    F: std::future::Future<Output = ()>,
{
    if tokio::time::timeout(budget, drain).await.is_err() {
        warn!(target: "resource", budget_secs = budget.as_secs(), "shutdown drain exceeded budget, proceeding anyway");
    }
}
