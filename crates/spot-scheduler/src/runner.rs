//! Cooperative-cancellation job runner: each job is an
//! independent task ticking on its own cadence. A slow job skips its
//! next tick instead of overlapping with itself; all jobs unblock at
//! the next suspension point on shutdown.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{info, instrument};

/// Handle used to signal every running job to stop. Dropping it (or
/// calling [`Shutdown::trigger`]) unblocks each job's next tick wait.
#[derive(Clone)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn new() -> (Self, ShutdownSignal) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, ShutdownSignal { rx })
    }

    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }
}

impl ShutdownSignal {
    async fn cancelled(&mut self) {
        // resolves once `Shutdown::trigger` is called; if the sender was
        // dropped without triggering, `changed` errors and we treat
        // that as cancellation too, matching "graceful shutdown" intent.
        if *self.rx.borrow() {
            return;
        }
        let _ = self.rx.changed().await;
    }
}

/// Runs `job` every `period`, starting after the first `period` elapses.
/// Uses [`MissedTickBehavior::Skip`] so a job that overruns its period
/// folds any missed ticks into one instead of running back-to-back.
#[instrument(skip(job, shutdown))]
pub async fn run_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown: ShutdownSignal,
    mut job: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                job().await;
            }
            _ = shutdown.cancelled() => {
                info!(job = name, "shutting down");
                return;
            }
        }
    }
}
