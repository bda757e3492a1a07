//! Background loops driving the reconciler.
//!
//! Two independent tasks: one checks a claimed payment per tick, the other
//! sweeps stale claims. Both stop when the handle is shut down.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::reconcile::reconciler::Reconciler;

/// Tick intervals of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleConfig {
    /// Interval between payment checks.
    pub payment_check_interval: Duration,
    /// Interval between stale-claim sweeps.
    pub stale_sweep_interval: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            payment_check_interval: Duration::from_secs(300),
            stale_sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Handle to the running scheduler tasks.
#[derive(Debug)]
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Signals both loops to stop and waits for them.
    ///
    /// A tick in progress is allowed to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles {
            if let Err(err) = handle.await {
                error!(error = %err, "reconciliation task ended abnormally");
            }
        }
        info!("reconciliation scheduler stopped");
    }
}

/// Spawns the reconciliation loops.
pub struct ReconcileScheduler;

impl ReconcileScheduler {
    /// Starts the payment-check and stale-sweep loops on the current runtime.
    ///
    /// The first tick of each loop fires immediately.
    #[must_use]
    pub fn spawn(reconciler: Arc<Reconciler>, config: ScheduleConfig) -> SchedulerHandle {
        let (shutdown_tx, _) = watch::channel(false);

        let checker = {
            let reconciler = Arc::clone(&reconciler);
            let shutdown_rx = shutdown_tx.subscribe();
            tokio::spawn(run_every(
                "payment_check",
                config.payment_check_interval,
                shutdown_rx,
                move || {
                    let reconciler = Arc::clone(&reconciler);
                    async move {
                        match reconciler.check_next_payment().await {
                            Ok(outcome) => debug!(?outcome, "payment check tick"),
                            Err(err) => error!(error = %err, "payment check tick failed"),
                        }
                    }
                },
            ))
        };

        let sweeper = {
            let shutdown_rx = shutdown_tx.subscribe();
            tokio::spawn(run_every(
                "stale_sweep",
                config.stale_sweep_interval,
                shutdown_rx,
                move || {
                    let reconciler = Arc::clone(&reconciler);
                    async move {
                        if let Err(err) = reconciler.sweep_stale_claims().await {
                            error!(error = %err, "stale claim sweep failed");
                        }
                    }
                },
            ))
        };

        info!(
            payment_check_secs = config.payment_check_interval.as_secs(),
            stale_sweep_secs = config.stale_sweep_interval.as_secs(),
            "reconciliation scheduler started"
        );

        SchedulerHandle {
            shutdown_tx,
            handles: vec![checker, sweeper],
        }
    }
}

async fn run_every<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
    mut tick: F,
) where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = ()> + Send,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            _ = interval.tick() => tick().await,
        }
    }

    debug!(task = name, "reconciliation loop exited");
}
