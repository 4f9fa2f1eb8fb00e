//! Heartbeat: background task that drives `SyncScheduler::tick`.
//!
//! The tick itself only flips cache tags. Follow-up work (garbage
//! collection, warming views) is handed to a `TickListener` on the
//! blocking pool so a slow listener never delays the next heartbeat.

use std::sync::Arc;
use std::time::Duration;

use cache::TagInvalidator;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::sync_scheduler::{SyncScheduler, TickReport};

/// Work to run after each heartbeat
pub trait TickListener: Send + Sync {
    fn on_tick(&self, report: &TickReport) -> shared::Result<()>;
}

/// Handle to a running heartbeat task.
///
/// Dropping the handle aborts the loop, but follow-up work already running
/// on the blocking pool cannot be aborted and may still touch the cache.
/// Only `stop().await` guarantees no further cache writes.
pub struct Heartbeat {
    handle: Option<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
    period: watch::Receiver<Duration>,
}

impl Heartbeat {
    /// Start ticking `scheduler` every `period`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        scheduler: Arc<SyncScheduler>,
        invalidator: Arc<dyn TagInvalidator>,
        period: Duration,
        listener: Option<Arc<dyn TickListener>>,
    ) -> Self {
        // Sender dropped: the period never changes
        let (_, period) = watch::channel(period);
        Self::spawn_tracking(scheduler, invalidator, period, listener)
    }

    /// Start ticking at the period published on `period`, switching to
    /// each new value as it arrives.
    pub fn spawn_tracking(
        scheduler: Arc<SyncScheduler>,
        invalidator: Arc<dyn TagInvalidator>,
        period: watch::Receiver<Duration>,
        listener: Option<Arc<dyn TickListener>>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let initial = *period.borrow();

        let handle = tokio::spawn(run_heartbeat_loop(
            scheduler,
            invalidator,
            period.clone(),
            listener,
            shutdown_rx,
        ));

        info!(period_ms = initial.as_millis() as u64, "heartbeat started");

        Self {
            handle: Some(handle),
            shutdown_tx,
            period,
        }
    }

    /// Current tick period
    pub fn period(&self) -> Duration {
        *self.period.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop ticking and wait for in-flight follow-up work.
    ///
    /// Once this returns no further cache writes are made by the heartbeat.
    pub async fn stop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                error!(error = %e, "heartbeat task ended abnormally");
            }
        }
        info!("heartbeat stopped");
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

fn new_ticker(period: Duration) -> Interval {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

async fn run_heartbeat_loop(
    scheduler: Arc<SyncScheduler>,
    invalidator: Arc<dyn TagInvalidator>,
    mut period: watch::Receiver<Duration>,
    listener: Option<Arc<dyn TickListener>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let current_period = period.clone();
    let mut ticker = new_ticker(*current_period.borrow());
    let mut period_open = true;
    let mut follow_ups = JoinSet::new();
    let stopped = shutdown.clone();

    debug!("heartbeat loop starting");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if *stopped.borrow() {
                    break;
                }

                let report = scheduler.tick(invalidator.as_ref());
                if !report.is_empty() {
                    debug!(at = report.at, synced = report.synced.len(), "heartbeat tick");
                }

                if let Some(listener) = &listener {
                    let listener = listener.clone();
                    let stopped = stopped.clone();
                    follow_ups.spawn_blocking(move || {
                        if *stopped.borrow() {
                            return;
                        }
                        if let Err(e) = listener.on_tick(&report) {
                            warn!(error = %e, "post-tick work failed");
                        }
                    });
                }

                while let Some(result) = follow_ups.try_join_next() {
                    if let Err(e) = result {
                        error!(error = %e, "post-tick task panicked");
                    }
                }
            }
            changed = period.changed(), if period_open => {
                match changed {
                    Ok(()) => {
                        let next = *current_period.borrow();
                        ticker = new_ticker(next);
                        info!(period_ms = next.as_millis() as u64, "heartbeat period changed");
                    }
                    // No publisher left; keep the current period
                    Err(_) => period_open = false,
                }
            }
            _ = shutdown.changed() => {
                debug!("heartbeat loop shutting down");
                break;
            }
        }
    }

    while let Some(result) = follow_ups.join_next().await {
        if let Err(e) = result {
            error!(error = %e, "post-tick task panicked");
        }
    }
}
