//! Sync scheduler
//!
//! Three independent timers drive the engine, modeled as tick events in a
//! single-consumer channel: a steady fetch/apply cycle, a lightweight
//! integrity check, and a one-shot delayed first cycle (so startup sync
//! never competes with initial UI rendering).
//!
//! ```text
//! first-cycle timer ──┐
//! cycle interval ─────┼──→ mpsc::Receiver<Tick> ──→ drive() ──→ controller
//! integrity interval ─┘
//! ```
//!
//! Cancellation is coarse: [`SyncScheduler::stop`] aborts the timer
//! tasks. In-flight network calls are not aborted; their results are
//! ignored at the controller's next guard check.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use daybook_core::config::TimingConfig;

use crate::controller::SyncCycleController;
use crate::SyncError;

/// A timer firing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// One-shot delayed first cycle after start
    FirstCycle,
    /// Steady fetch/apply cycle
    Cycle,
    /// Integrity-check gate evaluation
    Integrity,
}

/// Owns the timer tasks and the tick channel
pub struct SyncScheduler {
    tick_rx: mpsc::Receiver<Tick>,
    handles: Vec<JoinHandle<()>>,
}

impl SyncScheduler {
    /// Spawns the three timer tasks
    pub fn start(timing: &TimingConfig) -> Self {
        let (tx, tick_rx) = mpsc::channel(8);

        let first_delay = Duration::from_secs(timing.first_cycle_delay_secs);
        let cycle_every = Duration::from_secs(timing.cycle_interval_secs.max(1));
        let integrity_every = Duration::from_secs(timing.integrity_interval_secs.max(1));

        info!(
            first_delay_secs = timing.first_cycle_delay_secs,
            cycle_secs = timing.cycle_interval_secs,
            integrity_secs = timing.integrity_interval_secs,
            "Starting sync scheduler"
        );

        let first = {
            let tx = tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(first_delay).await;
                let _ = tx.send(Tick::FirstCycle).await;
            })
        };

        let cycle = {
            let tx = tx.clone();
            tokio::spawn(async move {
                let start = tokio::time::Instant::now() + cycle_every;
                let mut interval = tokio::time::interval_at(start, cycle_every);
                loop {
                    interval.tick().await;
                    if tx.send(Tick::Cycle).await.is_err() {
                        break;
                    }
                }
            })
        };

        let integrity = {
            let tx = tx.clone();
            tokio::spawn(async move {
                let start = tokio::time::Instant::now() + integrity_every;
                let mut interval = tokio::time::interval_at(start, integrity_every);
                loop {
                    interval.tick().await;
                    if tx.send(Tick::Integrity).await.is_err() {
                        break;
                    }
                }
            })
        };

        Self {
            tick_rx,
            handles: vec![first, cycle, integrity],
        }
    }

    /// Waits for the next tick; `None` once the scheduler has stopped
    pub async fn next_tick(&mut self) -> Option<Tick> {
        self.tick_rx.recv().await
    }

    /// Aborts all timer tasks; no further ticks will be delivered
    pub fn stop(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
        self.tick_rx.close();
        info!("Sync scheduler stopped");
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

/// Consumes ticks until the scheduler stops, driving the controller
///
/// Guard rejections (cycle in progress, throttled) are normal and only
/// logged at debug level.
pub async fn drive(scheduler: &mut SyncScheduler, controller: &mut SyncCycleController) {
    while let Some(tick) = scheduler.next_tick().await {
        match tick {
            Tick::FirstCycle | Tick::Cycle => match controller.run_cycle().await {
                Ok(outcome) => {
                    debug!(
                        pushed = outcome.pushed,
                        pulled = outcome.pulled,
                        aborted = outcome.aborted.is_some(),
                        "Scheduled cycle finished"
                    );
                }
                Err(SyncError::CycleInProgress) | Err(SyncError::Throttled(_)) => {
                    debug!("Scheduled cycle skipped by guard");
                }
                Err(e) => warn!(error = %e, "Scheduled cycle failed"),
            },
            Tick::Integrity => {
                if let Some(report) = controller.run_integrity_check().await {
                    debug!(score = report.health_score(), "Integrity check completed");
                }
            }
        }
    }
    debug!("Scheduler drive loop ended");
}
