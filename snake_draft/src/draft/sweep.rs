//! Periodic stall sweep.
//!
//! Launches full rooms that never launched and recovers drafting rooms with
//! no live timer, e.g. after a restart.

use super::errors::DraftError;
use super::scheduler::DraftScheduler;
use crate::contest::ContestRepository;
use std::{sync::Arc, time::Duration};
use tokio::sync::watch;

/// What one sweep pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub launched: Vec<i64>,
    pub recovered: Vec<i64>,
}

pub struct StallSweeper {
    scheduler: DraftScheduler,
    repo: Arc<dyn ContestRepository>,
    interval: Duration,
}

impl StallSweeper {
    pub fn new(scheduler: DraftScheduler, repo: Arc<dyn ContestRepository>) -> Self {
        let interval = scheduler.config().sweep_interval();
        Self {
            scheduler,
            repo,
            interval,
        }
    }

    /// Run one pass. Failures are logged per room and never abort the pass.
    pub async fn sweep_once(&self) -> SweepReport {
        let mut report = SweepReport::default();

        match self.repo.full_unlaunched_rooms().await {
            Ok(rooms) => {
                for room_id in rooms {
                    if self.scheduler.registry().contains(room_id) {
                        continue;
                    }
                    match self.scheduler.launch(room_id).await {
                        Ok(()) => report.launched.push(room_id),
                        Err(DraftError::AlreadyLaunched(_)) => {}
                        Err(e) => log::warn!("Sweep: launch of room {} failed: {}", room_id, e),
                    }
                }
            }
            Err(e) => log::error!("Sweep: failed to list full rooms: {}", e),
        }

        match self.repo.drafting_rooms().await {
            Ok(rooms) => {
                for room_id in rooms {
                    if self.scheduler.timers().is_armed(room_id)
                        || self.scheduler.registry().is_launching(room_id)
                    {
                        continue;
                    }
                    match self.scheduler.recover(room_id).await {
                        Ok(()) => report.recovered.push(room_id),
                        Err(e) => log::warn!("Sweep: recovery of room {} failed: {}", room_id, e),
                    }
                }
            }
            Err(e) => log::error!("Sweep: failed to list drafting rooms: {}", e),
        }

        if !report.launched.is_empty() || !report.recovered.is_empty() {
            log::info!(
                "Sweep launched {:?}, recovered {:?}",
                report.launched,
                report.recovered
            );
        }
        report
    }

    /// Sweep on an interval until `shutdown` flips to true
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep_once().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        log::info!("Stall sweep stopped");
    }
}
