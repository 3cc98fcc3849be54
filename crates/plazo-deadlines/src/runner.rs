//! Periodic reconciliation sweep.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::lifecycle::CaseLifecycleController;
use crate::scheduler::DeadlineScheduler;

/// Runs [`CaseLifecycleController::sweep`] on a fixed interval.
///
/// The first sweep runs immediately so that cases whose triggers were lost
/// while the process was down are escalated on startup. With a scheduler
/// attached, every tick first registers triggers for all open cases, which
/// picks up cases filed since the previous tick.
pub struct SweepRunner {
    controller: Arc<CaseLifecycleController>,
    interval: Duration,
    scheduler: Option<DeadlineScheduler>,
}

impl SweepRunner {
    pub fn new(controller: Arc<CaseLifecycleController>, interval: Duration) -> Self {
        Self {
            controller,
            interval,
            scheduler: None,
        }
    }

    pub fn with_scheduler(mut self, scheduler: DeadlineScheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Register triggers for every open case. A case that cannot be
    /// scheduled is logged and left to the sweep. Returns how many were
    /// scheduled.
    pub async fn schedule_open(&self, scheduler: &DeadlineScheduler, now: DateTime<Utc>) -> usize {
        let open = match self.controller.open_cases().await {
            Ok(open) => open,
            Err(e) => {
                error!(error = %e, "could not list open cases for scheduling");
                return 0;
            }
        };

        let mut scheduled = 0;
        for case in &open {
            let Some(submission) = case.submission_date else {
                warn!(case_id = %case.id, "open case without submission date, left to the sweep");
                continue;
            };
            match scheduler.schedule(&case.id, submission, now).await {
                Ok(_) => scheduled += 1,
                Err(e) => {
                    warn!(case_id = %case.id, error = %e, "could not schedule case, left to the sweep");
                }
            }
        }
        debug!(open = open.len(), scheduled, "open cases scheduled");
        scheduled
    }

    /// Sweep until `shutdown` flips to `true` or its sender is dropped.
    /// Returns the number of sweeps that completed.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> usize {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut completed = 0;

        info!(interval = ?self.interval, "sweep runner started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Some(scheduler) = &self.scheduler {
                        self.schedule_open(scheduler, Utc::now()).await;
                    }
                    match self.controller.sweep(Utc::now()).await {
                        Ok(_) => completed += 1,
                        Err(e) => error!(error = %e, "sweep failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!(completed, "sweep runner stopped");
        completed
    }
}
