//! Cycle scheduler.
//!
//! Runs the [`PollCycleController`] in an unbounded loop on a single task.
//! A new cycle never starts before the previous one, including any
//! rate-limit backoff, has finished.  Shutdown is observed only between
//! cycles and while sleeping.

use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

use crate::controller::{CycleOutcome, PollCycleController};

/// Timing knobs for the scheduler loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Pause between the end of one cycle and the start of the next.
    pub poll_interval: Duration,
    /// Backoff used when the provider rate-limits without a retry hint.
    pub rate_limit_fallback: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(300),
            rate_limit_fallback: Duration::from_secs(15 * 60),
        }
    }
}

impl SchedulerConfig {
    /// How long to wait after a cycle that ended with `outcome`.
    ///
    /// A rate-limited cycle waits for the provider's hint (or the fallback),
    /// but never less than the normal poll interval.
    pub fn delay_after(&self, outcome: &CycleOutcome) -> Duration {
        match outcome {
            CycleOutcome::RateLimited { retry_after, .. } => retry_after
                .unwrap_or(self.rate_limit_fallback)
                .max(self.poll_interval),
            CycleOutcome::Completed(_)
            | CycleOutcome::AccountLookupFailed { .. }
            | CycleOutcome::PostsUnavailable { .. } => self.poll_interval,
        }
    }
}

/// Drives poll cycles forever.
pub struct Scheduler {
    controller: PollCycleController,
    config: SchedulerConfig,
    cycles_run: u64,
}

impl Scheduler {
    /// Create a scheduler that owns `controller`.
    pub fn new(controller: PollCycleController, config: SchedulerConfig) -> Self {
        Self {
            controller,
            config,
            cycles_run: 0,
        }
    }

    /// The owned controller.
    pub fn controller(&self) -> &PollCycleController {
        &self.controller
    }

    /// Number of cycles started so far.
    pub fn cycles_run(&self) -> u64 {
        self.cycles_run
    }

    /// Run exactly one cycle without sleeping afterwards.
    pub async fn run_once(&mut self) -> CycleOutcome {
        self.cycles_run += 1;
        self.controller.run_cycle().await
    }

    /// Run cycles until `shutdown` turns `true`.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.poll_interval.as_secs(),
            fallback_secs = self.config.rate_limit_fallback.as_secs(),
            "scheduler started"
        );

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            let outcome = self.run_once().await;
            let delay = self.config.delay_after(&outcome);
            info!(
                cycle = self.cycles_run,
                next_in_secs = delay.as_secs(),
                "sleeping until next cycle"
            );

            if sleep_or_shutdown(delay, &mut shutdown).await {
                break;
            }
        }

        info!(cycles = self.cycles_run, "scheduler stopped");
    }
}

/// Sleep for `delay`, returning `true` early if shutdown is requested.
async fn sleep_or_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return false,
            changed = shutdown.changed() => {
                if changed.is_err() {
                    // Sender gone: nobody can ask us to stop any more.
                    (&mut sleep).await;
                    return false;
                }
                if *shutdown.borrow_and_update() {
                    return true;
                }
            }
        }
    }
}
