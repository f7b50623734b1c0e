//! Periodic scheduler for the healing pipeline
//!
//! The pipeline itself is schedule-agnostic; this is the recurring trigger
//! that invokes it, bounds each run's wall time, and logs the summary. No
//! state is kept between runs: recovery is re-deriving eligibility from
//! the ledger, so a crashed or timed-out run simply leaves its unfinished
//! candidates for the next firing.

use crate::error::{IasoError, Result};
use crate::pipeline::HealingPipeline;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{error, info};

/// Recurring runner for the healing pipeline
pub struct HealingScheduler {
    pipeline: Arc<HealingPipeline>,
    interval: Duration,
    max_run_duration: Duration,
    running: Arc<AtomicBool>,
}

impl HealingScheduler {
    pub fn new(
        pipeline: Arc<HealingPipeline>,
        interval: Duration,
        max_run_duration: Duration,
    ) -> Self {
        Self {
            pipeline,
            interval,
            max_run_duration,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the scheduler loop; runs until `stop` is called
    pub async fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(IasoError::InvalidOperation(
                "Scheduler is already running".to_string(),
            ));
        }

        info!(
            "Starting healing scheduler (interval: {:?}, max run duration: {:?})",
            self.interval, self.max_run_duration
        );

        while self.running.load(Ordering::SeqCst) {
            self.fire_once().await;

            // Sleep in short slices so stop() takes effect promptly
            let mut remaining = self.interval;
            while self.running.load(Ordering::SeqCst) && !remaining.is_zero() {
                let slice = remaining.min(Duration::from_secs(1));
                sleep(slice).await;
                remaining = remaining.saturating_sub(slice);
            }
        }

        info!("Healing scheduler stopped");
        Ok(())
    }

    /// Signal the loop to exit after the current run/sleep slice
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Whether the loop is currently active
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Trigger one bounded run and log its outcome. Run-level errors are
    /// surfaced to the log, never out of the loop; the next firing is the
    /// retry mechanism.
    async fn fire_once(&self) {
        match timeout(self.max_run_duration, self.pipeline.run_once()).await {
            Ok(Ok(summary)) => {
                info!("Scheduled healing run finished: {}", summary);
            }
            Ok(Err(e)) => {
                error!("Scheduled healing run aborted: {}", e);
            }
            Err(_) => {
                error!(
                    "Scheduled healing run timed out after {:?}; unfinished candidates stay eligible",
                    self.max_run_duration
                );
            }
        }
    }
}
