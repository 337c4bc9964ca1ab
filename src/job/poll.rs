//! Client-side polling of a job until it settles.

use crate::error::GenerationError;
use crate::store::{JobRecord, JobStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum WatchOutcome {
    /// The job reached `completed` or `failed`.
    Finished(JobRecord),
    /// Neither progress nor step changed for longer than the stall window.
    Stalled { record: JobRecord, idle: Duration },
}

pub struct JobWatcher {
    jobs: Arc<dyn JobStore>,
    interval: Duration,
    stall_after: Duration,
}

/// Shortest poll period; a zero interval is raised to this.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

impl JobWatcher {
    pub fn new(jobs: Arc<dyn JobStore>, interval: Duration, stall_after: Duration) -> Self {
        Self {
            jobs,
            interval: interval.max(MIN_POLL_INTERVAL),
            stall_after,
        }
    }

    /// Poll `job_id` until it is terminal or stalls. `on_update` sees every observed change.
    pub async fn watch(
        &self,
        job_id: &str,
        mut on_update: impl FnMut(&JobRecord),
    ) -> Result<WatchOutcome, GenerationError> {
        let mut ticks = time::interval(self.interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last: Option<(u8, String)> = None;
        let mut last_change = Instant::now();

        loop {
            ticks.tick().await;
            let record = self
                .jobs
                .job(job_id)?
                .ok_or_else(|| GenerationError::NotFound(format!("job {}", job_id)))?;

            let marker = (record.progress, record.current_step.clone());
            if last.as_ref() != Some(&marker) {
                debug!(job_id, progress = record.progress, step = %record.current_step, "Job update");
                on_update(&record);
                last = Some(marker);
                last_change = Instant::now();
            }

            if record.status.is_terminal() {
                return Ok(WatchOutcome::Finished(record));
            }
            let idle = last_change.elapsed();
            if idle > self.stall_after {
                return Ok(WatchOutcome::Stalled { record, idle });
            }
        }
    }
}
