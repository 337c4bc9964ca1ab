//! Observability-only progress ticker.
//!
//! Runs beside a generation call and walks the job through [`TICKER_STEPS`] at a fixed
//! interval. It never feeds back into control flow; write errors are logged and ignored.

use super::{advance, Step};
use crate::store::JobStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

pub struct ProgressTicker {
    cancel: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressTicker {
    /// Start ticking. The first step is written one `period` from now.
    pub fn start(
        jobs: Arc<dyn JobStore>,
        job_id: String,
        period: Duration,
        steps: &'static [Step],
    ) -> Self {
        let (cancel, mut cancelled) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut remaining = steps.iter();
            loop {
                tokio::select! {
                    _ = &mut cancelled => break,
                    _ = ticks.tick() => {
                        let Some(step) = remaining.next() else { break };
                        match advance(jobs.as_ref(), &job_id, *step) {
                            Ok(update) if update.is_applied() => {
                                debug!(job_id = %job_id, progress = step.progress, "Progress tick");
                            }
                            Ok(_) => {}
                            Err(err) => debug!(job_id = %job_id, error = %err, "Progress tick not written"),
                        }
                    }
                }
            }
        });
        Self {
            cancel: Some(cancel),
            handle: Some(handle),
        }
    }

    /// Cancel and wait for the ticker task to exit.
    pub async fn stop(mut self) {
        if let Some(cancel) = self.cancel.take() {
            // the task may already have run out of steps
            let _ = cancel.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for ProgressTicker {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
