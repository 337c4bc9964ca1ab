//! Generation jobs: the persisted state machine, its progress ticker and a poller.
//!
//! `pending -> processing -> {completed, failed}`. Every write goes through
//! [`JobStore::update_job`], so each transition is a check-and-set against the stored record.

pub mod controller;
pub mod poll;
pub mod ticker;

pub use controller::{ExecutionMode, JobController, JobRequest, JobSettings, StartOutcome};
pub use poll::{JobWatcher, WatchOutcome};
pub use ticker::ProgressTicker;

use crate::error::StorageError;
use crate::store::{JobRecord, JobStatus, JobStore, JobUpdate};
use chrono::Utc;

/// A named point on the progress scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub progress: u8,
    pub label: &'static str,
}

impl Step {
    pub const fn new(progress: u8, label: &'static str) -> Self {
        Self { progress, label }
    }
}

pub const QUEUED: &str = "Queued for processing";
pub const STARTING: Step = Step::new(5, "Starting evaluation generation...");
pub const AGGREGATING: Step = Step::new(10, "Aggregating context from assessments...");
pub const INITIALIZING: Step = Step::new(25, "Initializing AI generation engine...");
pub const GENERATING: Step = Step::new(
    30,
    "AI is generating test scenarios (this may take a few minutes)...",
);
pub const SAVING: Step = Step::new(90, "Saving evaluation configuration...");
pub const COMPLETE: Step = Step::new(100, "Generation complete!");

/// Labels the ticker walks through while a generation call is outstanding.
pub const TICKER_STEPS: [Step; 6] = [
    Step::new(30, "Generating test perspectives..."),
    Step::new(40, "Creating adversarial test scenarios..."),
    Step::new(50, "Creating safety test scenarios..."),
    Step::new(60, "Creating performance test scenarios..."),
    Step::new(70, "Generating guardrail-specific tests..."),
    Step::new(80, "Synthesizing test suites..."),
];

/// Move a processing job to `step`. Never lowers progress and never touches a job that is
/// not processing.
pub fn advance(jobs: &dyn JobStore, job_id: &str, step: Step) -> Result<JobUpdate, StorageError> {
    jobs.update_job(job_id, &mut |current: &JobRecord| {
        if current.status != JobStatus::Processing || current.progress > step.progress {
            return None;
        }
        Some(JobRecord {
            progress: step.progress,
            current_step: step.label.to_string(),
            ..current.clone()
        })
    })
}

/// Move a non-terminal job to `failed`. Progress is left where it was.
pub fn fail(jobs: &dyn JobStore, job_id: &str, message: &str) -> Result<JobUpdate, StorageError> {
    jobs.update_job(job_id, &mut |current: &JobRecord| {
        if current.status.is_terminal() {
            return None;
        }
        Some(JobRecord {
            status: JobStatus::Failed,
            error: Some(message.to_string()),
            completed_at: Some(Utc::now()),
            ..current.clone()
        })
    })
}
