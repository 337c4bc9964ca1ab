//! Job controller: creates jobs, claims them and drives them to a terminal state.

use super::ticker::ProgressTicker;
use super::{
    advance, fail, AGGREGATING, COMPLETE, GENERATING, INITIALIZING, SAVING, STARTING,
    TICKER_STEPS,
};
use crate::context::{CallerIdentity, ContextAggregator};
use crate::error::GenerationError;
use crate::generation::GenerationStrategy;
use crate::pipeline::{save_artifact, GenerationMethod, Generator};
use crate::store::{
    ArtifactStore, JobRecord, JobResult, JobStatus, JobStore, JobSummary, JobUpdate, NewJob,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// Message written to a job when no provider is available.
pub const PROVIDER_MISSING: &str = "LLM provider API key is not configured";

/// Timing knobs for job processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobSettings {
    /// Generation time limit for a job run.
    pub time_limit: Duration,
    /// Interval between progress ticks while the model is working.
    pub tick_interval: Duration,
    /// Replaces the intensity's per-suite scenario cap.
    pub max_tests_per_suite: Option<usize>,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            time_limit: Duration::from_secs(300),
            tick_interval: Duration::from_secs(12),
            max_tests_per_suite: None,
        }
    }
}

/// Parameters for a new job.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub use_case_id: String,
    pub guardrails_id: Option<String>,
    pub generation_strategy: String,
    pub test_intensity: String,
    pub use_orchestrator: bool,
    pub requested_by: Option<String>,
}

impl JobRequest {
    pub fn new(use_case_id: impl Into<String>) -> Self {
        Self {
            use_case_id: use_case_id.into(),
            guardrails_id: None,
            generation_strategy: "comprehensive".to_string(),
            test_intensity: "standard".to_string(),
            use_orchestrator: false,
            requested_by: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Process inline and return the finished record.
    Sync,
    /// Spawn processing and return immediately.
    Async,
}

/// What `start` did.
#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    /// Job was already terminal; nothing was run.
    AlreadyFinished(JobRecord),
    /// Another caller owns the run.
    AlreadyProcessing(JobRecord),
    /// Sync mode ran the job to a terminal state.
    Finished(JobRecord),
    /// Async mode claimed the job and spawned processing.
    Started { job_id: String },
}

#[derive(Clone)]
pub struct JobController {
    jobs: Arc<dyn JobStore>,
    artifacts: Arc<dyn ArtifactStore>,
    aggregator: Arc<ContextAggregator>,
    generator: Option<Generator>,
    settings: JobSettings,
}

impl JobController {
    /// `generator` is `None` when no provider is configured; jobs then fail at start.
    pub fn new(
        jobs: Arc<dyn JobStore>,
        artifacts: Arc<dyn ArtifactStore>,
        aggregator: Arc<ContextAggregator>,
        generator: Option<Generator>,
        settings: JobSettings,
    ) -> Self {
        Self {
            jobs,
            artifacts,
            aggregator,
            generator,
            settings,
        }
    }

    /// Create a pending job, or return the use case's active job if one exists.
    pub fn create_job(&self, request: JobRequest) -> Result<JobRecord, GenerationError> {
        GenerationStrategy::parse(&request.generation_strategy, &request.test_intensity)?;

        if let Some(active) = self.jobs.active_job(&request.use_case_id)? {
            info!(job_id = %active.id, use_case_id = %request.use_case_id, "Reusing active job");
            return Ok(active);
        }

        let job = self.jobs.create_job(NewJob {
            use_case_id: request.use_case_id,
            guardrails_id: request.guardrails_id,
            generation_strategy: request.generation_strategy,
            test_intensity: request.test_intensity,
            use_orchestrator: request.use_orchestrator,
            requested_by: request.requested_by,
        })?;
        info!(job_id = %job.id, use_case_id = %job.use_case_id, "Job created");
        Ok(job)
    }

    pub fn get_job(&self, job_id: &str) -> Result<JobRecord, GenerationError> {
        self.jobs
            .job(job_id)?
            .ok_or_else(|| GenerationError::NotFound(format!("job {}", job_id)))
    }

    pub fn latest_job(&self, use_case_id: &str) -> Result<JobRecord, GenerationError> {
        self.jobs
            .latest_job(use_case_id)?
            .ok_or_else(|| GenerationError::NotFound(format!("no jobs for use case {}", use_case_id)))
    }

    /// Claim a pending job and process it.
    ///
    /// Terminal and already-processing jobs are reported back unchanged. Exactly one caller
    /// wins the `pending -> processing` transition.
    #[instrument(skip(self, caller))]
    pub async fn start(
        &self,
        job_id: &str,
        mode: ExecutionMode,
        caller: &CallerIdentity,
    ) -> Result<StartOutcome, GenerationError> {
        let job = self.get_job(job_id)?;
        if let Some(outcome) = settled(&job) {
            return Ok(outcome);
        }

        let Some(generator) = self.generator.clone() else {
            return self.fail_unclaimed(job_id);
        };

        let claim = self.jobs.update_job(job_id, &mut |current: &JobRecord| {
            if current.status != JobStatus::Pending {
                return None;
            }
            Some(JobRecord {
                status: JobStatus::Processing,
                progress: STARTING.progress,
                current_step: STARTING.label.to_string(),
                error: None,
                ..current.clone()
            })
        })?;
        let job = match claim {
            JobUpdate::Applied(job) => job,
            JobUpdate::Rejected(current) => {
                return Ok(settled(&current).unwrap_or(StartOutcome::AlreadyProcessing(current)))
            }
        };
        info!(job_id, use_case_id = %job.use_case_id, "Job claimed");

        match mode {
            ExecutionMode::Sync => {
                self.process(&generator, &job, caller).await;
                Ok(StartOutcome::Finished(self.get_job(job_id)?))
            }
            ExecutionMode::Async => {
                let controller = self.clone();
                let caller = caller.clone();
                let id = job.id.clone();
                tokio::spawn(async move {
                    controller.process(&generator, &job, &caller).await;
                });
                Ok(StartOutcome::Started { job_id: id })
            }
        }
    }

    /// Fail a still-pending job because no provider is configured. A job claimed or finished
    /// in the meantime belongs to another caller and is reported back untouched.
    fn fail_unclaimed(&self, job_id: &str) -> Result<StartOutcome, GenerationError> {
        let update = self.jobs.update_job(job_id, &mut |current: &JobRecord| {
            if current.status != JobStatus::Pending {
                return None;
            }
            Some(JobRecord {
                status: JobStatus::Failed,
                error: Some(PROVIDER_MISSING.to_string()),
                completed_at: Some(Utc::now()),
                ..current.clone()
            })
        })?;
        match update {
            JobUpdate::Applied(_) => {
                warn!(job_id, "Job failed before start, no provider configured");
                Err(GenerationError::Configuration(PROVIDER_MISSING.to_string()))
            }
            JobUpdate::Rejected(current) => {
                Ok(settled(&current).unwrap_or(StartOutcome::AlreadyProcessing(current)))
            }
        }
    }

    /// Run a claimed job. Any failure is written to the job record.
    async fn process(&self, generator: &Generator, job: &JobRecord, caller: &CallerIdentity) {
        if let Err(err) = self.run(generator, job, caller).await {
            error!(job_id = %job.id, code = err.code(), error = %err, "Job failed");
            if let Err(store_err) = fail(self.jobs.as_ref(), &job.id, &err.to_string()) {
                error!(job_id = %job.id, error = %store_err, "Could not record job failure");
            }
        }
    }

    async fn run(
        &self,
        generator: &Generator,
        job: &JobRecord,
        caller: &CallerIdentity,
    ) -> Result<(), GenerationError> {
        let jobs = self.jobs.as_ref();
        let mut strategy =
            GenerationStrategy::parse(&job.generation_strategy, &job.test_intensity)?
                .with_time_limit(self.settings.time_limit);
        if let Some(max) = self.settings.max_tests_per_suite {
            strategy = strategy.with_max_tests_per_suite(max);
        }
        let method = GenerationMethod::from_flag(job.use_orchestrator);

        advance(jobs, &job.id, AGGREGATING)?;
        let ctx = self
            .aggregator
            .build_context(&job.use_case_id, job.guardrails_id.as_deref(), caller)?;

        advance(jobs, &job.id, INITIALIZING)?;
        advance(jobs, &job.id, GENERATING)?;
        let ticker = ProgressTicker::start(
            self.jobs.clone(),
            job.id.clone(),
            self.settings.tick_interval,
            &TICKER_STEPS,
        );
        let generated = generator.generate(&ctx, &strategy, method).await;
        ticker.stop().await;
        let result = generated?;

        advance(jobs, &job.id, SAVING)?;
        let saved = save_artifact(self.artifacts.as_ref(), &result)?;
        let job_result = JobResult {
            evaluation_id: saved.evaluation_id,
            evaluation_config: saved.configuration,
            summary: JobSummary {
                total_suites: result.test_suites.len(),
                total_scenarios: result.total_scenarios(),
                generation_method: method.as_str().to_string(),
            },
            saved: saved.saved,
        };

        let completion = jobs.update_job(&job.id, &mut |current: &JobRecord| {
            if current.status != JobStatus::Processing {
                return None;
            }
            Some(JobRecord {
                status: JobStatus::Completed,
                progress: COMPLETE.progress,
                current_step: COMPLETE.label.to_string(),
                result: Some(job_result.clone()),
                completed_at: Some(Utc::now()),
                ..current.clone()
            })
        })?;
        if completion.is_applied() {
            info!(
                job_id = %job.id,
                suites = result.test_suites.len(),
                scenarios = result.total_scenarios(),
                "Job completed"
            );
        } else {
            warn!(job_id = %job.id, status = %completion.record().status, "Job left processing before completion");
        }
        Ok(())
    }
}

fn settled(job: &JobRecord) -> Option<StartOutcome> {
    match job.status {
        JobStatus::Completed | JobStatus::Failed => Some(StartOutcome::AlreadyFinished(job.clone())),
        JobStatus::Processing => Some(StartOutcome::AlreadyProcessing(job.clone())),
        JobStatus::Pending => None,
    }
}
