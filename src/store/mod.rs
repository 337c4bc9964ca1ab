//! Record Store
//!
//! Typed records for use cases, assessments, guardrails, evaluation artifacts and generation
//! jobs, plus the read/write interfaces the pipeline consults. The relational schema behind
//! the dashboard is not modelled here; only the reads and writes generation needs.

pub mod persistence;

pub use persistence::SledStore;

use crate::document::Document;
use crate::error::StorageError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A governed AI use case.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UseCaseRecord {
    pub id: String,
    #[serde(default)]
    pub organization_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub problem_statement: String,
    #[serde(default)]
    pub proposed_solution: String,
    #[serde(default)]
    pub current_state: String,
    #[serde(default)]
    pub desired_state: String,
    #[serde(default)]
    pub success_criteria: Vec<String>,
    #[serde(default)]
    pub key_assumptions: Vec<String>,
    #[serde(default)]
    pub primary_stakeholders: Vec<String>,
    #[serde(default)]
    pub secondary_stakeholders: Vec<String>,
    #[serde(default)]
    pub confidence_level: f64,
    #[serde(default)]
    pub implementation_complexity: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// One sub-assessment. `results` is free-form; the aggregator reads known fields from it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentRecord {
    pub id: String,
    pub use_case_id: String,
    #[serde(rename = "type")]
    pub assessment_type: String,
    #[serde(default)]
    pub results: Value,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// A guardrail configuration produced for a use case.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GuardrailRecord {
    pub id: String,
    pub use_case_id: String,
    #[serde(default)]
    pub configuration: Value,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// Outcome of a single executed test, as recorded on past evaluations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResultEntry {
    #[serde(default)]
    pub category: Option<String>,
    pub passed: bool,
}

/// Pass/fail totals of an executed evaluation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationRunSummary {
    #[serde(default)]
    pub total_tests: u64,
    #[serde(default)]
    pub passed: u64,
}

/// Persisted evaluation artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationRecord {
    pub id: String,
    pub use_case_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub configuration: Value,
    pub status: String,
    /// Produced by the generation pipeline rather than entered by hand.
    #[serde(default)]
    pub generated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<EvaluationRunSummary>,
    #[serde(default)]
    pub results: Vec<EvaluationResultEntry>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// Artifact about to be written. The configuration must already be sanitized.
#[derive(Debug, Clone)]
pub struct NewEvaluation {
    pub use_case_id: String,
    pub name: String,
    pub description: String,
    pub configuration: Document,
}

/// An approval decision on a use case.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRecord {
    pub id: String,
    pub use_case_id: String,
    pub area: String,
    pub status: String,
    #[serde(default)]
    pub approver: Option<String>,
    #[serde(default)]
    pub decided_at: Option<DateTime<Utc>>,
}

/// Financial figures attached to a use case.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FinancialRecord {
    pub use_case_id: String,
    #[serde(default)]
    pub development_cost: Option<f64>,
    #[serde(default)]
    pub operating_cost: Option<f64>,
    #[serde(default)]
    pub expected_roi: Option<f64>,
    #[serde(default)]
    pub budget: Option<f64>,
}

/// Job lifecycle states. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counts reported alongside a finished job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub total_suites: usize,
    pub total_scenarios: usize,
    pub generation_method: String,
}

/// Stored on a completed job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_id: Option<String>,
    pub evaluation_config: Value,
    pub summary: JobSummary,
    pub saved: bool,
}

/// Persisted state machine for one generation run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: String,
    pub use_case_id: String,
    #[serde(default)]
    pub guardrails_id: Option<String>,
    pub generation_strategy: String,
    pub test_intensity: String,
    /// Run the multi-agent orchestrator instead of the staged engine.
    #[serde(default)]
    pub use_orchestrator: bool,
    pub status: JobStatus,
    pub progress: u8,
    pub current_step: String,
    #[serde(default)]
    pub result: Option<JobResult>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub requested_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Job about to be created in `pending`.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub use_case_id: String,
    pub guardrails_id: Option<String>,
    pub generation_strategy: String,
    pub test_intensity: String,
    pub use_orchestrator: bool,
    pub requested_by: Option<String>,
}

/// Outcome of a conditional job update.
#[derive(Debug, Clone, PartialEq)]
pub enum JobUpdate {
    /// The condition held and the new record was written.
    Applied(JobRecord),
    /// The condition did not hold; carries the record as it was read.
    Rejected(JobRecord),
}

impl JobUpdate {
    pub fn record(&self) -> &JobRecord {
        match self {
            JobUpdate::Applied(r) | JobUpdate::Rejected(r) => r,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, JobUpdate::Applied(_))
    }
}

/// Read access to a use case's assessment graph.
pub trait AssessmentSource: Send + Sync {
    fn use_case(&self, id: &str) -> Result<Option<UseCaseRecord>, StorageError>;

    fn assessments(&self, use_case_id: &str) -> Result<Vec<AssessmentRecord>, StorageError>;

    fn guardrail(&self, id: &str) -> Result<Option<GuardrailRecord>, StorageError>;

    /// Most recent guardrail configuration for the use case.
    fn latest_guardrail(&self, use_case_id: &str) -> Result<Option<GuardrailRecord>, StorageError>;

    /// Evaluations for the use case, newest first.
    fn evaluations(&self, use_case_id: &str) -> Result<Vec<EvaluationRecord>, StorageError>;

    fn approvals(&self, use_case_id: &str) -> Result<Vec<ApprovalRecord>, StorageError>;

    fn financials(&self, use_case_id: &str) -> Result<Option<FinancialRecord>, StorageError>;
}

/// Evaluation artifact persistence.
pub trait ArtifactStore: Send + Sync {
    /// Write a new artifact. Fails with `Unrepresentable` if the configuration still holds
    /// undefined values.
    fn insert_evaluation(&self, draft: NewEvaluation) -> Result<EvaluationRecord, StorageError>;

    fn evaluation(&self, id: &str) -> Result<Option<EvaluationRecord>, StorageError>;

    /// Newest artifact for the use case that the pipeline generated.
    fn latest_generated_evaluation(
        &self,
        use_case_id: &str,
    ) -> Result<Option<EvaluationRecord>, StorageError>;
}

/// Job record persistence.
pub trait JobStore: Send + Sync {
    fn create_job(&self, draft: NewJob) -> Result<JobRecord, StorageError>;

    fn job(&self, id: &str) -> Result<Option<JobRecord>, StorageError>;

    /// A pending or processing job for the use case, if any.
    fn active_job(&self, use_case_id: &str) -> Result<Option<JobRecord>, StorageError>;

    /// Most recently created job for the use case.
    fn latest_job(&self, use_case_id: &str) -> Result<Option<JobRecord>, StorageError>;

    /// Atomically replace the job record with `apply(current)`.
    ///
    /// `apply` sees the record as currently stored and returns the replacement, or `None` to
    /// leave it untouched. It may be called more than once if a concurrent writer wins.
    fn update_job(
        &self,
        id: &str,
        apply: &mut dyn FnMut(&JobRecord) -> Option<JobRecord>,
    ) -> Result<JobUpdate, StorageError>;
}
