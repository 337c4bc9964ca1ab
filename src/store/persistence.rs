//! Persistence layer for the record store

use crate::error::StorageError;
use crate::store::{
    ApprovalRecord, ArtifactStore, AssessmentRecord, AssessmentSource, EvaluationRecord,
    FinancialRecord, GuardrailRecord, JobRecord, JobStatus, JobStore, JobUpdate, NewEvaluation,
    NewJob, UseCaseRecord,
};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

const USE_CASES: &str = "use_cases";
const ASSESSMENTS: &str = "assessments";
const GUARDRAILS: &str = "guardrails";
const EVALUATIONS: &str = "evaluations";
const APPROVALS: &str = "approvals";
const FINANCIALS: &str = "financials";
const JOBS: &str = "evaluation_jobs";

/// Sled-backed implementation of every store interface.
///
/// Records are stored as JSON, one sled tree per record kind, keyed by id.
pub struct SledStore {
    db: sled::Db,
    use_cases: sled::Tree,
    assessments: sled::Tree,
    guardrails: sled::Tree,
    evaluations: sled::Tree,
    approvals: sled::Tree,
    financials: sled::Tree,
    jobs: sled::Tree,
}

/// Everything known about one use case, as loaded by `usecase import`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UseCaseBundle {
    pub use_case: UseCaseRecord,
    #[serde(default)]
    pub assessments: Vec<AssessmentRecord>,
    #[serde(default)]
    pub guardrails: Vec<GuardrailRecord>,
    #[serde(default)]
    pub evaluations: Vec<EvaluationRecord>,
    #[serde(default)]
    pub approvals: Vec<ApprovalRecord>,
    #[serde(default)]
    pub financials: Option<FinancialRecord>,
}

/// Counts of records written by an import.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub use_case_id: String,
    pub assessments: usize,
    pub guardrails: usize,
    pub evaluations: usize,
    pub approvals: usize,
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    serde_json::to_vec(value).map_err(|e| StorageError::Encode(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    serde_json::from_slice(bytes).map_err(|e| StorageError::Decode(e.to_string()))
}

impl SledStore {
    /// Open (or create) a store at the given directory.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path.as_ref()).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to open sled database: {}", e),
            ))
        })?;
        Self::from_db(db)
    }

    /// In-memory store removed on drop.
    pub fn temporary() -> Result<Self, StorageError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self, StorageError> {
        Ok(Self {
            use_cases: db.open_tree(USE_CASES)?,
            assessments: db.open_tree(ASSESSMENTS)?,
            guardrails: db.open_tree(GUARDRAILS)?,
            evaluations: db.open_tree(EVALUATIONS)?,
            approvals: db.open_tree(APPROVALS)?,
            financials: db.open_tree(FINANCIALS)?,
            jobs: db.open_tree(JOBS)?,
            db,
        })
    }

    fn next_id(&self, prefix: &str) -> Result<String, StorageError> {
        let n = self.db.generate_id()?;
        Ok(format!("{}-{}", prefix, hex::encode(n.to_be_bytes())))
    }

    fn get<T: DeserializeOwned>(tree: &sled::Tree, id: &str) -> Result<Option<T>, StorageError> {
        match tree.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put<T: Serialize>(tree: &sled::Tree, id: &str, value: &T) -> Result<(), StorageError> {
        tree.insert(id.as_bytes(), encode(value)?)?;
        Ok(())
    }

    fn scan<T, F>(tree: &sled::Tree, keep: F) -> Result<Vec<T>, StorageError>
    where
        T: DeserializeOwned,
        F: Fn(&T) -> bool,
    {
        let mut out = Vec::new();
        for item in tree.iter() {
            let (_, value) = item?;
            let record: T = decode(&value)?;
            if keep(&record) {
                out.push(record);
            }
        }
        Ok(out)
    }

    pub fn put_use_case(&self, record: &UseCaseRecord) -> Result<(), StorageError> {
        Self::put(&self.use_cases, &record.id, record)
    }

    pub fn put_assessment(&self, record: &AssessmentRecord) -> Result<(), StorageError> {
        Self::put(&self.assessments, &record.id, record)
    }

    pub fn put_guardrail(&self, record: &GuardrailRecord) -> Result<(), StorageError> {
        Self::put(&self.guardrails, &record.id, record)
    }

    pub fn put_evaluation(&self, record: &EvaluationRecord) -> Result<(), StorageError> {
        Self::put(&self.evaluations, &record.id, record)
    }

    pub fn put_approval(&self, record: &ApprovalRecord) -> Result<(), StorageError> {
        Self::put(&self.approvals, &record.id, record)
    }

    pub fn put_financials(&self, record: &FinancialRecord) -> Result<(), StorageError> {
        Self::put(&self.financials, &record.use_case_id, record)
    }

    /// Write every record of a bundle, replacing records with the same ids.
    pub fn import_bundle(&self, bundle: &UseCaseBundle) -> Result<ImportSummary, StorageError> {
        let use_case_id = bundle.use_case.id.clone();
        self.put_use_case(&bundle.use_case)?;
        for a in &bundle.assessments {
            self.put_assessment(a)?;
        }
        for g in &bundle.guardrails {
            self.put_guardrail(g)?;
        }
        for e in &bundle.evaluations {
            self.put_evaluation(e)?;
        }
        for a in &bundle.approvals {
            self.put_approval(a)?;
        }
        if let Some(f) = &bundle.financials {
            self.put_financials(f)?;
        }
        self.db.flush()?;

        let summary = ImportSummary {
            use_case_id,
            assessments: bundle.assessments.len(),
            guardrails: bundle.guardrails.len(),
            evaluations: bundle.evaluations.len(),
            approvals: bundle.approvals.len(),
        };
        info!(use_case_id = %summary.use_case_id, "Imported use case bundle");
        Ok(summary)
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}

impl AssessmentSource for SledStore {
    fn use_case(&self, id: &str) -> Result<Option<UseCaseRecord>, StorageError> {
        Self::get(&self.use_cases, id)
    }

    fn assessments(&self, use_case_id: &str) -> Result<Vec<AssessmentRecord>, StorageError> {
        let mut records: Vec<AssessmentRecord> =
            Self::scan(&self.assessments, |a: &AssessmentRecord| a.use_case_id == use_case_id)?;
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }

    fn guardrail(&self, id: &str) -> Result<Option<GuardrailRecord>, StorageError> {
        Self::get(&self.guardrails, id)
    }

    fn latest_guardrail(&self, use_case_id: &str) -> Result<Option<GuardrailRecord>, StorageError> {
        let records: Vec<GuardrailRecord> =
            Self::scan(&self.guardrails, |g: &GuardrailRecord| g.use_case_id == use_case_id)?;
        Ok(records.into_iter().max_by(|a, b| a.created_at.cmp(&b.created_at)))
    }

    fn evaluations(&self, use_case_id: &str) -> Result<Vec<EvaluationRecord>, StorageError> {
        let mut records: Vec<EvaluationRecord> =
            Self::scan(&self.evaluations, |e: &EvaluationRecord| e.use_case_id == use_case_id)?;
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    fn approvals(&self, use_case_id: &str) -> Result<Vec<ApprovalRecord>, StorageError> {
        Self::scan(&self.approvals, |a: &ApprovalRecord| a.use_case_id == use_case_id)
    }

    fn financials(&self, use_case_id: &str) -> Result<Option<FinancialRecord>, StorageError> {
        Self::get(&self.financials, use_case_id)
    }
}

impl ArtifactStore for SledStore {
    fn insert_evaluation(&self, draft: NewEvaluation) -> Result<EvaluationRecord, StorageError> {
        let configuration = draft.configuration.to_json()?;
        let record = EvaluationRecord {
            id: self.next_id("eval")?,
            use_case_id: draft.use_case_id,
            name: draft.name,
            description: draft.description,
            configuration,
            status: "pending".to_string(),
            generated: true,
            summary: None,
            results: Vec::new(),
            created_at: Utc::now(),
        };
        self.put_evaluation(&record)?;
        self.db.flush()?;
        debug!(evaluation_id = %record.id, use_case_id = %record.use_case_id, "Stored evaluation");
        Ok(record)
    }

    fn evaluation(&self, id: &str) -> Result<Option<EvaluationRecord>, StorageError> {
        Self::get(&self.evaluations, id)
    }

    fn latest_generated_evaluation(
        &self,
        use_case_id: &str,
    ) -> Result<Option<EvaluationRecord>, StorageError> {
        Ok(self
            .evaluations(use_case_id)?
            .into_iter()
            .find(|e| e.generated))
    }
}

impl JobStore for SledStore {
    fn create_job(&self, draft: NewJob) -> Result<JobRecord, StorageError> {
        let now = Utc::now();
        let record = JobRecord {
            id: self.next_id("job")?,
            use_case_id: draft.use_case_id,
            guardrails_id: draft.guardrails_id,
            generation_strategy: draft.generation_strategy,
            test_intensity: draft.test_intensity,
            use_orchestrator: draft.use_orchestrator,
            status: JobStatus::Pending,
            progress: 0,
            current_step: "Queued for processing".to_string(),
            result: None,
            error: None,
            requested_by: draft.requested_by,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        Self::put(&self.jobs, &record.id, &record)?;
        self.db.flush()?;
        Ok(record)
    }

    fn job(&self, id: &str) -> Result<Option<JobRecord>, StorageError> {
        Self::get(&self.jobs, id)
    }

    fn active_job(&self, use_case_id: &str) -> Result<Option<JobRecord>, StorageError> {
        let active: Vec<JobRecord> = Self::scan(&self.jobs, |j: &JobRecord| {
            j.use_case_id == use_case_id && !j.status.is_terminal()
        })?;
        Ok(active.into_iter().max_by(|a, b| a.created_at.cmp(&b.created_at)))
    }

    fn latest_job(&self, use_case_id: &str) -> Result<Option<JobRecord>, StorageError> {
        let jobs: Vec<JobRecord> =
            Self::scan(&self.jobs, |j: &JobRecord| j.use_case_id == use_case_id)?;
        Ok(jobs.into_iter().max_by(|a, b| a.created_at.cmp(&b.created_at)))
    }

    fn update_job(
        &self,
        id: &str,
        apply: &mut dyn FnMut(&JobRecord) -> Option<JobRecord>,
    ) -> Result<JobUpdate, StorageError> {
        loop {
            let current_bytes = self
                .jobs
                .get(id.as_bytes())?
                .ok_or_else(|| StorageError::NotFound(format!("job {}", id)))?;
            let current: JobRecord = decode(&current_bytes)?;

            let mut next = match apply(&current) {
                Some(next) => next,
                None => return Ok(JobUpdate::Rejected(current)),
            };
            next.updated_at = Utc::now();
            let next_bytes = encode(&next)?;

            match self
                .jobs
                .compare_and_swap(id.as_bytes(), Some(current_bytes), Some(next_bytes))?
            {
                Ok(()) => {
                    self.jobs.flush()?;
                    return Ok(JobUpdate::Applied(next));
                }
                Err(_) => {
                    debug!(job_id = id, "Job record changed underneath update, re-reading");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use chrono::Duration;
    use serde_json::json;

    fn job_draft(use_case_id: &str) -> NewJob {
        NewJob {
            use_case_id: use_case_id.to_string(),
            guardrails_id: None,
            generation_strategy: "comprehensive".to_string(),
            test_intensity: "standard".to_string(),
            use_orchestrator: false,
            requested_by: None,
        }
    }

    #[test]
    fn test_rejected_update_leaves_record_untouched() {
        let store = SledStore::temporary().unwrap();
        let job = store.create_job(job_draft("uc-1")).unwrap();

        let outcome = store.update_job(&job.id, &mut |_| None).unwrap();
        assert!(!outcome.is_applied());
        assert_eq!(store.job(&job.id).unwrap().unwrap(), job);
    }

    #[test]
    fn test_update_missing_job_is_not_found() {
        let store = SledStore::temporary().unwrap();
        let err = store.update_job("job-missing", &mut |j| Some(j.clone()));
        assert!(matches!(err, Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_insert_evaluation_refuses_undefined() {
        let store = SledStore::temporary().unwrap();
        let draft = NewEvaluation {
            use_case_id: "uc-1".into(),
            name: "n".into(),
            description: String::new(),
            configuration: Document::object([("x", Document::Undefined)]),
        };
        assert!(matches!(
            store.insert_evaluation(draft),
            Err(StorageError::Unrepresentable(_))
        ));
        assert!(store.evaluations("uc-1").unwrap().is_empty());
    }

    #[test]
    fn test_latest_generated_skips_manual_evaluations() {
        let store = SledStore::temporary().unwrap();
        let generated = store
            .insert_evaluation(NewEvaluation {
                use_case_id: "uc-1".into(),
                name: "generated".into(),
                description: String::new(),
                configuration: Document::from(json!({ "testSuites": [] })),
            })
            .unwrap();
        store
            .put_evaluation(&EvaluationRecord {
                id: "manual".into(),
                use_case_id: "uc-1".into(),
                name: "manual".into(),
                description: String::new(),
                configuration: json!({}),
                status: "completed".into(),
                generated: false,
                summary: None,
                results: vec![],
                created_at: Utc::now() + Duration::seconds(5),
            })
            .unwrap();

        let latest = store.latest_generated_evaluation("uc-1").unwrap().unwrap();
        assert_eq!(latest.id, generated.id);
        assert_eq!(store.evaluations("uc-1").unwrap()[0].id, "manual");
    }

    #[test]
    fn test_active_job_ignores_terminal_jobs() {
        let store = SledStore::temporary().unwrap();
        let job = store.create_job(job_draft("uc-1")).unwrap();
        assert_eq!(store.active_job("uc-1").unwrap().unwrap().id, job.id);

        store
            .update_job(&job.id, &mut |j| {
                let mut next = j.clone();
                next.status = JobStatus::Failed;
                Some(next)
            })
            .unwrap();
        assert!(store.active_job("uc-1").unwrap().is_none());
        assert_eq!(store.latest_job("uc-1").unwrap().unwrap().id, job.id);
    }
}

#[cfg(test)]
pub(crate) mod fixture {
    use super::*;
    use serde_json::json;

    pub fn use_case(id: &str) -> UseCaseRecord {
        UseCaseRecord {
            id: id.to_string(),
            organization_id: Some("org-1".to_string()),
            title: "Support Assistant".to_string(),
            problem_statement: "Slow ticket triage".to_string(),
            proposed_solution: "LLM drafted replies".to_string(),
            current_state: String::new(),
            desired_state: String::new(),
            success_criteria: vec!["Faster replies".to_string()],
            key_assumptions: Vec::new(),
            primary_stakeholders: vec!["Support Agents".to_string()],
            secondary_stakeholders: Vec::new(),
            confidence_level: 0.7,
            implementation_complexity: None,
            created_at: Utc::now(),
        }
    }

    pub fn guardrail(id: &str, use_case_id: &str) -> GuardrailRecord {
        GuardrailRecord {
            id: id.to_string(),
            use_case_id: use_case_id.to_string(),
            configuration: json!({
                "guardrails": { "rules": {
                    "critical": [
                        { "id": "cs-1", "type": "content_safety", "severity": "critical",
                          "rule": "Block harmful content",
                          "implementation": { "enforcement": "block" } }
                    ],
                    "operational": [
                        { "id": "pii-1", "type": "data_protection", "severity": "high",
                          "rule": "Redact personal data" }
                    ]
                }}
            }),
            created_at: Utc::now(),
        }
    }

    /// A temporary store holding one use case with one guardrail configuration.
    pub fn seeded(use_case_id: &str) -> SledStore {
        let store = SledStore::temporary().unwrap();
        store.put_use_case(&use_case(use_case_id)).unwrap();
        store
            .put_guardrail(&guardrail(&format!("g-{}", use_case_id), use_case_id))
            .unwrap();
        store
    }
}
