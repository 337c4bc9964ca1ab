//! Request-level entry points that do not go through a job record: direct generation and
//! artifact lookup.

use crate::context::{CallerIdentity, ContextAggregator};
use crate::error::GenerationError;
use crate::generation::GenerationStrategy;
use crate::pipeline::{save_artifact, GenerationMethod, Generator};
use crate::store::{ArtifactStore, EvaluationRecord};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

/// Reported when a generator does not produce its own scoring confidence.
const DEFAULT_CONFIDENCE: f64 = 0.85;

/// Input for a one-shot generation.
#[derive(Debug, Clone)]
pub struct DirectRequest {
    pub use_case_id: String,
    pub guardrails_id: Option<String>,
    pub generation_strategy: String,
    pub test_intensity: String,
    pub focus_areas: Vec<String>,
    pub use_orchestrator: bool,
}

impl DirectRequest {
    pub fn new(use_case_id: impl Into<String>) -> Self {
        Self {
            use_case_id: use_case_id.into(),
            guardrails_id: None,
            generation_strategy: "comprehensive".to_string(),
            test_intensity: "standard".to_string(),
            focus_areas: Vec::new(),
            use_orchestrator: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationSummary {
    pub total_suites: usize,
    pub total_scenarios: usize,
    /// Coverage report when the generator computed one, otherwise `"Not calculated"`.
    pub coverage: Value,
    pub confidence: f64,
    pub generation_method: String,
    pub estimated_duration: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DirectResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation_id: Option<String>,
    pub evaluation_config: Value,
    pub summary: GenerationSummary,
    pub saved: bool,
}

/// Error body for callers: stable code, HTTP-style status and message.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub code: String,
    pub status: u16,
    pub message: String,
}

impl From<&GenerationError> for ErrorResponse {
    fn from(err: &GenerationError) -> Self {
        Self {
            code: err.code().to_string(),
            status: err.status(),
            message: err.to_string(),
        }
    }
}

pub struct GenerationService {
    aggregator: Arc<ContextAggregator>,
    artifacts: Arc<dyn ArtifactStore>,
    generator: Option<Generator>,
    time_limit: Duration,
    max_tests_per_suite: Option<usize>,
}

impl GenerationService {
    pub fn new(
        aggregator: Arc<ContextAggregator>,
        artifacts: Arc<dyn ArtifactStore>,
        generator: Option<Generator>,
        time_limit: Duration,
    ) -> Self {
        Self {
            aggregator,
            artifacts,
            generator,
            time_limit,
            max_tests_per_suite: None,
        }
    }

    /// Replace the intensity's per-suite scenario cap.
    pub fn with_max_tests_per_suite(mut self, max: Option<usize>) -> Self {
        self.max_tests_per_suite = max;
        self
    }

    /// Generate, sanitize and store an evaluation in one call.
    #[instrument(skip(self, request, caller), fields(use_case_id = %request.use_case_id))]
    pub async fn generate_direct(
        &self,
        request: &DirectRequest,
        caller: &CallerIdentity,
    ) -> Result<DirectResponse, GenerationError> {
        let generator = self.generator.as_ref().ok_or_else(|| {
            GenerationError::Configuration(
                "LLM-powered evaluation generation requires a provider API key".to_string(),
            )
        })?;
        let mut strategy =
            GenerationStrategy::parse(&request.generation_strategy, &request.test_intensity)?
                .with_focus_areas(request.focus_areas.clone())
                .with_time_limit(self.time_limit);
        if let Some(max) = self.max_tests_per_suite {
            strategy = strategy.with_max_tests_per_suite(max);
        }
        strategy.validate()?;
        let method = GenerationMethod::from_flag(request.use_orchestrator);

        let ctx = self.aggregator.build_context(
            &request.use_case_id,
            request.guardrails_id.as_deref(),
            caller,
        )?;
        let result = generator.generate(&ctx, &strategy, method).await?;
        let saved = save_artifact(self.artifacts.as_ref(), &result)?;

        let confidence = Some(result.scoring_framework.confidence.overall)
            .filter(|c| *c > 0.0)
            .unwrap_or(DEFAULT_CONFIDENCE);
        let coverage = match &result.metadata.coverage {
            Some(report) => serde_json::to_value(report)
                .map_err(|e| GenerationError::Persistence(e.to_string()))?,
            None => Value::String("Not calculated".to_string()),
        };
        let summary = GenerationSummary {
            total_suites: result.test_suites.len(),
            total_scenarios: result.total_scenarios(),
            coverage,
            confidence,
            generation_method: method.as_str().to_string(),
            estimated_duration: result.metadata.estimated_duration,
        };
        info!(
            suites = summary.total_suites,
            scenarios = summary.total_scenarios,
            method = method.as_str(),
            saved = saved.saved,
            "Direct generation complete"
        );

        Ok(DirectResponse {
            evaluation_id: saved.evaluation_id,
            evaluation_config: saved.configuration,
            summary,
            saved: saved.saved,
        })
    }

    pub fn evaluation(&self, evaluation_id: &str) -> Result<EvaluationRecord, GenerationError> {
        self.artifacts
            .evaluation(evaluation_id)?
            .ok_or_else(|| GenerationError::NotFound(format!("evaluation {}", evaluation_id)))
    }

    /// Newest generated artifact for the use case.
    pub fn latest_evaluation(&self, use_case_id: &str) -> Result<EvaluationRecord, GenerationError> {
        self.artifacts
            .latest_generated_evaluation(use_case_id)?
            .ok_or_else(|| {
                GenerationError::NotFound(format!(
                    "no generated evaluation for use case {}",
                    use_case_id
                ))
            })
    }
}
