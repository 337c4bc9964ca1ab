//! Pieces shared by job processing and direct generation: choosing a generator and
//! writing the sanitized artifact.

use crate::config::GuardgenConfig;
use crate::context::GenerationContext;
use crate::error::{GenerationError, ProviderError};
use crate::generation::{GenerationEngine, GenerationResult, GenerationStrategy};
use crate::orchestrator::Orchestrator;
use crate::provider::{ProviderFactory, StructuredCompleter};
use crate::sanitize::sanitize;
use crate::store::{ArtifactStore, NewEvaluation};
use chrono::Utc;
use serde_json::Value;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationMethod {
    Staged,
    Orchestrated,
}

impl GenerationMethod {
    pub fn from_flag(use_orchestrator: bool) -> Self {
        if use_orchestrator {
            GenerationMethod::Orchestrated
        } else {
            GenerationMethod::Staged
        }
    }

    /// Label stored in job and response summaries.
    pub fn as_str(self) -> &'static str {
        match self {
            GenerationMethod::Staged => "direct-llm",
            GenerationMethod::Orchestrated => "multi-agent-orchestrator",
        }
    }
}

/// Engine and orchestrator over one injected provider.
#[derive(Clone)]
pub struct Generator {
    engine: GenerationEngine,
    orchestrator: Orchestrator,
}

impl Generator {
    pub fn new(completer: StructuredCompleter) -> Self {
        Self {
            engine: GenerationEngine::new(completer.clone()),
            orchestrator: Orchestrator::new(completer),
        }
    }

    /// Build from configuration. `None` when the provider has no usable credentials.
    pub fn from_config(config: &GuardgenConfig) -> Result<Option<Self>, ProviderError> {
        let Some(client) = ProviderFactory::from_config(&config.provider)? else {
            return Ok(None);
        };
        info!(
            provider = client.provider_name(),
            model = client.model_name(),
            "Completion provider ready"
        );
        let completer = StructuredCompleter::new(client, config.provider.default_options.clone())
            .with_retry(config.generation.max_retries, config.generation.retry_backoff());
        Ok(Some(Self::new(completer)))
    }

    pub async fn generate(
        &self,
        ctx: &GenerationContext,
        strategy: &GenerationStrategy,
        method: GenerationMethod,
    ) -> Result<GenerationResult, GenerationError> {
        match method {
            GenerationMethod::Staged => self.engine.generate(ctx, strategy).await,
            GenerationMethod::Orchestrated => {
                let result = self.orchestrator.orchestrate(ctx, strategy).await?;
                Ok(self.orchestrator.create_evaluation_config(&result, ctx))
            }
        }
    }
}

/// Outcome of writing a generated artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedArtifact {
    pub evaluation_id: Option<String>,
    /// Sanitized configuration, carrying the artifact id when it was saved.
    pub configuration: Value,
    pub saved: bool,
}

/// Sanitize `result` and store it as an evaluation artifact.
///
/// A failed write is logged and reported as `saved: false`; the sanitized configuration is
/// still returned so the generated content is not lost.
pub fn save_artifact(
    store: &dyn ArtifactStore,
    result: &GenerationResult,
) -> Result<SavedArtifact, GenerationError> {
    let document = sanitize(result.to_document()?);
    let mut configuration = document.to_json()?;

    let draft = NewEvaluation {
        use_case_id: result.use_case_id.clone(),
        name: format!("AI-Generated Evaluation {}", Utc::now().format("%Y-%m-%d")),
        description: format!(
            "LLM-powered evaluation with {} test suites",
            result.test_suites.len()
        ),
        configuration: document,
    };
    match store.insert_evaluation(draft) {
        Ok(record) => {
            info!(evaluation_id = %record.id, use_case_id = %record.use_case_id, "Saved evaluation artifact");
            if let Value::Object(map) = &mut configuration {
                map.insert("id".to_string(), Value::String(record.id.clone()));
            }
            Ok(SavedArtifact {
                evaluation_id: Some(record.id),
                configuration,
                saved: true,
            })
        }
        Err(err) => {
            error!(use_case_id = %result.use_case_id, error = %err, "Failed to save evaluation artifact");
            Ok(SavedArtifact {
                evaluation_id: None,
                configuration,
                saved: false,
            })
        }
    }
}
