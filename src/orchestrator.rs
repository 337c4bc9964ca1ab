//! Multi-pass generation: several specialist agents over one shared context.
//!
//! Passes run concurrently and never see each other's output. A failing pass is reported
//! with zero scenarios; the run only fails when every pass fails.

pub mod agents;
pub mod synthesis;

pub use agents::{select_agents, AgentProposal, SpecialistAgent, TestAgent};

use crate::context::GenerationContext;
use crate::error::{GenerationError, ProviderError};
use crate::generation::{
    plan, GenerationResult, GenerationStrategy, ResultMetadata, TestSuite,
};
use crate::provider::StructuredCompleter;
use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, instrument, warn};

/// Specialist pass kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Safety,
    Security,
    Compliance,
    Ethics,
    Performance,
    Robustness,
    Cost,
    Drift,
}

impl AgentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentKind::Safety => "safety",
            AgentKind::Security => "security",
            AgentKind::Compliance => "compliance",
            AgentKind::Ethics => "ethics",
            AgentKind::Performance => "performance",
            AgentKind::Robustness => "robustness",
            AgentKind::Cost => "cost",
            AgentKind::Drift => "drift",
        }
    }

    /// Precedence when passes propose the same scenario. Higher wins.
    pub fn priority(self) -> u8 {
        match self {
            AgentKind::Safety => 10,
            AgentKind::Security => 9,
            AgentKind::Compliance => 8,
            AgentKind::Ethics => 7,
            AgentKind::Performance => 6,
            AgentKind::Robustness => 5,
            AgentKind::Cost => 4,
            AgentKind::Drift => 3,
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Completed,
    Failed,
}

/// Outcome of one pass, as reported in result metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentReport {
    pub agent: AgentKind,
    pub status: AgentStatus,
    pub suites: usize,
    pub scenarios: usize,
    pub confidence: f64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageReport {
    /// Percentage of guardrail rules with at least one scenario.
    pub overall: f64,
    pub by_domain: BTreeMap<String, usize>,
    pub gaps: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictKind {
    Duplicate,
    Contradiction,
    Resource,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub kind: ConflictKind,
    pub severity: crate::context::Severity,
    pub affected: Vec<String>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationMetadata {
    pub agents: Vec<AgentReport>,
    pub duration_ms: u64,
}

/// Merged output of all passes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationResult {
    pub test_suites: Vec<TestSuite>,
    pub total_scenarios: usize,
    pub coverage: CoverageReport,
    pub conflicts: Vec<Conflict>,
    pub resolutions: Vec<String>,
    pub confidence: f64,
    pub metadata: OrchestrationMetadata,
}

impl OrchestrationResult {
    fn has_resource_conflict(&self) -> bool {
        self.conflicts
            .iter()
            .any(|c| c.kind == ConflictKind::Resource)
    }
}

/// Runs the selected specialist passes and merges their proposals.
#[derive(Clone)]
pub struct Orchestrator {
    completer: StructuredCompleter,
}

impl Orchestrator {
    pub fn new(completer: StructuredCompleter) -> Self {
        Self { completer }
    }

    /// Run every pass warranted by `ctx`.
    pub async fn orchestrate(
        &self,
        ctx: &GenerationContext,
        strategy: &GenerationStrategy,
    ) -> Result<OrchestrationResult, GenerationError> {
        let agents: Vec<Arc<dyn TestAgent>> = select_agents(ctx)
            .into_iter()
            .map(|kind| Arc::new(SpecialistAgent::for_kind(kind, ctx)) as Arc<dyn TestAgent>)
            .collect();
        self.orchestrate_with(ctx, strategy, agents).await
    }

    /// Run the given passes. Exposed for callers supplying their own agents.
    #[instrument(skip_all, fields(use_case = %ctx.use_case.id, agents = agents.len()))]
    pub async fn orchestrate_with(
        &self,
        ctx: &GenerationContext,
        strategy: &GenerationStrategy,
        agents: Vec<Arc<dyn TestAgent>>,
    ) -> Result<OrchestrationResult, GenerationError> {
        strategy.validate()?;
        let started = Instant::now();
        let deadline = started + strategy.time_limit;
        let passes = agents.len();

        let run = async {
            let calls = agents.iter().map(|agent| {
                let kind = agent.kind();
                async move {
                    let outcome = agent
                        .propose(ctx, &self.completer, strategy.max_tests_per_suite, deadline)
                        .await;
                    (kind, outcome)
                }
            });
            join_all(calls).await
        };
        let outcomes = tokio::time::timeout_at(deadline, run)
            .await
            .map_err(|_| GenerationError::Timeout {
                elapsed: started.elapsed(),
                limit: strategy.time_limit,
            })?;

        let mut reports = Vec::with_capacity(passes);
        let mut proposals = Vec::new();
        let mut last_error: Option<ProviderError> = None;
        for (kind, outcome) in outcomes {
            match outcome {
                Ok(proposal) => {
                    info!(agent = %kind, suites = proposal.suites.len(), "Agent pass completed");
                    reports.push(AgentReport {
                        agent: kind,
                        status: AgentStatus::Completed,
                        suites: proposal.suites.len(),
                        scenarios: proposal.scenario_count(),
                        confidence: proposal.confidence,
                        error: None,
                    });
                    proposals.push(proposal);
                }
                Err(err) => {
                    warn!(agent = %kind, error = %err, "Agent pass failed");
                    reports.push(AgentReport {
                        agent: kind,
                        status: AgentStatus::Failed,
                        suites: 0,
                        scenarios: 0,
                        confidence: 0.0,
                        error: Some(err.to_string()),
                    });
                    last_error = Some(err);
                }
            }
        }

        if proposals.is_empty() {
            if Instant::now() >= deadline {
                return Err(GenerationError::Timeout {
                    elapsed: started.elapsed(),
                    limit: strategy.time_limit,
                });
            }
            // a rejected key is a configuration problem, not an agent failure
            if let Some(err @ ProviderError::AuthFailed(_)) = last_error {
                return Err(GenerationError::Upstream(err));
            }
            return Err(GenerationError::AllAgentsFailed(passes));
        }

        let conflicts = synthesis::detect_conflicts(&proposals);
        let resolutions = synthesis::resolutions(&conflicts);
        let confidence = synthesis::overall_confidence(&proposals);
        let merged = synthesis::merge(proposals, strategy.max_tests_per_suite);
        let coverage = synthesis::coverage(&merged, ctx);
        let test_suites = synthesis::order(merged);
        let total_scenarios = test_suites.iter().map(|s| s.scenarios.len()).sum();

        info!(
            suites = test_suites.len(),
            scenarios = total_scenarios,
            conflicts = conflicts.len(),
            "Orchestration complete"
        );
        Ok(OrchestrationResult {
            test_suites,
            total_scenarios,
            coverage,
            conflicts,
            resolutions,
            confidence,
            metadata: OrchestrationMetadata {
                agents: reports,
                duration_ms: started.elapsed().as_millis() as u64,
            },
        })
    }

    /// Adapt an orchestration result to the shape the staged engine produces.
    pub fn create_evaluation_config(
        &self,
        result: &OrchestrationResult,
        ctx: &GenerationContext,
    ) -> GenerationResult {
        let now = Utc::now();
        let succeeded = result
            .metadata
            .agents
            .iter()
            .filter(|a| a.status == AgentStatus::Completed)
            .count();
        GenerationResult {
            id: format!("eval-{}-{}", ctx.use_case.id, now.timestamp_millis()),
            use_case_id: ctx.use_case.id.clone(),
            version: "2.0.0".to_string(),
            created_at: now,
            updated_at: now,
            test_suites: result.test_suites.clone(),
            evaluation_criteria: plan::orchestrated_criteria(),
            execution_strategy: plan::orchestrated_execution(result.has_resource_conflict()),
            scoring_framework: plan::orchestrated_scoring(result.confidence, succeeded),
            metadata: ResultMetadata {
                generated_by: vec![
                    "orchestrator".to_string(),
                    format!(
                        "{}/{}",
                        self.completer.provider_name(),
                        self.completer.model_name()
                    ),
                ],
                total_scenarios: result.total_scenarios,
                estimated_duration: plan::estimated_duration(result.total_scenarios),
                llm_model: Some(self.completer.model_name().to_string()),
                orchestrated: Some(true),
                coverage: Some(result.coverage.clone()),
                confidence: Some(result.confidence),
                agents: Some(result.metadata.agents.clone()),
                conflicts: Some(result.conflicts.len()),
                resolutions: Some(result.resolutions.len()),
                ..Default::default()
            },
        }
    }
}
