//! Multi-agent orchestration over an aggregated context.

use crate::integration::support::{scenarios_for, seeded_store, ScriptedProvider};
use guardgen::context::{CallerIdentity, ContextAggregator, GenerationContext};
use guardgen::error::{GenerationError, ProviderError};
use guardgen::generation::{GenerationStrategy, Intensity, StrategyType};
use guardgen::orchestrator::{select_agents, AgentKind, AgentStatus, Orchestrator};
use guardgen::provider::{CompletionOptions, StructuredCompleter};
use std::sync::Arc;
use std::time::Duration;

fn context() -> Arc<GenerationContext> {
    let store = seeded_store("uc-claims");
    ContextAggregator::new(store)
        .build_context("uc-claims", None, &CallerIdentity::local())
        .unwrap()
}

fn orchestrator(provider: ScriptedProvider) -> Orchestrator {
    Orchestrator::new(
        StructuredCompleter::new(Arc::new(provider), CompletionOptions::default())
            .with_retry(1, Duration::from_millis(10)),
    )
}

fn strategy() -> GenerationStrategy {
    GenerationStrategy::new(StrategyType::Comprehensive, Intensity::Light)
}

#[test]
fn context_selects_the_warranted_passes() {
    let ctx = context();
    let kinds = select_agents(&ctx);
    assert_eq!(kinds[0], AgentKind::Safety);
    assert_eq!(kinds[1], AgentKind::Robustness);
    // GDPR data protection, an ethical risk and an agent_behavior rule
    assert!(kinds.contains(&AgentKind::Compliance));
    assert!(kinds.contains(&AgentKind::Ethics));
    assert!(kinds.contains(&AgentKind::Security));
    assert!(!kinds.contains(&AgentKind::Drift));
}

#[tokio::test]
async fn a_failed_pass_is_reported_and_the_rest_merged() {
    let ctx = context();
    let orchestrator = orchestrator(ScriptedProvider::new(|prompt| {
        if prompt.contains("Robustness Tests") {
            Err(ProviderError::RequestFailed("upstream 500".to_string()))
        } else {
            Ok(scenarios_for(prompt, 3))
        }
    }));

    let result = orchestrator.orchestrate(&ctx, &strategy()).await.unwrap();
    let agents = &result.metadata.agents;
    assert_eq!(agents.len(), select_agents(&ctx).len());

    let robustness = agents
        .iter()
        .find(|a| a.agent == AgentKind::Robustness)
        .unwrap();
    assert_eq!(robustness.status, AgentStatus::Failed);
    assert_eq!(robustness.scenarios, 0);
    assert!(robustness.error.is_some());

    assert!(agents
        .iter()
        .filter(|a| a.agent != AgentKind::Robustness)
        .all(|a| a.status == AgentStatus::Completed));
    assert!(!result.test_suites.iter().any(|s| s.suite_type == "robustness"));

    let counted: usize = result.test_suites.iter().map(|s| s.scenarios.len()).sum();
    assert_eq!(counted, result.total_scenarios);
    for suite in &result.test_suites {
        assert!(suite.scenarios.len() <= strategy().max_tests_per_suite);
    }
    assert!(result.coverage.overall <= 100.0);
}

#[tokio::test]
async fn every_pass_failing_is_an_error() {
    let ctx = context();
    let orchestrator = orchestrator(ScriptedProvider::new(|_| {
        Err(ProviderError::RequestFailed("upstream 502".to_string()))
    }));

    let err = orchestrator
        .orchestrate(&ctx, &strategy())
        .await
        .unwrap_err();
    match err {
        GenerationError::AllAgentsFailed(passes) => {
            assert_eq!(passes, select_agents(&ctx).len())
        }
        other => panic!("expected AllAgentsFailed, got {:?}", other),
    }
}

#[tokio::test]
async fn evaluation_config_carries_agent_reports() {
    let ctx = context();
    let orchestrator = orchestrator(ScriptedProvider::answering());
    let result = orchestrator.orchestrate(&ctx, &strategy()).await.unwrap();
    let config = orchestrator.create_evaluation_config(&result, &ctx);

    assert_eq!(config.use_case_id, "uc-claims");
    assert_eq!(config.total_scenarios(), result.total_scenarios);
    assert_eq!(config.metadata.total_scenarios, result.total_scenarios);
    assert!(config.metadata.coverage.is_some());
    assert!(config.scoring_framework.confidence.overall > 0.0);
}
