//! Staged generation: perspectives, domains and guardrails, then synthesis.
//!
//! Every stage prompt is planned up front and issued concurrently. A stage that fails is
//! logged and skipped; the run fails only when no stage produced anything, or when the
//! provider rejects our credentials.

use super::{
    format_type_name, parse, plan, priority_rank, prompts, GenerationResult, GenerationStrategy,
    ResultMetadata, StrategyType, TestSuite,
};
use crate::context::{GenerationContext, GuardrailRule, Severity};
use crate::error::{GenerationError, ProviderError};
use crate::provider::StructuredCompleter;
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;
use std::collections::HashSet;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Rules sent in one guardrail prompt.
const RULES_PER_PROMPT: usize = 5;
/// Requests per day above which load is worth testing.
const HIGH_TRAFFIC: u64 = 1000;
/// Scenario fingerprints compare this many leading input characters.
const FINGERPRINT_INPUT_CHARS: usize = 50;

/// One provider call of a run.
#[derive(Debug, Clone, PartialEq)]
enum Stage<'c> {
    Perspective(&'static str),
    Domain(&'static str),
    Guardrail {
        rule_type: &'c str,
        chunk: usize,
        rules: Vec<&'c GuardrailRule>,
    },
}

impl Stage<'_> {
    fn label(&self) -> String {
        match self {
            Stage::Perspective(p) => format!("perspective-{}", p),
            Stage::Domain(d) => format!("domain-{}", d),
            Stage::Guardrail {
                rule_type, chunk, ..
            } => format!("guardrail-{}-{}", rule_type, chunk),
        }
    }

    fn list_field(&self) -> &'static str {
        match self {
            Stage::Perspective(_) => "testScenarios",
            Stage::Domain(_) | Stage::Guardrail { .. } => "scenarios",
        }
    }
}

/// Testing philosophies applied to the whole use case.
fn perspectives(ctx: &GenerationContext, strategy: &GenerationStrategy) -> Vec<&'static str> {
    let mut out = Vec::new();
    if matches!(
        strategy.strategy_type,
        StrategyType::Comprehensive | StrategyType::Targeted
    ) {
        out.push("adversarial");
    }
    if !ctx.compliance.frameworks.is_empty() {
        out.push("compliance");
    }
    out.push("user-centric");
    if ctx.performance.expected_requests_per_day > HIGH_TRAFFIC {
        out.push("performance");
    }
    out
}

/// Test domains warranted by the context, filtered by the strategy's focus areas.
fn domains(ctx: &GenerationContext, strategy: &GenerationStrategy) -> Vec<&'static str> {
    let mut out = vec!["safety"];
    if ctx.performance.expected_requests_per_day > HIGH_TRAFFIC
        || ctx.performance.concurrent_users > 50
    {
        out.push("performance");
    }
    if ctx.use_case.is_public_facing() || ctx.guardrails.count_of("agent_behavior") > 0 {
        out.push("security");
    }
    if !ctx.compliance.frameworks.is_empty() {
        out.push("compliance");
    }
    if ctx.organizational.testing_budget.is_some() {
        out.push("cost");
    }
    out.retain(|d| strategy.includes_focus(d));
    out
}

/// Scenarios requested from one domain prompt.
fn domain_test_count(domain: &str, strategy: &GenerationStrategy) -> usize {
    let multiplier = match domain {
        "safety" | "security" => 1.5,
        "compliance" => 1.2,
        "cost" => 0.8,
        _ => 1.0,
    };
    (strategy.intensity.domain_base_count() * multiplier).ceil() as usize
}

fn domain_priority(ctx: &GenerationContext, domain: &str) -> Severity {
    match domain {
        "safety" if ctx.risks.critical_count > 0 => Severity::Critical,
        "security" if ctx.use_case.is_mission_critical() => Severity::Critical,
        "compliance" if ctx.compliance.frameworks.len() > 2 => Severity::High,
        "performance" if ctx.performance.concurrent_users > 1000 => Severity::High,
        _ => Severity::Medium,
    }
}

fn plan_stages<'c>(ctx: &'c GenerationContext, strategy: &GenerationStrategy) -> Vec<Stage<'c>> {
    let mut stages: Vec<Stage<'c>> = perspectives(ctx, strategy)
        .into_iter()
        .map(Stage::Perspective)
        .collect();
    stages.extend(domains(ctx, strategy).into_iter().map(Stage::Domain));
    for (rule_type, rules) in ctx.guardrails.rules_grouped() {
        for (chunk, group) in rules.chunks(RULES_PER_PROMPT).enumerate() {
            stages.push(Stage::Guardrail {
                rule_type,
                chunk,
                rules: group.to_vec(),
            });
        }
    }
    stages
}

/// Fingerprint for cross-suite duplicate detection: name plus the head of the input.
fn fingerprint(scenario: &super::Scenario) -> String {
    let head: String = scenario
        .input_text()
        .chars()
        .take(FINGERPRINT_INPUT_CHARS)
        .collect();
    format!("{}-{}", scenario.name, head)
}

/// Merge stage output: drop repeats across suites, cap each suite, drop empty suites and
/// order by priority. The sort is stable so equal priorities keep stage order.
pub fn synthesize(suites: Vec<TestSuite>, max_per_suite: usize) -> Vec<TestSuite> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(suites.len());
    for mut suite in suites {
        let mut kept = Vec::new();
        for scenario in std::mem::take(&mut suite.scenarios) {
            if kept.len() >= max_per_suite {
                break;
            }
            if seen.insert(fingerprint(&scenario)) {
                kept.push(scenario);
            }
        }
        if kept.is_empty() {
            debug!(suite = %suite.name, "Dropping empty suite");
            continue;
        }
        suite.scenarios = kept;
        out.push(suite);
    }
    out.sort_by_key(|s| priority_rank(s.priority));
    out
}

/// Staged single-model generator.
#[derive(Clone)]
pub struct GenerationEngine {
    completer: StructuredCompleter,
}

impl GenerationEngine {
    pub fn new(completer: StructuredCompleter) -> Self {
        Self { completer }
    }

    /// Produce an evaluation configuration for `ctx` within `strategy.time_limit`.
    #[instrument(skip_all, fields(use_case = %ctx.use_case.id, strategy = strategy.strategy_type.as_str()))]
    pub async fn generate(
        &self,
        ctx: &GenerationContext,
        strategy: &GenerationStrategy,
    ) -> Result<GenerationResult, GenerationError> {
        strategy.validate()?;
        let started = Instant::now();
        let deadline = started + strategy.time_limit;
        let timed_out = || GenerationError::Timeout {
            elapsed: started.elapsed(),
            limit: strategy.time_limit,
        };

        match tokio::time::timeout_at(deadline, self.run(ctx, strategy, deadline)).await {
            Ok(Ok(result)) => Ok(result),
            // provider calls cut off by the shared deadline surface as a run timeout
            Ok(Err(_)) if Instant::now() >= deadline => Err(timed_out()),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(timed_out()),
        }
    }

    async fn run(
        &self,
        ctx: &GenerationContext,
        strategy: &GenerationStrategy,
        deadline: Instant,
    ) -> Result<GenerationResult, GenerationError> {
        let stages = plan_stages(ctx, strategy);
        info!(
            stages = stages.len(),
            intensity = strategy.intensity.as_str(),
            "Starting staged generation"
        );

        let mut calls = FuturesUnordered::new();
        for (index, stage) in stages.iter().enumerate() {
            let (purpose, prompt) = match stage {
                Stage::Perspective(approach) => (
                    approach.to_string(),
                    prompts::perspective_prompt(ctx, approach, strategy.max_tests_per_suite),
                ),
                Stage::Domain(domain) => (
                    format!("domain-{}", domain),
                    prompts::domain_prompt(ctx, domain, domain_test_count(domain, strategy)),
                ),
                Stage::Guardrail {
                    rule_type, rules, ..
                } => (
                    format!("guardrail-{}", rule_type),
                    prompts::guardrail_prompt(ctx, rule_type, rules),
                ),
            };
            let system = prompts::system_prompt(&purpose);
            let field = stage.list_field();
            calls.push(async move {
                let outcome = self
                    .completer
                    .complete_json(&system, &prompt, field, deadline)
                    .await;
                (index, outcome)
            });
        }

        let mut responses: Vec<Option<Value>> = vec![None; stages.len()];
        let mut last_error = None;
        while let Some((index, outcome)) = calls.next().await {
            match outcome {
                Ok(value) => responses[index] = Some(value),
                Err(ProviderError::AuthFailed(msg)) => {
                    return Err(GenerationError::Upstream(ProviderError::AuthFailed(msg)));
                }
                Err(err) => {
                    warn!(stage = %stages[index].label(), error = %err, "Generation stage failed, skipping");
                    last_error = Some(err);
                }
            }
        }
        drop(calls);

        if responses.iter().all(Option::is_none) {
            return Err(GenerationError::Upstream(last_error.unwrap_or_else(|| {
                ProviderError::Other("no generation stage was planned".to_string())
            })));
        }

        let stamp = Utc::now().timestamp_millis();
        let mut perspective_suites = Vec::new();
        let mut domain_suites = Vec::new();
        let mut guardrail_suites = Vec::new();
        for (stage, response) in stages.iter().zip(responses) {
            let Some(response) = response else { continue };
            match stage {
                Stage::Perspective(approach) => {
                    perspective_suites.extend(parse::perspective_suites(&response, approach, stamp))
                }
                Stage::Domain(domain) => {
                    let scenarios = parse::domain_scenarios(&response, domain, stamp);
                    if scenarios.is_empty() {
                        continue;
                    }
                    domain_suites.push(TestSuite {
                        id: format!("suite-{}-{}", domain, stamp),
                        name: format!("{} Test Suite", format_type_name(domain)),
                        description: format!("LLM-generated {} tests", domain),
                        suite_type: domain.to_string(),
                        priority: domain_priority(ctx, domain),
                        coverage: parse::context_coverage(&scenarios, ctx.total_guardrail_rules()),
                        scenarios,
                        metadata: None,
                    });
                }
                Stage::Guardrail {
                    rule_type,
                    chunk,
                    rules,
                } => {
                    let scenarios = parse::guardrail_scenarios(&response, rules, stamp);
                    if scenarios.is_empty() {
                        continue;
                    }
                    guardrail_suites.push(TestSuite {
                        id: format!("suite-guardrail-{}-{}-{}", rule_type, chunk, stamp),
                        name: format!("{} Guardrail Tests", format_type_name(rule_type)),
                        description: format!("Tests for {} guardrails", rule_type),
                        suite_type: rule_type.to_string(),
                        priority: rules
                            .iter()
                            .map(|r| r.severity)
                            .min()
                            .unwrap_or(Severity::Medium),
                        coverage: parse::guardrail_coverage(&scenarios, rules),
                        scenarios,
                        metadata: None,
                    });
                }
            }
        }

        let mut suites = perspective_suites;
        suites.extend(domain_suites);
        suites.extend(guardrail_suites);
        let test_suites = synthesize(suites, strategy.max_tests_per_suite);
        let result = self.assemble(ctx, strategy, test_suites);
        info!(
            suites = result.test_suites.len(),
            scenarios = result.metadata.total_scenarios,
            "Staged generation complete"
        );
        Ok(result)
    }

    fn assemble(
        &self,
        ctx: &GenerationContext,
        strategy: &GenerationStrategy,
        test_suites: Vec<TestSuite>,
    ) -> GenerationResult {
        let now = Utc::now();
        let total: usize = test_suites.iter().map(|s| s.scenarios.len()).sum();
        let model = self.completer.model_name().to_string();
        GenerationResult {
            id: format!("eval-{}-{}", ctx.use_case.id, now.timestamp_millis()),
            use_case_id: ctx.use_case.id.clone(),
            version: "2.0.0".to_string(),
            created_at: now,
            updated_at: now,
            evaluation_criteria: plan::engine_criteria(ctx),
            execution_strategy: plan::engine_execution(ctx, strategy),
            scoring_framework: plan::engine_scoring(),
            metadata: ResultMetadata {
                generated_by: vec![
                    "llm-engine".to_string(),
                    format!("{}/{}", self.completer.provider_name(), model),
                ],
                strategy: Some(strategy.strategy_type.as_str().to_string()),
                intensity: Some(strategy.intensity.as_str().to_string()),
                context_complexity: Some(ctx.complexity()),
                total_scenarios: total,
                estimated_duration: plan::estimated_duration(total),
                llm_model: Some(model),
                generation_cost: Some(plan::generation_cost(total)),
                ..Default::default()
            },
            test_suites,
        }
    }
}
