//! Merging agent proposals: conflict detection, de-duplication, coverage and ordering.

use super::{AgentProposal, Conflict, ConflictKind, CoverageReport};
use crate::context::{GenerationContext, Severity};
use crate::generation::{priority_rank, Scenario, SuiteMetadata, TestSuite};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use unicode_normalization::UnicodeNormalization;

/// Leading input characters compared for duplicates and for contradictions.
const FINGERPRINT_CHARS: usize = 100;
const CONTRADICTION_CHARS: usize = 50;
const TARGET_COVERAGE: f64 = 80.0;

/// NFKC-normalised, lower-cased, whitespace-collapsed head of a scenario's input.
fn normalized_input(scenario: &Scenario, chars: usize) -> String {
    let folded: String = scenario.input_text().nfkc().collect::<String>().to_lowercase();
    folded
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(chars)
        .collect()
}

pub fn fingerprint(scenario: &Scenario) -> String {
    format!(
        "{}|{}|{}",
        normalized_input(scenario, FINGERPRINT_CHARS),
        scenario.expected_type(),
        scenario.guardrail_id.as_deref().unwrap_or("")
    )
}

fn scenarios_of(proposal: &AgentProposal) -> impl Iterator<Item = (&TestSuite, &Scenario)> {
    proposal
        .suites
        .iter()
        .flat_map(|suite| suite.scenarios.iter().map(move |s| (suite, s)))
}

/// Inputs that some pass expects to pass and another expects to be blocked.
fn contradicted_inputs(proposals: &[AgentProposal]) -> BTreeSet<String> {
    let mut expectations: BTreeMap<String, BTreeSet<&str>> = BTreeMap::new();
    for proposal in proposals {
        for (_, scenario) in scenarios_of(proposal) {
            expectations
                .entry(normalized_input(scenario, CONTRADICTION_CHARS))
                .or_default()
                .insert(scenario.expected_type());
        }
    }
    expectations
        .into_iter()
        .filter(|(_, types)| types.contains("pass") && types.contains("block"))
        .map(|(input, _)| input)
        .collect()
}

pub fn detect_conflicts(proposals: &[AgentProposal]) -> Vec<Conflict> {
    let mut conflicts = Vec::new();

    let mut owners: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for proposal in proposals {
        for (_, scenario) in scenarios_of(proposal) {
            owners
                .entry(fingerprint(scenario))
                .or_default()
                .push(proposal.agent.to_string());
        }
    }
    for agents in owners.into_values().filter(|a| a.len() > 1) {
        conflicts.push(Conflict {
            kind: ConflictKind::Duplicate,
            severity: Severity::Low,
            description: format!(
                "Duplicate test scenario detected across {} agents",
                agents.join(", ")
            ),
            affected: agents,
        });
    }

    for input in contradicted_inputs(proposals) {
        conflicts.push(Conflict {
            kind: ConflictKind::Contradiction,
            severity: Severity::High,
            affected: vec![input],
            description: "Contradictory expectations for similar input: some expect pass, others expect block"
                .to_string(),
        });
    }

    let mut high_load = Vec::new();
    let mut exclusive = Vec::new();
    for proposal in proposals {
        match proposal.agent {
            super::AgentKind::Performance => high_load.extend(
                proposal
                    .suites
                    .iter()
                    .filter(|s| s.suite_type == "performance")
                    .map(|s| format!("{}-{}", proposal.agent, s.id)),
            ),
            super::AgentKind::Security => exclusive.extend(
                proposal
                    .suites
                    .iter()
                    .filter(|s| s.scenarios.iter().any(|sc| sc.has_tag("destructive")))
                    .map(|s| format!("{}-{}", proposal.agent, s.id)),
            ),
            _ => {}
        }
    }
    if high_load.len() > 1 {
        conflicts.push(Conflict {
            kind: ConflictKind::Resource,
            severity: Severity::Medium,
            affected: high_load,
            description: "Multiple high-load performance tests should not run in parallel"
                .to_string(),
        });
    }
    if !exclusive.is_empty() {
        conflicts.push(Conflict {
            kind: ConflictKind::Resource,
            severity: Severity::High,
            affected: exclusive,
            description: "Destructive security tests require exclusive execution".to_string(),
        });
    }

    conflicts
}

/// One resolution line per conflict.
pub fn resolutions(conflicts: &[Conflict]) -> Vec<String> {
    conflicts
        .iter()
        .map(|c| match c.kind {
            ConflictKind::Duplicate => {
                "Resolved duplicate: Keep test from highest priority agent, discard others"
            }
            ConflictKind::Contradiction => {
                "Resolved contradiction: Use more conservative expectation (prefer block over pass)"
            }
            ConflictKind::Resource => {
                "Resolved resource conflict: Schedule resource-intensive tests sequentially"
            }
        })
        .map(str::to_string)
        .collect()
}

/// Mean pass confidence plus a small bonus per pass, capped at 0.95.
pub fn overall_confidence(proposals: &[AgentProposal]) -> f64 {
    if proposals.is_empty() {
        return 0.0;
    }
    let n = proposals.len() as f64;
    let mean = proposals.iter().map(|p| p.confidence).sum::<f64>() / n;
    (mean + (n * 0.02).min(0.1)).min(0.95)
}

fn enrich(mut scenario: Scenario, agent: &str) -> Scenario {
    let metadata = scenario.metadata.get_or_insert_with(BTreeMap::new);
    metadata.insert("generatedBy".to_string(), json!(agent));
    metadata.insert("enriched".to_string(), json!(true));
    if !scenario.has_tag(agent) {
        scenario.tags.push(agent.to_string());
    }
    scenario
}

/// Merge proposals highest-priority agent first. Repeats keep the first copy, `pass`
/// expectations on contradicted inputs are dropped, and each suite is capped.
pub fn merge(mut proposals: Vec<AgentProposal>, max_per_suite: usize) -> Vec<TestSuite> {
    let contradicted = contradicted_inputs(&proposals);
    proposals.sort_by(|a, b| b.agent.priority().cmp(&a.agent.priority()));

    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for proposal in proposals {
        let agent = proposal.agent.to_string();
        for mut suite in proposal.suites {
            let mut kept = Vec::new();
            for scenario in std::mem::take(&mut suite.scenarios) {
                if kept.len() >= max_per_suite {
                    break;
                }
                if scenario.expected_type() == "pass"
                    && contradicted.contains(&normalized_input(&scenario, CONTRADICTION_CHARS))
                {
                    continue;
                }
                if seen.insert(fingerprint(&scenario)) {
                    kept.push(enrich(scenario, &agent));
                }
            }
            if kept.is_empty() {
                continue;
            }
            suite.scenarios = kept;
            suite.metadata = Some(SuiteMetadata {
                generated_by: agent.clone(),
                synthesized: true,
            });
            merged.push(suite);
        }
    }
    merged
}

pub fn coverage(suites: &[TestSuite], ctx: &GenerationContext) -> CoverageReport {
    let rule_ids: BTreeSet<&str> = ctx.guardrails.rules.iter().map(|r| r.id.as_str()).collect();
    let mut covered = BTreeSet::new();
    let mut by_domain: BTreeMap<String, usize> = BTreeMap::new();
    for suite in suites {
        // agent-default ids such as "safety-guardrail" name no rule
        covered.extend(
            suite
                .scenarios
                .iter()
                .filter_map(|s| s.guardrail_id.as_deref())
                .filter(|id| rule_ids.contains(id)),
        );
        *by_domain.entry(suite.suite_type.clone()).or_default() += suite.scenarios.len();
    }

    let total = ctx.guardrails.total_rules;
    let overall = if total > 0 {
        covered.len() as f64 / total as f64 * 100.0
    } else {
        0.0
    };

    let mut gaps = Vec::new();
    if overall < TARGET_COVERAGE {
        gaps.push(format!("Low overall coverage: {:.1}%", overall));
    }
    let critical = ctx.guardrails.critical_rules;
    if critical > 0 {
        let critical_ids: BTreeSet<&str> = ctx
            .guardrails
            .rules
            .iter()
            .filter(|r| r.severity == Severity::Critical)
            .map(|r| r.id.as_str())
            .collect();
        let hit = covered.iter().filter(|id| critical_ids.contains(*id)).count();
        if hit < critical {
            gaps.push(format!("Missing {} critical guardrail tests", critical - hit));
        }
    }
    for domain in ["safety", "performance", "security"] {
        if !by_domain.contains_key(domain) {
            gaps.push(format!("No tests for {} domain", domain));
        }
    }

    CoverageReport {
        overall,
        by_domain,
        gaps,
    }
}

fn domain_rank(suite_type: &str) -> u8 {
    match suite_type {
        "safety" => 0,
        "security" => 1,
        "compliance" => 2,
        "performance" => 3,
        "ethics" => 4,
        "cost" => 5,
        "drift" => 6,
        "robustness" => 7,
        _ => 99,
    }
}

/// Execution order: priority, then domain, then smaller suites first.
pub fn order(mut suites: Vec<TestSuite>) -> Vec<TestSuite> {
    suites.sort_by_key(|s| {
        (
            priority_rank(s.priority),
            domain_rank(&s.suite_type),
            s.scenarios.len(),
        )
    });
    suites
}
