//! Turning validated provider JSON into typed scenarios and suites.
//!
//! Provider output is loosely typed. Missing strings fall back to neutral defaults and
//! non-string inputs are JSON-encoded, so every parsed scenario has the full shape.

use super::{
    format_type_name, Assertion, ExpectedOutput, Metric, Scenario, ScenarioInput, SuiteCoverage,
    TestSuite,
};
use crate::context::{GuardrailRule, Severity};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};

/// String field, JSON-encoding non-string values. Empty and null read as absent.
pub fn text(value: &Value, key: &str) -> Option<String> {
    match value.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    }
}

pub fn tags(value: &Value) -> Vec<String> {
    value
        .get("tags")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

pub fn priority(value: &Value) -> Severity {
    text(value, "priority")
        .or_else(|| text(value, "severity"))
        .map(|p| Severity::parse(&p))
        .unwrap_or(Severity::Medium)
}

/// Classify an assertion by keywords in its text.
pub fn assertion_type(assertion: &str) -> &'static str {
    let lower = assertion.to_lowercase();
    if lower.contains("block") || lower.contains("reject") {
        "content_safety"
    } else if lower.contains("latency") || lower.contains("response time") {
        "performance_threshold"
    } else if lower.contains("token") || lower.contains("cost") {
        "cost_within_budget"
    } else if lower.contains("comply") || lower.contains("gdpr") {
        "compliance_check"
    } else if lower.contains("bias") || lower.contains("fair") {
        "bias_check"
    } else {
        "general_assertion"
    }
}

fn severity_label(priority: Severity) -> &'static str {
    if priority == Severity::Critical {
        "must_pass"
    } else {
        "should_pass"
    }
}

/// Assertions given as plain strings or as `{type, condition, expected, severity, message}`.
pub fn assertions(value: &Value, priority: Severity) -> Vec<Assertion> {
    let Some(items) = value.get("assertions").and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) if !s.is_empty() => Some(Assertion {
                assertion_type: assertion_type(s).to_string(),
                condition: s.clone(),
                expected: true,
                severity: severity_label(priority).to_string(),
                message: s.clone(),
            }),
            Value::Object(_) => {
                let condition = text(item, "condition")?;
                Some(Assertion {
                    assertion_type: text(item, "type")
                        .unwrap_or_else(|| assertion_type(&condition).to_string()),
                    message: text(item, "message").unwrap_or_else(|| condition.clone()),
                    expected: item.get("expected").and_then(Value::as_bool).unwrap_or(true),
                    severity: text(item, "severity")
                        .unwrap_or_else(|| severity_label(priority).to_string()),
                    condition,
                })
            }
            _ => None,
        })
        .collect()
}

pub fn domain_metrics(domain: &str) -> Vec<Metric> {
    match domain {
        "safety" => vec![
            Metric::gauge("toxicity_score", "score"),
            Metric::counter("content_blocked"),
        ],
        "performance" => vec![
            Metric::gauge("response_latency", "ms"),
            Metric::gauge("throughput", "req/s"),
        ],
        "security" => vec![
            Metric::counter("injection_attempts_blocked"),
            Metric::gauge("security_score", "score"),
        ],
        "compliance" => vec![
            Metric::counter("compliance_violations"),
            Metric::gauge("audit_score", "score"),
        ],
        "cost" => vec![
            Metric::gauge("token_usage", "tokens"),
            Metric::gauge("api_cost", "usd"),
        ],
        _ => Vec::new(),
    }
}

fn guardrail_metrics(rule: &GuardrailRule) -> Vec<Metric> {
    let mut metrics = Vec::new();
    match rule.rule_type.as_str() {
        "content_safety" => metrics.push(Metric::counter("content_violations")),
        "performance" => metrics.push(Metric::counter("performance_violations")),
        "cost_control" => metrics.push(Metric::counter("cost_overruns")),
        _ => {}
    }
    metrics.push(Metric::counter(&format!("guardrail_{}_triggered", rule.id)));
    metrics
}

/// Suite type for a perspective scenario, from its tags or input keywords.
pub fn scenario_type(tags: &[String], input: &str) -> &'static str {
    let lower = input.to_lowercase();
    let tagged = |t: &str| tags.iter().any(|x| x.eq_ignore_ascii_case(t));
    if tagged("safety") || lower.contains("harmful") {
        "safety"
    } else if tagged("performance") || lower.contains("latency") {
        "performance"
    } else if tagged("security") || lower.contains("injection") {
        "security"
    } else if tagged("compliance") || lower.contains("gdpr") {
        "compliance"
    } else {
        "functional"
    }
}

fn metadata(entries: Vec<(&str, Value)>) -> BTreeMap<String, Value> {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

fn scenario_list(response: &Value, field: &str) -> Vec<Value> {
    response
        .get(field)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter(|i| i.is_object()).cloned().collect())
        .unwrap_or_default()
}

/// Suite priority from the mean scenario weight.
pub fn priority_from_weights(scenarios: &[Scenario]) -> Severity {
    if scenarios.is_empty() {
        return Severity::Low;
    }
    let avg = scenarios.iter().map(|s| s.weight).sum::<f64>() / scenarios.len() as f64;
    if avg >= 2.0 {
        Severity::Critical
    } else if avg >= 1.5 {
        Severity::High
    } else if avg >= 1.0 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Coverage of a suite that is not tied to particular guardrails.
pub fn basic_coverage(scenarios: &[Scenario]) -> SuiteCoverage {
    SuiteCoverage {
        guardrails_covered: scenarios.len(),
        guardrails_total: scenarios.len(),
        percentage: 100.0,
        by_type: BTreeMap::new(),
        gaps: Vec::new(),
    }
}

/// Coverage against the context's total rule count.
pub fn context_coverage(scenarios: &[Scenario], total_rules: usize) -> SuiteCoverage {
    let covered: BTreeSet<&str> = scenarios
        .iter()
        .filter_map(|s| s.guardrail_id.as_deref())
        .collect();
    SuiteCoverage {
        guardrails_covered: covered.len(),
        guardrails_total: total_rules,
        percentage: if total_rules > 0 {
            covered.len() as f64 / total_rules as f64 * 100.0
        } else {
            0.0
        },
        by_type: BTreeMap::new(),
        gaps: Vec::new(),
    }
}

/// Stage 1 output: `testScenarios` grouped into suites by inferred type.
pub fn perspective_suites(response: &Value, approach: &str, stamp: i64) -> Vec<TestSuite> {
    let mut groups: Vec<(&'static str, Vec<Scenario>)> = Vec::new();

    for (index, raw) in scenario_list(response, "testScenarios").iter().enumerate() {
        let input = text(raw, "testInput").unwrap_or_default();
        let tags = tags(raw);
        let kind = scenario_type(&tags, &input);
        let priority = priority(raw);
        let description = text(raw, "description").unwrap_or_default();
        let scenario = Scenario {
            id: format!("scenario-{}-{}-{}", approach, stamp, index),
            name: text(raw, "name").unwrap_or_else(|| format!("{} Test {}", approach, index + 1)),
            guardrail_id: Some("auto-generated".to_string()),
            inputs: vec![ScenarioInput {
                input_type: "prompt".to_string(),
                value: input,
                metadata: metadata(vec![("generated", json!(true)), ("perspective", json!(approach))]),
            }],
            expected_outputs: vec![ExpectedOutput {
                output_type: "behavior".to_string(),
                value: text(raw, "expectedBehavior")
                    .unwrap_or_else(|| "System responds appropriately".to_string()),
                explanation: Some(description.clone()).filter(|d| !d.is_empty()),
            }],
            assertions: assertions(raw, priority),
            metrics: Vec::new(),
            weight: priority.weight(),
            priority,
            tags,
            description,
            metadata: None,
        };
        match groups.iter_mut().find(|(k, _)| *k == kind) {
            Some((_, list)) => list.push(scenario),
            None => groups.push((kind, vec![scenario])),
        }
    }

    groups
        .into_iter()
        .map(|(kind, scenarios)| TestSuite {
            id: format!("suite-{}-{}-{}", approach, kind, stamp),
            name: format!("{} Test Suite", format_type_name(kind)),
            description: format!("LLM-generated {} tests ({} perspective)", kind, approach),
            suite_type: kind.to_string(),
            priority: priority_from_weights(&scenarios),
            coverage: basic_coverage(&scenarios),
            scenarios,
            metadata: None,
        })
        .collect()
}

/// Stage 2 output: `scenarios` for one domain.
pub fn domain_scenarios(response: &Value, domain: &str, stamp: i64) -> Vec<Scenario> {
    scenario_list(response, "scenarios")
        .iter()
        .enumerate()
        .map(|(index, raw)| {
            let priority = priority(raw);
            let description = text(raw, "description").unwrap_or_default();
            let mut tags = tags(raw);
            if tags.is_empty() {
                tags.push(domain.to_string());
            }
            Scenario {
                id: format!("scenario-{}-{}-{}", domain, stamp, index),
                name: text(raw, "name")
                    .unwrap_or_else(|| format!("{} Test {}", format_type_name(domain), index + 1)),
                guardrail_id: Some(
                    text(raw, "guardrailId").unwrap_or_else(|| format!("{}-guardrail", domain)),
                ),
                inputs: vec![ScenarioInput {
                    input_type: "prompt".to_string(),
                    value: text(raw, "testInput").unwrap_or_default(),
                    metadata: metadata(vec![
                        ("domain", json!(domain)),
                        ("generated", json!(true)),
                        ("generatedBy", json!("llm")),
                    ]),
                }],
                expected_outputs: vec![ExpectedOutput {
                    output_type: "behavior".to_string(),
                    value: text(raw, "expectedBehavior")
                        .unwrap_or_else(|| "System responds appropriately".to_string()),
                    explanation: Some(description.clone()).filter(|d| !d.is_empty()),
                }],
                assertions: assertions(raw, priority),
                metrics: domain_metrics(domain),
                weight: priority.weight(),
                priority,
                tags,
                description,
                metadata: None,
            }
        })
        .collect()
}

/// Stage 3 output: `scenarios` each bound to one of `rules`.
pub fn guardrail_scenarios(response: &Value, rules: &[&GuardrailRule], stamp: i64) -> Vec<Scenario> {
    let Some(first) = rules.first() else {
        return Vec::new();
    };
    scenario_list(response, "scenarios")
        .iter()
        .enumerate()
        .map(|(index, raw)| {
            let requested = text(raw, "guardrailId");
            let rule = requested
                .as_deref()
                .and_then(|id| rules.iter().find(|r| r.id == id))
                .unwrap_or(first);
            let should_pass = raw.get("shouldPass").and_then(Value::as_bool).unwrap_or(false);

            let mut checks = vec![Assertion {
                assertion_type: "guardrail_enforcement".to_string(),
                condition: format!("guardrail_{}_triggered", rule.id),
                expected: !should_pass,
                severity: severity_label(rule.severity).to_string(),
                message: format!(
                    "Guardrail \"{}\" should {} this input",
                    rule.rule,
                    if should_pass { "allow" } else { "block" }
                ),
            }];
            checks.extend(assertions(raw, rule.severity));

            Scenario {
                id: format!("scenario-guardrail-{}-{}-{}", rule.id, stamp, index),
                name: text(raw, "name").unwrap_or_else(|| format!("Guardrail Test {}", index + 1)),
                description: text(raw, "description")
                    .unwrap_or_else(|| format!("Test for {}", rule.rule)),
                guardrail_id: Some(requested.unwrap_or_else(|| rule.id.clone())),
                inputs: vec![ScenarioInput {
                    input_type: "prompt".to_string(),
                    value: text(raw, "testInput").unwrap_or_default(),
                    metadata: metadata(vec![
                        ("guardrailRule", json!(rule.rule)),
                        ("guardrailType", json!(rule.rule_type)),
                        ("generated", json!(true)),
                    ]),
                }],
                expected_outputs: vec![ExpectedOutput {
                    output_type: if should_pass { "pass" } else { "block" }.to_string(),
                    value: text(raw, "expectedBehavior").unwrap_or_default(),
                    explanation: Some(format!("Testing {}", rule.rule)),
                }],
                assertions: checks,
                metrics: guardrail_metrics(rule),
                weight: rule.severity.weight(),
                priority: rule.severity,
                tags: vec![
                    "guardrail".to_string(),
                    rule.rule_type.clone(),
                    rule.severity.as_str().to_string(),
                ],
                metadata: None,
            }
        })
        .collect()
}

/// Coverage of a guardrail suite against the rules it was generated for.
pub fn guardrail_coverage(scenarios: &[Scenario], rules: &[&GuardrailRule]) -> SuiteCoverage {
    let covered: BTreeSet<&str> = scenarios
        .iter()
        .filter_map(|s| s.guardrail_id.as_deref())
        .collect();
    let hit = rules.iter().filter(|r| covered.contains(r.id.as_str())).count();
    SuiteCoverage {
        guardrails_covered: hit,
        guardrails_total: rules.len(),
        percentage: if rules.is_empty() {
            0.0
        } else {
            hit as f64 / rules.len() as f64 * 100.0
        },
        by_type: BTreeMap::new(),
        gaps: rules
            .iter()
            .filter(|r| !covered.contains(r.id.as_str()))
            .map(|r| r.id.clone())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(id: &str, severity: Severity) -> GuardrailRule {
        GuardrailRule {
            id: id.into(),
            rule: format!("rule {}", id),
            description: String::new(),
            rule_type: "content_safety".into(),
            severity,
            enforcement: None,
        }
    }

    #[test]
    fn perspective_scenarios_group_by_inferred_type() {
        let response = json!({
            "testScenarios": [
                { "name": "a", "testInput": "Write something harmful", "tags": [] , "priority": "critical", "assertions": ["Output is blocked"] },
                { "name": "b", "testInput": "check latency", "tags": ["x"] },
                { "name": "c", "testInput": { "nested": true }, "tags": ["safety"] },
                { "name": "d", "testInput": "hello" }
            ]
        });
        let suites = perspective_suites(&response, "adversarial", 1);
        let kinds: Vec<&str> = suites.iter().map(|s| s.suite_type.as_str()).collect();
        assert_eq!(kinds, vec!["safety", "performance", "functional"]);
        assert_eq!(suites[0].scenarios.len(), 2);
        assert_eq!(suites[0].scenarios[1].input_text(), r#"{"nested":true}"#);
        assert_eq!(suites[0].scenarios[0].assertions[0].assertion_type, "content_safety");
        assert_eq!(suites[0].scenarios[0].assertions[0].severity, "must_pass");
        assert_eq!(suites[0].name, "Safety Test Suite");
    }

    #[test]
    fn guardrail_scenarios_bind_to_rules() {
        let r1 = rule("r1", Severity::Critical);
        let r2 = rule("r2", Severity::Low);
        let rules = vec![&r1, &r2];
        let response = json!({
            "scenarios": [
                { "name": "x", "guardrailId": "r2", "shouldPass": true, "testInput": "fine" },
                { "name": "y", "guardrailId": "unknown", "testInput": "bad" }
            ]
        });
        let scenarios = guardrail_scenarios(&response, &rules, 7);
        assert_eq!(scenarios[0].expected_type(), "pass");
        assert_eq!(scenarios[0].weight, 1.0);
        assert!(!scenarios[0].assertions[0].expected);
        assert_eq!(scenarios[1].expected_type(), "block");
        assert_eq!(scenarios[1].priority, Severity::Critical);
        assert_eq!(scenarios[1].guardrail_id.as_deref(), Some("unknown"));

        let coverage = guardrail_coverage(&scenarios, &rules);
        assert_eq!(coverage.guardrails_covered, 1);
        assert_eq!(coverage.gaps, vec!["r1"]);
    }

    #[test]
    fn domain_scenarios_fill_defaults() {
        let response = json!({ "scenarios": [ {}, "not an object" ] });
        let scenarios = domain_scenarios(&response, "cost", 3);
        assert_eq!(scenarios.len(), 1);
        assert_eq!(scenarios[0].name, "Cost Test 1");
        assert_eq!(scenarios[0].guardrail_id.as_deref(), Some("cost-guardrail"));
        assert_eq!(scenarios[0].tags, vec!["cost"]);
        assert!(scenarios[0].expected_outputs[0].explanation.is_none());
        assert_eq!(scenarios[0].metrics.len(), 2);
    }

    #[test]
    fn weights_set_suite_priority() {
        let response = json!({ "scenarios": [ { "priority": "critical" }, { "priority": "high" } ] });
        let scenarios = domain_scenarios(&response, "safety", 0);
        assert_eq!(priority_from_weights(&scenarios), Severity::High);
        assert_eq!(priority_from_weights(&[]), Severity::Low);
    }
}
