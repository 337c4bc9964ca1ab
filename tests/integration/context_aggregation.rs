//! Building generation contexts from imported use case bundles.

use crate::integration::support::{bundle, guardrails, seeded_store, use_case};
use guardgen::context::{CallerIdentity, ContextAggregator, RiskCategory, RiskLevel, Severity};
use guardgen::error::GenerationError;
use guardgen::store::SledStore;
use serde_json::json;
use std::sync::Arc;

fn caller() -> CallerIdentity {
    CallerIdentity::new("u-42", "Risk Officer", "reviewer")
}

#[test]
fn imported_bundle_feeds_every_context_section() {
    let store = seeded_store("uc-claims");
    let aggregator = ContextAggregator::new(store);
    let ctx = aggregator.build_context("uc-claims", None, &caller()).unwrap();

    assert_eq!(ctx.use_case.id, "uc-claims");
    assert_eq!(ctx.use_case.title, "Claims Triage Assistant");
    assert_eq!(ctx.organization_id.as_deref(), Some("org-7"));
    assert_eq!(ctx.caller.user_id, "u-42");

    assert_eq!(ctx.guardrails.guardrails_id, "g-uc-claims");
    assert_eq!(ctx.total_guardrail_rules(), 3);
    assert_eq!(ctx.guardrails.critical_rules, 2);
    assert_eq!(ctx.guardrails.count_of("agent_behavior"), 1);
    assert_eq!(ctx.guardrails.enforcement_strategies, vec!["block"]);

    assert_eq!(ctx.identified_risks_count(), 2);
    assert!(ctx.risks.has_category(RiskCategory::Technical));
    assert!(ctx.risks.has_category(RiskCategory::Ethical));
    assert_eq!(ctx.risks.critical_count, 1);
    assert_eq!(ctx.risks.high_count, 1);
    assert_eq!(ctx.risks.residual_risk_level, RiskLevel::High);
    let technical = ctx
        .risks
        .identified
        .iter()
        .find(|r| r.category == RiskCategory::Technical)
        .unwrap();
    assert_eq!(technical.severity, Severity::High);
    assert_eq!(technical.mitigation, "Human review above a value threshold");

    assert!(ctx.compliance.gdpr);
    assert!(ctx.compliance.frameworks.contains(&"GDPR".to_string()));
    assert!(ctx.compliance.jurisdictions.contains(&"EU".to_string()));

    assert_eq!(ctx.testing.previous_evaluations, 0);
}

#[test]
fn explicit_guardrails_id_wins_over_latest() {
    let store = seeded_store("uc-claims");
    let mut older = guardrails("g-older", "uc-claims");
    older.created_at = older.created_at - chrono::Duration::days(30);
    older.configuration = json!({ "guardrails": { "rules": {
        "critical": [ { "id": "only-1", "type": "content_safety", "severity": "critical" } ]
    }}});
    store.put_guardrail(&older).unwrap();

    let aggregator = ContextAggregator::new(store);
    let latest = aggregator.build_context("uc-claims", None, &caller()).unwrap();
    assert_eq!(latest.guardrails.guardrails_id, "g-uc-claims");

    let pinned = aggregator
        .build_context("uc-claims", Some("g-older"), &caller())
        .unwrap();
    assert_eq!(pinned.guardrails.guardrails_id, "g-older");
    assert_eq!(pinned.total_guardrail_rules(), 1);
}

#[test]
fn missing_guardrails_are_a_dependency_error() {
    let store = Arc::new(SledStore::temporary().unwrap());
    store.put_use_case(&use_case("uc-bare")).unwrap();
    let aggregator = ContextAggregator::new(store);

    let err = aggregator
        .build_context("uc-bare", None, &caller())
        .unwrap_err();
    assert!(matches!(err, GenerationError::DependencyMissing(_)));
    assert_eq!(err.code(), "GUARDRAILS_REQUIRED");
}

#[test]
fn unknown_use_case_is_not_found() {
    let store = seeded_store("uc-claims");
    let aggregator = ContextAggregator::new(store);
    let err = aggregator
        .build_context("uc-ghost", None, &caller())
        .unwrap_err();
    assert!(matches!(err, GenerationError::NotFound(_)));
}

#[test]
fn import_reports_what_was_written() {
    let store = SledStore::temporary().unwrap();
    let summary = store.import_bundle(&bundle("uc-claims")).unwrap();
    assert_eq!(summary.use_case_id, "uc-claims");
    assert_eq!(summary.assessments, 2);
    assert_eq!(summary.guardrails, 1);
    assert_eq!(summary.evaluations, 0);
}
