//! One-shot generation without a job record.

use crate::integration::support::{generator, seeded_store, use_case, ScriptedProvider};
use guardgen::context::{CallerIdentity, ContextAggregator};
use guardgen::service::{DirectRequest, ErrorResponse, GenerationService};
use guardgen::store::SledStore;
use std::sync::Arc;
use std::time::Duration;

fn service(
    store: Arc<SledStore>,
    provider: Option<Arc<ScriptedProvider>>,
    time_limit: Duration,
) -> GenerationService {
    GenerationService::new(
        Arc::new(ContextAggregator::new(store.clone())),
        store,
        provider.map(generator),
        time_limit,
    )
}

fn rapid(use_case_id: &str) -> DirectRequest {
    DirectRequest {
        generation_strategy: "rapid".into(),
        test_intensity: "light".into(),
        ..DirectRequest::new(use_case_id)
    }
}

#[tokio::test]
async fn staged_generation_is_saved_and_retrievable() {
    let store = seeded_store("uc-claims");
    let provider = Arc::new(ScriptedProvider::answering());
    let service = service(store, Some(provider), Duration::from_secs(60));

    let response = service
        .generate_direct(&rapid("uc-claims"), &CallerIdentity::local())
        .await
        .unwrap();
    assert!(response.saved);
    assert_eq!(response.summary.generation_method, "direct-llm");
    assert_eq!(response.summary.coverage, "Not calculated");
    assert!(response.summary.total_suites > 0);
    assert!(response.summary.confidence > 0.0);

    let id = response.evaluation_id.unwrap();
    let record = service.evaluation(&id).unwrap();
    assert_eq!(record.configuration["id"].as_str(), Some(id.as_str()));
    assert_eq!(
        record.configuration["testSuites"].as_array().map(Vec::len),
        Some(response.summary.total_suites)
    );
    assert_eq!(service.latest_evaluation("uc-claims").unwrap().id, id);
}

#[tokio::test]
async fn orchestrated_generation_reports_coverage() {
    let store = seeded_store("uc-claims");
    let provider = Arc::new(ScriptedProvider::answering());
    let service = service(store, Some(provider), Duration::from_secs(60));

    let request = DirectRequest {
        use_orchestrator: true,
        ..rapid("uc-claims")
    };
    let response = service
        .generate_direct(&request, &CallerIdentity::local())
        .await
        .unwrap();
    assert_eq!(response.summary.generation_method, "multi-agent-orchestrator");
    assert!(response.summary.coverage.is_object());
    assert!(response.summary.coverage.get("overall").is_some());
}

#[tokio::test]
async fn focus_areas_limit_domain_prompts() {
    let store = seeded_store("uc-claims");
    let provider = Arc::new(ScriptedProvider::answering());
    let service = service(store, Some(provider.clone()), Duration::from_secs(60));

    let request = DirectRequest {
        focus_areas: vec!["safety".to_string()],
        ..rapid("uc-claims")
    };
    service
        .generate_direct(&request, &CallerIdentity::local())
        .await
        .unwrap();

    let prompts = provider.prompts();
    assert!(prompts.iter().any(|p| p.starts_with("Write safety test scenarios")));
    assert!(!prompts.iter().any(|p| p.starts_with("Write security test scenarios")));
    assert!(!prompts.iter().any(|p| p.starts_with("Write compliance test scenarios")));
}

#[tokio::test]
async fn missing_guardrails_fail_before_any_provider_call() {
    let store = Arc::new(SledStore::temporary().unwrap());
    store.put_use_case(&use_case("uc-bare")).unwrap();
    let provider = Arc::new(ScriptedProvider::answering());
    let service = service(store, Some(provider.clone()), Duration::from_secs(60));

    let err = service
        .generate_direct(&rapid("uc-bare"), &CallerIdentity::local())
        .await
        .unwrap_err();
    let body = ErrorResponse::from(&err);
    assert_eq!(body.code, "GUARDRAILS_REQUIRED");
    assert_eq!(body.status, 400);
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn unconfigured_provider_is_a_configuration_error() {
    let store = seeded_store("uc-claims");
    let service = service(store, None, Duration::from_secs(60));

    let err = service
        .generate_direct(&rapid("uc-claims"), &CallerIdentity::local())
        .await
        .unwrap_err();
    let body = ErrorResponse::from(&err);
    assert_eq!(body.code, "LLM_CONFIGURATION_REQUIRED");
    assert_eq!(body.status, 503);
}

#[tokio::test(start_paused = true)]
async fn slow_provider_hits_the_time_limit() {
    let store = seeded_store("uc-claims");
    let provider = Arc::new(ScriptedProvider::answering().with_delay(Duration::from_secs(120)));
    let service = service(store, Some(provider), Duration::from_secs(5));

    let err = service
        .generate_direct(&rapid("uc-claims"), &CallerIdentity::local())
        .await
        .unwrap_err();
    let body = ErrorResponse::from(&err);
    assert_eq!(body.code, "GENERATION_TIMEOUT");
    assert_eq!(body.status, 504);
    assert!(service.latest_evaluation("uc-claims").is_err());
}

#[tokio::test]
async fn unknown_evaluation_is_not_found() {
    let store = seeded_store("uc-claims");
    let service = service(store, None, Duration::from_secs(60));
    let err = service.evaluation("eval-missing").unwrap_err();
    assert_eq!(ErrorResponse::from(&err).status, 404);
}
