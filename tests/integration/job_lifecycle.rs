//! Job creation, claiming and progress through a full run.

use crate::integration::support::{generator, seeded_store, ScriptedProvider};
use guardgen::context::{CallerIdentity, ContextAggregator};
use guardgen::error::ProviderError;
use guardgen::job::{
    ExecutionMode, JobController, JobRequest, JobSettings, JobWatcher, StartOutcome, WatchOutcome,
};
use guardgen::store::{ArtifactStore, JobStatus, JobStore, SledStore};
use std::sync::Arc;
use std::time::Duration;

fn controller(store: Arc<SledStore>, provider: Arc<ScriptedProvider>) -> JobController {
    JobController::new(
        store.clone(),
        store.clone(),
        Arc::new(ContextAggregator::new(store)),
        Some(generator(provider)),
        JobSettings::default(),
    )
}

fn rapid(use_case_id: &str) -> JobRequest {
    JobRequest {
        generation_strategy: "rapid".into(),
        test_intensity: "light".into(),
        ..JobRequest::new(use_case_id)
    }
}

#[tokio::test]
async fn sync_job_saves_an_artifact_and_links_it() {
    let store = seeded_store("uc-claims");
    let provider = Arc::new(ScriptedProvider::answering());
    let controller = controller(store.clone(), provider.clone());

    let job = controller.create_job(rapid("uc-claims")).unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.progress, 0);

    let outcome = controller
        .start(&job.id, ExecutionMode::Sync, &CallerIdentity::local())
        .await
        .unwrap();
    let StartOutcome::Finished(done) = outcome else {
        panic!("expected a finished job, got {:?}", outcome);
    };
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.progress, 100);
    assert!(done.error.is_none());
    assert!(provider.call_count() > 0);

    let result = done.result.expect("completed job carries a result");
    assert!(result.saved);
    let evaluation_id = result.evaluation_id.expect("saved artifact id");
    let stored = store.evaluation(&evaluation_id).unwrap().unwrap();
    assert_eq!(stored.use_case_id, "uc-claims");
    assert!(stored.generated);
    assert_eq!(
        result.evaluation_config["id"].as_str(),
        Some(evaluation_id.as_str())
    );
    assert!(result.summary.total_scenarios > 0);

    let latest = store.latest_generated_evaluation("uc-claims").unwrap().unwrap();
    assert_eq!(latest.id, evaluation_id);
}

#[tokio::test]
async fn orchestrated_job_reports_the_orchestrator_method() {
    let store = seeded_store("uc-claims");
    let provider = Arc::new(ScriptedProvider::answering());
    let controller = controller(store, provider);

    let request = JobRequest {
        use_orchestrator: true,
        ..rapid("uc-claims")
    };
    let job = controller.create_job(request).unwrap();
    assert!(job.use_orchestrator);

    let outcome = controller
        .start(&job.id, ExecutionMode::Sync, &CallerIdentity::local())
        .await
        .unwrap();
    let StartOutcome::Finished(done) = outcome else {
        panic!("expected a finished job, got {:?}", outcome);
    };
    let result = done.result.unwrap();
    assert_eq!(result.summary.generation_method, "multi-agent-orchestrator");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_starts_claim_the_job_once() {
    let store = seeded_store("uc-claims");
    let provider = Arc::new(ScriptedProvider::answering().with_delay(Duration::from_millis(20)));
    let controller = controller(store.clone(), provider);
    let job = controller.create_job(rapid("uc-claims")).unwrap();

    let caller = CallerIdentity::local();
    let (first, second) = tokio::join!(
        controller.start(&job.id, ExecutionMode::Async, &caller),
        controller.start(&job.id, ExecutionMode::Async, &caller),
    );
    let outcomes = [first.unwrap(), second.unwrap()];
    let started = outcomes
        .iter()
        .filter(|o| matches!(o, StartOutcome::Started { .. }))
        .count();
    assert_eq!(started, 1, "outcomes: {:?}", outcomes);

    let watcher = JobWatcher::new(store, Duration::from_millis(10), Duration::from_secs(30));
    let outcome = watcher.watch(&job.id, |_| {}).await.unwrap();
    let WatchOutcome::Finished(done) = outcome else {
        panic!("expected the run to finish, got {:?}", outcome);
    };
    assert_eq!(done.status, JobStatus::Completed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn observed_progress_never_decreases() {
    let store = seeded_store("uc-claims");
    let provider = Arc::new(ScriptedProvider::answering().with_delay(Duration::from_millis(15)));
    let controller = controller(store.clone(), provider);
    let job = controller.create_job(rapid("uc-claims")).unwrap();

    let outcome = controller
        .start(&job.id, ExecutionMode::Async, &CallerIdentity::local())
        .await
        .unwrap();
    assert!(matches!(outcome, StartOutcome::Started { .. }));

    let mut seen = Vec::new();
    let watcher = JobWatcher::new(store, Duration::from_millis(2), Duration::from_secs(30));
    let outcome = watcher
        .watch(&job.id, |record| seen.push(record.progress))
        .await
        .unwrap();
    assert!(matches!(outcome, WatchOutcome::Finished(_)));
    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "progress went back: {:?}", seen);
    assert_eq!(seen.last(), Some(&100));
}

#[tokio::test]
async fn a_new_job_can_follow_a_failed_one() {
    let store = seeded_store("uc-claims");
    let provider = Arc::new(ScriptedProvider::new(|_| {
        Err(ProviderError::AuthFailed("invalid x-api-key".to_string()))
    }));
    let controller = controller(store.clone(), provider);

    let first = controller.create_job(rapid("uc-claims")).unwrap();
    let outcome = controller
        .start(&first.id, ExecutionMode::Sync, &CallerIdentity::local())
        .await
        .unwrap();
    let StartOutcome::Finished(failed) = outcome else {
        panic!("expected a finished job, got {:?}", outcome);
    };
    assert_eq!(failed.status, JobStatus::Failed);
    assert!(failed.error.is_some());
    assert!(failed.completed_at.is_some());

    assert!(store.active_job("uc-claims").unwrap().is_none());
    let second = controller.create_job(rapid("uc-claims")).unwrap();
    assert_ne!(second.id, first.id);
    assert_eq!(controller.latest_job("uc-claims").unwrap().id, second.id);
}
