//! Conditional job updates under contention, and artifact writes.

use guardgen::document::Document;
use guardgen::error::StorageError;
use guardgen::job::{advance, fail, AGGREGATING, GENERATING, SAVING};
use guardgen::store::{
    ArtifactStore, JobRecord, JobStatus, JobStore, JobUpdate, NewEvaluation, NewJob, SledStore,
};
use std::sync::Arc;
use std::thread;

fn new_job(store: &SledStore, use_case_id: &str) -> JobRecord {
    store
        .create_job(NewJob {
            use_case_id: use_case_id.to_string(),
            guardrails_id: None,
            generation_strategy: "rapid".to_string(),
            test_intensity: "light".to_string(),
            use_orchestrator: false,
            requested_by: None,
        })
        .unwrap()
}

fn claim(store: &SledStore, id: &str) -> JobUpdate {
    store
        .update_job(id, &mut |current: &JobRecord| {
            (current.status == JobStatus::Pending).then(|| JobRecord {
                status: JobStatus::Processing,
                progress: 5,
                ..current.clone()
            })
        })
        .unwrap()
}

#[test]
fn racing_claims_have_one_winner() {
    let store = Arc::new(SledStore::temporary().unwrap());
    let job = new_job(&store, "uc-1");

    let wins: usize = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| claim(&store, &job.id).is_applied()))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count()
    });
    assert_eq!(wins, 1);
    assert_eq!(store.job(&job.id).unwrap().unwrap().status, JobStatus::Processing);
}

#[test]
fn concurrent_writers_lose_no_updates() {
    let store = Arc::new(SledStore::temporary().unwrap());
    let job = new_job(&store, "uc-1");

    thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..10 {
                    store
                        .update_job(&job.id, &mut |current: &JobRecord| {
                            Some(JobRecord {
                                progress: current.progress + 1,
                                ..current.clone()
                            })
                        })
                        .unwrap();
                }
            });
        }
    });
    assert_eq!(store.job(&job.id).unwrap().unwrap().progress, 40);
}

#[test]
fn progress_steps_only_move_forward() {
    let store = SledStore::temporary().unwrap();
    let job = new_job(&store, "uc-1");

    // pending jobs are not advanced
    assert!(!advance(&store, &job.id, AGGREGATING).unwrap().is_applied());
    assert!(claim(&store, &job.id).is_applied());

    assert!(advance(&store, &job.id, SAVING).unwrap().is_applied());
    let stale = advance(&store, &job.id, GENERATING).unwrap();
    assert!(!stale.is_applied());
    assert_eq!(stale.record().progress, SAVING.progress);
    assert_eq!(stale.record().current_step, SAVING.label);
}

#[test]
fn failure_keeps_progress_and_is_final() {
    let store = SledStore::temporary().unwrap();
    let job = new_job(&store, "uc-1");
    claim(&store, &job.id);
    advance(&store, &job.id, GENERATING).unwrap();

    let failed = fail(&store, &job.id, "provider unavailable").unwrap();
    assert!(failed.is_applied());
    let record = failed.record();
    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.progress, GENERATING.progress);
    assert_eq!(record.error.as_deref(), Some("provider unavailable"));

    assert!(!fail(&store, &job.id, "again").unwrap().is_applied());
    assert!(!advance(&store, &job.id, SAVING).unwrap().is_applied());
}

#[test]
fn updating_a_missing_job_is_not_found() {
    let store = SledStore::temporary().unwrap();
    let err = store
        .update_job("job-none", &mut |current: &JobRecord| Some(current.clone()))
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound(_)));
}

#[test]
fn artifacts_with_undefined_values_are_refused() {
    let store = SledStore::temporary().unwrap();
    let draft = NewEvaluation {
        use_case_id: "uc-1".to_string(),
        name: "Draft".to_string(),
        description: String::new(),
        configuration: Document::object([("missing", Document::Undefined)]),
    };
    let err = store.insert_evaluation(draft).unwrap_err();
    assert!(matches!(err, StorageError::Unrepresentable(_)));
    assert!(store.latest_generated_evaluation("uc-1").unwrap().is_none());
}
