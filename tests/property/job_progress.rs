//! Job progress properties under arbitrary step orderings

use guardgen::job::{
    advance, fail, Step, AGGREGATING, COMPLETE, GENERATING, INITIALIZING, SAVING, STARTING,
    TICKER_STEPS,
};
use guardgen::store::{JobRecord, JobStatus, JobStore, NewJob, SledStore};
use proptest::prelude::*;

fn all_steps() -> Vec<Step> {
    let mut steps = vec![STARTING, AGGREGATING, INITIALIZING, GENERATING, SAVING, COMPLETE];
    steps.extend(TICKER_STEPS);
    steps
}

fn processing_job(store: &SledStore) -> JobRecord {
    let job = store
        .create_job(NewJob {
            use_case_id: "uc-prop".to_string(),
            guardrails_id: None,
            generation_strategy: "rapid".to_string(),
            test_intensity: "light".to_string(),
            use_orchestrator: false,
            requested_by: None,
        })
        .unwrap();
    store
        .update_job(&job.id, &mut |current: &JobRecord| {
            Some(JobRecord {
                status: JobStatus::Processing,
                ..current.clone()
            })
        })
        .unwrap()
        .record()
        .clone()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn stored_progress_is_the_running_maximum(order in prop::collection::vec(0usize..12, 1..20)) {
        let steps = all_steps();
        let store = SledStore::temporary().unwrap();
        let job = processing_job(&store);

        let mut high = 0u8;
        for index in order {
            let step = steps[index];
            let update = advance(&store, &job.id, step).unwrap();
            high = high.max(step.progress);
            prop_assert_eq!(update.record().progress, high);
            prop_assert_eq!(update.is_applied(), step.progress == high);
        }
        prop_assert_eq!(store.job(&job.id).unwrap().unwrap().progress, high);
    }

    #[test]
    fn failed_jobs_stop_moving(
        before in prop::collection::vec(0usize..12, 0..6),
        after in prop::collection::vec(0usize..12, 1..6),
    ) {
        let steps = all_steps();
        let store = SledStore::temporary().unwrap();
        let job = processing_job(&store);
        for index in before {
            advance(&store, &job.id, steps[index]).unwrap();
        }
        let failed = fail(&store, &job.id, "stopped").unwrap();
        let frozen = failed.record().clone();
        prop_assert_eq!(frozen.status, JobStatus::Failed);

        for index in after {
            prop_assert!(!advance(&store, &job.id, steps[index]).unwrap().is_applied());
        }
        let stored = store.job(&job.id).unwrap().unwrap();
        prop_assert_eq!(stored.progress, frozen.progress);
        prop_assert_eq!(stored.status, JobStatus::Failed);
    }
}
