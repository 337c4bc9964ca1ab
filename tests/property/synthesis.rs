//! Staged synthesis properties: per-suite cap, no repeats, priority order

use guardgen::context::Severity;
use guardgen::generation::engine::synthesize;
use guardgen::generation::{
    priority_rank, ExpectedOutput, Scenario, ScenarioInput, SuiteCoverage, TestSuite,
};
use proptest::prelude::*;
use std::collections::{BTreeMap, HashSet};

fn severity() -> impl Strategy<Value = Severity> {
    prop_oneof![
        Just(Severity::Critical),
        Just(Severity::High),
        Just(Severity::Medium),
        Just(Severity::Low),
    ]
}

fn scenario(name: String, input: String) -> Scenario {
    Scenario {
        id: format!("s-{}-{}", name, input.len()),
        name,
        description: String::new(),
        guardrail_id: None,
        inputs: vec![ScenarioInput {
            input_type: "prompt".to_string(),
            value: input,
            metadata: BTreeMap::new(),
        }],
        expected_outputs: vec![ExpectedOutput {
            output_type: "behavior".to_string(),
            value: "Responds appropriately".to_string(),
            explanation: None,
        }],
        assertions: Vec::new(),
        metrics: Vec::new(),
        weight: 1.0,
        priority: Severity::Medium,
        tags: Vec::new(),
        metadata: None,
    }
}

fn suite() -> impl Strategy<Value = TestSuite> {
    // a small alphabet so repeats across suites are common
    let scenarios = prop::collection::vec(("[ab]{1,2}", "[xy]{1,3}"), 0..12);
    (severity(), "[a-z]{3,8}", scenarios).prop_map(|(priority, name, raw)| TestSuite {
        id: format!("suite-{}", name),
        name: name.clone(),
        description: String::new(),
        suite_type: name,
        priority,
        scenarios: raw.into_iter().map(|(n, i)| scenario(n, i)).collect(),
        coverage: SuiteCoverage::default(),
        metadata: None,
    })
}

proptest! {
    #[test]
    fn synthesized_suites_respect_the_cap(
        suites in prop::collection::vec(suite(), 0..6),
        cap in 1usize..8,
    ) {
        let out = synthesize(suites, cap);
        for suite in &out {
            prop_assert!(!suite.scenarios.is_empty());
            prop_assert!(suite.scenarios.len() <= cap);
        }
    }

    #[test]
    fn synthesized_scenarios_are_unique(suites in prop::collection::vec(suite(), 0..6)) {
        let out = synthesize(suites, 20);
        let mut seen = HashSet::new();
        for scenario in out.iter().flat_map(|s| &s.scenarios) {
            prop_assert!(seen.insert((scenario.name.clone(), scenario.input_text().to_string())));
        }
    }

    #[test]
    fn synthesized_suites_are_priority_ordered(suites in prop::collection::vec(suite(), 0..6)) {
        let out = synthesize(suites, 10);
        let ranks: Vec<u8> = out.iter().map(|s| priority_rank(s.priority)).collect();
        prop_assert!(ranks.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn no_scenario_is_invented(suites in prop::collection::vec(suite(), 0..6)) {
        let total_in: usize = suites.iter().map(|s| s.scenarios.len()).sum();
        let out = synthesize(suites, 10);
        let total_out: usize = out.iter().map(|s| s.scenarios.len()).sum();
        prop_assert!(total_out <= total_in);
    }
}
