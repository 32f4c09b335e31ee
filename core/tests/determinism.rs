//! Same batch in, same accounts and event log out.
//!
//! Two pipelines over two independently generated batches from one
//! seed must agree byte for byte. Any divergence is a blocker.

use postpass_core::{
    batch::Batch,
    config::PostPassConfig,
    event::EventLogEntry,
    model::{CorroborationCheck, FanInClassification},
    pipeline::PostPassPipeline,
    scenario::{self, ScenarioParams},
    types::{FAN_IN_ALGORITHM, RELATIONSHIP_ALGORITHM},
};

fn run_seed(seed: u64) -> (Batch, Vec<EventLogEntry>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut batch = scenario::generate(seed, &ScenarioParams::default()).expect("generate batch");
    let pipeline = PostPassPipeline::build(&PostPassConfig::default()).expect("build pipeline");
    let log = pipeline.run(&mut batch).expect("run pipeline");
    (batch, log)
}

#[test]
fn same_seed_produces_identical_results() {
    const SEED: u64 = 0xDEAD_BEEF_CAFE_1234;

    let (batch_a, log_a) = run_seed(SEED);
    let (batch_b, log_b) = run_seed(SEED);

    assert_eq!(
        log_a.len(), log_b.len(),
        "Event log lengths differ: {} vs {}",
        log_a.len(), log_b.len()
    );
    for (i, (a, b)) in log_a.iter().zip(log_b.iter()).enumerate() {
        assert_eq!(a, b, "Event log diverged at entry {i}:\n  A: {a:?}\n  B: {b:?}");
    }

    let json_a = serde_json::to_string(&batch_a.to_file()).unwrap();
    let json_b = serde_json::to_string(&batch_b.to_file()).unwrap();
    assert_eq!(json_a, json_b, "Mutated accounts diverged");
}

#[test]
fn passes_run_in_documented_order() {
    let pipeline = PostPassPipeline::build(&PostPassConfig::default()).unwrap();
    assert_eq!(pipeline.pass_names(), vec![FAN_IN_ALGORITHM, RELATIONSHIP_ALGORITHM]);

    let (_, log) = run_seed(7);
    assert_eq!(log.first().unwrap().event_type, "pass_started");
    assert_eq!(log.first().unwrap().pass, FAN_IN_ALGORITHM);
    assert_eq!(log.last().unwrap().event_type, "pass_completed");
    assert_eq!(log.last().unwrap().pass, RELATIONSHIP_ALGORITHM);

    let first_relationship = log.iter().position(|e| e.pass == RELATIONSHIP_ALGORITHM).unwrap();
    assert!(log[first_relationship..].iter().all(|e| e.pass == RELATIONSHIP_ALGORITHM));
    assert!(log.iter().enumerate().all(|(i, e)| e.seq == i as u64));
}

#[test]
fn synthetic_mules_are_confirmed_and_merchants_are_not() {
    let params = ScenarioParams::default();
    let (batch, _) = run_seed(11);

    for i in 0..params.mule_receivers {
        let mule = batch.accounts.get(&format!("mule-{i:03}")).unwrap();
        assert_eq!(mule.fan_in_classification, Some(FanInClassification::ConfirmedMoneyLaundering));
        assert!(mule.corroboration_checks.contains(&CorroborationCheck::ShellChainInvolvement));
        assert!(mule.corroboration_checks.contains(&CorroborationCheck::RapidLayeredOutflow));
        assert!(mule.corroboration_checks.contains(&CorroborationCheck::RoleConflict));
    }
    for i in 0..params.benign_aggregators {
        let merchant = batch.accounts.get(&format!("merchant-{i:03}")).unwrap();
        assert_eq!(merchant.fan_in_classification, Some(FanInClassification::AggregationCandidate));
        assert!(merchant.corroboration_checks.is_empty());
    }
}

#[test]
fn classification_matches_corroboration_everywhere() {
    for seed in [1, 2, 3, 4, 5] {
        let (batch, _) = run_seed(seed);
        for node in batch.accounts.iter() {
            match node.fan_in_classification {
                Some(FanInClassification::ConfirmedMoneyLaundering) => {
                    assert!(!node.corroboration_checks.is_empty())
                }
                Some(FanInClassification::AggregationCandidate) | None => {
                    assert!(node.corroboration_checks.is_empty())
                }
            }
            // One-to-one payroll relationships never look like fan-in.
            if node.account_id.starts_with("payee-") {
                assert_eq!(node.fan_in_classification, None);
            }
        }
    }
}

#[test]
fn sample_batch_runs_end_to_end() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../data/sample_batch.json");
    let mut batch = Batch::from_file(path).expect("load sample batch");
    let pipeline = PostPassPipeline::build(&PostPassConfig::default()).unwrap();
    pipeline.run(&mut batch).unwrap();

    let r = batch.accounts.get("R").unwrap();
    assert_eq!(r.fan_in_classification, Some(FanInClassification::ConfirmedMoneyLaundering));
    assert_eq!(r.corroboration_checks, vec![CorroborationCheck::ShellChainInvolvement]);
    assert_eq!(r.suspicion_score, 35.0);

    for id in ["X", "Y"] {
        let node = batch.accounts.get(id).unwrap();
        assert_eq!(node.suspicion_score, 0.0);
        assert!(!node.is_suspicious);
        assert_eq!(node.fan_in_classification, None);
    }
}
