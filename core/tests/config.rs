//! Configuration defaults, overrides and startup validation.

use chrono::{DateTime, Duration, Utc};
use postpass_core::{
    config::{FanInConfig, PostPassConfig, RelationshipConfig, MAX_HORIZON_DAYS},
    error::PostPassError,
    fan_in::FanInEngine,
    model::{AccountBook, AccountNode, AdjacencyGraph, DetectorOutputs, RawTransaction},
    pipeline::PostPassPipeline,
    relationship::RelationshipEngine,
};
use std::collections::BTreeSet;

#[test]
fn defaults_are_the_production_thresholds() {
    let config = PostPassConfig::default();
    assert_eq!(config.fan_in.window_hours, 72);
    assert_eq!(config.fan_in.min_unique_senders, 3);
    assert_eq!(config.fan_in.shell_max_transactions, 3);
    assert_eq!(config.fan_in.shell_amount_tolerance, 0.20);
    assert_eq!(config.fan_in.rapid_outflow_hours, 24);
    assert_eq!(config.fan_in.rapid_outflow_ratio, 0.50);
    assert_eq!(config.relationship.min_pair_transactions, 3);
    assert_eq!(config.relationship.min_span_days, 30);
    assert_eq!(config.relationship.max_reduction, 50.0);
    assert!(config.validate().is_ok());
}

#[test]
fn partial_json_keeps_remaining_defaults() {
    let config: PostPassConfig =
        serde_json::from_str(r#"{ "fan_in": { "window_hours": 48 } }"#).unwrap();
    assert_eq!(config.fan_in.window_hours, 48);
    assert_eq!(config.fan_in.min_unique_senders, 3);
    assert_eq!(config.relationship, RelationshipConfig::default());
}

#[test]
fn load_reads_and_validates_a_file() {
    let dir = std::env::temp_dir();
    let good = dir.join(format!("postpass-config-good-{}.json", std::process::id()));
    std::fs::write(&good, r#"{ "relationship": { "max_reduction": 30.0 } }"#).unwrap();
    let config = PostPassConfig::load(good.to_str().unwrap()).unwrap();
    assert_eq!(config.relationship.max_reduction, 30.0);

    let bad = dir.join(format!("postpass-config-bad-{}.json", std::process::id()));
    std::fs::write(&bad, r#"{ "fan_in": { "min_unique_senders": 0 } }"#).unwrap();
    assert!(PostPassConfig::load(bad.to_str().unwrap()).is_err());

    let _ = std::fs::remove_file(good);
    let _ = std::fs::remove_file(bad);
}

#[test]
fn pipeline_refuses_invalid_config() {
    let mut config = PostPassConfig::default();
    config.fan_in.window_hours = 0;
    assert!(matches!(
        PostPassPipeline::build(&config),
        Err(PostPassError::InvalidConfig { .. })
    ));

    let mut config = PostPassConfig::default();
    config.relationship.max_reduction = 0.0;
    assert!(PostPassPipeline::build(&config).is_err());

    let mut config = PostPassConfig::default();
    config.fan_in.rapid_outflow_ratio = 1.5;
    assert!(PostPassPipeline::build(&config).is_err());
}

#[test]
fn out_of_range_horizons_are_rejected_at_startup() {
    let huge_outflow = FanInConfig { rapid_outflow_hours: 1_000_000_000_000, ..Default::default() };
    assert!(matches!(
        FanInEngine::new(huge_outflow),
        Err(PostPassError::InvalidConfig { field: "fan_in.rapid_outflow_hours", .. })
    ));

    let huge_window = FanInConfig { window_hours: i64::MAX, ..Default::default() };
    assert!(matches!(
        FanInEngine::new(huge_window),
        Err(PostPassError::InvalidConfig { field: "fan_in.window_hours", .. })
    ));

    let huge_span = RelationshipConfig { min_span_days: i64::MAX, ..Default::default() };
    assert!(matches!(
        RelationshipEngine::new(huge_span),
        Err(PostPassError::InvalidConfig { field: "relationship.min_span_days", .. })
    ));

    let huge_long = RelationshipConfig { long_duration_days: i64::MAX, ..Default::default() };
    assert!(RelationshipEngine::new(huge_long).is_err());

    let negative_medium = RelationshipConfig { medium_duration_days: -1, ..Default::default() };
    assert!(RelationshipEngine::new(negative_medium).is_err());
}

#[test]
fn widest_accepted_config_runs_near_the_end_of_time() {
    let config = FanInConfig {
        window_hours:        MAX_HORIZON_DAYS * 24,
        rapid_outflow_hours: MAX_HORIZON_DAYS * 24,
        ..Default::default()
    };
    let engine = FanInEngine::new(config).expect("upper bound is accepted");

    let last = DateTime::<Utc>::MAX_UTC - Duration::hours(10);
    let txns: Vec<RawTransaction> = ["A", "B", "C"]
        .iter()
        .enumerate()
        .map(|(i, sender)| RawTransaction {
            sender_id:   sender.to_string(),
            receiver_id: "R".into(),
            amount:      100.0,
            timestamp:   last + Duration::hours(i as i64),
        })
        .collect();
    let mut accounts = AccountBook::new();
    accounts.insert(AccountNode::new("R", 30.0, 3));
    let graph = AdjacencyGraph::from_transactions(&txns);

    engine.apply(&mut accounts, &txns, &graph, &DetectorOutputs::default());
    assert!(accounts.get("R").unwrap().fan_in_classification.is_some());

    let relationship = RelationshipEngine::new(RelationshipConfig {
        min_span_days:        MAX_HORIZON_DAYS,
        medium_duration_days: MAX_HORIZON_DAYS,
        long_duration_days:   MAX_HORIZON_DAYS,
        ..Default::default()
    })
    .expect("upper bound is accepted");
    relationship.apply(&mut accounts, &txns, &BTreeSet::new());
    assert_eq!(accounts.get("R").unwrap().suspicion_score, 30.0);
}
