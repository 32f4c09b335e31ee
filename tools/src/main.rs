//! postpass-runner: headless runner for the fraud post-processing passes.
//!
//! Usage:
//!   postpass-runner --batch batch.json [--config passes.json] [--out result.json]
//!   postpass-runner --seed 12345 [--config passes.json] [--out result.json]
//!
//! Without --batch a synthetic batch is generated from --seed.

use anyhow::{Context, Result};
use postpass_core::{
    batch::{Batch, BatchFile},
    config::PostPassConfig,
    event::EventLogEntry,
    model::FanInClassification,
    pipeline::PostPassPipeline,
    scenario::{self, ScenarioParams},
};
use std::env;

#[derive(serde::Serialize)]
struct RunOutput {
    batch:  BatchFile,
    events: Vec<EventLogEntry>,
}

struct Totals {
    accounts:   usize,
    suspicious: usize,
    score_sum:  f64,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let batch_path = string_arg(&args, "--batch");
    let config_path = string_arg(&args, "--config");
    let out_path = string_arg(&args, "--out");

    println!("postpass-runner");
    match batch_path {
        Some(path) => println!("  batch:   {path}"),
        None => println!("  seed:    {seed} (synthetic batch)"),
    }
    println!("  config:  {}", config_path.unwrap_or("(defaults)"));
    println!();

    let config = match config_path {
        Some(path) => PostPassConfig::load(path)?,
        None => PostPassConfig::default(),
    };

    let mut batch = match batch_path {
        Some(path) => Batch::from_file(path).with_context(|| format!("loading batch {path}"))?,
        None => scenario::generate(seed, &ScenarioParams::default())?,
    };

    let pipeline = PostPassPipeline::build(&config)?;
    log::info!("running passes: {}", pipeline.pass_names().join(" -> "));

    let before = totals(&batch);
    let events = pipeline.run(&mut batch)?;
    let after = totals(&batch);

    print_summary(&batch, &before, &after, events.len());

    if let Some(path) = out_path {
        let output = RunOutput { batch: batch.to_file(), events };
        std::fs::write(path, serde_json::to_string_pretty(&output)?)
            .with_context(|| format!("writing {path}"))?;
        println!();
        println!("  wrote {path}");
    }

    Ok(())
}

fn totals(batch: &Batch) -> Totals {
    Totals {
        accounts:   batch.accounts.len(),
        suspicious: batch.accounts.iter().filter(|a| a.is_suspicious).count(),
        score_sum:  batch.accounts.iter().map(|a| a.suspicion_score).sum(),
    }
}

fn print_summary(batch: &Batch, before: &Totals, after: &Totals, event_count: usize) {
    let classified = |c: FanInClassification| {
        batch
            .accounts
            .iter()
            .filter(|a| a.fan_in_classification == Some(c))
            .count()
    };

    println!("=== RUN SUMMARY ===");
    println!("  accounts:           {}", after.accounts);
    println!("  transactions:       {}", batch.transactions.len());
    println!("  events:             {event_count}");
    println!();
    println!("=== FAN-IN ===");
    println!("  aggregation only:   {}", classified(FanInClassification::AggregationCandidate));
    println!("  confirmed ML:       {}", classified(FanInClassification::ConfirmedMoneyLaundering));
    for account in batch
        .accounts
        .iter()
        .filter(|a| a.fan_in_classification == Some(FanInClassification::ConfirmedMoneyLaundering))
    {
        let checks: Vec<&str> = account.corroboration_checks.iter().map(|c| c.as_str()).collect();
        println!("    {} [{}]", account.account_id, checks.join(", "));
    }
    println!();
    println!("=== RELATIONSHIP INTELLIGENCE ===");
    println!("  suspicious before:  {}", before.suspicious);
    println!("  suspicious after:   {}", after.suspicious);
    println!("  total score before: {:.1}", before.score_sum);
    println!("  total score after:  {:.1}", after.score_sum);
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

fn string_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}
