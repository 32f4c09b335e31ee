//! Relationship intelligence pass.
//!
//! Lowers suspicion for accounts that take part in well-established
//! recurring relationships (rent, payroll, subscriptions).
//!
//!   1. Group transactions by directed (sender, receiver) pair.
//!   2. Keep pairs with enough transactions over a long enough span.
//!   3. Score each pair on four categories: recurrence, duration,
//!      amount consistency, periodicity.
//!   4. Per account keep the best value of each category across all
//!      of its pairs, sum, cap, subtract from the score (floored at 0).
//!
//! Cycle members are never dampened. Owned fields: `suspicion_score`,
//! `is_suspicious`.

use crate::{
    config::RelationshipConfig,
    error::PostPassResult,
    event::PassEvent,
    model::{AccountBook, RawTransaction},
    types::{AccountId, Timestamp, RELATIONSHIP_ALGORITHM},
};
use chrono::Duration;
use std::collections::{BTreeMap, BTreeSet};

// ── Constants ────────────────────────────────────────────────────────────────

const RECURRING_BASE_COUNT: usize = 3;
const RECURRING_FULL_COUNT: usize = 10;
const RECURRING_BASE_POINTS: f64 = 10.0;
const RECURRING_MAX_POINTS: f64 = 25.0;

const DURATION_MEDIUM_POINTS: f64 = 10.0;
const DURATION_LONG_POINTS: f64 = 20.0;

const CONSISTENCY_MAX_POINTS: f64 = 15.0;

const PERIODICITY_BASE_POINTS: f64 = 10.0;
const PERIODICITY_MAX_POINTS: f64 = 20.0;

// ── Pair statistics ──────────────────────────────────────────────────────────

/// Everything seen for one directed (sender, receiver) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct PairStats {
    pub sender_id:   AccountId,
    pub receiver_id: AccountId,
    pub amounts:     Vec<f64>,
    /// Sorted ascending.
    pub timestamps:  Vec<Timestamp>,
}

impl PairStats {
    pub fn count(&self) -> usize {
        self.timestamps.len()
    }

    pub fn span(&self) -> Duration {
        match (self.timestamps.first(), self.timestamps.last()) {
            (Some(first), Some(last)) => *last - *first,
            _ => Duration::zero(),
        }
    }
}

/// Group by directed pair. A->B and B->A are separate pairs.
/// Output is ordered by (sender, receiver).
pub fn aggregate_pairs(transactions: &[RawTransaction]) -> Vec<PairStats> {
    let mut pairs: BTreeMap<(&str, &str), PairStats> = BTreeMap::new();
    for txn in transactions {
        let stats = pairs
            .entry((txn.sender_id.as_str(), txn.receiver_id.as_str()))
            .or_insert_with(|| PairStats {
                sender_id:   txn.sender_id.clone(),
                receiver_id: txn.receiver_id.clone(),
                amounts:     Vec::new(),
                timestamps:  Vec::new(),
            });
        stats.amounts.push(txn.amount);
        stats.timestamps.push(txn.timestamp);
    }

    pairs
        .into_values()
        .map(|mut stats| {
            stats.timestamps.sort();
            stats
        })
        .collect()
}

/// Population standard deviation over mean. `None` for fewer than two
/// amounts or a non-positive mean.
pub fn coefficient_of_variation(amounts: &[f64]) -> Option<f64> {
    if amounts.len() < 2 {
        return None;
    }
    let n = amounts.len() as f64;
    let mean = amounts.iter().sum::<f64>() / n;
    if mean <= 0.0 {
        return None;
    }
    let variance = amounts.iter().map(|a| (a - mean).powi(2)).sum::<f64>() / n;
    Some(variance.sqrt() / mean)
}

/// Share of consecutive gaps within `tolerance` of the average gap.
/// `None` for fewer than three timestamps or a zero average gap.
pub fn periodic_match_ratio(timestamps: &[Timestamp], tolerance: f64) -> Option<f64> {
    if timestamps.len() < 3 {
        return None;
    }
    let gaps: Vec<f64> = timestamps
        .windows(2)
        .map(|w| (w[1] - w[0]).num_seconds() as f64)
        .collect();
    let average = gaps.iter().sum::<f64>() / gaps.len() as f64;
    if average <= 0.0 {
        return None;
    }
    let band = average * tolerance;
    let matching = gaps.iter().filter(|g| (*g - average).abs() <= band).count();
    Some(matching as f64 / gaps.len() as f64)
}

// ── Sub-scores ───────────────────────────────────────────────────────────────

/// Reduction points per category.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SubScores {
    pub recurring_pair: f64,
    pub duration:       f64,
    pub consistency:    f64,
    pub periodicity:    f64,
}

impl SubScores {
    pub fn total(&self) -> f64 {
        self.recurring_pair + self.duration + self.consistency + self.periodicity
    }

    /// Category-wise maximum. Pairs never add up within one category.
    pub fn keep_max(&mut self, other: &SubScores) {
        self.recurring_pair = self.recurring_pair.max(other.recurring_pair);
        self.duration = self.duration.max(other.duration);
        self.consistency = self.consistency.max(other.consistency);
        self.periodicity = self.periodicity.max(other.periodicity);
    }

    fn labelled(&self) -> [(&'static str, f64); 4] {
        [
            ("recurring_pair", self.recurring_pair),
            ("relationship_duration", self.duration),
            ("amount_consistency", self.consistency),
            ("periodicity", self.periodicity),
        ]
    }
}

/// 10 points at 3 transactions rising linearly to 25 at 10 or more.
pub fn recurring_pair_score(count: usize) -> f64 {
    if count < RECURRING_BASE_COUNT {
        return 0.0;
    }
    let steps = (RECURRING_FULL_COUNT - RECURRING_BASE_COUNT) as f64;
    let progress = (count - RECURRING_BASE_COUNT) as f64 / steps;
    (RECURRING_BASE_POINTS + progress * (RECURRING_MAX_POINTS - RECURRING_BASE_POINTS))
        .min(RECURRING_MAX_POINTS)
}

// ── Engine ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RelationshipEngine {
    config: RelationshipConfig,
}

impl RelationshipEngine {
    pub fn new(config: RelationshipConfig) -> PostPassResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn qualifies(&self, pair: &PairStats) -> bool {
        pair.count() >= self.config.min_pair_transactions && pair.span() >= self.config.min_span()
    }

    pub fn duration_score(&self, span: Duration) -> f64 {
        if span >= Duration::days(self.config.long_duration_days) {
            DURATION_LONG_POINTS
        } else if span >= Duration::days(self.config.medium_duration_days) {
            DURATION_MEDIUM_POINTS
        } else {
            0.0
        }
    }

    /// Lower variability, higher reduction.
    pub fn amount_consistency_score(&self, amounts: &[f64]) -> f64 {
        match coefficient_of_variation(amounts) {
            Some(cv) if cv < self.config.cv_threshold => {
                (CONSISTENCY_MAX_POINTS * (1.0 - cv / self.config.cv_threshold)).round()
            }
            _ => 0.0,
        }
    }

    /// 10 points at the minimum match ratio rising linearly to 20 at 100%.
    pub fn periodicity_score(&self, timestamps: &[Timestamp]) -> f64 {
        let min_match = self.config.min_periodic_match;
        match periodic_match_ratio(timestamps, self.config.gap_tolerance) {
            Some(ratio) if ratio >= min_match => {
                let progress = (ratio - min_match) / (1.0 - min_match);
                (PERIODICITY_BASE_POINTS
                    + progress * (PERIODICITY_MAX_POINTS - PERIODICITY_BASE_POINTS))
                    .min(PERIODICITY_MAX_POINTS)
            }
            _ => 0.0,
        }
    }

    /// `None` when the pair does not qualify.
    pub fn score_pair(&self, pair: &PairStats) -> Option<SubScores> {
        if !self.qualifies(pair) {
            return None;
        }
        Some(SubScores {
            recurring_pair: recurring_pair_score(pair.count()),
            duration:       self.duration_score(pair.span()),
            consistency:    self.amount_consistency_score(&pair.amounts),
            periodicity:    self.periodicity_score(&pair.timestamps),
        })
    }

    /// Per-account category maxima over every qualifying pair. Both ends
    /// of a pair receive its scores.
    pub fn account_relief(&self, transactions: &[RawTransaction]) -> BTreeMap<AccountId, SubScores> {
        let mut relief: BTreeMap<AccountId, SubScores> = BTreeMap::new();
        for pair in aggregate_pairs(transactions) {
            let Some(scores) = self.score_pair(&pair) else {
                continue;
            };
            log::debug!(
                "relationship {} -> {}: {} txns over {}d, {:.1} points",
                pair.sender_id,
                pair.receiver_id,
                pair.count(),
                pair.span().num_days(),
                scores.total(),
            );
            for account_id in [&pair.sender_id, &pair.receiver_id] {
                relief.entry(account_id.clone()).or_default().keep_max(&scores);
            }
        }
        relief
    }

    /// Run the full pass. Scores only ever go down; cycle members and
    /// accounts already at zero are left alone.
    pub fn apply(
        &self,
        accounts: &mut AccountBook,
        transactions: &[RawTransaction],
        cycle_members: &BTreeSet<AccountId>,
    ) -> Vec<PassEvent> {
        let mut events = vec![PassEvent::PassStarted { pass: RELATIONSHIP_ALGORITHM.to_string() }];
        let relief = self.account_relief(transactions);
        let mut touched = 0;

        for node in accounts.iter_mut() {
            if cycle_members.contains(&node.account_id) || node.suspicion_score <= 0.0 {
                continue;
            }
            // Already dampened by an earlier run over this batch.
            if node.triggered_algorithms.iter().any(|a| a == RELATIONSHIP_ALGORITHM) {
                continue;
            }
            let Some(scores) = relief.get(&node.account_id) else {
                continue;
            };

            let uncapped = scores.total();
            let reduction = uncapped.min(self.config.max_reduction);
            if reduction <= 0.0 {
                continue;
            }

            let before = node.suspicion_score;
            let after = (before - reduction).max(0.0);
            node.suspicion_score = after;
            node.refresh_suspicion();
            node.record_algorithm(RELATIONSHIP_ALGORITHM);
            node.append_explanation(&self.describe(scores, uncapped, before, after));
            touched += 1;

            events.push(PassEvent::SuspicionDampened {
                account_id:     node.account_id.clone(),
                score_before:   before,
                score_after:    after,
                recurring_pair: scores.recurring_pair,
                duration:       scores.duration,
                consistency:    scores.consistency,
                periodicity:    scores.periodicity,
            });
        }

        log::info!("relationship pass: {touched} accounts dampened");
        events.push(PassEvent::PassCompleted {
            pass:             RELATIONSHIP_ALGORITHM.to_string(),
            accounts_touched: touched,
        });
        events
    }

    fn describe(&self, scores: &SubScores, uncapped: f64, before: f64, after: f64) -> String {
        let parts: Vec<String> = scores
            .labelled()
            .iter()
            .filter(|(_, points)| *points > 0.0)
            .map(|(label, points)| format!("{label}(-{points:.0})"))
            .collect();
        let cap = if uncapped > self.config.max_reduction {
            format!(" capped at {:.0}", self.config.max_reduction)
        } else {
            String::new()
        };
        format!(
            "{RELATIONSHIP_ALGORITHM}: {}{cap}; score {before:.2} -> {after:.2}",
            parts.join(" "),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(n: i64) -> Timestamp {
        chrono::Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(n)
    }

    fn engine() -> RelationshipEngine {
        RelationshipEngine::new(RelationshipConfig::default()).unwrap()
    }

    #[test]
    fn recurring_score_scales_and_caps() {
        assert_eq!(recurring_pair_score(2), 0.0);
        assert_eq!(recurring_pair_score(3), 10.0);
        assert!((recurring_pair_score(4) - (10.0 + 15.0 / 7.0)).abs() < 1e-9);
        assert_eq!(recurring_pair_score(10), 25.0);
        assert_eq!(recurring_pair_score(40), 25.0);
    }

    #[test]
    fn duration_score_steps() {
        let e = engine();
        assert_eq!(e.duration_score(Duration::days(45)), 0.0);
        assert_eq!(e.duration_score(Duration::days(60)), 10.0);
        assert_eq!(e.duration_score(Duration::days(119)), 10.0);
        assert_eq!(e.duration_score(Duration::days(120)), 20.0);
    }

    #[test]
    fn cv_of_identical_amounts_is_zero() {
        assert_eq!(coefficient_of_variation(&[500.0, 500.0, 500.0]), Some(0.0));
        assert_eq!(coefficient_of_variation(&[500.0]), None);
        assert_eq!(coefficient_of_variation(&[0.0, 0.0]), None);
    }

    #[test]
    fn consistency_score_drops_with_variability() {
        let e = engine();
        assert_eq!(e.amount_consistency_score(&[1000.0, 1000.0, 1000.0]), 15.0);
        // mean 1000, population std 100 -> CV 0.10 -> 7.5 rounds to 8
        assert_eq!(e.amount_consistency_score(&[900.0, 1100.0]), 8.0);
        // CV 0.5
        assert_eq!(e.amount_consistency_score(&[500.0, 1500.0]), 0.0);
    }

    #[test]
    fn periodicity_requires_regular_gaps() {
        let e = engine();
        let regular = [day(0), day(30), day(60), day(90)];
        assert_eq!(periodic_match_ratio(&regular, 0.25), Some(1.0));
        assert_eq!(e.periodicity_score(&regular), 20.0);

        // gaps 30, 5, 55 around an average of 30: one match in three
        let irregular = [day(0), day(30), day(35), day(90)];
        assert!(periodic_match_ratio(&irregular, 0.25).unwrap() < 0.70);
        assert_eq!(e.periodicity_score(&irregular), 0.0);

        assert_eq!(e.periodicity_score(&[day(0), day(30)]), 0.0);
    }

    #[test]
    fn periodicity_ramp_from_seventy_percent() {
        let e = engine();
        // ten gaps of 10 days, three of them at 20 days: average 13
        // -> 10-day gaps are within 25%, 20-day gaps are not
        let mut stamps = vec![day(0)];
        let gaps = [10, 10, 10, 20, 10, 10, 20, 10, 10, 20];
        for g in gaps {
            let last = *stamps.last().unwrap();
            stamps.push(last + Duration::days(g));
        }
        let ratio = periodic_match_ratio(&stamps, 0.25).unwrap();
        assert!((ratio - 0.7).abs() < 1e-9);
        assert!((e.periodicity_score(&stamps) - 10.0).abs() < 1e-6);
    }

    #[test]
    fn pairs_are_directed() {
        let txns = vec![
            RawTransaction { sender_id: "a".into(), receiver_id: "b".into(), amount: 1.0, timestamp: day(2) },
            RawTransaction { sender_id: "b".into(), receiver_id: "a".into(), amount: 1.0, timestamp: day(1) },
            RawTransaction { sender_id: "a".into(), receiver_id: "b".into(), amount: 2.0, timestamp: day(0) },
        ];
        let pairs = aggregate_pairs(&txns);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].sender_id, "a");
        assert_eq!(pairs[0].timestamps, vec![day(0), day(2)]);
        assert_eq!(pairs[0].span(), Duration::days(2));
        assert_eq!(pairs[1].count(), 1);
    }
}
