//! Fan-in corroboration pass.
//!
//! Phase 1 finds "many senders -> one receiver" aggregation candidates
//! with a two-pointer sliding window over each receiver's incoming
//! transactions. Phase 2 runs four independent corroboration checks
//! against each candidate. A candidate is upgraded to confirmed money
//! laundering only when at least one check fires; ordinary aggregation
//! (payroll pooling, marketplace payouts) stays a plain candidate.
//!
//! Owned fields: `fan_in_classification`, `corroboration_checks`.
//! Never touches `suspicion_score`.

use crate::{
    config::FanInConfig,
    error::PostPassResult,
    event::PassEvent,
    model::{
        AccountBook, AdjacencyGraph, CorroborationCheck, DetectorOutputs, FanInClassification,
        RawTransaction,
    },
    types::{AccountId, Timestamp, FAN_IN_ALGORITHM},
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// A receiver whose best window reached the unique-sender threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationCandidate {
    pub account_id:     AccountId,
    pub senders:        BTreeSet<AccountId>,
    pub total_received: f64,
    pub window_start:   Timestamp,
    pub window_end:     Timestamp,
}

/// Upstream detector results flattened for membership lookups.
struct Evidence<'a> {
    cycle_members: BTreeSet<AccountId>,
    shell_members: BTreeSet<AccountId>,
    detectors:     &'a DetectorOutputs,
}

impl<'a> Evidence<'a> {
    fn new(detectors: &'a DetectorOutputs) -> Self {
        Self {
            cycle_members: detectors.cycle_members(),
            shell_members: detectors.shell_chain_members(),
            detectors,
        }
    }

    fn is_fan_out_source(&self, account_id: &str) -> bool {
        self.detectors.fan_outs.contains_key(account_id)
    }
}

// ── Engine ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct FanInEngine {
    config: FanInConfig,
}

impl FanInEngine {
    /// Rejects configurations that would make every receiver a candidate.
    pub fn new(config: FanInConfig) -> PostPassResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Phase 1: at most one candidate per receiver, in receiver id order.
    pub fn find_candidates(&self, transactions: &[RawTransaction]) -> Vec<AggregationCandidate> {
        let mut incoming: BTreeMap<&str, Vec<&RawTransaction>> = BTreeMap::new();
        for txn in transactions {
            incoming.entry(txn.receiver_id.as_str()).or_default().push(txn);
        }

        incoming
            .into_iter()
            .filter_map(|(receiver, mut txns)| {
                // Secondary keys make the scan independent of input order.
                txns.sort_by(|a, b| {
                    a.timestamp
                        .cmp(&b.timestamp)
                        .then_with(|| a.sender_id.cmp(&b.sender_id))
                        .then_with(|| a.amount.total_cmp(&b.amount))
                });
                self.best_window(receiver, &txns)
            })
            .collect()
    }

    /// Two-pointer scan keeping a running multiset of senders in window.
    /// A later window replaces the best only with strictly more senders.
    fn best_window(&self, receiver: &str, txns: &[&RawTransaction]) -> Option<AggregationCandidate> {
        let width = self.config.window();
        let mut in_window: HashMap<&str, usize> = HashMap::new();
        let mut left = 0;
        let mut best: Option<(usize, usize, usize)> = None; // (unique, left, right)

        for right in 0..txns.len() {
            *in_window.entry(txns[right].sender_id.as_str()).or_insert(0) += 1;

            while txns[right].timestamp - txns[left].timestamp > width {
                let sender = txns[left].sender_id.as_str();
                let remaining = {
                    let count = in_window.entry(sender).or_insert(1);
                    *count -= 1;
                    *count
                };
                if remaining == 0 {
                    in_window.remove(sender);
                }
                left += 1;
            }

            let unique = in_window.len();
            if unique >= self.config.min_unique_senders
                && best.map_or(true, |(best_unique, _, _)| unique > best_unique)
            {
                best = Some((unique, left, right));
            }
        }

        let (_, left, right) = best?;
        let window = &txns[left..=right];
        Some(AggregationCandidate {
            account_id:     receiver.to_string(),
            senders:        window.iter().map(|t| t.sender_id.clone()).collect(),
            total_received: window.iter().map(|t| t.amount).sum(),
            window_start:   window[0].timestamp,
            window_end:     window[window.len() - 1].timestamp,
        })
    }

    /// Phase 2: the triggered checks in canonical order.
    pub fn corroborate(
        &self,
        candidate: &AggregationCandidate,
        accounts: &AccountBook,
        graph: &AdjacencyGraph,
        detectors: &DetectorOutputs,
    ) -> Vec<CorroborationCheck> {
        self.run_checks(candidate, accounts, graph, &Evidence::new(detectors))
    }

    fn run_checks(
        &self,
        candidate: &AggregationCandidate,
        accounts: &AccountBook,
        graph: &AdjacencyGraph,
        evidence: &Evidence<'_>,
    ) -> Vec<CorroborationCheck> {
        CorroborationCheck::ALL
            .into_iter()
            .filter(|check| match check {
                CorroborationCheck::ShellChainInvolvement => {
                    self.shell_chain_involvement(candidate, accounts, graph)
                }
                CorroborationCheck::CycleRingParticipation => {
                    cycle_ring_participation(candidate, graph, evidence)
                }
                CorroborationCheck::RapidLayeredOutflow => {
                    self.rapid_layered_outflow(candidate, graph)
                }
                CorroborationCheck::RoleConflict => role_conflict(candidate, evidence),
            })
            .collect()
    }

    /// Funds pushed through a low-activity intermediary that forwards
    /// them onward (not straight back to the candidate).
    fn shell_chain_involvement(
        &self,
        candidate: &AggregationCandidate,
        accounts: &AccountBook,
        graph: &AdjacencyGraph,
    ) -> bool {
        let lower_bound = candidate.total_received * (1.0 - self.config.shell_amount_tolerance);
        let required = lower_bound * self.config.shell_preservation_factor;
        let origin = candidate.account_id.as_str();

        graph.neighbors(origin).any(|neighbor| {
            if neighbor == origin {
                return false;
            }
            // Unknown activity level: cannot be judged shell-like.
            let Some(node) = accounts.get(neighbor) else {
                return false;
            };
            if node.total_transactions > self.config.shell_max_transactions {
                return false;
            }
            let forwarded: f64 = graph
                .transactions_between(origin, neighbor)
                .iter()
                .map(|t| t.amount)
                .sum();
            if forwarded < required {
                return false;
            }
            graph.neighbors(neighbor).any(|hop| hop != origin && hop != neighbor)
        })
    }

    /// Outflow from the window start until `rapid_outflow_hours` after
    /// it closes, compared directly against the amount received.
    fn rapid_layered_outflow(&self, candidate: &AggregationCandidate, graph: &AdjacencyGraph) -> bool {
        let deadline = candidate
            .window_end
            .checked_add_signed(self.config.rapid_outflow_window())
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let forwarded: f64 = graph
            .outgoing(&candidate.account_id)
            .filter(|t| t.timestamp >= candidate.window_start && t.timestamp <= deadline)
            .map(|t| t.amount)
            .sum();
        forwarded >= candidate.total_received * self.config.rapid_outflow_ratio
    }

    /// Run the full pass. Mutates `accounts` in place; the returned
    /// events are an audit trail of every change made.
    pub fn apply(
        &self,
        accounts: &mut AccountBook,
        transactions: &[RawTransaction],
        graph: &AdjacencyGraph,
        detectors: &DetectorOutputs,
    ) -> Vec<PassEvent> {
        let mut events = vec![PassEvent::PassStarted { pass: FAN_IN_ALGORITHM.to_string() }];
        let evidence = Evidence::new(detectors);
        let mut touched = 0;
        let mut confirmed = 0;

        for candidate in self.find_candidates(transactions) {
            if !accounts.contains(&candidate.account_id) {
                log::debug!("fan-in candidate {} not in account book, skipped", candidate.account_id);
                events.push(PassEvent::CandidateSkipped {
                    account_id: candidate.account_id.clone(),
                    reason:     "account not found".to_string(),
                });
                continue;
            }

            let checks = self.run_checks(&candidate, accounts, graph, &evidence);
            let Some(node) = accounts.get_mut(&candidate.account_id) else {
                continue;
            };

            // Never downgrade: checks from an earlier run are kept.
            let mut merged: BTreeSet<CorroborationCheck> =
                node.corroboration_checks.iter().copied().collect();
            merged.extend(checks.iter().copied());
            let merged: Vec<CorroborationCheck> = merged.into_iter().collect();

            let classification = if merged.is_empty() {
                FanInClassification::AggregationCandidate
            } else {
                FanInClassification::ConfirmedMoneyLaundering
            };

            let fragment = describe(&candidate, classification, &merged);
            node.fan_in_classification = Some(classification);
            node.corroboration_checks = merged.clone();
            if !node.has_explanation_fragment(&fragment) {
                node.append_explanation(&fragment);
            }
            node.record_algorithm(FAN_IN_ALGORITHM);
            touched += 1;

            if classification == FanInClassification::ConfirmedMoneyLaundering {
                confirmed += 1;
                log::warn!(
                    "Fan-in confirmed: {} ({} senders, {:.2} received, checks: {})",
                    candidate.account_id,
                    candidate.senders.len(),
                    candidate.total_received,
                    check_list(&merged),
                );
            } else {
                log::debug!(
                    "Fan-in candidate without corroboration: {} ({} senders)",
                    candidate.account_id,
                    candidate.senders.len(),
                );
            }

            events.push(PassEvent::FanInClassified {
                account_id:     candidate.account_id.clone(),
                classification,
                unique_senders: candidate.senders.len(),
                total_received: candidate.total_received,
                window_start:   candidate.window_start,
                window_end:     candidate.window_end,
                checks:         merged,
            });
        }

        log::info!("fan-in pass: {touched} candidates classified, {confirmed} confirmed");
        events.push(PassEvent::PassCompleted {
            pass:             FAN_IN_ALGORITHM.to_string(),
            accounts_touched: touched,
        });
        events
    }
}

fn cycle_ring_participation(
    candidate: &AggregationCandidate,
    graph: &AdjacencyGraph,
    evidence: &Evidence<'_>,
) -> bool {
    evidence.cycle_members.contains(&candidate.account_id)
        || graph
            .neighbors(&candidate.account_id)
            .any(|neighbor| evidence.cycle_members.contains(neighbor))
}

/// The candidate already holds another laundering role upstream.
fn role_conflict(candidate: &AggregationCandidate, evidence: &Evidence<'_>) -> bool {
    let id = &candidate.account_id;
    evidence.shell_members.contains(id)
        || evidence.is_fan_out_source(id)
        || evidence.cycle_members.contains(id)
}

fn check_list(checks: &[CorroborationCheck]) -> String {
    checks.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(", ")
}

fn describe(
    candidate: &AggregationCandidate,
    classification: FanInClassification,
    checks: &[CorroborationCheck],
) -> String {
    let hours = (candidate.window_end - candidate.window_start).num_minutes() as f64 / 60.0;
    let evidence = if checks.is_empty() {
        "no corroborating laundering evidence".to_string()
    } else {
        format!("corroborated by {}", check_list(checks))
    };
    format!(
        "fan_in: {} ({} unique senders, {:.2} received within {:.1}h; {})",
        classification.as_str(),
        candidate.senders.len(),
        candidate.total_received,
        hours,
        evidence,
    )
}
