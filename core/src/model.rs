//! The batch data model shared by both passes.
//!
//! RULE: each pass writes only the fields it owns.
//!   - Fan-in pass:        `fan_in_classification`, `corroboration_checks`
//!   - Relationship pass:  `suspicion_score`, `is_suspicious`
//!   - Both (append-only): `explanation`, `triggered_algorithms`
//!
//! `detected_patterns` and `total_transactions` belong to the upstream
//! detectors and are never written here.

use crate::{
    error::{PostPassError, PostPassResult},
    types::{AccountId, Timestamp},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Separator placed between explanation fragments.
pub const EXPLANATION_SEPARATOR: &str = " | ";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTransaction {
    pub sender_id:   AccountId,
    pub receiver_id: AccountId,
    pub amount:      f64,
    pub timestamp:   Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FanInClassification {
    AggregationCandidate,
    ConfirmedMoneyLaundering,
}

impl FanInClassification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AggregationCandidate     => "aggregation_candidate",
            Self::ConfirmedMoneyLaundering => "confirmed_money_laundering",
        }
    }
}

/// The four corroboration predicates.
/// Declaration order is the canonical reporting order — never reorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorroborationCheck {
    ShellChainInvolvement,
    CycleRingParticipation,
    RapidLayeredOutflow,
    RoleConflict,
}

impl CorroborationCheck {
    pub const ALL: [CorroborationCheck; 4] = [
        Self::ShellChainInvolvement,
        Self::CycleRingParticipation,
        Self::RapidLayeredOutflow,
        Self::RoleConflict,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ShellChainInvolvement  => "shell_chain_involvement",
            Self::CycleRingParticipation => "cycle_ring_participation",
            Self::RapidLayeredOutflow    => "rapid_layered_outflow",
            Self::RoleConflict           => "role_conflict",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountNode {
    pub account_id:           AccountId,
    #[serde(default)]
    pub suspicion_score:      f64,
    #[serde(default)]
    pub is_suspicious:        bool,
    #[serde(default)]
    pub detected_patterns:    Vec<String>,
    #[serde(default)]
    pub total_transactions:   u64,
    #[serde(default)]
    pub explanation:          String,
    #[serde(default)]
    pub triggered_algorithms: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fan_in_classification: Option<FanInClassification>,
    #[serde(default)]
    pub corroboration_checks: Vec<CorroborationCheck>,
}

impl AccountNode {
    pub fn new(account_id: impl Into<AccountId>, suspicion_score: f64, total_transactions: u64) -> Self {
        Self {
            account_id: account_id.into(),
            suspicion_score,
            is_suspicious: suspicion_score > 0.0,
            detected_patterns: Vec::new(),
            total_transactions,
            explanation: String::new(),
            triggered_algorithms: Vec::new(),
            fan_in_classification: None,
            corroboration_checks: Vec::new(),
        }
    }

    /// Append an algorithm name unless it is already recorded.
    pub fn record_algorithm(&mut self, name: &str) {
        if !self.triggered_algorithms.iter().any(|a| a == name) {
            self.triggered_algorithms.push(name.to_string());
        }
    }

    /// Append a fragment to the explanation. Earlier text is never touched.
    pub fn append_explanation(&mut self, fragment: &str) {
        if !self.explanation.is_empty() {
            self.explanation.push_str(EXPLANATION_SEPARATOR);
        }
        self.explanation.push_str(fragment);
    }

    pub fn has_explanation_fragment(&self, fragment: &str) -> bool {
        self.explanation
            .split(EXPLANATION_SEPARATOR)
            .any(|existing| existing == fragment)
    }

    pub fn refresh_suspicion(&mut self) {
        self.is_suspicious = self.suspicion_score > 0.0;
    }
}

/// The caller's account collection, keyed and iterated by account id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountBook {
    accounts: BTreeMap<AccountId, AccountNode>,
}

impl AccountBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a book from a list of nodes. Duplicate ids are rejected.
    pub fn from_nodes(nodes: Vec<AccountNode>) -> PostPassResult<Self> {
        let mut book = Self::new();
        for node in nodes {
            if book.accounts.contains_key(&node.account_id) {
                return Err(PostPassError::DuplicateAccount { account_id: node.account_id });
            }
            book.accounts.insert(node.account_id.clone(), node);
        }
        Ok(book)
    }

    /// Insert or replace a node.
    pub fn insert(&mut self, node: AccountNode) -> Option<AccountNode> {
        self.accounts.insert(node.account_id.clone(), node)
    }

    pub fn get(&self, account_id: &str) -> Option<&AccountNode> {
        self.accounts.get(account_id)
    }

    pub fn get_mut(&mut self, account_id: &str) -> Option<&mut AccountNode> {
        self.accounts.get_mut(account_id)
    }

    pub fn contains(&self, account_id: &str) -> bool {
        self.accounts.contains_key(account_id)
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AccountNode> {
        self.accounts.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut AccountNode> {
        self.accounts.values_mut()
    }

    pub fn into_nodes(self) -> Vec<AccountNode> {
        self.accounts.into_values().collect()
    }
}

/// Directed multigraph: sender -> receiver -> transactions between the pair.
///
/// Ordered maps keep neighbor iteration (and therefore float summation
/// order) identical between runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdjacencyGraph {
    edges: BTreeMap<AccountId, BTreeMap<AccountId, Vec<RawTransaction>>>,
}

impl AdjacencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_transactions(transactions: &[RawTransaction]) -> Self {
        let mut graph = Self::new();
        for txn in transactions {
            graph.add(txn.clone());
        }
        graph
    }

    pub fn add(&mut self, txn: RawTransaction) {
        self.edges
            .entry(txn.sender_id.clone())
            .or_default()
            .entry(txn.receiver_id.clone())
            .or_default()
            .push(txn);
    }

    /// Receivers that `account_id` has sent to, in id order.
    pub fn neighbors<'a>(&'a self, account_id: &str) -> impl Iterator<Item = &'a AccountId> + 'a {
        self.edges
            .get(account_id)
            .into_iter()
            .flat_map(|receivers| receivers.keys())
    }

    pub fn transactions_between(&self, sender_id: &str, receiver_id: &str) -> &[RawTransaction] {
        self.edges
            .get(sender_id)
            .and_then(|receivers| receivers.get(receiver_id))
            .map(|txns| txns.as_slice())
            .unwrap_or(&[])
    }

    /// Every outgoing transaction of `account_id`, grouped by receiver id.
    pub fn outgoing<'a>(&'a self, account_id: &str) -> impl Iterator<Item = &'a RawTransaction> + 'a {
        self.edges
            .get(account_id)
            .into_iter()
            .flat_map(|receivers| receivers.values().flatten())
    }
}

pub type FanOutMap = BTreeMap<AccountId, BTreeSet<AccountId>>;

/// Results of the upstream detectors, consumed read-only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectorOutputs {
    #[serde(default)]
    pub cycles:       Vec<Vec<AccountId>>,
    #[serde(default)]
    pub shell_chains: Vec<Vec<AccountId>>,
    #[serde(default)]
    pub fan_outs:     FanOutMap,
}

impl DetectorOutputs {
    pub fn cycle_members(&self) -> BTreeSet<AccountId> {
        self.cycles.iter().flatten().cloned().collect()
    }

    pub fn shell_chain_members(&self) -> BTreeSet<AccountId> {
        self.shell_chains.iter().flatten().cloned().collect()
    }
}
