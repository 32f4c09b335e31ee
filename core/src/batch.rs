//! Batch ingestion — one fixed set of accounts, transactions and
//! upstream detector results.
//!
//! Timestamps are parsed as RFC 3339 during deserialization, so a
//! malformed timestamp fails the whole load instead of silently
//! becoming epoch zero.

use crate::{
    error::{PostPassError, PostPassResult},
    model::{AccountBook, AccountNode, AdjacencyGraph, DetectorOutputs, RawTransaction},
};
use serde::{Deserialize, Serialize};

/// On-disk JSON layout of a batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchFile {
    pub accounts:     Vec<AccountNode>,
    pub transactions: Vec<RawTransaction>,
    #[serde(flatten)]
    pub detectors:    DetectorOutputs,
}

impl BatchFile {
    pub fn into_batch(self) -> PostPassResult<Batch> {
        for (index, txn) in self.transactions.iter().enumerate() {
            if !txn.amount.is_finite() || txn.amount <= 0.0 {
                return Err(PostPassError::InvalidTransaction {
                    index,
                    reason: format!("amount must be positive, got {}", txn.amount),
                });
            }
        }
        let accounts = AccountBook::from_nodes(self.accounts)?;
        Ok(Batch::new(accounts, self.transactions, self.detectors))
    }
}

/// Everything both passes read, plus the accounts they mutate.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub accounts:     AccountBook,
    pub transactions: Vec<RawTransaction>,
    pub graph:        AdjacencyGraph,
    pub detectors:    DetectorOutputs,
}

impl Batch {
    pub fn new(
        accounts: AccountBook,
        transactions: Vec<RawTransaction>,
        detectors: DetectorOutputs,
    ) -> Self {
        let graph = AdjacencyGraph::from_transactions(&transactions);
        Self { accounts, transactions, graph, detectors }
    }

    pub fn from_json(json: &str) -> PostPassResult<Self> {
        let file: BatchFile = serde_json::from_str(json)?;
        file.into_batch()
    }

    pub fn from_file(path: &str) -> PostPassResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Back to the on-disk layout, accounts in id order.
    pub fn to_file(&self) -> BatchFile {
        BatchFile {
            accounts:     self.accounts.clone().into_nodes(),
            transactions: self.transactions.clone(),
            detectors:    self.detectors.clone(),
        }
    }
}
