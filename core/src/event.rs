//! The audit event log.
//!
//! Every mutation a pass makes to an account is mirrored by exactly one
//! event. Events never feed back into either pass.

use crate::{
    model::{CorroborationCheck, FanInClassification},
    types::{AccountId, Timestamp},
};
use serde::{Deserialize, Serialize};

/// Every event emitted by a pass.
/// Variants are append-only — never removed or reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PassEvent {
    PassStarted {
        pass: String,
    },
    PassCompleted {
        pass:             String,
        accounts_touched: usize,
    },

    // ── Fan-in corroboration ───────────────────────
    FanInClassified {
        account_id:     AccountId,
        classification: FanInClassification,
        unique_senders: usize,
        total_received: f64,
        window_start:   Timestamp,
        window_end:     Timestamp,
        checks:         Vec<CorroborationCheck>,
    },
    CandidateSkipped {
        account_id: AccountId,
        reason:     String,
    },

    // ── Relationship intelligence ──────────────────
    SuspicionDampened {
        account_id:     AccountId,
        score_before:   f64,
        score_after:    f64,
        recurring_pair: f64,
        duration:       f64,
        consistency:    f64,
        periodicity:    f64,
    },
}

impl PassEvent {
    /// Stable name for the event_type column of the log.
    pub fn type_name(&self) -> &'static str {
        match self {
            PassEvent::PassStarted { .. }       => "pass_started",
            PassEvent::PassCompleted { .. }     => "pass_completed",
            PassEvent::FanInClassified { .. }   => "fan_in_classified",
            PassEvent::CandidateSkipped { .. }  => "candidate_skipped",
            PassEvent::SuspicionDampened { .. } => "suspicion_dampened",
        }
    }
}

/// One row of the serialized event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub seq:        u64,
    pub pass:       String,
    pub event_type: String,
    pub payload:    String, // JSON
}
