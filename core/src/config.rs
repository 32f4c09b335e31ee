//! Pass configuration.
//!
//! Every threshold is fixed for a run. Defaults are the production
//! values; a JSON file may override any subset of them.

use crate::error::{PostPassError, PostPassResult};
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Longest window or horizon any threshold may describe (ten years).
pub const MAX_HORIZON_DAYS: i64 = 3_650;
const MAX_HORIZON_HOURS: i64 = MAX_HORIZON_DAYS * 24;

// ── Fan-in corroboration ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FanInConfig {
    /// Maximum width of the aggregation window.
    pub window_hours: i64,
    /// Unique senders needed inside one window to become a candidate.
    pub min_unique_senders: usize,
    /// An outgoing neighbor with at most this many lifetime
    /// transactions is treated as a shell-like intermediary.
    pub shell_max_transactions: u64,
    /// Tolerance applied to the amount received before the
    /// preservation check (0.20 = 80% lower bound).
    pub shell_amount_tolerance: f64,
    /// Fraction of the lower bound the candidate must have pushed to
    /// the intermediary.
    pub shell_preservation_factor: f64,
    /// How long after the window closes outflows still count as rapid.
    pub rapid_outflow_hours: i64,
    /// Forwarded / received ratio that counts as rapid layering.
    pub rapid_outflow_ratio: f64,
}

impl Default for FanInConfig {
    fn default() -> Self {
        Self {
            window_hours:              72,
            min_unique_senders:        3,
            shell_max_transactions:    3,
            shell_amount_tolerance:    0.20,
            shell_preservation_factor: 0.5,
            rapid_outflow_hours:       24,
            rapid_outflow_ratio:       0.50,
        }
    }
}

impl FanInConfig {
    pub fn window(&self) -> Duration {
        Duration::hours(self.window_hours)
    }

    pub fn rapid_outflow_window(&self) -> Duration {
        Duration::hours(self.rapid_outflow_hours)
    }

    pub fn validate(&self) -> PostPassResult<()> {
        if self.window_hours <= 0 {
            return Err(invalid("fan_in.window_hours", "must be greater than zero"));
        }
        check_horizon("fan_in.window_hours", self.window_hours, MAX_HORIZON_HOURS)?;
        if self.min_unique_senders == 0 {
            return Err(invalid("fan_in.min_unique_senders", "must be greater than zero"));
        }
        if self.rapid_outflow_hours < 0 {
            return Err(invalid("fan_in.rapid_outflow_hours", "must not be negative"));
        }
        check_horizon("fan_in.rapid_outflow_hours", self.rapid_outflow_hours, MAX_HORIZON_HOURS)?;
        check_unit("fan_in.shell_amount_tolerance", self.shell_amount_tolerance)?;
        check_unit("fan_in.shell_preservation_factor", self.shell_preservation_factor)?;
        check_unit("fan_in.rapid_outflow_ratio", self.rapid_outflow_ratio)?;
        Ok(())
    }
}

// ── Relationship intelligence ──────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationshipConfig {
    pub min_pair_transactions: usize,
    pub min_span_days: i64,
    pub medium_duration_days: i64,
    pub long_duration_days: i64,
    /// Coefficient of variation below which amounts count as consistent.
    pub cv_threshold: f64,
    /// A gap matches when within this fraction of the average gap.
    pub gap_tolerance: f64,
    /// Share of matching gaps required for a periodicity score.
    pub min_periodic_match: f64,
    /// Ceiling on the total reduction applied to one account.
    pub max_reduction: f64,
}

impl Default for RelationshipConfig {
    fn default() -> Self {
        Self {
            min_pair_transactions: 3,
            min_span_days:         30,
            medium_duration_days:  60,
            long_duration_days:    120,
            cv_threshold:          0.20,
            gap_tolerance:         0.25,
            min_periodic_match:    0.70,
            max_reduction:         50.0,
        }
    }
}

impl RelationshipConfig {
    pub fn min_span(&self) -> Duration {
        Duration::days(self.min_span_days)
    }

    pub fn validate(&self) -> PostPassResult<()> {
        if self.min_pair_transactions == 0 {
            return Err(invalid("relationship.min_pair_transactions", "must be greater than zero"));
        }
        if self.min_span_days < 0 {
            return Err(invalid("relationship.min_span_days", "must not be negative"));
        }
        if self.medium_duration_days < 0 {
            return Err(invalid("relationship.medium_duration_days", "must not be negative"));
        }
        check_horizon("relationship.min_span_days", self.min_span_days, MAX_HORIZON_DAYS)?;
        check_horizon("relationship.long_duration_days", self.long_duration_days, MAX_HORIZON_DAYS)?;
        if self.medium_duration_days > self.long_duration_days {
            return Err(invalid(
                "relationship.medium_duration_days",
                "must not exceed long_duration_days",
            ));
        }
        if !(self.cv_threshold > 0.0) {
            return Err(invalid("relationship.cv_threshold", "must be greater than zero"));
        }
        if !(self.gap_tolerance > 0.0) {
            return Err(invalid("relationship.gap_tolerance", "must be greater than zero"));
        }
        // A match ratio of exactly 1.0 leaves no room for the linear ramp.
        if !(self.min_periodic_match >= 0.0 && self.min_periodic_match < 1.0) {
            return Err(invalid("relationship.min_periodic_match", "must be in [0, 1)"));
        }
        if !(self.max_reduction > 0.0) {
            return Err(invalid("relationship.max_reduction", "must be greater than zero"));
        }
        Ok(())
    }
}

// ── Top level ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostPassConfig {
    pub fan_in:       FanInConfig,
    pub relationship: RelationshipConfig,
}

impl PostPassConfig {
    /// Read a JSON config file. Missing fields take their defaults.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: PostPassConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PostPassResult<()> {
        self.fan_in.validate()?;
        self.relationship.validate()
    }
}

fn invalid(field: &'static str, reason: &str) -> PostPassError {
    PostPassError::InvalidConfig { field, reason: reason.to_string() }
}

fn check_unit(field: &'static str, value: f64) -> PostPassResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(PostPassError::InvalidConfig {
            field,
            reason: format!("must be in [0, 1], got {value}"),
        })
    }
}

fn check_horizon(field: &'static str, value: i64, max: i64) -> PostPassResult<()> {
    if value <= max {
        Ok(())
    } else {
        Err(PostPassError::InvalidConfig {
            field,
            reason: format!("must not exceed {max}, got {value}"),
        })
    }
}
