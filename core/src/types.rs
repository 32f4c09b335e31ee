//! Shared primitive types used across both passes.

use chrono::{DateTime, Utc};

/// A stable, unique account identifier.
pub type AccountId = String;

/// A point in time. Totally ordered, always UTC.
pub type Timestamp = DateTime<Utc>;

/// Algorithm name recorded by the fan-in pass.
pub const FAN_IN_ALGORITHM: &str = "fan_in_corroboration";

/// Algorithm name recorded by the relationship pass.
pub const RELATIONSHIP_ALGORITHM: &str = "relationship_intelligence";
