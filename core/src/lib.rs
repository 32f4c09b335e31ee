//! Post-processing passes for a transaction-fraud detection pipeline.
//!
//! Runs after the upstream detectors (cycles, shell chains, fan-out,
//! velocity) have scored a batch:
//!
//!   - `fan_in`:       upgrades fan-in aggregation to confirmed money
//!                     laundering only when independently corroborated.
//!   - `relationship`: dampens suspicion for accounts in established
//!                     recurring relationships.
//!
//! Both passes only add to upstream output. Fan-in never lowers
//! severity; relationship intelligence never raises a score.

pub mod batch;
pub mod config;
pub mod error;
pub mod event;
pub mod fan_in;
pub mod model;
pub mod pipeline;
pub mod relationship;
pub mod scenario;
pub mod types;
