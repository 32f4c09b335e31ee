//! The pass pipeline.
//!
//! EXECUTION ORDER (fixed, documented, never reordered):
//!   1. Fan-in corroboration
//!   2. Relationship intelligence
//!
//! RULES:
//!   - Passes run strictly one after the other. Both append to
//!     `explanation` and `triggered_algorithms`, so they never overlap.
//!   - No pass reads another pass's findings.
//!   - Every mutation is mirrored in the event log.

use crate::{
    batch::Batch,
    config::PostPassConfig,
    error::PostPassResult,
    event::{EventLogEntry, PassEvent},
    fan_in::FanInEngine,
    relationship::RelationshipEngine,
    types::{FAN_IN_ALGORITHM, RELATIONSHIP_ALGORITHM},
};

/// The contract every post-processing pass fulfills.
pub trait PostPass: Send {
    /// Unique stable name for this pass.
    fn name(&self) -> &'static str;

    /// Run once over the batch, returning the events emitted.
    fn run(&self, batch: &mut Batch) -> PostPassResult<Vec<PassEvent>>;
}

impl PostPass for FanInEngine {
    fn name(&self) -> &'static str {
        FAN_IN_ALGORITHM
    }

    fn run(&self, batch: &mut Batch) -> PostPassResult<Vec<PassEvent>> {
        Ok(self.apply(&mut batch.accounts, &batch.transactions, &batch.graph, &batch.detectors))
    }
}

impl PostPass for RelationshipEngine {
    fn name(&self) -> &'static str {
        RELATIONSHIP_ALGORITHM
    }

    fn run(&self, batch: &mut Batch) -> PostPassResult<Vec<PassEvent>> {
        let cycle_members = batch.detectors.cycle_members();
        Ok(self.apply(&mut batch.accounts, &batch.transactions, &cycle_members))
    }
}

#[derive(Default)]
pub struct PostPassPipeline {
    passes: Vec<Box<dyn PostPass>>,
}

impl PostPassPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a pipeline with both passes registered in order.
    /// Fails on invalid configuration.
    pub fn build(config: &PostPassConfig) -> PostPassResult<Self> {
        let mut pipeline = Self::new();
        pipeline.register(Box::new(FanInEngine::new(config.fan_in.clone())?));
        pipeline.register(Box::new(RelationshipEngine::new(config.relationship.clone())?));
        Ok(pipeline)
    }

    /// Register a pass. Call in the documented execution order.
    pub fn register(&mut self, pass: Box<dyn PostPass>) {
        self.passes.push(pass);
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// Run every pass over the batch and return the combined event log.
    pub fn run(&self, batch: &mut Batch) -> PostPassResult<Vec<EventLogEntry>> {
        let mut log = Vec::new();
        for pass in &self.passes {
            let events = pass.run(batch)?;
            for event in &events {
                log.push(EventLogEntry {
                    seq:        log.len() as u64,
                    pass:       pass.name().to_string(),
                    event_type: event.type_name().to_string(),
                    payload:    serde_json::to_string(event)?,
                });
            }
        }
        log::debug!("pipeline finished: {} events", log.len());
        Ok(log)
    }
}
