//! Immutable per-run context
//!
//! Every component receives the run context explicitly; there is no global
//! mutable job state in the engine.

use crate::error::Result;
use chrono::NaiveDate;
use polesight_common::FusionConfig;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct RunContext {
    /// Identifier for progress events and logs
    pub run_id: Uuid,
    /// "Today" for ground-truth age computation
    pub reference_date: NaiveDate,
    config: Arc<FusionConfig>,
}

impl RunContext {
    /// Create a run context after validating `config`
    pub fn new(config: FusionConfig, reference_date: NaiveDate) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            run_id: Uuid::new_v4(),
            reference_date,
            config: Arc::new(config),
        })
    }

    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = run_id;
        self
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }
}
