//! # polesight fusion engine
//!
//! Batch geospatial fusion of aerial pole detections with ground-truth
//! inventories.
//!
//! # Pipeline
//! 1. **detection** - sliding-window scan, geo-referencing, per-tile dedup
//! 2. **annotation** - road, water, elevation and vegetation context
//! 3. **validators** - plausibility filtering
//! 4. **fusion** - matching, corroboration, scoring, classification, summary
//!
//! Every stage receives an explicit [`RunContext`]; auxiliary layers are built
//! once per run and shared read-only across tile workers.

pub mod annotation;
pub mod detection;
pub mod error;
pub mod fusion;
pub mod geodesy;
pub mod inventory;
pub mod raster;
pub mod run_context;
pub mod types;
pub mod validators;

pub use error::{EmptyInputKind, FusionError, Result};
pub use fusion::{FusionRun, MultiSourceValidator, RunStatus, Summary};
pub use run_context::RunContext;
pub use types::{
    ClassifiedAsset, ContextAttributes, Detection, GroundTruthAsset, MatchDistance, MatchedRecord,
    Observation, Provenance, ReasonCode, Tier,
};
