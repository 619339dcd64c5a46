//! Detection validators
//!
//! Context-based plausibility checks applied after annotation and before fusion.

pub mod plausibility;

pub use plausibility::{FilterOutcome, PlausibilityFilter};
