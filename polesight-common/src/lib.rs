//! # polesight common library
//!
//! Shared code for the polesight fusion engine:
//! - Error types
//! - Fusion configuration model and TOML resolution
//! - Progress event types and the EventBus
//! - Logging initialization

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::FusionConfig;
pub use error::{Error, Result};
pub use events::{EventBus, FusionEvent};
