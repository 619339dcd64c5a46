//! Test Helper Utilities
//!
//! Shared utilities for testing polesight-fusion

#![allow(dead_code)]

pub mod fixtures;
pub mod log_capture;

// Re-export commonly used items
pub use fixtures::{
    asset, inventory, reference_date, run_context, test_config, MarkerDetector, PoleSpec,
    PoleSurface, Scene, GROUND_ELEVATION_M, PIXEL_SIZE_M, POLE_HEIGHT_M, TILE_PX,
};
pub use log_capture::{init_test_logging, LogCapture};
