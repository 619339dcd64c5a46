//! Error types for the fusion engine
//!
//! Propagation policy:
//! - `ReadFailure`, `ProjectionError`, `Detector` are isolated at tile/window/record
//!   granularity: logged, counted, and the run continues with reduced coverage.
//! - `MissingLayer` degrades the affected context attribute to unknown.
//! - `GeometryError` skips the offending feature or point.
//! - `SourceLoad` drops one inventory; the run continues on the others.
//! - `EmptyInput`, `Config` and `Internal` are fatal to the run.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which primary input set was empty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyInputKind {
    Detections,
    GroundTruth,
}

impl std::fmt::Display for EmptyInputKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmptyInputKind::Detections => write!(f, "detections"),
            EmptyInputKind::GroundTruth => write!(f, "ground truth"),
        }
    }
}

/// Fusion engine error
#[derive(Debug, Error)]
pub enum FusionError {
    /// Unreadable tile or raster window
    #[error("Read failure: {0}")]
    ReadFailure(String),

    /// Degenerate or invalid geometry (empty polygon, out-of-range point)
    #[error("Geometry error: {0}")]
    GeometryError(String),

    /// A contextual layer is entirely absent
    #[error("Missing layer: {0}")]
    MissingLayer(String),

    /// CRS transform failure
    #[error("Projection error: {0}")]
    ProjectionError(String),

    /// Nothing to fuse
    #[error("Empty input: no {kind} available to fuse")]
    EmptyInput { kind: EmptyInputKind },

    /// External detector failed on one window
    #[error("Detector error: {0}")]
    Detector(String),

    /// Ground-truth inventory failed to load
    #[error("Source '{source_name}' failed to load: {message}")]
    SourceLoad { source_name: String, message: String },

    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] polesight_common::Error),

    /// A worker task panicked or was cancelled
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FusionError {
    /// True for errors that abort the whole run
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FusionError::EmptyInput { .. } | FusionError::Config(_) | FusionError::Internal(_)
        )
    }
}

/// Result type for fusion operations
pub type Result<T> = std::result::Result<T, FusionError>;
