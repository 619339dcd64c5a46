//! Detection stage
//!
//! # Components
//! 1. **scanner** - sliding-window candidate generation per tile
//! 2. **georef** - pixel ↔ geographic conversion with calibration offset
//! 3. **dedup** - per-tile duplicate suppression
//! 4. **pipeline** - per-tile composition with annotation and filtering, parallel across tiles

pub mod dedup;
pub mod georef;
pub mod pipeline;
pub mod scanner;

pub use dedup::DetectionDeduplicator;
pub use georef::GeoReferencer;
pub use pipeline::{area_of_interest, DetectionBatch, DetectionPipeline, TileReport};
pub use scanner::{Candidate, ScanIter, ScanStats, TileScanner};
