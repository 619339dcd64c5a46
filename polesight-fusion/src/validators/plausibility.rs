//! Plausibility Filter
//!
//! Rejects detections whose spatial context makes a real pole unlikely.
//!
//! # Rules
//! 1. **road_distance_exceeded**: nearest road farther than the configured max
//! 2. **ndvi_out_of_range**: vegetation index outside `[ndvi_min, ndvi_max]`
//!    (water and dense canopy false positives)
//! 3. **in_water_polygon**: inside or within the buffer of a water polygon
//! 4. **surface_elev_below_floor**: surface elevation below the floor
//! 5. **height_above_ground_too_low**: shorter than a plausible pole
//!
//! An unknown attribute never triggers its rule. Detector confidence is not an
//! input: contextual violations are never overridden by a confident detector.
//!
//! # Modes
//! - Strict: any violation drops the detection
//! - Lenient: violations are kept on the detection for downstream review

use crate::types::{Detection, Observation, ReasonCode};
use polesight_common::config::FilterConfig;
use tracing::debug;

/// Result of filtering one detection
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOutcome {
    Accepted(Detection),
    /// Terminally dropped; `filter_reasons` lists the violated rules
    Dropped(Detection),
}

impl FilterOutcome {
    pub fn is_dropped(&self) -> bool {
        matches!(self, FilterOutcome::Dropped(_))
    }

    pub fn into_detection(self) -> Detection {
        match self {
            FilterOutcome::Accepted(d) | FilterOutcome::Dropped(d) => d,
        }
    }
}

pub struct PlausibilityFilter {
    config: FilterConfig,
}

impl PlausibilityFilter {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    /// Violated rules for `detection`, in rule order
    pub fn violations(&self, detection: &Detection) -> Vec<ReasonCode> {
        let ctx = &detection.context;
        let cfg = &self.config;
        let mut reasons = Vec::new();

        if let Observation::Measured(d) = ctx.road_distance_m {
            if d > cfg.max_road_distance_m {
                reasons.push(ReasonCode::RoadDistanceExceeded);
            }
        }
        if let Observation::Measured(ndvi) = ctx.ndvi {
            if ndvi < cfg.ndvi_min || ndvi > cfg.ndvi_max {
                reasons.push(ReasonCode::NdviOutOfRange);
            }
        }
        if ctx.in_water == Observation::Measured(true) {
            reasons.push(ReasonCode::InWaterPolygon);
        }
        if let Observation::Measured(z) = ctx.surface_elevation_m {
            if z < cfg.min_surface_elevation_m {
                reasons.push(ReasonCode::SurfaceElevBelowFloor);
            }
        }
        if let Observation::Measured(h) = ctx.height_above_ground_m {
            if h < cfg.min_height_above_ground_m {
                reasons.push(ReasonCode::HeightAboveGroundTooLow);
            }
        }
        reasons
    }

    pub fn apply(&self, mut detection: Detection) -> FilterOutcome {
        let reasons = self.violations(&detection);
        if reasons.is_empty() {
            return FilterOutcome::Accepted(detection);
        }

        debug!(
            detection = %detection.id,
            tile_id = %detection.tile_id,
            reasons = ?reasons,
            strict = self.config.strict,
            "Plausibility rules violated"
        );
        detection.filter_reasons = reasons;
        if self.config.strict {
            FilterOutcome::Dropped(detection)
        } else {
            FilterOutcome::Accepted(detection)
        }
    }
}
