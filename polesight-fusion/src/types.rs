//! Core domain types for the fusion engine
//!
//! Entity lifecycle:
//! - [`Detection`]: created by the tile scanner, enriched once by the context
//!   annotator, immutable afterwards (may be dropped by the plausibility filter)
//! - [`GroundTruthAsset`]: supplied by inventories, read-only within a run
//! - [`MatchedRecord`]: produced once per run by matching + scoring
//! - [`ClassifiedAsset`]: terminal output of the classifier

use crate::geodesy::GeoPoint;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

// ============================================================================
// Context attributes
// ============================================================================

/// A context attribute that is either measured or unknown
///
/// Unknown means the layer or band needed to measure it was absent or could not
/// be sampled. It is never a failed check.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum Observation<T> {
    #[default]
    Unknown,
    Measured(T),
}

impl<T: Copy> Observation<T> {
    pub fn measured(&self) -> Option<T> {
        match self {
            Observation::Measured(v) => Some(*v),
            Observation::Unknown => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Observation::Measured(_))
    }
}

impl<T> From<Option<T>> for Observation<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Observation::Measured(v),
            None => Observation::Unknown,
        }
    }
}

/// Contextual attributes attached by the context annotator
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ContextAttributes {
    /// Normalized difference vegetation index at the detection pixel
    pub ndvi: Observation<f64>,
    /// Distance to the nearest road (metres)
    pub road_distance_m: Observation<f64>,
    /// Surface elevation at the detection point (metres)
    pub surface_elevation_m: Observation<f64>,
    /// Centre elevation minus the local ground estimate (metres)
    pub height_above_ground_m: Observation<f64>,
    /// Inside (or within the buffer of) a water polygon
    pub in_water: Observation<bool>,
}

// ============================================================================
// Reason codes
// ============================================================================

/// Named reasons attached by the plausibility filter and the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    RoadDistanceExceeded,
    NdviOutOfRange,
    InWaterPolygon,
    SurfaceElevBelowFloor,
    HeightAboveGroundTooLow,
    LowConfidence,
    MatchDistanceExceeded,
    InsufficientCorroboration,
    ContestedMatch,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::RoadDistanceExceeded => "road_distance_exceeded",
            ReasonCode::NdviOutOfRange => "ndvi_out_of_range",
            ReasonCode::InWaterPolygon => "in_water_polygon",
            ReasonCode::SurfaceElevBelowFloor => "surface_elev_below_floor",
            ReasonCode::HeightAboveGroundTooLow => "height_above_ground_too_low",
            ReasonCode::LowConfidence => "low_confidence",
            ReasonCode::MatchDistanceExceeded => "match_distance_exceeded",
            ReasonCode::InsufficientCorroboration => "insufficient_corroboration",
            ReasonCode::ContestedMatch => "contested_match",
        }
    }

    /// True for codes produced by the plausibility filter
    pub fn is_plausibility(&self) -> bool {
        matches!(
            self,
            ReasonCode::RoadDistanceExceeded
                | ReasonCode::NdviOutOfRange
                | ReasonCode::InWaterPolygon
                | ReasonCode::SurfaceElevBelowFloor
                | ReasonCode::HeightAboveGroundTooLow
        )
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Detections
// ============================================================================

/// Axis-aligned pixel bounding box `[x_min, y_min, x_max, y_max]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

impl BoundingBox {
    pub fn new(x_min: f64, y_min: f64, x_max: f64, y_max: f64) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    pub fn center(&self) -> PixelCoord {
        PixelCoord {
            x: (self.x_min + self.x_max) / 2.0,
            y: (self.y_min + self.y_max) / 2.0,
        }
    }

    pub fn translate(&self, dx: f64, dy: f64) -> Self {
        Self::new(self.x_min + dx, self.y_min + dy, self.x_max + dx, self.y_max + dy)
    }

    pub fn is_valid(&self) -> bool {
        [self.x_min, self.y_min, self.x_max, self.y_max]
            .iter()
            .all(|v| v.is_finite())
            && self.x_max > self.x_min
            && self.y_max > self.y_min
    }
}

/// Continuous tile-global pixel coordinate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelCoord {
    pub x: f64,
    pub y: f64,
}

/// A detected pole candidate, geo-referenced and (after annotation) enriched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Deterministic id derived from tile id and pixel centre
    pub id: Uuid,
    pub location: GeoPoint,
    /// Tile-global pixel centre of the bounding box
    pub pixel: PixelCoord,
    /// Tile-global bounding box
    pub bbox: BoundingBox,
    /// Detector confidence; `None` when the detector did not report one
    pub confidence: Option<f32>,
    pub class_label: String,
    /// Owning tile
    pub tile_id: String,
    pub context: ContextAttributes,
    /// Plausibility violations (only non-empty in lenient mode or for dropped detections)
    pub filter_reasons: Vec<ReasonCode>,
}

impl Detection {
    /// Deterministic detection id for a tile and pixel centre
    pub fn derive_id(tile_id: &str, pixel: &PixelCoord) -> Uuid {
        let key = format!("{}:{:.2}:{:.2}", tile_id, pixel.x, pixel.y);
        Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes())
    }

    pub fn passes_plausibility(&self) -> bool {
        self.filter_reasons.is_empty()
    }
}

// ============================================================================
// Ground truth
// ============================================================================

/// A previously known asset location from an external inventory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundTruthAsset {
    /// Identifier, unique within its source
    pub id: String,
    pub location: GeoPoint,
    pub inspection_date: Option<NaiveDate>,
    pub status: Option<String>,
    /// Source tag (inventory identifier)
    pub source: String,
}

impl GroundTruthAsset {
    /// Identifier unique across sources
    pub fn qualified_id(&self) -> String {
        format!("{}:{}", self.source, self.id)
    }

    /// Age in fractional years at `reference_date` (future dates count as zero)
    pub fn age_years(&self, reference_date: NaiveDate) -> Option<f64> {
        self.inspection_date.map(|date| {
            let days = (reference_date - date).num_days().max(0);
            days as f64 / 365.25
        })
    }
}

// ============================================================================
// Matching and classification
// ============================================================================

/// Distance between the two sides of a record, or explicitly unmatched
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "meters", rename_all = "snake_case")]
pub enum MatchDistance {
    Unmatched,
    Meters(f64),
}

impl MatchDistance {
    pub fn meters(&self) -> Option<f64> {
        match self {
            MatchDistance::Meters(m) => Some(*m),
            MatchDistance::Unmatched => None,
        }
    }
}

/// A detection paired with a ground-truth asset (at least one side present)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedRecord {
    pub detection: Option<Detection>,
    pub ground_truth: Option<GroundTruthAsset>,
    /// Assets from other inventories absorbed as corroboration
    pub corroborating_assets: Vec<GroundTruthAsset>,
    pub distance: MatchDistance,
    /// A single-sided record whose other-side candidate within cutoff was taken
    /// by a closer pair
    pub contested: bool,
    pub recency_weight: f64,
    pub proximity_score: f64,
    pub combined_confidence: f64,
}

impl MatchedRecord {
    /// Which sides are present
    pub fn provenance(&self) -> Provenance {
        match (&self.detection, &self.ground_truth) {
            (Some(_), Some(_)) => Provenance::Matched,
            (Some(_), None) => Provenance::DetectionOnly,
            _ => Provenance::GroundTruthOnly,
        }
    }

    pub fn is_single_sided(&self) -> bool {
        self.provenance() != Provenance::Matched
    }

    /// Record identifier: detection id if present, else qualified ground-truth id
    pub fn record_id(&self) -> String {
        match (&self.detection, &self.ground_truth) {
            (Some(d), _) => d.id.to_string(),
            (None, Some(g)) => g.qualified_id(),
            (None, None) => String::new(),
        }
    }

    /// Anchor location: the detection when present, else the ground truth
    pub fn location(&self) -> Option<GeoPoint> {
        self.detection
            .as_ref()
            .map(|d| d.location)
            .or_else(|| self.ground_truth.as_ref().map(|g| g.location))
    }

    /// Every ground-truth asset attached to this record
    pub fn ground_truth_assets(&self) -> impl Iterator<Item = &GroundTruthAsset> {
        self.ground_truth.iter().chain(self.corroborating_assets.iter())
    }
}

/// Which sides of a match exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Matched,
    /// Likely an uncatalogued asset
    DetectionOnly,
    /// Likely a missed or removed asset
    GroundTruthOnly,
}

/// Verification tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    Unclassified,
    Verified,
    Review,
    NewOrMissing,
}

impl Tier {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Tier::Unclassified)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Unclassified => "Unclassified",
            Tier::Verified => "Verified",
            Tier::Review => "Review",
            Tier::NewOrMissing => "NewOrMissing",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal classifier output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedAsset {
    pub id: String,
    pub location: GeoPoint,
    pub record: MatchedRecord,
    pub tier: Tier,
    pub review_reasons: BTreeSet<ReasonCode>,
    pub corroborating_sources: BTreeSet<String>,
    /// Uncertainty priority for Review records (higher = review first)
    pub review_priority: Option<f64>,
    /// 1-based rank among Review records
    pub review_rank: Option<usize>,
}

impl ClassifiedAsset {
    pub fn combined_confidence(&self) -> f64 {
        self.record.combined_confidence
    }

    pub fn provenance(&self) -> Provenance {
        self.record.provenance()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observation_from_option() {
        let known: Observation<f64> = Some(3.5).into();
        let unknown: Observation<f64> = None.into();
        assert_eq!(known.measured(), Some(3.5));
        assert!(!unknown.is_known());
    }

    #[test]
    fn test_detection_id_is_deterministic() {
        let pixel = PixelCoord { x: 120.5, y: 88.0 };
        assert_eq!(
            Detection::derive_id("tile_a", &pixel),
            Detection::derive_id("tile_a", &pixel)
        );
        assert_ne!(
            Detection::derive_id("tile_a", &pixel),
            Detection::derive_id("tile_b", &pixel)
        );
    }

    #[test]
    fn test_age_years_clamps_future_dates() {
        let asset = GroundTruthAsset {
            id: "P-1".to_string(),
            location: GeoPoint::new(0.0, 0.0).unwrap(),
            inspection_date: NaiveDate::from_ymd_opt(2025, 6, 1),
            status: None,
            source: "utility".to_string(),
        };
        let before = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let after = NaiveDate::from_ymd_opt(2026, 6, 1).unwrap();
        assert_eq!(asset.age_years(before), Some(0.0));
        let age = asset.age_years(after).unwrap();
        assert!((age - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_reason_code_serializes_snake_case() {
        let json = serde_json::to_string(&ReasonCode::RoadDistanceExceeded).unwrap();
        assert_eq!(json, "\"road_distance_exceeded\"");
        assert_eq!(ReasonCode::InWaterPolygon.to_string(), "in_water_polygon");
    }

    #[test]
    fn test_only_unclassified_is_not_terminal() {
        assert!(!Tier::Unclassified.is_terminal());
        assert!(Tier::Verified.is_terminal());
        assert!(Tier::Review.is_terminal());
        assert!(Tier::NewOrMissing.is_terminal());
    }
}
