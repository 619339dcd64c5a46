//! Run statistics
//!
//! **Purpose:** aggregate counts and distributions over one fusion run so a
//! caller can judge how much of the output to trust.

use crate::types::{ClassifiedAsset, Detection, Provenance, Tier};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-category failure counts for a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureCounts {
    pub tiles_failed: usize,
    pub windows_failed: usize,
    pub detector_failures: usize,
    pub projection_failures: usize,
    pub geometry_errors: usize,
    /// Inventory rows dropped as invalid
    pub records_rejected: usize,
    /// Names of absent context layers
    pub missing_layers: Vec<String>,
    /// Names of inventories that failed to load
    pub sources_failed: Vec<String>,
}

impl FailureCounts {
    /// True when any tile, window, record, layer or source was lost
    pub fn is_degraded(&self) -> bool {
        self.tiles_failed > 0
            || self.windows_failed > 0
            || self.detector_failures > 0
            || self.projection_failures > 0
            || self.geometry_errors > 0
            || self.records_rejected > 0
            || !self.missing_layers.is_empty()
            || !self.sources_failed.is_empty()
    }

    pub fn display_string(&self) -> String {
        format!(
            "{} tiles failed, {} windows failed, {} detector failures, {} projection failures, \
             {} geometry errors, {} records rejected, missing layers [{}], failed sources [{}]",
            self.tiles_failed,
            self.windows_failed,
            self.detector_failures,
            self.projection_failures,
            self.geometry_errors,
            self.records_rejected,
            self.missing_layers.join(", "),
            self.sources_failed.join(", ")
        )
    }
}

/// Match-distance distribution over matched records (metres)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DistanceStats {
    pub matched: usize,
    pub p50: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
    pub max: Option<f64>,
}

impl DistanceStats {
    pub fn from_distances(mut distances: Vec<f64>) -> Self {
        distances.sort_by(f64::total_cmp);
        Self {
            matched: distances.len(),
            p50: percentile(&distances, 50.0),
            p90: percentile(&distances, 90.0),
            p95: percentile(&distances, 95.0),
            max: distances.last().copied(),
        }
    }
}

/// Aggregate output statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total_assets: usize,
    pub verified: usize,
    pub review: usize,
    pub new_or_missing: usize,
    /// NewOrMissing with detection only (likely uncatalogued)
    pub new_detection_only: usize,
    /// NewOrMissing with ground truth only (likely missed or removed)
    pub missing_ground_truth_only: usize,
    pub mean_confidence: Option<f64>,
    pub median_confidence: Option<f64>,
    pub distance: DistanceStats,
    /// Detections dropped by the plausibility filter
    pub filtered_detections: usize,
    pub filtered_by_reason: BTreeMap<String, usize>,
    pub sources_loaded: Vec<String>,
}

impl Summary {
    pub fn from_run(assets: &[ClassifiedAsset], filtered: &[Detection], sources_loaded: Vec<String>) -> Self {
        let mut summary = Summary {
            total_assets: assets.len(),
            filtered_detections: filtered.len(),
            sources_loaded,
            ..Summary::default()
        };

        for asset in assets {
            match asset.tier {
                Tier::Verified => summary.verified += 1,
                Tier::Review => summary.review += 1,
                Tier::NewOrMissing => {
                    summary.new_or_missing += 1;
                    match asset.provenance() {
                        Provenance::DetectionOnly => summary.new_detection_only += 1,
                        Provenance::GroundTruthOnly => summary.missing_ground_truth_only += 1,
                        Provenance::Matched => {}
                    }
                }
                Tier::Unclassified => {}
            }
        }

        let mut confidences: Vec<f64> = assets.iter().map(|a| a.combined_confidence()).collect();
        confidences.sort_by(f64::total_cmp);
        if !confidences.is_empty() {
            summary.mean_confidence =
                Some(confidences.iter().sum::<f64>() / confidences.len() as f64);
            summary.median_confidence = Some(median_sorted(&confidences));
        }

        summary.distance = DistanceStats::from_distances(
            assets
                .iter()
                .filter_map(|a| a.record.distance.meters())
                .collect(),
        );

        for detection in filtered {
            for reason in &detection.filter_reasons {
                *summary
                    .filtered_by_reason
                    .entry(reason.as_str().to_string())
                    .or_insert(0) += 1;
            }
        }
        summary
    }

    pub fn display_string(&self) -> String {
        format!(
            "{} assets: {} verified, {} review, {} new/missing ({} new, {} missing), {} filtered",
            self.total_assets,
            self.verified,
            self.review,
            self.new_or_missing,
            self.new_detection_only,
            self.missing_ground_truth_only,
            self.filtered_detections
        )
    }
}

/// Nearest-rank percentile of sorted values
fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    Some(sorted[rank.clamp(1, sorted.len()) - 1])
}

fn median_sorted(sorted: &[f64]) -> f64 {
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearest_rank_percentiles() {
        let values: Vec<f64> = (1..=20).map(|v| v as f64).collect();
        let stats = DistanceStats::from_distances(values);
        assert_eq!(stats.matched, 20);
        assert_eq!(stats.p50, Some(10.0));
        assert_eq!(stats.p90, Some(18.0));
        assert_eq!(stats.p95, Some(19.0));
        assert_eq!(stats.max, Some(20.0));
    }

    #[test]
    fn test_empty_distances() {
        let stats = DistanceStats::from_distances(Vec::new());
        assert_eq!(stats, DistanceStats::default());
    }

    #[test]
    fn test_median() {
        assert_eq!(median_sorted(&[1.0, 2.0, 3.0]), 2.0);
        assert_eq!(median_sorted(&[1.0, 2.0, 3.0, 5.0]), 2.5);
    }

    #[test]
    fn test_degraded_when_anything_failed() {
        assert!(!FailureCounts::default().is_degraded());
        let counts = FailureCounts {
            sources_failed: vec!["survey".to_string()],
            ..FailureCounts::default()
        };
        assert!(counts.is_degraded());

        let rejected = FailureCounts {
            records_rejected: 2,
            ..FailureCounts::default()
        };
        assert!(rejected.is_degraded());
        assert!(rejected.display_string().contains("2 records rejected"));
    }
}
