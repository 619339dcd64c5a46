//! Record assembly and multi-inventory corroboration
//!
//! Detections are matched against the union of every inventory in one pass.
//! Afterwards, ground-truth assets left unpaired may be absorbed by a nearby
//! record that already carries ground truth from a different source, so that
//! two inventories reporting the same pole end up in one record.
//!
//! # Absorption rules
//! - Only assets that ended up alone (ground-truth-only outputs) are absorbable
//! - The absorbing record must hold ground truth and no asset from the
//!   candidate's source; an absorbed record cannot absorb, and vice versa
//! - Candidates resolve greedily by ascending distance; on ties matched records
//!   absorb before ground-truth-only ones, then lower record index first

use super::matcher::{planar_distance, SpatialMatcher};
use crate::types::{Detection, GroundTruthAsset, MatchedRecord};
use rstar::primitives::GeomWithData;
use rstar::RTree;
use std::collections::BTreeSet;
use tracing::debug;

/// Match detections against ground truth and fold in cross-source corroboration
///
/// Returned records are unscored: weights and combined confidence are zero.
pub fn assemble_records(
    detections: &[Detection],
    assets: &[GroundTruthAsset],
    matcher: &SpatialMatcher,
) -> Vec<MatchedRecord> {
    let det_points: Vec<_> = detections.iter().map(|d| d.location).collect();
    let gt_points: Vec<_> = assets.iter().map(|a| a.location).collect();
    let pairs = matcher.match_points(&det_points, &gt_points);

    let mut records: Vec<MatchedRecord> = pairs
        .iter()
        .map(|pair| MatchedRecord {
            detection: pair.a.map(|i| detections[i].clone()),
            ground_truth: pair.b.map(|j| assets[j].clone()),
            corroborating_assets: Vec::new(),
            distance: pair.distance,
            contested: pair.contested,
            recency_weight: 0.0,
            proximity_score: 0.0,
            combined_confidence: 0.0,
        })
        .collect();

    absorb_corroboration(&mut records, matcher);
    records
}

fn absorb_corroboration(records: &mut Vec<MatchedRecord>, matcher: &SpatialMatcher) {
    let frame = matcher.frame();
    let cutoff = matcher.max_distance_m();

    // Absorbable: ground-truth-only records
    let lone: Vec<usize> = (0..records.len())
        .filter(|&r| records[r].detection.is_none() && records[r].ground_truth.is_some())
        .collect();
    if lone.is_empty() {
        return;
    }
    let lone_index: RTree<GeomWithData<[f64; 2], usize>> = RTree::bulk_load(
        lone.iter()
            .filter_map(|&r| {
                records[r]
                    .ground_truth
                    .as_ref()
                    .map(|g| GeomWithData::new(frame.project(&g.location), r))
            })
            .collect(),
    );

    // (distance, absorber is ground-truth-only, absorber, absorbed)
    let mut candidates: Vec<(f64, bool, usize, usize)> = Vec::new();
    for (r, record) in records.iter().enumerate() {
        let Some(gt) = record.ground_truth.as_ref() else {
            continue;
        };
        let anchor = match record.location() {
            Some(p) => frame.project(&p),
            None => continue,
        };
        for hit in lone_index.locate_within_distance(anchor, cutoff * cutoff) {
            let other = hit.data;
            if other == r {
                continue;
            }
            let Some(other_gt) = records[other].ground_truth.as_ref() else {
                continue;
            };
            if other_gt.source == gt.source {
                continue;
            }
            candidates.push((
                planar_distance(&anchor, hit.geom()),
                record.detection.is_none(),
                r,
                other,
            ));
        }
    }
    candidates.sort_by(|x, y| {
        x.0.total_cmp(&y.0)
            .then(x.1.cmp(&y.1))
            .then(x.2.cmp(&y.2))
            .then(x.3.cmp(&y.3))
    });

    let mut absorbed = vec![false; records.len()];
    let mut absorber = vec![false; records.len()];
    let mut sources: Vec<BTreeSet<String>> = records
        .iter()
        .map(|r| r.ground_truth_assets().map(|a| a.source.clone()).collect())
        .collect();

    for (distance, _, r, other) in candidates {
        if absorbed[r] || absorbed[other] || absorber[other] {
            continue;
        }
        let Some(asset) = records[other].ground_truth.clone() else {
            continue;
        };
        if sources[r].contains(&asset.source) {
            continue;
        }
        debug!(
            record = %records[r].record_id(),
            absorbed = %asset.qualified_id(),
            distance_m = distance,
            "Corroborating asset absorbed"
        );
        sources[r].insert(asset.source.clone());
        records[r].corroborating_assets.push(asset);
        absorbed[other] = true;
        absorber[r] = true;
    }

    let mut keep = absorbed.iter().map(|a| !a);
    records.retain(|_| keep.next().unwrap_or(true));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geodesy::{GeoPoint, LocalMetricFrame};
    use crate::types::{BoundingBox, ContextAttributes, PixelCoord, Provenance};

    fn origin() -> GeoPoint {
        GeoPoint::new(35.0, 139.0).unwrap()
    }

    fn detection(east: f64) -> Detection {
        let pixel = PixelCoord { x: east, y: 0.0 };
        Detection {
            id: Detection::derive_id("t", &pixel),
            location: origin().offset_m(east, 0.0).unwrap(),
            pixel,
            bbox: BoundingBox::new(east - 1.0, -1.0, east + 1.0, 1.0),
            confidence: Some(0.9),
            class_label: "pole".to_string(),
            tile_id: "t".to_string(),
            context: ContextAttributes::default(),
            filter_reasons: Vec::new(),
        }
    }

    fn asset(id: &str, source: &str, east: f64) -> GroundTruthAsset {
        GroundTruthAsset {
            id: id.to_string(),
            location: origin().offset_m(east, 0.0).unwrap(),
            inspection_date: None,
            status: None,
            source: source.to_string(),
        }
    }

    fn matcher() -> SpatialMatcher {
        SpatialMatcher::new(LocalMetricFrame::centered_on(origin()), 10.0)
    }

    #[test]
    fn test_second_inventory_absorbed_into_match() {
        let records = assemble_records(
            &[detection(0.0)],
            &[asset("U1", "utility", 1.0), asset("S1", "survey", 2.0)],
            &matcher(),
        );
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].provenance(), Provenance::Matched);
        assert_eq!(records[0].ground_truth.as_ref().unwrap().id, "U1");
        assert_eq!(records[0].corroborating_assets[0].id, "S1");
    }

    #[test]
    fn test_same_source_not_absorbed() {
        let records = assemble_records(
            &[detection(0.0)],
            &[asset("U1", "utility", 1.0), asset("U2", "utility", 2.0)],
            &matcher(),
        );
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].provenance(), Provenance::GroundTruthOnly);
    }

    #[test]
    fn test_ground_truth_only_records_corroborate_each_other() {
        let records = assemble_records(
            &[detection(100.0)],
            &[asset("U1", "utility", 0.0), asset("S1", "survey", 3.0)],
            &matcher(),
        );
        let gt_only: Vec<_> = records
            .iter()
            .filter(|r| r.provenance() == Provenance::GroundTruthOnly)
            .collect();
        assert_eq!(gt_only.len(), 1);
        assert_eq!(gt_only[0].ground_truth_assets().count(), 2);
    }
}
