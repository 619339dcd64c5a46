//! Tier classifier
//!
//! Every record starts `Unclassified` and moves to exactly one terminal tier.
//! Rules are evaluated in order:
//!
//! 1. **Verified**: ≥ 2 corroborating sources, plausibility passes, combined
//!    confidence ≥ threshold, match distance < max
//! 2. **NewOrMissing**: one side only, no contested candidate on the other
//!    side within cutoff, and no plausibility violations
//! 3. **Review**: everything else, with every failing reason attached
//!
//! Review records carry an uncertainty priority
//! `0.5·(1 − confidence) + 0.3·normalized distance + 0.2·(1 − recency)` and are
//! ranked by descending priority (ties by id), rank 1 first.

use crate::types::{ClassifiedAsset, MatchedRecord, ReasonCode, Tier};
use polesight_common::config::ClassifierConfig;
use std::collections::BTreeSet;

const PRIORITY_CONFIDENCE_WEIGHT: f64 = 0.5;
const PRIORITY_DISTANCE_WEIGHT: f64 = 0.3;
const PRIORITY_STALENESS_WEIGHT: f64 = 0.2;

pub struct Classifier {
    config: ClassifierConfig,
    /// Matcher cutoff, used to normalize match distance
    max_match_distance_m: f64,
}

impl Classifier {
    pub fn new(config: ClassifierConfig, max_match_distance_m: f64) -> Self {
        Self {
            config,
            max_match_distance_m,
        }
    }

    /// Source identifiers supporting a record
    pub fn corroborating_sources(&self, record: &MatchedRecord) -> BTreeSet<String> {
        let mut sources: BTreeSet<String> = record
            .ground_truth_assets()
            .map(|a| a.source.clone())
            .collect();
        if record.detection.is_some() {
            sources.insert(self.config.detection_source.clone());
        }
        sources
    }

    /// Classify one record; `None` for a record with neither side present
    pub fn classify(&self, record: MatchedRecord) -> Option<ClassifiedAsset> {
        let location = record.location()?;
        let sources = self.corroborating_sources(&record);
        let plausibility_reasons: Vec<ReasonCode> = record
            .detection
            .as_ref()
            .map(|d| d.filter_reasons.clone())
            .unwrap_or_default();
        let confidence = record.combined_confidence;
        let distance_ok = record
            .distance
            .meters()
            .is_some_and(|d| d < self.config.verified_max_distance_m);

        let verified = sources.len() >= 2
            && plausibility_reasons.is_empty()
            && confidence >= self.config.verified_threshold
            && distance_ok;

        let (tier, review_reasons, review_priority) = if verified {
            (Tier::Verified, BTreeSet::new(), None)
        } else if record.is_single_sided() && !record.contested && plausibility_reasons.is_empty() {
            (Tier::NewOrMissing, BTreeSet::new(), None)
        } else {
            let mut reasons: BTreeSet<ReasonCode> = plausibility_reasons.into_iter().collect();
            if confidence < self.config.verified_threshold {
                reasons.insert(ReasonCode::LowConfidence);
            }
            if !distance_ok {
                reasons.insert(ReasonCode::MatchDistanceExceeded);
            }
            if sources.len() < 2 {
                reasons.insert(ReasonCode::InsufficientCorroboration);
            }
            if record.contested {
                reasons.insert(ReasonCode::ContestedMatch);
            }
            (Tier::Review, reasons, Some(self.review_priority(&record)))
        };

        Some(ClassifiedAsset {
            id: record.record_id(),
            location,
            record,
            tier,
            review_reasons,
            corroborating_sources: sources,
            review_priority,
            review_rank: None,
        })
    }

    /// Uncertainty priority (higher = review first)
    pub fn review_priority(&self, record: &MatchedRecord) -> f64 {
        let normalized_distance = match record.distance.meters() {
            Some(d) if self.max_match_distance_m > 0.0 => (d / self.max_match_distance_m).min(1.0),
            Some(_) => 0.0,
            None => 1.0,
        };
        PRIORITY_CONFIDENCE_WEIGHT * (1.0 - record.combined_confidence)
            + PRIORITY_DISTANCE_WEIGHT * normalized_distance
            + PRIORITY_STALENESS_WEIGHT * (1.0 - record.recency_weight)
    }

    /// Classify every record and rank the Review tier
    pub fn classify_all(&self, records: Vec<MatchedRecord>) -> Vec<ClassifiedAsset> {
        let mut assets: Vec<ClassifiedAsset> =
            records.into_iter().filter_map(|r| self.classify(r)).collect();
        assign_review_ranks(&mut assets);
        assets
    }
}

fn assign_review_ranks(assets: &mut [ClassifiedAsset]) {
    let mut review: Vec<usize> = (0..assets.len())
        .filter(|&i| assets[i].tier == Tier::Review)
        .collect();
    review.sort_by(|&x, &y| {
        let px = assets[x].review_priority.unwrap_or(0.0);
        let py = assets[y].review_priority.unwrap_or(0.0);
        py.total_cmp(&px).then_with(|| assets[x].id.cmp(&assets[y].id))
    });
    for (rank, i) in review.into_iter().enumerate() {
        assets[i].review_rank = Some(rank + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geodesy::GeoPoint;
    use crate::types::{
        BoundingBox, ContextAttributes, Detection, GroundTruthAsset, MatchDistance, PixelCoord,
    };

    fn detection(x: f64, reasons: Vec<ReasonCode>) -> Detection {
        let pixel = PixelCoord { x, y: 0.0 };
        Detection {
            id: Detection::derive_id("t", &pixel),
            location: GeoPoint::new(1.0, 1.0).unwrap(),
            pixel,
            bbox: BoundingBox::new(x - 1.0, -1.0, x + 1.0, 1.0),
            confidence: Some(0.9),
            class_label: "pole".to_string(),
            tile_id: "t".to_string(),
            context: ContextAttributes::default(),
            filter_reasons: reasons,
        }
    }

    fn asset(id: &str) -> GroundTruthAsset {
        GroundTruthAsset {
            id: id.to_string(),
            location: GeoPoint::new(1.0, 1.0).unwrap(),
            inspection_date: None,
            status: None,
            source: "ground_truth_inventory".to_string(),
        }
    }

    fn record(
        detection: Option<Detection>,
        gt: Option<GroundTruthAsset>,
        distance: MatchDistance,
        confidence: f64,
    ) -> MatchedRecord {
        MatchedRecord {
            detection,
            ground_truth: gt,
            corroborating_assets: Vec::new(),
            distance,
            contested: false,
            recency_weight: 1.0,
            proximity_score: 1.0,
            combined_confidence: confidence,
        }
    }

    fn classifier() -> Classifier {
        Classifier::new(ClassifierConfig::default(), 10.0)
    }

    #[test]
    fn test_corroborated_confident_match_is_verified() {
        let asset = classifier()
            .classify(record(
                Some(detection(1.0, vec![])),
                Some(asset("P1")),
                MatchDistance::Meters(1.5),
                0.96,
            ))
            .unwrap();
        assert_eq!(asset.tier, Tier::Verified);
        assert!(asset.review_reasons.is_empty());
        assert_eq!(asset.corroborating_sources.len(), 2);
    }

    #[test]
    fn test_lone_ground_truth_is_new_or_missing() {
        let asset = classifier()
            .classify(record(None, Some(asset("P9")), MatchDistance::Unmatched, 0.06))
            .unwrap();
        assert_eq!(asset.tier, Tier::NewOrMissing);
        assert_eq!(
            asset.corroborating_sources,
            BTreeSet::from(["ground_truth_inventory".to_string()])
        );
        assert_eq!(asset.id, "ground_truth_inventory:P9");
    }

    #[test]
    fn test_weak_match_goes_to_review_with_reasons() {
        let asset = classifier()
            .classify(record(
                Some(detection(2.0, vec![ReasonCode::NdviOutOfRange])),
                Some(asset("P2")),
                MatchDistance::Meters(7.0),
                0.5,
            ))
            .unwrap();
        assert_eq!(asset.tier, Tier::Review);
        assert_eq!(
            asset.review_reasons,
            BTreeSet::from([
                ReasonCode::NdviOutOfRange,
                ReasonCode::LowConfidence,
                ReasonCode::MatchDistanceExceeded,
            ])
        );
    }

    #[test]
    fn test_contested_single_side_goes_to_review() {
        let mut contested = record(Some(detection(3.0, vec![])), None, MatchDistance::Unmatched, 0.4);
        contested.contested = true;
        let asset = classifier().classify(contested).unwrap();
        assert_eq!(asset.tier, Tier::Review);
        assert!(asset.review_reasons.contains(&ReasonCode::ContestedMatch));
        assert!(asset.review_reasons.contains(&ReasonCode::InsufficientCorroboration));
    }

    #[test]
    fn test_flagged_lone_detection_goes_to_review() {
        let asset = classifier()
            .classify(record(
                Some(detection(6.0, vec![ReasonCode::InWaterPolygon])),
                None,
                MatchDistance::Unmatched,
                0.95,
            ))
            .unwrap();
        assert_eq!(asset.tier, Tier::Review);
        assert!(asset.review_reasons.contains(&ReasonCode::InWaterPolygon));
        assert!(asset.review_reasons.contains(&ReasonCode::InsufficientCorroboration));
        assert!(asset.review_priority.is_some());
    }

    #[test]
    fn test_clean_lone_detection_is_new_or_missing() {
        let asset = classifier()
            .classify(record(Some(detection(7.0, vec![])), None, MatchDistance::Unmatched, 0.95))
            .unwrap();
        assert_eq!(asset.tier, Tier::NewOrMissing);
        assert!(asset.review_reasons.is_empty());
    }

    #[test]
    fn test_review_ranked_most_uncertain_first() {
        let confident = record(
            Some(detection(4.0, vec![])),
            Some(asset("A")),
            MatchDistance::Meters(6.0),
            0.7,
        );
        let shaky = record(
            Some(detection(5.0, vec![])),
            Some(asset("B")),
            MatchDistance::Meters(9.0),
            0.3,
        );
        let assets = classifier().classify_all(vec![confident, shaky]);
        assert_eq!(assets[0].review_rank, Some(2));
        assert_eq!(assets[1].review_rank, Some(1));
        assert!(assets[1].review_priority > assets[0].review_priority);
    }
}
