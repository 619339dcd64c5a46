//! Confidence Scorer
//!
//! Combines detector confidence, ground-truth recency and match proximity into a
//! single score in [0, 1].
//!
//! # Scoring Algorithm
//! `combined = w_d·detector + w_r·recency + w_p·proximity`
//! (weights default to 0.40 / 0.30 / 0.30 and sum to one)
//!
//! # Recency (ground-truth age)
//! - < 1 year → 1.0
//! - < 3 years → 0.8
//! - < 5 years → 0.5
//! - otherwise → 0.2
//!
//! # Proximity
//! 1.0 up to the full-score radius, then linear decay to 0.0 at the match
//! cutoff. Unmatched records score 0.0.
//!
//! # Missing inputs
//! - No detector confidence → `default_detector_confidence` (0.0)
//! - No inspection date → `default_recency_weight` (0.2, the oldest bucket)

use crate::types::{MatchDistance, MatchedRecord};
use chrono::NaiveDate;
use polesight_common::config::{MatchingConfig, ScoringConfig};

pub struct ConfidenceScorer {
    scoring: ScoringConfig,
    matching: MatchingConfig,
}

impl ConfidenceScorer {
    pub fn new(scoring: ScoringConfig, matching: MatchingConfig) -> Self {
        Self { scoring, matching }
    }

    /// Weighted linear combination, clamped to [0, 1]
    pub fn score(&self, detector_confidence: Option<f64>, recency_weight: f64, proximity_score: f64) -> f64 {
        let detector = detector_confidence.unwrap_or(self.scoring.default_detector_confidence);
        let combined = self.scoring.detector_weight * detector
            + self.scoring.recency_weight * recency_weight
            + self.scoring.proximity_weight * proximity_score;
        combined.clamp(0.0, 1.0)
    }

    pub fn proximity_score(&self, distance: MatchDistance) -> f64 {
        let Some(d) = distance.meters() else {
            return 0.0;
        };
        let full = self.matching.proximity_full_score_m;
        let cutoff = self.matching.max_distance_m;
        if d <= full {
            1.0
        } else if d >= cutoff || cutoff <= full {
            0.0
        } else {
            1.0 - (d - full) / (cutoff - full)
        }
    }

    pub fn recency_weight(&self, age_years: Option<f64>) -> f64 {
        match age_years {
            None => self.scoring.default_recency_weight,
            Some(age) if age < 1.0 => 1.0,
            Some(age) if age < 3.0 => 0.8,
            Some(age) if age < 5.0 => 0.5,
            Some(_) => 0.2,
        }
    }

    /// Fill the record's recency, proximity and combined confidence
    ///
    /// Recency uses the freshest inspection date among the record's assets.
    pub fn score_record(&self, record: &mut MatchedRecord, reference_date: NaiveDate) {
        let freshest_age = record
            .ground_truth_assets()
            .filter_map(|a| a.age_years(reference_date))
            .min_by(f64::total_cmp);
        let detector = record
            .detection
            .as_ref()
            .and_then(|d| d.confidence)
            .map(|c| c as f64);

        record.recency_weight = self.recency_weight(freshest_age);
        record.proximity_score = self.proximity_score(record.distance);
        record.combined_confidence =
            self.score(detector, record.recency_weight, record.proximity_score);
    }
}
