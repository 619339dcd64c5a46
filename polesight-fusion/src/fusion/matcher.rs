//! Bidirectional nearest-neighbor matching in a shared metric frame
//!
//! # Algorithm
//! 1. Project both point sets into the [`LocalMetricFrame`]
//! 2. Index the B set in an R-tree
//! 3. Collect every A-B pair within the hard cutoff. This contains each
//!    point's nearest neighbor in both directions, plus the runners-up a point
//!    falls back to when its nearest partner is taken
//! 4. Resolve the candidates one-to-one, greedily by ascending distance (ties
//!    by A index, then B index)
//! 5. Emit every point exactly once: pairs, then A-only, then B-only
//!
//! A single-sided output that had any other-side point within the cutoff is
//! marked `contested`: every such point was assigned to a closer partner.

use crate::geodesy::{GeoPoint, LocalMetricFrame};
use crate::types::MatchDistance;
use rstar::primitives::GeomWithData;
use rstar::RTree;
use tracing::debug;

type IndexedPoint = GeomWithData<[f64; 2], usize>;

/// One output of [`SpatialMatcher::match_points`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchPair {
    pub a: Option<usize>,
    pub b: Option<usize>,
    pub distance: MatchDistance,
    pub contested: bool,
}

pub struct SpatialMatcher {
    frame: LocalMetricFrame,
    max_distance_m: f64,
}

impl SpatialMatcher {
    pub fn new(frame: LocalMetricFrame, max_distance_m: f64) -> Self {
        Self {
            frame,
            max_distance_m,
        }
    }

    pub fn frame(&self) -> &LocalMetricFrame {
        &self.frame
    }

    pub fn max_distance_m(&self) -> f64 {
        self.max_distance_m
    }

    /// Index of projected points, keyed by position in `points`
    pub fn index(&self, points: &[GeoPoint]) -> RTree<IndexedPoint> {
        RTree::bulk_load(
            points
                .iter()
                .enumerate()
                .map(|(i, p)| GeomWithData::new(self.frame.project(p), i))
                .collect(),
        )
    }

    pub fn match_points(&self, a: &[GeoPoint], b: &[GeoPoint]) -> Vec<MatchPair> {
        let a_xy: Vec<[f64; 2]> = a.iter().map(|p| self.frame.project(p)).collect();
        let b_xy: Vec<[f64; 2]> = b.iter().map(|p| self.frame.project(p)).collect();
        let b_index = self.index(b);
        let cutoff_2 = self.max_distance_m * self.max_distance_m;

        let mut a_has_candidate = vec![false; a.len()];
        let mut b_has_candidate = vec![false; b.len()];
        let mut candidates: Vec<(f64, usize, usize)> = Vec::new();

        for (i, xy) in a_xy.iter().enumerate() {
            for hit in b_index.locate_within_distance(*xy, cutoff_2) {
                let j = hit.data;
                let d = planar_distance(xy, &b_xy[j]);
                if d <= self.max_distance_m {
                    a_has_candidate[i] = true;
                    b_has_candidate[j] = true;
                    candidates.push((d, i, j));
                }
            }
        }
        candidates.sort_by(|x, y| x.0.total_cmp(&y.0).then(x.1.cmp(&y.1)).then(x.2.cmp(&y.2)));

        let mut a_partner: Vec<Option<(usize, f64)>> = vec![None; a.len()];
        let mut b_taken = vec![false; b.len()];
        for (d, i, j) in candidates {
            if a_partner[i].is_none() && !b_taken[j] {
                a_partner[i] = Some((j, d));
                b_taken[j] = true;
            }
        }

        let mut out = Vec::with_capacity(a.len() + b.len());
        let mut a_only = Vec::new();
        for (i, partner) in a_partner.iter().enumerate() {
            match partner {
                Some((j, d)) => out.push(MatchPair {
                    a: Some(i),
                    b: Some(*j),
                    distance: MatchDistance::Meters(*d),
                    contested: false,
                }),
                None => a_only.push(MatchPair {
                    a: Some(i),
                    b: None,
                    distance: MatchDistance::Unmatched,
                    contested: a_has_candidate[i],
                }),
            }
        }
        let matched = out.len();
        out.extend(a_only);
        out.extend(
            (0..b.len())
                .filter(|j| !b_taken[*j])
                .map(|j| MatchPair {
                    a: None,
                    b: Some(j),
                    distance: MatchDistance::Unmatched,
                    contested: b_has_candidate[j],
                }),
        );

        debug!(
            a = a.len(),
            b = b.len(),
            matched,
            single_sided = out.len() - matched,
            "Bidirectional match complete"
        );
        out
    }
}

pub(crate) fn planar_distance(a: &[f64; 2], b: &[f64; 2]) -> f64 {
    (a[0] - b[0]).hypot(a[1] - b[1])
}
