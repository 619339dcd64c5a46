//! Per-tile duplicate suppression
//!
//! Detections are offered in scan order; a detection survives only when no
//! previously accepted detection lies within the threshold. Accepted points are
//! held in an incrementally built R-tree in a planar metre grid derived from
//! meters-per-degree at the tile's reference latitude.

use crate::geodesy::{meters_per_degree, GeoPoint};
use crate::types::Detection;
use rstar::primitives::GeomWithData;
use rstar::RTree;
use tracing::debug;

type IndexedPoint = GeomWithData<[f64; 2], usize>;

pub struct DetectionDeduplicator {
    threshold_m: f64,
    m_per_deg_lat: f64,
    m_per_deg_lon: f64,
    index: RTree<IndexedPoint>,
    accepted: Vec<Detection>,
    duplicates: usize,
}

impl DetectionDeduplicator {
    /// Deduplicator for one tile whose detections lie near `reference_lat`
    pub fn new(threshold_m: f64, reference_lat: f64) -> Self {
        let (m_per_deg_lat, m_per_deg_lon) = meters_per_degree(reference_lat);
        Self {
            threshold_m,
            m_per_deg_lat,
            m_per_deg_lon,
            index: RTree::new(),
            accepted: Vec::new(),
            duplicates: 0,
        }
    }

    fn planar(&self, point: &GeoPoint) -> [f64; 2] {
        [point.lon * self.m_per_deg_lon, point.lat * self.m_per_deg_lat]
    }

    /// Offer a detection; returns `true` when it was accepted
    pub fn offer(&mut self, detection: Detection) -> bool {
        let xy = self.planar(&detection.location);
        if let Some(nearest) = self.index.nearest_neighbor(&xy) {
            let other = nearest.geom();
            let distance = (other[0] - xy[0]).hypot(other[1] - xy[1]);
            if distance < self.threshold_m {
                debug!(
                    tile_id = %detection.tile_id,
                    detection = %detection.id,
                    kept = %self.accepted[nearest.data].id,
                    distance_m = distance,
                    "Duplicate detection suppressed"
                );
                self.duplicates += 1;
                return false;
            }
        }
        self.index.insert(GeomWithData::new(xy, self.accepted.len()));
        self.accepted.push(detection);
        true
    }

    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    pub fn into_accepted(self) -> Vec<Detection> {
        self.accepted
    }
}

/// Deduplicate one tile's detections in their given order
///
/// Returns the survivors and the number of suppressed duplicates. The
/// reference latitude is taken from the first detection.
pub fn deduplicate(detections: Vec<Detection>, threshold_m: f64) -> (Vec<Detection>, usize) {
    let Some(reference_lat) = detections.first().map(|d| d.location.lat) else {
        return (Vec::new(), 0);
    };
    let mut dedup = DetectionDeduplicator::new(threshold_m, reference_lat);
    for detection in detections {
        dedup.offer(detection);
    }
    let duplicates = dedup.duplicates();
    (dedup.into_accepted(), duplicates)
}
