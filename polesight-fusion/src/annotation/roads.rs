//! Road network layer with nearest-segment queries

use crate::geodesy::{Crs, LocalMetricFrame};
use geo_types::LineString;
use rstar::primitives::Line;
use rstar::{PointDistance, RTree};
use tracing::warn;

/// Road centre-lines projected into the run's metric frame
pub struct RoadNetwork {
    segments: RTree<Line<[f64; 2]>>,
    geometry_errors: usize,
}

impl RoadNetwork {
    /// Project and index `lines` given in `crs` (x = lon, y = lat for EPSG:4326)
    ///
    /// Lines with fewer than two usable vertices and vertices that fail to
    /// project are skipped and counted as geometry errors.
    pub fn build(lines: &[LineString<f64>], crs: &Crs, frame: &LocalMetricFrame) -> Self {
        let mut segments = Vec::new();
        let mut geometry_errors = 0;

        for (i, line) in lines.iter().enumerate() {
            let mut projected = Vec::with_capacity(line.0.len());
            let mut line_ok = true;
            for coord in line.coords() {
                match frame.project_from(crs, coord.x, coord.y) {
                    Ok(xy) => projected.push(xy),
                    Err(e) => {
                        warn!(feature = i, error = %e, "Road vertex failed to project, skipping line");
                        line_ok = false;
                        break;
                    }
                }
            }

            let before = segments.len();
            if line_ok {
                segments.extend(
                    projected
                        .windows(2)
                        .filter(|pair| pair[0] != pair[1])
                        .map(|pair| Line::new(pair[0], pair[1])),
                );
            }
            if segments.len() == before {
                if line_ok {
                    warn!(feature = i, vertices = line.0.len(), "Degenerate road line skipped");
                }
                geometry_errors += 1;
            }
        }

        Self {
            segments: RTree::bulk_load(segments),
            geometry_errors,
        }
    }

    /// Distance from a frame point to the nearest road segment (metres)
    pub fn nearest_distance_m(&self, xy: [f64; 2]) -> Option<f64> {
        self.segments
            .nearest_neighbor(&xy)
            .map(|segment| segment.distance_2(&xy).sqrt())
    }

    pub fn segment_count(&self) -> usize {
        self.segments.size()
    }

    pub fn geometry_errors(&self) -> usize {
        self.geometry_errors
    }
}
