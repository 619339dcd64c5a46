//! Water-polygon layer with buffered point-in-polygon queries

use crate::geodesy::{Crs, LocalMetricFrame};
use geo::{Area, BoundingRect, Distance, Euclidean};
use geo_types::{Coord, LineString, Point, Polygon};
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::RTree;
use tracing::warn;

type IndexedBounds = GeomWithData<Rectangle<[f64; 2]>, usize>;

/// Water polygons projected into the run's metric frame, indexed by bounds
pub struct WaterLayer {
    polygons: Vec<Polygon<f64>>,
    bounds: RTree<IndexedBounds>,
    buffer_m: f64,
    geometry_errors: usize,
}

impl WaterLayer {
    /// Project and index `polygons` given in `crs`
    ///
    /// Polygons that fail to project or have zero area are skipped and counted
    /// as geometry errors.
    pub fn build(
        polygons: &[Polygon<f64>],
        crs: &Crs,
        frame: &LocalMetricFrame,
        buffer_m: f64,
    ) -> Self {
        let mut projected = Vec::with_capacity(polygons.len());
        let mut geometry_errors = 0;

        for (i, polygon) in polygons.iter().enumerate() {
            match project_polygon(polygon, crs, frame) {
                Some(p) if p.unsigned_area() > 0.0 => projected.push(p),
                Some(_) => {
                    warn!(feature = i, "Water polygon with zero area skipped");
                    geometry_errors += 1;
                }
                None => {
                    warn!(feature = i, "Water polygon failed to project, skipped");
                    geometry_errors += 1;
                }
            }
        }

        let bounds = projected
            .iter()
            .enumerate()
            .filter_map(|(i, p)| {
                p.bounding_rect().map(|r| {
                    GeomWithData::new(
                        Rectangle::from_corners([r.min().x, r.min().y], [r.max().x, r.max().y]),
                        i,
                    )
                })
            })
            .collect();

        Self {
            polygons: projected,
            bounds: RTree::bulk_load(bounds),
            buffer_m,
            geometry_errors,
        }
    }

    /// True when the frame point lies inside a polygon or within the buffer of
    /// its boundary (distance to a polygon is zero inside it)
    pub fn contains_buffered(&self, xy: [f64; 2]) -> bool {
        let point = Point::new(xy[0], xy[1]);
        self.bounds
            .locate_within_distance(xy, self.buffer_m * self.buffer_m)
            .any(|candidate| {
                Euclidean::distance(&point, &self.polygons[candidate.data]) <= self.buffer_m
            })
    }

    pub fn polygon_count(&self) -> usize {
        self.polygons.len()
    }

    pub fn geometry_errors(&self) -> usize {
        self.geometry_errors
    }
}

fn project_ring(ring: &LineString<f64>, crs: &Crs, frame: &LocalMetricFrame) -> Option<LineString<f64>> {
    ring.coords()
        .map(|c| {
            frame
                .project_from(crs, c.x, c.y)
                .ok()
                .map(|xy| Coord { x: xy[0], y: xy[1] })
        })
        .collect::<Option<Vec<_>>>()
        .map(LineString::new)
}

fn project_polygon(polygon: &Polygon<f64>, crs: &Crs, frame: &LocalMetricFrame) -> Option<Polygon<f64>> {
    let exterior = project_ring(polygon.exterior(), crs, frame)?;
    let interiors = polygon
        .interiors()
        .iter()
        .map(|ring| project_ring(ring, crs, frame))
        .collect::<Option<Vec<_>>>()?;
    Some(Polygon::new(exterior, interiors))
}
