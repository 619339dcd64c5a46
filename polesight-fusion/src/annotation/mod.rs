//! Context annotation from auxiliary spatial layers
//!
//! Layers are built once per run against the run's [`LocalMetricFrame`] and are
//! read-only afterwards, so annotation workers share them by reference. A layer
//! that is absent yields [`Observation::Unknown`] for its attribute.

pub mod elevation;
pub mod roads;
pub mod vegetation;
pub mod water;

pub use elevation::{ElevationGrid, ElevationSource};
pub use roads::RoadNetwork;
pub use water::WaterLayer;

use crate::error::{FusionError, Result};
use crate::geodesy::{Crs, GeoPoint, LocalMetricFrame};
use crate::raster::RasterTile;
use crate::types::{ContextAttributes, Detection, Observation};
use geo_types::{LineString, Polygon};
use polesight_common::config::ContextConfig;
use std::f64::consts::TAU;
use std::sync::Arc;
use tracing::info;

pub const ROADS_LAYER: &str = "roads";
pub const WATER_LAYER: &str = "water";
pub const ELEVATION_LAYER: &str = "elevation";

/// Counts recorded while building layers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayerBuildStats {
    pub road_segments: usize,
    pub water_polygons: usize,
    pub geometry_errors: usize,
}

/// Immutable set of auxiliary layers for one run
pub struct ContextLayers {
    frame: LocalMetricFrame,
    roads: Option<RoadNetwork>,
    water: Option<WaterLayer>,
    elevation: Option<Arc<dyn ElevationSource>>,
    stats: LayerBuildStats,
}

impl ContextLayers {
    /// Empty layer set (every attribute unknown) over `frame`
    pub fn new(frame: LocalMetricFrame) -> Self {
        Self {
            frame,
            roads: None,
            water: None,
            elevation: None,
            stats: LayerBuildStats::default(),
        }
    }

    pub fn with_roads(mut self, lines: &[LineString<f64>], crs: &Crs) -> Self {
        let network = RoadNetwork::build(lines, crs, &self.frame);
        self.stats.road_segments = network.segment_count();
        self.stats.geometry_errors += network.geometry_errors();
        info!(
            features = lines.len(),
            segments = network.segment_count(),
            geometry_errors = network.geometry_errors(),
            "Road layer built"
        );
        self.roads = Some(network);
        self
    }

    pub fn with_water(mut self, polygons: &[Polygon<f64>], crs: &Crs, buffer_m: f64) -> Self {
        let layer = WaterLayer::build(polygons, crs, &self.frame, buffer_m);
        self.stats.water_polygons = layer.polygon_count();
        self.stats.geometry_errors += layer.geometry_errors();
        info!(
            features = polygons.len(),
            polygons = layer.polygon_count(),
            geometry_errors = layer.geometry_errors(),
            "Water layer built"
        );
        self.water = Some(layer);
        self
    }

    pub fn with_elevation(mut self, source: Arc<dyn ElevationSource>) -> Self {
        self.elevation = Some(source);
        self
    }

    pub fn frame(&self) -> &LocalMetricFrame {
        &self.frame
    }

    pub fn stats(&self) -> LayerBuildStats {
        self.stats
    }

    pub fn roads(&self) -> Result<&RoadNetwork> {
        self.roads
            .as_ref()
            .ok_or_else(|| FusionError::MissingLayer(ROADS_LAYER.to_string()))
    }

    pub fn water(&self) -> Result<&WaterLayer> {
        self.water
            .as_ref()
            .ok_or_else(|| FusionError::MissingLayer(WATER_LAYER.to_string()))
    }

    pub fn elevation(&self) -> Result<&dyn ElevationSource> {
        self.elevation
            .as_deref()
            .ok_or_else(|| FusionError::MissingLayer(ELEVATION_LAYER.to_string()))
    }

    /// Names of absent layers
    pub fn missing_layers(&self) -> Vec<String> {
        [
            (ROADS_LAYER, self.roads.is_some()),
            (WATER_LAYER, self.water.is_some()),
            (ELEVATION_LAYER, self.elevation.is_some()),
        ]
        .iter()
        .filter(|(_, present)| !present)
        .map(|(name, _)| name.to_string())
        .collect()
    }
}

/// Attaches context attributes to detections
pub struct ContextAnnotator<'a> {
    layers: &'a ContextLayers,
    config: &'a ContextConfig,
}

impl<'a> ContextAnnotator<'a> {
    pub fn new(layers: &'a ContextLayers, config: &'a ContextConfig) -> Self {
        Self { layers, config }
    }

    /// Enrich `detection` using `tile` for spectral bands
    pub fn annotate(&self, mut detection: Detection, tile: &dyn RasterTile) -> Detection {
        let xy = self.layers.frame.project(&detection.location);

        let road_distance_m = match self.layers.roads() {
            Ok(roads) => roads.nearest_distance_m(xy).into(),
            Err(_) => Observation::Unknown,
        };
        let in_water = match self.layers.water() {
            Ok(water) => Observation::Measured(water.contains_buffered(xy)),
            Err(_) => Observation::Unknown,
        };
        let (surface_elevation_m, height_above_ground_m) = match self.layers.elevation() {
            Ok(source) => self.sample_elevation(source, xy),
            Err(_) => (Observation::Unknown, Observation::Unknown),
        };
        let ndvi = vegetation::sample_ndvi(
            tile,
            detection.pixel,
            self.config.red_band,
            self.config.nir_band,
        );

        detection.context = ContextAttributes {
            ndvi,
            road_distance_m,
            surface_elevation_m,
            height_above_ground_m,
            in_water,
        };
        detection
    }

    /// Centre elevation and height above the ring-median ground estimate
    fn sample_elevation(
        &self,
        source: &dyn ElevationSource,
        xy: [f64; 2],
    ) -> (Observation<f64>, Observation<f64>) {
        let center = self
            .layers
            .frame
            .unproject(xy)
            .ok()
            .and_then(|p| source.elevation_at(&p));

        let n = self.config.ground_sample_count;
        let radius = self.config.ground_sample_radius_m;
        let ring: Vec<f64> = (0..n)
            .filter_map(|k| {
                let angle = TAU * k as f64 / n as f64;
                let sample = [xy[0] + radius * angle.cos(), xy[1] + radius * angle.sin()];
                self.layers
                    .frame
                    .unproject(sample)
                    .ok()
                    .and_then(|p: GeoPoint| source.elevation_at(&p))
            })
            .collect();

        let ground = if n > 0 && ring.len() * 2 >= n {
            median(ring)
        } else {
            None
        };
        let hag = match (center, ground) {
            (Some(c), Some(g)) => Some(c - g),
            _ => None,
        };
        (center.into(), hag.into())
    }
}

fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}
