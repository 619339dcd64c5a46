//! Synthetic scenes for end-to-end tests
//!
//! A [`Scene`] is one 256 × 256 px UTM tile at 0.5 m resolution with four
//! bands (red, marker, confidence, NIR). Poles are painted as marker pixels
//! that [`MarkerDetector`] reports; their confidence is stored in the
//! confidence band and their spectral response in red/NIR.

use chrono::NaiveDate;
use geo_types::{LineString, Polygon};
use polesight_common::FusionConfig;
use polesight_fusion::annotation::{ContextLayers, ElevationSource};
use polesight_fusion::detection::GeoReferencer;
use polesight_fusion::geodesy::{haversine_m, Crs, GeoPoint, GeoTransform, LocalMetricFrame};
use polesight_fusion::inventory::{InMemoryInventory, InventorySource};
use polesight_fusion::raster::{Detector, InMemoryRaster, RasterTile, RasterWindow, RawDetection};
use polesight_fusion::types::{BoundingBox, GroundTruthAsset, PixelCoord};
use polesight_fusion::{Result, RunContext};
use std::sync::Arc;

pub const TILE_PX: usize = 256;
pub const PIXEL_SIZE_M: f64 = 0.5;
pub const GROUND_ELEVATION_M: f64 = 12.0;
pub const POLE_HEIGHT_M: f64 = 10.0;

const RED: usize = 0;
const MARKER: usize = 1;
const CONFIDENCE: usize = 2;
const NIR: usize = 3;
const MARKER_VALUE: f32 = 255.0;

pub fn reference_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()
}

/// Defaults with windows small enough that a tile has overlapping windows
pub fn test_config() -> FusionConfig {
    let mut config = FusionConfig::default();
    config.scan.window_size = 128;
    config.scan.stride = 96;
    config
}

pub fn run_context(config: FusionConfig) -> RunContext {
    RunContext::new(config, reference_date()).unwrap()
}

pub fn asset(id: &str, source: &str, location: GeoPoint, inspected: Option<NaiveDate>) -> GroundTruthAsset {
    GroundTruthAsset {
        id: id.to_string(),
        location,
        inspection_date: inspected,
        status: Some("in_service".to_string()),
        source: source.to_string(),
    }
}

pub fn inventory(name: &str, assets: Vec<GroundTruthAsset>) -> Arc<dyn InventorySource> {
    Arc::new(InMemoryInventory::new(name, assets))
}

/// A pole to paint into a scene
#[derive(Debug, Clone, Copy)]
pub struct PoleSpec {
    pub col: usize,
    pub row: usize,
    pub confidence: f32,
    pub red: f32,
    pub nir: f32,
}

impl PoleSpec {
    /// Pole with detector confidence 0.9 and NDVI 0.1
    pub fn at(col: usize, row: usize) -> Self {
        Self {
            col,
            row,
            confidence: 0.9,
            red: 90.0,
            nir: 110.0,
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    /// Spectral response for a given NDVI (red + NIR = 200)
    pub fn with_ndvi(mut self, ndvi: f32) -> Self {
        self.red = 100.0 * (1.0 - ndvi);
        self.nir = 100.0 * (1.0 + ndvi);
        self
    }
}

pub struct Scene {
    pub tile_id: String,
    raster: InMemoryRaster,
    georef: GeoReferencer,
    poles: Vec<GeoPoint>,
}

impl Scene {
    /// Tile whose top-left corner sits at `top_left`
    pub fn new(tile_id: &str, top_left: GeoPoint) -> Self {
        let zone = (((top_left.lon + 180.0) / 6.0).floor() as u8).clamp(0, 59) + 1;
        let crs = Crs::Utm {
            zone,
            north: top_left.lat >= 0.0,
        };
        let (easting, northing) = crs.from_geographic(&top_left).unwrap();
        let transform = GeoTransform::north_up(easting, northing, PIXEL_SIZE_M, PIXEL_SIZE_M);

        let n = TILE_PX * TILE_PX;
        let red: Vec<f32> = (0..n).map(|i| 60.0 + ((i * 7) % 31) as f32).collect();
        let bands = vec![red, vec![0.0; n], vec![0.0; n], vec![70.0; n]];
        let raster = InMemoryRaster::new(tile_id, TILE_PX, TILE_PX, transform, crs, bands).unwrap();
        let georef = GeoReferencer::for_tile(&raster, &Default::default()).unwrap();

        Self {
            tile_id: tile_id.to_string(),
            raster,
            georef,
            poles: Vec::new(),
        }
    }

    /// Paint a pole; returns the geographic location of its pixel centre
    pub fn place_pole(&mut self, pole: PoleSpec) -> GeoPoint {
        self.raster.set(MARKER, pole.col, pole.row, MARKER_VALUE);
        self.raster.set(CONFIDENCE, pole.col, pole.row, pole.confidence * 100.0);
        self.raster.set(RED, pole.col, pole.row, pole.red);
        self.raster.set(NIR, pole.col, pole.row, pole.nir);
        let location = self.location_of(pole.col as f64 + 0.5, pole.row as f64 + 0.5);
        self.poles.push(location);
        location
    }

    pub fn location_of(&self, col: f64, row: f64) -> GeoPoint {
        self.georef.pixel_to_geo(PixelCoord { x: col, y: row }).unwrap()
    }

    pub fn georeferencer(&self) -> GeoReferencer {
        self.georef
    }

    pub fn poles(&self) -> &[GeoPoint] {
        &self.poles
    }

    pub fn tile(&self) -> Arc<dyn RasterTile> {
        Arc::new(self.raster.clone())
    }

    pub fn raster(&self) -> &InMemoryRaster {
        &self.raster
    }

    pub fn frame(&self) -> LocalMetricFrame {
        let half = TILE_PX as f64 / 2.0;
        LocalMetricFrame::centered_on(self.location_of(half, half))
    }

    /// East-west road along pixel row `row` (may lie outside the tile)
    pub fn road_along_row(&self, row: f64) -> LineString<f64> {
        let west = self.location_of(-400.0, row);
        let east = self.location_of(TILE_PX as f64 + 400.0, row);
        LineString::from(vec![(west.lon, west.lat), (east.lon, east.lat)])
    }

    /// Square lake centred on a pixel, `half_px` pixels from centre to edge
    pub fn lake_around(&self, col: f64, row: f64, half_px: f64) -> Polygon<f64> {
        let corners = [
            self.location_of(col - half_px, row - half_px),
            self.location_of(col + half_px, row - half_px),
            self.location_of(col + half_px, row + half_px),
            self.location_of(col - half_px, row + half_px),
        ];
        let ring: Vec<(f64, f64)> = corners.iter().map(|p| (p.lon, p.lat)).collect();
        Polygon::new(LineString::from(ring), vec![])
    }

    /// Layers with a road along `road_row`, optional lakes, and a surface model
    /// that raises every painted pole above flat ground
    pub fn layers(&self, road_row: Option<f64>, lakes: &[Polygon<f64>]) -> Arc<ContextLayers> {
        let mut layers = ContextLayers::new(self.frame());
        if let Some(row) = road_row {
            layers = layers.with_roads(&[self.road_along_row(row)], &Crs::Wgs84);
        }
        layers = layers.with_water(lakes, &Crs::Wgs84, 2.0);
        Arc::new(layers.with_elevation(Arc::new(PoleSurface::new(self.poles.clone()))))
    }
}

/// Surface model: flat ground with a raised cell at each pole
pub struct PoleSurface {
    poles: Vec<GeoPoint>,
}

impl PoleSurface {
    pub fn new(poles: Vec<GeoPoint>) -> Self {
        Self { poles }
    }
}

impl ElevationSource for PoleSurface {
    fn elevation_at(&self, point: &GeoPoint) -> Option<f64> {
        let on_pole = self.poles.iter().any(|p| haversine_m(p, point) < 0.6);
        Some(if on_pole {
            GROUND_ELEVATION_M + POLE_HEIGHT_M
        } else {
            GROUND_ELEVATION_M
        })
    }
}

/// Reports a 7 × 7 px box centred on each marker pixel
///
/// `shift_px` moves boxes reported by windows that do not start at column 0,
/// imitating inconsistent localisation across overlapping windows.
#[derive(Default)]
pub struct MarkerDetector {
    pub shift_px: f64,
}

impl MarkerDetector {
    pub fn shared() -> Arc<dyn Detector> {
        Arc::new(Self::default())
    }
}

impl Detector for MarkerDetector {
    fn infer(&self, window: &RasterWindow) -> Result<Vec<RawDetection>> {
        let shift = if window.window.col_off > 0 { self.shift_px } else { 0.0 };
        let mut out = Vec::new();
        for y in 0..window.window.height {
            for x in 0..window.window.width {
                if window.value(MARKER, x, y) != Some(MARKER_VALUE) {
                    continue;
                }
                let confidence = window
                    .value(CONFIDENCE, x, y)
                    .filter(|c| *c > 0.0)
                    .map(|c| c / 100.0);
                let (x, y) = (x as f64 + shift, y as f64);
                out.push(RawDetection {
                    bbox: BoundingBox::new(x - 3.0, y - 3.0, x + 4.0, y + 4.0),
                    confidence,
                    class_label: "pole".to_string(),
                });
            }
        }
        Ok(out)
    }
}
