//! Raster tile and detector collaborator interfaces
//!
//! The engine never decodes image files itself: callers supply a
//! [`RasterTile`] exposing an affine transform, a CRS and windowed multi-band
//! reads, plus a trained [`Detector`].

use crate::error::{FusionError, Result};
use crate::geodesy::{Crs, GeoTransform};
use crate::types::BoundingBox;

/// Rectangular pixel window within a tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelWindow {
    pub col_off: usize,
    pub row_off: usize,
    pub width: usize,
    pub height: usize,
}

impl PixelWindow {
    pub fn new(col_off: usize, row_off: usize, width: usize, height: usize) -> Self {
        Self {
            col_off,
            row_off,
            width,
            height,
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }
}

impl std::fmt::Display for PixelWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{}+{}+{}",
            self.width, self.height, self.col_off, self.row_off
        )
    }
}

/// Pixels read from one window, band-major then row-major
#[derive(Debug, Clone, PartialEq)]
pub struct RasterWindow {
    pub window: PixelWindow,
    pub bands: Vec<Vec<f32>>,
}

impl RasterWindow {
    pub fn band(&self, index: usize) -> Option<&[f32]> {
        self.bands.get(index).map(|b| b.as_slice())
    }

    /// Sample at window-local (x, y)
    pub fn value(&self, band: usize, x: usize, y: usize) -> Option<f32> {
        if x >= self.window.width || y >= self.window.height {
            return None;
        }
        self.band(band)
            .and_then(|b| b.get(y * self.window.width + x))
            .copied()
    }

    /// Largest per-band standard deviation (0 for an empty window)
    pub fn max_band_stddev(&self) -> f64 {
        self.bands
            .iter()
            .map(|band| stddev(band))
            .fold(0.0, f64::max)
    }
}

fn stddev(values: &[f32]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().map(|v| *v as f64).sum::<f64>() / n;
    let var = values
        .iter()
        .map(|v| {
            let d = *v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    var.sqrt()
}

/// A readable geo-referenced raster tile
pub trait RasterTile: Send + Sync {
    fn tile_id(&self) -> &str;
    fn width(&self) -> usize;
    fn height(&self) -> usize;
    fn band_count(&self) -> usize;
    fn transform(&self) -> GeoTransform;
    fn crs(&self) -> Crs;

    /// Read all bands for `window`
    ///
    /// # Errors
    /// `ReadFailure` when the window cannot be read (including windows that fall
    /// outside the tile).
    fn read_window(&self, window: &PixelWindow) -> Result<RasterWindow>;
}

/// Raw detector output, window-local pixel coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub bbox: BoundingBox,
    pub confidence: Option<f32>,
    pub class_label: String,
}

/// A trained object detector
pub trait Detector: Send + Sync {
    /// Run inference on one window
    ///
    /// # Errors
    /// `Detector` on inference failure; the scanner logs and skips the window.
    fn infer(&self, window: &RasterWindow) -> Result<Vec<RawDetection>>;
}

/// Raster held in memory (band-major `f32` samples)
#[derive(Debug, Clone)]
pub struct InMemoryRaster {
    tile_id: String,
    width: usize,
    height: usize,
    transform: GeoTransform,
    crs: Crs,
    bands: Vec<Vec<f32>>,
}

impl InMemoryRaster {
    /// Create a raster; every band must hold `width * height` samples
    pub fn new(
        tile_id: impl Into<String>,
        width: usize,
        height: usize,
        transform: GeoTransform,
        crs: Crs,
        bands: Vec<Vec<f32>>,
    ) -> Result<Self> {
        let tile_id = tile_id.into();
        if bands.is_empty() {
            return Err(FusionError::ReadFailure(format!(
                "tile {} has no bands",
                tile_id
            )));
        }
        if let Some((i, band)) = bands
            .iter()
            .enumerate()
            .find(|(_, b)| b.len() != width * height)
        {
            return Err(FusionError::ReadFailure(format!(
                "tile {} band {} has {} samples, expected {}",
                tile_id,
                i,
                band.len(),
                width * height
            )));
        }
        Ok(Self {
            tile_id,
            width,
            height,
            transform,
            crs,
            bands,
        })
    }

    /// Overwrite one sample (builder-style helper for synthetic scenes)
    pub fn set(&mut self, band: usize, x: usize, y: usize, value: f32) {
        if x < self.width && y < self.height {
            if let Some(b) = self.bands.get_mut(band) {
                b[y * self.width + x] = value;
            }
        }
    }
}

impl RasterTile for InMemoryRaster {
    fn tile_id(&self) -> &str {
        &self.tile_id
    }

    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn band_count(&self) -> usize {
        self.bands.len()
    }

    fn transform(&self) -> GeoTransform {
        self.transform
    }

    fn crs(&self) -> Crs {
        self.crs
    }

    fn read_window(&self, window: &PixelWindow) -> Result<RasterWindow> {
        if window.width == 0
            || window.height == 0
            || window.col_off + window.width > self.width
            || window.row_off + window.height > self.height
        {
            return Err(FusionError::ReadFailure(format!(
                "window {} outside tile {} ({}x{})",
                window, self.tile_id, self.width, self.height
            )));
        }

        let bands = self
            .bands
            .iter()
            .map(|band| {
                let mut out = Vec::with_capacity(window.pixel_count());
                for row in window.row_off..window.row_off + window.height {
                    let start = row * self.width + window.col_off;
                    out.extend_from_slice(&band[start..start + window.width]);
                }
                out
            })
            .collect();

        Ok(RasterWindow {
            window: *window,
            bands,
        })
    }
}
