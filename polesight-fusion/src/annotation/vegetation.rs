//! Vegetation index sampling

use crate::raster::{PixelWindow, RasterTile};
use crate::types::{Observation, PixelCoord};
use tracing::debug;

/// Normalized difference vegetation index from red and NIR reflectance
pub fn ndvi(red: f64, nir: f64) -> Option<f64> {
    let denominator = nir + red;
    if !denominator.is_finite() || denominator.abs() < f64::EPSILON {
        return None;
    }
    Some((nir - red) / denominator)
}

/// NDVI sampled from `tile` at a tile-global pixel
///
/// Unknown when the tile lacks either band, the pixel is outside the tile, the
/// read fails, or the denominator is zero.
pub fn sample_ndvi(
    tile: &dyn RasterTile,
    pixel: PixelCoord,
    red_band: usize,
    nir_band: usize,
) -> Observation<f64> {
    if red_band >= tile.band_count() || nir_band >= tile.band_count() {
        return Observation::Unknown;
    }
    if !(pixel.x >= 0.0 && pixel.y >= 0.0) {
        return Observation::Unknown;
    }
    let (col, row) = (pixel.x.floor() as usize, pixel.y.floor() as usize);
    if col >= tile.width() || row >= tile.height() {
        return Observation::Unknown;
    }

    let window = PixelWindow::new(col, row, 1, 1);
    let sample = match tile.read_window(&window) {
        Ok(sample) => sample,
        Err(e) => {
            debug!(tile_id = tile.tile_id(), error = %e, "NDVI sample read failed");
            return Observation::Unknown;
        }
    };
    let red = sample.value(red_band, 0, 0);
    let nir = sample.value(nir_band, 0, 0);
    match (red, nir) {
        (Some(red), Some(nir)) => ndvi(red as f64, nir as f64).into(),
        _ => Observation::Unknown,
    }
}
