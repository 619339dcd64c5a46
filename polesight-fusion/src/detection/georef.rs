//! Pixel ↔ geographic conversion for one tile
//!
//! Forward: affine transform → reprojection to WGS84 → calibration offset.
//! The inverse undoes each step in reverse order, so a pixel survives the round
//! trip up to floating-point error.

use crate::error::{FusionError, Result};
use crate::geodesy::{Crs, GeoPoint, GeoTransform};
use crate::raster::RasterTile;
use crate::types::PixelCoord;
use polesight_common::config::GeorefConfig;

/// Geo-referencer bound to one tile's transform and CRS
#[derive(Debug, Clone, Copy)]
pub struct GeoReferencer {
    transform: GeoTransform,
    inverse: GeoTransform,
    crs: Crs,
    calibration_lat_deg: f64,
    calibration_lon_deg: f64,
}

impl GeoReferencer {
    /// # Errors
    /// `ProjectionError` when the transform is singular.
    pub fn new(transform: GeoTransform, crs: Crs, config: &GeorefConfig) -> Result<Self> {
        Ok(Self {
            transform,
            inverse: transform.invert()?,
            crs,
            calibration_lat_deg: config.calibration_lat_deg,
            calibration_lon_deg: config.calibration_lon_deg,
        })
    }

    pub fn for_tile(tile: &dyn RasterTile, config: &GeorefConfig) -> Result<Self> {
        Self::new(tile.transform(), tile.crs(), config)
    }

    pub fn pixel_to_geo(&self, pixel: PixelCoord) -> Result<GeoPoint> {
        let (x, y) = self.transform.apply(pixel.x, pixel.y);
        let native = self.crs.to_geographic(x, y)?;
        GeoPoint::new(
            native.lat + self.calibration_lat_deg,
            native.lon + self.calibration_lon_deg,
        )
        .map_err(|e| FusionError::ProjectionError(format!("calibrated point: {}", e)))
    }

    pub fn geo_to_pixel(&self, point: &GeoPoint) -> Result<PixelCoord> {
        let native = GeoPoint::new(
            point.lat - self.calibration_lat_deg,
            point.lon - self.calibration_lon_deg,
        )
        .map_err(|e| FusionError::ProjectionError(format!("uncalibrated point: {}", e)))?;
        let (x, y) = self.crs.from_geographic(&native)?;
        let (col, row) = self.inverse.apply(x, y);
        Ok(PixelCoord { x: col, y: row })
    }
}

/// One-shot forward conversion
pub fn pixel_to_geo(
    pixel: PixelCoord,
    transform: &GeoTransform,
    crs: &Crs,
    config: &GeorefConfig,
) -> Result<GeoPoint> {
    GeoReferencer::new(*transform, *crs, config)?.pixel_to_geo(pixel)
}
