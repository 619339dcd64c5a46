//! Affine pixel ↔ CRS transform
//!
//! Coefficients follow the GDAL geotransform order:
//! `x = c0 + c1·col + c2·row`, `y = c3 + c4·col + c5·row`,
//! where (col, row) are continuous pixel coordinates with (0, 0) at the
//! top-left corner of the top-left pixel.

use crate::error::{FusionError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub coefficients: [f64; 6],
}

impl GeoTransform {
    pub fn new(coefficients: [f64; 6]) -> Self {
        Self { coefficients }
    }

    /// North-up transform with square-ish pixels
    ///
    /// `pixel_height` is the (positive) ground size of a pixel row; rows grow
    /// southwards.
    pub fn north_up(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self::new([origin_x, pixel_width, 0.0, origin_y, 0.0, -pixel_height])
    }

    /// Pixel (col, row) → CRS (x, y)
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        let c = &self.coefficients;
        (c[0] + c[1] * col + c[2] * row, c[3] + c[4] * col + c[5] * row)
    }

    /// Inverse transform: CRS (x, y) → pixel (col, row)
    pub fn invert(&self) -> Result<GeoTransform> {
        let c = &self.coefficients;
        let det = c[1] * c[5] - c[2] * c[4];
        let scale = (c[1].abs() + c[2].abs()) * (c[4].abs() + c[5].abs());
        if !det.is_finite() || det.abs() <= 1e-12 * scale {
            return Err(FusionError::ProjectionError(format!(
                "singular geotransform {:?}",
                c
            )));
        }

        let inv_det = 1.0 / det;
        let a = c[5] * inv_det;
        let b = -c[2] * inv_det;
        let d = -c[4] * inv_det;
        let e = c[1] * inv_det;

        Ok(GeoTransform::new([
            -(a * c[0] + b * c[3]),
            a,
            b,
            -(d * c[0] + e * c[3]),
            d,
            e,
        ]))
    }

    /// Mean absolute pixel size along each axis in CRS units
    pub fn pixel_size(&self) -> (f64, f64) {
        let c = &self.coefficients;
        (c[1].hypot(c[4]), c[2].hypot(c[5]))
    }
}
