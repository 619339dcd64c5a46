//! Surface-elevation sources

use crate::error::{FusionError, Result};
use crate::geodesy::{Crs, GeoPoint, GeoTransform};

/// Point elevation lookup
pub trait ElevationSource: Send + Sync {
    /// Elevation in metres at `point`, or `None` outside coverage / at no-data
    fn elevation_at(&self, point: &GeoPoint) -> Option<f64>;
}

/// Elevation raster with nearest-pixel sampling
#[derive(Debug, Clone)]
pub struct ElevationGrid {
    width: usize,
    height: usize,
    crs: Crs,
    inverse: GeoTransform,
    values: Vec<f32>,
    nodata: Option<f32>,
}

impl ElevationGrid {
    pub fn new(
        width: usize,
        height: usize,
        transform: GeoTransform,
        crs: Crs,
        values: Vec<f32>,
        nodata: Option<f32>,
    ) -> Result<Self> {
        if values.len() != width * height {
            return Err(FusionError::ReadFailure(format!(
                "elevation grid has {} samples, expected {}",
                values.len(),
                width * height
            )));
        }
        Ok(Self {
            width,
            height,
            crs,
            inverse: transform.invert()?,
            values,
            nodata,
        })
    }
}

impl ElevationSource for ElevationGrid {
    fn elevation_at(&self, point: &GeoPoint) -> Option<f64> {
        let (x, y) = self.crs.from_geographic(point).ok()?;
        let (col, row) = self.inverse.apply(x, y);
        if !(col >= 0.0 && row >= 0.0) {
            return None;
        }
        let (col, row) = (col.floor() as usize, row.floor() as usize);
        if col >= self.width || row >= self.height {
            return None;
        }
        let value = self.values[row * self.width + col];
        if !value.is_finite() || self.nodata == Some(value) {
            return None;
        }
        Some(value as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> ElevationGrid {
        // 4×4 cells of 0.001°, values = row * 10 + col
        let values = (0..16).map(|i| ((i / 4) * 10 + i % 4) as f32).collect();
        ElevationGrid::new(
            4,
            4,
            GeoTransform::north_up(10.0, 50.0, 0.001, 0.001),
            Crs::Wgs84,
            values,
            Some(13.0),
        )
        .unwrap()
    }

    #[test]
    fn test_nearest_pixel_sample() {
        let g = grid();
        let p = GeoPoint::new(50.0 - 0.0025, 10.0 + 0.0015).unwrap();
        assert_eq!(g.elevation_at(&p), Some(21.0));
    }

    #[test]
    fn test_outside_and_nodata_are_none() {
        let g = grid();
        assert_eq!(g.elevation_at(&GeoPoint::new(51.0, 10.0).unwrap()), None);
        let nodata = GeoPoint::new(50.0 - 0.0015, 10.0 + 0.0035).unwrap();
        assert_eq!(g.elevation_at(&nodata), None);
    }
}
