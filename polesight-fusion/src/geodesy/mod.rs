//! Geographic primitives, affine raster transforms and CRS projections
//!
//! - [`GeoPoint`]: validated WGS84 latitude/longitude
//! - [`transform`]: six-coefficient affine pixel ↔ CRS transform
//! - [`projection`]: supported CRSs and the local metric frame used for matching

pub mod projection;
pub mod transform;

pub use projection::{Crs, LocalMetricFrame};
pub use transform::GeoTransform;

use crate::error::{FusionError, Result};
use serde::{Deserialize, Serialize};

/// Mean Earth radius used for haversine distances (metres)
const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// WGS84 geographic point (degrees)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    /// Create a point, rejecting non-finite or out-of-range coordinates
    pub fn new(lat: f64, lon: f64) -> Result<Self> {
        if !lat.is_finite() || !lon.is_finite() {
            return Err(FusionError::GeometryError(format!(
                "non-finite coordinate ({}, {})",
                lat, lon
            )));
        }
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(FusionError::GeometryError(format!(
                "coordinate out of range: lat {} lon {}",
                lat, lon
            )));
        }
        Ok(Self { lat, lon })
    }

    /// Offset by a small planar displacement in metres (east, north)
    ///
    /// Uses the local meters-per-degree approximation; intended for offsets of
    /// at most a few hundred metres.
    pub fn offset_m(&self, east_m: f64, north_m: f64) -> Result<Self> {
        let (m_lat, m_lon) = meters_per_degree(self.lat);
        Self::new(self.lat + north_m / m_lat, self.lon + east_m / m_lon)
    }
}

/// Metres per degree of (latitude, longitude) at `lat_deg` on the WGS84 ellipsoid
///
/// Series approximation, accurate to centimetres per degree. Used as the per-tile
/// planar approximation for deduplication distances.
pub fn meters_per_degree(lat_deg: f64) -> (f64, f64) {
    let phi = lat_deg.to_radians();
    let m_lat = 111_132.92 - 559.82 * (2.0 * phi).cos() + 1.175 * (4.0 * phi).cos()
        - 0.0023 * (6.0 * phi).cos();
    let m_lon =
        111_412.84 * phi.cos() - 93.5 * (3.0 * phi).cos() + 0.118 * (5.0 * phi).cos();
    (m_lat, m_lon)
}

/// Great-circle distance between two points (metres)
pub fn haversine_m(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lon = (b.lon - a.lon).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_METERS * c
}
