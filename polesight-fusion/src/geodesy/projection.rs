//! Coordinate reference systems and the local metric frame
//!
//! Supported tile CRSs:
//! - EPSG:4326 geographic (lon/lat degrees, x = lon, y = lat)
//! - EPSG:3857 spherical web mercator (metres)
//! - EPSG:326zz / 327zz WGS84 UTM north/south (metres)
//!
//! UTM and [`LocalMetricFrame`] share one ellipsoidal Transverse Mercator
//! implementation (series expansion, sub-millimetre within a UTM zone).

use super::GeoPoint;
use crate::error::{FusionError, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

/// WGS84 semi-major axis (metres)
const WGS84_A: f64 = 6_378_137.0;
/// WGS84 flattening
const WGS84_F: f64 = 1.0 / 298.257_223_563;
/// Web mercator is only defined up to this latitude
const MERCATOR_MAX_LAT: f64 = 85.051_128_779_806_59;

const UTM_SCALE: f64 = 0.9996;
const UTM_FALSE_EASTING: f64 = 500_000.0;
const UTM_FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// Coordinate reference system of a raster or vector layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Crs {
    /// EPSG:4326
    Wgs84,
    /// EPSG:3857
    WebMercator,
    /// WGS84 / UTM
    Utm { zone: u8, north: bool },
}

impl Crs {
    pub fn from_epsg(code: u32) -> Result<Self> {
        match code {
            4326 => Ok(Crs::Wgs84),
            3857 | 900913 => Ok(Crs::WebMercator),
            32601..=32660 => Ok(Crs::Utm {
                zone: (code - 32600) as u8,
                north: true,
            }),
            32701..=32760 => Ok(Crs::Utm {
                zone: (code - 32700) as u8,
                north: false,
            }),
            other => Err(FusionError::ProjectionError(format!(
                "unsupported CRS EPSG:{}",
                other
            ))),
        }
    }

    pub fn epsg(&self) -> u32 {
        match self {
            Crs::Wgs84 => 4326,
            Crs::WebMercator => 3857,
            Crs::Utm { zone, north: true } => 32600 + *zone as u32,
            Crs::Utm { zone, north: false } => 32700 + *zone as u32,
        }
    }

    /// Native (x, y) → geographic point
    pub fn to_geographic(&self, x: f64, y: f64) -> Result<GeoPoint> {
        if !x.is_finite() || !y.is_finite() {
            return Err(FusionError::ProjectionError(format!(
                "non-finite coordinate ({}, {}) in EPSG:{}",
                x,
                y,
                self.epsg()
            )));
        }
        let (lat, lon) = match self {
            Crs::Wgs84 => (y, x),
            Crs::WebMercator => {
                let lon = (x / WGS84_A).to_degrees();
                let lat = (2.0 * (y / WGS84_A).exp().atan() - FRAC_PI_2).to_degrees();
                (lat, lon)
            }
            Crs::Utm { zone, north } => {
                let tm = TransverseMercator::utm(*zone)?;
                let northing = if *north { y } else { y - UTM_FALSE_NORTHING_SOUTH };
                tm.inverse(x - UTM_FALSE_EASTING, northing)
            }
        };
        GeoPoint::new(lat, lon).map_err(|e| {
            FusionError::ProjectionError(format!("EPSG:{} → geographic: {}", self.epsg(), e))
        })
    }

    /// Geographic point → native (x, y)
    pub fn from_geographic(&self, point: &GeoPoint) -> Result<(f64, f64)> {
        match self {
            Crs::Wgs84 => Ok((point.lon, point.lat)),
            Crs::WebMercator => {
                if point.lat.abs() > MERCATOR_MAX_LAT {
                    return Err(FusionError::ProjectionError(format!(
                        "latitude {} outside web mercator domain",
                        point.lat
                    )));
                }
                let x = WGS84_A * point.lon.to_radians();
                let y = WGS84_A * (FRAC_PI_4 + point.lat.to_radians() / 2.0).tan().ln();
                Ok((x, y))
            }
            Crs::Utm { zone, north } => {
                let tm = TransverseMercator::utm(*zone)?;
                let (e, n) = tm.forward(point.lat, point.lon);
                let n = if *north { n } else { n + UTM_FALSE_NORTHING_SOUTH };
                Ok((e + UTM_FALSE_EASTING, n))
            }
        }
    }
}

/// Ellipsoidal Transverse Mercator (WGS84), false easting/northing excluded
#[derive(Debug, Clone, Copy, PartialEq)]
struct TransverseMercator {
    central_meridian_deg: f64,
    origin_lat_deg: f64,
    scale: f64,
}

impl TransverseMercator {
    fn utm(zone: u8) -> Result<Self> {
        if !(1..=60).contains(&zone) {
            return Err(FusionError::ProjectionError(format!(
                "UTM zone {} out of range",
                zone
            )));
        }
        Ok(Self {
            central_meridian_deg: zone as f64 * 6.0 - 183.0,
            origin_lat_deg: 0.0,
            scale: UTM_SCALE,
        })
    }

    fn e2() -> f64 {
        WGS84_F * (2.0 - WGS84_F)
    }

    /// Meridional arc length from the equator to `phi` (radians)
    fn meridional_arc(phi: f64) -> f64 {
        let e2 = Self::e2();
        let e4 = e2 * e2;
        let e6 = e4 * e2;
        WGS84_A
            * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * phi
                - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * phi).sin()
                + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * phi).sin()
                - (35.0 * e6 / 3072.0) * (6.0 * phi).sin())
    }

    /// Geographic → (easting, northing) relative to the projection origin
    fn forward(&self, lat_deg: f64, lon_deg: f64) -> (f64, f64) {
        let e2 = Self::e2();
        let ep2 = e2 / (1.0 - e2);
        let phi = lat_deg.to_radians();
        let (sin_phi, cos_phi) = phi.sin_cos();
        let tan_phi = phi.tan();

        let n = WGS84_A / (1.0 - e2 * sin_phi * sin_phi).sqrt();
        let t = tan_phi * tan_phi;
        let c = ep2 * cos_phi * cos_phi;
        let a = (lon_deg - self.central_meridian_deg).to_radians() * cos_phi;
        let m = Self::meridional_arc(phi);
        let m0 = Self::meridional_arc(self.origin_lat_deg.to_radians());

        let a2 = a * a;
        let a3 = a2 * a;
        let a4 = a3 * a;
        let a5 = a4 * a;
        let a6 = a5 * a;

        let x = self.scale
            * n
            * (a + (1.0 - t + c) * a3 / 6.0
                + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * ep2) * a5 / 120.0);
        let y = self.scale
            * (m - m0
                + n * tan_phi
                    * (a2 / 2.0
                        + (5.0 - t + 9.0 * c + 4.0 * c * c) * a4 / 24.0
                        + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * ep2) * a6 / 720.0));
        (x, y)
    }

    /// (easting, northing) relative to the projection origin → (lat, lon) degrees
    fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        let e2 = Self::e2();
        let ep2 = e2 / (1.0 - e2);
        let e4 = e2 * e2;
        let e6 = e4 * e2;

        let m = Self::meridional_arc(self.origin_lat_deg.to_radians()) + y / self.scale;
        let mu = m / (WGS84_A * (1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0));
        let sqrt_1me2 = (1.0 - e2).sqrt();
        let e1 = (1.0 - sqrt_1me2) / (1.0 + sqrt_1me2);

        let phi1 = mu
            + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
            + (21.0 * e1 * e1 / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
            + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
            + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

        let (sin1, cos1) = phi1.sin_cos();
        let tan1 = phi1.tan();
        let c1 = ep2 * cos1 * cos1;
        let t1 = tan1 * tan1;
        let denom = 1.0 - e2 * sin1 * sin1;
        let n1 = WGS84_A / denom.sqrt();
        let r1 = WGS84_A * (1.0 - e2) / denom.powf(1.5);
        let d = x / (n1 * self.scale);

        let d2 = d * d;
        let d3 = d2 * d;
        let d4 = d3 * d;
        let d5 = d4 * d;
        let d6 = d5 * d;

        let lat = phi1
            - (n1 * tan1 / r1)
                * (d2 / 2.0
                    - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * ep2) * d4 / 24.0
                    + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1 - 252.0 * ep2
                        - 3.0 * c1 * c1)
                        * d6
                        / 720.0);
        let lon = (d - (1.0 + 2.0 * t1 + c1) * d3 / 6.0
            + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * ep2 + 24.0 * t1 * t1) * d5
                / 120.0)
            / cos1;

        (lat.to_degrees(), self.central_meridian_deg + lon.to_degrees())
    }
}

/// Shared metric frame for one area of interest
///
/// A Transverse Mercator projection with unit scale whose central meridian and
/// origin latitude sit at the area's centre, so planar distances in this frame
/// track geodesic distances closely across a bounded area. All distance
/// computations in matching and context annotation happen in this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalMetricFrame {
    origin: GeoPoint,
    tm: TransverseMercator,
}

impl LocalMetricFrame {
    pub fn centered_on(origin: GeoPoint) -> Self {
        Self {
            origin,
            tm: TransverseMercator {
                central_meridian_deg: origin.lon,
                origin_lat_deg: origin.lat,
                scale: 1.0,
            },
        }
    }

    /// Frame centred on the bounding-box centre of `points`
    ///
    /// Returns `None` when `points` is empty.
    pub fn around<'a>(points: impl IntoIterator<Item = &'a GeoPoint>) -> Option<Self> {
        let mut bounds: Option<(f64, f64, f64, f64)> = None;
        for p in points {
            bounds = Some(match bounds {
                None => (p.lat, p.lat, p.lon, p.lon),
                Some((min_lat, max_lat, min_lon, max_lon)) => (
                    min_lat.min(p.lat),
                    max_lat.max(p.lat),
                    min_lon.min(p.lon),
                    max_lon.max(p.lon),
                ),
            });
        }
        let (min_lat, max_lat, min_lon, max_lon) = bounds?;
        Some(Self::centered_on(GeoPoint {
            lat: (min_lat + max_lat) / 2.0,
            lon: (min_lon + max_lon) / 2.0,
        }))
    }

    pub fn origin(&self) -> GeoPoint {
        self.origin
    }

    /// Geographic point → [east, north] metres from the frame origin
    pub fn project(&self, point: &GeoPoint) -> [f64; 2] {
        let (x, y) = self.tm.forward(point.lat, point.lon);
        [x, y]
    }

    /// [east, north] metres → geographic point
    pub fn unproject(&self, xy: [f64; 2]) -> Result<GeoPoint> {
        let (lat, lon) = self.tm.inverse(xy[0], xy[1]);
        GeoPoint::new(lat, lon)
            .map_err(|e| FusionError::ProjectionError(format!("local frame inverse: {}", e)))
    }

    /// Project a point expressed in `crs` into this frame
    pub fn project_from(&self, crs: &Crs, x: f64, y: f64) -> Result<[f64; 2]> {
        let geographic = crs.to_geographic(x, y)?;
        Ok(self.project(&geographic))
    }

    /// Planar distance between two geographic points in this frame (metres)
    pub fn distance_m(&self, a: &GeoPoint, b: &GeoPoint) -> f64 {
        let pa = self.project(a);
        let pb = self.project(b);
        (pa[0] - pb[0]).hypot(pa[1] - pb[1])
    }
}
