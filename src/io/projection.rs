//! Coordinate projection between spherical and cartesian grid systems.
//!
//! Delft3D grids are tagged either `Spherical` (WGS84 longitude/latitude in
//! degrees) or `Cartesian` (projected meters). The transform used here is
//! the spherical ("web") Mercator projection, the plane the original
//! tooling targets by default (EPSG:4326 ↔ EPSG:3857).
//!
//! # Example
//!
//! ```ignore
//! use delft3d::io::{CoordinateProjection, MercatorProjection};
//!
//! let proj = MercatorProjection;
//! let (x, y) = proj.geo_to_xy(8.75, 63.75);
//! let (lon, lat) = proj.xy_to_geo(x, y);
//! ```

use std::f64::consts::PI;

/// Trait for coordinate projections.
pub trait CoordinateProjection {
    /// Convert geographic coordinates (lon, lat) in degrees to projected
    /// (x, y) in meters.
    fn geo_to_xy(&self, lon: f64, lat: f64) -> (f64, f64);

    /// Convert projected coordinates (x, y) in meters to geographic
    /// (lon, lat) in degrees.
    fn xy_to_geo(&self, x: f64, y: f64) -> (f64, f64);
}

/// Spherical Mercator projection on the WGS84 equatorial radius.
///
/// Conformal away from the poles; latitude must stay inside the Mercator
/// limit (about ±85.05°), which every coastal model grid does.
#[derive(Debug, Clone, Copy, Default)]
pub struct MercatorProjection;

impl MercatorProjection {
    /// WGS84 equatorial radius in meters.
    const A: f64 = 6_378_137.0;
}

impl CoordinateProjection for MercatorProjection {
    fn geo_to_xy(&self, lon: f64, lat: f64) -> (f64, f64) {
        let x = Self::A * lon * PI / 180.0;
        let y = Self::A * (PI / 4.0 + lat * PI / 360.0).tan().ln();
        (x, y)
    }

    fn xy_to_geo(&self, x: f64, y: f64) -> (f64, f64) {
        let lon = x / Self::A * 180.0 / PI;
        let lat = (2.0 * (y / Self::A).exp().atan() - PI / 2.0) * 180.0 / PI;
        (lon, lat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-9;

    #[test]
    fn test_equator_origin() {
        let proj = MercatorProjection;
        let (x, y) = proj.geo_to_xy(0.0, 0.0);
        assert!(x.abs() < TOL);
        assert!(y.abs() < TOL);
    }

    #[test]
    fn test_known_point() {
        // 180°E maps to half the circumference of the WGS84 sphere.
        let proj = MercatorProjection;
        let (x, _) = proj.geo_to_xy(180.0, 0.0);
        assert!((x - 20_037_508.342789244).abs() < 1e-6);
    }

    #[test]
    fn test_roundtrip() {
        let proj = MercatorProjection;
        let test_points = [(8.75, 63.75), (-5.32, 60.39), (114.2, 22.5), (0.0, -45.0)];
        for (lon, lat) in test_points {
            let (x, y) = proj.geo_to_xy(lon, lat);
            let (lon2, lat2) = proj.xy_to_geo(x, y);
            assert!((lon - lon2).abs() < TOL, "lon roundtrip: {lon} -> {lon2}");
            assert!((lat - lat2).abs() < TOL, "lat roundtrip: {lat} -> {lat2}");
        }
    }
}
