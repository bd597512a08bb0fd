//! Geodesy on a spherical earth model.
//!
//! All distances are great-circle distances in meters. The spherical model is
//! accurate to roughly 0.5% which is well inside the tolerance of venue search.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Mean earth radius (IUGG) in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

/// A WGS84 latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Check that both components are finite and inside their ranges.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// Validate as the center of a search request.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(ValidationError::invalid(
                "center.lat",
                format!("{} is not a latitude in [-90, 90]", self.lat),
            ));
        }
        if !self.lng.is_finite() || !(-180.0..=180.0).contains(&self.lng) {
            return Err(ValidationError::invalid(
                "center.lng",
                format!("{} is not a longitude in [-180, 180]", self.lng),
            ));
        }
        Ok(())
    }

    /// Great-circle distance to `other` in meters.
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        haversine_meters(self, other)
    }

    /// Point reached by travelling `distance_m` along the initial bearing
    /// `bearing_deg` (clockwise from north).
    pub fn destination(&self, bearing_deg: f64, distance_m: f64) -> Coordinate {
        let delta = distance_m / EARTH_RADIUS_METERS;
        let theta = bearing_deg.to_radians();
        let phi1 = self.lat.to_radians();
        let lambda1 = self.lng.to_radians();

        let sin_phi2 = phi1.sin() * delta.cos() + phi1.cos() * delta.sin() * theta.cos();
        let phi2 = sin_phi2.clamp(-1.0, 1.0).asin();
        let lambda2 = lambda1
            + (theta.sin() * delta.sin() * phi1.cos()).atan2(delta.cos() - phi1.sin() * sin_phi2);

        Coordinate {
            lat: phi2.to_degrees(),
            lng: normalize_lng(lambda2.to_degrees()),
        }
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lng)
    }
}

/// Haversine great-circle distance in meters.
pub fn haversine_meters(a: &Coordinate, b: &Coordinate) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let d_phi = phi2 - phi1;
    let d_lambda = (b.lng - a.lng).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_METERS * h.sqrt().min(1.0).asin()
}

/// Wrap a longitude into `[-180, 180)`.
pub fn normalize_lng(lng: f64) -> f64 {
    (lng + 180.0).rem_euclid(360.0) - 180.0
}

/// Smallest absolute angular difference between two longitudes, in degrees.
pub fn lng_gap(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(360.0);
    d.min(360.0 - d)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_distance() {
        let p = Coordinate::new(40.0, -73.0);
        assert_eq!(p.distance_to(&p), 0.0);
    }

    #[test]
    fn test_one_degree_latitude() {
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(1.0, 0.0);
        let d = a.distance_to(&b);
        assert!((d - 111_195.0).abs() < 10.0, "got {d}");
    }

    #[test]
    fn test_distance_across_antimeridian() {
        let a = Coordinate::new(0.0, 179.9);
        let b = Coordinate::new(0.0, -179.9);
        let d = a.distance_to(&b);
        assert!((d - 22_239.0).abs() < 5.0, "got {d}");
    }

    #[test]
    fn test_destination_distance_matches() {
        let origin = Coordinate::new(40.0, -73.0);
        for bearing in [0.0, 45.0, 90.0, 180.0, 270.0, 333.0] {
            let p = origin.destination(bearing, 5_000.0);
            let d = origin.distance_to(&p);
            assert!((d - 5_000.0).abs() < 0.01, "bearing {bearing}: {d}");
        }
    }

    #[test]
    fn test_destination_north_increases_latitude() {
        let origin = Coordinate::new(10.0, 10.0);
        let p = origin.destination(0.0, 10_000.0);
        assert!(p.lat > origin.lat);
        assert!((p.lng - origin.lng).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_lng() {
        assert_eq!(normalize_lng(190.0), -170.0);
        assert_eq!(normalize_lng(-190.0), 170.0);
        assert_eq!(normalize_lng(180.0), -180.0);
        assert_eq!(normalize_lng(45.0), 45.0);
    }

    #[test]
    fn test_lng_gap_wraps() {
        assert!((lng_gap(179.0, -179.0) - 2.0).abs() < 1e-9);
        assert!((lng_gap(-10.0, 10.0) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        assert!(Coordinate::new(91.0, 0.0).validate().is_err());
        assert!(Coordinate::new(0.0, -180.5).validate().is_err());
        assert!(Coordinate::new(f64::NAN, 0.0).validate().is_err());
        assert!(Coordinate::new(0.0, f64::INFINITY).validate().is_err());
        assert!(Coordinate::new(-90.0, 180.0).validate().is_ok());
    }
}
