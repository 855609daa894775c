//! # Geo: Great-Circle Distance
//!
//! Haversine distance on a spherical Earth. Pure arithmetic, no I/O; the
//! provider matcher ranks candidates by this value.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Mean Earth radius in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A validated WGS-84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees, `[-90, 90]`.
    pub lat: f64,
    /// Longitude in degrees, `[-180, 180]`.
    pub lng: f64,
}

impl GeoPoint {
    /// Create a point, rejecting non-finite or out-of-range coordinates.
    pub fn new(lat: f64, lng: f64) -> Result<Self, ValidationError> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(ValidationError::CoordinateOutOfRange {
                field: "latitude",
                value: lat,
            });
        }
        if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
            return Err(ValidationError::CoordinateOutOfRange {
                field: "longitude",
                value: lng,
            });
        }
        Ok(Self { lat, lng })
    }

    /// Build a point from an optional pair; `None` unless both are present.
    pub fn from_parts(lat: Option<f64>, lng: Option<f64>) -> Result<Option<Self>, ValidationError> {
        match (lat, lng) {
            (Some(lat), Some(lng)) => Self::new(lat, lng).map(Some),
            _ => Ok(None),
        }
    }

    /// Great-circle distance to `other` in kilometres.
    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        distance_km(self.lat, self.lng, other.lat, other.lng)
    }
}

/// Haversine great-circle distance in kilometres between two points given in
/// degrees.
pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    // Rounding can push `a` a hair past 1.0 for antipodal points.
    let c = 2.0 * a.clamp(0.0, 1.0).sqrt().asin();
    EARTH_RADIUS_KM * c
}
