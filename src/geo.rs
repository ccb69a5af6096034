//! Spherical location: longitude/latitude/height with great-circle and
//! chord distance. Grounded on the original `lib/location.hh`/`location.cc`:
//! internally the point is kept as radians-lon, radians-lat, and an
//! effective radius from Earth's center so both distance formulas fall out
//! of the same three numbers.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Mean Earth radius in kilometers, matching the original's constant.
pub const MEAN_EARTH_RADIUS_KM: f64 = 6371.0088;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Geo {
    /// Longitude in radians east.
    longitude: f64,
    /// Latitude in radians north.
    latitude: f64,
    /// Radius in km from Earth's center (height folded in).
    radius: f64,
}

#[derive(Serialize, Deserialize)]
struct GeoJson {
    longitude: f64,
    latitude: f64,
    height: f64,
}

impl Geo {
    pub fn new(longitude_deg: f64, latitude_deg: f64, height_m: f64) -> Self {
        Geo {
            longitude: longitude_deg * PI / 180.0,
            latitude: latitude_deg * PI / 180.0,
            radius: height_m / 1000.0 + MEAN_EARTH_RADIUS_KM,
        }
    }

    /// Default, `isNull`, point: zero radius.
    pub fn null() -> Self {
        Geo {
            longitude: 0.0,
            latitude: 0.0,
            radius: 0.0,
        }
    }

    pub fn is_null(&self) -> bool {
        self.radius == 0.0
    }

    pub fn longitude_deg(&self) -> f64 {
        180.0 * self.longitude / PI
    }

    pub fn latitude_deg(&self) -> f64 {
        180.0 * self.latitude / PI
    }

    pub fn height_m(&self) -> f64 {
        (self.radius - MEAN_EARTH_RADIUS_KM) * 1000.0
    }

    /// Great-circle distance via the haversine formula, in kilometers.
    pub fn great_circle_distance_km(&self, other: &Geo) -> f64 {
        let sin_dlat = ((self.latitude - other.latitude) / 2.0).sin();
        let sin_dlon = ((self.longitude - other.longitude) / 2.0).sin();
        let a = sin_dlat * sin_dlat
            + self.latitude.cos() * other.latitude.cos() * sin_dlon * sin_dlon;
        2.0 * MEAN_EARTH_RADIUS_KM * a.sqrt().asin()
    }

    /// Straight-line (chord) distance between the two points in kilometers,
    /// each projected from its own radius (so differing heights are
    /// respected, unlike a pure-sphere-surface chord).
    pub fn chord_distance_km(&self, other: &Geo) -> f64 {
        let (x1, y1, z1) = self.ecef();
        let (x2, y2, z2) = other.ecef();
        ((x1 - x2).powi(2) + (y1 - y2).powi(2) + (z1 - z2).powi(2)).sqrt()
    }

    fn ecef(&self) -> (f64, f64, f64) {
        let x = self.radius * self.latitude.cos() * self.longitude.cos();
        let y = self.radius * self.latitude.sin();
        let z = self.radius * self.latitude.cos() * self.longitude.sin();
        (x, y, z)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(GeoJson {
            longitude: self.longitude_deg(),
            latitude: self.latitude_deg(),
            height: self.height_m(),
        })
        .expect("Geo serializes infallibly")
    }

    pub fn from_json(value: &serde_json::Value) -> Result<Self, Error> {
        let parsed: GeoJson = serde_json::from_value(value.clone())?;
        Ok(Geo::new(parsed.longitude, parsed.latitude, parsed.height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_point_is_null() {
        assert!(Geo::null().is_null());
    }

    #[test]
    fn constructed_point_is_not_null() {
        assert!(!Geo::new(0.0, 0.0, 0.0).is_null());
    }

    #[test]
    fn json_round_trips_within_a_ulp_per_degree() {
        let g = Geo::new(28.9784, 41.0082, 39.0);
        let json = g.to_json();
        let parsed = Geo::from_json(&json).unwrap();
        assert!((g.longitude_deg() - parsed.longitude_deg()).abs() < 1e-9);
        assert!((g.latitude_deg() - parsed.latitude_deg()).abs() < 1e-9);
        assert!((g.height_m() - parsed.height_m()).abs() < 1e-6);
    }

    #[test]
    fn great_circle_distance_between_identical_points_is_zero() {
        let a = Geo::new(10.0, 50.0, 0.0);
        assert!(a.great_circle_distance_km(&a) < 1e-9);
    }

    #[test]
    fn great_circle_distance_matches_known_city_pair() {
        // Istanbul and Ankara, roughly 350 km apart great-circle.
        let istanbul = Geo::new(28.9784, 41.0082, 0.0);
        let ankara = Geo::new(32.8597, 39.9334, 0.0);
        let d = istanbul.great_circle_distance_km(&ankara);
        assert!((300.0..420.0).contains(&d), "unexpected distance {d}");
    }

    #[test]
    fn chord_distance_is_never_greater_than_great_circle_for_same_height() {
        let a = Geo::new(0.0, 0.0, 0.0);
        let b = Geo::new(90.0, 0.0, 0.0);
        assert!(a.chord_distance_km(&b) <= a.great_circle_distance_km(&b) + 1e-9);
    }
}
