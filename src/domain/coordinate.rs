use serde::{Deserialize, Serialize};

/// An immutable (lat, lng) pair in signed decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Canonical rounding to 5 decimal places, used for cache keying and
    /// household grouping. Deterministic and locale-independent.
    pub fn key(&self) -> CoordKey {
        CoordKey(format!("{:.5},{:.5}", self.lat, self.lng))
    }

    pub fn haversine_meters(&self, other: &Coordinate) -> f64 {
        const EARTH_RADIUS_M: f64 = 6_371_000.0;
        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let dlat = (other.lat - self.lat).to_radians();
        let dlng = (other.lng - self.lng).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().asin();
        EARTH_RADIUS_M * c
    }
}

/// Canonical textual form `"{lat:.5f},{lng:.5f}"`. Two coordinates are
/// considered equal for caching/grouping purposes iff their keys match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoordKey(pub String);

impl CoordKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse back into `(lat, lng)` rounded components, used by the
    /// persistence layer when reading cache rows.
    pub fn parts(&self) -> Option<(f64, f64)> {
        let (lat, lng) = self.0.split_once(',')?;
        Some((lat.parse().ok()?, lng.parse().ok()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_stable_and_rounded() {
        let a = Coordinate::new(40.000001, -75.0);
        let b = Coordinate::new(40.000004, -75.0);
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn key_distinguishes_different_points() {
        let a = Coordinate::new(40.00001, -75.0);
        let b = Coordinate::new(40.00010, -75.0);
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn key_round_trips_through_parts() {
        let c = Coordinate::new(40.12345, -75.54321);
        let (lat, lng) = c.key().parts().unwrap();
        assert!((lat - 40.12345).abs() < 1e-9);
        assert!((lng - -75.54321).abs() < 1e-9);
    }
}
