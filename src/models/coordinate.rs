//! Coordinate and query result types.

use serde::{Deserialize, Serialize};

/// Lower bound accepted for both latitude and longitude.
pub const COORDINATE_MIN: f64 = -180.0;
/// Upper bound accepted for both latitude and longitude.
pub const COORDINATE_MAX: f64 = 180.0;

/// A validated geographic point.
///
/// Latitude shares the longitude range `[-180, 180]`. API consumers rely on
/// this looser bound, so it is kept even though latitudes beyond ±90 do not
/// exist on the globe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinate {
    lat: f64,
    lon: f64,
}

impl Coordinate {
    /// Build a coordinate, returning `None` if either component is not
    /// finite or falls outside `[-180, 180]`.
    pub fn new(lat: f64, lon: f64) -> Option<Self> {
        if in_range(lat) && in_range(lon) {
            Some(Self { lat, lon })
        } else {
            None
        }
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lon(&self) -> f64 {
        self.lon
    }
}

/// Whether a component value is finite and within `[-180, 180]`.
pub fn in_range(value: f64) -> bool {
    value.is_finite() && (COORDINATE_MIN..=COORDINATE_MAX).contains(&value)
}

/// Classification outcome for one coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub lat: f64,
    pub lon: f64,
    pub water: bool,
}

impl QueryResult {
    pub fn new(coordinate: Coordinate, water: bool) -> Self {
        Self {
            lat: coordinate.lat(),
            lon: coordinate.lon(),
            water,
        }
    }
}
