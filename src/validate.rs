//! Coordinate validation for query-string and JSON inputs.
//!
//! Values arrive either as text (query strings, or strings inside a JSON
//! body) or as JSON numbers. Both are normalised to `f64` here, before any
//! range check. An absent value and a value of `0` are distinct: only the
//! former is rejected.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;
use thiserror::Error;

use crate::models::coordinate::{in_range, Coordinate};

/// Which component of a coordinate failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Lat,
    Lon,
}

impl Axis {
    pub fn key(&self) -> &'static str {
        match self {
            Axis::Lat => "lat",
            Axis::Lon => "lon",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("expected an object with 'lat' and 'lon' keys")]
    NotAnObject,

    #[error("'{0}' is required")]
    Missing(Axis),

    #[error("'{axis}' must be a finite number, got {raw}")]
    NotNumeric { axis: Axis, raw: String },

    #[error("'{axis}' must be within [-180, 180], got {value}")]
    OutOfRange { axis: Axis, value: f64 },

    #[error("expected an array of coordinates")]
    NotAnArray,

    #[error("element at index {index}: {source}")]
    InvalidElement {
        index: usize,
        source: Box<ValidationError>,
    },
}

/// Validate `lat`/`lon` taken from a query string.
pub fn validate_query(params: &HashMap<String, String>) -> Result<Coordinate, ValidationError> {
    let lat = from_text(Axis::Lat, params.get("lat").map(String::as_str))?;
    let lon = from_text(Axis::Lon, params.get("lon").map(String::as_str))?;
    build(lat, lon)
}

/// Validate one JSON object carrying `lat` and `lon` as numbers or
/// numeric strings.
pub fn validate_value(value: &Value) -> Result<Coordinate, ValidationError> {
    let object = value.as_object().ok_or(ValidationError::NotAnObject)?;
    let lat = from_value(Axis::Lat, object.get("lat"))?;
    let lon = from_value(Axis::Lon, object.get("lon"))?;
    build(lat, lon)
}

/// Validate a batch. The whole batch fails if the input is not an array or
/// if any single element is invalid.
pub fn validate_batch(value: &Value) -> Result<Vec<Coordinate>, ValidationError> {
    let items = value.as_array().ok_or(ValidationError::NotAnArray)?;

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            validate_value(item).map_err(|e| ValidationError::InvalidElement {
                index,
                source: Box::new(e),
            })
        })
        .collect()
}

fn build(lat: f64, lon: f64) -> Result<Coordinate, ValidationError> {
    Coordinate::new(lat, lon).ok_or_else(|| {
        let (axis, value) = if in_range(lat) {
            (Axis::Lon, lon)
        } else {
            (Axis::Lat, lat)
        };
        ValidationError::OutOfRange { axis, value }
    })
}

fn from_value(axis: Axis, value: Option<&Value>) -> Result<f64, ValidationError> {
    match value {
        None | Some(Value::Null) => Err(ValidationError::Missing(axis)),
        Some(Value::Number(n)) => n.as_f64().ok_or_else(|| ValidationError::NotNumeric {
            axis,
            raw: n.to_string(),
        }),
        Some(Value::String(s)) => from_text(axis, Some(s)),
        Some(other) => Err(ValidationError::NotNumeric {
            axis,
            raw: other.to_string(),
        }),
    }
}

fn from_text(axis: Axis, text: Option<&str>) -> Result<f64, ValidationError> {
    let text = match text.map(str::trim) {
        None | Some("") => return Err(ValidationError::Missing(axis)),
        Some(t) => t,
    };

    match text.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(ValidationError::NotNumeric {
            axis,
            raw: format!("{:?}", text),
        }),
    }
}
