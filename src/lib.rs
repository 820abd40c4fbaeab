//! Onwater - answers whether a coordinate lies on water.
//!
//! This library provides the water lookup core and the HTTP API used by the
//! server binary.

pub mod api;
pub mod config;
pub mod models;
pub mod pip;
pub mod telemetry;
pub mod validate;

pub use models::{Coordinate, QueryResult};
pub use pip::WaterClassifier;
