//! Core data models for water lookups.

pub mod coordinate;

pub use coordinate::{Coordinate, QueryResult};
