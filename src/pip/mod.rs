//! Point-in-Polygon (PIP) water lookup.
//!
//! Loads water polygons (seas, lakes, rivers) from GeoJSON and provides fast
//! PIP lookups using an R-tree spatial index per collection.

mod geometry;
mod index;
mod ring;
mod service;

pub use geometry::{
    close_ring, load_collection, load_collections, parse_geojson, DatasetError, DatasetSource,
    GeoJsonError, PolygonCollection,
};
pub use index::{IndexedPolygon, SpatialIndex};
pub use ring::{IndexedRing, Location};
pub use service::WaterClassifier;
