//! Water classification across all loaded collections.

use rayon::prelude::*;
use tracing::{debug, info};

use super::geometry::{load_collections, DatasetError, DatasetSource, PolygonCollection};
use super::SpatialIndex;
use crate::models::{Coordinate, QueryResult};

/// Batches smaller than this are classified on the calling thread.
const PARALLEL_BATCH_THRESHOLD: usize = 64;

/// Point-in-water lookup service
pub struct WaterClassifier {
    indices: Vec<SpatialIndex>,
}

impl WaterClassifier {
    /// Create a classifier from prebuilt indices. Indices are queried in
    /// the given order.
    pub fn new(indices: Vec<SpatialIndex>) -> Self {
        Self { indices }
    }

    pub fn from_collections(collections: Vec<PolygonCollection>) -> Self {
        Self::new(collections.into_iter().map(SpatialIndex::build).collect())
    }

    /// Load every dataset and index it. Any failure aborts the whole load.
    pub fn load(sources: &[DatasetSource]) -> Result<Self, DatasetError> {
        let collections = load_collections(sources)?;
        let classifier = Self::from_collections(collections);

        for index in &classifier.indices {
            info!("  {}: {} polygons", index.name(), index.len());
        }

        Ok(classifier)
    }

    /// Whether the coordinate lies in any collection.
    pub fn is_on_water(&self, coordinate: Coordinate) -> bool {
        let hit = self.indices.iter().find(|index| index.contains(coordinate));

        if let Some(index) = hit {
            debug!(
                "({}, {}) is on water ({})",
                coordinate.lat(),
                coordinate.lon(),
                index.name()
            );
        }

        hit.is_some()
    }

    pub fn classify(&self, coordinate: Coordinate) -> QueryResult {
        QueryResult::new(coordinate, self.is_on_water(coordinate))
    }

    /// Classify a batch. Results are in input order.
    pub fn classify_all(&self, coordinates: &[Coordinate]) -> Vec<QueryResult> {
        if coordinates.len() < PARALLEL_BATCH_THRESHOLD {
            coordinates.iter().map(|c| self.classify(*c)).collect()
        } else {
            coordinates.par_iter().map(|c| self.classify(*c)).collect()
        }
    }

    /// Get the loaded indices (for stats/debugging)
    pub fn collections(&self) -> &[SpatialIndex] {
        &self.indices
    }
}
