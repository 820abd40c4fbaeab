//! Spatial index for fast water polygon lookups.

use geo::{BoundingRect, Coord, Polygon};
use rayon::prelude::*;
use rstar::{RTree, RTreeObject, AABB};
use tracing::info;

use super::geometry::PolygonCollection;
use super::ring::{IndexedRing, Location};
use crate::models::Coordinate;

/// Wrapper for R-tree indexing of a single water polygon
#[derive(Debug, Clone)]
pub struct IndexedPolygon {
    exterior: IndexedRing,
    interiors: Vec<IndexedRing>,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedPolygon {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

impl IndexedPolygon {
    pub fn new(polygon: &Polygon<f64>) -> Option<Self> {
        let rect = polygon.bounding_rect()?;
        let exterior = IndexedRing::new(polygon.exterior())?;
        let interiors = polygon
            .interiors()
            .iter()
            .filter_map(IndexedRing::new)
            .collect();

        Some(Self {
            exterior,
            interiors,
            envelope: AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
        })
    }

    /// Polygons are closed: a point on the outer ring is contained, and a
    /// point on a hole's ring is contained too (holes are open).
    pub fn contains(&self, point: Coord<f64>) -> bool {
        match self.exterior.locate(point) {
            Location::Outside => false,
            Location::Boundary => true,
            Location::Inside => !self
                .interiors
                .iter()
                .any(|hole| hole.locate(point) == Location::Inside),
        }
    }

    fn edge_count(&self) -> usize {
        self.exterior.edge_count() + self.interiors.iter().map(IndexedRing::edge_count).sum::<usize>()
    }
}

/// Spatial index for one named water collection using an R-tree
pub struct SpatialIndex {
    name: String,
    tree: RTree<IndexedPolygon>,
}

impl SpatialIndex {
    /// Build spatial index from a polygon collection
    pub fn build(collection: PolygonCollection) -> Self {
        info!(
            "Building spatial index '{}' for {} polygons...",
            collection.name,
            collection.polygons.len()
        );

        let indexed: Vec<IndexedPolygon> = collection
            .polygons
            .par_iter()
            .filter_map(IndexedPolygon::new)
            .collect();

        let edges: usize = indexed.iter().map(IndexedPolygon::edge_count).sum();
        let tree = RTree::bulk_load(indexed);

        info!(
            "Spatial index '{}' built with {} entries, {} edges",
            collection.name,
            tree.size(),
            edges
        );

        Self {
            name: collection.name,
            tree,
        }
    }

    /// Whether any polygon of this collection contains the coordinate.
    ///
    /// Longitudes -180 and 180 denote the same meridian, so a query on it is
    /// also tried with the opposite sign.
    pub fn contains(&self, coordinate: Coordinate) -> bool {
        let (lon, lat) = (coordinate.lon(), coordinate.lat());

        if self.contains_point(lon, lat) {
            return true;
        }
        lon.abs() == 180.0 && self.contains_point(-lon, lat)
    }

    fn contains_point(&self, lon: f64, lat: f64) -> bool {
        let point = Coord { x: lon, y: lat };
        let query_envelope = AABB::from_point([lon, lat]);

        // R-tree narrows to polygons whose envelope covers the point, then
        // the exact ring test decides. Stops at the first hit.
        self.tree
            .locate_in_envelope_intersecting(&query_envelope)
            .any(|ip| ip.contains(point))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get total number of indexed polygons
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}
