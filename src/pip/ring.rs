//! Point location against a single closed ring.
//!
//! Uses crossing-number ray casting: a horizontal ray is cast from the point
//! towards +x and the number of edges it crosses decides inside/outside. An
//! edge is counted when exactly one of its endpoints lies strictly above the
//! point, so a ray passing through a shared vertex is counted once.
//!
//! Points lying on an edge (or vertex), as computed in f64, are reported as
//! `Boundary`. A point that is on an edge only in exact arithmetic may land
//! on either side, but always on the same side for the same input.
//!
//! Large rings additionally carry a latitude band index: the ring's y-range
//! is split into equal bands and each band lists the edges whose y-span
//! overlaps it. A query then only visits the edges of the band containing
//! the point's y.

use geo::{Coord, LineString};

/// Rings with fewer edges than this are scanned linearly.
const BAND_THRESHOLD: usize = 64;

/// Target number of edges per band.
const EDGES_PER_BAND: usize = 16;

/// Upper bound on band entries per edge, averaged over the ring. Rings with
/// many tall edges (combs, long slivers) would otherwise store each edge in
/// most bands, so they fall back to a linear scan.
const MAX_BANDS_PER_EDGE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Inside,
    Boundary,
    Outside,
}

#[derive(Debug, Clone)]
struct EdgeBands {
    min_y: f64,
    max_y: f64,
    band_height: f64,
    bands: Vec<Vec<u32>>,
}

impl EdgeBands {
    fn build(vertices: &[Coord<f64>]) -> Option<Self> {
        let edge_count = vertices.len() - 1;
        if edge_count < BAND_THRESHOLD {
            return None;
        }

        let (min_y, max_y) = vertices
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), c| {
                (lo.min(c.y), hi.max(c.y))
            });

        let band_count = (edge_count / EDGES_PER_BAND).max(1);
        let band_height = (max_y - min_y) / band_count as f64;
        if band_height <= 0.0 {
            return None;
        }

        let mut index = Self {
            min_y,
            max_y,
            band_height,
            bands: vec![Vec::new(); band_count],
        };

        let spans: Vec<(usize, usize)> = vertices
            .windows(2)
            .map(|edge| {
                (
                    index.band_of(edge[0].y.min(edge[1].y)),
                    index.band_of(edge[0].y.max(edge[1].y)),
                )
            })
            .collect();

        let entries: usize = spans.iter().map(|(lo, hi)| hi - lo + 1).sum();
        if entries > MAX_BANDS_PER_EDGE * edge_count {
            return None;
        }

        for (i, &(lo, hi)) in spans.iter().enumerate() {
            for band in &mut index.bands[lo..=hi] {
                band.push(i as u32);
            }
        }

        Some(index)
    }

    fn band_of(&self, y: f64) -> usize {
        let band = ((y - self.min_y) / self.band_height) as usize;
        band.min(self.bands.len() - 1)
    }

    fn edges_at(&self, y: f64) -> Option<&[u32]> {
        if y < self.min_y || y > self.max_y {
            return None;
        }
        Some(&self.bands[self.band_of(y)])
    }
}

/// A closed ring prepared for repeated point location.
#[derive(Debug, Clone)]
pub struct IndexedRing {
    /// Closed: the last vertex equals the first.
    vertices: Vec<Coord<f64>>,
    bands: Option<EdgeBands>,
}

impl IndexedRing {
    /// Prepare a ring. Unclosed rings are closed implicitly; rings with fewer
    /// than three distinct vertices yield `None`.
    pub fn new(ring: &LineString<f64>) -> Option<Self> {
        Self::from_coords(ring.0.clone())
    }

    pub fn from_coords(coords: Vec<Coord<f64>>) -> Option<Self> {
        let vertices = super::geometry::close_ring(coords)?;
        let bands = EdgeBands::build(&vertices);
        Some(Self { vertices, bands })
    }

    pub fn edge_count(&self) -> usize {
        self.vertices.len() - 1
    }

    pub fn is_banded(&self) -> bool {
        self.bands.is_some()
    }

    /// Locate a point relative to this ring.
    pub fn locate(&self, point: Coord<f64>) -> Location {
        match &self.bands {
            Some(bands) => match bands.edges_at(point.y) {
                Some(edges) => self.locate_edges(point, edges.iter().map(|&i| i as usize)),
                None => Location::Outside,
            },
            None => self.locate_edges(point, 0..self.edge_count()),
        }
    }

    fn locate_edges(&self, point: Coord<f64>, edges: impl Iterator<Item = usize>) -> Location {
        let mut inside = false;

        for i in edges {
            let a = self.vertices[i];
            let b = self.vertices[i + 1];

            if on_segment(point, a, b) {
                return Location::Boundary;
            }

            if (a.y > point.y) != (b.y > point.y) {
                let x_cross = a.x + (point.y - a.y) * (b.x - a.x) / (b.y - a.y);
                if point.x < x_cross {
                    inside = !inside;
                }
            }
        }

        if inside {
            Location::Inside
        } else {
            Location::Outside
        }
    }
}

/// Test for `p` lying on the closed segment `a`-`b`, with the cross product
/// evaluated in f64.
fn on_segment(p: Coord<f64>, a: Coord<f64>, b: Coord<f64>) -> bool {
    let cross = (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x);
    cross == 0.0
        && p.x >= a.x.min(b.x)
        && p.x <= a.x.max(b.x)
        && p.y >= a.y.min(b.y)
        && p.y <= a.y.max(b.y)
}
