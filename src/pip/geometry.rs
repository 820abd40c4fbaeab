//! Water geometry loading from GeoJSON datasets.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use geo::{Coord, LineString, Polygon};
use rayon::prelude::*;
use serde::de::{self, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::{debug, info};

/// A named dataset to load at startup, e.g. `seas` from a `.geo.json.gz` file.
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetSource {
    pub name: String,
    pub path: PathBuf,
}

impl DatasetSource {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// A named set of polygons, immutable once loaded.
#[derive(Debug, Clone)]
pub struct PolygonCollection {
    pub name: String,
    pub polygons: Vec<Polygon<f64>>,
}

#[derive(Debug, Error)]
pub enum GeoJsonError {
    #[error("invalid GeoJSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0} coordinates must be an array of rings of positions")]
    Shape(&'static str),
}

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("no datasets configured")]
    NoDatasets,

    #[error("failed to read dataset '{name}' from {}: {source}", .path.display())]
    Io {
        name: String,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse dataset '{name}' from {}: {source}", .path.display())]
    Parse {
        name: String,
        path: PathBuf,
        source: GeoJsonError,
    },

    #[error("dataset '{name}' from {} contains no polygons", .path.display())]
    Empty { name: String, path: PathBuf },
}

/// The subset of GeoJSON we care about. Anything that is not a polygon or
/// a container of polygons collapses into `Other` and is discarded.
///
/// Decoded by a streaming visitor: objects are never buffered, `properties`
/// are skipped and positions go straight into `Coord`s.
#[derive(Debug)]
enum GeoJson {
    FeatureCollection { features: Vec<GeoJson> },
    Feature { geometry: Option<Box<GeoJson>> },
    GeometryCollection { geometries: Vec<GeoJson> },
    Polygon { coordinates: Coordinates },
    MultiPolygon { coordinates: Coordinates },
    Other,
}

impl<'de> Deserialize<'de> for GeoJson {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(GeoJsonVisitor)
    }
}

struct GeoJsonVisitor;

impl<'de> Visitor<'de> for GeoJsonVisitor {
    type Value = GeoJson;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a GeoJSON object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<GeoJson, A::Error> {
        let mut kind: Option<String> = None;
        let mut features = None;
        let mut geometry = None;
        let mut geometries = None;
        let mut coordinates = None;

        while let Some(key) = map.next_key::<String>()? {
            match key.as_str() {
                "type" => kind = Some(map.next_value()?),
                "features" => features = Some(map.next_value::<Vec<GeoJson>>()?),
                "geometry" => geometry = map.next_value::<Option<GeoJson>>()?,
                "geometries" => geometries = Some(map.next_value::<Vec<GeoJson>>()?),
                "coordinates" => coordinates = Some(map.next_value::<Coordinates>()?),
                _ => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }

        let missing = |field: &'static str| <A::Error as de::Error>::missing_field(field);
        let kind = kind.ok_or_else(|| missing("type"))?;
        let object = match kind.as_str() {
            "FeatureCollection" => GeoJson::FeatureCollection {
                features: features.ok_or_else(|| missing("features"))?,
            },
            "Feature" => GeoJson::Feature {
                geometry: geometry.map(Box::new),
            },
            "GeometryCollection" => GeoJson::GeometryCollection {
                geometries: geometries.ok_or_else(|| missing("geometries"))?,
            },
            "Polygon" => GeoJson::Polygon {
                coordinates: coordinates.ok_or_else(|| missing("coordinates"))?,
            },
            "MultiPolygon" => GeoJson::MultiPolygon {
                coordinates: coordinates.ok_or_else(|| missing("coordinates"))?,
            },
            _ => GeoJson::Other,
        };
        Ok(object)
    }
}

/// A `coordinates` member of any depth. The nesting is only checked against
/// the geometry type once the whole object has been read, since `type` may
/// come after `coordinates`.
#[derive(Debug)]
enum Coordinates {
    Position(Coord<f64>),
    List(Vec<Coordinates>),
}

impl<'de> Deserialize<'de> for Coordinates {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_seq(CoordinatesVisitor)
    }
}

struct CoordinatesVisitor;

impl<'de> Visitor<'de> for CoordinatesVisitor {
    type Value = Coordinates;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a GeoJSON position or an array of positions")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Coordinates, A::Error> {
        match seq.next_element::<Element>()? {
            None => Ok(Coordinates::List(Vec::new())),
            Some(Element::Number(x)) => {
                let y = seq.next_element::<f64>()?.ok_or_else(|| {
                    <A::Error as de::Error>::invalid_length(1, &"a position with at least two numbers")
                })?;
                // Altitude and any further values are ignored
                while seq.next_element::<IgnoredAny>()?.is_some() {}
                Ok(Coordinates::Position(Coord { x, y }))
            }
            Some(Element::Nested(first)) => {
                let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0) + 1);
                items.push(first);
                while let Some(item) = seq.next_element::<Coordinates>()? {
                    items.push(item);
                }
                Ok(Coordinates::List(items))
            }
        }
    }
}

/// First element of a coordinate array, which decides whether the array is a
/// position or a list.
enum Element {
    Number(f64),
    Nested(Coordinates),
}

impl<'de> Deserialize<'de> for Element {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ElementVisitor)
    }
}

struct ElementVisitor;

impl<'de> Visitor<'de> for ElementVisitor {
    type Value = Element;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a number or an array")
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Element, E> {
        Ok(Element::Number(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Element, E> {
        Ok(Element::Number(v as f64))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Element, E> {
        Ok(Element::Number(v as f64))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, seq: A) -> Result<Element, A::Error> {
        CoordinatesVisitor.visit_seq(seq).map(Element::Nested)
    }
}

/// Parse GeoJSON and return every polygon it contains.
///
/// MultiPolygons are flattened into their member polygons.
pub fn parse_geojson(bytes: &[u8]) -> Result<Vec<Polygon<f64>>, GeoJsonError> {
    let document: GeoJson = serde_json::from_slice(bytes)?;
    let mut polygons = Vec::new();
    collect_polygons(document, &mut polygons)?;
    Ok(polygons)
}

fn collect_polygons(
    object: GeoJson,
    polygons: &mut Vec<Polygon<f64>>,
) -> Result<(), GeoJsonError> {
    match object {
        GeoJson::FeatureCollection { features } => {
            for feature in features {
                collect_polygons(feature, polygons)?;
            }
        }
        GeoJson::Feature { geometry } => {
            if let Some(geometry) = geometry {
                collect_polygons(*geometry, polygons)?;
            }
        }
        GeoJson::GeometryCollection { geometries } => {
            for geometry in geometries {
                collect_polygons(geometry, polygons)?;
            }
        }
        GeoJson::Polygon { coordinates } => {
            if let Some(polygon) = build_polygon(rings_of("Polygon", coordinates)?) {
                polygons.push(polygon);
            }
        }
        GeoJson::MultiPolygon { coordinates } => {
            let Coordinates::List(members) = coordinates else {
                return Err(GeoJsonError::Shape("MultiPolygon"));
            };
            for member in members {
                if let Some(polygon) = build_polygon(rings_of("MultiPolygon", member)?) {
                    polygons.push(polygon);
                }
            }
        }
        GeoJson::Other => {}
    }
    Ok(())
}

/// Unpack polygon coordinates: an array of rings, each an array of positions.
fn rings_of(
    kind: &'static str,
    coordinates: Coordinates,
) -> Result<Vec<Vec<Coord<f64>>>, GeoJsonError> {
    let Coordinates::List(rings) = coordinates else {
        return Err(GeoJsonError::Shape(kind));
    };

    rings
        .into_iter()
        .map(|ring| match ring {
            Coordinates::List(positions) => positions
                .into_iter()
                .map(|position| match position {
                    Coordinates::Position(coord) => Ok(coord),
                    Coordinates::List(_) => Err(GeoJsonError::Shape(kind)),
                })
                .collect(),
            Coordinates::Position(_) => Err(GeoJsonError::Shape(kind)),
        })
        .collect()
}

/// Build a polygon from GeoJSON rings (first is the exterior, the rest holes).
///
/// Returns `None` when the exterior ring is degenerate. Degenerate holes are
/// dropped.
fn build_polygon(rings: Vec<Vec<Coord<f64>>>) -> Option<Polygon<f64>> {
    let mut rings = rings.into_iter();
    let exterior = close_ring(rings.next()?)?;
    let interiors = rings
        .filter_map(close_ring)
        .map(LineString::new)
        .collect();

    Some(Polygon::new(LineString::new(exterior), interiors))
}

/// Close a ring if needed. Returns `None` for rings with fewer than three
/// distinct vertices.
pub fn close_ring(mut ring: Vec<Coord<f64>>) -> Option<Vec<Coord<f64>>> {
    if ring.len() < 3 {
        return None;
    }

    if ring.first() != ring.last() {
        ring.push(ring[0]);
    }

    if ring.len() < 4 {
        return None;
    }

    Some(ring)
}

/// Load one dataset. Files ending in `.gz` are decompressed on the fly.
pub fn load_collection(source: &DatasetSource) -> Result<PolygonCollection, DatasetError> {
    let name = source.name.clone();
    let path = source.path.clone();

    info!("Loading dataset '{}' from {}", name, path.display());

    let bytes = read_dataset(&path).map_err(|e| DatasetError::Io {
        name: name.clone(),
        path: path.clone(),
        source: e,
    })?;

    let polygons = parse_geojson(&bytes).map_err(|e| DatasetError::Parse {
        name: name.clone(),
        path: path.clone(),
        source: e,
    })?;

    if polygons.is_empty() {
        return Err(DatasetError::Empty { name, path });
    }

    debug!(
        "Dataset '{}' parsed: {} bytes, {} polygons",
        name,
        bytes.len(),
        polygons.len()
    );

    Ok(PolygonCollection { name, polygons })
}

/// Load all datasets in parallel, keeping their configured order.
///
/// Fails if no dataset is configured or if any single dataset fails.
pub fn load_collections(sources: &[DatasetSource]) -> Result<Vec<PolygonCollection>, DatasetError> {
    if sources.is_empty() {
        return Err(DatasetError::NoDatasets);
    }

    sources.par_iter().map(load_collection).collect()
}

fn read_dataset(path: &Path) -> std::io::Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let mut bytes = Vec::new();

    if path.extension().is_some_and(|ext| ext == "gz") {
        GzDecoder::new(file).read_to_end(&mut bytes)?;
    } else {
        file.read_to_end(&mut bytes)?;
    }

    Ok(bytes)
}
