//! Vector point layers: grid CSV conversion, reprojection and subsetting.
//!
//! Layers are read and written as GeoJSON `FeatureCollection`s. The source
//! CRS travels in the legacy `crs` member (`urn:ogc:def:crs:EPSG::32644`),
//! which is also written on output so downstream tools see the EPSG code.

pub mod points;
pub mod reproject;

pub use points::{grid_csv_to_points, GridCsvOptions};
pub use reproject::{reproject_layer, subset_layer, ReprojectOptions, DEFAULT_SUBSET_SEED};

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::geometry::projection::WGS84;

#[derive(Debug, Error)]
pub enum VectorError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid GeoJSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to read CSV {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("column {column} not found in {path}")]
    MissingColumn { path: PathBuf, column: String },

    #[error("row {row}: column {column} is not a number ({value:?})")]
    InvalidCoordinate { row: usize, column: String, value: String },

    #[error("unrecognised CRS {0:?}")]
    UnsupportedCrs(String),

    #[error("cannot build transformer: {0}")]
    Transformer(String),

    #[error("feature {feature}: {message}")]
    Reprojection { feature: usize, message: String },

    #[error("cannot sample {requested} features from a layer of {available}")]
    SubsetTooLarge { requested: usize, available: usize },
}

/// A GeoJSON position; `[x, y]` or `[x, y, z]`.
pub type Position = Vec<f64>;

/// Supported GeoJSON geometries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point(Position),
    MultiPoint(Vec<Position>),
    LineString(Vec<Position>),
    Polygon(Vec<Vec<Position>>),
}

impl Geometry {
    /// Every position of the geometry, in document order.
    pub fn positions(&self) -> Box<dyn Iterator<Item = &Position> + '_> {
        match self {
            Self::Point(p) => Box::new(std::iter::once(p)),
            Self::MultiPoint(ps) | Self::LineString(ps) => Box::new(ps.iter()),
            Self::Polygon(rings) => Box::new(rings.iter().flatten()),
        }
    }

    /// Apply `f` to every position in place.
    ///
    /// # Errors
    /// Stops at the first position `f` rejects.
    pub fn try_map_positions<E>(&mut self, mut f: impl FnMut(&mut Position) -> Result<(), E>) -> Result<(), E> {
        match self {
            Self::Point(p) => f(p),
            Self::MultiPoint(ps) | Self::LineString(ps) => ps.iter_mut().try_for_each(f),
            Self::Polygon(rings) => rings.iter_mut().flatten().try_for_each(f),
        }
    }

    /// The point itself, or the mean of all vertices for other geometries.
    #[must_use]
    pub fn representative_point(&self) -> Option<(f64, f64)> {
        if let Self::Point(p) = self {
            return (p.len() >= 2).then(|| (p[0], p[1]));
        }
        let (sx, sy, n) = self
            .positions()
            .filter(|p| p.len() >= 2)
            .fold((0.0, 0.0, 0usize), |(sx, sy, n), p| (sx + p[0], sy + p[1], n + 1));
        if n == 0 {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        let n = n as f64;
        Some((sx / n, sy / n))
    }
}

/// A GeoJSON feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub struct Feature {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub geometry: Option<Geometry>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub properties: Map<String, Value>,
}

impl Feature {
    #[must_use]
    pub fn new(geometry: Geometry, properties: Map<String, Value>) -> Self {
        Self {
            id: None,
            geometry: Some(geometry),
            properties,
        }
    }
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Map<String, Value>, D::Error> {
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
struct FeatureCollection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    crs: Option<Value>,
    features: Vec<Feature>,
}

/// Features sharing one CRS.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorLayer {
    pub epsg: i32,
    pub features: Vec<Feature>,
}

impl VectorLayer {
    #[must_use]
    pub fn new(epsg: i32, features: Vec<Feature>) -> Self {
        Self { epsg, features }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Read a GeoJSON `FeatureCollection`.
///
/// `epsg` overrides the file's `crs` member. Without either the layer is
/// taken to be WGS84, the GeoJSON default.
///
/// # Errors
/// Returns an error if the file cannot be read or parsed, or names a CRS
/// that is not an EPSG code.
pub fn read_geojson<P: AsRef<Path>>(path: P, epsg: Option<i32>) -> Result<VectorLayer, VectorError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| VectorError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let collection: FeatureCollection =
        serde_json::from_reader(BufReader::new(file)).map_err(|source| VectorError::Json {
            path: path.to_path_buf(),
            source,
        })?;

    let epsg = match (epsg, &collection.crs) {
        (Some(code), _) => code,
        (None, Some(crs)) => epsg_from_crs_member(crs)?,
        (None, None) => WGS84,
    };
    debug!(path = %path.display(), epsg, features = collection.features.len(), "Read vector layer");

    Ok(VectorLayer {
        epsg,
        features: collection.features,
    })
}

/// Write a layer as a GeoJSON `FeatureCollection` with a `crs` member.
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn write_geojson<P: AsRef<Path>>(layer: &VectorLayer, path: P) -> Result<(), VectorError> {
    let path = path.as_ref();
    let io_err = |source| VectorError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let collection = FeatureCollection {
        crs: Some(crs_member(layer.epsg)),
        features: layer.features.clone(),
    };
    let mut writer = BufWriter::new(File::create(path).map_err(io_err)?);
    serde_json::to_writer_pretty(&mut writer, &collection).map_err(|source| VectorError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    writer.flush().map_err(io_err)?;

    debug!(path = %path.display(), epsg = layer.epsg, features = layer.len(), "Wrote vector layer");
    Ok(())
}

fn crs_member(epsg: i32) -> Value {
    json!({
        "type": "name",
        "properties": { "name": format!("urn:ogc:def:crs:EPSG::{epsg}") }
    })
}

/// Parse `EPSG:32644`, `urn:ogc:def:crs:EPSG::32644` or `urn:ogc:def:crs:OGC:1.3:CRS84`.
fn epsg_from_crs_member(crs: &Value) -> Result<i32, VectorError> {
    let name = crs
        .pointer("/properties/name")
        .and_then(Value::as_str)
        .ok_or_else(|| VectorError::UnsupportedCrs(crs.to_string()))?;

    if name.ends_with("CRS84") {
        return Ok(WGS84);
    }
    if !name.to_ascii_uppercase().contains("EPSG") {
        return Err(VectorError::UnsupportedCrs(name.to_string()));
    }
    name.rsplit(':')
        .next()
        .and_then(|code| code.trim().parse().ok())
        .ok_or_else(|| VectorError::UnsupportedCrs(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("geodownscale-vector-{}-{name}", std::process::id()))
    }

    #[test]
    fn test_crs_member_parsing() {
        assert_eq!(epsg_from_crs_member(&crs_member(32644)).unwrap(), 32644);
        let short = json!({"type": "name", "properties": {"name": "EPSG:3857"}});
        assert_eq!(epsg_from_crs_member(&short).unwrap(), 3857);
        let crs84 = json!({"type": "name", "properties": {"name": "urn:ogc:def:crs:OGC:1.3:CRS84"}});
        assert_eq!(epsg_from_crs_member(&crs84).unwrap(), 4326);
        let other = json!({"type": "name", "properties": {"name": "local"}});
        assert!(epsg_from_crs_member(&other).is_err());
    }

    #[test]
    fn test_geometry_json_shape() {
        let g = Geometry::Point(vec![1.0, 2.0]);
        assert_eq!(serde_json::to_value(&g).unwrap(), json!({"type": "Point", "coordinates": [1.0, 2.0]}));

        let poly: Geometry = serde_json::from_value(json!({
            "type": "Polygon",
            "coordinates": [[[0.0, 0.0], [2.0, 0.0], [2.0, 2.0], [0.0, 2.0]]]
        }))
        .unwrap();
        assert_eq!(poly.representative_point(), Some((1.0, 1.0)));
    }

    #[test]
    fn test_null_properties_and_geometry() {
        let f: Feature = serde_json::from_value(json!({"type": "Feature", "geometry": null, "properties": null})).unwrap();
        assert!(f.geometry.is_none());
        assert!(f.properties.is_empty());
    }

    #[test]
    fn test_write_then_read() {
        let path = temp_path("roundtrip.geojson");
        let mut props = Map::new();
        props.insert("value".into(), json!(3));
        let layer = VectorLayer::new(32644, vec![Feature::new(Geometry::Point(vec![500000.0, 3000000.0]), props)]);

        write_geojson(&layer, &path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("urn:ogc:def:crs:EPSG::32644"));
        assert!(text.contains("\"type\": \"FeatureCollection\""));

        let back = read_geojson(&path, None).unwrap();
        assert_eq!(back, layer);
        assert_eq!(read_geojson(&path, Some(32645)).unwrap().epsg, 32645);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_missing_crs_defaults_to_wgs84() {
        let path = temp_path("nocrs.geojson");
        fs::write(&path, r#"{"type": "FeatureCollection", "features": []}"#).unwrap();
        assert_eq!(read_geojson(&path, None).unwrap().epsg, 4326);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_unsupported_geometry_is_parse_error() {
        let path = temp_path("bad.geojson");
        fs::write(
            &path,
            r#"{"type": "FeatureCollection", "features": [{"type": "Feature", "properties": {}, "geometry": {"type": "GeometryCollection", "geometries": []}}]}"#,
        )
        .unwrap();
        assert!(matches!(read_geojson(&path, None), Err(VectorError::Json { .. })));
        let _ = fs::remove_file(&path);
    }
}
