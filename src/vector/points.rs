//! Grid CSV to geographic point layer.

use std::path::Path;

use serde_json::{Map, Number, Value};
use tracing::info;

use super::{Feature, Geometry, VectorError, VectorLayer};
use crate::geometry::projection::{CrsTransformer, WGS84};

/// UTM zone 44N, the projection of the survey grids this tool was built for.
pub const DEFAULT_GRID_EPSG: i32 = 32644;

/// Options for [`grid_csv_to_points`].
#[derive(Debug, Clone)]
pub struct GridCsvOptions {
    pub source_epsg: i32,
    pub target_epsg: i32,
    pub x_column: String,
    pub y_column: String,
}

impl Default for GridCsvOptions {
    fn default() -> Self {
        Self {
            source_epsg: DEFAULT_GRID_EPSG,
            target_epsg: WGS84,
            x_column: "x".to_string(),
            y_column: "y".to_string(),
        }
    }
}

/// Read a CSV of projected grid coordinates and build a point layer in `target_epsg`.
///
/// Every CSV column is kept as a feature property. Rows are numbered from 1,
/// not counting the header.
///
/// # Errors
/// Returns an error if the file cannot be read, a coordinate column is
/// missing, a coordinate is not a number, or a point cannot be transformed.
pub fn grid_csv_to_points<P: AsRef<Path>>(path: P, options: &GridCsvOptions) -> Result<VectorLayer, VectorError> {
    let path = path.as_ref();
    let csv_err = |source| VectorError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::Reader::from_path(path).map_err(csv_err)?;
    let headers = reader.headers().map_err(csv_err)?.clone();
    let column_index = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| VectorError::MissingColumn {
                path: path.to_path_buf(),
                column: name.to_string(),
            })
    };
    let x_idx = column_index(&options.x_column)?;
    let y_idx = column_index(&options.y_column)?;

    let transformer =
        CrsTransformer::new(options.source_epsg, options.target_epsg).map_err(VectorError::Transformer)?;

    let mut features = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let row = i + 1;
        let record = record.map_err(csv_err)?;

        let x = parse_coordinate(record.get(x_idx), row, &options.x_column)?;
        let y = parse_coordinate(record.get(y_idx), row, &options.y_column)?;
        let (lon, lat) = transformer
            .transform(x, y)
            .map_err(|message| VectorError::Reprojection { feature: row, message })?;

        let properties: Map<String, Value> = headers
            .iter()
            .zip(record.iter())
            .map(|(name, value)| (name.trim().to_string(), cell_value(value)))
            .collect();
        features.push(Feature::new(Geometry::Point(vec![lon, lat]), properties));
    }

    info!(
        path = %path.display(),
        points = features.len(),
        source_epsg = options.source_epsg,
        target_epsg = options.target_epsg,
        "Converted grid CSV to points"
    );
    Ok(VectorLayer::new(options.target_epsg, features))
}

fn parse_coordinate(cell: Option<&str>, row: usize, column: &str) -> Result<f64, VectorError> {
    let raw = cell.unwrap_or("").trim();
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| VectorError::InvalidCoordinate {
            row,
            column: column.to_string(),
            value: raw.to_string(),
        })
}

/// Integers and finite floats become JSON numbers, empty cells null, anything else a string.
fn cell_value(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::from(i);
    }
    trimmed
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map_or_else(|| Value::String(raw.to_string()), Value::Number)
}
