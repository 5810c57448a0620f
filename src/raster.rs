//! In-memory single-band raster with its spatial profile.

use std::path::{Path, PathBuf};

use ndarray::Array2;

use crate::geometry::{BoundingBox, GeoTransform};
use crate::geotiff_writer::GeoTiffCompression;

/// Pixel sample type of a GeoTIFF band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleType {
    U8,
    U16,
    U32,
    I8,
    I16,
    I32,
    #[default]
    F32,
    F64,
}

impl SampleType {
    /// Whether values of this type are IEEE floats.
    #[must_use]
    pub fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }
}

/// Spatial metadata of a raster: everything but the pixels.
///
/// Written outputs reuse the profile of the raster they were derived from,
/// so the same grid, CRS, nodata and compression round-trip unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterProfile {
    pub width: usize,
    pub height: usize,
    pub transform: GeoTransform,
    /// EPSG code, `None` when the file declares no (or a user-defined) CRS
    pub crs: Option<i32>,
    pub nodata: Option<f64>,
    pub sample_type: SampleType,
    pub compression: GeoTiffCompression,
}

impl RasterProfile {
    /// Whether two profiles describe the same pixel grid.
    #[must_use]
    pub fn same_grid(&self, other: &RasterProfile) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.transform == other.transform
            && self.crs == other.crs
    }

    /// Extent in the raster's CRS.
    #[must_use]
    pub fn bounds(&self) -> BoundingBox {
        self.transform.bounds(self.width, self.height)
    }

    /// Number of pixels.
    #[must_use]
    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }
}

/// A single-band raster held fully in memory.
///
/// Missing pixels are `NaN`. The array is indexed `[row, col]`.
#[derive(Debug, Clone)]
pub struct RasterGrid {
    data: Array2<f64>,
    profile: RasterProfile,
    source: Option<PathBuf>,
}

impl RasterGrid {
    /// Wrap an array with its profile.
    ///
    /// # Errors
    /// Returns an error if the array shape differs from the profile's (height, width).
    pub fn new(data: Array2<f64>, profile: RasterProfile) -> Result<Self, String> {
        let (rows, cols) = data.dim();
        if rows != profile.height || cols != profile.width {
            return Err(format!(
                "Array shape {rows}x{cols} does not match declared {}x{}",
                profile.height, profile.width
            ));
        }
        Ok(Self {
            data,
            profile,
            source: None,
        })
    }

    /// Record the file this raster came from.
    #[must_use]
    pub fn with_source<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.source = Some(path.into());
        self
    }

    #[must_use]
    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    #[must_use]
    pub fn into_data(self) -> Array2<f64> {
        self.data
    }

    #[must_use]
    pub fn profile(&self) -> &RasterProfile {
        &self.profile
    }

    /// Path of the file this raster was read from, if any.
    #[must_use]
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// (height, width)
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.profile.width
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.profile.height
    }

    /// Number of pixels that hold a value.
    #[must_use]
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| !v.is_nan()).count()
    }
}
