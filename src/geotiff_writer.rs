//! GeoTIFF writer for single-band rasters
//!
//! This module writes a [`RasterGrid`] to a GeoTIFF file using the pure Rust
//! `tiff` crate. Georeferencing comes straight from the raster's
//! [`RasterProfile`](crate::raster::RasterProfile): transform, CRS, nodata and
//! compression are reproduced as-is.
//!
//! # Example
//!
//! ```rust,no_run
//! use geodownscale::geotiff_reader::read_geotiff;
//! use geodownscale::GeoTiffCompression;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let raster = read_geotiff("input.tif")?;
//!
//!     raster.geotiff_writer()
//!         .compression(GeoTiffCompression::Deflate)
//!         .write("output.tif")?;
//!     Ok(())
//! }
//! ```

use std::fs::{self, File};
use std::io::{BufWriter, Seek, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tiff::encoder::colortype::{Gray32Float, Gray64Float};
use tiff::encoder::{Compression, DeflateLevel, TiffEncoder};
use tiff::tags::Tag;
use tracing::debug;

use crate::casting::usize_to_u32;
use crate::geometry::projection::{get_proj_string, is_geographic_crs};
use crate::raster::{RasterGrid, SampleType};

// GeoTIFF Tag IDs (not in standard tiff crate)
pub(crate) const GEOTIFF_MODELPIXELSCALE: u16 = 33550;
pub(crate) const GEOTIFF_MODELTIEPOINT: u16 = 33922;
pub(crate) const GEOTIFF_MODELTRANSFORMATION: u16 = 34264;
pub(crate) const GEOTIFF_GEOKEYDIRECTORY: u16 = 34735;
pub(crate) const GEOTIFF_GEOASCIIPARAMS: u16 = 34737;
pub(crate) const GDAL_NODATA: u16 = 42113;

// GeoKey IDs
pub(crate) const GT_MODEL_TYPE_GEO_KEY: u16 = 1024;
pub(crate) const GT_RASTER_TYPE_GEO_KEY: u16 = 1025;
pub(crate) const GEOGRAPHIC_TYPE_GEO_KEY: u16 = 2048;
pub(crate) const PROJECTED_CS_TYPE_GEO_KEY: u16 = 3072;

// GeoKey values
const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;

/// Compression method for GeoTIFF output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GeoTiffCompression {
    /// No compression - fastest but largest files
    #[default]
    None,
    /// LZW compression - good balance of speed and size
    Lzw,
    /// Deflate (zlib) compression - better compression, slower
    Deflate,
}

impl GeoTiffCompression {
    /// Map a TIFF `Compression` tag value. Unknown schemes fall back to `None`.
    #[must_use]
    pub fn from_tag(value: u16) -> Self {
        match value {
            5 => Self::Lzw,
            8 | 32946 => Self::Deflate,
            _ => Self::None,
        }
    }
}

/// Error type for GeoTIFF writing operations
#[derive(Debug, Error)]
pub enum GeoTiffWriteError {
    /// I/O error during file operations
    #[error("I/O error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// TIFF encoding error
    #[error("TIFF encoding error: {0}")]
    TiffEncode(#[from] tiff::TiffError),
    /// Invalid raster data
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Builder for configuring GeoTIFF output
pub struct GeoTiffWriter<'a> {
    raster: &'a RasterGrid,
    compression: GeoTiffCompression,
}

impl<'a> GeoTiffWriter<'a> {
    /// Create a new GeoTIFF writer using the raster profile's compression
    #[must_use]
    pub fn new(raster: &'a RasterGrid) -> Self {
        Self {
            raster,
            compression: raster.profile().compression,
        }
    }

    /// Set the compression method
    #[must_use]
    pub fn compression(mut self, compression: GeoTiffCompression) -> Self {
        self.compression = compression;
        self
    }

    /// Write to a file path.
    ///
    /// The image is encoded into a sibling `.partial` file which is renamed
    /// over `path` only once encoding succeeded, so a failed write never
    /// leaves a truncated raster behind.
    pub fn write<P: AsRef<Path>>(self, path: P) -> Result<(), GeoTiffWriteError> {
        let path = path.as_ref();
        let partial = partial_path(path);
        let io_err = |source| GeoTiffWriteError::Io {
            path: path.to_path_buf(),
            source,
        };

        let result = File::create(&partial).map_err(io_err).and_then(|file| {
            let mut writer = BufWriter::new(file);
            self.write_to(&mut writer)?;
            writer.flush().map_err(io_err)
        });

        match result {
            Ok(()) => {
                fs::rename(&partial, path).map_err(io_err)?;
                debug!(path = %path.display(), "Wrote GeoTIFF");
                Ok(())
            }
            Err(e) => {
                let _ = fs::remove_file(&partial);
                Err(e)
            }
        }
    }

    /// Write to any writer that implements Write + Seek
    pub fn write_to<W: Write + Seek>(self, writer: W) -> Result<(), GeoTiffWriteError> {
        let (height, width) = self.raster.shape();
        if width == 0 || height == 0 {
            return Err(GeoTiffWriteError::InvalidData(
                "Raster has zero dimensions".to_string(),
            ));
        }

        let width = usize_to_u32(width).map_err(GeoTiffWriteError::InvalidData)?;
        let height = usize_to_u32(height).map_err(GeoTiffWriteError::InvalidData)?;

        let compression = match self.compression {
            GeoTiffCompression::None => Compression::Uncompressed,
            GeoTiffCompression::Lzw => Compression::Lzw,
            GeoTiffCompression::Deflate => Compression::Deflate(DeflateLevel::Fast),
        };

        let encoder = TiffEncoder::new(writer)?.with_compression(compression);
        self.write_image(encoder, width, height)
    }

    fn write_image<W: Write + Seek>(
        &self,
        mut encoder: TiffEncoder<W>,
        width: u32,
        height: u32,
    ) -> Result<(), GeoTiffWriteError> {
        let nodata = self.raster.profile().nodata;
        // NaN pixels are stored as the declared nodata value, if any
        let fill = |v: f64| match nodata {
            Some(nd) if v.is_nan() => nd,
            _ => v,
        };

        // Integer profiles are widened to f32: predictions are continuous
        match self.raster.profile().sample_type {
            SampleType::F64 => {
                let pixels: Vec<f64> = self.raster.data().iter().map(|&v| fill(v)).collect();
                let mut image = encoder.new_image::<Gray64Float>(width, height)?;
                self.write_geotiff_tags(image.encoder())?;
                image.write_data(&pixels)?;
            }
            _ => {
                // Allow truncation: output precision is the profile's f32
                #[allow(clippy::cast_possible_truncation)]
                let pixels: Vec<f32> = self.raster.data().iter().map(|&v| fill(v) as f32).collect();
                let mut image = encoder.new_image::<Gray32Float>(width, height)?;
                self.write_geotiff_tags(image.encoder())?;
                image.write_data(&pixels)?;
            }
        }
        Ok(())
    }

    fn write_geotiff_tags<W: Write + Seek, K: tiff::encoder::TiffKind>(
        &self,
        dir: &mut tiff::encoder::DirectoryEncoder<W, K>,
    ) -> Result<(), GeoTiffWriteError> {
        let profile = self.raster.profile();
        let transform = &profile.transform;

        if transform.is_north_up() {
            // ModelPixelScale: [ScaleX, ScaleY, ScaleZ]
            let pixel_scale = [transform.pixel_width, -transform.pixel_height, 0.0];
            dir.write_tag(Tag::Unknown(GEOTIFF_MODELPIXELSCALE), pixel_scale.as_slice())?;

            // ModelTiepoint ties pixel (0, 0) to the top-left world corner
            let tiepoint = [0.0, 0.0, 0.0, transform.origin_x, transform.origin_y, 0.0];
            dir.write_tag(Tag::Unknown(GEOTIFF_MODELTIEPOINT), tiepoint.as_slice())?;
        } else {
            let matrix = transform.to_model_transformation();
            dir.write_tag(Tag::Unknown(GEOTIFF_MODELTRANSFORMATION), matrix.as_slice())?;
        }

        let geokeys = build_geokey_directory(profile.crs);
        dir.write_tag(Tag::Unknown(GEOTIFF_GEOKEYDIRECTORY), geokeys.as_slice())?;

        if let Some(proj_string) = profile.crs.and_then(get_proj_string) {
            // GeoAsciiParams are pipe terminated
            let ascii_params = format!("{proj_string}|");
            dir.write_tag(Tag::Unknown(GEOTIFF_GEOASCIIPARAMS), ascii_params.as_str())?;
        }

        if let Some(nodata) = profile.nodata {
            let text = format_nodata(nodata);
            dir.write_tag(Tag::Unknown(GDAL_NODATA), text.as_str())?;
        }

        Ok(())
    }
}

/// GeoKeyDirectory for a CRS.
///
/// Layout: `[KeyDirectoryVersion, KeyRevision, MinorRevision, NumberOfKeys,
/// KeyID1, TIFFTagLocation1, Count1, Value_Offset1, ...]`
pub(crate) fn build_geokey_directory(crs: Option<i32>) -> Vec<u16> {
    let epsg = crs.and_then(|c| u16::try_from(c).ok());
    let key_count = if epsg.is_some() { 3 } else { 1 };

    let mut keys = vec![1, 1, 0, key_count];

    let Some(code) = epsg else {
        keys.extend_from_slice(&[GT_RASTER_TYPE_GEO_KEY, 0, 1, RASTER_PIXEL_IS_AREA]);
        return keys;
    };

    let is_geographic = is_geographic_crs(i32::from(code));

    keys.extend_from_slice(&[
        GT_MODEL_TYPE_GEO_KEY,
        0, // TIFFTagLocation = 0 means value is in Value_Offset
        1,
        if is_geographic {
            MODEL_TYPE_GEOGRAPHIC
        } else {
            MODEL_TYPE_PROJECTED
        },
    ]);
    keys.extend_from_slice(&[GT_RASTER_TYPE_GEO_KEY, 0, 1, RASTER_PIXEL_IS_AREA]);

    if is_geographic {
        keys.extend_from_slice(&[GEOGRAPHIC_TYPE_GEO_KEY, 0, 1, code]);
    } else {
        keys.extend_from_slice(&[PROJECTED_CS_TYPE_GEO_KEY, 0, 1, code]);
    }

    keys
}

fn format_nodata(nodata: f64) -> String {
    if nodata.is_nan() {
        "nan".to_string()
    } else {
        format!("{nodata}")
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

impl RasterGrid {
    /// Write this raster to a GeoTIFF file with its own profile.
    pub fn write_geotiff<P: AsRef<Path>>(&self, path: P) -> Result<(), GeoTiffWriteError> {
        GeoTiffWriter::new(self).write(path)
    }

    /// Get a GeoTIFF writer builder for more control over output options.
    #[must_use]
    pub fn geotiff_writer(&self) -> GeoTiffWriter<'_> {
        GeoTiffWriter::new(self)
    }

    /// Encode this raster as GeoTIFF bytes.
    pub fn to_geotiff_bytes(&self) -> Result<Vec<u8>, GeoTiffWriteError> {
        let mut buffer = std::io::Cursor::new(Vec::new());
        GeoTiffWriter::new(self).write_to(&mut buffer)?;
        Ok(buffer.into_inner())
    }
}
