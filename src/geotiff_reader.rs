//! GeoTIFF reader for single-band rasters.
//!
//! Decodes band 1 of a (Geo)TIFF into a [`RasterGrid`] together with the
//! georeferencing needed to align and rewrite it: transform, EPSG code,
//! GDAL nodata, compression and sample type. Pixels equal to the nodata
//! value become `NaN`.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::{Path, PathBuf};

use ndarray::Array2;
use thiserror::Error;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;
use tracing::debug;

use crate::casting::u32_to_usize;
use crate::geometry::GeoTransform;
use crate::geotiff_writer::{
    GeoTiffCompression, GDAL_NODATA, GEOGRAPHIC_TYPE_GEO_KEY, GEOTIFF_GEOKEYDIRECTORY,
    GEOTIFF_MODELPIXELSCALE, GEOTIFF_MODELTIEPOINT, GEOTIFF_MODELTRANSFORMATION,
    PROJECTED_CS_TYPE_GEO_KEY,
};
use crate::raster::{RasterGrid, RasterProfile, SampleType};

/// GeoKey value meaning "user defined", which carries no EPSG code
const USER_DEFINED_KEY_VALUE: u16 = 32767;

/// Error type for GeoTIFF reading operations
#[derive(Debug, Error)]
pub enum GeoTiffReadError {
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TIFF decoding error: {0}")]
    Decode(#[from] tiff::TiffError),

    #[error("raster has no bands")]
    NoBands,

    #[error("unsupported pixel format in TIFF")]
    UnsupportedPixelFormat,

    #[error("raster is missing georeferencing (no ModelPixelScale/ModelTiepoint or ModelTransformation)")]
    MissingGeoTransform,

    #[error("pixel buffer holds {actual} samples, expected {expected}")]
    Truncated { expected: usize, actual: usize },

    #[error("invalid raster grid: {0}")]
    InvalidGrid(String),

    #[error("shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// Read band 1 of a GeoTIFF file.
///
/// The file handle is dropped before this function returns.
///
/// # Errors
/// Returns [`GeoTiffReadError`] if the file cannot be opened or decoded, has
/// no bands, or carries no georeferencing.
pub fn read_geotiff<P: AsRef<Path>>(path: P) -> Result<RasterGrid, GeoTiffReadError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| GeoTiffReadError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let grid = read_geotiff_from(BufReader::new(file))?.with_source(path);
    debug!(
        path = %path.display(),
        width = grid.width(),
        height = grid.height(),
        crs = ?grid.profile().crs,
        "Read GeoTIFF"
    );
    Ok(grid)
}

/// Read band 1 of a GeoTIFF from any seekable reader.
pub fn read_geotiff_from<R: Read + Seek>(reader: R) -> Result<RasterGrid, GeoTiffReadError> {
    let mut decoder = Decoder::new(reader)?.with_limits(Limits::unlimited());

    let (width, height) = decoder.dimensions()?;
    let (width, height) = (u32_to_usize(width), u32_to_usize(height));

    let samples_per_pixel = match decoder.find_tag(Tag::SamplesPerPixel)? {
        Some(v) => u32_to_usize(v.into_u32()?),
        None => 1,
    };
    if samples_per_pixel == 0 {
        return Err(GeoTiffReadError::NoBands);
    }

    let transform = read_geo_transform(&mut decoder)?;
    let crs = read_epsg(&mut decoder)?;
    let nodata = match decoder.find_tag(Tag::Unknown(GDAL_NODATA))? {
        Some(v) => v.into_string()?.trim_end_matches('\0').trim().parse::<f64>().ok(),
        None => None,
    };
    let compression = match decoder.find_tag(Tag::Compression)? {
        Some(v) => GeoTiffCompression::from_tag(u16::try_from(v.into_u32()?).unwrap_or(1)),
        None => GeoTiffCompression::None,
    };

    let (sample_type, samples) = decode_samples(decoder.read_image()?)?;

    let band = first_band(samples, width * height, samples_per_pixel)?;
    let data: Vec<f64> = band
        .into_iter()
        .map(|v| match nodata {
            Some(nd) if v == nd || (nd.is_nan() && v.is_nan()) => f64::NAN,
            _ => v,
        })
        .collect();

    let profile = RasterProfile {
        width,
        height,
        transform,
        crs,
        nodata,
        sample_type,
        compression,
    };
    let array = Array2::from_shape_vec((height, width), data)?;
    RasterGrid::new(array, profile).map_err(GeoTiffReadError::InvalidGrid)
}

/// Widen any supported pixel buffer to `f64`.
fn decode_samples(result: DecodingResult) -> Result<(SampleType, Vec<f64>), GeoTiffReadError> {
    let decoded = match result {
        DecodingResult::U8(buf) => (SampleType::U8, buf.into_iter().map(f64::from).collect()),
        DecodingResult::U16(buf) => (SampleType::U16, buf.into_iter().map(f64::from).collect()),
        DecodingResult::U32(buf) => (SampleType::U32, buf.into_iter().map(f64::from).collect()),
        DecodingResult::I8(buf) => (SampleType::I8, buf.into_iter().map(f64::from).collect()),
        DecodingResult::I16(buf) => (SampleType::I16, buf.into_iter().map(f64::from).collect()),
        DecodingResult::I32(buf) => (SampleType::I32, buf.into_iter().map(f64::from).collect()),
        DecodingResult::F32(buf) => (SampleType::F32, buf.into_iter().map(f64::from).collect()),
        DecodingResult::F64(buf) => (SampleType::F64, buf),
        _ => return Err(GeoTiffReadError::UnsupportedPixelFormat),
    };
    Ok(decoded)
}

/// Extract band 1 from a chunky (pixel-interleaved) or planar buffer.
fn first_band(
    samples: Vec<f64>,
    pixel_count: usize,
    samples_per_pixel: usize,
) -> Result<Vec<f64>, GeoTiffReadError> {
    // Planar images decode one plane at a time, which is band 1 here
    if samples.len() == pixel_count {
        return Ok(samples);
    }
    let expected = pixel_count * samples_per_pixel;
    if samples.len() < expected {
        return Err(GeoTiffReadError::Truncated {
            expected,
            actual: samples.len(),
        });
    }
    Ok(samples.into_iter().step_by(samples_per_pixel).take(pixel_count).collect())
}

fn read_geo_transform<R: Read + Seek>(
    decoder: &mut Decoder<R>,
) -> Result<GeoTransform, GeoTiffReadError> {
    if let Some(matrix) = decoder.find_tag(Tag::Unknown(GEOTIFF_MODELTRANSFORMATION))? {
        let values = matrix.into_f64_vec()?;
        let m: [f64; 16] = values
            .try_into()
            .map_err(|_| GeoTiffReadError::MissingGeoTransform)?;
        return Ok(GeoTransform::from_model_transformation(&m));
    }

    let scale = decoder.find_tag(Tag::Unknown(GEOTIFF_MODELPIXELSCALE))?;
    let tiepoint = decoder.find_tag(Tag::Unknown(GEOTIFF_MODELTIEPOINT))?;
    let (Some(scale), Some(tiepoint)) = (scale, tiepoint) else {
        return Err(GeoTiffReadError::MissingGeoTransform);
    };

    let scale = scale.into_f64_vec()?;
    let tiepoint = tiepoint.into_f64_vec()?;
    if scale.len() < 2 || tiepoint.len() < 6 {
        return Err(GeoTiffReadError::MissingGeoTransform);
    }

    Ok(GeoTransform::from_scale_tiepoint(
        [scale[0], scale[1], scale.get(2).copied().unwrap_or(0.0)],
        [tiepoint[0], tiepoint[1], tiepoint[2], tiepoint[3], tiepoint[4], tiepoint[5]],
    ))
}

/// EPSG code from the GeoKeyDirectory, preferring the projected CRS key.
fn read_epsg<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<Option<i32>, GeoTiffReadError> {
    let Some(directory) = decoder.find_tag(Tag::Unknown(GEOTIFF_GEOKEYDIRECTORY))? else {
        return Ok(None);
    };
    let keys: Vec<u32> = directory.into_u32_vec()?;
    Ok(epsg_from_geokeys(&keys))
}

pub(crate) fn epsg_from_geokeys(keys: &[u32]) -> Option<i32> {
    if keys.len() < 4 {
        return None;
    }
    let key_count = u32_to_usize(keys[3]);

    let mut projected = None;
    let mut geographic = None;
    for entry in keys[4..].chunks_exact(4).take(key_count) {
        let (id, location, value) = (entry[0], entry[1], entry[3]);
        // Only inline SHORT values can hold an EPSG code
        if location != 0 || value == u32::from(USER_DEFINED_KEY_VALUE) {
            continue;
        }
        if id == u32::from(PROJECTED_CS_TYPE_GEO_KEY) {
            projected = i32::try_from(value).ok();
        } else if id == u32::from(GEOGRAPHIC_TYPE_GEO_KEY) {
            geographic = i32::try_from(value).ok();
        }
    }
    projected.or(geographic)
}
