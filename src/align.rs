//! Raster alignment: resample predictors onto the target grid.
//!
//! Every target pixel centre is carried into the predictor's CRS, mapped to a
//! fractional predictor pixel and bilinearly interpolated. When the target is
//! coarser than the predictor, the bilinear (triangle) kernel is widened by
//! the pixel size ratio so each output pixel weighs its whole footprint
//! rather than the four nearest samples. The result shares the target's
//! shape, transform and CRS exactly.

use std::path::{Path, PathBuf};

use ndarray::Array2;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::casting::f64_floor_to_isize;
use crate::geometry::projection::CrsTransformer;
use crate::geometry::InverseGeoTransform;
use crate::geotiff_reader::{read_geotiff, GeoTiffReadError};
use crate::raster::{RasterGrid, RasterProfile};

/// Errors raised while aligning a predictor. Every variant is fatal for the run.
#[derive(Debug, Error)]
pub enum AlignError {
    #[error("failed to read predictor {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: GeoTiffReadError,
    },

    #[error("predictor {path} has no EPSG coordinate reference system")]
    UndefinedSourceCrs { path: PathBuf },

    #[error("target raster has no EPSG coordinate reference system")]
    UndefinedTargetCrs,

    #[error("predictor {path} has a degenerate geotransform")]
    DegenerateTransform { path: PathBuf },

    #[error("cannot reproject predictor {path}: {message}")]
    Reprojection { path: PathBuf, message: String },
}

/// Ordered predictors, all co-registered with the target grid.
#[derive(Debug, Clone)]
pub struct PredictorStack {
    layers: Vec<RasterGrid>,
    profile: RasterProfile,
}

impl PredictorStack {
    /// Stack already-aligned layers.
    ///
    /// # Errors
    /// Returns an error naming the first layer whose grid differs from `profile`.
    pub fn new(layers: Vec<RasterGrid>, profile: RasterProfile) -> Result<Self, String> {
        if let Some((i, layer)) = layers
            .iter()
            .enumerate()
            .find(|(_, l)| !l.profile().same_grid(&profile))
        {
            return Err(format!(
                "layer {i} ({}) is not on the target grid",
                layer.source().map_or_else(|| "in-memory".to_string(), |p| p.display().to_string())
            ));
        }
        Ok(Self { layers, profile })
    }

    #[must_use]
    pub fn layers(&self) -> &[RasterGrid] {
        &self.layers
    }

    /// Grid shared by every layer.
    #[must_use]
    pub fn profile(&self) -> &RasterProfile {
        &self.profile
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// (height, width) of every layer.
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        (self.profile.height, self.profile.width)
    }
}

/// Read every predictor file in order and align it onto `target`.
///
/// Files are opened one at a time and closed before the next is read.
///
/// # Errors
/// Aborts on the first predictor that cannot be read or reprojected.
pub fn align_predictors<P: AsRef<Path>>(
    paths: &[P],
    target: &RasterProfile,
) -> Result<PredictorStack, AlignError> {
    let mut layers = Vec::with_capacity(paths.len());
    for path in paths {
        let path = path.as_ref();
        let predictor = read_geotiff(path).map_err(|source| AlignError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let aligned = align_to_grid(&predictor, target)?;
        info!(
            path = %path.display(),
            valid = aligned.valid_count(),
            pixels = target.pixel_count(),
            "Aligned predictor"
        );
        layers.push(aligned);
    }
    Ok(PredictorStack {
        layers,
        profile: target.clone(),
    })
}

/// Resample `source` onto the grid described by `target` with bilinear interpolation.
///
/// Target pixels outside the source extent, or whose kernel covers only
/// no-data, are `NaN`. No-data samples are dropped and the remaining weights
/// renormalised.
///
/// # Errors
/// Returns an error if either CRS is undefined, the source transform cannot
/// be inverted, or the transformer between the two CRS cannot be built.
pub fn align_to_grid(source: &RasterGrid, target: &RasterProfile) -> Result<RasterGrid, AlignError> {
    let path = source
        .source()
        .map_or_else(|| PathBuf::from("<memory>"), Path::to_path_buf);

    let target_crs = target.crs.ok_or(AlignError::UndefinedTargetCrs)?;
    let source_crs = source
        .profile()
        .crs
        .ok_or_else(|| AlignError::UndefinedSourceCrs { path: path.clone() })?;

    let mut out_profile = target.clone();
    out_profile.nodata = source.profile().nodata;
    out_profile.sample_type = source.profile().sample_type;

    if source.profile().same_grid(target) {
        debug!(path = %path.display(), "Predictor already on target grid");
        return RasterGrid::new(source.data().clone(), out_profile)
            .map(|g| g.with_source(&path))
            .map_err(|message| AlignError::Reprojection { path, message });
    }

    let inverse = source
        .profile()
        .transform
        .invert()
        .ok_or_else(|| AlignError::DegenerateTransform { path: path.clone() })?;

    // Target pixel centres are produced in the target CRS and consumed in the source CRS
    let transformer = CrsTransformer::new(target_crs, source_crs).map_err(|message| {
        AlignError::Reprojection {
            path: path.clone(),
            message,
        }
    })?;

    if transformer.is_identity() && !source.profile().bounds().intersects(&target.bounds()) {
        warn!(path = %path.display(), "Predictor does not overlap the target grid");
    }

    let scale = footprint_scale(target, &transformer, &inverse);
    debug!(path = %path.display(), x_scale = scale.0, y_scale = scale.1, "Resampling kernel scale");

    let mut out = Array2::from_elem((target.height, target.width), f64::NAN);
    let mut failed_points = 0usize;

    for row in 0..target.height {
        for col in 0..target.width {
            let (x, y) = target.transform.pixel_center(col, row);
            let (sx, sy) = match transformer.transform(x, y) {
                Ok(p) => p,
                Err(_) => {
                    failed_points += 1;
                    continue;
                }
            };
            let (src_col, src_row) = inverse.world_to_pixel(sx, sy);
            out[[row, col]] = bilinear_sample(source.data(), src_col, src_row, scale);
        }
    }

    if failed_points > 0 {
        warn!(
            path = %path.display(),
            failed = failed_points,
            "Some target pixels could not be transformed into the predictor CRS"
        );
    }

    RasterGrid::new(out, out_profile)
        .map(|g| g.with_source(&path))
        .map_err(|message| AlignError::Reprojection { path, message })
}

/// Size of one target pixel measured in predictor pixels, per axis, never below 1.
///
/// Measured once at the centre of the target grid.
fn footprint_scale(target: &RasterProfile, transformer: &CrsTransformer, inverse: &InverseGeoTransform) -> (f64, f64) {
    let (col, row) = (target.width / 2, target.height / 2);
    let to_source = |c: usize, r: usize| {
        let (x, y) = target.transform.pixel_center(c, r);
        transformer.transform(x, y).ok().map(|(sx, sy)| inverse.world_to_pixel(sx, sy))
    };
    let (Some(centre), Some(right), Some(below)) = (to_source(col, row), to_source(col + 1, row), to_source(col, row + 1)) else {
        return (1.0, 1.0);
    };

    let x_scale = (right.0 - centre.0).hypot(right.1 - centre.1);
    let y_scale = (below.0 - centre.0).hypot(below.1 - centre.1);
    let clamp = |v: f64| if v.is_finite() { v.max(1.0) } else { 1.0 };
    (clamp(x_scale), clamp(y_scale))
}

/// Bilinear sample at fractional pixel position (`col`, `row`), pixel centres at `.5`.
///
/// `scale` is the output pixel size in source pixels. A scale of 1 is plain
/// four-neighbour bilinear interpolation; larger scales stretch the triangle
/// kernel to a radius of `scale` source pixels on that axis.
pub(crate) fn bilinear_sample(image: &Array2<f64>, col: f64, row: f64, scale: (f64, f64)) -> f64 {
    let (height, width) = image.dim();
    #[allow(clippy::cast_precision_loss)]
    let inside = col >= 0.0 && row >= 0.0 && col < width as f64 && row < height as f64;
    if !inside || width == 0 || height == 0 {
        return f64::NAN;
    }

    let (Some(xs), Some(ys)) = (kernel_taps(col, scale.0, width), kernel_taps(row, scale.1, height)) else {
        return f64::NAN;
    };

    let mut sum = 0.0;
    let mut weight = 0.0;
    for &(yy, wy) in &ys {
        for &(xx, wx) in &xs {
            let v = image[[yy, xx]];
            if v.is_nan() {
                continue;
            }
            let w = wx * wy;
            sum += v * w;
            weight += w;
        }
    }

    if weight > 0.0 {
        sum / weight
    } else {
        f64::NAN
    }
}

/// Source indices along one axis with their triangle weights `1 - d / radius`.
///
/// Indices past either edge are dropped.
fn kernel_taps(pos: f64, radius: f64, len: usize) -> Option<Vec<(usize, f64)>> {
    let radius = radius.max(1.0);
    let centre = pos - 0.5;
    let first = f64_floor_to_isize(centre - radius)?.max(0);
    let last = f64_floor_to_isize(centre + radius)?.saturating_add(1);

    let mut taps = Vec::new();
    for i in first..=last {
        let Ok(idx) = usize::try_from(i) else { continue };
        if idx >= len {
            break;
        }
        #[allow(clippy::cast_precision_loss)]
        let w = 1.0 - (idx as f64 - centre).abs() / radius;
        if w > 0.0 {
            taps.push((idx, w));
        }
    }
    Some(taps)
}
