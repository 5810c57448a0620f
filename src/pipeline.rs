//! End-to-end downscaling: discover, align, assemble, train, predict, write.
//!
//! # Example
//!
//! ```rust,no_run
//! use geodownscale::Downscaler;
//!
//! fn main() -> Result<(), geodownscale::DownscaleError> {
//!     let output = Downscaler::new("/data/predictors", "/data/smap.tif")
//!         .train_fraction(0.8)
//!         .split_seed(123)
//!         .model_seed(0)
//!         .run()?;
//!     println!("wrote {}", output.output_path.display());
//!     Ok(())
//! }
//! ```

use std::path::{Path, PathBuf};

use ndarray::Array2;
use thiserror::Error;
use tracing::info;

use crate::align::{align_predictors, AlignError};
use crate::config::{ConfigError, DownscaleConfig};
use crate::dataset::{assemble, reshape, AssemblyError};
use crate::geotiff_reader::{read_geotiff, GeoTiffReadError};
use crate::geotiff_writer::GeoTiffWriteError;
use crate::model::{ModelError, RandomForestRegressor, Regressor};
use crate::raster::{RasterGrid, RasterProfile, SampleType};
use crate::source::{DiscoveryError, LocalRasterSource, LocalScanOptions, RasterSource};
use crate::train::{train, HoldoutDiagnostics, TrainError};

/// Extension used when the target path has none.
const FALLBACK_EXTENSION: &str = "tif";

/// Any failure of a downscaling run. Nothing is written when one occurs.
#[derive(Debug, Error)]
pub enum DownscaleError {
    #[error("failed to read target raster {path}: {source}")]
    Target {
        path: PathBuf,
        #[source]
        source: GeoTiffReadError,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Align(#[from] AlignError),

    #[error(transparent)]
    Assembly(#[from] AssemblyError),

    #[error(transparent)]
    Train(#[from] TrainError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: GeoTiffWriteError,
    },
}

/// Result of a downscaling run.
#[derive(Debug, Clone)]
pub struct DownscaleOutput {
    /// Predictions on the target grid, with the target's profile
    pub raster: RasterGrid,
    /// Where the raster was written
    pub output_path: PathBuf,
    /// Predictor files in stacking order
    pub predictor_paths: Vec<PathBuf>,
    pub holdout: HoldoutDiagnostics,
}

/// Configurable downscaling run.
///
/// Defaults to a [`RandomForestRegressor`] built from the config's forest
/// settings; [`Downscaler::with_regressor`] swaps in any other [`Regressor`].
#[derive(Debug, Clone)]
pub struct Downscaler<R = RandomForestRegressor> {
    predictor_dir: PathBuf,
    target_path: PathBuf,
    config: DownscaleConfig,
    output_path: Option<PathBuf>,
    regressor: Option<R>,
}

impl Downscaler<RandomForestRegressor> {
    /// Downscale `target_path` with the predictors found in `predictor_dir`.
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(predictor_dir: P, target_path: Q) -> Self {
        Self {
            predictor_dir: predictor_dir.as_ref().to_path_buf(),
            target_path: target_path.as_ref().to_path_buf(),
            config: DownscaleConfig::default(),
            output_path: None,
            regressor: None,
        }
    }
}

impl<R> Downscaler<R> {
    /// Replace the whole configuration
    #[must_use]
    pub fn config(mut self, config: DownscaleConfig) -> Self {
        self.config = config;
        self
    }

    /// Share of pixels used for training
    #[must_use]
    pub fn train_fraction(mut self, fraction: f64) -> Self {
        self.config.train_fraction = fraction;
        self
    }

    /// Seed of the train/holdout partition
    #[must_use]
    pub fn split_seed(mut self, seed: u64) -> Self {
        self.config.split_seed = seed;
        self
    }

    /// Seed of the random forest
    #[must_use]
    pub fn model_seed(mut self, seed: u64) -> Self {
        self.config.forest.seed = seed;
        self
    }

    /// Number of trees in the random forest
    #[must_use]
    pub fn trees(mut self, n_estimators: usize) -> Self {
        self.config.forest.n_estimators = n_estimators;
        self
    }

    /// Write somewhere other than `<target dir>/downscaled.<target ext>`
    #[must_use]
    pub fn output_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.output_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Use another regressor. Forest settings in the config are then ignored.
    #[must_use]
    pub fn with_regressor<S: Regressor>(self, regressor: S) -> Downscaler<S> {
        Downscaler {
            predictor_dir: self.predictor_dir,
            target_path: self.target_path,
            config: self.config,
            output_path: self.output_path,
            regressor: Some(regressor),
        }
    }

    /// The effective configuration.
    #[must_use]
    pub fn settings(&self) -> &DownscaleConfig {
        &self.config
    }

    /// Path the output will be written to.
    #[must_use]
    pub fn resolved_output_path(&self) -> PathBuf {
        self.output_path
            .clone()
            .unwrap_or_else(|| default_output_path(&self.target_path, &self.config.output_stem))
    }
}

impl Downscaler<RandomForestRegressor> {
    /// Run the pipeline with the configured random forest.
    ///
    /// # Errors
    /// See [`DownscaleError`]. The output file is only created once every earlier stage succeeded.
    pub fn run(self) -> Result<DownscaleOutput, DownscaleError> {
        let regressor = self
            .regressor
            .clone()
            .unwrap_or_else(|| RandomForestRegressor::new(self.config.forest.clone()));
        self.run_with(&regressor)
    }
}

impl<R: Regressor> Downscaler<R> {
    /// Run the pipeline with the regressor given to [`Downscaler::with_regressor`].
    ///
    /// # Errors
    /// See [`DownscaleError`].
    pub fn run_custom(self) -> Result<DownscaleOutput, DownscaleError> {
        match &self.regressor {
            Some(regressor) => self.run_with(regressor),
            None => Err(ConfigError::Invalid("no regressor configured".to_string()).into()),
        }
    }

    fn run_with<S: Regressor>(&self, regressor: &S) -> Result<DownscaleOutput, DownscaleError> {
        self.config.validate()?;
        let output_path = self.resolved_output_path();
        if same_file(&output_path, &self.target_path) {
            return Err(ConfigError::Invalid(format!(
                "output path {} would overwrite the target raster",
                output_path.display()
            ))
            .into());
        }

        let target = read_geotiff(&self.target_path).map_err(|source| DownscaleError::Target {
            path: self.target_path.clone(),
            source,
        })?;
        info!(
            path = %self.target_path.display(),
            width = target.width(),
            height = target.height(),
            crs = ?target.profile().crs,
            "Read target raster"
        );

        let options = LocalScanOptions::default().with_extensions(self.config.extensions.iter().cloned());
        let source = LocalRasterSource::scan(&self.predictor_dir, &options)?;
        let predictor_paths = source.paths();
        info!(
            dir = %source.root().display(),
            count = predictor_paths.len(),
            "Discovered predictors"
        );

        let stack = align_predictors(&predictor_paths, target.profile())?;
        let table = assemble(&stack, &target)?;
        drop(stack);

        let trained = train(&table, regressor, self.config.train_fraction, self.config.split_seed)?;
        let predictions = trained.predict_table(&table)?;
        let holdout = trained.holdout_diagnostics(&table)?;

        let (height, width) = table.raster_shape();
        let data = reshape(predictions, height, width)?;
        let raster = RasterGrid::new(data, output_profile(target.profile()))
            .map_err(|_| AssemblyError::Reshape {
                len: height * width,
                height: target.height(),
                width: target.width(),
            })?
            .with_source(&output_path);

        raster.write_geotiff(&output_path).map_err(|source| DownscaleError::Write {
            path: output_path.clone(),
            source,
        })?;
        info!(path = %output_path.display(), "Wrote downscaled raster");

        Ok(DownscaleOutput {
            raster,
            output_path,
            predictor_paths,
            holdout,
        })
    }
}

/// Downscale with default settings and return the predicted array.
///
/// Writes `<target dir>/downscaled.<target ext>` as a side effect.
///
/// # Errors
/// See [`DownscaleError`].
pub fn downscale<P: AsRef<Path>, Q: AsRef<Path>>(predictor_dir: P, target_path: Q) -> Result<Array2<f64>, DownscaleError> {
    Downscaler::new(predictor_dir, target_path)
        .run()
        .map(|output| output.raster.into_data())
}

/// `<target dir>/<stem>.<target ext>`
#[must_use]
pub fn default_output_path(target_path: &Path, stem: &str) -> PathBuf {
    let extension = target_path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or(FALLBACK_EXTENSION);
    let dir = target_path.parent().unwrap_or_else(|| Path::new(""));
    dir.join(format!("{stem}.{extension}"))
}

/// Whether two paths name the same file, resolving links when both exist.
fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// The target profile with integer sample types widened to f32.
fn output_profile(target: &RasterProfile) -> RasterProfile {
    let mut profile = target.clone();
    if !profile.sample_type.is_float() {
        profile.sample_type = SampleType::F32;
    }
    profile
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::GeoTransform;
    use crate::geotiff_writer::GeoTiffCompression;

    #[test]
    fn test_default_output_path_keeps_extension() {
        assert_eq!(
            default_output_path(Path::new("/data/smap.TIF"), "downscaled"),
            PathBuf::from("/data/downscaled.TIF")
        );
        assert_eq!(
            default_output_path(Path::new("/data/smap.tiff"), "out"),
            PathBuf::from("/data/out.tiff")
        );
        assert_eq!(
            default_output_path(Path::new("smap"), "downscaled"),
            PathBuf::from("downscaled.tif")
        );
    }

    #[test]
    fn test_output_profile_widens_integers() {
        let mut profile = RasterProfile {
            width: 2,
            height: 2,
            transform: GeoTransform::north_up(0.0, 0.0, 1.0, 1.0),
            crs: Some(4326),
            nodata: Some(-9999.0),
            sample_type: SampleType::U16,
            compression: GeoTiffCompression::Lzw,
        };
        let out = output_profile(&profile);
        assert_eq!(out.sample_type, SampleType::F32);
        assert_eq!(out.nodata, Some(-9999.0));
        assert_eq!(out.compression, GeoTiffCompression::Lzw);

        profile.sample_type = SampleType::F64;
        assert_eq!(output_profile(&profile).sample_type, SampleType::F64);
    }

    #[test]
    fn test_builder_setters() {
        let d = Downscaler::new("/p", "/t/target.tif")
            .train_fraction(0.6)
            .split_seed(5)
            .model_seed(9)
            .trees(3);
        assert_eq!(d.settings().train_fraction, 0.6);
        assert_eq!(d.settings().split_seed, 5);
        assert_eq!(d.settings().forest.seed, 9);
        assert_eq!(d.settings().forest.n_estimators, 3);
        assert_eq!(d.resolved_output_path(), PathBuf::from("/t/downscaled.tif"));
        assert_eq!(
            d.output_path("/elsewhere/x.tif").resolved_output_path(),
            PathBuf::from("/elsewhere/x.tif")
        );
    }

    #[test]
    fn test_missing_target_writes_nothing() {
        let dir = std::env::temp_dir().join(format!("geodownscale-pipeline-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let target = dir.join("absent.tif");
        let result = Downscaler::new(&dir, &target).run();
        assert!(matches!(result, Err(DownscaleError::Target { .. })));
        assert!(!dir.join("downscaled.tif").exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_output_never_replaces_target() {
        let dir = std::env::temp_dir().join(format!("geodownscale-pipeline-collide-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let target = dir.join("downscaled.tif");
        std::fs::write(&target, b"original").unwrap();

        let result = Downscaler::new(&dir, &target).run();
        assert!(matches!(result, Err(DownscaleError::Config(ConfigError::Invalid(_)))));

        let aliased = dir.join(".").join("downscaled.tif");
        let result = Downscaler::new(&dir, &target).output_path(&aliased).run();
        assert!(matches!(result, Err(DownscaleError::Config(_))));

        assert_eq!(std::fs::read(&target).unwrap(), b"original");
        let _ = std::fs::remove_dir_all(&dir);
    }
}
