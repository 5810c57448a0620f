#![doc = include_str!("../README.md")]
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`source`]: Predictor discovery from a local directory
//! - [`geotiff_reader`]: Decode single-band GeoTIFFs into [`RasterGrid`]
//! - [`align`]: Bilinear resampling of predictors onto the target grid
//! - [`dataset`]: Row-major flattening into a [`SampleTable`]
//! - [`split`] and [`impute`]: Seeded train/holdout split and training-mean imputation
//! - [`model`]: The [`Regressor`] seam and the default random forest
//! - [`train`]: Partition, impute and fit in one step
//! - [`pipeline`]: The [`Downscaler`] builder tying every stage together
//! - [`geotiff_writer`]: Write the result with the target's profile
//! - [`geometry`]: Affine transforms and EPSG projections
//! - [`vector`]: Grid CSV to points, layer reprojection and subsetting

// ============================================================================
// Public modules
// ============================================================================

pub mod align;
pub mod casting;
pub mod config;
pub mod dataset;
pub mod geometry;
pub mod geotiff_reader;
pub mod geotiff_writer;
pub mod impute;
pub mod model;
pub mod pipeline;
pub mod raster;
pub mod source;
pub mod split;
pub mod train;
pub mod vector;

// ============================================================================
// Downscaling
// ============================================================================
// Primary API: Downscaler::new(predictors, target).run()

pub use pipeline::{
    downscale,
    default_output_path,
    DownscaleError,
    DownscaleOutput,
    Downscaler,
};

pub use config::{ConfigError, DownscaleConfig};

// ============================================================================
// Raster Data
// ============================================================================

pub use raster::{RasterGrid, RasterProfile, SampleType};

pub use align::{
    align_predictors,
    align_to_grid,
    AlignError,
    PredictorStack,
};

// ============================================================================
// Learning Table & Training
// ============================================================================

pub use dataset::{assemble, flatten, reshape, AssemblyError, SampleTable};
pub use split::{train_test_split, TrainTestSplit};
pub use impute::{ImputeError, MeanImputer};
pub use train::{train, HoldoutDiagnostics, TrainError, TrainedModel};

pub use model::{
    FittedModel,
    ModelError,
    RandomForest,
    RandomForestConfig,
    RandomForestRegressor,
    Regressor,
};

// ============================================================================
// Geometry & Projections
// ============================================================================

pub use geometry::{BoundingBox, GeoTransform};
pub use geometry::projection::{
    project_point,
    get_proj_string,
    is_geographic_crs,
    CrsTransformer,
};

// ============================================================================
// Source Discovery
// ============================================================================

pub use source::{
    DiscoveryError,
    LocalRasterSource,
    LocalScanOptions,
    RasterEntry,
    RasterSource,
};

// ============================================================================
// GeoTIFF I/O
// ============================================================================

pub use geotiff_reader::{read_geotiff, GeoTiffReadError};

pub use geotiff_writer::{
    GeoTiffCompression,
    GeoTiffWriteError,
    GeoTiffWriter,
};

// ============================================================================
// Vector Layers
// ============================================================================

pub use vector::{VectorError, VectorLayer};
