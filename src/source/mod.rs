//! Predictor raster discovery.
//!
//! This module provides the [`RasterSource`] trait and a local-directory
//! implementation that finds the predictor GeoTIFFs fed to the downscaler.
//!
//! # Example
//!
//! ```rust,no_run
//! use geodownscale::source::{LocalRasterSource, LocalScanOptions, RasterSource};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let source = LocalRasterSource::scan("/path/to/predictors", &LocalScanOptions::default())?;
//!
//!     for entry in source.entries() {
//!         println!("Found predictor: {} at {}", entry.name, entry.path.display());
//!     }
//!     Ok(())
//! }
//! ```

pub mod local;

pub use local::{DiscoveryError, LocalRasterSource, LocalScanOptions};

use std::path::PathBuf;

/// A raster file found during discovery.
///
/// Only filesystem facts are recorded here; pixels and georeferencing are
/// read later, one file at a time, by the alignment stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterEntry {
    /// Name derived from the file stem
    pub name: String,
    /// Full path to the file
    pub path: PathBuf,
}

/// A source of raster files with a stable order.
pub trait RasterSource {
    /// All discovered entries, in stacking order.
    fn entries(&self) -> &[RasterEntry];

    /// Paths of all entries, in stacking order.
    fn paths(&self) -> Vec<PathBuf> {
        self.entries().iter().map(|e| e.path.clone()).collect()
    }
}
