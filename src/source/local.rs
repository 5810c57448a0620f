//! Local filesystem raster source.
//!
//! Lists a directory for `GeoTIFF` files and orders them by file name.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

use super::{RasterEntry, RasterSource};

/// Errors raised while discovering predictor files.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("predictor directory does not exist: {0}")]
    NotFound(PathBuf),

    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("no raster files ({extensions}) found in {dir}")]
    Empty { dir: PathBuf, extensions: String },

    #[error("failed to list {dir}: {source}")]
    Walk {
        dir: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// Options for scanning local directories.
///
/// Only files directly inside the root are considered; subdirectories are
/// never entered.
#[derive(Debug, Clone)]
pub struct LocalScanOptions {
    /// File extensions to consider as `GeoTIFFs` (case-insensitive)
    pub extensions: Vec<String>,
    /// Whether to follow symbolic links
    pub follow_links: bool,
}

impl Default for LocalScanOptions {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            follow_links: true,
        }
    }
}

pub(crate) fn default_extensions() -> Vec<String> {
    vec![
        "tif".to_string(),
        "tiff".to_string(),
        "geotiff".to_string(),
        "geotif".to_string(),
    ]
}

impl LocalScanOptions {
    /// Set the accepted extensions
    #[must_use]
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|s| s.to_str())
            .is_some_and(|e| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
    }
}

/// Raster source backed by a local directory.
///
/// Entries are sorted by file name so the predictor stack, and therefore the
/// column order of the learning table, is the same on every run regardless
/// of the order the filesystem lists files in.
pub struct LocalRasterSource {
    root: PathBuf,
    entries: Vec<RasterEntry>,
}

impl LocalRasterSource {
    /// Scan a directory for raster files.
    ///
    /// # Errors
    /// Returns an error if the directory does not exist, cannot be listed, or
    /// holds no file with an accepted extension.
    pub fn scan<P: AsRef<Path>>(root: P, options: &LocalScanOptions) -> Result<Self, DiscoveryError> {
        let root = root.as_ref();
        if !root.exists() {
            return Err(DiscoveryError::NotFound(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(DiscoveryError::NotADirectory(root.to_path_buf()));
        }

        let walker = WalkDir::new(root)
            .min_depth(1)
            .max_depth(1)
            .follow_links(options.follow_links)
            .sort_by_file_name();

        let mut entries = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|source| DiscoveryError::Walk {
                dir: root.to_path_buf(),
                source,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            if !options.accepts(path) {
                debug!(path = %path.display(), "Skipping non-raster file");
                continue;
            }

            let name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("unknown")
                .to_string();

            debug!(path = %path.display(), "Discovered raster");
            entries.push(RasterEntry {
                name,
                path: path.to_path_buf(),
            });
        }

        if entries.is_empty() {
            return Err(DiscoveryError::Empty {
                dir: root.to_path_buf(),
                extensions: options.extensions.join(", "),
            });
        }

        Ok(Self {
            root: root.to_path_buf(),
            entries,
        })
    }

    /// Get the root directory that was scanned.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl RasterSource for LocalRasterSource {
    fn entries(&self) -> &[RasterEntry] {
        &self.entries
    }
}
