//! Downscaling run configuration.
//!
//! Every field has a default, so a JSON file only needs the values it
//! changes:
//!
//! ```json
//! { "train_fraction": 0.7, "forest": { "n_estimators": 200, "seed": 7 } }
//! ```

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::RandomForestConfig;
use crate::source::local::default_extensions;
use crate::split::{DEFAULT_SPLIT_SEED, DEFAULT_TRAIN_FRACTION};

/// File stem of the downscaled raster written next to the target.
pub const DEFAULT_OUTPUT_STEM: &str = "downscaled";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to open config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config value: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownscaleConfig {
    /// Share of pixels used for training, in (0, 1]
    pub train_fraction: f64,
    /// Seed of the train/holdout partition
    pub split_seed: u64,
    /// Random forest hyperparameters, including the model seed
    pub forest: RandomForestConfig,
    /// Output file stem; the target's extension is appended
    pub output_stem: String,
    /// Predictor file extensions, case-insensitive
    pub extensions: Vec<String>,
}

impl Default for DownscaleConfig {
    fn default() -> Self {
        Self {
            train_fraction: DEFAULT_TRAIN_FRACTION,
            split_seed: DEFAULT_SPLIT_SEED,
            forest: RandomForestConfig::default(),
            output_stem: DEFAULT_OUTPUT_STEM.to_string(),
            extensions: default_extensions(),
        }
    }
}

impl DownscaleConfig {
    /// Load and validate a JSON config file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or holds invalid values.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_reader(BufReader::new(file)).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.train_fraction > 0.0 && self.train_fraction <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "train_fraction must be in (0, 1], got {}",
                self.train_fraction
            )));
        }
        if self.output_stem.trim().is_empty() {
            return Err(ConfigError::Invalid("output_stem is empty".to_string()));
        }
        if self.extensions.is_empty() {
            return Err(ConfigError::Invalid("extensions is empty".to_string()));
        }
        Ok(())
    }
}
