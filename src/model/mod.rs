//! Regression models behind a fit/predict seam.
//!
//! The pipeline only talks to [`Regressor`] and [`FittedModel`], so any model
//! that maps a predictor matrix to one value per row can drive it. The
//! default is [`RandomForestRegressor`].

pub mod random_forest;

pub use random_forest::{MaxFeatures, RandomForest, RandomForestConfig, RandomForestRegressor};

use ndarray::{Array1, ArrayView1, ArrayView2};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("cannot fit a model on zero rows")]
    EmptyTrainingSet,

    #[error("feature matrix has {features} rows but target has {target}")]
    LengthMismatch { features: usize, target: usize },

    #[error("model expects {expected} features, got {actual}")]
    FeatureMismatch { expected: usize, actual: usize },

    #[error("{what} contains a non-finite value at row {row}")]
    NonFinite { what: &'static str, row: usize },

    #[error("invalid model configuration: {0}")]
    InvalidConfig(String),
}

/// Something that learns a [`FittedModel`] from a feature matrix and a target vector.
pub trait Regressor {
    type Model: FittedModel;

    /// Fit on `features` (`rows x predictors`) and `target` (`rows`).
    ///
    /// The same inputs and configuration must yield the same model.
    fn fit(
        &self,
        features: ArrayView2<'_, f64>,
        target: ArrayView1<'_, f64>,
    ) -> Result<Self::Model, ModelError>;
}

/// A trained, immutable model.
pub trait FittedModel {
    /// Number of predictor columns the model was trained on.
    fn n_features(&self) -> usize;

    /// One prediction per row of `features`.
    fn predict(&self, features: ArrayView2<'_, f64>) -> Result<Array1<f64>, ModelError>;
}

/// Shared input validation for [`Regressor::fit`] implementations.
///
/// # Errors
/// Rejects empty input, mismatched lengths and non-finite values.
pub fn check_training_data(
    features: ArrayView2<'_, f64>,
    target: ArrayView1<'_, f64>,
) -> Result<(), ModelError> {
    if features.nrows() != target.len() {
        return Err(ModelError::LengthMismatch {
            features: features.nrows(),
            target: target.len(),
        });
    }
    if target.is_empty() {
        return Err(ModelError::EmptyTrainingSet);
    }
    if let Some(row) = target.iter().position(|v| !v.is_finite()) {
        return Err(ModelError::NonFinite { what: "target", row });
    }
    if let Some(row) = features
        .outer_iter()
        .position(|r| r.iter().any(|v| !v.is_finite()))
    {
        return Err(ModelError::NonFinite { what: "features", row });
    }
    Ok(())
}
