//! Column-mean imputation fitted on the training rows only.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use thiserror::Error;

use crate::dataset::{predictor_column, TARGET_COLUMN};

#[derive(Debug, Error)]
pub enum ImputeError {
    /// The training partition has no value at all for a column, so its mean is undefined
    #[error("column {column} has no values in the training rows")]
    EmptyColumn { column: String },

    #[error("imputer fitted on {expected} predictors, got {actual}")]
    ColumnMismatch { expected: usize, actual: usize },
}

/// Per-column training means used to fill `NaN`s.
///
/// The same means fill training, holdout and prediction rows, so holdout
/// statistics never leak into the filled values.
#[derive(Debug, Clone, PartialEq)]
pub struct MeanImputer {
    feature_means: Array1<f64>,
    target_mean: f64,
}

impl MeanImputer {
    /// Learn column means from training features and target.
    ///
    /// # Errors
    /// Returns [`ImputeError::EmptyColumn`] naming the first column with no finite value.
    pub fn fit(features: ArrayView2<'_, f64>, target: ArrayView1<'_, f64>) -> Result<Self, ImputeError> {
        let mut feature_means = Array1::zeros(features.ncols());
        for (i, column) in features.axis_iter(Axis(1)).enumerate() {
            feature_means[i] = nan_mean(column).ok_or_else(|| ImputeError::EmptyColumn {
                column: predictor_column(i),
            })?;
        }
        let target_mean = nan_mean(target).ok_or_else(|| ImputeError::EmptyColumn {
            column: TARGET_COLUMN.to_string(),
        })?;

        Ok(Self {
            feature_means,
            target_mean,
        })
    }

    #[must_use]
    pub fn feature_means(&self) -> &Array1<f64> {
        &self.feature_means
    }

    #[must_use]
    pub fn target_mean(&self) -> f64 {
        self.target_mean
    }

    /// Fill `NaN` predictor values in place.
    ///
    /// # Errors
    /// Returns an error if the column count differs from the fitted one.
    pub fn fill_features(&self, features: &mut Array2<f64>) -> Result<(), ImputeError> {
        if features.ncols() != self.feature_means.len() {
            return Err(ImputeError::ColumnMismatch {
                expected: self.feature_means.len(),
                actual: features.ncols(),
            });
        }
        for (mut column, &mean) in features.axis_iter_mut(Axis(1)).zip(self.feature_means.iter()) {
            column.mapv_inplace(|v| if v.is_nan() { mean } else { v });
        }
        Ok(())
    }

    /// Fill `NaN` target values in place.
    pub fn fill_target(&self, target: &mut Array1<f64>) {
        let mean = self.target_mean;
        target.mapv_inplace(|v| if v.is_nan() { mean } else { v });
    }
}

/// Mean of the non-`NaN` values, `None` if there are none.
fn nan_mean(values: ArrayView1<'_, f64>) -> Option<f64> {
    let (sum, count) = values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, c), &v| (s + v, c + 1));
    if count == 0 {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = count as f64;
    Some(sum / n)
}
