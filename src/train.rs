//! Model training stage: partition, impute, fit.

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::dataset::SampleTable;
use crate::impute::{ImputeError, MeanImputer};
use crate::model::{FittedModel, ModelError, Regressor};
use crate::split::{train_test_split, TrainTestSplit};

#[derive(Debug, Error)]
pub enum TrainError {
    #[error("invalid train/holdout split: {0}")]
    InvalidSplit(String),

    #[error(transparent)]
    Impute(#[from] ImputeError),

    #[error("model fitting failed: {0}")]
    Model(#[from] ModelError),
}

/// Holdout rows with the observed target and the model's prediction.
///
/// Reported for inspection only. Observed values are imputed with the
/// training target mean like every other row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HoldoutDiagnostics {
    /// Table row (row-major pixel) indices, ascending
    pub indices: Vec<usize>,
    pub observed: Vec<f64>,
    pub predicted: Vec<f64>,
}

impl HoldoutDiagnostics {
    #[must_use]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// A fitted model together with the imputer and split it was trained with.
#[derive(Debug, Clone)]
pub struct TrainedModel<M> {
    model: M,
    imputer: MeanImputer,
    split: TrainTestSplit,
}

impl<M: FittedModel> TrainedModel<M> {
    #[must_use]
    pub fn model(&self) -> &M {
        &self.model
    }

    #[must_use]
    pub fn imputer(&self) -> &MeanImputer {
        &self.imputer
    }

    #[must_use]
    pub fn split(&self) -> &TrainTestSplit {
        &self.split
    }

    /// Predict every row of `table`, filling missing predictors with the training means.
    ///
    /// # Errors
    /// Returns an error if the table's predictor count differs from the training table's.
    pub fn predict_table(&self, table: &SampleTable) -> Result<Array1<f64>, TrainError> {
        let mut features = table.features().to_owned();
        self.imputer.fill_features(&mut features)?;
        Ok(self.model.predict(features.view())?)
    }

    /// Observed and predicted values of the holdout rows.
    ///
    /// # Errors
    /// Returns an error if prediction fails.
    pub fn holdout_diagnostics(&self, table: &SampleTable) -> Result<HoldoutDiagnostics, TrainError> {
        let indices = self.split.holdout.clone();
        let (mut features, mut observed) = table.select_rows(&indices);
        self.imputer.fill_features(&mut features)?;
        self.imputer.fill_target(&mut observed);
        let predicted = self.model.predict(features.view())?;
        Ok(HoldoutDiagnostics {
            indices,
            observed: observed.to_vec(),
            predicted: predicted.to_vec(),
        })
    }
}

/// Split `table`, fit the imputer on the training rows, and fit `regressor` on the imputed rows.
///
/// # Errors
/// Fails on an invalid fraction, a training column with no values, or a model error.
pub fn train<R: Regressor>(
    table: &SampleTable,
    regressor: &R,
    train_fraction: f64,
    split_seed: u64,
) -> Result<TrainedModel<R::Model>, TrainError> {
    let split = train_test_split(table.n_rows(), train_fraction, split_seed).map_err(TrainError::InvalidSplit)?;
    debug!(
        train = split.train.len(),
        holdout = split.holdout.len(),
        seed = split_seed,
        "Partitioned rows"
    );

    let (mut features, mut target) = table.select_rows(&split.train);
    let imputer = MeanImputer::fit(features.view(), target.view())?;
    imputer.fill_features(&mut features)?;
    imputer.fill_target(&mut target);

    let model = regressor.fit(features.view(), target.view())?;
    info!(
        rows = split.train.len(),
        predictors = table.n_predictors(),
        "Trained regression model"
    );

    Ok(TrainedModel { model, imputer, split })
}
