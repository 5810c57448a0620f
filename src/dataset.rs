//! Learning table assembly.
//!
//! Rasters are flattened row-major (`[row, col]` → `row * width + col`) and
//! predictions are reshaped with the same order, so table row `i` always
//! refers to the same pixel in every column and in the output raster.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use thiserror::Error;

use crate::align::PredictorStack;
use crate::raster::RasterGrid;

/// Name of the label column, appended after the predictors.
pub const TARGET_COLUMN: &str = "target";

/// Errors raised while building or reshaping the learning table.
#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("predictor stack is empty")]
    EmptyStack,

    #[error("predictor {index} has shape {actual:?}, target has {expected:?}")]
    ShapeMismatch {
        index: usize,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("cannot reshape {len} values into {height}x{width}")]
    Reshape { len: usize, height: usize, width: usize },
}

/// Positional name of predictor column `index`.
#[must_use]
pub fn predictor_column(index: usize) -> String {
    format!("predictor_{index}")
}

/// Flatten a 2-D array in row-major order.
#[must_use]
pub fn flatten(array: &Array2<f64>) -> Array1<f64> {
    // iter() walks logical row-major order whatever the memory layout
    array.iter().copied().collect()
}

/// Reshape a flat row-major vector back into `height` x `width`.
///
/// # Errors
/// Returns an error if `values.len() != height * width`.
pub fn reshape(values: Array1<f64>, height: usize, width: usize) -> Result<Array2<f64>, AssemblyError> {
    let len = values.len();
    values
        .into_shape((height, width))
        .map_err(|_| AssemblyError::Reshape { len, height, width })
}

/// One row per pixel: predictor columns followed by the target column.
#[derive(Debug, Clone)]
pub struct SampleTable {
    features: Array2<f64>,
    target: Array1<f64>,
    columns: Vec<String>,
    shape: (usize, usize),
}

impl SampleTable {
    /// Build from raw columns.
    ///
    /// # Errors
    /// Returns an error if row counts disagree with `shape`.
    pub fn from_columns(
        features: Array2<f64>,
        target: Array1<f64>,
        shape: (usize, usize),
    ) -> Result<Self, AssemblyError> {
        let rows = shape.0 * shape.1;
        if features.nrows() != rows || target.len() != rows {
            return Err(AssemblyError::Reshape {
                len: features.nrows().max(target.len()),
                height: shape.0,
                width: shape.1,
            });
        }
        let mut columns: Vec<String> = (0..features.ncols()).map(predictor_column).collect();
        columns.push(TARGET_COLUMN.to_string());
        Ok(Self {
            features,
            target,
            columns,
            shape,
        })
    }

    /// Predictor matrix, `rows x predictors`.
    #[must_use]
    pub fn features(&self) -> ArrayView2<'_, f64> {
        self.features.view()
    }

    /// Target column.
    #[must_use]
    pub fn target(&self) -> ArrayView1<'_, f64> {
        self.target.view()
    }

    /// Column names, target last.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.target.len()
    }

    #[must_use]
    pub fn n_predictors(&self) -> usize {
        self.features.ncols()
    }

    /// (height, width) of the raster the rows came from.
    #[must_use]
    pub fn raster_shape(&self) -> (usize, usize) {
        self.shape
    }

    /// Copy out the given rows, in the given order.
    #[must_use]
    pub fn select_rows(&self, rows: &[usize]) -> (Array2<f64>, Array1<f64>) {
        (
            self.features.select(Axis(0), rows),
            self.target.select(Axis(0), rows),
        )
    }
}

/// Flatten a predictor stack and the target raster into a [`SampleTable`].
///
/// # Errors
/// Returns an error if the stack is empty or any layer's shape differs from the target's.
pub fn assemble(stack: &PredictorStack, target: &RasterGrid) -> Result<SampleTable, AssemblyError> {
    if stack.is_empty() {
        return Err(AssemblyError::EmptyStack);
    }

    let shape = target.shape();
    let rows = shape.0 * shape.1;
    let mut features = Array2::<f64>::zeros((rows, stack.len()));

    for (index, layer) in stack.layers().iter().enumerate() {
        if layer.shape() != shape {
            return Err(AssemblyError::ShapeMismatch {
                index,
                expected: shape,
                actual: layer.shape(),
            });
        }
        features.column_mut(index).assign(&flatten(layer.data()));
    }

    SampleTable::from_columns(features, flatten(target.data()), shape)
}
