//! Per-feature min-max scaling.

use ndarray::{Array1, Array2, Axis};

use crate::error::{PerturbationError, Result};
use crate::matrix::FeatureMatrix;

/// Maps each feature of the fitting data onto `[0, 1]`.
///
/// Features that are constant in the fitting data are only shifted by their minimum.
#[derive(Debug, Clone, PartialEq)]
pub struct MinMaxScaler {
    min: Array1<f64>,
    scale: Array1<f64>,
}

impl MinMaxScaler {
    pub fn fit(data: &FeatureMatrix) -> Result<Self> {
        if data.nrows() == 0 {
            return Err(PerturbationError::InvalidInput(
                "cannot fit a scaler on zero observations".to_string(),
            ));
        }
        let dense = data.to_dense();
        let min = dense.fold_axis(Axis(0), f64::INFINITY, |acc, &v| acc.min(v));
        let max = dense.fold_axis(Axis(0), f64::NEG_INFINITY, |acc, &v| acc.max(v));
        let scale = (&max - &min).mapv(|range| if range > 0.0 { 1.0 / range } else { 1.0 });
        Ok(MinMaxScaler { min, scale })
    }

    pub fn n_features(&self) -> usize {
        self.min.len()
    }

    /// Scaled dense copy of `data`.
    pub fn transform(&self, data: &FeatureMatrix) -> Result<FeatureMatrix> {
        if data.ncols() != self.n_features() {
            return Err(PerturbationError::shape(
                "scaler input columns",
                self.n_features(),
                data.ncols(),
            ));
        }
        let mut scaled: Array2<f64> = data.to_dense().into_owned();
        scaled -= &self.min;
        scaled *= &self.scale;
        Ok(FeatureMatrix::Dense(scaled))
    }
}
