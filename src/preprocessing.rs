//! Feature scaling
//!
//! Standard (z-score) scaling fit on the training rows only, then applied
//! to the full matrix. Used by the recurrent model path; the tree and
//! linear models consume raw features.

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{BenchError, Result};

/// Per-column z-score scaler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Array1<f64>,
    std: Array1<f64>,
    is_fitted: bool,
}

impl Default for StandardScaler {
    fn default() -> Self {
        Self::new()
    }
}

impl StandardScaler {
    pub fn new() -> Self {
        Self {
            mean: Array1::zeros(0),
            std: Array1::zeros(0),
            is_fitted: false,
        }
    }

    /// Fit column means and standard deviations.
    pub fn fit(&mut self, x: &Array2<f64>) -> Result<&mut Self> {
        if x.nrows() == 0 {
            return Err(BenchError::Preprocessing(
                "cannot fit scaler on an empty matrix".to_string(),
            ));
        }
        self.mean = x.mean_axis(Axis(0)).ok_or_else(|| {
            BenchError::Preprocessing("failed to compute column means".to_string())
        })?;
        // Population std, zero-variance columns scale by 1.0
        let n = x.nrows() as f64;
        self.std = x
            .axis_iter(Axis(1))
            .zip(self.mean.iter())
            .map(|(col, &m)| {
                let var = col.iter().map(|v| (v - m).powi(2)).sum::<f64>() / n;
                let sd = var.sqrt();
                if sd > 0.0 { sd } else { 1.0 }
            })
            .collect();
        self.is_fitted = true;
        Ok(self)
    }

    /// Scale a matrix with the fitted parameters.
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.is_fitted {
            return Err(BenchError::ModelNotFitted);
        }
        if x.ncols() != self.mean.len() {
            return Err(BenchError::Shape {
                expected: format!("{} columns", self.mean.len()),
                actual: format!("{} columns", x.ncols()),
            });
        }
        let mut out = x.clone();
        for mut row in out.axis_iter_mut(Axis(0)) {
            row -= &self.mean;
            row /= &self.std;
        }
        Ok(out)
    }

    /// Fit and transform in one step.
    pub fn fit_transform(&mut self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.fit(x)?;
        self.transform(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_standard_scaling() {
        let x = array![[1.0, 10.0], [2.0, 20.0], [3.0, 30.0]];
        let mut scaler = StandardScaler::new();
        let scaled = scaler.fit_transform(&x).unwrap();

        for j in 0..2 {
            let col = scaled.column(j);
            let mean: f64 = col.iter().sum::<f64>() / 3.0;
            assert!(mean.abs() < 1e-12);
        }
    }

    #[test]
    fn test_transform_uses_training_statistics() {
        let train = array![[0.0], [2.0]];
        let mut scaler = StandardScaler::new();
        scaler.fit(&train).unwrap();

        let test = array![[4.0]];
        let scaled = scaler.transform(&test).unwrap();
        // mean 1, std 1 -> (4 - 1) / 1
        assert!((scaled[[0, 0]] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_variance_column_scales_by_one() {
        let x = array![[5.0, 1.0], [5.0, 3.0]];
        let mut scaler = StandardScaler::new();
        let scaled = scaler.fit_transform(&x).unwrap();
        assert!((scaled[[0, 0]] - 0.0).abs() < 1e-12);
        assert!((scaled[[1, 0]] - 0.0).abs() < 1e-12);
    }

    #[test]
    fn test_transform_before_fit_fails() {
        let scaler = StandardScaler::new();
        let x = array![[1.0]];
        assert!(matches!(
            scaler.transform(&x),
            Err(BenchError::ModelNotFitted)
        ));
    }
}
