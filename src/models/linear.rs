//! Linear models
//!
//! Ordinary least squares via the normal equations with a Cholesky solve,
//! and L2-regularized logistic regression trained by gradient descent.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{BenchError, Result};

/// Solve the symmetric positive-definite system `A x = b` by Cholesky
/// decomposition. Adds a small ridge and retries once if the matrix is
/// not positive definite.
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    match cholesky_solve_inner(a, b) {
        Some(x) => Some(x),
        None => {
            let n = a.nrows();
            let ridge = 1e-8 * a.diag().iter().map(|v| v.abs()).sum::<f64>() / n as f64;
            let mut a_reg = a.clone();
            for k in 0..n {
                a_reg[[k, k]] += ridge.max(1e-12);
            }
            cholesky_solve_inner(&a_reg, b)
        }
    }
}

fn cholesky_solve_inner(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() {
        return None;
    }

    // A = L * L^T
    let mut l = Array2::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[[i, k]] * l[[j, k]];
            }
            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 0.0 {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    // Forward substitution: L y = b
    let mut y = Array1::zeros(n);
    for i in 0..n {
        let mut sum = 0.0;
        for j in 0..i {
            sum += l[[i, j]] * y[j];
        }
        y[i] = (b[i] - sum) / l[[i, i]];
    }

    // Backward substitution: L^T x = y
    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        let mut sum = 0.0;
        for j in (i + 1)..n {
            sum += l[[j, i]] * x[j];
        }
        x[i] = (y[i] - sum) / l[[i, i]];
    }
    Some(x)
}

/// Ordinary least squares regression
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearRegression {
    coefficients: Option<Array1<f64>>,
    intercept: f64,
    /// Whether to fit an intercept
    pub fit_intercept: bool,
}

impl Default for LinearRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LinearRegression {
    pub fn new() -> Self {
        Self {
            coefficients: None,
            intercept: 0.0,
            fit_intercept: true,
        }
    }

    /// Fit by solving the normal equations.
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let n = x.nrows();
        if n == 0 || y.len() != n {
            return Err(BenchError::Shape {
                expected: format!("{n} non-empty rows with matching targets"),
                actual: format!("{} targets", y.len()),
            });
        }

        let design = if self.fit_intercept {
            let mut d = Array2::ones((n, x.ncols() + 1));
            d.slice_mut(ndarray::s![.., 1..]).assign(x);
            d
        } else {
            x.clone()
        };

        let xtx = design.t().dot(&design);
        let xty = design.t().dot(y);
        let solution = cholesky_solve(&xtx, &xty).ok_or_else(|| {
            BenchError::Training("normal equations are singular".to_string())
        })?;

        if self.fit_intercept {
            self.intercept = solution[0];
            self.coefficients = Some(solution.slice(ndarray::s![1..]).to_owned());
        } else {
            self.intercept = 0.0;
            self.coefficients = Some(solution);
        }
        Ok(())
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let coef = self.coefficients.as_ref().ok_or(BenchError::ModelNotFitted)?;
        if x.ncols() != coef.len() {
            return Err(BenchError::Shape {
                expected: format!("{} features", coef.len()),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(x.dot(coef) + self.intercept)
    }

    pub fn coefficients(&self) -> Option<&Array1<f64>> {
        self.coefficients.as_ref()
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }
}

/// L2-regularized logistic regression trained by gradient descent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    coefficients: Option<Array1<f64>>,
    intercept: f64,
    /// L2 regularization strength
    pub alpha: f64,
    /// Maximum gradient descent iterations
    pub max_iter: usize,
    /// Convergence tolerance on the coefficient update
    pub tol: f64,
    /// Gradient descent step size
    pub learning_rate: f64,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LogisticRegression {
    pub fn new() -> Self {
        Self {
            coefficients: None,
            intercept: 0.0,
            alpha: 0.01,
            max_iter: 1000,
            tol: 1e-6,
            learning_rate: 0.1,
        }
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Fit on binary targets in {0, 1}.
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let n = x.nrows();
        if n == 0 || y.len() != n {
            return Err(BenchError::Shape {
                expected: format!("{n} non-empty rows with matching targets"),
                actual: format!("{} targets", y.len()),
            });
        }

        let n_features = x.ncols();
        let mut coef = Array1::zeros(n_features);
        let mut intercept = 0.0;
        let inv_n = 1.0 / n as f64;

        for _ in 0..self.max_iter {
            let z = x.dot(&coef) + intercept;
            let probs = z.mapv(|v| 1.0 / (1.0 + (-v).exp()));
            let errors = &probs - y;

            let grad_coef = x.t().dot(&errors) * inv_n + &coef * self.alpha;
            let grad_intercept = errors.mean().unwrap_or(0.0);

            let step = &grad_coef * self.learning_rate;
            coef -= &step;
            intercept -= self.learning_rate * grad_intercept;

            let update_norm = step.iter().map(|v| v * v).sum::<f64>().sqrt();
            if update_norm < self.tol {
                break;
            }
        }

        self.coefficients = Some(coef);
        self.intercept = intercept;
        Ok(())
    }

    /// Positive-class probabilities.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let coef = self.coefficients.as_ref().ok_or(BenchError::ModelNotFitted)?;
        if x.ncols() != coef.len() {
            return Err(BenchError::Shape {
                expected: format!("{} features", coef.len()),
                actual: format!("{} features", x.ncols()),
            });
        }
        let z = x.dot(coef) + self.intercept;
        Ok(z.mapv(|v| 1.0 / (1.0 + (-v).exp())))
    }

    /// Class labels at the 0.5 probability cut.
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let probs = self.predict_proba(x)?;
        Ok(probs.mapv(|p| if p >= 0.5 { 1.0 } else { 0.0 }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_ols_recovers_exact_line() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![3.0, 5.0, 7.0, 9.0]; // y = 2x + 1
        let mut model = LinearRegression::new();
        model.fit(&x, &y).unwrap();

        assert!((model.intercept() - 1.0).abs() < 1e-6);
        assert!((model.coefficients().unwrap()[0] - 2.0).abs() < 1e-6);

        let pred = model.predict(&array![[5.0]]).unwrap();
        assert!((pred[0] - 11.0).abs() < 1e-6);
    }

    #[test]
    fn test_ols_two_features() {
        let x = array![
            [1.0, 0.0],
            [0.0, 1.0],
            [1.0, 1.0],
            [2.0, 1.0],
            [1.0, 2.0]
        ];
        let y = x.column(0).to_owned() * 2.0 + x.column(1).to_owned() * -1.0;
        let mut model = LinearRegression::new();
        model.fit(&x, &y).unwrap();

        let coef = model.coefficients().unwrap();
        assert!((coef[0] - 2.0).abs() < 1e-6);
        assert!((coef[1] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_logistic_separates_simple_classes() {
        let x = array![
            [-2.0],
            [-1.5],
            [-1.0],
            [-0.5],
            [0.5],
            [1.0],
            [1.5],
            [2.0]
        ];
        let y = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        let mut model = LogisticRegression::new().with_alpha(0.0);
        model.fit(&x, &y).unwrap();

        let pred = model.predict(&x).unwrap();
        assert_eq!(pred.to_vec(), y.to_vec());

        let probs = model.predict_proba(&x).unwrap();
        assert!(probs[0] < 0.5 && probs[7] > 0.5);
    }

    #[test]
    fn test_predict_before_fit_fails() {
        let model = LinearRegression::new();
        assert!(matches!(
            model.predict(&array![[1.0]]),
            Err(BenchError::ModelNotFitted)
        ));
        let clf = LogisticRegression::new();
        assert!(clf.predict_proba(&array![[1.0]]).is_err());
    }
}
