//! Gradient-boosted decision trees
//!
//! Residual boosting for regression and logistic log-odds boosting for
//! binary classification, with optional per-sample weights (time-decay
//! weighting in the walk-forward experiment) and per-round held-out
//! evaluation for boosting-round selection.

use ndarray::{Array1, Array2, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::tree::RegressionTree;
use crate::error::{BenchError, Result};
use crate::metrics;

/// Held-out metric recorded per boosting round.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EvalMetric {
    /// Root mean squared error (regression objective)
    Rmse,
    /// Binary cross-entropy on probabilities (classification objective)
    LogLoss,
}

impl EvalMetric {
    pub fn compute(&self, y_true: &Array1<f64>, predictions: &Array1<f64>) -> Result<f64> {
        match self {
            EvalMetric::Rmse => metrics::rmse(y_true, predictions),
            EvalMetric::LogLoss => metrics::log_loss(y_true, predictions),
        }
    }
}

/// Boosting configuration. Defaults mirror the xgboost parameters the
/// experiments sweep around: shallow trees, a minimum child weight of 2,
/// and a cap of 100 rounds refined by cross-validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GbdtConfig {
    /// Number of boosting rounds (trees)
    pub n_rounds: usize,
    /// Learning rate (shrinkage)
    pub learning_rate: f64,
    /// Maximum tree depth
    pub max_depth: usize,
    /// Minimum sum of sample weights per child
    pub min_child_weight: f64,
    /// Minimum samples per child
    pub min_samples_leaf: usize,
    /// Row subsample ratio per tree
    pub subsample: f64,
    /// Column subsample ratio per tree
    pub colsample: f64,
    /// Random seed
    pub random_state: Option<u64>,
}

impl Default for GbdtConfig {
    fn default() -> Self {
        Self {
            n_rounds: 100,
            learning_rate: 0.3,
            max_depth: 2,
            min_child_weight: 2.0,
            min_samples_leaf: 1,
            subsample: 1.0,
            colsample: 1.0,
            random_state: Some(42),
        }
    }
}

impl GbdtConfig {
    pub fn with_n_rounds(mut self, n_rounds: usize) -> Self {
        self.n_rounds = n_rounds;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_min_child_weight(mut self, min_child_weight: f64) -> Self {
        self.min_child_weight = min_child_weight;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    fn new_tree(&self) -> RegressionTree {
        RegressionTree::new()
            .with_max_depth(self.max_depth)
            .with_min_samples_leaf(self.min_samples_leaf)
            .with_min_weight_leaf(self.min_child_weight)
    }

    fn rng(&self) -> Xoshiro256PlusPlus {
        match self.random_state {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        }
    }
}

/// Gradient boosting regressor (squared-error objective)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GbdtRegressor {
    config: GbdtConfig,
    trees: Vec<RegressionTree>,
    col_indices_per_tree: Vec<Vec<usize>>,
    initial_prediction: f64,
    feature_importances: Vec<f64>,
}

impl GbdtRegressor {
    pub fn new(config: GbdtConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            col_indices_per_tree: Vec::new(),
            initial_prediction: 0.0,
            feature_importances: Vec::new(),
        }
    }

    pub fn config(&self) -> &GbdtConfig {
        &self.config
    }

    /// Fit with uniform weights.
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.fit_weighted(x, y, None)
    }

    /// Fit with optional per-sample weights.
    pub fn fit_weighted(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        weights: Option<&Array1<f64>>,
    ) -> Result<()> {
        self.boost(x, y, weights, None).map(|_| ())
    }

    /// Fit while recording the held-out metric after every round.
    pub fn fit_eval(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        weights: Option<&Array1<f64>>,
        x_val: &Array2<f64>,
        y_val: &Array1<f64>,
        metric: EvalMetric,
    ) -> Result<Vec<f64>> {
        self.boost(x, y, weights, Some((x_val, y_val, metric)))
    }

    fn boost(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        weights: Option<&Array1<f64>>,
        eval: Option<(&Array2<f64>, &Array1<f64>, EvalMetric)>,
    ) -> Result<Vec<f64>> {
        let n_samples = x.nrows();
        let n_features = x.ncols();
        let weights = resolve_weights(n_samples, y.len(), weights)?;

        self.trees.clear();
        self.col_indices_per_tree.clear();
        self.initial_prediction = weighted_mean(y, &weights);
        self.feature_importances = vec![0.0; n_features];

        let mut predictions = Array1::from_elem(n_samples, self.initial_prediction);
        let mut val_predictions =
            eval.map(|(x_val, _, _)| Array1::from_elem(x_val.nrows(), self.initial_prediction));
        let mut history = Vec::new();
        let mut rng = self.config.rng();

        for _ in 0..self.config.n_rounds {
            let residuals = residuals(y, &predictions, n_samples);

            let sample_indices = subsample_indices(n_samples, self.config.subsample, &mut rng);
            let col_indices = subsample_indices(n_features, self.config.colsample, &mut rng);

            let x_sub = gather(x, &sample_indices, &col_indices);
            let r_sub: Array1<f64> = sample_indices.iter().map(|&i| residuals[i]).collect();
            let w_sub: Array1<f64> = sample_indices.iter().map(|&i| weights[i]).collect();

            let mut tree = self.config.new_tree();
            tree.fit_weighted(&x_sub, &r_sub, &w_sub)?;

            let x_cols = x.select(Axis(1), &col_indices);
            let tree_pred = tree.predict(&x_cols)?;
            predictions
                .iter_mut()
                .zip(tree_pred.iter())
                .for_each(|(p, t)| *p += self.config.learning_rate * t);

            if let (Some(val_pred), Some((x_val, y_val, metric))) = (&mut val_predictions, eval) {
                let x_val_cols = x_val.select(Axis(1), &col_indices);
                let tree_val = tree.predict(&x_val_cols)?;
                val_pred
                    .iter_mut()
                    .zip(tree_val.iter())
                    .for_each(|(p, t)| *p += self.config.learning_rate * t);
                history.push(metric.compute(y_val, val_pred)?);
            }

            accumulate_importances(&mut self.feature_importances, &tree, &col_indices);
            self.trees.push(tree);
            self.col_indices_per_tree.push(col_indices);
        }

        normalize(&mut self.feature_importances);
        Ok(history)
    }

    /// Predict regression targets.
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(BenchError::ModelNotFitted);
        }
        let mut predictions = Array1::from_elem(x.nrows(), self.initial_prediction);
        for (tree, cols) in self.trees.iter().zip(self.col_indices_per_tree.iter()) {
            let x_cols = x.select(Axis(1), cols);
            let tree_pred = tree.predict(&x_cols)?;
            predictions
                .iter_mut()
                .zip(tree_pred.iter())
                .for_each(|(p, t)| *p += self.config.learning_rate * t);
        }
        Ok(predictions)
    }

    /// Normalized feature importances.
    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }
}

/// Gradient boosting classifier (binary logistic objective)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GbdtClassifier {
    config: GbdtConfig,
    trees: Vec<RegressionTree>,
    col_indices_per_tree: Vec<Vec<usize>>,
    initial_log_odds: f64,
    feature_importances: Vec<f64>,
}

impl GbdtClassifier {
    pub fn new(config: GbdtConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            col_indices_per_tree: Vec::new(),
            initial_log_odds: 0.0,
            feature_importances: Vec::new(),
        }
    }

    pub fn config(&self) -> &GbdtConfig {
        &self.config
    }

    /// Fit with uniform weights.
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.fit_weighted(x, y, None)
    }

    /// Fit with optional per-sample weights.
    pub fn fit_weighted(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        weights: Option<&Array1<f64>>,
    ) -> Result<()> {
        self.boost(x, y, weights, None).map(|_| ())
    }

    /// Fit while recording the held-out metric on probabilities per round.
    pub fn fit_eval(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        weights: Option<&Array1<f64>>,
        x_val: &Array2<f64>,
        y_val: &Array1<f64>,
        metric: EvalMetric,
    ) -> Result<Vec<f64>> {
        self.boost(x, y, weights, Some((x_val, y_val, metric)))
    }

    fn boost(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        weights: Option<&Array1<f64>>,
        eval: Option<(&Array2<f64>, &Array1<f64>, EvalMetric)>,
    ) -> Result<Vec<f64>> {
        let n_samples = x.nrows();
        let n_features = x.ncols();
        let weights = resolve_weights(n_samples, y.len(), weights)?;

        self.trees.clear();
        self.col_indices_per_tree.clear();
        let p = weighted_mean(y, &weights).clamp(1e-6, 1.0 - 1e-6);
        self.initial_log_odds = (p / (1.0 - p)).ln();
        self.feature_importances = vec![0.0; n_features];

        let mut log_odds = Array1::from_elem(n_samples, self.initial_log_odds);
        let mut val_log_odds =
            eval.map(|(x_val, _, _)| Array1::from_elem(x_val.nrows(), self.initial_log_odds));
        let mut history = Vec::new();
        let mut rng = self.config.rng();

        for _ in 0..self.config.n_rounds {
            let probs = log_odds.mapv(sigmoid);
            let residuals = residuals(y, &probs, n_samples);

            let sample_indices = subsample_indices(n_samples, self.config.subsample, &mut rng);
            let col_indices = subsample_indices(n_features, self.config.colsample, &mut rng);

            let x_sub = gather(x, &sample_indices, &col_indices);
            let r_sub: Array1<f64> = sample_indices.iter().map(|&i| residuals[i]).collect();
            let w_sub: Array1<f64> = sample_indices.iter().map(|&i| weights[i]).collect();

            let mut tree = self.config.new_tree();
            tree.fit_weighted(&x_sub, &r_sub, &w_sub)?;

            let x_cols = x.select(Axis(1), &col_indices);
            let tree_pred = tree.predict(&x_cols)?;
            log_odds
                .iter_mut()
                .zip(tree_pred.iter())
                .for_each(|(lo, t)| *lo += self.config.learning_rate * t);

            if let (Some(val_lo), Some((x_val, y_val, metric))) = (&mut val_log_odds, eval) {
                let x_val_cols = x_val.select(Axis(1), &col_indices);
                let tree_val = tree.predict(&x_val_cols)?;
                val_lo
                    .iter_mut()
                    .zip(tree_val.iter())
                    .for_each(|(lo, t)| *lo += self.config.learning_rate * t);
                let val_probs = val_lo.mapv(sigmoid);
                history.push(metric.compute(y_val, &val_probs)?);
            }

            accumulate_importances(&mut self.feature_importances, &tree, &col_indices);
            self.trees.push(tree);
            self.col_indices_per_tree.push(col_indices);
        }

        normalize(&mut self.feature_importances);
        Ok(history)
    }

    /// Predict class labels at the 0.5 probability cut.
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let probs = self.predict_proba(x)?;
        Ok(probs.mapv(|p| if p >= 0.5 { 1.0 } else { 0.0 }))
    }

    /// Predict positive-class probabilities.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(BenchError::ModelNotFitted);
        }
        let mut log_odds = Array1::from_elem(x.nrows(), self.initial_log_odds);
        for (tree, cols) in self.trees.iter().zip(self.col_indices_per_tree.iter()) {
            let x_cols = x.select(Axis(1), cols);
            let tree_pred = tree.predict(&x_cols)?;
            log_odds
                .iter_mut()
                .zip(tree_pred.iter())
                .for_each(|(lo, t)| *lo += self.config.learning_rate * t);
        }
        Ok(log_odds.mapv(sigmoid))
    }

    /// Normalized feature importances.
    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

fn resolve_weights(
    n_samples: usize,
    n_targets: usize,
    weights: Option<&Array1<f64>>,
) -> Result<Array1<f64>> {
    if n_samples == 0 || n_targets != n_samples {
        return Err(BenchError::Shape {
            expected: format!("{n_samples} samples with matching targets"),
            actual: format!("{n_targets} targets"),
        });
    }
    match weights {
        Some(w) if w.len() != n_samples => Err(BenchError::Shape {
            expected: format!("weights of length {n_samples}"),
            actual: format!("length {}", w.len()),
        }),
        Some(w) => Ok(w.clone()),
        None => Ok(Array1::ones(n_samples)),
    }
}

fn weighted_mean(y: &Array1<f64>, weights: &Array1<f64>) -> f64 {
    let sum_w: f64 = weights.sum();
    if sum_w > 0.0 {
        y.iter().zip(weights.iter()).map(|(yi, wi)| yi * wi).sum::<f64>() / sum_w
    } else {
        0.0
    }
}

fn residuals(y: &Array1<f64>, predictions: &Array1<f64>, n_samples: usize) -> Array1<f64> {
    if n_samples > 10_000 {
        let res: Vec<f64> = (0..n_samples)
            .into_par_iter()
            .map(|i| y[i] - predictions[i])
            .collect();
        Array1::from_vec(res)
    } else {
        y.iter()
            .zip(predictions.iter())
            .map(|(yi, pi)| yi - pi)
            .collect()
    }
}

fn subsample_indices(n: usize, ratio: f64, rng: &mut Xoshiro256PlusPlus) -> Vec<usize> {
    if ratio >= 1.0 {
        return (0..n).collect();
    }
    let sample_size = ((n as f64) * ratio).ceil().max(1.0) as usize;
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(rng);
    indices.truncate(sample_size);
    indices.sort_unstable();
    indices
}

fn gather(x: &Array2<f64>, rows: &[usize], cols: &[usize]) -> Array2<f64> {
    let mut out = Array2::zeros((rows.len(), cols.len()));
    for (i, &r) in rows.iter().enumerate() {
        for (j, &c) in cols.iter().enumerate() {
            out[[i, j]] = x[[r, c]];
        }
    }
    out
}

fn accumulate_importances(totals: &mut [f64], tree: &RegressionTree, cols: &[usize]) {
    if let Some(tree_importance) = tree.feature_importances() {
        for (j, &col_idx) in cols.iter().enumerate() {
            if j < tree_importance.len() {
                totals[col_idx] += tree_importance[j];
            }
        }
    }
}

fn normalize(values: &mut [f64]) {
    let total: f64 = values.iter().sum();
    if total > 0.0 {
        for v in values {
            *v /= total;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regression_data() -> (Array2<f64>, Array1<f64>) {
        let n = 120;
        let x = Array2::from_shape_fn((n, 2), |(i, j)| {
            if j == 0 {
                i as f64 / n as f64
            } else {
                ((i * 37) % 17) as f64 / 17.0
            }
        });
        let y = x.column(0).mapv(|v| 3.0 * v + 1.0);
        (x, y)
    }

    fn classification_data() -> (Array2<f64>, Array1<f64>) {
        let n = 120;
        let x = Array2::from_shape_fn((n, 2), |(i, j)| {
            if j == 0 {
                i as f64 / n as f64
            } else {
                ((i * 31) % 13) as f64 / 13.0
            }
        });
        let y = x.column(0).mapv(|v| if v > 0.5 { 1.0 } else { 0.0 });
        (x, y)
    }

    #[test]
    fn test_regressor_learns_a_linear_trend() {
        let (x, y) = regression_data();
        let mut model = GbdtRegressor::new(GbdtConfig::default().with_n_rounds(50));
        model.fit(&x, &y).unwrap();

        let pred = model.predict(&x).unwrap();
        let rmse = crate::metrics::rmse(&y, &pred).unwrap();
        assert!(rmse < 0.3, "train rmse too high: {rmse}");
    }

    #[test]
    fn test_classifier_separates_the_classes() {
        let (x, y) = classification_data();
        let mut model = GbdtClassifier::new(GbdtConfig::default().with_n_rounds(30));
        model.fit(&x, &y).unwrap();

        let pred = model.predict(&x).unwrap();
        let acc = crate::metrics::accuracy(&y, &pred).unwrap();
        assert!(acc > 0.9, "train accuracy too low: {acc}");

        let probs = model.predict_proba(&x).unwrap();
        assert!(probs.iter().all(|&p| (0.0..=1.0).contains(&p)));
    }

    #[test]
    fn test_eval_history_has_one_entry_per_round() {
        let (x, y) = regression_data();
        let x_train = x.slice(ndarray::s![..90, ..]).to_owned();
        let y_train = y.slice(ndarray::s![..90]).to_owned();
        let x_val = x.slice(ndarray::s![90.., ..]).to_owned();
        let y_val = y.slice(ndarray::s![90..]).to_owned();

        let mut model = GbdtRegressor::new(GbdtConfig::default().with_n_rounds(25));
        let history = model
            .fit_eval(&x_train, &y_train, None, &x_val, &y_val, EvalMetric::Rmse)
            .unwrap();
        assert_eq!(history.len(), 25);
        assert!(history.iter().all(|m| m.is_finite() && *m >= 0.0));
    }

    #[test]
    fn test_weighted_fit_prefers_heavy_samples() {
        // Two contradictory halves, weights select the second
        let x = Array2::from_shape_fn((40, 1), |(i, _)| (i % 4) as f64);
        let mut y = Array1::zeros(40);
        let mut w = Array1::from_elem(40, 1e-6);
        for i in 20..40 {
            y[i] = 1.0;
            w[i] = 1.0;
        }
        let mut model = GbdtRegressor::new(GbdtConfig::default().with_n_rounds(10));
        model.fit_weighted(&x, &y, Some(&w)).unwrap();
        let pred = model.predict(&x).unwrap();
        assert!(pred.iter().all(|&p| p > 0.9), "weights were ignored");
    }

    #[test]
    fn test_same_seed_is_deterministic() {
        let (x, y) = classification_data();
        let config = GbdtConfig {
            subsample: 0.7,
            colsample: 0.5,
            ..GbdtConfig::default()
        }
        .with_n_rounds(10);

        let mut a = GbdtClassifier::new(config.clone());
        let mut b = GbdtClassifier::new(config);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();

        let pa = a.predict_proba(&x).unwrap();
        let pb = b.predict_proba(&x).unwrap();
        for (va, vb) in pa.iter().zip(pb.iter()) {
            assert_eq!(va, vb);
        }
    }

    #[test]
    fn test_predict_before_fit_fails() {
        let model = GbdtRegressor::new(GbdtConfig::default());
        assert!(matches!(
            model.predict(&Array2::zeros((1, 2))),
            Err(BenchError::ModelNotFitted)
        ));
    }
}
