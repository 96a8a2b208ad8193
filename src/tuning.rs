//! Boosting-round selection, parameter grids, and score thresholds
//!
//! Round selection mirrors the cross-validated early stopping the
//! experiments rely on: contiguous folds (no shuffling), per-round
//! held-out metric means, and a patience window on the mean curve.

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{BenchError, Result};
use crate::metrics;
use crate::models::{EvalMetric, GbdtClassifier, GbdtConfig, GbdtRegressor};

/// Objective of a boosted model under tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Task {
    Regression,
    Classification,
}

impl Task {
    fn metric(&self) -> EvalMetric {
        match self {
            Task::Regression => EvalMetric::Rmse,
            Task::Classification => EvalMetric::LogLoss,
        }
    }
}

/// Outcome of cross-validated round selection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CvOutcome {
    /// Boosting rounds achieving the best mean held-out metric
    pub best_round: usize,
    /// The best mean held-out metric
    pub best_score: f64,
}

/// Select the boosting round count by K-fold cross-validation: each fold
/// is boosted to the configured cap while its held-out metric is recorded
/// per round, the per-round means are scanned, and scanning stops once the
/// mean has not improved for `early_stopping_rounds` rounds.
pub fn cv_best_round(
    config: &GbdtConfig,
    task: Task,
    x: &Array2<f64>,
    y: &Array1<f64>,
    weights: Option<&Array1<f64>>,
    n_folds: usize,
    early_stopping_rounds: usize,
) -> Result<CvOutcome> {
    let n = x.nrows();
    if n_folds < 2 {
        return Err(BenchError::Validation(
            "cross-validation needs at least 2 folds".to_string(),
        ));
    }
    if n < n_folds {
        return Err(BenchError::Validation(format!(
            "{n} samples cannot fill {n_folds} folds"
        )));
    }

    let metric = task.metric();
    let mut histories: Vec<Vec<f64>> = Vec::with_capacity(n_folds);

    for fold in 0..n_folds {
        let (val_start, val_end) = fold_bounds(n, n_folds, fold);
        let train_rows: Vec<usize> = (0..val_start).chain(val_end..n).collect();
        let val_rows: Vec<usize> = (val_start..val_end).collect();

        let x_train = x.select(Axis(0), &train_rows);
        let y_train = y.select(Axis(0), &train_rows);
        let x_val = x.select(Axis(0), &val_rows);
        let y_val = y.select(Axis(0), &val_rows);
        let w_train = weights.map(|w| w.select(Axis(0), &train_rows));

        let history = match task {
            Task::Regression => {
                let mut model = GbdtRegressor::new(config.clone());
                model.fit_eval(&x_train, &y_train, w_train.as_ref(), &x_val, &y_val, metric)?
            }
            Task::Classification => {
                let mut model = GbdtClassifier::new(config.clone());
                model.fit_eval(&x_train, &y_train, w_train.as_ref(), &x_val, &y_val, metric)?
            }
        };
        histories.push(history);
    }

    let n_rounds = histories.iter().map(Vec::len).min().unwrap_or(0);
    if n_rounds == 0 {
        return Err(BenchError::Validation(
            "cross-validation produced no evaluation rounds".to_string(),
        ));
    }

    let mut best_score = f64::INFINITY;
    let mut best_round = 0;
    for round in 0..n_rounds {
        let mean: f64 =
            histories.iter().map(|h| h[round]).sum::<f64>() / histories.len() as f64;
        if mean < best_score {
            best_score = mean;
            best_round = round;
        } else if round - best_round >= early_stopping_rounds {
            break;
        }
    }

    debug!(best_round = best_round + 1, best_score, "cv round selection");
    Ok(CvOutcome {
        best_round: best_round + 1,
        best_score,
    })
}

fn fold_bounds(n: usize, n_folds: usize, fold: usize) -> (usize, usize) {
    let base = n / n_folds;
    let extra = n % n_folds;
    let start = fold * base + fold.min(extra);
    let size = base + usize::from(fold < extra);
    (start, start + size)
}

/// Grid search over tree depth and minimum child weight, each point scored
/// by [`cv_best_round`]. Returns the winning configuration with its round
/// count already applied, plus the winning CV outcome.
pub fn param_selection(
    base: &GbdtConfig,
    task: Task,
    x: &Array2<f64>,
    y: &Array1<f64>,
    weights: Option<&Array1<f64>>,
    n_folds: usize,
    early_stopping_rounds: usize,
) -> Result<(GbdtConfig, CvOutcome)> {
    const MAX_DEPTHS: [usize; 3] = [2, 3, 4];
    const MIN_CHILD_WEIGHTS: [f64; 3] = [1.0, 2.0, 4.0];

    let mut best: Option<(GbdtConfig, CvOutcome)> = None;
    for &max_depth in &MAX_DEPTHS {
        for &min_child_weight in &MIN_CHILD_WEIGHTS {
            let candidate = base
                .clone()
                .with_max_depth(max_depth)
                .with_min_child_weight(min_child_weight);
            let outcome =
                cv_best_round(&candidate, task, x, y, weights, n_folds, early_stopping_rounds)?;
            debug!(
                max_depth,
                min_child_weight,
                score = outcome.best_score,
                rounds = outcome.best_round,
                "grid point"
            );
            if best
                .as_ref()
                .map_or(true, |(_, o)| outcome.best_score < o.best_score)
            {
                best = Some((candidate.with_n_rounds(outcome.best_round), outcome));
            }
        }
    }
    best.ok_or_else(|| BenchError::Validation("empty parameter grid".to_string()))
}

/// Scan the observed validation scores for the decision threshold that
/// maximizes F1. Predictions use strict `score > threshold`; ties on F1
/// resolve to the lowest threshold.
pub fn search_threshold(y_true: &Array1<f64>, scores: &Array1<f64>) -> Result<f64> {
    if y_true.len() != scores.len() || y_true.is_empty() {
        return Err(BenchError::Shape {
            expected: format!("non-empty targets of length {}", scores.len()),
            actual: format!("length {}", y_true.len()),
        });
    }

    let mut candidates: Vec<f64> = scores.to_vec();
    candidates.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    candidates.dedup();

    let mut best_threshold = candidates[0];
    let mut best_f1 = -1.0;
    for &threshold in &candidates {
        let predictions = scores.mapv(|s| if s > threshold { 1.0 } else { 0.0 });
        let f1 = metrics::f1_score(y_true, &predictions)?;
        if f1 > best_f1 {
            best_f1 = f1;
            best_threshold = threshold;
        }
    }
    Ok(best_threshold)
}

/// Mark positive the top `pos_ratio * n` scores, the label rule the
/// classification experiments inherit from the training class balance.
pub fn top_k_threshold(scores: &Array1<f64>, pos_ratio: f64) -> Array1<f64> {
    let n = scores.len();
    if n == 0 {
        return Array1::zeros(0);
    }
    let top_k = ((pos_ratio.clamp(0.0, 1.0)) * n as f64) as usize;

    let mut sorted: Vec<f64> = scores.to_vec();
    sorted.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    let cutoff = sorted[top_k.min(n - 1)];

    scores.mapv(|s| if s > cutoff { 1.0 } else { 0.0 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use ndarray::Array2;

    fn linear_data(n: usize) -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((n, 2), |(i, j)| {
            if j == 0 {
                i as f64 / n as f64
            } else {
                ((i * 29) % 11) as f64 / 11.0
            }
        });
        let y = x.column(0).mapv(|v| 2.0 * v);
        (x, y)
    }

    #[test]
    fn test_fold_bounds_cover_everything() {
        let n = 23;
        let n_folds = 5;
        let mut covered = 0;
        for fold in 0..n_folds {
            let (start, end) = fold_bounds(n, n_folds, fold);
            assert!(end > start);
            assert_eq!(start, covered);
            covered = end;
        }
        assert_eq!(covered, n);
    }

    #[test]
    fn test_cv_best_round_within_cap() {
        let (x, y) = linear_data(100);
        let config = GbdtConfig::default().with_n_rounds(20);
        let outcome =
            cv_best_round(&config, Task::Regression, &x, &y, None, 5, 5).unwrap();
        assert!(outcome.best_round >= 1);
        assert!(outcome.best_round <= 20);
        assert!(outcome.best_score.is_finite());
    }

    #[test]
    fn test_cv_rejects_degenerate_folds() {
        let (x, y) = linear_data(10);
        let config = GbdtConfig::default().with_n_rounds(5);
        assert!(cv_best_round(&config, Task::Regression, &x, &y, None, 1, 5).is_err());
        assert!(cv_best_round(&config, Task::Regression, &x, &y, None, 11, 5).is_err());
    }

    #[test]
    fn test_param_selection_returns_grid_member() {
        let (x, y) = linear_data(80);
        let base = GbdtConfig::default().with_n_rounds(10);
        let (config, outcome) =
            param_selection(&base, Task::Regression, &x, &y, None, 4, 3).unwrap();
        assert!([2, 3, 4].contains(&config.max_depth));
        assert!([1.0, 2.0, 4.0].contains(&config.min_child_weight));
        assert_eq!(config.n_rounds, outcome.best_round);
    }

    #[test]
    fn test_search_threshold_finds_separator() {
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0];
        let scores = array![0.1, 0.2, 0.3, 0.8, 0.9];
        let threshold = search_threshold(&y, &scores).unwrap();
        // Any threshold in [0.3, 0.8) is perfect; the scan picks the lowest
        assert!((threshold - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_top_k_threshold_marks_expected_count() {
        let scores = array![0.9, 0.1, 0.8, 0.2, 0.7, 0.3];
        let predictions = top_k_threshold(&scores, 0.5);
        let n_pos: f64 = predictions.sum();
        assert_eq!(n_pos, 3.0);
        assert_eq!(predictions[0], 1.0);
        assert_eq!(predictions[1], 0.0);
    }

    #[test]
    fn test_top_k_threshold_zero_ratio() {
        let scores = array![0.4, 0.6, 0.5];
        let predictions = top_k_threshold(&scores, 0.0);
        assert_eq!(predictions.sum(), 0.0);
    }
}
