//! Evaluation metrics
//!
//! Regression: mse/rmse. Binary classification: accuracy, precision,
//! recall, F1 (zero when the denominator is empty), ROC AUC on scores,
//! log loss, and a precision-recall curve for report artifacts.

use ndarray::Array1;

use crate::error::{BenchError, Result};

/// Mean squared error.
pub fn mse(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64> {
    check_same_len(y_true, y_pred)?;
    let n = y_true.len() as f64;
    Ok(y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum::<f64>()
        / n)
}

/// Root mean squared error.
pub fn rmse(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64> {
    Ok(mse(y_true, y_pred)?.sqrt())
}

/// Binary confusion counts (tp, fp, tn, fn) at the 0.5 label convention.
fn confusion_counts(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> (usize, usize, usize, usize) {
    let mut tp = 0;
    let mut fp = 0;
    let mut tn = 0;
    let mut fn_ = 0;
    for (t, p) in y_true.iter().zip(y_pred.iter()) {
        match (*t > 0.5, *p > 0.5) {
            (true, true) => tp += 1,
            (false, true) => fp += 1,
            (false, false) => tn += 1,
            (true, false) => fn_ += 1,
        }
    }
    (tp, fp, tn, fn_)
}

pub fn accuracy(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64> {
    check_same_len(y_true, y_pred)?;
    let correct = y_true
        .iter()
        .zip(y_pred.iter())
        .filter(|(t, p)| (**t > 0.5) == (**p > 0.5))
        .count();
    Ok(correct as f64 / y_true.len() as f64)
}

pub fn precision(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64> {
    check_same_len(y_true, y_pred)?;
    let (tp, fp, _, _) = confusion_counts(y_true, y_pred);
    Ok(if tp + fp > 0 {
        tp as f64 / (tp + fp) as f64
    } else {
        0.0
    })
}

pub fn recall(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64> {
    check_same_len(y_true, y_pred)?;
    let (tp, _, _, fn_) = confusion_counts(y_true, y_pred);
    Ok(if tp + fn_ > 0 {
        tp as f64 / (tp + fn_) as f64
    } else {
        0.0
    })
}

pub fn f1_score(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64> {
    let p = precision(y_true, y_pred)?;
    let r = recall(y_true, y_pred)?;
    Ok(if p + r > 0.0 { 2.0 * p * r / (p + r) } else { 0.0 })
}

/// ROC AUC from scores, computed as the Mann-Whitney rank statistic with
/// midrank tie handling. Errors when only one class is present.
pub fn roc_auc(y_true: &Array1<f64>, scores: &Array1<f64>) -> Result<f64> {
    check_same_len(y_true, scores)?;
    let n = y_true.len();
    let n_pos = y_true.iter().filter(|&&t| t > 0.5).count();
    let n_neg = n - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return Err(BenchError::Evaluation(
            "ROC AUC needs both classes in the targets".to_string(),
        ));
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        scores[a]
            .partial_cmp(&scores[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    // Midranks over tied scores
    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        let midrank = (i + j) as f64 / 2.0 + 1.0;
        for k in i..=j {
            ranks[order[k]] = midrank;
        }
        i = j + 1;
    }

    let rank_sum_pos: f64 = y_true
        .iter()
        .zip(ranks.iter())
        .filter(|(t, _)| **t > 0.5)
        .map(|(_, r)| r)
        .sum();
    let auc =
        (rank_sum_pos - n_pos as f64 * (n_pos as f64 + 1.0) / 2.0) / (n_pos as f64 * n_neg as f64);
    Ok(auc)
}

/// Binary cross-entropy with probability clamping.
pub fn log_loss(y_true: &Array1<f64>, scores: &Array1<f64>) -> Result<f64> {
    check_same_len(y_true, scores)?;
    let n = y_true.len() as f64;
    let eps = 1e-15;
    let total: f64 = y_true
        .iter()
        .zip(scores.iter())
        .map(|(t, s)| {
            let p = s.clamp(eps, 1.0 - eps);
            -(t * p.ln() + (1.0 - t) * (1.0 - p).ln())
        })
        .sum();
    Ok(total / n)
}

/// One point of a precision-recall curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrPoint {
    pub threshold: f64,
    pub precision: f64,
    pub recall: f64,
}

/// Precision-recall curve over the distinct score thresholds, highest first.
pub fn precision_recall_curve(y_true: &Array1<f64>, scores: &Array1<f64>) -> Result<Vec<PrPoint>> {
    check_same_len(y_true, scores)?;
    let n_pos = y_true.iter().filter(|&&t| t > 0.5).count();
    if n_pos == 0 {
        return Err(BenchError::Evaluation(
            "precision-recall curve needs at least one positive".to_string(),
        ));
    }

    let mut order: Vec<usize> = (0..y_true.len()).collect();
    order.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut curve = Vec::new();
    let mut tp = 0usize;
    let mut predicted = 0usize;
    let mut i = 0;
    while i < order.len() {
        let threshold = scores[order[i]];
        // Consume the whole tie group before emitting a point
        while i < order.len() && scores[order[i]] == threshold {
            predicted += 1;
            if y_true[order[i]] > 0.5 {
                tp += 1;
            }
            i += 1;
        }
        curve.push(PrPoint {
            threshold,
            precision: tp as f64 / predicted as f64,
            recall: tp as f64 / n_pos as f64,
        });
    }
    Ok(curve)
}

fn check_same_len(a: &Array1<f64>, b: &Array1<f64>) -> Result<()> {
    if a.len() != b.len() {
        return Err(BenchError::Shape {
            expected: format!("length {}", a.len()),
            actual: format!("length {}", b.len()),
        });
    }
    if a.is_empty() {
        return Err(BenchError::Evaluation(
            "cannot evaluate empty arrays".to_string(),
        ));
    }
    Ok(())
}
