//! Regression tree with sample weights
//!
//! Base learner for gradient boosting. Splits minimize weighted squared
//! error using sorted prefix sums; leaf values are weighted means. Sample
//! weights carry the time-decay weighting used by the walk-forward
//! experiment, and the minimum leaf weight plays the role of xgboost's
//! `min_child_weight` for the boosted ensembles.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{BenchError, Result};

/// Tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    Leaf {
        value: f64,
        weight: f64,
    },
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

/// Weighted regression tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionTree {
    root: Option<TreeNode>,
    /// Maximum depth
    pub max_depth: usize,
    /// Minimum samples in each child
    pub min_samples_leaf: usize,
    /// Minimum total sample weight in each child
    pub min_weight_leaf: f64,
    n_features: usize,
    feature_importances: Option<Array1<f64>>,
}

impl Default for RegressionTree {
    fn default() -> Self {
        Self::new()
    }
}

impl RegressionTree {
    pub fn new() -> Self {
        Self {
            root: None,
            max_depth: 6,
            min_samples_leaf: 1,
            min_weight_leaf: 0.0,
            n_features: 0,
            feature_importances: None,
        }
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Set minimum samples in each child
    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples.max(1);
        self
    }

    /// Set minimum total weight in each child
    pub fn with_min_weight_leaf(mut self, min_weight: f64) -> Self {
        self.min_weight_leaf = min_weight;
        self
    }

    /// Fit with uniform weights.
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let weights = Array1::ones(y.len());
        self.fit_weighted(x, y, &weights)
    }

    /// Fit with per-sample weights.
    pub fn fit_weighted(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        weights: &Array1<f64>,
    ) -> Result<&mut Self> {
        let n_samples = x.nrows();
        if n_samples == 0 {
            return Err(BenchError::Training(
                "cannot fit a tree on zero samples".to_string(),
            ));
        }
        if y.len() != n_samples || weights.len() != n_samples {
            return Err(BenchError::Shape {
                expected: format!("targets and weights of length {n_samples}"),
                actual: format!("{} and {}", y.len(), weights.len()),
            });
        }
        if weights.iter().any(|&w| w < 0.0) {
            return Err(BenchError::InvalidParameter {
                name: "weights".to_string(),
                value: "negative".to_string(),
                reason: "sample weights must be non-negative".to_string(),
            });
        }

        self.n_features = x.ncols();
        let mut importances = vec![0.0; self.n_features];
        let indices: Vec<usize> = (0..n_samples).collect();
        self.root = Some(self.build_node(x, y, weights, indices, 0, &mut importances));

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for imp in &mut importances {
                *imp /= total;
            }
        }
        self.feature_importances = Some(Array1::from_vec(importances));
        Ok(self)
    }

    fn build_node(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        weights: &Array1<f64>,
        mut indices: Vec<usize>,
        depth: usize,
        importances: &mut [f64],
    ) -> TreeNode {
        let (sum_w, sum_wy) = indices.iter().fold((0.0, 0.0), |(sw, swy), &i| {
            (sw + weights[i], swy + weights[i] * y[i])
        });
        let leaf_value = if sum_w > 0.0 { sum_wy / sum_w } else { 0.0 };

        let should_stop = depth >= self.max_depth
            || indices.len() < 2 * self.min_samples_leaf
            || sum_w <= 0.0;
        if should_stop {
            return TreeNode::Leaf {
                value: leaf_value,
                weight: sum_w,
            };
        }

        let Some(split) = self.find_best_split(x, y, weights, &indices) else {
            return TreeNode::Leaf {
                value: leaf_value,
                weight: sum_w,
            };
        };

        importances[split.feature_idx] += split.sse_reduction;

        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .drain(..)
            .partition(|&i| x[[i, split.feature_idx]] <= split.threshold);

        TreeNode::Split {
            feature_idx: split.feature_idx,
            threshold: split.threshold,
            left: Box::new(self.build_node(x, y, weights, left, depth + 1, importances)),
            right: Box::new(self.build_node(x, y, weights, right, depth + 1, importances)),
        }
    }

    fn find_best_split(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        weights: &Array1<f64>,
        indices: &[usize],
    ) -> Option<SplitCandidate> {
        let n = indices.len();
        let mut best: Option<SplitCandidate> = None;

        for feature_idx in 0..self.n_features {
            let mut sorted: Vec<usize> = indices.to_vec();
            sorted.sort_by(|&a, &b| {
                x[[a, feature_idx]]
                    .partial_cmp(&x[[b, feature_idx]])
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

            // Prefix sums of w, w*y, w*y^2 over the sorted order
            let mut pw = vec![0.0; n + 1];
            let mut pwy = vec![0.0; n + 1];
            let mut pwyy = vec![0.0; n + 1];
            for (k, &i) in sorted.iter().enumerate() {
                let (w, yi) = (weights[i], y[i]);
                pw[k + 1] = pw[k] + w;
                pwy[k + 1] = pwy[k] + w * yi;
                pwyy[k + 1] = pwyy[k] + w * yi * yi;
            }

            let total_sse = weighted_sse(pw[n], pwy[n], pwyy[n]);

            for k in self.min_samples_leaf..=(n - self.min_samples_leaf) {
                if k == n {
                    break;
                }
                let lo = x[[sorted[k - 1], feature_idx]];
                let hi = x[[sorted[k], feature_idx]];
                if lo == hi {
                    continue;
                }
                let (lw, rw) = (pw[k], pw[n] - pw[k]);
                if lw < self.min_weight_leaf || rw < self.min_weight_leaf {
                    continue;
                }
                let left_sse = weighted_sse(pw[k], pwy[k], pwyy[k]);
                let right_sse = weighted_sse(rw, pwy[n] - pwy[k], pwyy[n] - pwyy[k]);
                let reduction = total_sse - left_sse - right_sse;
                if reduction <= 0.0 {
                    continue;
                }
                if best.as_ref().map_or(true, |b| reduction > b.sse_reduction) {
                    best = Some(SplitCandidate {
                        feature_idx,
                        threshold: (lo + hi) / 2.0,
                        sse_reduction: reduction,
                    });
                }
            }
        }
        best
    }

    /// Predict a batch of rows.
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self.root.as_ref().ok_or(BenchError::ModelNotFitted)?;
        if x.ncols() != self.n_features {
            return Err(BenchError::Shape {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok((0..x.nrows())
            .map(|i| Self::predict_row(root, &x.row(i).to_owned()))
            .collect())
    }

    fn predict_row(node: &TreeNode, row: &Array1<f64>) -> f64 {
        match node {
            TreeNode::Leaf { value, .. } => *value,
            TreeNode::Split {
                feature_idx,
                threshold,
                left,
                right,
            } => {
                if row[*feature_idx] <= *threshold {
                    Self::predict_row(left, row)
                } else {
                    Self::predict_row(right, row)
                }
            }
        }
    }

    /// Normalized per-feature split-gain importances.
    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }
}

struct SplitCandidate {
    feature_idx: usize,
    threshold: f64,
    sse_reduction: f64,
}

fn weighted_sse(sum_w: f64, sum_wy: f64, sum_wyy: f64) -> f64 {
    if sum_w > 0.0 {
        sum_wyy - sum_wy * sum_wy / sum_w
    } else {
        0.0
    }
}
