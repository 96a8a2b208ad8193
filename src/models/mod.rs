//! Model implementations
//!
//! The three benchmarked model families:
//! - Gradient-boosted decision trees (weighted regression tree base learner)
//! - Linear models (OLS, logistic regression)
//! - Recurrent network (LSTM over standardized sequence windows)

pub mod gbdt;
pub mod linear;
pub mod lstm;
pub mod tree;

pub use gbdt::{EvalMetric, GbdtClassifier, GbdtConfig, GbdtRegressor};
pub use linear::{LinearRegression, LogisticRegression};
pub use lstm::{LstmClassifier, LstmConfig, LstmRegressor};
pub use tree::RegressionTree;

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::str::FromStr;

use ndarray::{s, Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::data::sequence_windows;
use crate::error::{BenchError, Result};
use crate::preprocessing::StandardScaler;

/// Benchmarked model family, identified in reports by its short name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelKind {
    Gbdt,
    Lr,
    Rnn,
}

impl ModelKind {
    /// All families, in report order.
    pub const ALL: [ModelKind; 3] = [ModelKind::Gbdt, ModelKind::Lr, ModelKind::Rnn];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Gbdt => "gbdt",
            ModelKind::Lr => "lr",
            ModelKind::Rnn => "rnn",
        }
    }
}

impl FromStr for ModelKind {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "gbdt" => Ok(ModelKind::Gbdt),
            "lr" => Ok(ModelKind::Lr),
            "rnn" => Ok(ModelKind::Rnn),
            other => Err(BenchError::InvalidParameter {
                name: "model".to_string(),
                value: other.to_string(),
                reason: "expected one of gbdt, lr, rnn".to_string(),
            }),
        }
    }
}

/// A fitted classifier of any family, scoring arbitrary row ranges of the
/// original feature matrix. The LSTM variant keeps its training scaler and
/// window length so it can read the context rows preceding a range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TrainedClassifier {
    Gbdt(GbdtClassifier),
    Logistic(LogisticRegression),
    Lstm {
        model: LstmClassifier,
        scaler: StandardScaler,
        length: usize,
    },
}

impl TrainedClassifier {
    pub fn kind(&self) -> ModelKind {
        match self {
            TrainedClassifier::Gbdt(_) => ModelKind::Gbdt,
            TrainedClassifier::Logistic(_) => ModelKind::Lr,
            TrainedClassifier::Lstm { .. } => ModelKind::Rnn,
        }
    }

    /// Positive-class scores for rows `start..end` of `x`. The recurrent
    /// variant reads up to `length - 1` rows before `start` for window
    /// context, so `start` must leave room for at least one full window.
    pub fn scores_range(&self, x: &Array2<f64>, start: usize, end: usize) -> Result<Array1<f64>> {
        if start >= end || end > x.nrows() {
            return Err(BenchError::InvalidParameter {
                name: "range".to_string(),
                value: format!("{start}..{end}"),
                reason: format!("must be a non-empty range within 0..{}", x.nrows()),
            });
        }
        match self {
            TrainedClassifier::Gbdt(model) => {
                model.predict_proba(&x.slice(s![start..end, ..]).to_owned())
            }
            TrainedClassifier::Logistic(model) => {
                model.predict_proba(&x.slice(s![start..end, ..]).to_owned())
            }
            TrainedClassifier::Lstm {
                model,
                scaler,
                length,
            } => {
                if start + 1 < *length {
                    return Err(BenchError::InvalidParameter {
                        name: "start".to_string(),
                        value: start.to_string(),
                        reason: format!("needs {} context rows before it", length - 1),
                    });
                }
                let context = x.slice(s![start + 1 - length..end, ..]).to_owned();
                let scaled = scaler.transform(&context)?;
                let dummy = Array1::zeros(scaled.nrows());
                let (windows, _) = sequence_windows(&scaled, &dummy, *length)?;
                model.predict_proba(&windows)
            }
        }
    }

    /// Sorted (name, importance) pairs for families that expose them.
    pub fn feature_importance(&self, feature_names: &[String]) -> Option<Vec<(String, f64)>> {
        match self {
            TrainedClassifier::Gbdt(model) => {
                let mut pairs: Vec<(String, f64)> = feature_names
                    .iter()
                    .cloned()
                    .zip(model.feature_importances().iter().copied())
                    .collect();
                pairs.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
                Some(pairs)
            }
            TrainedClassifier::Logistic(_) | TrainedClassifier::Lstm { .. } => None,
        }
    }

    /// Persist the fitted model as JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        serde_json::to_writer(BufWriter::new(file), self)?;
        Ok(())
    }

    /// Load a previously saved model.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let model = serde_json::from_reader(std::io::BufReader::new(file))?;
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_kind_round_trip() {
        for kind in ModelKind::ALL {
            assert_eq!(kind.as_str().parse::<ModelKind>().unwrap(), kind);
        }
        assert!("mlp".parse::<ModelKind>().is_err());
    }

    #[test]
    fn test_trained_classifier_scores_range() {
        let x = Array2::from_shape_fn((30, 2), |(i, j)| (i + j) as f64 / 30.0);
        let y = x.column(0).mapv(|v| if v > 0.5 { 1.0 } else { 0.0 });

        let mut model = GbdtClassifier::new(GbdtConfig::default().with_n_rounds(5));
        model.fit(&x, &y).unwrap();
        let clf = TrainedClassifier::Gbdt(model);

        let scores = clf.scores_range(&x, 20, 30).unwrap();
        assert_eq!(scores.len(), 10);
        assert!(clf.scores_range(&x, 20, 20).is_err());
        assert!(clf.scores_range(&x, 20, 31).is_err());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let x = Array2::from_shape_fn((20, 2), |(i, _)| i as f64);
        let y = x.column(0).mapv(|v| if v > 10.0 { 1.0 } else { 0.0 });
        let mut model = LogisticRegression::new();
        model.fit(&x, &y).unwrap();
        let clf = TrainedClassifier::Logistic(model);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models").join("clf.json");
        clf.save(&path).unwrap();

        let loaded = TrainedClassifier::load(&path).unwrap();
        assert_eq!(loaded.kind(), ModelKind::Lr);
        let a = clf.scores_range(&x, 10, 20).unwrap();
        let b = loaded.scores_range(&x, 10, 20).unwrap();
        for (va, vb) in a.iter().zip(b.iter()) {
            assert!((va - vb).abs() < 1e-12);
        }
    }
}
