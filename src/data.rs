//! Dataset loading and time-ordered splitting
//!
//! A dataset is one rectangular table per asset: time-ordered rows,
//! leading feature columns, trailing label columns (one per forward-return
//! horizon). Rows are never shuffled; every split here is position-based.

use std::fs::File;
use std::path::Path;

use ndarray::{Array1, Array2, s};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{BenchError, Result};

/// A loaded asset table: feature matrix plus forward-return label columns.
#[derive(Debug, Clone)]
pub struct Dataset {
    asset: String,
    feature_names: Vec<String>,
    label_names: Vec<String>,
    features: Array2<f64>,
    labels: Array2<f64>,
}

impl Dataset {
    /// Load `<dir>/<asset>.csv`, treating the trailing `n_labels` columns
    /// as forward-return labels and everything before them as features.
    pub fn load(dir: &Path, asset: &str, n_labels: usize) -> Result<Self> {
        let path = dir.join(format!("{asset}.csv"));
        let file = File::open(&path)
            .map_err(|e| BenchError::Data(format!("{}: {}", path.display(), e)))?;

        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(100))
            .into_reader_with_file_handle(file)
            .finish()?;

        Self::from_dataframe(asset, &df, n_labels)
    }

    /// Build a dataset from an already-loaded frame.
    pub fn from_dataframe(asset: &str, df: &DataFrame, n_labels: usize) -> Result<Self> {
        let n_cols = df.width();
        if n_labels == 0 || n_cols <= n_labels {
            return Err(BenchError::Data(format!(
                "expected more than {} columns for {} labels, got {}",
                n_labels, n_labels, n_cols
            )));
        }
        if df.height() == 0 {
            return Err(BenchError::Data(format!("dataset for {asset} is empty")));
        }

        let names: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();
        let feature_index = n_cols - n_labels;
        let feature_names = names[..feature_index].to_vec();
        let label_names = names[feature_index..].to_vec();

        let features = columns_to_matrix(df, &feature_names)?;
        let labels = columns_to_matrix(df, &label_names)?;

        Ok(Self {
            asset: asset.to_string(),
            feature_names,
            label_names,
            features,
            labels,
        })
    }

    pub fn asset(&self) -> &str {
        &self.asset
    }

    pub fn n_rows(&self) -> usize {
        self.features.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    pub fn n_labels(&self) -> usize {
        self.labels.ncols()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn features(&self) -> &Array2<f64> {
        &self.features
    }

    /// Name of the label `label_idx` positions from the trailing end (1-based).
    pub fn label_name(&self, label_idx: usize) -> Result<&str> {
        let col = self.label_column(label_idx)?;
        Ok(&self.label_names[col])
    }

    /// Raw forward-return column for horizon `label_idx` (1-based from the end).
    pub fn regression_targets(&self, label_idx: usize) -> Result<Array1<f64>> {
        let col = self.label_column(label_idx)?;
        Ok(self.labels.column(col).to_owned())
    }

    /// Forward-return column binarized: 1.0 where the return is positive.
    pub fn classification_targets(&self, label_idx: usize) -> Result<Array1<f64>> {
        let targets = self.regression_targets(label_idx)?;
        Ok(targets.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 }))
    }

    fn label_column(&self, label_idx: usize) -> Result<usize> {
        if label_idx == 0 || label_idx > self.labels.ncols() {
            return Err(BenchError::InvalidParameter {
                name: "label_idx".to_string(),
                value: label_idx.to_string(),
                reason: format!("must be in 1..={}", self.labels.ncols()),
            });
        }
        Ok(self.labels.ncols() - label_idx)
    }
}

fn columns_to_matrix(df: &DataFrame, names: &[String]) -> Result<Array2<f64>> {
    let n_rows = df.height();
    let mut matrix = Array2::zeros((n_rows, names.len()));
    for (j, name) in names.iter().enumerate() {
        let series = df
            .column(name.as_str())
            .map_err(|_| BenchError::FeatureNotFound(name.clone()))?
            .as_materialized_series()
            .cast(&DataType::Float64)
            .map_err(|_| BenchError::Data(format!("column {name} is not numeric")))?;
        let values = series
            .f64()
            .map_err(|e| BenchError::Data(e.to_string()))?;
        for (i, v) in values.into_iter().enumerate() {
            matrix[[i, j]] = v.ok_or_else(|| {
                BenchError::Data(format!("column {name} has a missing value at row {i}"))
            })?;
        }
    }
    Ok(matrix)
}

/// Holdout size: an absolute row count or a fraction of the table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum SplitSpec {
    Rows(usize),
    Fraction(f64),
}

impl SplitSpec {
    /// Resolve to the number of training rows for an `n_rows` table.
    /// The test span is always the chronological tail.
    pub fn train_rows(&self, n_rows: usize) -> Result<usize> {
        let n_test = match *self {
            SplitSpec::Rows(rows) => rows,
            SplitSpec::Fraction(f) => {
                if !(0.0..1.0).contains(&f) || f == 0.0 {
                    return Err(BenchError::InvalidParameter {
                        name: "test_size".to_string(),
                        value: f.to_string(),
                        reason: "fraction must be in (0, 1)".to_string(),
                    });
                }
                (n_rows as f64 * f).round() as usize
            }
        };
        if n_test == 0 || n_test >= n_rows {
            return Err(BenchError::InvalidParameter {
                name: "test_size".to_string(),
                value: n_test.to_string(),
                reason: format!("must leave both train and test rows out of {n_rows}"),
            });
        }
        Ok(n_rows - n_test)
    }
}

/// Sliding-window sequence dataset for the recurrent model: windows of
/// `length` consecutive rows, each labeled by the target of its final row.
pub fn sequence_windows(
    x: &Array2<f64>,
    y: &Array1<f64>,
    length: usize,
) -> Result<(Vec<Array2<f64>>, Array1<f64>)> {
    let n = x.nrows();
    if y.len() != n {
        return Err(BenchError::Shape {
            expected: format!("targets of length {n}"),
            actual: format!("length {}", y.len()),
        });
    }
    if length == 0 || length > n {
        return Err(BenchError::InvalidParameter {
            name: "length".to_string(),
            value: length.to_string(),
            reason: format!("must be in 1..={n}"),
        });
    }

    let n_windows = n - length + 1;
    let mut windows = Vec::with_capacity(n_windows);
    for i in 0..n_windows {
        windows.push(x.slice(s![i..i + length, ..]).to_owned());
    }
    let targets = y.slice(s![length - 1..]).to_owned();
    Ok((windows, targets))
}

/// Time-decay sample weights: `decay_ratio^age`, newest observation at 1.0.
pub fn decay_weights(n: usize, decay_ratio: f64) -> Array1<f64> {
    Array1::from_iter((0..n).map(|i| decay_ratio.powi((n - 1 - i) as i32)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_df() -> DataFrame {
        df!(
            "f1" => &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            "f2" => &[0.5, 0.4, 0.3, 0.2, 0.1, 0.0],
            "r1" => &[0.01, -0.02, 0.03, 0.0, 0.05, -0.01],
            "r5" => &[0.02, 0.01, -0.04, 0.06, -0.03, 0.02]
        )
        .unwrap()
    }

    #[test]
    fn test_from_dataframe_splits_columns() {
        let ds = Dataset::from_dataframe("tst", &sample_df(), 2).unwrap();
        assert_eq!(ds.n_rows(), 6);
        assert_eq!(ds.n_features(), 2);
        assert_eq!(ds.n_labels(), 2);
        assert_eq!(ds.feature_names(), &["f1".to_string(), "f2".to_string()]);
    }

    #[test]
    fn test_label_indexing_from_the_end() {
        let ds = Dataset::from_dataframe("tst", &sample_df(), 2).unwrap();
        assert_eq!(ds.label_name(1).unwrap(), "r5");
        assert_eq!(ds.label_name(2).unwrap(), "r1");
        let last = ds.regression_targets(1).unwrap();
        assert!((last[0] - 0.02).abs() < 1e-12);
        assert!(ds.label_name(3).is_err());
    }

    #[test]
    fn test_classification_targets_binarize_positive_returns() {
        let ds = Dataset::from_dataframe("tst", &sample_df(), 2).unwrap();
        let ys = ds.classification_targets(2).unwrap();
        assert_eq!(ys.to_vec(), vec![1.0, 0.0, 1.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_too_few_columns_is_an_error() {
        let df = df!("only" => &[1.0, 2.0]).unwrap();
        assert!(Dataset::from_dataframe("tst", &df, 1).is_err());
        assert!(Dataset::from_dataframe("tst", &sample_df(), 4).is_err());
    }

    #[test]
    fn test_split_spec_rows_and_fraction() {
        assert_eq!(SplitSpec::Rows(2).train_rows(6).unwrap(), 4);
        assert_eq!(SplitSpec::Fraction(1.0 / 3.0).train_rows(6).unwrap(), 4);
        assert!(SplitSpec::Rows(6).train_rows(6).is_err());
        assert!(SplitSpec::Rows(0).train_rows(6).is_err());
        assert!(SplitSpec::Fraction(1.5).train_rows(6).is_err());
    }

    #[test]
    fn test_sequence_windows_align_targets_to_window_end() {
        let x = Array2::from_shape_vec((5, 1), vec![1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        let y = Array1::from_vec(vec![10.0, 20.0, 30.0, 40.0, 50.0]);
        let (windows, targets) = sequence_windows(&x, &y, 3).unwrap();
        assert_eq!(windows.len(), 3);
        assert_eq!(targets.to_vec(), vec![30.0, 40.0, 50.0]);
        assert_eq!(windows[0].column(0).to_vec(), vec![1.0, 2.0, 3.0]);
        assert_eq!(windows[2].column(0).to_vec(), vec![3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_sequence_windows_rejects_oversized_length() {
        let x = Array2::zeros((3, 2));
        let y = Array1::zeros(3);
        assert!(sequence_windows(&x, &y, 4).is_err());
        assert!(sequence_windows(&x, &y, 0).is_err());
    }

    #[test]
    fn test_decay_weights_newest_is_one() {
        let w = decay_weights(4, 0.5);
        assert_eq!(w.to_vec(), vec![0.125, 0.25, 0.5, 1.0]);
        let flat = decay_weights(3, 1.0);
        assert_eq!(flat.to_vec(), vec![1.0, 1.0, 1.0]);
    }
}
