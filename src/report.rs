//! Tabular CSV performance reports
//!
//! A report is an ordered set of columns plus rows of loosely typed cells,
//! written as one CSV per asset/experiment under the output directory:
//! `exp/` for experiment runs, `report/` for production runs.

use std::fs::File;
use std::path::{Path, PathBuf};

use polars::prelude::*;
use tracing::info;

use crate::error::{BenchError, Result};
use crate::metrics::PrPoint;

/// Output subdirectory the reports land in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportMode {
    Experiment,
    Production,
}

impl ReportMode {
    fn dir(&self) -> &'static str {
        match self {
            ReportMode::Experiment => "exp",
            ReportMode::Production => "report",
        }
    }
}

pub fn regression_path(out: &Path, mode: ReportMode, asset: &str) -> PathBuf {
    out.join(mode.dir()).join(format!("{asset}_regression.csv"))
}

pub fn classification_path(out: &Path, mode: ReportMode, asset: &str, label: &str) -> PathBuf {
    out.join(mode.dir())
        .join(format!("{asset}_{label}_classification.csv"))
}

pub fn sequential_path(out: &Path, mode: ReportMode, asset: &str) -> PathBuf {
    out.join(mode.dir()).join(format!("{asset}_sequential.csv"))
}

pub fn pr_curve_path(out: &Path, asset: &str, label: &str) -> PathBuf {
    out.join(ReportMode::Production.dir())
        .join(format!("{asset}_{label}_pr_curve.csv"))
}

pub fn model_path(out: &Path, asset: &str, label: &str, model: &str) -> PathBuf {
    out.join("models")
        .join(format!("{asset}_{label}_{model}.json"))
}

/// One report cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Str(String),
    Int(i64),
    Float(f64),
    OptFloat(Option<f64>),
    OptStr(Option<String>),
}

impl From<&str> for Cell {
    fn from(v: &str) -> Self {
        Cell::Str(v.to_string())
    }
}

impl From<String> for Cell {
    fn from(v: String) -> Self {
        Cell::Str(v)
    }
}

impl From<i64> for Cell {
    fn from(v: i64) -> Self {
        Cell::Int(v)
    }
}

impl From<usize> for Cell {
    fn from(v: usize) -> Self {
        Cell::Int(v as i64)
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Cell::Float(v)
    }
}

impl From<Option<f64>> for Cell {
    fn from(v: Option<f64>) -> Self {
        Cell::OptFloat(v)
    }
}

impl From<Option<String>> for Cell {
    fn from(v: Option<String>) -> Self {
        Cell::OptStr(v)
    }
}

/// An in-memory report: fixed columns, appended rows.
#[derive(Debug, Clone)]
pub struct Report {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Report {
    pub fn new(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<Cell>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(BenchError::Report(format!(
                "row has {} cells, report has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Assemble a polars frame, one typed column per report column.
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let mut out: Vec<Column> = Vec::with_capacity(self.columns.len());
        for (j, name) in self.columns.iter().enumerate() {
            let cells: Vec<&Cell> = self.rows.iter().map(|r| &r[j]).collect();
            out.push(column_from_cells(name, &cells)?);
        }
        DataFrame::new(out).map_err(|e| BenchError::Report(e.to_string()))
    }

    /// Write the report as CSV, creating parent directories on demand.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut df = self.to_dataframe()?;
        let mut file = File::create(path)?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(&mut df)
            .map_err(|e| BenchError::Report(e.to_string()))?;
        info!(path = %path.display(), rows = self.rows.len(), "report written");
        Ok(())
    }
}

fn column_from_cells(name: &str, cells: &[&Cell]) -> Result<Column> {
    let has_float = cells
        .iter()
        .any(|c| matches!(c, Cell::Float(_) | Cell::OptFloat(_)));
    let has_int = cells.iter().any(|c| matches!(c, Cell::Int(_)));

    let column = if has_float {
        let values: Vec<Option<f64>> = cells
            .iter()
            .map(|c| match c {
                Cell::Float(v) => Ok(Some(*v)),
                Cell::OptFloat(v) => Ok(*v),
                Cell::Int(v) => Ok(Some(*v as f64)),
                other => Err(mixed_column(name, other)),
            })
            .collect::<Result<_>>()?;
        Column::new(name.into(), values)
    } else if has_int {
        let values: Vec<Option<i64>> = cells
            .iter()
            .map(|c| match c {
                Cell::Int(v) => Ok(Some(*v)),
                other => Err(mixed_column(name, other)),
            })
            .collect::<Result<_>>()?;
        Column::new(name.into(), values)
    } else {
        let values: Vec<Option<String>> = cells
            .iter()
            .map(|c| match c {
                Cell::Str(v) => Ok(Some(v.clone())),
                Cell::OptStr(v) => Ok(v.clone()),
                other => Err(mixed_column(name, other)),
            })
            .collect::<Result<_>>()?;
        Column::new(name.into(), values)
    };
    Ok(column)
}

fn mixed_column(name: &str, cell: &Cell) -> BenchError {
    BenchError::Report(format!("column {name} mixes incompatible cell types: {cell:?}"))
}

/// Render sorted feature importances as `name:score` pairs joined by `;`.
pub fn format_importance(pairs: &[(String, f64)]) -> String {
    pairs
        .iter()
        .map(|(name, score)| format!("{name}:{score:.4}"))
        .collect::<Vec<_>>()
        .join(";")
}

/// Write a precision-recall curve as its own CSV artifact.
pub fn write_pr_curve(path: &Path, curve: &[PrPoint]) -> Result<()> {
    let mut report = Report::new(&["threshold", "precision", "recall"]);
    for point in curve {
        report.push_row(vec![
            point.threshold.into(),
            point.precision.into(),
            point.recall.into(),
        ])?;
    }
    report.write_csv(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_round_trip_to_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exp").join("demo.csv");

        let mut report = Report::new(&["model", "n_train", "rmse", "feature_importance"]);
        report
            .push_row(vec![
                "gbdt".into(),
                800usize.into(),
                0.042.into(),
                Cell::OptStr(Some("f1:0.6000;f2:0.4000".to_string())),
            ])
            .unwrap();
        report
            .push_row(vec![
                "lr".into(),
                800usize.into(),
                0.051.into(),
                Cell::OptStr(None),
            ])
            .unwrap();

        report.write_csv(&path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next().unwrap(), "model,n_train,rmse,feature_importance");
        assert!(content.contains("gbdt,800,"));
        assert!(content.contains("f1:0.6000;f2:0.4000"));
        assert_eq!(content.lines().count(), 3);
    }

    #[test]
    fn test_row_arity_is_checked() {
        let mut report = Report::new(&["a", "b"]);
        assert!(report.push_row(vec![1i64.into()]).is_err());
    }

    #[test]
    fn test_int_promotes_to_float_in_mixed_column() {
        let mut report = Report::new(&["v"]);
        report.push_row(vec![1i64.into()]).unwrap();
        report.push_row(vec![0.5.into()]).unwrap();
        let df = report.to_dataframe().unwrap();
        assert_eq!(df.column("v").unwrap().dtype(), &DataType::Float64);
    }

    #[test]
    fn test_paths_follow_the_layout() {
        let out = Path::new("output");
        assert_eq!(
            regression_path(out, ReportMode::Experiment, "hsi3"),
            Path::new("output/exp/hsi3_regression.csv")
        );
        assert_eq!(
            classification_path(out, ReportMode::Production, "hsi3", "r5"),
            Path::new("output/report/hsi3_r5_classification.csv")
        );
        assert_eq!(
            sequential_path(out, ReportMode::Experiment, "hsi3"),
            Path::new("output/exp/hsi3_sequential.csv")
        );
        assert_eq!(
            model_path(out, "hsi3", "r5", "gbdt"),
            Path::new("output/models/hsi3_r5_gbdt.json")
        );
    }

    #[test]
    fn test_format_importance() {
        let pairs = vec![("a".to_string(), 0.75), ("b".to_string(), 0.25)];
        assert_eq!(format_importance(&pairs), "a:0.7500;b:0.2500");
    }
}
