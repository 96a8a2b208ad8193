//! alphabench - Offline forward-return model benchmark
//!
//! Runs offline experiments comparing regression and classification models
//! (gradient-boosted trees, linear models, a recurrent network) for
//! predicting forward returns of financial assets, across label horizons
//! and hyperparameter sweeps, and writes tabular CSV reports.
//!
//! # Modules
//!
//! - [`data`] - Dataset loading, chronological splits, sequence windows
//! - [`preprocessing`] - Standard scaling fit on training rows
//! - [`models`] - GBDT, linear, and LSTM model families
//! - [`tuning`] - Cross-validated round selection, parameter grids,
//!   threshold search
//! - [`metrics`] - RMSE, AUC, accuracy, precision, recall, F1, log loss
//! - [`experiments`] - The regression, classification, and walk-forward
//!   experiment runners
//! - [`report`] - CSV report assembly and output paths
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod data;
pub mod error;
pub mod experiments;
pub mod metrics;
pub mod models;
pub mod preprocessing;
pub mod report;
pub mod tuning;

pub use error::{BenchError, Result};
