//! Experiment runners
//!
//! Three offline experiment families over one asset dataset, each looping
//! sequentially over labels, models, and parameter grids, fitting one
//! model per iteration and appending one report row:
//! - [`regression`]: forward-return regression per label horizon
//! - [`classification`]: binarized-return classification with threshold
//!   search and best-model selection
//! - [`sequential`]: walk-forward batch retraining with time-decay weights

pub mod classification;
pub mod regression;
pub mod sequential;

pub use classification::{run_classification, BestModel};
pub use regression::run_regression;
pub use sequential::run_sequential;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::data::Dataset;
use crate::error::Result;
use crate::report::ReportMode;

/// Shared experiment parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Report output root
    pub out_dir: PathBuf,
    /// Chronological holdout, in rows
    pub test_size: usize,
    /// Folds for boosting-round cross-validation
    pub cv_folds: usize,
    /// Patience on the mean CV metric, in rounds
    pub early_stopping_rounds: usize,
    /// Boosting round cap refined by cross-validation
    pub gbdt_rounds: usize,
    /// Sequence window length for the recurrent model
    pub rnn_length: usize,
    /// Mini-batch size for the recurrent model
    pub rnn_batch_size: usize,
    /// Epoch cap for the recurrent model
    pub rnn_max_epochs: usize,
    /// Seed for every seeded model
    pub seed: u64,
    /// Write reports under `report/` and persist the selected model
    pub production: bool,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("output"),
            test_size: 200,
            cv_folds: 5,
            early_stopping_rounds: 10,
            gbdt_rounds: 100,
            rnn_length: 20,
            rnn_batch_size: 128,
            rnn_max_epochs: 1000,
            seed: 42,
            production: false,
        }
    }
}

impl ExperimentConfig {
    pub fn mode(&self) -> ReportMode {
        if self.production {
            ReportMode::Production
        } else {
            ReportMode::Experiment
        }
    }
}

/// Run the full suite on one dataset: classification on the trailing
/// label, then regression and the walk-forward sweep over every label.
pub fn run_all(dataset: &Dataset, config: &ExperimentConfig) -> Result<()> {
    info!(asset = dataset.asset(), "running full experiment suite");
    run_classification(dataset, config, 1)?;
    run_regression(dataset, config)?;
    run_sequential(dataset, config)?;
    Ok(())
}
