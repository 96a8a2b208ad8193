//! Command-line interface
//!
//! One subcommand per experiment family plus `all` for the full suite.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing::info;

use crate::data::Dataset;
use crate::error::Result;
use crate::experiments::{
    run_all, run_classification, run_regression, run_sequential, ExperimentConfig,
};

#[derive(Parser)]
#[command(name = "alphabench")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Offline benchmark of forward-return prediction models")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Regression experiment: one row per (label, model)
    Regression {
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Classification experiment on one label horizon
    Classification {
        #[command(flatten)]
        common: CommonArgs,
        /// Label horizon, 1-based from the trailing column
        #[arg(long, default_value_t = 1)]
        label_index: usize,
        /// Persist the best model and its PR curve under report/
        #[arg(long)]
        production: bool,
    },
    /// Walk-forward sweep over decay ratios and batch sizes
    Sequential {
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Classification, regression, and the walk-forward sweep in sequence
    All {
        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args)]
pub struct CommonArgs {
    /// Directory containing `<asset>.csv`
    #[arg(long)]
    pub data: PathBuf,

    /// Asset name
    #[arg(long)]
    pub asset: String,

    /// Trailing label columns in the dataset
    #[arg(long, default_value_t = 3)]
    pub labels: usize,

    /// Chronological holdout, in rows
    #[arg(long, default_value_t = 200)]
    pub test_size: usize,

    /// Report output root
    #[arg(long, default_value = "output")]
    pub out: PathBuf,

    /// Seed for every seeded model
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

impl CommonArgs {
    fn load(&self) -> Result<Dataset> {
        info!(asset = %self.asset, data = %self.data.display(), "loading dataset");
        Dataset::load(&self.data, &self.asset, self.labels)
    }

    fn experiment_config(&self, production: bool) -> ExperimentConfig {
        ExperimentConfig {
            out_dir: self.out.clone(),
            test_size: self.test_size,
            seed: self.seed,
            production,
            ..ExperimentConfig::default()
        }
    }
}

pub fn cmd_regression(common: &CommonArgs) -> Result<()> {
    let dataset = common.load()?;
    let path = run_regression(&dataset, &common.experiment_config(false))?;
    info!(report = %path.display(), "regression experiment finished");
    Ok(())
}

pub fn cmd_classification(common: &CommonArgs, label_index: usize, production: bool) -> Result<()> {
    let dataset = common.load()?;
    let best = run_classification(&dataset, &common.experiment_config(production), label_index)?;
    info!(
        model = %best.model_name,
        auc = best.auc,
        threshold = best.threshold,
        "classification experiment finished"
    );
    Ok(())
}

pub fn cmd_sequential(common: &CommonArgs) -> Result<()> {
    let dataset = common.load()?;
    let path = run_sequential(&dataset, &common.experiment_config(false))?;
    info!(report = %path.display(), "walk-forward sweep finished");
    Ok(())
}

pub fn cmd_all(common: &CommonArgs) -> Result<()> {
    let dataset = common.load()?;
    run_all(&dataset, &common.experiment_config(false))
}
