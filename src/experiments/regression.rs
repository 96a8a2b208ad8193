//! Forward-return regression experiment
//!
//! For every label horizon and every model family: chronological split,
//! fit, test RMSE, one report row. The boosted model selects its depth,
//! child weight, and round count by cross-validation on the training
//! rows; the recurrent model standardizes with training statistics and
//! re-splits after windowing, which keeps its test rows identical to the
//! other families.

use std::path::PathBuf;

use ndarray::{s, Array1};
use tracing::info;

use crate::data::{sequence_windows, Dataset, SplitSpec};
use crate::error::Result;
use crate::metrics;
use crate::models::{
    GbdtConfig, GbdtRegressor, LinearRegression, LstmConfig, LstmRegressor, ModelKind,
};
use crate::preprocessing::StandardScaler;
use crate::report::{self, format_importance, Cell, Report};
use crate::tuning::{param_selection, Task};

use super::ExperimentConfig;

const FIELDS: [&str; 7] = [
    "label",
    "n_train",
    "n_test",
    "model",
    "train_loss",
    "feature_importance",
    "rmse",
];

/// Run the regression experiment and write its CSV report.
pub fn run_regression(dataset: &Dataset, config: &ExperimentConfig) -> Result<PathBuf> {
    let x = dataset.features();
    let n = dataset.n_rows();
    let n_train = SplitSpec::Rows(config.test_size).train_rows(n)?;
    let n_test = n - n_train;

    let mut report = Report::new(&FIELDS);

    for label_idx in 1..=dataset.n_labels() {
        let label_name = dataset.label_name(label_idx)?.to_string();
        let y = dataset.regression_targets(label_idx)?;

        let x_train = x.slice(s![..n_train, ..]).to_owned();
        let y_train = y.slice(s![..n_train]).to_owned();
        let x_test = x.slice(s![n_train.., ..]).to_owned();
        let y_test = y.slice(s![n_train..]).to_owned();

        for kind in ModelKind::ALL {
            info!(label = %label_name, model = kind.as_str(), "fitting regression model");

            let outcome = match kind {
                ModelKind::Gbdt => {
                    let base = GbdtConfig::default()
                        .with_n_rounds(config.gbdt_rounds)
                        .with_random_state(config.seed);
                    let (selected, _) = param_selection(
                        &base,
                        Task::Regression,
                        &x_train,
                        &y_train,
                        None,
                        config.cv_folds,
                        config.early_stopping_rounds,
                    )?;
                    let mut model = GbdtRegressor::new(selected);
                    model.fit(&x_train, &y_train)?;

                    let train_pred = model.predict(&x_train)?;
                    let train_loss = metrics::rmse(&y_train, &train_pred)?;

                    let mut pairs: Vec<(String, f64)> = dataset
                        .feature_names()
                        .iter()
                        .cloned()
                        .zip(model.feature_importances().iter().copied())
                        .collect();
                    pairs.sort_by(|a, b| {
                        b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal)
                    });

                    FitOutcome {
                        train_loss,
                        feature_importance: Some(format_importance(&pairs)),
                        predictions: model.predict(&x_test)?,
                        targets: y_test.clone(),
                    }
                }
                ModelKind::Lr => {
                    let mut model = LinearRegression::new();
                    model.fit(&x_train, &y_train)?;

                    let train_pred = model.predict(&x_train)?;
                    FitOutcome {
                        train_loss: metrics::rmse(&y_train, &train_pred)?,
                        feature_importance: None,
                        predictions: model.predict(&x_test)?,
                        targets: y_test.clone(),
                    }
                }
                ModelKind::Rnn => {
                    // Standardize with training statistics, window the full
                    // series, then re-split. The window targets trail the
                    // rows by length - 1, so the last test_size windows end
                    // on exactly the test rows.
                    let mut scaler = StandardScaler::new();
                    scaler.fit(&x_train)?;
                    let x_scaled = scaler.transform(x)?;
                    let (windows, targets) = sequence_windows(&x_scaled, &y, config.rnn_length)?;

                    let w_train = SplitSpec::Rows(config.test_size).train_rows(windows.len())?;
                    let train_windows = &windows[..w_train];
                    let train_targets = targets.slice(s![..w_train]).to_owned();
                    let test_windows = &windows[w_train..];
                    let test_targets = targets.slice(s![w_train..]).to_owned();

                    let lstm_config = LstmConfig::default()
                        .with_max_epochs(config.rnn_max_epochs)
                        .with_batch_size(config.rnn_batch_size)
                        .with_random_state(config.seed);
                    let mut model = LstmRegressor::new(lstm_config);
                    model.fit(train_windows, &train_targets)?;

                    FitOutcome {
                        train_loss: model.train_loss(),
                        feature_importance: None,
                        predictions: model.predict(test_windows)?,
                        targets: test_targets,
                    }
                }
            };

            let rmse = metrics::rmse(&outcome.targets, &outcome.predictions)?;
            info!(
                label = %label_name,
                model = kind.as_str(),
                train_loss = outcome.train_loss,
                rmse,
                "regression model evaluated"
            );

            report.push_row(vec![
                label_name.clone().into(),
                n_train.into(),
                n_test.into(),
                kind.as_str().into(),
                outcome.train_loss.into(),
                Cell::OptStr(outcome.feature_importance),
                rmse.into(),
            ])?;
        }
    }

    let path = report::regression_path(&config.out_dir, config.mode(), dataset.asset());
    report.write_csv(&path)?;
    Ok(path)
}

struct FitOutcome {
    train_loss: f64,
    feature_importance: Option<String>,
    predictions: Array1<f64>,
    targets: Array1<f64>,
}
