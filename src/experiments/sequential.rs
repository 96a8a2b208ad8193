//! Walk-forward batch simulation
//!
//! For every label horizon and every (decay ratio, batch size) grid point,
//! the test span is predicted in batches: before each batch a boosted
//! classifier is retrained on every earlier row with time-decay sample
//! weights and a cross-validated round count, then scores the batch.
//! Metrics are computed once over the concatenated test span.

use std::path::PathBuf;

use ndarray::{s, Array1};
use tracing::info;

use crate::data::{decay_weights, Dataset, SplitSpec};
use crate::error::Result;
use crate::metrics;
use crate::models::{GbdtClassifier, GbdtConfig};
use crate::report::{self, Report};
use crate::tuning::{cv_best_round, Task};

use super::ExperimentConfig;

const FIELDS: [&str; 10] = [
    "label",
    "n_train",
    "n_test",
    "decay_ratio",
    "n_batch_prediction",
    "auc",
    "accuracy",
    "precision",
    "recall",
    "f1",
];

const DECAY_RATIOS: [f64; 4] = [0.99, 0.995, 0.997, 1.0];
const BATCH_SIZES: [usize; 7] = [5, 10, 20, 60, 120, 240, 480];

/// Run the walk-forward sweep and write its CSV report.
pub fn run_sequential(dataset: &Dataset, config: &ExperimentConfig) -> Result<PathBuf> {
    let x = dataset.features();
    let n = dataset.n_rows();
    let n_train = SplitSpec::Rows(config.test_size).train_rows(n)?;
    let n_test = n - n_train;

    let mut report = Report::new(&FIELDS);

    for label_idx in 1..=dataset.n_labels() {
        let label_name = dataset.label_name(label_idx)?.to_string();
        let y = dataset.classification_targets(label_idx)?;
        let y_test = y.slice(s![n_train..]).to_owned();

        for decay_ratio in DECAY_RATIOS {
            for batch_size in BATCH_SIZES {
                info!(
                    label = %label_name,
                    decay_ratio,
                    batch_size,
                    "walk-forward grid point"
                );

                let scores = walk_forward(x, &y, n_train, decay_ratio, batch_size, config)?;
                let predictions = scores.mapv(|p| if p > 0.5 { 1.0 } else { 0.0 });

                let auc = metrics::roc_auc(&y_test, &scores)?;
                let accuracy = metrics::accuracy(&y_test, &predictions)?;
                let precision = metrics::precision(&y_test, &predictions)?;
                let recall = metrics::recall(&y_test, &predictions)?;
                let f1 = metrics::f1_score(&y_test, &predictions)?;

                report.push_row(vec![
                    label_name.clone().into(),
                    n_train.into(),
                    n_test.into(),
                    decay_ratio.into(),
                    batch_size.into(),
                    auc.into(),
                    accuracy.into(),
                    precision.into(),
                    recall.into(),
                    f1.into(),
                ])?;
            }
        }
    }

    let path = report::sequential_path(&config.out_dir, config.mode(), dataset.asset());
    report.write_csv(&path)?;
    Ok(path)
}

/// Score the test span batch by batch, retraining before each batch on all
/// earlier rows with decay weights.
fn walk_forward(
    x: &ndarray::Array2<f64>,
    y: &Array1<f64>,
    n_train: usize,
    decay_ratio: f64,
    batch_size: usize,
    config: &ExperimentConfig,
) -> Result<Array1<f64>> {
    let n = x.nrows();
    let n_test = n - n_train;
    let n_batches = n_test.div_ceil(batch_size);

    let mut scores = Vec::with_capacity(n_test);
    for batch in 0..n_batches {
        info!(batch = batch + 1, n_batches, "predicting batch");

        let train_end = n_train + batch_size * batch;
        let test_end = (train_end + batch_size).min(n);

        let x_train = x.slice(s![..train_end, ..]).to_owned();
        let y_train = y.slice(s![..train_end]).to_owned();
        let weights = decay_weights(train_end, decay_ratio);

        let base = GbdtConfig::default()
            .with_n_rounds(config.gbdt_rounds)
            .with_random_state(config.seed);
        let outcome = cv_best_round(
            &base,
            Task::Classification,
            &x_train,
            &y_train,
            Some(&weights),
            config.cv_folds,
            config.early_stopping_rounds,
        )?;

        let mut model = GbdtClassifier::new(base.with_n_rounds(outcome.best_round));
        model.fit_weighted(&x_train, &y_train, Some(&weights))?;

        let x_batch = x.slice(s![train_end..test_end, ..]).to_owned();
        scores.extend(model.predict_proba(&x_batch)?);
    }

    Ok(Array1::from_vec(scores))
}
