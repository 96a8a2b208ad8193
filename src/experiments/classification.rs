//! Binarized-return classification experiment
//!
//! One label horizon per run. Each model family is fit on the training
//! rows, its decision threshold searched on the chronological training
//! tail, and its scores evaluated on the test rows. The best row by AUC
//! is returned; in production mode the winning model is persisted along
//! with its precision-recall curve.

use ndarray::s;
use tracing::info;

use crate::data::{sequence_windows, Dataset, SplitSpec};
use crate::error::{BenchError, Result};
use crate::metrics;
use crate::models::{
    GbdtClassifier, GbdtConfig, LogisticRegression, LstmClassifier, LstmConfig, ModelKind,
    TrainedClassifier,
};
use crate::preprocessing::StandardScaler;
use crate::report::{self, format_importance, Cell, Report};
use crate::tuning::{cv_best_round, search_threshold, Task};

use super::ExperimentConfig;

const FIELDS: [&str; 16] = [
    "asset",
    "label",
    "label_index",
    "n_train",
    "n_train_pos",
    "n_test",
    "n_test_pos",
    "model_name",
    "train_loss",
    "feature_importance",
    "auc",
    "accuracy",
    "precision",
    "recall",
    "f1",
    "threshold",
];

/// The report row selected by AUC, with the persisted model path when
/// running in production mode.
#[derive(Debug, Clone)]
pub struct BestModel {
    pub model_name: String,
    pub auc: f64,
    pub threshold: f64,
    pub model_path: Option<std::path::PathBuf>,
}

/// Run the classification experiment for one label horizon (1-based from
/// the trailing end) and write its CSV report.
pub fn run_classification(
    dataset: &Dataset,
    config: &ExperimentConfig,
    label_idx: usize,
) -> Result<BestModel> {
    let x = dataset.features();
    let n = dataset.n_rows();
    let n_train = SplitSpec::Rows(config.test_size).train_rows(n)?;
    let label_name = dataset.label_name(label_idx)?.to_string();
    let y = dataset.classification_targets(label_idx)?;

    let valid_size = config.test_size;
    if n_train <= valid_size {
        return Err(BenchError::Validation(format!(
            "threshold search needs more than {valid_size} training rows, got {n_train}"
        )));
    }

    let y_train = y.slice(s![..n_train]).to_owned();
    let y_test = y.slice(s![n_train..]).to_owned();
    let n_train_pos = y_train.sum() as i64;
    let n_test_pos = y_test.sum() as i64;

    let mut report = Report::new(&FIELDS);
    let mut fitted: Vec<(TrainedClassifier, f64, f64)> = Vec::new();

    for kind in ModelKind::ALL {
        info!(label = %label_name, model = kind.as_str(), "fitting classifier");
        let (clf, train_loss) = fit_classifier(kind, dataset, &y, n_train, config)?;

        let tail_start = n_train - valid_size;
        let tail_scores = clf.scores_range(x, tail_start, n_train)?;
        let tail_targets = y.slice(s![tail_start..n_train]).to_owned();
        let threshold = search_threshold(&tail_targets, &tail_scores)?;

        let scores = clf.scores_range(x, n_train, n)?;
        let predictions = scores.mapv(|s| if s > threshold { 1.0 } else { 0.0 });

        let auc = metrics::roc_auc(&y_test, &scores)?;
        let accuracy = metrics::accuracy(&y_test, &predictions)?;
        let precision = metrics::precision(&y_test, &predictions)?;
        let recall = metrics::recall(&y_test, &predictions)?;
        let f1 = metrics::f1_score(&y_test, &predictions)?;

        info!(
            label = %label_name,
            model = kind.as_str(),
            auc,
            accuracy,
            threshold,
            "classifier evaluated"
        );

        let importance = clf
            .feature_importance(dataset.feature_names())
            .map(|pairs| format_importance(&pairs));

        report.push_row(vec![
            dataset.asset().into(),
            label_name.clone().into(),
            (label_idx as i64).into(),
            n_train.into(),
            n_train_pos.into(),
            (n - n_train).into(),
            n_test_pos.into(),
            kind.as_str().into(),
            train_loss.into(),
            Cell::OptStr(importance),
            auc.into(),
            accuracy.into(),
            precision.into(),
            recall.into(),
            f1.into(),
            threshold.into(),
        ])?;
        fitted.push((clf, auc, threshold));
    }

    let path =
        report::classification_path(&config.out_dir, config.mode(), dataset.asset(), &label_name);
    report.write_csv(&path)?;

    // Selection by AUC
    let (best_idx, _) = fitted
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .ok_or_else(|| BenchError::Validation("no classifier was fit".to_string()))?;
    let (best_clf, best_auc, best_threshold) = &fitted[best_idx];

    let model_path = if config.production {
        let model_file = report::model_path(
            &config.out_dir,
            dataset.asset(),
            &label_name,
            best_clf.kind().as_str(),
        );
        best_clf.save(&model_file)?;

        let scores = best_clf.scores_range(x, n_train, n)?;
        let curve = metrics::precision_recall_curve(&y_test, &scores)?;
        let curve_path = report::pr_curve_path(&config.out_dir, dataset.asset(), &label_name);
        report::write_pr_curve(&curve_path, &curve)?;

        info!(model = %model_file.display(), "production model persisted");
        Some(model_file)
    } else {
        None
    };

    Ok(BestModel {
        model_name: best_clf.kind().as_str().to_string(),
        auc: *best_auc,
        threshold: *best_threshold,
        model_path,
    })
}

fn fit_classifier(
    kind: ModelKind,
    dataset: &Dataset,
    y: &ndarray::Array1<f64>,
    n_train: usize,
    config: &ExperimentConfig,
) -> Result<(TrainedClassifier, f64)> {
    let x = dataset.features();
    let x_train = x.slice(s![..n_train, ..]).to_owned();
    let y_train = y.slice(s![..n_train]).to_owned();

    match kind {
        ModelKind::Gbdt => {
            let base = GbdtConfig::default()
                .with_n_rounds(config.gbdt_rounds)
                .with_random_state(config.seed);
            let outcome = cv_best_round(
                &base,
                Task::Classification,
                &x_train,
                &y_train,
                None,
                config.cv_folds,
                config.early_stopping_rounds,
            )?;
            let mut model = GbdtClassifier::new(base.with_n_rounds(outcome.best_round));
            model.fit(&x_train, &y_train)?;

            let train_probs = model.predict_proba(&x_train)?;
            let train_loss = metrics::log_loss(&y_train, &train_probs)?;
            Ok((TrainedClassifier::Gbdt(model), train_loss))
        }
        ModelKind::Lr => {
            let mut model = LogisticRegression::new();
            model.fit(&x_train, &y_train)?;

            let train_probs = model.predict_proba(&x_train)?;
            let train_loss = metrics::log_loss(&y_train, &train_probs)?;
            Ok((TrainedClassifier::Logistic(model), train_loss))
        }
        ModelKind::Rnn => {
            let mut scaler = StandardScaler::new();
            scaler.fit(&x_train)?;
            let scaled_train = scaler.transform(&x_train)?;
            let (windows, targets) = sequence_windows(&scaled_train, &y_train, config.rnn_length)?;

            let lstm_config = LstmConfig::default()
                .with_max_epochs(config.rnn_max_epochs)
                .with_batch_size(config.rnn_batch_size)
                .with_random_state(config.seed);
            let mut model = LstmClassifier::new(lstm_config);
            model.fit(&windows, &targets)?;
            let train_loss = model.train_loss();

            Ok((
                TrainedClassifier::Lstm {
                    model,
                    scaler,
                    length: config.rnn_length,
                },
                train_loss,
            ))
        }
    }
}
