//! Integration tests: experiment runners end-to-end on synthetic data

use ndarray::Array1;
use polars::prelude::*;

use alphabench::data::Dataset;
use alphabench::experiments::{
    run_all, run_classification, run_regression, run_sequential, ExperimentConfig,
};
use alphabench::models::TrainedClassifier;

/// Deterministic two-label dataset whose forward returns carry a signal
/// from the first feature.
fn synthetic_dataset(n: usize) -> Dataset {
    let f1: Vec<f64> = (0..n).map(|i| (i as f64 * 0.37).sin()).collect();
    let f2: Vec<f64> = (0..n).map(|i| (i as f64 * 0.11).cos()).collect();
    let f3: Vec<f64> = (0..n)
        .map(|i| ((i * 7919) % 97) as f64 / 97.0 - 0.5)
        .collect();

    let r1: Vec<f64> = (0..n).map(|i| 0.6 * f1[i] + 0.1 * f3[i]).collect();
    let r5: Vec<f64> = (0..n).map(|i| 0.4 * f1[i] - 0.2 * f2[i]).collect();

    let df = df!(
        "mom" => &f1,
        "rev" => &f2,
        "vol" => &f3,
        "r1" => &r1,
        "r5" => &r5
    )
    .unwrap();
    Dataset::from_dataframe("syn", &df, 2).unwrap()
}

fn quick_config(out_dir: std::path::PathBuf, test_size: usize) -> ExperimentConfig {
    ExperimentConfig {
        out_dir,
        test_size,
        cv_folds: 3,
        early_stopping_rounds: 3,
        gbdt_rounds: 8,
        rnn_length: 6,
        rnn_batch_size: 16,
        rnn_max_epochs: 3,
        seed: 42,
        production: false,
    }
}

#[test]
fn test_regression_report_covers_every_label_and_model() {
    let dataset = synthetic_dataset(120);
    let dir = tempfile::tempdir().unwrap();
    let config = quick_config(dir.path().to_path_buf(), 25);

    let path = run_regression(&dataset, &config).unwrap();
    assert!(path.ends_with("exp/syn_regression.csv"));

    let content = std::fs::read_to_string(&path).unwrap();
    let mut lines = content.lines();
    assert_eq!(
        lines.next().unwrap(),
        "label,n_train,n_test,model,train_loss,feature_importance,rmse"
    );
    // 2 labels x 3 models
    assert_eq!(content.lines().count(), 1 + 6);
    for model in ["gbdt", "lr", "rnn"] {
        assert!(content.contains(model), "missing rows for {model}");
    }
}

#[test]
fn test_regression_rmse_values_are_sane() {
    let dataset = synthetic_dataset(120);
    let dir = tempfile::tempdir().unwrap();
    let config = quick_config(dir.path().to_path_buf(), 25);

    let path = run_regression(&dataset, &config).unwrap();
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path))
        .unwrap()
        .finish()
        .unwrap();

    let rmse = df.column("rmse").unwrap().as_materialized_series().f64().unwrap();
    for v in rmse.into_no_null_iter() {
        assert!(v.is_finite());
        assert!(v >= 0.0);
    }
    let n_train = df.column("n_train").unwrap().as_materialized_series().i64().unwrap();
    for v in n_train.into_no_null_iter() {
        assert_eq!(v, 95);
    }
}

#[test]
fn test_classification_selects_a_best_model() {
    let dataset = synthetic_dataset(120);
    let dir = tempfile::tempdir().unwrap();
    let config = quick_config(dir.path().to_path_buf(), 25);

    let best = run_classification(&dataset, &config, 1).unwrap();
    assert!(["gbdt", "lr", "rnn"].contains(&best.model_name.as_str()));
    assert!((0.0..=1.0).contains(&best.auc));
    assert!(best.model_path.is_none());

    let report = dir.path().join("exp").join("syn_r5_classification.csv");
    let content = std::fs::read_to_string(&report).unwrap();
    assert_eq!(content.lines().count(), 1 + 3);
    assert!(content
        .lines()
        .next()
        .unwrap()
        .starts_with("asset,label,label_index,n_train,n_train_pos"));
}

#[test]
fn test_classification_production_persists_the_winner() {
    let dataset = synthetic_dataset(120);
    let dir = tempfile::tempdir().unwrap();
    let mut config = quick_config(dir.path().to_path_buf(), 25);
    config.production = true;

    let best = run_classification(&dataset, &config, 1).unwrap();
    let model_path = best.model_path.expect("production run should save a model");
    assert!(model_path.exists());

    // Saved model reloads and scores the test span
    let loaded = TrainedClassifier::load(&model_path).unwrap();
    let scores = loaded
        .scores_range(dataset.features(), 95, dataset.n_rows())
        .unwrap();
    assert_eq!(scores.len(), 25);

    let curve = dir.path().join("report").join("syn_r5_pr_curve.csv");
    assert!(curve.exists());
    let report = dir.path().join("report").join("syn_r5_classification.csv");
    assert!(report.exists());
}

#[test]
fn test_classification_rejects_label_out_of_range() {
    let dataset = synthetic_dataset(120);
    let dir = tempfile::tempdir().unwrap();
    let config = quick_config(dir.path().to_path_buf(), 25);
    assert!(run_classification(&dataset, &config, 3).is_err());
}

#[test]
fn test_sequential_report_covers_the_grid() {
    let dataset = synthetic_dataset(120);
    let dir = tempfile::tempdir().unwrap();
    let config = quick_config(dir.path().to_path_buf(), 25);

    let path = run_sequential(&dataset, &config).unwrap();
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path))
        .unwrap()
        .finish()
        .unwrap();

    // 2 labels x 4 decay ratios x 7 batch sizes
    assert_eq!(df.height(), 56);

    let auc = df.column("auc").unwrap().as_materialized_series().f64().unwrap();
    for v in auc.into_no_null_iter() {
        assert!((0.0..=1.0).contains(&v));
    }
    let f1 = df.column("f1").unwrap().as_materialized_series().f64().unwrap();
    for v in f1.into_no_null_iter() {
        assert!((0.0..=1.0).contains(&v));
    }
}

#[test]
fn test_run_all_writes_every_report() {
    let dataset = synthetic_dataset(90);
    let dir = tempfile::tempdir().unwrap();
    let config = quick_config(dir.path().to_path_buf(), 15);

    run_all(&dataset, &config).unwrap();

    let exp = dir.path().join("exp");
    assert!(exp.join("syn_regression.csv").exists());
    assert!(exp.join("syn_r5_classification.csv").exists());
    assert!(exp.join("syn_sequential.csv").exists());
}

#[test]
fn test_same_seed_reproduces_the_regression_report() {
    let dataset = synthetic_dataset(100);
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let config_a = quick_config(dir_a.path().to_path_buf(), 20);
    let config_b = quick_config(dir_b.path().to_path_buf(), 20);

    let path_a = run_regression(&dataset, &config_a).unwrap();
    let path_b = run_regression(&dataset, &config_b).unwrap();

    let content_a = std::fs::read_to_string(path_a).unwrap();
    let content_b = std::fs::read_to_string(path_b).unwrap();
    assert_eq!(content_a, content_b);
}

#[test]
fn test_decay_weights_change_walk_forward_scores() {
    // Flat decay (1.0) and steep decay should produce different grids;
    // spot-check through the public runner on a drifting dataset.
    let n = 100;
    let drift: Vec<f64> = (0..n)
        .map(|i| if i < 50 { (i as f64 * 0.4).sin() } else { -(i as f64 * 0.4).sin() })
        .collect();
    let noise: Vec<f64> = (0..n).map(|i| ((i * 31) % 17) as f64 / 17.0 - 0.5).collect();
    let r1: Vec<f64> = (0..n).map(|i| drift[i] + 0.05 * noise[i]).collect();
    let df = df!("sig" => &drift, "noi" => &noise, "r1" => &r1).unwrap();
    let dataset = Dataset::from_dataframe("drift", &df, 1).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let config = quick_config(dir.path().to_path_buf(), 20);
    let path = run_sequential(&dataset, &config).unwrap();

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path))
        .unwrap()
        .finish()
        .unwrap();
    assert_eq!(df.height(), 28);

    let accuracy = df.column("accuracy").unwrap().as_materialized_series().f64().unwrap();
    let values: Vec<f64> = accuracy.into_no_null_iter().collect();
    assert!(values.iter().all(|v| (0.0..=1.0).contains(v)));
}

#[test]
fn test_missing_values_fail_loading() {
    let df = df!(
        "f" => &[Some(1.0), None, Some(3.0)],
        "r" => &[Some(0.1), Some(0.2), Some(0.3)]
    )
    .unwrap();
    assert!(Dataset::from_dataframe("bad", &df, 1).is_err());
}

#[test]
fn test_sequence_alignment_matches_row_split() {
    // The last `test_size` windows of the full series end exactly on the
    // last `test_size` rows, so windowed targets equal the row targets.
    let dataset = synthetic_dataset(60);
    let y = dataset.regression_targets(1).unwrap();
    let (_, targets) =
        alphabench::data::sequence_windows(dataset.features(), &y, 6).unwrap();

    let tail_rows: Array1<f64> = y.slice(ndarray::s![60 - 10..]).to_owned();
    let tail_windows: Array1<f64> = targets.slice(ndarray::s![targets.len() - 10..]).to_owned();
    assert_eq!(tail_rows.to_vec(), tail_windows.to_vec());
}
