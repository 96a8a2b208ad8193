use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::{Array1, Array2};

use alphabench::data::sequence_windows;
use alphabench::models::{GbdtConfig, GbdtRegressor, LstmConfig, LstmRegressor};

fn make_data(n_rows: usize, n_features: usize) -> (Array2<f64>, Array1<f64>) {
    let x = Array2::from_shape_fn((n_rows, n_features), |(i, j)| {
        ((i * 31 + j * 17) % 101) as f64 / 101.0
    });
    let y = x.column(0).mapv(|v| 2.0 * v) + x.column(n_features - 1).mapv(|v| -0.5 * v);
    (x, y)
}

fn bench_gbdt_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("gbdt_fit");
    for &n_rows in &[200usize, 1000] {
        let (x, y) = make_data(n_rows, 10);
        group.bench_with_input(BenchmarkId::from_parameter(n_rows), &n_rows, |b, _| {
            b.iter(|| {
                let mut model = GbdtRegressor::new(GbdtConfig::default().with_n_rounds(20));
                model.fit(black_box(&x), black_box(&y)).unwrap();
                model
            })
        });
    }
    group.finish();
}

fn bench_lstm_epoch(c: &mut Criterion) {
    let (x, y) = make_data(300, 10);
    let (windows, targets) = sequence_windows(&x, &y, 20).unwrap();
    let config = LstmConfig {
        max_epochs: 1,
        validation_split: 0.0,
        early_stopping_patience: 0,
        ..LstmConfig::default()
    };

    c.bench_function("lstm_single_epoch", |b| {
        b.iter(|| {
            let mut model = LstmRegressor::new(config.clone());
            model.fit(black_box(&windows), black_box(&targets)).unwrap();
            model
        })
    });
}

criterion_group!(benches, bench_gbdt_fit, bench_lstm_epoch);
criterion_main!(benches);
