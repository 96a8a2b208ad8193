//! Recurrent network (LSTM) implementation
//!
//! A single LSTM layer over fixed-length windows of standardized feature
//! rows, followed by a dense head: linear for regression, sigmoid for
//! binary classification. Trained with Adam and full backpropagation
//! through time. Fitting runs in two phases, as the experiments require:
//! an early-stopped pass against a chronological validation tail to find
//! the best epoch count, then a fresh re-fit on all windows for exactly
//! that many epochs.

use ndarray::{s, Array1, Array2, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use crate::error::{BenchError, Result};

/// LSTM training configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LstmConfig {
    /// Hidden state size
    pub hidden_size: usize,
    /// Adam learning rate
    pub learning_rate: f64,
    /// Maximum training epochs
    pub max_epochs: usize,
    /// Mini-batch size
    pub batch_size: usize,
    /// Chronological validation tail fraction for early stopping
    pub validation_split: f64,
    /// Early stopping patience in epochs
    pub early_stopping_patience: usize,
    /// Random seed
    pub random_state: Option<u64>,
}

impl Default for LstmConfig {
    fn default() -> Self {
        Self {
            hidden_size: 20,
            learning_rate: 5e-4,
            max_epochs: 1000,
            batch_size: 128,
            validation_split: 0.2,
            early_stopping_patience: 30,
            random_state: Some(42),
        }
    }
}

impl LstmConfig {
    pub fn with_hidden_size(mut self, hidden_size: usize) -> Self {
        self.hidden_size = hidden_size;
        self
    }

    pub fn with_max_epochs(mut self, max_epochs: usize) -> Self {
        self.max_epochs = max_epochs;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
enum OutputKind {
    Regression,
    Classification,
}

/// Gate-packed parameters. Weight rows are ordered i, f, g, o.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Params {
    w_x: Array2<f64>,
    w_h: Array2<f64>,
    b: Array1<f64>,
    w_out: Array1<f64>,
    b_out: f64,
}

impl Params {
    fn init(n_features: usize, hidden: usize, rng: &mut Xoshiro256PlusPlus) -> Self {
        let kx = 1.0 / (n_features as f64).sqrt();
        let kh = 1.0 / (hidden as f64).sqrt();
        let mut w_x = Array2::zeros((4 * hidden, n_features));
        let mut w_h = Array2::zeros((4 * hidden, hidden));
        w_x.mapv_inplace(|_| rng.gen_range(-kx..kx));
        w_h.mapv_inplace(|_| rng.gen_range(-kh..kh));
        let mut b = Array1::zeros(4 * hidden);
        // Forget gate bias starts open
        b.slice_mut(s![hidden..2 * hidden]).fill(1.0);
        let w_out = Array1::from_iter((0..hidden).map(|_| rng.gen_range(-kh..kh)));
        Self {
            w_x,
            w_h,
            b,
            w_out,
            b_out: 0.0,
        }
    }

    fn zeros_like(&self) -> Self {
        Self {
            w_x: Array2::zeros(self.w_x.raw_dim()),
            w_h: Array2::zeros(self.w_h.raw_dim()),
            b: Array1::zeros(self.b.len()),
            w_out: Array1::zeros(self.w_out.len()),
            b_out: 0.0,
        }
    }
}

/// Per-timestep forward cache for backpropagation through time.
struct StepCache {
    i: Array1<f64>,
    f: Array1<f64>,
    g: Array1<f64>,
    o: Array1<f64>,
    c_prev: Array1<f64>,
    h_prev: Array1<f64>,
    tanh_c: Array1<f64>,
}

/// Adam optimizer state, one slot per parameter tensor.
#[derive(Debug, Clone)]
struct Adam {
    m: Params,
    v: Params,
    step: u64,
    beta1: f64,
    beta2: f64,
    eps: f64,
}

impl Adam {
    fn new(template: &Params) -> Self {
        Self {
            m: template.zeros_like(),
            v: template.zeros_like(),
            step: 0,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
        }
    }

    fn update(&mut self, params: &mut Params, grads: &Params, lr: f64) {
        self.step += 1;
        let bc1 = 1.0 - self.beta1.powi(self.step as i32);
        let bc2 = 1.0 - self.beta2.powi(self.step as i32);
        let (beta1, beta2, eps) = (self.beta1, self.beta2, self.eps);

        adam_tensor(
            &mut params.w_x, &mut self.m.w_x, &mut self.v.w_x, &grads.w_x,
            lr, beta1, beta2, eps, bc1, bc2,
        );
        adam_tensor(
            &mut params.w_h, &mut self.m.w_h, &mut self.v.w_h, &grads.w_h,
            lr, beta1, beta2, eps, bc1, bc2,
        );
        adam_tensor(
            &mut params.b, &mut self.m.b, &mut self.v.b, &grads.b,
            lr, beta1, beta2, eps, bc1, bc2,
        );
        adam_tensor(
            &mut params.w_out, &mut self.m.w_out, &mut self.v.w_out, &grads.w_out,
            lr, beta1, beta2, eps, bc1, bc2,
        );

        self.m.b_out = beta1 * self.m.b_out + (1.0 - beta1) * grads.b_out;
        self.v.b_out = beta2 * self.v.b_out + (1.0 - beta2) * grads.b_out * grads.b_out;
        params.b_out -= lr * (self.m.b_out / bc1) / ((self.v.b_out / bc2).sqrt() + eps);
    }
}

/// One bias-corrected Adam step for a parameter tensor.
#[allow(clippy::too_many_arguments)]
fn adam_tensor<D: ndarray::Dimension>(
    p: &mut ndarray::Array<f64, D>,
    m: &mut ndarray::Array<f64, D>,
    v: &mut ndarray::Array<f64, D>,
    g: &ndarray::Array<f64, D>,
    lr: f64,
    beta1: f64,
    beta2: f64,
    eps: f64,
    bc1: f64,
    bc2: f64,
) {
    ndarray::Zip::from(p).and(m).and(v).and(g).for_each(|p, m, v, &g| {
        *m = beta1 * *m + (1.0 - beta1) * g;
        *v = beta2 * *v + (1.0 - beta2) * g * g;
        *p -= lr * (*m / bc1) / ((*v / bc2).sqrt() + eps);
    });
}

/// Shared LSTM core behind the regressor and classifier wrappers.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LstmCore {
    config: LstmConfig,
    output: OutputKind,
    params: Option<Params>,
    n_features: usize,
    best_epochs: usize,
    train_loss: f64,
}

impl LstmCore {
    fn new(config: LstmConfig, output: OutputKind) -> Self {
        Self {
            config,
            output,
            params: None,
            n_features: 0,
            best_epochs: 0,
            train_loss: f64::NAN,
        }
    }

    fn rng(&self) -> Xoshiro256PlusPlus {
        match self.config.random_state {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        }
    }

    fn validate_input(&self, windows: &[Array2<f64>], y: &Array1<f64>) -> Result<usize> {
        if windows.is_empty() {
            return Err(BenchError::Training(
                "cannot fit on zero sequence windows".to_string(),
            ));
        }
        if y.len() != windows.len() {
            return Err(BenchError::Shape {
                expected: format!("{} targets", windows.len()),
                actual: format!("{} targets", y.len()),
            });
        }
        let n_features = windows[0].ncols();
        let length = windows[0].nrows();
        for w in windows {
            if w.ncols() != n_features || w.nrows() != length {
                return Err(BenchError::Shape {
                    expected: format!("windows of shape ({length}, {n_features})"),
                    actual: format!("({}, {})", w.nrows(), w.ncols()),
                });
            }
        }
        Ok(n_features)
    }

    fn fit(&mut self, windows: &[Array2<f64>], y: &Array1<f64>) -> Result<()> {
        self.n_features = self.validate_input(windows, y)?;
        let n = windows.len();
        let n_val = (n as f64 * self.config.validation_split) as usize;

        let best_epochs = if n_val > 0 && n_val < n && self.config.early_stopping_patience > 0 {
            let n_train = n - n_val;
            let train_w = &windows[..n_train];
            let train_y = y.slice(s![..n_train]).to_owned();
            let val_w = &windows[n_train..];
            let val_y = y.slice(s![n_train..]).to_owned();
            self.early_stopped_epochs(train_w, &train_y, val_w, &val_y)?
        } else {
            self.config.max_epochs
        };

        // Fresh model trained on everything for the selected epoch count
        let mut rng = self.rng();
        let mut params = Params::init(self.n_features, self.config.hidden_size, &mut rng);
        let mut adam = Adam::new(&params);
        for _ in 0..best_epochs {
            self.run_epoch(&mut params, &mut adam, windows, y);
        }

        self.train_loss = self.mean_loss(&params, windows, y);
        self.best_epochs = best_epochs;
        self.params = Some(params);
        Ok(())
    }

    /// Phase one: early-stopped training against the validation tail.
    /// Returns the epoch count with the lowest validation loss.
    fn early_stopped_epochs(
        &self,
        train_w: &[Array2<f64>],
        train_y: &Array1<f64>,
        val_w: &[Array2<f64>],
        val_y: &Array1<f64>,
    ) -> Result<usize> {
        let mut rng = self.rng();
        let mut params = Params::init(self.n_features, self.config.hidden_size, &mut rng);
        let mut adam = Adam::new(&params);

        let mut best_loss = f64::INFINITY;
        let mut best_epochs = 1;
        let mut patience = 0;

        for epoch in 0..self.config.max_epochs {
            self.run_epoch(&mut params, &mut adam, train_w, train_y);
            let val_loss = self.mean_loss(&params, val_w, val_y);
            if val_loss < best_loss {
                best_loss = val_loss;
                best_epochs = epoch + 1;
                patience = 0;
            } else {
                patience += 1;
                if patience >= self.config.early_stopping_patience {
                    break;
                }
            }
        }
        Ok(best_epochs)
    }

    /// One pass over the windows in chronological order, mini-batched.
    fn run_epoch(
        &self,
        params: &mut Params,
        adam: &mut Adam,
        windows: &[Array2<f64>],
        y: &Array1<f64>,
    ) {
        let n = windows.len();
        for batch_start in (0..n).step_by(self.config.batch_size.max(1)) {
            let batch_end = (batch_start + self.config.batch_size.max(1)).min(n);
            let mut grads = params.zeros_like();
            let scale = 1.0 / (batch_end - batch_start) as f64;

            for idx in batch_start..batch_end {
                let (caches, h_last, y_lin) = self.forward(params, &windows[idx]);
                let dy = match self.output {
                    OutputKind::Regression => y_lin - y[idx],
                    OutputKind::Classification => sigmoid(y_lin) - y[idx],
                };
                self.backward(params, &windows[idx], &caches, &h_last, dy * scale, &mut grads);
            }

            adam.update(params, &grads, self.config.learning_rate);
        }
    }

    /// Forward pass over one window. Returns per-step caches, the final
    /// hidden state, and the linear output.
    fn forward(&self, params: &Params, window: &Array2<f64>) -> (Vec<StepCache>, Array1<f64>, f64) {
        let hidden = self.config.hidden_size;
        let mut h = Array1::zeros(hidden);
        let mut c = Array1::zeros(hidden);
        let mut caches = Vec::with_capacity(window.nrows());

        for t in 0..window.nrows() {
            let x_t = window.row(t);
            let z = params.w_x.dot(&x_t) + params.w_h.dot(&h) + &params.b;

            let i = z.slice(s![..hidden]).mapv(sigmoid);
            let f = z.slice(s![hidden..2 * hidden]).mapv(sigmoid);
            let g = z.slice(s![2 * hidden..3 * hidden]).mapv(f64::tanh);
            let o = z.slice(s![3 * hidden..]).mapv(sigmoid);

            let c_prev = c.clone();
            let h_prev = h.clone();
            c = &f * &c_prev + &i * &g;
            let tanh_c = c.mapv(f64::tanh);
            h = &o * &tanh_c;

            caches.push(StepCache {
                i,
                f,
                g,
                o,
                c_prev,
                h_prev,
                tanh_c,
            });
        }

        let y_lin = params.w_out.dot(&h) + params.b_out;
        (caches, h, y_lin)
    }

    /// Backpropagation through time for one window, accumulating into `grads`.
    fn backward(
        &self,
        params: &Params,
        window: &Array2<f64>,
        caches: &[StepCache],
        h_last: &Array1<f64>,
        dy: f64,
        grads: &mut Params,
    ) {
        let hidden = self.config.hidden_size;

        grads.w_out.scaled_add(dy, h_last);
        grads.b_out += dy;

        let mut dh: Array1<f64> = &params.w_out * dy;
        let mut dc: Array1<f64> = Array1::zeros(hidden);

        for t in (0..caches.len()).rev() {
            let cache = &caches[t];

            let d_o = &dh * &cache.tanh_c;
            dc = &dc + &(&dh * &cache.o * cache.tanh_c.mapv(|v| 1.0 - v * v));

            let d_i = &dc * &cache.g;
            let d_f = &dc * &cache.c_prev;
            let d_g = &dc * &cache.i;

            let mut dz = Array1::zeros(4 * hidden);
            dz.slice_mut(s![..hidden])
                .assign(&(&d_i * &cache.i * cache.i.mapv(|v| 1.0 - v)));
            dz.slice_mut(s![hidden..2 * hidden])
                .assign(&(&d_f * &cache.f * cache.f.mapv(|v| 1.0 - v)));
            dz.slice_mut(s![2 * hidden..3 * hidden])
                .assign(&(&d_g * cache.g.mapv(|v| 1.0 - v * v)));
            dz.slice_mut(s![3 * hidden..])
                .assign(&(&d_o * &cache.o * cache.o.mapv(|v| 1.0 - v)));

            let dz_col = dz.view().insert_axis(Axis(1));
            grads
                .w_x
                .scaled_add(1.0, &dz_col.dot(&window.row(t).insert_axis(Axis(0))));
            grads
                .w_h
                .scaled_add(1.0, &dz_col.dot(&cache.h_prev.view().insert_axis(Axis(0))));
            grads.b += &dz;

            dh = params.w_h.t().dot(&dz);
            dc = &dc * &cache.f;
        }
    }

    fn score_window(&self, params: &Params, window: &Array2<f64>) -> f64 {
        let (_, _, y_lin) = self.forward(params, window);
        match self.output {
            OutputKind::Regression => y_lin,
            OutputKind::Classification => sigmoid(y_lin),
        }
    }

    fn mean_loss(&self, params: &Params, windows: &[Array2<f64>], y: &Array1<f64>) -> f64 {
        let eps = 1e-15;
        let total: f64 = windows
            .iter()
            .zip(y.iter())
            .map(|(w, &target)| {
                let score = self.score_window(params, w);
                match self.output {
                    OutputKind::Regression => (score - target).powi(2),
                    OutputKind::Classification => {
                        let p = score.clamp(eps, 1.0 - eps);
                        -(target * p.ln() + (1.0 - target) * (1.0 - p).ln())
                    }
                }
            })
            .sum();
        total / windows.len() as f64
    }

    fn predict(&self, windows: &[Array2<f64>]) -> Result<Array1<f64>> {
        let params = self.params.as_ref().ok_or(BenchError::ModelNotFitted)?;
        for w in windows {
            if w.ncols() != self.n_features {
                return Err(BenchError::Shape {
                    expected: format!("{} features", self.n_features),
                    actual: format!("{} features", w.ncols()),
                });
            }
        }
        Ok(windows.iter().map(|w| self.score_window(params, w)).collect())
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// LSTM regressor (linear output head, squared-error loss)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LstmRegressor {
    core: LstmCore,
}

impl LstmRegressor {
    pub fn new(config: LstmConfig) -> Self {
        Self {
            core: LstmCore::new(config, OutputKind::Regression),
        }
    }

    pub fn fit(&mut self, windows: &[Array2<f64>], y: &Array1<f64>) -> Result<()> {
        self.core.fit(windows, y)
    }

    pub fn predict(&self, windows: &[Array2<f64>]) -> Result<Array1<f64>> {
        self.core.predict(windows)
    }

    /// Training MSE after the final re-fit.
    pub fn train_loss(&self) -> f64 {
        self.core.train_loss
    }

    /// Epoch count selected by early stopping.
    pub fn best_epochs(&self) -> usize {
        self.core.best_epochs
    }
}

/// LSTM classifier (sigmoid output head, cross-entropy loss)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LstmClassifier {
    core: LstmCore,
}

impl LstmClassifier {
    pub fn new(config: LstmConfig) -> Self {
        Self {
            core: LstmCore::new(config, OutputKind::Classification),
        }
    }

    pub fn fit(&mut self, windows: &[Array2<f64>], y: &Array1<f64>) -> Result<()> {
        self.core.fit(windows, y)
    }

    /// Positive-class probabilities per window.
    pub fn predict_proba(&self, windows: &[Array2<f64>]) -> Result<Array1<f64>> {
        self.core.predict(windows)
    }

    /// Class labels at the 0.5 probability cut.
    pub fn predict(&self, windows: &[Array2<f64>]) -> Result<Array1<f64>> {
        let probs = self.core.predict(windows)?;
        Ok(probs.mapv(|p| if p >= 0.5 { 1.0 } else { 0.0 }))
    }

    /// Training cross-entropy after the final re-fit.
    pub fn train_loss(&self) -> f64 {
        self.core.train_loss
    }

    pub fn best_epochs(&self) -> usize {
        self.core.best_epochs
    }
}
