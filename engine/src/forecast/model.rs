// Two-layer LSTM regressor trained with Adam on minibatches of windows.
use ndarray::{Array, Array1, Dimension, Zip};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use super::lstm::{glorot_uniform, LstmWeights};
use super::window::{ScalerState, Window};
use crate::config::ModelConfig;
use crate::error::{EngineError, EngineResult};

const ADAM_BETA1: f64 = 0.9;
const ADAM_BETA2: f64 = 0.999;
const ADAM_EPSILON: f64 = 1e-7;

/// Parameter set of the whole network: LSTM(H, sequences) -> LSTM(H) -> Dense(1).
#[derive(Debug, Clone, PartialEq)]
struct Network {
    lstm1: LstmWeights,
    lstm2: LstmWeights,
    dense_w: Array1<f64>,
    dense_b: Array1<f64>,
}

impl Network {
    fn init<R: Rng>(hidden: usize, rng: &mut R) -> Self {
        let lstm1 = LstmWeights::init(1, hidden, rng);
        let lstm2 = LstmWeights::init(hidden, hidden, rng);
        let dense_w = glorot_uniform(1, hidden, rng).row(0).to_owned();
        Self { lstm1, lstm2, dense_w, dense_b: Array1::zeros(1) }
    }

    fn zeros_like(&self) -> Self {
        Self {
            lstm1: self.lstm1.zeros_like(),
            lstm2: self.lstm2.zeros_like(),
            dense_w: Array1::zeros(self.dense_w.raw_dim()),
            dense_b: Array1::zeros(1),
        }
    }

    fn sequence(input: &[f64]) -> Vec<Array1<f64>> {
        input.iter().map(|v| Array1::from_elem(1, *v)).collect()
    }

    /// Inference pass, dropout disabled.
    fn predict(&self, input: &[f64]) -> f64 {
        let (h1, _) = self.lstm1.forward(&Self::sequence(input));
        let (h2, _) = self.lstm2.forward(&h1);
        match h2.last() {
            Some(last) => self.dense_w.dot(last) + self.dense_b[0],
            None => self.dense_b[0],
        }
    }

    /// Forward and backward pass for one window with inverted dropout.
    /// Adds the gradient of `(y - target)^2 / batch_len` into `grads`
    /// and returns the squared error.
    fn accumulate_gradients<R: Rng>(
        &self,
        window: &Window,
        dropout: f64,
        batch_len: usize,
        rng: &mut R,
        grads: &mut Network,
    ) -> f64 {
        let hidden = self.lstm1.hidden();
        let xs = Self::sequence(&window.input);

        let (h1, cache1) = self.lstm1.forward(&xs);
        let masks1: Vec<Array1<f64>> = h1.iter().map(|_| dropout_mask(hidden, dropout, rng)).collect();
        let h1_dropped: Vec<Array1<f64>> = h1.iter().zip(&masks1).map(|(h, m)| h * m).collect();

        let (h2, cache2) = self.lstm2.forward(&h1_dropped);
        let last = h2.last().cloned().unwrap_or_else(|| Array1::zeros(hidden));
        let mask2 = dropout_mask(hidden, dropout, rng);
        let last_dropped = &last * &mask2;

        let y = self.dense_w.dot(&last_dropped) + self.dense_b[0];
        let err = y - window.target;
        let dy = 2.0 * err / batch_len as f64;

        grads.dense_w.scaled_add(dy, &last_dropped);
        grads.dense_b[0] += dy;

        let mut dh2 = vec![Array1::<f64>::zeros(hidden); h2.len()];
        if let Some(slot) = dh2.last_mut() {
            *slot = &self.dense_w * dy * &mask2;
        }
        let dh1_dropped = self.lstm2.backward(&cache2, &dh2, &mut grads.lstm2);
        let dh1: Vec<Array1<f64>> = dh1_dropped.iter().zip(&masks1).map(|(d, m)| d * m).collect();
        self.lstm1.backward(&cache1, &dh1, &mut grads.lstm1);

        err * err
    }
}

fn dropout_mask<R: Rng>(len: usize, rate: f64, rng: &mut R) -> Array1<f64> {
    if rate <= 0.0 {
        return Array1::ones(len);
    }
    let keep = 1.0 / (1.0 - rate);
    Array1::from_shape_fn(len, |_| if rng.random::<f64>() < rate { 0.0 } else { keep })
}

struct Adam {
    learning_rate: f64,
    step: i32,
    m: Network,
    v: Network,
}

impl Adam {
    fn new(params: &Network, learning_rate: f64) -> Self {
        Self { learning_rate, step: 0, m: params.zeros_like(), v: params.zeros_like() }
    }

    fn apply(&mut self, params: &mut Network, grads: &Network) {
        self.step += 1;
        let lr_t = self.learning_rate * (1.0 - ADAM_BETA2.powi(self.step)).sqrt() / (1.0 - ADAM_BETA1.powi(self.step));

        for (p, g, m, v) in [
            (&mut params.lstm1, &grads.lstm1, &mut self.m.lstm1, &mut self.v.lstm1),
            (&mut params.lstm2, &grads.lstm2, &mut self.m.lstm2, &mut self.v.lstm2),
        ] {
            adam_update(&mut p.w, &g.w, &mut m.w, &mut v.w, lr_t);
            adam_update(&mut p.u, &g.u, &mut m.u, &mut v.u, lr_t);
            adam_update(&mut p.b, &g.b, &mut m.b, &mut v.b, lr_t);
        }
        adam_update(&mut params.dense_w, &grads.dense_w, &mut self.m.dense_w, &mut self.v.dense_w, lr_t);
        adam_update(&mut params.dense_b, &grads.dense_b, &mut self.m.dense_b, &mut self.v.dense_b, lr_t);
    }
}

fn adam_update<D: Dimension>(
    param: &mut Array<f64, D>,
    grad: &Array<f64, D>,
    m: &mut Array<f64, D>,
    v: &mut Array<f64, D>,
    lr_t: f64,
) {
    Zip::from(param).and(grad).and(m).and(v).for_each(|p, &g, m, v| {
        *m = ADAM_BETA1 * *m + (1.0 - ADAM_BETA1) * g;
        *v = ADAM_BETA2 * *v + (1.0 - ADAM_BETA2) * g * g;
        *p -= lr_t * *m / (v.sqrt() + ADAM_EPSILON);
    });
}

/// Untrained model; [`ForecastModel::fit`] produces a [`TrainedModel`].
#[derive(Debug, Clone)]
pub struct ForecastModel {
    config: ModelConfig,
}

impl ForecastModel {
    pub fn new(config: ModelConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Trains on every window for the configured epochs. Blocking; callers on
    /// the runtime should go through `spawn_blocking`.
    pub fn fit(&self, windows: &[Window]) -> EngineResult<TrainedModel> {
        if windows.is_empty() {
            return Err(EngineError::TrainingError("no training windows supplied".to_string()));
        }
        let window_size = windows[0].input.len();
        if window_size == 0 {
            return Err(EngineError::TrainingError("windows have no input values".to_string()));
        }
        if let Some(pos) = windows.iter().position(|w| w.input.len() != window_size) {
            return Err(EngineError::TrainingError(format!(
                "window {} has {} inputs, expected {}",
                pos,
                windows[pos].input.len(),
                window_size
            )));
        }
        self.config.validate()?;

        let cfg = &self.config;
        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let mut network = Network::init(cfg.hidden_units, &mut rng);
        let mut optimizer = Adam::new(&network, cfg.learning_rate);
        let mut order: Vec<usize> = (0..windows.len()).collect();
        let mut loss_history = Vec::with_capacity(cfg.epochs);

        tracing::info!(
            windows = windows.len(),
            window_size,
            hidden_units = cfg.hidden_units,
            epochs = cfg.epochs,
            batch_size = cfg.batch_size,
            "Training forecast model"
        );

        for epoch in 0..cfg.epochs {
            order.shuffle(&mut rng);
            let mut squared_error = 0.0;
            for batch in order.chunks(cfg.batch_size) {
                let mut grads = network.zeros_like();
                for &idx in batch {
                    squared_error +=
                        network.accumulate_gradients(&windows[idx], cfg.dropout, batch.len(), &mut rng, &mut grads);
                }
                optimizer.apply(&mut network, &grads);
            }

            let loss = squared_error / windows.len() as f64;
            if !loss.is_finite() {
                tracing::error!(epoch, "Training diverged");
                return Err(EngineError::TrainingError(format!("loss became non-finite at epoch {}", epoch + 1)));
            }
            tracing::debug!(epoch = epoch + 1, loss, "Epoch finished");
            loss_history.push(loss);
        }

        Ok(TrainedModel { network, window_size, loss_history })
    }
}

/// A fitted network, held in memory for repeated inference.
#[derive(Debug, Clone)]
pub struct TrainedModel {
    network: Network,
    window_size: usize,
    loss_history: Vec<f64>,
}

impl TrainedModel {
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Mean squared error per epoch, in scaled units.
    pub fn loss_history(&self) -> &[f64] {
        &self.loss_history
    }

    /// Predicts the next scaled value from `window_size` scaled inputs.
    pub fn predict(&self, input: &[f64]) -> EngineResult<f64> {
        if input.len() != self.window_size {
            return Err(EngineError::TrainingError(format!(
                "prediction input has {} values, model expects {}",
                input.len(),
                self.window_size
            )));
        }
        Ok(self.network.predict(input))
    }

    /// Predicts and maps the result back to price units with the run's scaler.
    pub fn predict_price(&self, scaler: &ScalerState, input: &[f64]) -> EngineResult<f64> {
        self.predict(input).map(|scaled| scaler.inverse(scaled))
    }
}
