// LSTM layer forward/backward passes on ndarray, gate order i, f, g, o.
use ndarray::{s, Array1, Array2, Axis};
use rand::Rng;

pub(crate) fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Weights of one LSTM layer. Also used as the shape of its gradients and Adam moments.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LstmWeights {
    /// Input kernel, `(4H, input)`.
    pub w: Array2<f64>,
    /// Recurrent kernel, `(4H, H)`.
    pub u: Array2<f64>,
    pub b: Array1<f64>,
}

/// Activations kept from the forward pass for backpropagation through time.
#[derive(Debug, Clone)]
pub(crate) struct StepCache {
    x: Array1<f64>,
    h_prev: Array1<f64>,
    c_prev: Array1<f64>,
    i: Array1<f64>,
    f: Array1<f64>,
    g: Array1<f64>,
    o: Array1<f64>,
    tanh_c: Array1<f64>,
}

pub(crate) fn glorot_uniform<R: Rng>(rows: usize, cols: usize, rng: &mut R) -> Array2<f64> {
    let limit = (6.0 / (rows + cols) as f64).sqrt();
    Array2::from_shape_fn((rows, cols), |_| rng.random_range(-limit..limit))
}

fn outer(a: &Array1<f64>, b: &Array1<f64>) -> Array2<f64> {
    a.view().insert_axis(Axis(1)).dot(&b.view().insert_axis(Axis(0)))
}

impl LstmWeights {
    /// Glorot-uniform kernels and a forget-gate bias of 1.
    pub fn init<R: Rng>(input: usize, hidden: usize, rng: &mut R) -> Self {
        let mut b = Array1::zeros(4 * hidden);
        b.slice_mut(s![hidden..2 * hidden]).fill(1.0);
        Self {
            w: glorot_uniform(4 * hidden, input, rng),
            u: glorot_uniform(4 * hidden, hidden, rng),
            b,
        }
    }

    pub fn zeros_like(&self) -> Self {
        Self {
            w: Array2::zeros(self.w.raw_dim()),
            u: Array2::zeros(self.u.raw_dim()),
            b: Array1::zeros(self.b.raw_dim()),
        }
    }

    pub fn hidden(&self) -> usize {
        self.u.ncols()
    }

    /// Runs the sequence from a zero state and returns every hidden state.
    pub fn forward(&self, xs: &[Array1<f64>]) -> (Vec<Array1<f64>>, Vec<StepCache>) {
        let h = self.hidden();
        let mut h_prev = Array1::<f64>::zeros(h);
        let mut c_prev = Array1::<f64>::zeros(h);
        let mut outputs = Vec::with_capacity(xs.len());
        let mut caches = Vec::with_capacity(xs.len());

        for x in xs {
            let z = self.w.dot(x) + self.u.dot(&h_prev) + &self.b;
            let i = z.slice(s![0..h]).mapv(sigmoid);
            let f = z.slice(s![h..2 * h]).mapv(sigmoid);
            let g = z.slice(s![2 * h..3 * h]).mapv(f64::tanh);
            let o = z.slice(s![3 * h..]).mapv(sigmoid);

            let c = &f * &c_prev + &i * &g;
            let tanh_c = c.mapv(f64::tanh);
            let h_t = &o * &tanh_c;

            caches.push(StepCache {
                x: x.clone(),
                h_prev: h_prev.clone(),
                c_prev: c_prev.clone(),
                i,
                f,
                g,
                o,
                tanh_c,
            });
            outputs.push(h_t.clone());
            h_prev = h_t;
            c_prev = c;
        }
        (outputs, caches)
    }

    /// Accumulates weight gradients into `grads` given the loss gradient for
    /// every hidden output, and returns the gradient for every input.
    pub fn backward(&self, caches: &[StepCache], dhs: &[Array1<f64>], grads: &mut LstmWeights) -> Vec<Array1<f64>> {
        let h = self.hidden();
        let mut dh_next = Array1::<f64>::zeros(h);
        let mut dc_next = Array1::<f64>::zeros(h);
        let mut dxs = vec![Array1::<f64>::zeros(0); caches.len()];

        for t in (0..caches.len()).rev() {
            let cache = &caches[t];
            let dh = &dhs[t] + &dh_next;

            let d_o = &dh * &cache.tanh_c;
            let dc = &dh * &cache.o * cache.tanh_c.mapv(|v| 1.0 - v * v) + &dc_next;
            let di = &dc * &cache.g;
            let dg = &dc * &cache.i;
            let df = &dc * &cache.c_prev;
            dc_next = &dc * &cache.f;

            let mut dz = Array1::<f64>::zeros(4 * h);
            dz.slice_mut(s![0..h]).assign(&(&di * &cache.i.mapv(|v| v * (1.0 - v))));
            dz.slice_mut(s![h..2 * h]).assign(&(&df * &cache.f.mapv(|v| v * (1.0 - v))));
            dz.slice_mut(s![2 * h..3 * h]).assign(&(&dg * &cache.g.mapv(|v| 1.0 - v * v)));
            dz.slice_mut(s![3 * h..]).assign(&(&d_o * &cache.o.mapv(|v| v * (1.0 - v))));

            grads.w += &outer(&dz, &cache.x);
            grads.u += &outer(&dz, &cache.h_prev);
            grads.b += &dz;

            dxs[t] = self.w.t().dot(&dz);
            dh_next = self.u.t().dot(&dz);
        }
        dxs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sequence(len: usize) -> Vec<Array1<f64>> {
        (0..len).map(|t| Array1::from_elem(1, (t as f64 * 0.5).sin())).collect()
    }

    /// Sum of the last hidden state, used as a scalar loss for gradient checks.
    fn loss(layer: &LstmWeights, xs: &[Array1<f64>]) -> f64 {
        let (hs, _) = layer.forward(xs);
        hs.last().map(|h| h.sum()).unwrap_or(0.0)
    }

    #[test]
    fn test_forward_shapes() {
        let mut rng = StdRng::seed_from_u64(7);
        let layer = LstmWeights::init(1, 3, &mut rng);
        let (hs, caches) = layer.forward(&sequence(5));
        assert_eq!(hs.len(), 5);
        assert_eq!(caches.len(), 5);
        assert!(hs.iter().all(|h| h.len() == 3 && h.iter().all(|v| v.abs() < 1.0)));
    }

    #[test]
    fn test_forget_bias_initialised_to_one() {
        let mut rng = StdRng::seed_from_u64(1);
        let layer = LstmWeights::init(2, 4, &mut rng);
        assert!(layer.b.slice(s![4..8]).iter().all(|v| *v == 1.0));
        assert!(layer.b.slice(s![0..4]).iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_backward_matches_numerical_gradient() {
        let mut rng = StdRng::seed_from_u64(3);
        let layer = LstmWeights::init(1, 2, &mut rng);
        let xs = sequence(4);

        let (hs, caches) = layer.forward(&xs);
        let mut dhs = vec![Array1::<f64>::zeros(2); hs.len()];
        dhs[hs.len() - 1] = Array1::ones(2);
        let mut grads = layer.zeros_like();
        layer.backward(&caches, &dhs, &mut grads);

        let eps = 1e-6;
        for (r, c) in [(0, 0), (3, 0), (5, 0), (7, 0)] {
            let mut plus = layer.clone();
            plus.w[[r, c]] += eps;
            let mut minus = layer.clone();
            minus.w[[r, c]] -= eps;
            let numeric = (loss(&plus, &xs) - loss(&minus, &xs)) / (2.0 * eps);
            assert!((numeric - grads.w[[r, c]]).abs() < 1e-6, "w[{},{}]: {} vs {}", r, c, numeric, grads.w[[r, c]]);
        }
        for (r, c) in [(1, 1), (6, 0)] {
            let mut plus = layer.clone();
            plus.u[[r, c]] += eps;
            let mut minus = layer.clone();
            minus.u[[r, c]] -= eps;
            let numeric = (loss(&plus, &xs) - loss(&minus, &xs)) / (2.0 * eps);
            assert!((numeric - grads.u[[r, c]]).abs() < 1e-6, "u[{},{}]: {} vs {}", r, c, numeric, grads.u[[r, c]]);
        }
    }
}
