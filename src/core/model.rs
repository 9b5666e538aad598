//! Top-level model. Wires the stacked LSTM layers, dropout, and the output
//! projection into the character-level network.
//!
//! ```text
//! one_hot(code) → LSTM₁ → dropout → LSTM₂ → … → dropout → W_fc · h + b_fc → scores
//! ```
//!
//! Dropout is active only in [`Mode::Train`] and draws its masks from the
//! caller's RNG.

use ndarray::{Array1, Array2, ArrayViewD, ArrayViewMutD, Axis};
use rand::Rng;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};

use crate::config::{DEFAULT_DROPOUT, DEFAULT_HIDDEN, DEFAULT_LAYERS};
use crate::core::lstm::{LstmLayer, StepCache, N_GATES};
use crate::core::state::StateBank;
use crate::data::one_hot;
use crate::error::{ChargenError, Result};

/// Whether stochastic regularisation is applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Train,
    Eval,
}

/// Model topology.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Vocabulary size (one-hot input width and score width).
    pub vocab_size: usize,

    /// LSTM hidden units per layer.
    pub hidden_size: usize,

    /// Number of stacked LSTM layers.
    pub n_layers: usize,

    /// Dropout probability applied to every layer output during training.
    pub dropout: f32,
}

impl ModelConfig {
    /// Default topology for a given vocabulary size.
    pub fn new(vocab_size: usize) -> Self {
        Self {
            vocab_size,
            hidden_size: DEFAULT_HIDDEN,
            n_layers: DEFAULT_LAYERS,
            dropout: DEFAULT_DROPOUT,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.vocab_size == 0 || self.hidden_size == 0 || self.n_layers == 0 {
            return Err(ChargenError::InvalidInput(format!(
                "model dimensions must be non-zero: {:?}",
                self
            )));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(ChargenError::InvalidInput(format!(
                "dropout must lie in [0, 1), got {}",
                self.dropout
            )));
        }
        Ok(())
    }
}

/// Every trainable tensor of the model. Also used as the gradient buffer and
/// the optimiser moment buffers, which share its shape.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Parameters {
    pub layers: Vec<LstmLayer>,

    /// Output projection: W_fc ∈ R^{vocab × hidden}
    pub w_fc: Array2<f32>,

    /// Output bias: b_fc ∈ R^{vocab}
    pub b_fc: Array1<f32>,
}

impl Parameters {
    pub fn zeros(config: &ModelConfig) -> Self {
        let layers = (0..config.n_layers)
            .map(|l| {
                let input = if l == 0 { config.vocab_size } else { config.hidden_size };
                LstmLayer::zeros(input, config.hidden_size)
            })
            .collect();
        Self {
            layers,
            w_fc: Array2::zeros((config.vocab_size, config.hidden_size)),
            b_fc: Array1::zeros(config.vocab_size),
        }
    }

    pub fn init<R: Rng + ?Sized>(config: &ModelConfig, rng: &mut R) -> Self {
        let layers = (0..config.n_layers)
            .map(|l| {
                let input = if l == 0 { config.vocab_size } else { config.hidden_size };
                LstmLayer::init(input, config.hidden_size, rng)
            })
            .collect();
        let bound = 1.0 / (config.hidden_size as f32).sqrt();
        let dist = Uniform::new_inclusive(-bound, bound);
        Self {
            layers,
            w_fc: Array2::from_shape_fn((config.vocab_size, config.hidden_size), |_| {
                dist.sample(rng)
            }),
            b_fc: Array1::zeros(config.vocab_size),
        }
    }

    /// Zero buffer with the same shapes.
    pub fn zeros_like(&self) -> Self {
        let mut out = self.clone();
        for mut t in out.tensors_mut() {
            t.fill(0.0);
        }
        out
    }

    /// Flat views over every tensor, in a fixed order.
    pub fn tensors(&self) -> Vec<ArrayViewD<'_, f32>> {
        let mut out = Vec::with_capacity(self.layers.len() * 3 + 2);
        for layer in &self.layers {
            out.push(layer.w_x.view().into_dyn());
            out.push(layer.w_h.view().into_dyn());
            out.push(layer.bias.view().into_dyn());
        }
        out.push(self.w_fc.view().into_dyn());
        out.push(self.b_fc.view().into_dyn());
        out
    }

    /// Mutable counterpart of [`Parameters::tensors`], same order.
    pub fn tensors_mut(&mut self) -> Vec<ArrayViewMutD<'_, f32>> {
        let mut out = Vec::with_capacity(self.layers.len() * 3 + 2);
        for LstmLayer { w_x, w_h, bias } in self.layers.iter_mut() {
            out.push(w_x.view_mut().into_dyn());
            out.push(w_h.view_mut().into_dyn());
            out.push(bias.view_mut().into_dyn());
        }
        out.push(self.w_fc.view_mut().into_dyn());
        out.push(self.b_fc.view_mut().into_dyn());
        out
    }

    pub fn param_count(&self) -> usize {
        self.tensors().iter().map(|t| t.len()).sum()
    }

    pub fn is_finite(&self) -> bool {
        self.tensors().iter().all(|t| t.iter().all(|v| v.is_finite()))
    }

    /// Check every tensor against the shapes `config` implies.
    pub fn check_shapes(&self, config: &ModelConfig) -> Result<()> {
        let mismatch = || {
            ChargenError::InvalidInput(format!(
                "parameter shapes do not match model config {:?}",
                config
            ))
        };
        let (v, h) = (config.vocab_size, config.hidden_size);
        let gates = h.checked_mul(N_GATES).ok_or_else(mismatch)?;
        if self.layers.len() != config.n_layers {
            return Err(mismatch());
        }

        let mut expected = Vec::with_capacity(config.n_layers * 3 + 2);
        for l in 0..config.n_layers {
            let input = if l == 0 { v } else { h };
            expected.push(vec![gates, input]);
            expected.push(vec![gates, h]);
            expected.push(vec![gates]);
        }
        expected.push(vec![v, h]);
        expected.push(vec![v]);

        let tensors = self.tensors();
        let ok = tensors.len() == expected.len()
            && tensors
                .iter()
                .zip(expected.iter())
                .all(|(t, shape)| t.shape() == shape.as_slice());
        if ok {
            Ok(())
        } else {
            Err(mismatch())
        }
    }
}

/// Everything one time step leaves behind for backpropagation.
#[derive(Clone, Debug)]
pub struct StepTrace {
    /// Per-layer activations.
    pub caches: Vec<StepCache>,

    /// Per-layer dropout masks (already scaled by 1/(1-p)); `None` when off.
    pub masks: Vec<Option<Array2<f32>>>,

    /// Top-layer output after dropout, the projection input.
    pub top: Array2<f32>,

    /// Scores `[batch, vocab]`.
    pub scores: Array2<f32>,
}

/// The stacked LSTM character model.
#[derive(Clone, Debug)]
pub struct CharModel {
    pub config: ModelConfig,
    pub params: Parameters,
}

impl CharModel {
    /// Create a model with randomly initialised weights.
    pub fn new<R: Rng + ?Sized>(config: ModelConfig, rng: &mut R) -> Result<Self> {
        config.validate()?;
        let params = Parameters::init(&config, rng);
        Ok(Self { config, params })
    }

    /// Create a model with zero weights.
    pub fn zeros(config: ModelConfig) -> Result<Self> {
        config.validate()?;
        let params = Parameters::zeros(&config);
        Ok(Self { config, params })
    }

    /// Wrap existing weights, checking they fit the topology.
    pub fn from_parameters(config: ModelConfig, params: Parameters) -> Result<Self> {
        config.validate()?;
        params.check_shapes(&config)?;
        Ok(Self { config, params })
    }

    /// Zero state for a pass over `batch` parallel sequences.
    pub fn init_state(&self, batch: usize) -> StateBank {
        StateBank::new(self.config.n_layers, batch, self.config.hidden_size)
    }

    /// Advance every sequence of the batch by one character.
    ///
    /// `codes[b]` is the current character of sequence `b`. Returns the trace
    /// of the step; `trace.scores` holds the next-character scores.
    pub fn forward_step<R: Rng + ?Sized>(
        &self,
        codes: &[usize],
        state: &mut StateBank,
        mode: Mode,
        rng: &mut R,
    ) -> Result<StepTrace> {
        self.check_codes(codes.iter().copied())?;
        if state.batch_size() != codes.len() || state.layers.len() != self.config.n_layers {
            return Err(ChargenError::InvalidInput(format!(
                "state holds {} sequences × {} layers, step has {} × {}",
                state.batch_size(),
                state.layers.len(),
                codes.len(),
                self.config.n_layers
            )));
        }

        let mut x = one_hot(codes.iter().copied(), self.config.vocab_size);
        let mut caches = Vec::with_capacity(self.config.n_layers);
        let mut masks = Vec::with_capacity(self.config.n_layers);

        for (layer, layer_state) in self.params.layers.iter().zip(state.layers.iter_mut()) {
            caches.push(layer.forward_step(&x, layer_state));
            let mask = self.dropout_mask(layer_state.h.dim(), mode, rng);
            x = match &mask {
                Some(m) => &layer_state.h * m,
                None => layer_state.h.clone(),
            };
            masks.push(mask);
        }

        let scores = x.dot(&self.params.w_fc.t()) + &self.params.b_fc;
        Ok(StepTrace {
            caches,
            masks,
            top: x,
            scores,
        })
    }

    /// Run a whole `[batch, steps]` window of codes in time order.
    pub fn forward_window<R: Rng + ?Sized>(
        &self,
        input: &Array2<usize>,
        state: &mut StateBank,
        mode: Mode,
        rng: &mut R,
    ) -> Result<Vec<StepTrace>> {
        input
            .axis_iter(Axis(1))
            .map(|column| {
                let codes: Vec<usize> = column.to_vec();
                self.forward_step(&codes, state, mode, rng)
            })
            .collect()
    }

    /// Backpropagation through time over a window.
    ///
    /// `d_scores[t]` is ∂L/∂scores at step t. Gradients do not flow into the
    /// state the window started from.
    pub fn backward_window(&self, traces: &[StepTrace], d_scores: &[Array2<f32>]) -> Parameters {
        let mut grads = self.params.zeros_like();
        let batch = traces.first().map(|t| t.scores.nrows()).unwrap_or(0);
        let hidden = self.config.hidden_size;
        let mut dh_next = vec![Array2::<f32>::zeros((batch, hidden)); self.config.n_layers];
        let mut dc_next = dh_next.clone();

        for (trace, ds) in traces.iter().zip(d_scores.iter()).rev() {
            grads.w_fc += &ds.t().dot(&trace.top);
            grads.b_fc += &ds.sum_axis(Axis(0));

            let mut d_out = ds.dot(&self.params.w_fc);
            for l in (0..self.config.n_layers).rev() {
                if let Some(mask) = &trace.masks[l] {
                    d_out = d_out * mask;
                }
                let dh = d_out + &dh_next[l];
                let step = self.params.layers[l].backward_step(
                    &trace.caches[l],
                    &dh,
                    &dc_next[l],
                    &mut grads.layers[l],
                );
                dh_next[l] = step.dh_prev;
                dc_next[l] = step.dc_prev;
                d_out = step.dx;
            }
        }

        grads
    }

    fn dropout_mask<R: Rng + ?Sized>(
        &self,
        shape: (usize, usize),
        mode: Mode,
        rng: &mut R,
    ) -> Option<Array2<f32>> {
        let p = self.config.dropout;
        if mode == Mode::Eval || p <= 0.0 {
            return None;
        }
        let keep = 1.0 / (1.0 - p);
        Some(Array2::from_shape_fn(shape, |_| {
            if rng.gen::<f32>() < p {
                0.0
            } else {
                keep
            }
        }))
    }

    fn check_codes(&self, codes: impl Iterator<Item = usize>) -> Result<()> {
        let vocab = self.config.vocab_size;
        for code in codes {
            if code >= vocab {
                return Err(ChargenError::InvalidInput(format!(
                    "code {} out of range for vocabulary of {}",
                    code, vocab
                )));
            }
        }
        Ok(())
    }

    pub fn param_count(&self) -> usize {
        self.params.param_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learning::loss::softmax_cross_entropy;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn tiny_config() -> ModelConfig {
        ModelConfig {
            vocab_size: 4,
            hidden_size: 3,
            n_layers: 2,
            dropout: 0.0,
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(ModelConfig::new(10).validate().is_ok());
        let mut bad = tiny_config();
        bad.dropout = 1.0;
        assert!(bad.validate().is_err());
        bad = tiny_config();
        bad.n_layers = 0;
        assert!(CharModel::zeros(bad).is_err());
    }

    #[test]
    fn test_default_topology() {
        let config = ModelConfig::new(83);
        assert_eq!(config.n_layers, 2);
        assert_eq!(config.hidden_size, 256);
        let model = CharModel::zeros(config).unwrap();
        assert_eq!(model.params.layers[0].input_size(), 83);
        assert_eq!(model.params.layers[1].input_size(), 256);
        assert_eq!(model.params.w_fc.dim(), (83, 256));
    }

    #[test]
    fn test_zero_model_stays_zero() {
        let model = CharModel::zeros(tiny_config()).unwrap();
        let mut state = model.init_state(2);
        let mut rng = StdRng::seed_from_u64(0);
        for codes in [[0, 1], [3, 2], [1, 1]] {
            let trace = model.forward_step(&codes, &mut state, Mode::Eval, &mut rng).unwrap();
            assert!(trace.scores.iter().all(|&v| v == 0.0));
        }
        for layer in &state.layers {
            assert!(layer.h.iter().chain(layer.c.iter()).all(|&v| v == 0.0));
        }
    }

    #[test]
    fn test_forward_window_shapes() {
        let mut rng = StdRng::seed_from_u64(3);
        let model = CharModel::new(tiny_config(), &mut rng).unwrap();
        let input = Array2::from_shape_fn((2, 5), |(r, c)| (r + c) % 4);
        let mut state = model.init_state(2);
        let traces = model.forward_window(&input, &mut state, Mode::Train, &mut rng).unwrap();
        assert_eq!(traces.len(), 5);
        for t in &traces {
            assert_eq!(t.scores.dim(), (2, 4));
            assert_eq!(t.caches.len(), 2);
        }
    }

    #[test]
    fn test_rejects_bad_codes_and_state() {
        let mut rng = StdRng::seed_from_u64(3);
        let model = CharModel::new(tiny_config(), &mut rng).unwrap();
        let mut state = model.init_state(1);
        assert!(model.forward_step(&[4], &mut state, Mode::Eval, &mut rng).is_err());
        assert!(model.forward_step(&[0, 1], &mut state, Mode::Eval, &mut rng).is_err());
    }

    #[test]
    fn test_dropout_only_in_training() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut config = tiny_config();
        config.hidden_size = 64;
        config.dropout = 0.5;
        let model = CharModel::new(config, &mut rng).unwrap();

        let mut state = model.init_state(1);
        let trace = model.forward_step(&[1], &mut state, Mode::Eval, &mut rng).unwrap();
        assert!(trace.masks.iter().all(Option::is_none));

        let mut state = model.init_state(1);
        let trace = model.forward_step(&[1], &mut state, Mode::Train, &mut rng).unwrap();
        let mask = trace.masks[1].as_ref().unwrap();
        assert!(mask.iter().all(|&m| m == 0.0 || (m - 2.0).abs() < 1e-6));
        assert!(mask.iter().any(|&m| m == 0.0));
    }

    #[test]
    fn test_dropout_reproducible_with_seed() {
        let mut config = tiny_config();
        config.dropout = 0.3;
        let model = CharModel::new(config, &mut StdRng::seed_from_u64(5)).unwrap();
        let input = Array2::from_shape_fn((2, 4), |(r, c)| (r * 3 + c) % 4);

        let run = |seed: u64| {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut state = model.init_state(2);
            let traces = model.forward_window(&input, &mut state, Mode::Train, &mut rng).unwrap();
            traces.last().unwrap().scores.clone()
        };
        assert_eq!(run(9), run(9));
    }

    fn window_loss(model: &CharModel, input: &Array2<usize>, target: &Array2<usize>) -> f32 {
        let mut rng = StdRng::seed_from_u64(0);
        let mut state = model.init_state(input.nrows());
        let traces = model.forward_window(input, &mut state, Mode::Eval, &mut rng).unwrap();
        let scale = 1.0 / input.len() as f32;
        traces
            .iter()
            .zip(target.axis_iter(Axis(1)))
            .map(|(t, col)| softmax_cross_entropy(&t.scores, &col.to_vec(), scale).0)
            .sum()
    }

    #[test]
    fn test_gradient_matches_finite_difference() {
        let mut rng = StdRng::seed_from_u64(42);
        let model = CharModel::new(tiny_config(), &mut rng).unwrap();
        let input = Array2::from_shape_vec((2, 3), vec![0, 1, 2, 3, 2, 1]).unwrap();
        let target = Array2::from_shape_vec((2, 3), vec![1, 2, 3, 2, 1, 0]).unwrap();

        let mut state = model.init_state(2);
        let traces = model.forward_window(&input, &mut state, Mode::Eval, &mut rng).unwrap();
        let scale = 1.0 / input.len() as f32;
        let d_scores: Vec<Array2<f32>> = traces
            .iter()
            .zip(target.axis_iter(Axis(1)))
            .map(|(t, col)| softmax_cross_entropy(&t.scores, &col.to_vec(), scale).1)
            .collect();
        let grads = model.backward_window(&traces, &d_scores);

        let eps = 1e-2_f32;
        let analytic: Vec<Vec<f32>> = grads
            .tensors()
            .iter()
            .map(|t| t.iter().copied().collect())
            .collect();

        let n_tensors = analytic.len();
        for tensor_idx in 0..n_tensors {
            for elem in [0usize, 5] {
                if elem >= analytic[tensor_idx].len() {
                    continue;
                }
                let mut plus = model.clone();
                let mut minus = model.clone();
                bump(&mut plus.params, tensor_idx, elem, eps);
                bump(&mut minus.params, tensor_idx, elem, -eps);
                let numeric =
                    (window_loss(&plus, &input, &target) - window_loss(&minus, &input, &target))
                        / (2.0 * eps);
                let a = analytic[tensor_idx][elem];
                assert!(
                    (a - numeric).abs() < 1e-3 + 5e-2 * a.abs(),
                    "tensor {} elem {}: analytic {} vs numeric {}",
                    tensor_idx,
                    elem,
                    a,
                    numeric
                );
            }
        }
    }

    fn bump(params: &mut Parameters, tensor_idx: usize, elem: usize, delta: f32) {
        let mut tensors = params.tensors_mut();
        if let Some(v) = tensors[tensor_idx].iter_mut().nth(elem) {
            *v += delta;
        }
    }

    #[test]
    fn test_check_shapes() {
        let config = tiny_config();
        let params = Parameters::zeros(&config);
        assert!(params.check_shapes(&config).is_ok());

        let mut other = config.clone();
        other.hidden_size = 5;
        assert!(params.check_shapes(&other).is_err());
        other = config.clone();
        other.n_layers = 3;
        assert!(params.check_shapes(&other).is_err());

        // Shapes are derived arithmetically, so a corrupt topology fails
        // without allocating it.
        other = config.clone();
        other.hidden_size = usize::MAX / 2;
        assert!(params.check_shapes(&other).is_err());
        assert!(CharModel::from_parameters(other, params).is_err());
    }

    #[test]
    fn test_param_count() {
        let model = CharModel::zeros(tiny_config()).unwrap();
        // layer 1: 12×4 + 12×3 + 12, layer 2: 12×3 + 12×3 + 12, fc: 4×3 + 4
        let expected = (48 + 36 + 12) + (36 + 36 + 12) + (12 + 4);
        assert_eq!(model.param_count(), expected);
    }
}
