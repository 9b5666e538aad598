//! A single LSTM layer, the gated memory-cell recurrence.
//!
//! Each step maps the layer input `x` and the previous state `(h, c)` to a new
//! state through four gates computed from the same pre-activation:
//!
//! ```text
//! z  = x · W_xᵀ + h · W_hᵀ + b      split into [g | i | f | o]
//! g  = tanh(z_g)                     candidate, in [-1, 1]
//! i  = σ(z_i)                        update gate
//! f  = σ(z_f)                        forget gate
//! o  = σ(z_o)                        output gate
//! c' = i ⊙ g + f ⊙ c
//! h' = o ⊙ tanh(c')
//! ```
//!
//! Steps are strictly sequential: step t's state is step t+1's input.

use ndarray::{s, Array1, Array2, ArrayView2, Axis};
use rand::Rng;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};

use super::state::LayerState;

/// Number of gates packed into the fused weight matrices.
pub const N_GATES: usize = 4;

/// Weights for a single LSTM layer. Gate blocks are stacked row-wise in the
/// order candidate, update, forget, output.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LstmLayer {
    /// Input projection: W_x ∈ R^{4·hidden × input}
    pub w_x: Array2<f32>,

    /// Recurrent projection: W_h ∈ R^{4·hidden × hidden}
    pub w_h: Array2<f32>,

    /// Gate bias: b ∈ R^{4·hidden}
    pub bias: Array1<f32>,
}

/// Activations saved by [`LstmLayer::forward_step`] for the backward pass.
#[derive(Clone, Debug)]
pub struct StepCache {
    pub x: Array2<f32>,
    pub h_prev: Array2<f32>,
    pub c_prev: Array2<f32>,
    pub g: Array2<f32>,
    pub i: Array2<f32>,
    pub f: Array2<f32>,
    pub o: Array2<f32>,
    pub tanh_c: Array2<f32>,
}

/// Gradients flowing out of one backward step.
pub struct StepGrads {
    /// ∂L/∂x, fed to the layer below.
    pub dx: Array2<f32>,
    /// ∂L/∂h_{t-1}
    pub dh_prev: Array2<f32>,
    /// ∂L/∂c_{t-1}
    pub dc_prev: Array2<f32>,
}

impl LstmLayer {
    /// Create a new layer with zero-initialised weights.
    pub fn zeros(input: usize, hidden: usize) -> Self {
        Self {
            w_x: Array2::zeros((N_GATES * hidden, input)),
            w_h: Array2::zeros((N_GATES * hidden, hidden)),
            bias: Array1::zeros(N_GATES * hidden),
        }
    }

    /// Uniform(-1/√hidden, 1/√hidden) initialisation for every weight and bias.
    pub fn init<R: Rng + ?Sized>(input: usize, hidden: usize, rng: &mut R) -> Self {
        let bound = 1.0 / (hidden as f32).sqrt();
        let dist = Uniform::new_inclusive(-bound, bound);
        Self {
            w_x: Array2::from_shape_fn((N_GATES * hidden, input), |_| dist.sample(rng)),
            w_h: Array2::from_shape_fn((N_GATES * hidden, hidden), |_| dist.sample(rng)),
            bias: Array1::from_shape_fn(N_GATES * hidden, |_| dist.sample(rng)),
        }
    }

    pub fn input_size(&self) -> usize {
        self.w_x.ncols()
    }

    pub fn hidden_size(&self) -> usize {
        self.w_h.ncols()
    }

    /// Single-step forward pass over a batch.
    ///
    /// `x` is `[batch, input]`. Updates `state` in place and returns the
    /// activations needed to backpropagate through this step.
    pub fn forward_step(&self, x: &Array2<f32>, state: &mut LayerState) -> StepCache {
        let hidden = self.hidden_size();
        let z = x.dot(&self.w_x.t()) + state.h.dot(&self.w_h.t()) + &self.bias;

        let g = gate_block(&z, 0, hidden).mapv(f32::tanh);
        let i = sigmoid(&gate_block(&z, 1, hidden));
        let f = sigmoid(&gate_block(&z, 2, hidden));
        let o = sigmoid(&gate_block(&z, 3, hidden));

        let c_new = &i * &g + &f * &state.c;
        let tanh_c = c_new.mapv(f32::tanh);
        let h_new = &o * &tanh_c;

        let h_prev = std::mem::replace(&mut state.h, h_new);
        let c_prev = std::mem::replace(&mut state.c, c_new);

        StepCache {
            x: x.clone(),
            h_prev,
            c_prev,
            g,
            i,
            f,
            o,
            tanh_c,
        }
    }

    /// Backpropagate one step.
    ///
    /// `dh` is the total gradient reaching this step's output `h'` (from the
    /// layer above and from step t+1); `dc_next` is the gradient reaching `c'`
    /// from step t+1. Weight gradients accumulate into `grads`.
    pub fn backward_step(
        &self,
        cache: &StepCache,
        dh: &Array2<f32>,
        dc_next: &Array2<f32>,
        grads: &mut LstmLayer,
    ) -> StepGrads {
        let hidden = self.hidden_size();

        let d_o = dh * &cache.tanh_c;
        let dc = dc_next + &(dh * &cache.o * &cache.tanh_c.mapv(|t| 1.0 - t * t));
        let d_g = &dc * &cache.i;
        let d_i = &dc * &cache.g;
        let d_f = &dc * &cache.c_prev;
        let dc_prev = &dc * &cache.f;

        let mut dz = Array2::zeros((dh.nrows(), N_GATES * hidden));
        dz.slice_mut(s![.., 0..hidden])
            .assign(&(d_g * &cache.g.mapv(|g| 1.0 - g * g)));
        dz.slice_mut(s![.., hidden..2 * hidden])
            .assign(&(d_i * &sigmoid_grad(&cache.i)));
        dz.slice_mut(s![.., 2 * hidden..3 * hidden])
            .assign(&(d_f * &sigmoid_grad(&cache.f)));
        dz.slice_mut(s![.., 3 * hidden..])
            .assign(&(d_o * &sigmoid_grad(&cache.o)));

        grads.w_x += &dz.t().dot(&cache.x);
        grads.w_h += &dz.t().dot(&cache.h_prev);
        grads.bias += &dz.sum_axis(Axis(0));

        StepGrads {
            dx: dz.dot(&self.w_x),
            dh_prev: dz.dot(&self.w_h),
            dc_prev,
        }
    }

    /// Parameter count for this layer.
    pub fn param_count(&self) -> usize {
        self.w_x.len() + self.w_h.len() + self.bias.len()
    }
}

fn gate_block(z: &Array2<f32>, gate: usize, hidden: usize) -> ArrayView2<'_, f32> {
    z.slice(s![.., gate * hidden..(gate + 1) * hidden])
}

/// Element-wise sigmoid: 1 / (1 + exp(-x))
fn sigmoid(x: &ArrayView2<f32>) -> Array2<f32> {
    x.mapv(|v| 1.0 / (1.0 + (-v).exp()))
}

/// σ'(z) expressed through s = σ(z).
fn sigmoid_grad(s: &Array2<f32>) -> Array2<f32> {
    s.mapv(|v| v * (1.0 - v))
}
