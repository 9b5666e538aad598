//! Adam optimiser and global-norm gradient clipping.
//!
//! Moment buffers share the [`Parameters`] layout, so every update is a
//! tensor-by-tensor zip over parameters, gradients, and moments.

use ndarray::Zip;

use crate::core::Parameters;

/// Adam configuration.
#[derive(Clone, Debug)]
pub struct AdamConfig {
    /// Learning rate.
    pub lr: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub eps: f32,
}

impl Default for AdamConfig {
    fn default() -> Self {
        Self {
            lr: crate::config::DEFAULT_LR,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
        }
    }
}

/// Adam optimiser state.
pub struct Adam {
    pub config: AdamConfig,

    /// First moment estimate.
    m: Parameters,

    /// Second moment estimate.
    v: Parameters,

    /// Number of steps taken.
    pub step_count: u64,
}

impl Adam {
    /// Create an optimiser for parameters shaped like `params`.
    pub fn new(config: AdamConfig, params: &Parameters) -> Self {
        Self {
            config,
            m: params.zeros_like(),
            v: params.zeros_like(),
            step_count: 0,
        }
    }

    /// Apply one bias-corrected update: θ ← θ − lr · m̂ / (√v̂ + ε).
    pub fn step(&mut self, params: &mut Parameters, grads: &Parameters) {
        self.step_count += 1;
        let AdamConfig { lr, beta1, beta2, eps } = self.config;
        let t = self.step_count as i32;
        let correction1 = 1.0 - beta1.powi(t);
        let correction2 = 1.0 - beta2.powi(t);

        let tensors = params
            .tensors_mut()
            .into_iter()
            .zip(grads.tensors())
            .zip(self.m.tensors_mut())
            .zip(self.v.tensors_mut());

        for (((p, g), m), v) in tensors {
            Zip::from(p).and(&g).and(m).and(v).for_each(|p, &g, m, v| {
                *m = beta1 * *m + (1.0 - beta1) * g;
                *v = beta2 * *v + (1.0 - beta2) * g * g;
                let m_hat = *m / correction1;
                let v_hat = *v / correction2;
                *p -= lr * m_hat / (v_hat.sqrt() + eps);
            });
        }
    }
}

/// Global L2 norm of all gradients.
pub fn grad_norm(grads: &Parameters) -> f32 {
    grads
        .tensors()
        .iter()
        .map(|t| t.iter().map(|v| v * v).sum::<f32>())
        .sum::<f32>()
        .sqrt()
}

/// Rescale `grads` in place so their global L2 norm is at most `max_norm`.
///
/// Returns the norm before clipping.
pub fn clip_grad_norm(grads: &mut Parameters, max_norm: f32) -> f32 {
    let norm = grad_norm(grads);
    if norm > max_norm {
        let scale = max_norm / (norm + 1e-6);
        for mut t in grads.tensors_mut() {
            t.mapv_inplace(|v| v * scale);
        }
    }
    norm
}
