//! LSTM recurrent state management.
//!
//! Each layer carries a pair `(h, c)`: the short-term state fed forward to
//! the next step and the next layer, and the memory cell that accumulates
//! across steps. Both are `[batch, hidden]` and start at zero for every
//! independent pass.

use ndarray::Array2;

/// Recurrent state for a single LSTM layer.
#[derive(Clone, Debug)]
pub struct LayerState {
    /// Short-term state: h ∈ R^{batch × hidden}
    pub h: Array2<f32>,

    /// Memory cell: c ∈ R^{batch × hidden}
    pub c: Array2<f32>,
}

impl LayerState {
    /// Create a new zero-initialised state.
    pub fn zeros(batch: usize, hidden: usize) -> Self {
        Self {
            h: Array2::zeros((batch, hidden)),
            c: Array2::zeros((batch, hidden)),
        }
    }

    /// Reset state to zeros.
    pub fn reset(&mut self) {
        self.h.fill(0.0);
        self.c.fill(0.0);
    }

    /// Check if the state has diverged (NaN or Inf).
    pub fn is_healthy(&self) -> bool {
        self.h.iter().chain(self.c.iter()).all(|v| v.is_finite())
    }
}

/// States for every layer of the stack.
#[derive(Clone, Debug)]
pub struct StateBank {
    pub layers: Vec<LayerState>,
}

impl StateBank {
    /// Create a new bank with `n_layers` zero-initialised states.
    pub fn new(n_layers: usize, batch: usize, hidden: usize) -> Self {
        Self {
            layers: (0..n_layers).map(|_| LayerState::zeros(batch, hidden)).collect(),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.layers.first().map(|s| s.h.nrows()).unwrap_or(0)
    }

    /// Reset all states.
    pub fn reset_all(&mut self) {
        for s in &mut self.layers {
            s.reset();
        }
    }

    /// Check all states are healthy.
    pub fn all_healthy(&self) -> bool {
        self.layers.iter().all(|s| s.is_healthy())
    }
}
