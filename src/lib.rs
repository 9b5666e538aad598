//! # chargen
//!
//! Character-level text generation with a stacked LSTM.
//!
//! ## Stages
//!
//! 1. **Vocabulary**: bijection between corpus characters and dense codes
//! 2. **Batches**: lazy `(input, target)` windows over the encoded corpus
//! 3. **LSTM stack**: gated memory-cell recurrence + linear projection
//! 4. **Sampler**: autoregressive top-k character sampling
//!
//! Training (cross-entropy, BPTT, Adam) lives in [`learning`]; checkpoints
//! and end-to-end runs in [`runtime`].
//!
//! ## Architecture
//!
//! - One-hot character input
//! - 2 LSTM layers × 256 hidden units, dropout 0.5 between and after them
//! - Linear projection to vocabulary-sized scores

pub mod core;
pub mod data;
pub mod decoding;
pub mod error;
pub mod learning;
pub mod runtime;

pub use error::{ChargenError, Result};

/// Default hyperparameters.
pub mod config {
    /// LSTM hidden units per layer.
    pub const DEFAULT_HIDDEN: usize = 256;

    /// Stacked LSTM layers.
    pub const DEFAULT_LAYERS: usize = 2;

    /// Dropout probability (training only).
    pub const DEFAULT_DROPOUT: f32 = 0.5;

    /// Adam learning rate.
    pub const DEFAULT_LR: f32 = 0.001;

    /// Global gradient-norm ceiling.
    pub const DEFAULT_CLIP: f32 = 5.0;

    /// Sequences per batch.
    pub const DEFAULT_BATCH_SIZE: usize = 10;

    /// Steps per sequence.
    pub const DEFAULT_SEQ_LEN: usize = 50;

    /// Held-out fraction of the corpus.
    pub const DEFAULT_VAL_FRAC: f32 = 0.1;

    /// Validation/report interval in steps.
    pub const DEFAULT_PRINT_EVERY: usize = 10;

    /// Full passes over the training split.
    pub const DEFAULT_EPOCHS: usize = 10;

    /// Candidates kept per sampling draw.
    pub const DEFAULT_TOP_K: usize = 5;

    /// Seed for weight init, dropout and sampling.
    pub const DEFAULT_SEED: u64 = 42;
}
