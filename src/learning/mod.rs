//! Learning module: loss, optimiser, and the training loop.
//!
//! - **Loss**: mean softmax cross-entropy over next-character targets
//! - **Optimiser**: Adam with global-norm gradient clipping
//! - **Trainer**: truncated BPTT across batch windows, periodic validation

pub mod loss;
pub mod optim;
pub mod trainer;

pub use trainer::{evaluate, Progress, TrainConfig, Trainer};
