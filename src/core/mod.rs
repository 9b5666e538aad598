//! Core module: LSTM recurrence, recurrent state, and the model skeleton.

pub mod lstm;
pub mod model;
pub mod state;

pub use model::{CharModel, Mode, ModelConfig, Parameters, StepTrace};
pub use state::{LayerState, StateBank};
