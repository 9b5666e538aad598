//! Runtime module: ties all components into complete runs.
//!
//! This module provides:
//! - Training and generation pipelines (corpus → model → text)
//! - Checkpoint persistence (vocabulary + topology + weights)

pub mod checkpoint;
pub mod pipeline;

pub use checkpoint::Checkpoint;
pub use pipeline::{generate, train_on_corpus, train_on_file, GenerationResult, Topology, TrainRun};
