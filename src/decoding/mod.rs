//! Decoding: turning next-character scores back into text.

pub mod sampler;

pub use sampler::{softmax, top_k, Sampler};
