//! Data module: vocabulary, corpus loading, and batch generation.

pub mod batches;
pub mod corpus;
pub mod vocab;

pub use batches::{batches, Batch, Batches};
pub use corpus::{one_hot, Corpus};
pub use vocab::Vocabulary;
