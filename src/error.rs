//! Error type shared by every stage of the generator.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChargenError {
    /// Malformed argument, empty corpus, bad configuration value.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A character that the vocabulary has never seen.
    #[error("unknown character: {0:?}")]
    UnknownCharacter(char),

    /// Training produced a non-finite loss.
    #[error("training diverged at step {step} (loss = {loss})")]
    Diverged { step: usize, loss: f32 },

    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ChargenError>;

impl From<bincode::Error> for ChargenError {
    fn from(e: bincode::Error) -> Self {
        ChargenError::Checkpoint(e.to_string())
    }
}
