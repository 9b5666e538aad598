//! Corpus loading, encoding, and the train/validation split.

use std::path::Path;

use ndarray::Array2;

use crate::data::vocab::Vocabulary;
use crate::error::{ChargenError, Result};

/// An encoded text corpus together with the vocabulary that encodes it.
#[derive(Clone, Debug)]
pub struct Corpus {
    pub vocab: Vocabulary,
    pub encoded: Vec<usize>,
}

impl Corpus {
    pub fn from_text(text: &str) -> Result<Self> {
        let vocab = Vocabulary::from_text(text)?;
        let encoded = vocab.encode(text)?;
        Ok(Self { vocab, encoded })
    }

    /// Read a whole text file into memory and encode it.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        tracing::debug!("read {} bytes from {}", text.len(), path.display());
        Self::from_text(&text)
    }

    pub fn len(&self) -> usize {
        self.encoded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.encoded.is_empty()
    }

    /// Split into (training, validation) slices. The last `val_frac` of the
    /// corpus validates.
    pub fn split(&self, val_frac: f32) -> Result<(&[usize], &[usize])> {
        if !(0.0..1.0).contains(&val_frac) {
            return Err(ChargenError::InvalidInput(format!(
                "validation fraction must lie in [0, 1), got {}",
                val_frac
            )));
        }
        let train_len = (self.encoded.len() as f64 * (1.0 - val_frac as f64)).round() as usize;
        let train_len = train_len.min(self.encoded.len());
        Ok(self.encoded.split_at(train_len))
    }
}

/// One-hot encode a column of codes: `(n, vocab_size)` with a single 1.0 per row.
pub fn one_hot(codes: impl ExactSizeIterator<Item = usize>, vocab_size: usize) -> Array2<f32> {
    let mut out = Array2::zeros((codes.len(), vocab_size));
    for (row, code) in codes.enumerate() {
        out[[row, code]] = 1.0;
    }
    out
}
