//! Lazy (input, target) batch generation over an encoded corpus.
//!
//! The usable prefix of the corpus (the largest multiple of `n_seqs × n_steps`)
//! is viewed as `n_seqs` rows. A window of `n_steps` columns slides across the
//! rows without overlap; every window position yields one batch.
//!
//! ```text
//! row:     a b c a b c a b c
//! window0: a b c          target: b c a
//! window1:       a b c    target: b c a
//! window2:             a b c      target: b c a  (wraps to row start)
//! ```

use ndarray::{Array2, ArrayView2};

use crate::error::{ChargenError, Result};

/// One (input, target) pair, each of shape `(n_seqs, n_steps)`.
#[derive(Clone, Debug, PartialEq)]
pub struct Batch {
    pub input: Array2<usize>,
    pub target: Array2<usize>,
}

/// Restartable iterator over the batches of an encoded corpus.
#[derive(Clone, Debug)]
pub struct Batches<'a> {
    rows: ArrayView2<'a, usize>,
    n_steps: usize,
    cursor: usize,
}

/// Cut `encoded` into batches of `n_seqs` sequences × `n_steps` steps.
///
/// A corpus shorter than one batch yields no batches.
pub fn batches(encoded: &[usize], n_seqs: usize, n_steps: usize) -> Result<Batches<'_>> {
    if n_seqs == 0 || n_steps == 0 {
        return Err(ChargenError::InvalidInput(format!(
            "batch shape must be non-zero (got {} × {})",
            n_seqs, n_steps
        )));
    }

    let per_batch = n_seqs.checked_mul(n_steps).ok_or_else(|| {
        ChargenError::InvalidInput(format!(
            "batch shape {} × {} overflows the address space",
            n_seqs, n_steps
        ))
    })?;
    let usable = (encoded.len() / per_batch) * per_batch;
    let rows = ArrayView2::from_shape((n_seqs, usable / n_seqs), &encoded[..usable])
        .map_err(|e| ChargenError::InvalidInput(e.to_string()))?;

    Ok(Batches {
        rows,
        n_steps,
        cursor: 0,
    })
}

impl<'a> Batches<'a> {
    /// Rewind to the first window.
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Total number of windows in one pass.
    pub fn total(&self) -> usize {
        self.rows.ncols() / self.n_steps
    }

    fn row_len(&self) -> usize {
        self.rows.ncols()
    }
}

impl<'a> Iterator for Batches<'a> {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        if self.cursor >= self.total() {
            return None;
        }

        let start = self.cursor * self.n_steps;
        let rows = self.rows;
        let (n_seqs, n_steps, row_len) = (rows.nrows(), self.n_steps, self.row_len());
        self.cursor += 1;

        let input = Array2::from_shape_fn((n_seqs, n_steps), |(r, c)| rows[[r, start + c]]);
        let target = Array2::from_shape_fn((n_seqs, n_steps), |(r, c)| {
            rows[[r, (start + c + 1) % row_len]]
        });

        Some(Batch { input, target })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.total().saturating_sub(self.cursor);
        (left, Some(left))
    }
}

impl<'a> ExactSizeIterator for Batches<'a> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::vocab::Vocabulary;

    #[test]
    fn test_abc_first_batch() {
        let vocab = Vocabulary::from_text("abcabcabc").unwrap();
        let encoded = vocab.encode("abcabcabc").unwrap();
        let mut it = batches(&encoded, 1, 3).unwrap();
        assert_eq!(it.len(), 3);

        let first = it.next().unwrap();
        let input: Vec<usize> = first.input.iter().copied().collect();
        let target: Vec<usize> = first.target.iter().copied().collect();
        assert_eq!(vocab.decode(&input).unwrap(), "abc");
        assert_eq!(vocab.decode(&target).unwrap(), "bca");
    }

    #[test]
    fn test_short_corpus_yields_nothing() {
        let encoded = vec![0, 1, 2, 3, 4];
        let mut it = batches(&encoded, 2, 3).unwrap();
        assert_eq!(it.len(), 0);
        assert!(it.next().is_none());
    }

    #[test]
    fn test_zero_shape_rejected() {
        let encoded = vec![0; 10];
        assert!(batches(&encoded, 0, 3).is_err());
        assert!(batches(&encoded, 2, 0).is_err());
    }

    #[test]
    fn test_overflowing_shape_rejected() {
        let encoded = vec![0; 16];
        let half = 1usize << (usize::BITS / 2);
        let err = batches(&encoded, half, half).unwrap_err();
        assert!(matches!(err, ChargenError::InvalidInput(_)));
        assert!(batches(&encoded, usize::MAX, 2).is_err());
    }

    #[test]
    fn test_batch_count_and_shape() {
        let encoded: Vec<usize> = (0..103).collect();
        let it = batches(&encoded, 4, 5).unwrap();
        // usable = 100, rows of 25, 5 windows
        assert_eq!(it.len(), 103 / (4 * 5));
        for batch in it {
            assert_eq!(batch.input.dim(), (4, 5));
            assert_eq!(batch.target.dim(), (4, 5));
        }
    }

    #[test]
    fn test_target_is_shifted_input() {
        let encoded: Vec<usize> = (0..48).collect();
        let all: Vec<Batch> = batches(&encoded, 2, 4).unwrap().collect();
        assert_eq!(all.len(), 6);

        let row_len = 24;
        for (k, batch) in all.iter().enumerate() {
            for r in 0..2 {
                for c in 0..3 {
                    assert_eq!(batch.target[[r, c]], batch.input[[r, c + 1]]);
                }
                // Last column comes from the next window, or wraps to the row start.
                let expected = r * row_len + ((k + 1) * 4) % row_len;
                assert_eq!(batch.target[[r, 3]], expected);
            }
        }
        // Final window wraps to each row's first element.
        assert_eq!(all[5].target[[0, 3]], 0);
        assert_eq!(all[5].target[[1, 3]], 24);
    }

    #[test]
    fn test_reset_restarts() {
        let encoded: Vec<usize> = (0..12).collect();
        let mut it = batches(&encoded, 1, 4).unwrap();
        let first: Vec<Batch> = it.by_ref().collect();
        assert!(it.next().is_none());

        it.reset();
        let second: Vec<Batch> = it.collect();
        assert_eq!(first, second);
    }
}
