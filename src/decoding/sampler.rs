//! Autoregressive top-k character sampling.
//!
//! Each iteration feeds the current character through the model (batch of
//! one, evaluation mode, state carried), turns the scores into a
//! distribution, keeps the k most likely characters, renormalises, draws
//! one, and feeds it back as the next input.

use ndarray::Array1;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

use crate::core::{CharModel, Mode, StateBank};
use crate::data::Vocabulary;
use crate::error::{ChargenError, Result};

/// Softmax a score vector into probabilities.
pub fn softmax(scores: &Array1<f32>) -> Array1<f32> {
    let max = scores.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exp: Array1<f32> = scores.mapv(|v| (v - max).exp());
    let sum: f32 = exp.sum();
    if sum > 0.0 && sum.is_finite() {
        exp / sum
    } else {
        Array1::from_vec(vec![1.0 / scores.len() as f32; scores.len()])
    }
}

/// Indices of the `k` largest probabilities, most likely first. Ties keep
/// the lower index first.
pub fn top_k(probs: &Array1<f32>, k: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..probs.len()).collect();
    indices.sort_by(|&a, &b| probs[b].total_cmp(&probs[a]));
    indices.truncate(k);
    indices
}

/// Samples text from a trained model.
pub struct Sampler<'m> {
    model: &'m CharModel,
    vocab: &'m Vocabulary,

    /// Candidate count per draw; `None` samples the full distribution.
    top_k: Option<usize>,
}

impl<'m> Sampler<'m> {
    /// `top_k` larger than the vocabulary is clamped to it; zero is rejected.
    pub fn new(model: &'m CharModel, vocab: &'m Vocabulary, top_k: Option<usize>) -> Result<Self> {
        if model.config.vocab_size != vocab.len() {
            return Err(ChargenError::InvalidInput(format!(
                "model scores {} characters but the vocabulary holds {}",
                model.config.vocab_size,
                vocab.len()
            )));
        }
        let top_k = match top_k {
            Some(0) => {
                return Err(ChargenError::InvalidInput("top_k must be at least 1".into()));
            }
            Some(k) if k > vocab.len() => {
                tracing::warn!("top_k {} exceeds vocabulary of {}; clamping", k, vocab.len());
                Some(vocab.len())
            }
            other => other,
        };
        Ok(Self { model, vocab, top_k })
    }

    pub fn top_k(&self) -> Option<usize> {
        self.top_k
    }

    /// Generate `length` characters starting from `seed`. The seed itself is
    /// not part of the output.
    pub fn generate<R: Rng + ?Sized>(&self, seed: char, length: usize, rng: &mut R) -> Result<String> {
        let mut state = self.model.init_state(1);
        let code = self.vocab.encode_char(seed)?;
        self.run(code, length, &mut state, rng)
    }

    /// Prime the state with `prime`, then generate `length` more characters.
    /// Returns the prime followed by the generated text.
    pub fn sample<R: Rng + ?Sized>(&self, prime: &str, length: usize, rng: &mut R) -> Result<String> {
        let codes = self.vocab.encode(prime)?;
        let (&last, warmup) = codes
            .split_last()
            .ok_or_else(|| ChargenError::InvalidInput("prime text must not be empty".into()))?;

        let mut state = self.model.init_state(1);
        for &code in warmup {
            self.model.forward_step(&[code], &mut state, Mode::Eval, rng)?;
        }

        let generated = self.run(last, length, &mut state, rng)?;
        tracing::debug!(
            "sampled {} characters after a {}-character prime",
            length,
            codes.len()
        );
        Ok(format!("{}{}", prime, generated))
    }

    fn run<R: Rng + ?Sized>(
        &self,
        mut code: usize,
        length: usize,
        state: &mut StateBank,
        rng: &mut R,
    ) -> Result<String> {
        let mut out = String::with_capacity(length);
        for _ in 0..length {
            code = self.next_code(code, state, rng)?;
            out.push(self.vocab.decode_code(code)?);
        }
        Ok(out)
    }

    /// Advance the state by one character and draw its successor.
    pub fn next_code<R: Rng + ?Sized>(
        &self,
        code: usize,
        state: &mut StateBank,
        rng: &mut R,
    ) -> Result<usize> {
        let trace = self.model.forward_step(&[code], state, Mode::Eval, rng)?;
        let probs = softmax(&trace.scores.row(0).to_owned());

        let k = self.top_k.unwrap_or(probs.len());
        let candidates = top_k(&probs, k);
        if candidates.len() == 1 {
            return Ok(candidates[0]);
        }

        let weights: Vec<f32> = candidates.iter().map(|&i| probs[i]).collect();
        match WeightedIndex::new(&weights) {
            Ok(dist) => Ok(candidates[dist.sample(rng)]),
            // Every candidate underflowed to zero: fall back to the most likely.
            Err(_) => Ok(candidates[0]),
        }
    }
}
