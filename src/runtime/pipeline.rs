//! End-to-end runs: corpus in → trained model out, and model in → text out.
//!
//! Orchestrates the four stages:
//! 1. Vocabulary + encoding (`data`)
//! 2. Batching + training (`learning`)
//! 3. Stacked LSTM (`core`)
//! 4. Top-k sampling (`decoding`)

use std::path::Path;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::{DEFAULT_DROPOUT, DEFAULT_HIDDEN, DEFAULT_LAYERS};
use crate::core::{CharModel, ModelConfig};
use crate::data::{Corpus, Vocabulary};
use crate::decoding::Sampler;
use crate::error::Result;
use crate::learning::{Progress, TrainConfig, Trainer};

/// Model topology overrides; the vocabulary size comes from the corpus.
#[derive(Clone, Debug)]
pub struct Topology {
    pub hidden_size: usize,
    pub n_layers: usize,
    pub dropout: f32,
}

impl Default for Topology {
    fn default() -> Self {
        Self {
            hidden_size: DEFAULT_HIDDEN,
            n_layers: DEFAULT_LAYERS,
            dropout: DEFAULT_DROPOUT,
        }
    }
}

/// Output of a training run.
#[derive(Debug)]
pub struct TrainRun {
    pub vocab: Vocabulary,
    pub model: CharModel,
    pub history: Vec<Progress>,

    /// Wall-clock training time.
    pub total_time_ms: f32,
}

/// Train a fresh model on `corpus`.
pub fn train_on_corpus(corpus: &Corpus, topology: &Topology, config: TrainConfig) -> Result<TrainRun> {
    let start = Instant::now();
    let model_config = ModelConfig {
        vocab_size: corpus.vocab.len(),
        hidden_size: topology.hidden_size,
        n_layers: topology.n_layers,
        dropout: topology.dropout,
    };

    // Weight init and dropout draw from separate streams of the same seed.
    let mut init_rng = StdRng::seed_from_u64(config.seed.wrapping_add(1));
    let mut model = CharModel::new(model_config, &mut init_rng)?;
    tracing::info!(
        "model: {} layers × {} hidden, vocab {}, {} parameters",
        model.config.n_layers,
        model.config.hidden_size,
        model.config.vocab_size,
        model.param_count()
    );

    let (train, val) = corpus.split(config.val_frac)?;
    let mut trainer = Trainer::new(config, &model)?;
    let history = trainer.fit(&mut model, train, val)?;

    Ok(TrainRun {
        vocab: corpus.vocab.clone(),
        model,
        history,
        total_time_ms: start.elapsed().as_secs_f32() * 1000.0,
    })
}

/// Read `path` and train on it.
pub fn train_on_file(path: &Path, topology: &Topology, config: TrainConfig) -> Result<TrainRun> {
    let corpus = Corpus::from_path(path)?;
    tracing::info!(
        "corpus: {} characters, {} distinct",
        corpus.len(),
        corpus.vocab.len()
    );
    train_on_corpus(&corpus, topology, config)
}

/// Generated text with timing.
#[derive(Debug)]
pub struct GenerationResult {
    pub text: String,

    /// Number of generated characters (excluding the prime).
    pub generated: usize,

    pub total_time_ms: f32,

    pub chars_per_second: f32,
}

/// Prime with `prime` and sample `length` characters.
pub fn generate(
    model: &CharModel,
    vocab: &Vocabulary,
    prime: &str,
    length: usize,
    top_k: Option<usize>,
    seed: u64,
) -> Result<GenerationResult> {
    let start = Instant::now();
    let sampler = Sampler::new(model, vocab, top_k)?;
    let mut rng = StdRng::seed_from_u64(seed);
    let text = sampler.sample(prime, length, &mut rng)?;

    let elapsed = start.elapsed().as_secs_f32() * 1000.0;
    Ok(GenerationResult {
        text,
        generated: length,
        total_time_ms: elapsed,
        chars_per_second: if elapsed > 0.0 {
            length as f32 / (elapsed / 1000.0)
        } else {
            0.0
        },
    })
}
