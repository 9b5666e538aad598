//! chargen: train a character-level LSTM on a text file and sample from it.
//!
//! This is the CLI binary entry point.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chargen::config::{
    DEFAULT_BATCH_SIZE, DEFAULT_CLIP, DEFAULT_DROPOUT, DEFAULT_EPOCHS, DEFAULT_HIDDEN,
    DEFAULT_LAYERS, DEFAULT_LR, DEFAULT_PRINT_EVERY, DEFAULT_SEED, DEFAULT_SEQ_LEN,
    DEFAULT_TOP_K, DEFAULT_VAL_FRAC,
};
use chargen::learning::TrainConfig;
use chargen::runtime::{self, Checkpoint, Topology};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Character-level LSTM text generator.
#[derive(Parser, Debug)]
#[command(name = "chargen", version, about = "Character-level LSTM text generation")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train on a corpus, save a checkpoint, and print a sample.
    Train(TrainArgs),

    /// Load a checkpoint and print generated text.
    Sample(SampleArgs),
}

#[derive(Args, Debug)]
struct TrainArgs {
    /// Plain-text corpus.
    corpus: PathBuf,

    #[arg(long, default_value_t = DEFAULT_EPOCHS)]
    epochs: usize,

    /// Sequences per batch.
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Steps per sequence.
    #[arg(long, default_value_t = DEFAULT_SEQ_LEN)]
    seq_len: usize,

    #[arg(long, default_value_t = DEFAULT_HIDDEN)]
    hidden: usize,

    #[arg(long, default_value_t = DEFAULT_LAYERS)]
    layers: usize,

    #[arg(long, default_value_t = DEFAULT_DROPOUT)]
    dropout: f32,

    #[arg(long, default_value_t = DEFAULT_LR)]
    lr: f32,

    /// Gradient-norm clip.
    #[arg(long, default_value_t = DEFAULT_CLIP)]
    clip: f32,

    /// Held-out validation fraction.
    #[arg(long, default_value_t = DEFAULT_VAL_FRAC)]
    val_frac: f32,

    #[arg(long, default_value_t = DEFAULT_PRINT_EVERY)]
    print_every: usize,

    #[arg(long, default_value_t = DEFAULT_SEED)]
    seed: u64,

    /// Checkpoint output path.
    #[arg(short, long, default_value = "rnn.net")]
    out: PathBuf,

    #[command(flatten)]
    sample: SampleOpts,
}

#[derive(Args, Debug)]
struct SampleArgs {
    /// Checkpoint written by `train`.
    checkpoint: PathBuf,

    #[arg(long, default_value_t = DEFAULT_SEED)]
    seed: u64,

    #[command(flatten)]
    sample: SampleOpts,
}

#[derive(Args, Debug)]
struct SampleOpts {
    /// Text to prime the network with.
    #[arg(long, default_value = "The")]
    prime: String,

    /// Characters to generate.
    #[arg(short = 'n', long = "len", default_value_t = 1000)]
    length: usize,

    /// Candidates per draw (0 = full distribution).
    #[arg(short = 'k', long, default_value_t = DEFAULT_TOP_K)]
    top_k: usize,
}

impl SampleOpts {
    fn top_k(&self) -> Option<usize> {
        (self.top_k > 0).then_some(self.top_k)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    tracing::info!("chargen v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Train(args) => train(args),
        Command::Sample(args) => sample(args),
    }
}

fn train(args: TrainArgs) -> Result<()> {
    let topology = Topology {
        hidden_size: args.hidden,
        n_layers: args.layers,
        dropout: args.dropout,
    };
    let config = TrainConfig {
        epochs: args.epochs,
        batch_size: args.batch_size,
        seq_len: args.seq_len,
        lr: args.lr,
        clip: args.clip,
        val_frac: args.val_frac,
        print_every: args.print_every,
        seed: args.seed,
    };

    let run = runtime::train_on_file(&args.corpus, &topology, config)
        .with_context(|| format!("training on '{}' failed", args.corpus.display()))?;
    tracing::info!(
        "trained in {:.1} s ({} progress points)",
        run.total_time_ms / 1000.0,
        run.history.len()
    );

    Checkpoint::new(&run.vocab, &run.model)
        .save(&args.out)
        .with_context(|| format!("failed to write checkpoint '{}'", args.out.display()))?;

    let opts = &args.sample;
    let result = runtime::generate(
        &run.model,
        &run.vocab,
        &opts.prime,
        opts.length,
        opts.top_k(),
        args.seed,
    )
    .context("sampling failed")?;
    println!("{}", result.text);
    Ok(())
}

fn sample(args: SampleArgs) -> Result<()> {
    let (vocab, model) = Checkpoint::load(&args.checkpoint)
        .and_then(Checkpoint::into_parts)
        .with_context(|| format!("failed to load checkpoint '{}'", args.checkpoint.display()))?;

    let opts = &args.sample;
    let result = runtime::generate(&model, &vocab, &opts.prime, opts.length, opts.top_k(), args.seed)
        .context("sampling failed")?;
    tracing::info!(
        "generated {} characters in {:.1} ms ({:.1} chars/s)",
        result.generated,
        result.total_time_ms,
        result.chars_per_second
    );
    println!("{}", result.text);
    Ok(())
}
