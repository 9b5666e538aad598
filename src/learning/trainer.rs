//! Training loop: truncated BPTT over batch windows with periodic validation.
//!
//! Per epoch the recurrent state starts at zero and is carried from batch to
//! batch; gradients stop at each window boundary. Every `print_every` steps a
//! full validation pass runs in evaluation mode and a [`Progress`] line is
//! logged.

use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::{
    DEFAULT_BATCH_SIZE, DEFAULT_CLIP, DEFAULT_EPOCHS, DEFAULT_LR, DEFAULT_PRINT_EVERY,
    DEFAULT_SEED, DEFAULT_SEQ_LEN, DEFAULT_VAL_FRAC,
};
use crate::core::{CharModel, Mode, StateBank, StepTrace};
use crate::data::{batches, Batch};
use crate::error::{ChargenError, Result};
use crate::learning::loss::softmax_cross_entropy;
use crate::learning::optim::{clip_grad_norm, Adam, AdamConfig};

/// Training hyperparameters.
#[derive(Clone, Debug)]
pub struct TrainConfig {
    pub epochs: usize,

    /// Sequences per batch.
    pub batch_size: usize,

    /// Steps per sequence (BPTT window).
    pub seq_len: usize,

    pub lr: f32,

    /// Maximum global gradient norm.
    pub clip: f32,

    /// Fraction of the corpus held out for validation.
    pub val_frac: f32,

    /// Validate and report every this many steps.
    pub print_every: usize,

    /// Seed for dropout masks.
    pub seed: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: DEFAULT_EPOCHS,
            batch_size: DEFAULT_BATCH_SIZE,
            seq_len: DEFAULT_SEQ_LEN,
            lr: DEFAULT_LR,
            clip: DEFAULT_CLIP,
            val_frac: DEFAULT_VAL_FRAC,
            print_every: DEFAULT_PRINT_EVERY,
            seed: DEFAULT_SEED,
        }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 || self.seq_len == 0 || self.print_every == 0 {
            return Err(ChargenError::InvalidInput(
                "batch size, sequence length and print interval must be non-zero".into(),
            ));
        }
        if !(self.lr.is_finite() && self.lr > 0.0 && self.clip > 0.0) {
            return Err(ChargenError::InvalidInput(format!(
                "learning rate and clip must be positive (lr = {}, clip = {})",
                self.lr, self.clip
            )));
        }
        if !(0.0..1.0).contains(&self.val_frac) {
            return Err(ChargenError::InvalidInput(format!(
                "validation fraction must lie in [0, 1), got {}",
                self.val_frac
            )));
        }
        Ok(())
    }
}

/// One reported point of the training curve.
#[derive(Clone, Debug, PartialEq)]
pub struct Progress {
    /// 1-based epoch.
    pub epoch: usize,

    /// 1-based global step (batch) counter.
    pub step: usize,

    /// Training loss of the batch at this step.
    pub loss: f32,

    /// Mean validation loss; `None` when the validation split holds no batch.
    pub val_loss: Option<f32>,
}

/// Owns the optimiser and the dropout RNG across epochs.
pub struct Trainer {
    pub config: TrainConfig,
    optimizer: Adam,
    rng: StdRng,
    step: usize,
}

impl Trainer {
    pub fn new(config: TrainConfig, model: &CharModel) -> Result<Self> {
        config.validate()?;
        let optimizer = Adam::new(
            AdamConfig {
                lr: config.lr,
                ..Default::default()
            },
            &model.params,
        );
        let rng = StdRng::seed_from_u64(config.seed);
        Ok(Self {
            config,
            optimizer,
            rng,
            step: 0,
        })
    }

    /// Global steps taken so far.
    pub fn steps(&self) -> usize {
        self.step
    }

    /// Train for `config.epochs` epochs on `train`, validating on `val`.
    pub fn fit(
        &mut self,
        model: &mut CharModel,
        train: &[usize],
        val: &[usize],
    ) -> Result<Vec<Progress>> {
        let (n_seqs, n_steps) = (self.config.batch_size, self.config.seq_len);
        let mut train_batches = batches(train, n_seqs, n_steps)?;
        if train_batches.len() == 0 {
            return Err(ChargenError::InvalidInput(format!(
                "training split of {} characters is shorter than one {}×{} batch",
                train.len(),
                n_seqs,
                n_steps
            )));
        }
        if batches(val, n_seqs, n_steps)?.len() == 0 {
            tracing::warn!(
                "validation split of {} characters holds no full batch; val loss unavailable",
                val.len()
            );
        }

        tracing::info!(
            "training {} parameters on {} characters ({} batches/epoch, {} epochs)",
            model.param_count(),
            train.len(),
            train_batches.len(),
            self.config.epochs
        );

        let mut history = Vec::new();
        let mut state = model.init_state(n_seqs);
        for epoch in 1..=self.config.epochs {
            state.reset_all();
            train_batches.reset();

            for batch in train_batches.by_ref() {
                let loss = self.train_batch(model, &batch, &mut state)?;
                self.step += 1;
                tracing::debug!(epoch, step = self.step, loss, "batch done");

                if self.step % self.config.print_every == 0 {
                    let val_loss = evaluate(model, val, n_seqs, n_steps)?;
                    let val_text = val_loss
                        .map(|v| format!("{:.4}", v))
                        .unwrap_or_else(|| "n/a".to_string());
                    tracing::info!(
                        "Epoch: {}/{}... Step: {}... Loss: {:.4}... Val Loss: {}",
                        epoch,
                        self.config.epochs,
                        self.step,
                        loss,
                        val_text
                    );
                    history.push(Progress {
                        epoch,
                        step: self.step,
                        loss,
                        val_loss,
                    });
                }
            }
        }

        Ok(history)
    }

    /// One optimisation step on a single batch. `state` carries over from the
    /// previous batch and is left at this batch's final state.
    pub fn train_batch(
        &mut self,
        model: &mut CharModel,
        batch: &Batch,
        state: &mut StateBank,
    ) -> Result<f32> {
        let traces = model.forward_window(&batch.input, state, Mode::Train, &mut self.rng)?;
        let (loss, d_scores) = window_loss(&traces, &batch.target);
        if !loss.is_finite() || !state.all_healthy() {
            return Err(ChargenError::Diverged {
                step: self.step + 1,
                loss,
            });
        }

        let mut grads = model.backward_window(&traces, &d_scores);
        let norm = clip_grad_norm(&mut grads, self.config.clip);
        if norm > self.config.clip {
            tracing::trace!(norm, clip = self.config.clip, "gradient clipped");
        }
        self.optimizer.step(&mut model.params, &grads);
        Ok(loss)
    }
}

/// Mean cross-entropy over every (sequence, step) target of a window, with
/// the per-step score gradients.
fn window_loss(
    traces: &[StepTrace],
    target: &Array2<usize>,
) -> (f32, Vec<Array2<f32>>) {
    let scale = 1.0 / target.len() as f32;
    let mut total = 0.0;
    let mut d_scores = Vec::with_capacity(traces.len());
    for (trace, column) in traces.iter().zip(target.axis_iter(Axis(1))) {
        let (loss, grad) = softmax_cross_entropy(&trace.scores, &column.to_vec(), scale);
        total += loss;
        d_scores.push(grad);
    }
    (total, d_scores)
}

/// Mean loss over every batch of `data` in evaluation mode, with the state
/// carried across batches from a fresh zero start. `None` if `data` holds no
/// full batch.
pub fn evaluate(
    model: &CharModel,
    data: &[usize],
    n_seqs: usize,
    n_steps: usize,
) -> Result<Option<f32>> {
    let mut state = model.init_state(n_seqs);
    // Evaluation mode never draws from the RNG.
    let mut rng = StdRng::seed_from_u64(0);
    let mut losses = Vec::new();

    for batch in batches(data, n_seqs, n_steps)? {
        let traces = model.forward_window(&batch.input, &mut state, Mode::Eval, &mut rng)?;
        losses.push(window_loss(&traces, &batch.target).0);
    }

    if losses.is_empty() {
        Ok(None)
    } else {
        Ok(Some(losses.iter().sum::<f32>() / losses.len() as f32))
    }
}
