//! Training Loop
//!
//! Teacher-forced training for both tasks through one loop.
//!
//! ## Shifting
//!
//! ```text
//! language model (window of seq_len):
//!   input:   [a, b, c, d]       scored with CausalMask(4)
//!   targets: [b, c, d, e]
//!
//! sequence-to-sequence (target = [<bos>, x, y, <eos>]):
//!   target input:  [<bos>, x, y]  scored with CausalMask(3)
//!   target output: [x, y, <eos>]
//! ```
//!
//! ## Masked Loss
//!
//! Cross-entropy is averaged over the target positions whose id is not the
//! pad id, across the whole batch. Padded positions contribute neither loss
//! nor gradient. A batch with no real target positions has loss 0 and skips
//! the optimizer step.
//!
//! ## Epoch Loss
//!
//! ```text
//! epoch_loss = Σ (batch_loss × batch_examples) / total_examples
//! perplexity = exp(epoch_loss)
//! ```
//!
//! ## Parallelism
//!
//! Rows of a batch are scored and back-propagated in parallel with rayon.
//! Row gradients are summed in row order, so results do not depend on
//! thread scheduling.
//!
//! ## Example
//!
//! ```rust,no_run
//! use tokenfill::models::{BagLmConfig, ContextBagLm};
//! use tokenfill::train::{LanguageModeling, Trainer, TrainingConfig};
//! use tokenfill::LmCorpus;
//!
//! let config = TrainingConfig::tiny();
//! let corpus = LmCorpus::from_file("corpus.txt", config.seq_len, config.min_freq)?;
//! let model = ContextBagLm::new(BagLmConfig::new(corpus.vocab.len()));
//!
//! let mut objective = LanguageModeling::new(model);
//! let mut trainer = Trainer::new(config)?;
//! let reports = trainer.fit(&mut objective, &corpus.examples, None, None)?;
//! println!("final loss: {:.4}", reports[reports.len() - 1].train_loss);
//! # Ok::<(), tokenfill::Error>(())
//! ```

use crate::batch::{Batch, BatchCollator};
use crate::corpus::Example;
use crate::error::{Error, Result};
use crate::gradients::{accumulate, clip_gradients};
use crate::mask::CausalMask;
use crate::optimizer::AdamWOptimizer;
use crate::scorer::{check_id_range, Parameters, TrainableLanguageScorer, TrainableSeq2SeqScorer};
use crate::tensor::{cross_entropy, softmax, Tensor};
use crate::training_logger::TrainingLogger;
use crate::vocab::PAD_ID;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Training configuration
///
/// # Presets
///
/// - **tiny**: a few epochs on short windows, for tests and smoke runs
/// - **small**: the default for the command-line tools
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Learning rate for AdamW
    pub learning_rate: f32,
    /// Number of passes through the training examples
    pub num_epochs: usize,
    /// Examples per batch
    pub batch_size: usize,
    /// Window length for the language-model task
    pub seq_len: usize,
    /// Minimum token frequency to enter the vocabulary
    pub min_freq: usize,
    /// Decoupled weight decay for 2-D parameters
    pub weight_decay: f32,
    /// Global gradient-norm limit (0 disables clipping)
    pub grad_clip: f32,
    /// Seed for the per-epoch shuffle
    pub seed: u64,
    /// Reshuffle the training examples every epoch
    pub shuffle: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self::small()
    }
}

impl TrainingConfig {
    pub fn tiny() -> Self {
        Self {
            learning_rate: 1e-2,
            num_epochs: 3,
            batch_size: 8,
            seq_len: 8,
            min_freq: 1,
            weight_decay: 0.0,
            grad_clip: 1.0,
            seed: 42,
            shuffle: true,
        }
    }

    pub fn small() -> Self {
        Self {
            learning_rate: 5e-3,
            num_epochs: 10,
            batch_size: 32,
            seq_len: 32,
            min_freq: 1,
            weight_decay: 0.01,
            grad_clip: 1.0,
            seed: 42,
            shuffle: true,
        }
    }

    /// Look up a preset by name (`tiny` or `small`)
    pub fn preset(name: &str) -> Result<Self> {
        match name {
            "tiny" => Ok(Self::tiny()),
            "small" => Ok(Self::small()),
            other => Err(Error::InvalidConfig(format!(
                "unknown preset '{}' (expected tiny or small)",
                other
            ))),
        }
    }

    /// Reject settings the loop cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be at least 1".into()));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !self.grad_clip.is_finite() || self.grad_clip < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "grad_clip must be non-negative, got {}",
                self.grad_clip
            )));
        }
        Ok(())
    }
}

/// Logits for one batch row and the ids they are scored against
pub struct RowOutput {
    /// `[positions, vocab_size]`
    pub logits: Tensor,
    /// One target id per logit row; pad positions are ignored
    pub targets: Vec<usize>,
}

/// How a task turns a padded batch into scored rows
///
/// Implemented by [`LanguageModeling`] and [`Translation`]; the trainer
/// only ever talks to this trait.
pub trait Objective: Sync {
    /// Size of the output vocabulary
    fn vocab_size(&self) -> usize;

    /// Length of the sequence the scorer sees for this batch
    fn input_len(&self, batch: &Batch) -> usize;

    /// Fail if any id of the batch is outside its vocabulary
    fn check_batch(&self, batch: &Batch) -> Result<()>;

    fn forward_row(&self, batch: &Batch, row: usize, causal: &CausalMask) -> RowOutput;

    /// Parameter gradients for one row, given the loss gradient w.r.t. its logits
    fn backward_row(
        &self,
        batch: &Batch,
        row: usize,
        causal: &CausalMask,
        grad_logits: &Tensor,
    ) -> Vec<Tensor>;

    fn parameters(&self) -> Vec<&Tensor>;
    fn parameters_mut(&mut self) -> Vec<&mut Tensor>;
}

fn check_ids(side: &'static str, rows: &[Vec<usize>], vocab_size: usize) -> Result<()> {
    rows.iter()
        .try_for_each(|row| check_id_range(side, row, vocab_size))
}

/// Next-token prediction over windows: input = window, targets = shifted window
pub struct LanguageModeling<M> {
    pub model: M,
}

impl<M: TrainableLanguageScorer> LanguageModeling<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }

    pub fn into_inner(self) -> M {
        self.model
    }
}

impl<M: TrainableLanguageScorer> Objective for LanguageModeling<M> {
    fn vocab_size(&self) -> usize {
        self.model.vocab_size()
    }

    fn input_len(&self, batch: &Batch) -> usize {
        batch.source.len
    }

    fn check_batch(&self, batch: &Batch) -> Result<()> {
        let v = self.model.vocab_size();
        check_ids("input", &batch.source.ids, v)?;
        check_ids("target", &batch.target.ids, v)
    }

    fn forward_row(&self, batch: &Batch, row: usize, causal: &CausalMask) -> RowOutput {
        RowOutput {
            logits: self
                .model
                .score(&batch.source.ids[row], causal, &batch.source.padding[row]),
            targets: batch.target.ids[row].clone(),
        }
    }

    fn backward_row(
        &self,
        batch: &Batch,
        row: usize,
        causal: &CausalMask,
        grad_logits: &Tensor,
    ) -> Vec<Tensor> {
        self.model.backward(
            &batch.source.ids[row],
            causal,
            &batch.source.padding[row],
            grad_logits,
        )
    }

    fn parameters(&self) -> Vec<&Tensor> {
        self.model.parameters()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        self.model.parameters_mut()
    }
}

/// Teacher-forced translation: target input = `target[..len-1]`,
/// target output = `target[1..]`
pub struct Translation<M> {
    pub model: M,
}

impl<M: TrainableSeq2SeqScorer> Translation<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }

    pub fn into_inner(self) -> M {
        self.model
    }
}

impl<M: TrainableSeq2SeqScorer> Objective for Translation<M> {
    fn vocab_size(&self) -> usize {
        self.model.target_vocab_size()
    }

    fn input_len(&self, batch: &Batch) -> usize {
        batch.target.len.saturating_sub(1)
    }

    fn check_batch(&self, batch: &Batch) -> Result<()> {
        check_ids("source", &batch.source.ids, self.model.source_vocab_size())?;
        check_ids("target", &batch.target.ids, self.model.target_vocab_size())
    }

    fn forward_row(&self, batch: &Batch, row: usize, causal: &CausalMask) -> RowOutput {
        let n = self.input_len(batch);
        let target = &batch.target.ids[row];
        let memory = self
            .model
            .encode(&batch.source.ids[row], &batch.source.padding[row]);
        RowOutput {
            logits: self.model.decode(
                &target[..n],
                &memory,
                causal,
                &batch.target.padding[row][..n],
            ),
            targets: target[1..].to_vec(),
        }
    }

    fn backward_row(
        &self,
        batch: &Batch,
        row: usize,
        causal: &CausalMask,
        grad_logits: &Tensor,
    ) -> Vec<Tensor> {
        let n = self.input_len(batch);
        self.model.backward(
            &batch.source.ids[row],
            &batch.source.padding[row],
            &batch.target.ids[row][..n],
            causal,
            &batch.target.padding[row][..n],
            grad_logits,
        )
    }

    fn parameters(&self) -> Vec<&Tensor> {
        self.model.parameters()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        self.model.parameters_mut()
    }
}

/// Result of [`masked_cross_entropy`]
pub struct MaskedLoss {
    /// Mean loss over non-pad target positions (0 when there are none)
    pub loss: f32,
    /// Number of non-pad target positions
    pub tokens: usize,
    /// Gradient of `loss` w.r.t. each row's logits
    pub grads: Vec<Tensor>,
}

/// Cross-entropy averaged over every non-pad target position of a batch
///
/// ```text
/// loss      = -(1/N) Σ log softmax(logits[t])[target[t]]   (target[t] != pad)
/// ∂loss/∂z  = (softmax(z) - onehot(target)) / N            (0 at pad targets)
/// ```
pub fn masked_cross_entropy(rows: &[RowOutput]) -> MaskedLoss {
    let tokens: usize = rows
        .iter()
        .map(|r| r.targets.iter().filter(|&&t| t != PAD_ID).count())
        .sum();

    let mut grads: Vec<Tensor> = rows.iter().map(|r| Tensor::zeros_like(&r.logits)).collect();
    if tokens == 0 {
        return MaskedLoss {
            loss: 0.0,
            tokens,
            grads,
        };
    }

    let scale = 1.0 / tokens as f32;
    let mut total = 0.0;
    for (row, grad) in rows.iter().zip(grads.iter_mut()) {
        for (t, &target) in row.targets.iter().enumerate() {
            if target == PAD_ID {
                continue;
            }
            total += cross_entropy(row.logits.row(t), target);
            let probs = softmax(row.logits.row(t));
            for (g, &p) in grad.row_mut(t).iter_mut().zip(&probs) {
                *g = p * scale;
            }
            grad.row_mut(t)[target] -= scale;
        }
    }

    MaskedLoss {
        loss: total * scale,
        tokens,
        grads,
    }
}

/// Summary of one training epoch
#[derive(Clone, Debug, PartialEq)]
pub struct EpochReport {
    /// 1-based epoch number
    pub epoch: usize,
    pub train_loss: f32,
    pub train_perplexity: f32,
    pub val_loss: Option<f32>,
    pub val_perplexity: Option<f32>,
    /// Optimizer steps taken during the epoch
    pub steps: usize,
}

/// Outcome of one training batch
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BatchOutcome {
    pub loss: f32,
    pub tokens: usize,
    /// Gradient norm before clipping (0 if no step was taken)
    pub grad_norm: f32,
    pub stepped: bool,
}

/// Drives epochs of training over an [`Objective`]
pub struct Trainer {
    config: TrainingConfig,
    collator: BatchCollator,
    optimizer: Option<AdamWOptimizer>,
    epochs_completed: usize,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Result<Self> {
        config.validate()?;
        let collator = BatchCollator::new(config.batch_size, config.shuffle, config.seed)?;
        Ok(Self {
            config,
            collator,
            optimizer: None,
            epochs_completed: 0,
        })
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn epochs_completed(&self) -> usize {
        self.epochs_completed
    }

    /// Run `num_epochs` epochs, evaluating on `val` after each one
    pub fn fit<O: Objective>(
        &mut self,
        objective: &mut O,
        train: &[Example],
        val: Option<&[Example]>,
        mut logger: Option<&mut TrainingLogger>,
    ) -> Result<Vec<EpochReport>> {
        if train.is_empty() {
            return Err(Error::EmptyCorpus("training set".into()));
        }

        let mut reports = Vec::with_capacity(self.config.num_epochs);
        for _ in 0..self.config.num_epochs {
            let (train_loss, steps) = self.train_epoch(objective, train)?;
            let val_loss = match val {
                Some(examples) if !examples.is_empty() => {
                    Some(evaluate_loss(objective, examples, self.config.batch_size)?)
                }
                _ => None,
            };

            self.epochs_completed += 1;
            let report = EpochReport {
                epoch: self.epochs_completed,
                train_loss,
                train_perplexity: train_loss.exp(),
                val_loss,
                val_perplexity: val_loss.map(f32::exp),
                steps,
            };
            log::info!(
                "epoch {}: train loss {:.4}, perplexity {:.2}",
                report.epoch,
                report.train_loss,
                report.train_perplexity
            );
            if let Some(logger) = logger.as_deref_mut() {
                logger.log_epoch(
                    report.epoch,
                    self.config.learning_rate,
                    train_loss,
                    val_loss,
                )?;
            }
            reports.push(report);
        }
        Ok(reports)
    }

    /// One pass over `train`; returns the example-weighted loss and the step count
    pub fn train_epoch<O: Objective>(
        &mut self,
        objective: &mut O,
        train: &[Example],
    ) -> Result<(f32, usize)> {
        let mut weighted_loss = 0.0;
        let mut steps = 0;
        let batches: Vec<Batch> = self.collator.epoch(train).collect();
        for (i, batch) in batches.iter().enumerate() {
            let outcome = self.train_batch(objective, batch)?;
            log::debug!(
                "batch {}/{}: loss {:.4} over {} tokens, grad norm {:.4}",
                i + 1,
                batches.len(),
                outcome.loss,
                outcome.tokens,
                outcome.grad_norm
            );
            weighted_loss += outcome.loss * batch.size() as f32;
            if outcome.stepped {
                steps += 1;
            }
        }
        Ok((weighted_loss / train.len() as f32, steps))
    }

    /// Forward, masked loss, backward and one optimizer step
    pub fn train_batch<O: Objective>(&mut self, objective: &mut O, batch: &Batch) -> Result<BatchOutcome> {
        objective.check_batch(batch)?;
        let causal = CausalMask::new(objective.input_len(batch));

        let rows = forward_batch(objective, batch, &causal);
        let loss = masked_cross_entropy(&rows);
        if loss.tokens == 0 {
            return Ok(BatchOutcome {
                loss: 0.0,
                tokens: 0,
                grad_norm: 0.0,
                stepped: false,
            });
        }

        let shared: &O = objective;
        let row_grads: Vec<Vec<Tensor>> = (0..batch.size())
            .into_par_iter()
            .map(|row| shared.backward_row(batch, row, &causal, &loss.grads[row]))
            .collect();

        let mut grads: Vec<Tensor> = objective
            .parameters()
            .into_iter()
            .map(Tensor::zeros_like)
            .collect();
        for row in &row_grads {
            accumulate(&mut grads, row);
        }
        let grad_norm = clip_gradients(&mut grads, self.config.grad_clip);

        let optimizer = self
            .optimizer
            .get_or_insert_with(|| AdamWOptimizer::new(&objective.parameters()));
        optimizer.step(
            objective.parameters_mut(),
            &grads,
            self.config.learning_rate,
            self.config.weight_decay,
        );

        Ok(BatchOutcome {
            loss: loss.loss,
            tokens: loss.tokens,
            grad_norm,
            stepped: true,
        })
    }
}

fn forward_batch<O: Objective>(objective: &O, batch: &Batch, causal: &CausalMask) -> Vec<RowOutput> {
    (0..batch.size())
        .into_par_iter()
        .map(|row| objective.forward_row(batch, row, causal))
        .collect()
}

/// Example-weighted mean loss over `examples` in corpus order, without updates
pub fn evaluate_loss<O: Objective>(objective: &O, examples: &[Example], batch_size: usize) -> Result<f32> {
    if examples.is_empty() {
        return Ok(0.0);
    }
    let mut collator = BatchCollator::sequential(batch_size)?;
    let mut weighted_loss = 0.0;
    for batch in collator.epoch(examples) {
        objective.check_batch(&batch)?;
        let causal = CausalMask::new(objective.input_len(&batch));
        let rows = forward_batch(objective, &batch, &causal);
        weighted_loss += masked_cross_entropy(&rows).loss * batch.size() as f32;
    }
    Ok(weighted_loss / examples.len() as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BagLmConfig, ContextBagLm, SourceBagTranslator, TranslatorConfig};
    use approx::assert_relative_eq;

    fn example(input: &[usize], target: &[usize]) -> Example {
        Example {
            input: input.to_vec(),
            target: target.to_vec(),
        }
    }

    fn row(logits: Vec<f32>, shape: Vec<usize>, targets: &[usize]) -> RowOutput {
        RowOutput {
            logits: Tensor::new(logits, shape),
            targets: targets.to_vec(),
        }
    }

    #[test]
    fn test_uniform_logits_give_log_vocab_loss() {
        let rows = vec![row(vec![0.0; 8], vec![2, 4], &[1, 3])];
        let loss = masked_cross_entropy(&rows);
        assert_eq!(loss.tokens, 2);
        assert_relative_eq!(loss.loss, 4.0f32.ln(), epsilon = 1e-6);
    }

    #[test]
    fn test_pad_targets_are_ignored() {
        let logits = vec![0.5, -1.0, 2.0, 0.0, 1.0, 3.0, -2.0, 0.1];
        let with_pad = masked_cross_entropy(&[row(logits.clone(), vec![2, 4], &[2, PAD_ID])]);
        let without = masked_cross_entropy(&[row(logits[..4].to_vec(), vec![1, 4], &[2])]);
        assert_eq!(with_pad.tokens, 1);
        assert_relative_eq!(with_pad.loss, without.loss, epsilon = 1e-6);
        assert!(with_pad.grads[0].row(1).iter().all(|&g| g == 0.0));
        assert_eq!(with_pad.grads[0].row(0), without.grads[0].row(0));
    }

    #[test]
    fn test_all_pad_batch_has_zero_loss() {
        let loss = masked_cross_entropy(&[row(vec![1.0; 6], vec![2, 3], &[0, 0])]);
        assert_eq!(loss.tokens, 0);
        assert_eq!(loss.loss, 0.0);
        assert!(loss.grads[0].data.iter().all(|&g| g == 0.0));
    }

    #[test]
    fn test_gradient_rows_sum_to_zero() {
        let loss = masked_cross_entropy(&[row(vec![0.3, -0.2, 1.5, 0.0, 0.7, 0.1], vec![2, 3], &[1, 2])]);
        for t in 0..2 {
            let sum: f32 = loss.grads[0].row(t).iter().sum();
            assert_relative_eq!(sum, 0.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_all_pad_batch_skips_optimizer_step() {
        let mut objective = LanguageModeling::new(ContextBagLm::new(BagLmConfig::new(5)));
        let before: Vec<Tensor> = objective.parameters().into_iter().cloned().collect();

        let examples = vec![example(&[0, 0], &[0, 0])];
        let batch = Batch::from_examples(&examples.iter().collect::<Vec<_>>());
        let mut trainer = Trainer::new(TrainingConfig::tiny()).unwrap();
        let outcome = trainer.train_batch(&mut objective, &batch).unwrap();

        assert!(!outcome.stepped);
        assert_eq!(outcome.loss, 0.0);
        let after: Vec<Tensor> = objective.parameters().into_iter().cloned().collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_out_of_range_id_is_fatal() {
        let mut objective = LanguageModeling::new(ContextBagLm::new(BagLmConfig::new(5)));
        let examples = vec![example(&[2, 3], &[3, 9])];
        let batch = Batch::from_examples(&examples.iter().collect::<Vec<_>>());
        let mut trainer = Trainer::new(TrainingConfig::tiny()).unwrap();
        let err = trainer.train_batch(&mut objective, &batch).unwrap_err();
        assert!(matches!(
            err,
            Error::IdOutOfRange {
                side: "target",
                id: 9,
                vocab_size: 5
            }
        ));
    }

    #[test]
    fn test_translation_shifts_target() {
        let objective = Translation::new(SourceBagTranslator::new(TranslatorConfig::new(6, 7)));
        let examples = vec![example(&[4, 5], &[2, 4, 5, 3])];
        let batch = Batch::from_examples(&examples.iter().collect::<Vec<_>>());
        assert_eq!(objective.input_len(&batch), 3);

        let out = objective.forward_row(&batch, 0, &CausalMask::new(3));
        assert_eq!(out.logits.shape, vec![3, 7]);
        assert_eq!(out.targets, vec![4, 5, 3]);
    }

    #[test]
    fn test_padded_row_does_not_change_other_rows() {
        // A shorter row padded up to the batch length scores its real
        // positions exactly as it would alone.
        let objective = LanguageModeling::new(ContextBagLm::new(BagLmConfig::new(8)));
        let examples = vec![example(&[4, 5, 6, 7], &[5, 6, 7, 4]), example(&[4, 5], &[5, 6])];
        let batch = Batch::from_examples(&examples.iter().collect::<Vec<_>>());
        let padded = objective.forward_row(&batch, 1, &CausalMask::new(4));

        let alone = vec![example(&[4, 5], &[5, 6])];
        let alone = Batch::from_examples(&alone.iter().collect::<Vec<_>>());
        let unpadded = objective.forward_row(&alone, 0, &CausalMask::new(2));

        assert_eq!(padded.logits.row(0), unpadded.logits.row(0));
        assert_eq!(padded.logits.row(1), unpadded.logits.row(1));
        assert_eq!(padded.targets, vec![5, 6, 0, 0]);
    }

    #[test]
    fn test_language_model_loss_decreases() {
        let examples: Vec<Example> = (0..12)
            .map(|i| {
                let a = 4 + i % 3;
                example(&[a, a + 1, a + 2], &[a + 1, a + 2, a + 3])
            })
            .collect();
        let mut objective = LanguageModeling::new(ContextBagLm::new(BagLmConfig::new(10)));
        let mut config = TrainingConfig::tiny();
        config.num_epochs = 30;
        config.batch_size = 4;
        config.learning_rate = 0.05;

        let mut trainer = Trainer::new(config).unwrap();
        let reports = trainer.fit(&mut objective, &examples, Some(&examples), None).unwrap();

        assert_eq!(reports.len(), 30);
        assert_eq!(trainer.epochs_completed(), 30);
        assert!(reports[29].train_loss < reports[0].train_loss * 0.5);
        let val = reports[29].val_loss.unwrap();
        assert_relative_eq!(reports[29].val_perplexity.unwrap(), val.exp());
    }

    #[test]
    fn test_translation_loss_decreases() {
        let examples = vec![
            example(&[4], &[2, 5, 3]),
            example(&[5], &[2, 4, 4, 3]),
            example(&[4, 5], &[2, 5, 4, 4, 3]),
        ];
        let mut objective = Translation::new(SourceBagTranslator::new(TranslatorConfig::new(6, 6)));
        let before = evaluate_loss(&objective, &examples, 2).unwrap();

        let mut config = TrainingConfig::tiny();
        config.num_epochs = 40;
        config.batch_size = 2;
        config.learning_rate = 0.05;
        Trainer::new(config)
            .unwrap()
            .fit(&mut objective, &examples, None, None)
            .unwrap();

        let after = evaluate_loss(&objective, &examples, 2).unwrap();
        assert!(after < before * 0.5, "loss {} -> {}", before, after);
    }

    #[test]
    fn test_epoch_loss_is_example_weighted() {
        // Batches of 2 and 1 examples: the epoch loss weights them 2:1.
        let examples = vec![
            example(&[4, 5], &[5, 6]),
            example(&[5, 6], &[6, 4]),
            example(&[6, 4], &[4, 5]),
        ];
        let objective = LanguageModeling::new(ContextBagLm::new(BagLmConfig::new(7)));
        let mut collator = BatchCollator::sequential(2).unwrap();
        let expected: f32 = collator
            .epoch(&examples)
            .map(|batch| {
                let causal = CausalMask::new(objective.input_len(&batch));
                masked_cross_entropy(&forward_batch(&objective, &batch, &causal)).loss
                    * batch.size() as f32
            })
            .sum::<f32>()
            / 3.0;
        assert_relative_eq!(evaluate_loss(&objective, &examples, 2).unwrap(), expected);
    }

    #[test]
    fn test_empty_training_set_rejected() {
        let mut objective = LanguageModeling::new(ContextBagLm::new(BagLmConfig::new(5)));
        let mut trainer = Trainer::new(TrainingConfig::tiny()).unwrap();
        assert!(matches!(
            trainer.fit(&mut objective, &[], None, None),
            Err(Error::EmptyCorpus(_))
        ));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = TrainingConfig::tiny();
        config.batch_size = 0;
        assert!(Trainer::new(config).is_err());

        let mut config = TrainingConfig::tiny();
        config.learning_rate = -1.0;
        assert!(Trainer::new(config).is_err());
    }

    #[test]
    fn test_presets_by_name() {
        assert_eq!(TrainingConfig::preset("tiny").unwrap(), TrainingConfig::tiny());
        assert_eq!(TrainingConfig::preset("small").unwrap(), TrainingConfig::default());
        assert!(matches!(
            TrainingConfig::preset("huge"),
            Err(Error::InvalidConfig(_))
        ));
    }
}
