//! Scorer Boundary
//!
//! The network that turns token ids into logits is consumed only through
//! these traits. Training, decoding and evaluation never look inside a
//! scorer, so any implementation (a transformer, the reference models in
//! [`crate::models`], a stub in a test) can be swapped in.
//!
//! ## Shapes
//!
//! ```text
//! ids:      [len]
//! padding:  [len]            true where ids[k] == <pad>
//! causal:   CausalMask(len)  (i, j) blocked iff j > i
//! logits:   Tensor [len, vocab_size]
//! ```
//!
//! A scorer must not let position `i` see any position the combined
//! causal/padding mask blocks (see [`crate::mask::attention_blocked`]).
//!
//! ## Training
//!
//! The trainable extensions add `backward`, which maps the gradient of the
//! loss with respect to the logits to gradients for every parameter, in the
//! same order as [`Parameters::parameters_mut`].

use crate::error::{Error, Result};
use crate::mask::CausalMask;
use crate::tensor::Tensor;

/// Fail with [`Error::IdOutOfRange`] on the first id outside `[0, vocab_size)`
///
/// Scorers index their tables with raw ids; every caller that feeds ids to
/// a scorer checks them here first.
pub fn check_id_range(side: &'static str, ids: &[usize], vocab_size: usize) -> Result<()> {
    match ids.iter().find(|&&id| id >= vocab_size) {
        Some(&id) => Err(Error::IdOutOfRange {
            side,
            id,
            vocab_size,
        }),
        None => Ok(()),
    }
}

/// Single-sequence (language-model) scorer
pub trait LanguageScorer: Sync {
    fn vocab_size(&self) -> usize;

    /// Logits for every position of `ids`
    fn score(&self, ids: &[usize], causal: &CausalMask, padding: &[bool]) -> Tensor;
}

/// Source → target scorer
pub trait Seq2SeqScorer: Sync {
    /// Encoded source, computed once per decode and reused at every step
    type Memory: Send + Sync;

    fn source_vocab_size(&self) -> usize;
    fn target_vocab_size(&self) -> usize;

    fn encode(&self, source: &[usize], source_padding: &[bool]) -> Self::Memory;

    /// Logits for every position of the target prefix
    fn decode(
        &self,
        target: &[usize],
        memory: &Self::Memory,
        causal: &CausalMask,
        target_padding: &[bool],
    ) -> Tensor;
}

/// Access to a model's learnable tensors
pub trait Parameters {
    fn parameters(&self) -> Vec<&Tensor>;
    fn parameters_mut(&mut self) -> Vec<&mut Tensor>;

    fn num_parameters(&self) -> usize {
        self.parameters().iter().map(|p| p.len()).sum()
    }
}

/// A language-model scorer that can be trained
pub trait TrainableLanguageScorer: LanguageScorer + Parameters {
    fn backward(
        &self,
        ids: &[usize],
        causal: &CausalMask,
        padding: &[bool],
        grad_logits: &Tensor,
    ) -> Vec<Tensor>;
}

/// A sequence-to-sequence scorer that can be trained
pub trait TrainableSeq2SeqScorer: Seq2SeqScorer + Parameters {
    fn backward(
        &self,
        source: &[usize],
        source_padding: &[bool],
        target: &[usize],
        causal: &CausalMask,
        target_padding: &[bool],
        grad_logits: &Tensor,
    ) -> Vec<Tensor>;
}
