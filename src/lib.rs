//! Tokenfill: Word-Level Language and Sequence-to-Sequence Models
//!
//! Builds vocabularies from whitespace-tokenized text, trains small
//! next-token language models and sequence-to-sequence models with
//! teacher forcing, decodes from them, and measures token-level accuracy
//! on templated command/action data.
//!
//! # Modules
//!
//! - [`vocab`] - Frozen token/id vocabularies with reserved special tokens
//! - [`corpus`] - Indexing text files into training examples
//! - [`batch`] - Padding, batching and per-epoch shuffling
//! - [`mask`] - Causal and padding masks
//! - [`tensor`] - Minimal row-major tensor and softmax/cross-entropy helpers
//! - [`scorer`] - The model boundary (language and seq2seq scorer traits)
//! - [`models`] - Two small trainable reference scorers
//! - [`train`] - Teacher-forced training loop with masked loss
//! - [`gradients`] / [`optimizer`] - Gradient clipping and AdamW
//! - [`decode`] - Sampling and greedy decoding
//! - [`eval`] - Token-level accuracy of greedy predictions
//! - [`checkpoint`] - Binary model checkpoints carrying their vocabularies
//! - [`training_logger`] - Per-epoch CSV metrics
//! - [`scan`] - SCAN data preparation and placeholder fill-back
//!
//! # Example
//!
//! ```rust,no_run
//! use tokenfill::models::{BagLmConfig, ContextBagLm};
//! use tokenfill::train::{LanguageModeling, Trainer, TrainingConfig};
//! use tokenfill::{generate_text, DecodeOptions, LmCorpus};
//!
//! let config = TrainingConfig::tiny();
//! let corpus = LmCorpus::from_file("corpus.txt", config.seq_len, config.min_freq)?;
//!
//! let mut objective = LanguageModeling::new(ContextBagLm::new(BagLmConfig::new(corpus.vocab.len())));
//! Trainer::new(config)?.fit(&mut objective, &corpus.examples, None, None)?;
//!
//! let text = generate_text(&objective.model, &corpus.vocab, "the", &DecodeOptions::default())?;
//! println!("{}", text);
//! # Ok::<(), tokenfill::Error>(())
//! ```

pub mod batch;
pub mod checkpoint;
pub mod corpus;
pub mod decode;
pub mod error;
pub mod eval;
pub mod gradients;
pub mod mask;
pub mod models;
pub mod optimizer;
pub mod scan;
pub mod scorer;
pub mod tensor;
pub mod train;
pub mod training_logger;
pub mod vocab;

// Re-export main types for convenience
pub use checkpoint::{Checkpoint, Checkpointable, ModelKind};
pub use corpus::{Example, LmCorpus, ParallelCorpus, UnkCounts};
pub use decode::{generate_text, translate, DecodeOptions, DecodePolicy};
pub use error::{Error, Result};
pub use eval::{evaluate_seq2seq, AccuracyScorer, EvalOptions, EvaluationReport};
pub use scorer::{LanguageScorer, Seq2SeqScorer};
pub use tensor::Tensor;
pub use train::{Trainer, TrainingConfig};
pub use training_logger::TrainingLogger;
pub use vocab::{VocabKind, Vocabulary};
