//! Error types
//!
//! Every failure in the pipeline is fatal except the three cases that are
//! recovered where they happen: unknown tokens (mapped to `<unk>` and
//! counted), accuracy over zero reference tokens (0.0), and decodes that
//! never emit an end token (they simply stop at their step budget).

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building, training, decoding or persisting models
#[derive(Debug, Error)]
pub enum Error {
    #[error("source and target corpora differ in length: {source_lines} source lines, {target_lines} target lines")]
    LineCountMismatch {
        source_lines: usize,
        target_lines: usize,
    },

    #[error("corpus {0} contains no usable examples")]
    EmptyCorpus(String),

    #[error("{side} id {id} is outside the vocabulary range [0, {vocab_size})")]
    IdOutOfRange {
        side: &'static str,
        id: usize,
        vocab_size: usize,
    },

    #[error("invalid vocabulary: {0}")]
    InvalidVocabulary(String),

    #[error("invalid checkpoint {path}: {reason}")]
    InvalidCheckpoint { path: PathBuf, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;
