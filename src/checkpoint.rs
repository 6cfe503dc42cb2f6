//! Checkpoints
//!
//! A checkpoint holds everything needed to decode with a trained model: its
//! configuration, its weights and the vocabularies it was trained with.
//!
//! ## File Format
//!
//! ```text
//! b"TOKFILL_CKPT"            magic
//! u8                         version (1)
//! u32 + JSON                 header: kind, model_config, training,
//!                            vocab | src_vocab + tgt_vocab, metadata
//! u32                        tensor count
//! per tensor:
//!   u32 ndim, u32 × ndim     shape
//!   u32 len, f32 × len       data
//! ```
//!
//! All integers and floats are little-endian. The tensors are the model's
//! `model_state`, in [`Parameters::parameters`] order.
//!
//! Loading checks the magic, the version, the model kind and that the
//! vocabularies are present and match the model's embedding sizes. Any
//! mismatch is an [`Error::InvalidCheckpoint`].

use crate::error::{Error, Result};
use crate::scorer::Parameters;
use crate::tensor::Tensor;
use crate::train::{EpochReport, TrainingConfig};
use crate::vocab::{VocabKind, Vocabulary};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

const MAGIC: &[u8; 12] = b"TOKFILL_CKPT";
const VERSION: u8 = 1;

/// Which task a checkpoint was trained for
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    LanguageModel,
    Seq2Seq,
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKind::LanguageModel => write!(f, "language model"),
            ModelKind::Seq2Seq => write!(f, "seq2seq"),
        }
    }
}

/// A model that can be written to and rebuilt from a checkpoint
pub trait Checkpointable: Parameters + Sized {
    const KIND: ModelKind;
    type Config: Serialize + DeserializeOwned + Clone;

    fn config(&self) -> &Self::Config;

    /// Embedding sizes the vocabularies must match: `[vocab]` for a
    /// language model, `[source, target]` for seq2seq
    fn vocab_sizes(&self) -> Vec<usize>;

    /// Rebuild from a config and tensors in [`Parameters::parameters`] order
    fn from_state(config: Self::Config, state: Vec<Tensor>) -> Result<Self>;
}

/// Summary of the run that produced a checkpoint
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    pub epochs: usize,
    pub final_train_loss: Option<f32>,
    pub best_val_loss: Option<f32>,
}

impl CheckpointMetadata {
    fn untrained() -> Self {
        Self {
            epochs: 0,
            final_train_loss: None,
            best_val_loss: None,
        }
    }

    pub fn from_reports(reports: &[EpochReport]) -> Self {
        let best_val_loss = reports
            .iter()
            .filter_map(|r| r.val_loss)
            .fold(None, |best: Option<f32>, loss| {
                Some(best.map_or(loss, |b| b.min(loss)))
            });
        Self {
            epochs: reports.last().map_or(0, |r| r.epoch),
            final_train_loss: reports.last().map(|r| r.train_loss),
            best_val_loss,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct CheckpointHeader {
    kind: ModelKind,
    model_config: serde_json::Value,
    training: Option<TrainingConfig>,
    vocab: Option<Vocabulary>,
    src_vocab: Option<Vocabulary>,
    tgt_vocab: Option<Vocabulary>,
    metadata: CheckpointMetadata,
}

/// A trained model plus the vocabularies it reads and writes
///
/// Language-model checkpoints carry `vocab`; seq2seq checkpoints carry
/// `src_vocab` and `tgt_vocab`. [`Checkpoint::load`] guarantees the fields
/// for the model's kind are present.
pub struct Checkpoint<M> {
    pub model: M,
    pub vocab: Option<Vocabulary>,
    pub src_vocab: Option<Vocabulary>,
    pub tgt_vocab: Option<Vocabulary>,
    pub training: Option<TrainingConfig>,
    pub metadata: CheckpointMetadata,
}

impl<M: Checkpointable> Checkpoint<M> {
    pub fn language_model(model: M, vocab: Vocabulary) -> Self {
        Self {
            model,
            vocab: Some(vocab),
            src_vocab: None,
            tgt_vocab: None,
            training: None,
            metadata: CheckpointMetadata::untrained(),
        }
    }

    pub fn seq2seq(model: M, src_vocab: Vocabulary, tgt_vocab: Vocabulary) -> Self {
        Self {
            model,
            vocab: None,
            src_vocab: Some(src_vocab),
            tgt_vocab: Some(tgt_vocab),
            training: None,
            metadata: CheckpointMetadata::untrained(),
        }
    }

    /// Record the training configuration and per-epoch results
    pub fn with_training(mut self, config: TrainingConfig, reports: &[EpochReport]) -> Self {
        self.training = Some(config);
        self.metadata = CheckpointMetadata::from_reports(reports);
        self
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        log::info!("saving {} checkpoint to {}", M::KIND, path.display());

        let header = CheckpointHeader {
            kind: M::KIND,
            model_config: serde_json::to_value(self.model.config())?,
            training: self.training.clone(),
            vocab: self.vocab.clone(),
            src_vocab: self.src_vocab.clone(),
            tgt_vocab: self.tgt_vocab.clone(),
            metadata: self.metadata.clone(),
        };
        let header_bytes = serde_json::to_vec(&header)?;

        let mut file = BufWriter::new(File::create(path)?);
        file.write_all(MAGIC)?;
        file.write_all(&[VERSION])?;
        write_u32(&mut file, header_bytes.len())?;
        file.write_all(&header_bytes)?;

        let params = self.model.parameters();
        write_u32(&mut file, params.len())?;
        for tensor in params {
            write_tensor(&mut file, tensor)?;
        }
        file.flush()?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        log::info!("loading {} checkpoint from {}", M::KIND, path.display());
        let invalid = |reason: String| Error::InvalidCheckpoint {
            path: path.to_path_buf(),
            reason,
        };

        let mut file = BufReader::new(File::open(path)?);
        let (header, state) = read_payload(&mut file).map_err(|e| invalid(e.to_string()))?;
        let header: CheckpointHeader = serde_json::from_slice(&header)
            .map_err(|e| invalid(format!("unreadable header: {}", e)))?;

        if header.kind != M::KIND {
            return Err(invalid(format!(
                "expected a {} checkpoint, found a {} checkpoint",
                M::KIND,
                header.kind
            )));
        }

        let config: M::Config = serde_json::from_value(header.model_config)
            .map_err(|e| invalid(format!("unreadable model config: {}", e)))?;
        let model = M::from_state(config, state).map_err(|e| invalid(e.to_string()))?;

        let vocab_sizes = match M::KIND {
            ModelKind::LanguageModel => {
                let vocab = header
                    .vocab
                    .as_ref()
                    .ok_or_else(|| invalid("missing vocab".into()))?;
                vec![vocab.len()]
            }
            ModelKind::Seq2Seq => {
                let src = header
                    .src_vocab
                    .as_ref()
                    .ok_or_else(|| invalid("missing src_vocab".into()))?;
                let tgt = header
                    .tgt_vocab
                    .as_ref()
                    .ok_or_else(|| invalid("missing tgt_vocab".into()))?;
                if tgt.kind() != VocabKind::Target {
                    return Err(invalid("tgt_vocab has no <bos>/<eos> tokens".into()));
                }
                vec![src.len(), tgt.len()]
            }
        };
        if vocab_sizes != model.vocab_sizes() {
            return Err(invalid(format!(
                "vocabulary sizes {:?} do not match model sizes {:?}",
                vocab_sizes,
                model.vocab_sizes()
            )));
        }

        Ok(Self {
            model,
            vocab: header.vocab,
            src_vocab: header.src_vocab,
            tgt_vocab: header.tgt_vocab,
            training: header.training,
            metadata: header.metadata,
        })
    }
}

fn write_u32<W: Write>(out: &mut W, value: usize) -> std::io::Result<()> {
    out.write_all(&(value as u32).to_le_bytes())
}

fn write_tensor<W: Write>(out: &mut W, tensor: &Tensor) -> std::io::Result<()> {
    write_u32(out, tensor.shape.len())?;
    for &dim in &tensor.shape {
        write_u32(out, dim)?;
    }
    write_u32(out, tensor.data.len())?;
    for &val in &tensor.data {
        out.write_all(&val.to_le_bytes())?;
    }
    Ok(())
}

fn read_u32<R: Read>(input: &mut R) -> std::io::Result<usize> {
    let mut bytes = [0u8; 4];
    input.read_exact(&mut bytes)?;
    Ok(u32::from_le_bytes(bytes) as usize)
}

fn invalid_data(message: String) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, message)
}

/// Read exactly `len` bytes, growing the buffer only as data arrives
///
/// Lengths come from the file itself, so a corrupted length field fails at
/// end of file instead of reserving memory up front.
fn read_bytes<R: Read>(input: &mut R, len: usize) -> std::io::Result<Vec<u8>> {
    let mut bytes = Vec::new();
    input.by_ref().take(len as u64).read_to_end(&mut bytes)?;
    if bytes.len() != len {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("expected {} bytes, found {}", len, bytes.len()),
        ));
    }
    Ok(bytes)
}

fn read_tensor<R: Read>(input: &mut R) -> std::io::Result<Tensor> {
    let ndim = read_u32(input)?;
    let mut shape = Vec::new();
    for _ in 0..ndim {
        shape.push(read_u32(input)?);
    }

    let elements = shape
        .iter()
        .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
        .ok_or_else(|| invalid_data(format!("tensor shape {:?} overflows", shape)))?;
    let len = read_u32(input)?;
    if len != elements {
        return Err(invalid_data(format!(
            "tensor of {} values cannot have shape {:?}",
            len, shape
        )));
    }

    let byte_len = len
        .checked_mul(4)
        .ok_or_else(|| invalid_data(format!("tensor of {} values is too large", len)))?;
    let bytes = read_bytes(input, byte_len)?;
    let data = bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    Ok(Tensor::new(data, shape))
}

/// Magic, version, raw header bytes and the tensors that follow
fn read_payload<R: Read>(input: &mut R) -> std::io::Result<(Vec<u8>, Vec<Tensor>)> {
    let mut magic = [0u8; 12];
    input.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(invalid_data(
            "not a checkpoint (expected TOKFILL_CKPT header)".into(),
        ));
    }

    let mut version = [0u8; 1];
    input.read_exact(&mut version)?;
    if version[0] != VERSION {
        return Err(invalid_data(format!(
            "unsupported checkpoint version: {}",
            version[0]
        )));
    }

    let header_len = read_u32(input)?;
    let header = read_bytes(input, header_len)?;

    let count = read_u32(input)?;
    let mut tensors = Vec::new();
    for _ in 0..count {
        tensors.push(read_tensor(input)?);
    }
    Ok((header, tensors))
}
