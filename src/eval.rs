//! Evaluation
//!
//! Token-level accuracy of greedy seq2seq predictions against the reference
//! targets.
//!
//! ## Alignment
//!
//! ```text
//! reference  = target without its leading <bos>    (the <eos> stays)
//! prediction = decoded ids without <bos>, trailing <eos> trimmed
//!
//! matches   += #{ i < min(len(pred), len(ref)) : pred[i] == ref[i] }
//! total     += len(ref)
//! accuracy   = matches / total        (0.0 when total == 0)
//! ```
//!
//! A short prediction only earns credit for the overlapping prefix, and a
//! long one never earns credit for its extra tokens.
//!
//! Each example is decoded with `max_len = len(target) + 2`, where the
//! target includes `<bos>` and `<eos>`.

use crate::corpus::{ParallelCorpus, UnkCounts};
use crate::decode::greedy_decode;
use crate::error::{Error, Result};
use crate::scorer::{check_id_range, Seq2SeqScorer};
use crate::vocab::{Vocabulary, UNK_TOKEN};
use rayon::prelude::*;
use std::fmt;

/// Running match totals over an evaluation set
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccuracyScorer {
    matches: usize,
    reference_tokens: usize,
    exact_matches: usize,
    sequences: usize,
}

impl AccuracyScorer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Score one prediction against its reference
    ///
    /// `reference` must already have its leading `bos` removed. A trailing
    /// `eos` is trimmed from `prediction` before comparison. Returns the
    /// number of matching positions.
    pub fn add(&mut self, prediction: &[usize], reference: &[usize], eos: usize) -> usize {
        let prediction = prediction.strip_suffix(&[eos]).unwrap_or(prediction);
        let matches = prediction
            .iter()
            .zip(reference)
            .filter(|(p, r)| p == r)
            .count();

        self.matches += matches;
        self.reference_tokens += reference.len();
        self.sequences += 1;
        if prediction == reference.strip_suffix(&[eos]).unwrap_or(reference) {
            self.exact_matches += 1;
        }
        matches
    }

    /// `matches / reference_tokens`, or 0.0 before any reference token
    pub fn accuracy(&self) -> f64 {
        if self.reference_tokens == 0 {
            0.0
        } else {
            self.matches as f64 / self.reference_tokens as f64
        }
    }

    pub fn matches(&self) -> usize {
        self.matches
    }

    pub fn reference_tokens(&self) -> usize {
        self.reference_tokens
    }

    /// Predictions equal to their reference (ignoring the final `eos`)
    pub fn exact_matches(&self) -> usize {
        self.exact_matches
    }

    pub fn sequences(&self) -> usize {
        self.sequences
    }
}

#[derive(Clone, Debug, Default)]
pub struct EvalOptions {
    /// Keep a per-example transcript of input, prediction and target
    pub verbose: bool,
}

/// Input, prediction and target tokens of one evaluated example
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transcript {
    pub input: Vec<String>,
    pub prediction: Vec<String>,
    pub target: Vec<String>,
}

impl fmt::Display for Transcript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Input : {:?}", self.input)?;
        writeln!(f, "Pred : {:?}", self.prediction)?;
        write!(f, "Target : {:?}", self.target)
    }
}

#[derive(Clone, Debug)]
pub struct EvaluationReport {
    pub accuracy: f64,
    pub matches: usize,
    pub reference_tokens: usize,
    pub exact_matches: usize,
    pub examples: usize,
    /// `<unk>` substitutions made while indexing the evaluation corpus
    pub unk: UnkCounts,
    /// Empty unless [`EvalOptions::verbose`] is set
    pub transcripts: Vec<Transcript>,
}

/// Greedily decode every example of `corpus` and score the predictions
///
/// Examples are decoded in parallel; scoring and transcripts follow corpus
/// order.
pub fn evaluate_seq2seq<S: Seq2SeqScorer>(
    scorer: &S,
    corpus: &ParallelCorpus,
    options: &EvalOptions,
) -> Result<EvaluationReport> {
    let tgt_vocab = &corpus.tgt_vocab;
    let (bos, eos) = match (tgt_vocab.bos_id(), tgt_vocab.eos_id()) {
        (Some(bos), Some(eos)) => (bos, eos),
        _ => {
            return Err(Error::InvalidVocabulary(
                "target vocabulary has no <bos>/<eos>".into(),
            ))
        }
    };

    let source_vocab_size = scorer.source_vocab_size();
    for example in &corpus.examples {
        check_id_range("source", &example.input, source_vocab_size)?;
    }
    check_id_range("target", &[bos, eos], scorer.target_vocab_size())?;

    let outputs = corpus
        .examples
        .par_iter()
        .map(|example| greedy_decode(scorer, &example.input, bos, eos, example.target.len() + 2))
        .collect::<Result<Vec<_>>>()?;

    let mut accuracy = AccuracyScorer::new();
    let mut transcripts = Vec::new();
    for (example, output) in corpus.examples.iter().zip(&outputs) {
        let prediction = output.get(1..).unwrap_or(&[]);
        let reference = example.target.get(1..).unwrap_or(&[]);
        let matches = accuracy.add(prediction, reference, eos);
        log::debug!("{}/{} reference tokens matched", matches, reference.len());

        if options.verbose {
            let trimmed = prediction.strip_suffix(&[eos]).unwrap_or(prediction);
            transcripts.push(Transcript {
                input: render(&corpus.src_vocab, &example.input),
                prediction: render(tgt_vocab, trimmed),
                target: render(tgt_vocab, reference),
            });
        }
    }

    log::info!(
        "evaluated {} examples: {}/{} tokens correct",
        accuracy.sequences(),
        accuracy.matches(),
        accuracy.reference_tokens()
    );

    Ok(EvaluationReport {
        accuracy: accuracy.accuracy(),
        matches: accuracy.matches(),
        reference_tokens: accuracy.reference_tokens(),
        exact_matches: accuracy.exact_matches(),
        examples: accuracy.sequences(),
        unk: corpus.unk,
        transcripts,
    })
}

fn render(vocab: &Vocabulary, ids: &[usize]) -> Vec<String> {
    ids.iter()
        .map(|&id| vocab.token(id).unwrap_or(UNK_TOKEN).to_string())
        .collect()
}
