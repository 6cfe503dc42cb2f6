//! Batching and Padding
//!
//! Groups indexed examples into batches and right-pads each side of each
//! batch to that batch's own longest sequence:
//!
//! ```text
//! batch_size = 2, pad id = 0
//!
//! source:  [5, 6, 7]        ->  [5, 6, 7]    mask [F F F]
//!          [8]              ->  [8, 0, 0]    mask [F T T]
//! target:  [2, 9, 3]        ->  [2, 9, 3]    mask [F F F]
//!          [2, 4, 4, 4, 3]  ->  ...padded to 5
//! ```
//!
//! Sequences are never padded to a corpus-wide maximum, so batch shapes vary.
//! The padding mask is derived from the padded ids (`id == 0`), which keeps
//! the two in agreement by construction.
//!
//! Training shuffles the example order once per epoch with a seeded RNG;
//! evaluation keeps corpus order.

use crate::corpus::Example;
use crate::error::{Error, Result};
use crate::mask::padding_mask;
use crate::vocab::PAD_ID;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// One side (source or target) of a padded batch
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaddedSide {
    /// `[batch][len]` ids, right-padded with the pad id
    pub ids: Vec<Vec<usize>>,
    /// `[batch][len]`, `true` where `ids` holds the pad id
    pub padding: Vec<Vec<bool>>,
    /// Batch-local sequence length
    pub len: usize,
}

impl PaddedSide {
    /// Pad sequences to their longest member
    pub fn pad<S: AsRef<[usize]>>(sequences: &[S]) -> Self {
        let len = sequences
            .iter()
            .map(|s| s.as_ref().len())
            .max()
            .unwrap_or(0);

        let ids: Vec<Vec<usize>> = sequences
            .iter()
            .map(|s| {
                let mut row = s.as_ref().to_vec();
                row.resize(len, PAD_ID);
                row
            })
            .collect();
        let padding = ids.iter().map(|row| padding_mask(row)).collect();

        Self { ids, padding, len }
    }
}

/// A group of examples padded side by side
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Batch {
    pub source: PaddedSide,
    pub target: PaddedSide,
}

impl Batch {
    pub fn from_examples(examples: &[&Example]) -> Self {
        let inputs: Vec<&[usize]> = examples.iter().map(|e| e.input.as_slice()).collect();
        let targets: Vec<&[usize]> = examples.iter().map(|e| e.target.as_slice()).collect();
        Self {
            source: PaddedSide::pad(&inputs),
            target: PaddedSide::pad(&targets),
        }
    }

    /// Number of examples in the batch
    pub fn size(&self) -> usize {
        self.source.ids.len()
    }
}

/// Splits examples into padded batches, optionally reshuffling every epoch
pub struct BatchCollator {
    batch_size: usize,
    shuffle: bool,
    rng: StdRng,
}

impl BatchCollator {
    /// Create a collator
    ///
    /// # Arguments
    ///
    /// * `batch_size` - Examples per batch (the last batch may be smaller)
    /// * `shuffle` - Draw a fresh permutation at the start of every epoch
    /// * `seed` - Seed for the shuffle RNG
    pub fn new(batch_size: usize, shuffle: bool, seed: u64) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be at least 1".into()));
        }
        Ok(Self {
            batch_size,
            shuffle,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// A collator for evaluation: fixed corpus order
    pub fn sequential(batch_size: usize) -> Result<Self> {
        Self::new(batch_size, false, 0)
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of batches one epoch over `num_examples` produces
    pub fn num_batches(&self, num_examples: usize) -> usize {
        num_examples.div_ceil(self.batch_size)
    }

    /// Start an epoch over `examples`
    ///
    /// The permutation (if shuffling) is drawn here, once per epoch.
    pub fn epoch<'a>(&mut self, examples: &'a [Example]) -> Batches<'a> {
        let mut order: Vec<usize> = (0..examples.len()).collect();
        if self.shuffle {
            order.shuffle(&mut self.rng);
        }
        Batches {
            examples,
            order,
            batch_size: self.batch_size,
            position: 0,
        }
    }
}

/// Iterator over the batches of one epoch
pub struct Batches<'a> {
    examples: &'a [Example],
    order: Vec<usize>,
    batch_size: usize,
    position: usize,
}

impl Iterator for Batches<'_> {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        if self.position >= self.order.len() {
            return None;
        }
        let end = (self.position + self.batch_size).min(self.order.len());
        let members: Vec<&Example> = self.order[self.position..end]
            .iter()
            .map(|&i| &self.examples[i])
            .collect();
        self.position = end;
        Some(Batch::from_examples(&members))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.order.len() - self.position).div_ceil(self.batch_size);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Batches<'_> {}
