//! Word-Level Vocabulary
//!
//! Maps whitespace-delimited tokens to integer ids. A vocabulary is built
//! once from a corpus, frozen, and stored next to the trained weights so that
//! inference replays exactly the same ids.
//!
//! ## Reserved Ids
//!
//! ```text
//! Source vocabulary:  0 = <pad>  1 = <unk>  2.. = corpus tokens
//! Target vocabulary:  0 = <pad>  1 = <unk>  2 = <bos>  3 = <eos>  4.. = corpus tokens
//! ```
//!
//! ## Id Assignment
//!
//! Corpus tokens are numbered in the order they are *first seen*, keeping
//! only tokens whose total frequency reaches `min_freq`. Frequency order and
//! alphabetical order are never used, and neither is the iteration order of
//! a hash map: two builds over the same lines must agree id for id.
//!
//! ```text
//! lines:  "a b a", "b c"     min_freq = 1
//! ids:    <pad>=0 <unk>=1 a=2 b=3 c=4
//! ```
//!
//! ## Example
//!
//! ```rust
//! use tokenfill::vocab::{VocabKind, VocabularyBuilder};
//!
//! let lines = [vec!["a", "b", "a"], vec!["b", "c"]];
//! let vocab = VocabularyBuilder::new(VocabKind::Source, 1).build(&lines);
//! assert_eq!(vocab.get("a"), Some(2));
//! assert_eq!(vocab.id_or_unk("d"), vocab.unk_id());
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

pub const PAD_TOKEN: &str = "<pad>";
pub const UNK_TOKEN: &str = "<unk>";
pub const BOS_TOKEN: &str = "<bos>";
pub const EOS_TOKEN: &str = "<eos>";

pub const PAD_ID: usize = 0;
pub const UNK_ID: usize = 1;
pub const BOS_ID: usize = 2;
pub const EOS_ID: usize = 3;

/// Which side of a model a vocabulary belongs to
///
/// Target vocabularies additionally reserve sequence start/end markers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VocabKind {
    Source,
    Target,
}

impl VocabKind {
    /// Reserved tokens for this kind, in id order
    pub fn reserved_tokens(self) -> &'static [&'static str] {
        match self {
            VocabKind::Source => &[PAD_TOKEN, UNK_TOKEN],
            VocabKind::Target => &[PAD_TOKEN, UNK_TOKEN, BOS_TOKEN, EOS_TOKEN],
        }
    }

    /// First id available to corpus tokens
    pub fn first_regular_id(self) -> usize {
        self.reserved_tokens().len()
    }
}

/// Builds a [`Vocabulary`] from token lists
#[derive(Clone, Debug)]
pub struct VocabularyBuilder {
    kind: VocabKind,
    min_freq: usize,
}

impl VocabularyBuilder {
    /// Create a builder
    ///
    /// # Arguments
    ///
    /// * `kind` - Source or target side (decides the reserved ids)
    /// * `min_freq` - Tokens seen fewer times than this resolve to `<unk>`
    pub fn new(kind: VocabKind, min_freq: usize) -> Self {
        Self { kind, min_freq }
    }

    /// Count frequencies and assign ids in first-seen order
    ///
    /// # Arguments
    ///
    /// * `token_lists` - One token list per corpus line, in corpus order
    pub fn build<L, T>(&self, token_lists: &[L]) -> Vocabulary
    where
        L: AsRef<[T]>,
        T: AsRef<str>,
    {
        // `first_seen` carries the distinct tokens in the order they appear;
        // the map only holds counts and is never iterated.
        let mut counts: HashMap<&str, usize> = HashMap::new();
        let mut first_seen: Vec<&str> = Vec::new();

        for tokens in token_lists {
            for token in tokens.as_ref() {
                let token = token.as_ref();
                let count = counts.entry(token).or_insert(0);
                if *count == 0 {
                    first_seen.push(token);
                }
                *count += 1;
            }
        }

        let mut vocab = Vocabulary::empty(self.kind);
        for token in first_seen {
            if counts[token] >= self.min_freq {
                vocab.insert(token);
            }
        }

        log::debug!(
            "built {:?} vocabulary: {} ids ({} distinct tokens, min_freq={})",
            self.kind,
            vocab.len(),
            counts.len(),
            self.min_freq
        );

        vocab
    }
}

/// A frozen bijection between tokens and ids
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "VocabFile", into = "VocabFile")]
pub struct Vocabulary {
    kind: VocabKind,
    token_to_id: HashMap<String, usize>,
    id_to_token: Vec<String>,
}

/// On-disk layout of a vocabulary: the kind plus the token -> id map
#[derive(Serialize, Deserialize)]
struct VocabFile {
    kind: VocabKind,
    token_to_id: HashMap<String, usize>,
}

impl From<Vocabulary> for VocabFile {
    fn from(vocab: Vocabulary) -> Self {
        Self {
            kind: vocab.kind,
            token_to_id: vocab.token_to_id,
        }
    }
}

impl TryFrom<VocabFile> for Vocabulary {
    type Error = Error;

    fn try_from(file: VocabFile) -> Result<Self> {
        Vocabulary::from_map(file.kind, file.token_to_id)
    }
}

impl Vocabulary {
    /// A vocabulary holding only the reserved tokens of `kind`
    pub fn empty(kind: VocabKind) -> Self {
        let mut vocab = Self {
            kind,
            token_to_id: HashMap::new(),
            id_to_token: Vec::new(),
        };
        for token in kind.reserved_tokens() {
            vocab.insert(token);
        }
        vocab
    }

    /// Rebuild a vocabulary from a persisted token -> id map
    ///
    /// Ids must cover `0..n` exactly once and the reserved tokens of `kind`
    /// must sit at their reserved ids.
    pub fn from_map(kind: VocabKind, token_to_id: HashMap<String, usize>) -> Result<Self> {
        let mut slots: Vec<Option<String>> = vec![None; token_to_id.len()];
        for (token, &id) in &token_to_id {
            let slot = slots.get_mut(id).ok_or_else(|| {
                Error::InvalidVocabulary(format!(
                    "id {} for {:?} is outside 0..{}",
                    id,
                    token,
                    token_to_id.len()
                ))
            })?;
            if let Some(other) = slot {
                return Err(Error::InvalidVocabulary(format!(
                    "id {} assigned to both {:?} and {:?}",
                    id, other, token
                )));
            }
            *slot = Some(token.clone());
        }

        // With n distinct tokens and every id < n unique, every slot is filled
        let id_to_token: Vec<String> = slots.into_iter().flatten().collect();

        for (id, reserved) in kind.reserved_tokens().iter().enumerate() {
            if id_to_token.get(id).map(String::as_str) != Some(*reserved) {
                return Err(Error::InvalidVocabulary(format!(
                    "reserved token {} must have id {}",
                    reserved, id
                )));
            }
        }

        Ok(Self {
            kind,
            token_to_id,
            id_to_token,
        })
    }

    fn insert(&mut self, token: &str) -> usize {
        if let Some(&id) = self.token_to_id.get(token) {
            return id;
        }
        let id = self.id_to_token.len();
        self.token_to_id.insert(token.to_string(), id);
        self.id_to_token.push(token.to_string());
        id
    }

    pub fn kind(&self) -> VocabKind {
        self.kind
    }

    /// Number of ids, reserved ones included
    pub fn len(&self) -> usize {
        self.id_to_token.len()
    }

    /// True when the vocabulary holds no corpus tokens
    pub fn is_empty(&self) -> bool {
        self.len() == self.kind.first_regular_id()
    }

    pub fn get(&self, token: &str) -> Option<usize> {
        self.token_to_id.get(token).copied()
    }

    /// Id of `token`, or the unknown id when it has none
    pub fn id_or_unk(&self, token: &str) -> usize {
        self.get(token).unwrap_or(UNK_ID)
    }

    pub fn token(&self, id: usize) -> Option<&str> {
        self.id_to_token.get(id).map(String::as_str)
    }

    pub fn pad_id(&self) -> usize {
        PAD_ID
    }

    pub fn unk_id(&self) -> usize {
        UNK_ID
    }

    /// Sequence start id (target vocabularies only)
    pub fn bos_id(&self) -> Option<usize> {
        (self.kind == VocabKind::Target).then_some(BOS_ID)
    }

    /// Sequence end id (target vocabularies only)
    pub fn eos_id(&self) -> Option<usize> {
        (self.kind == VocabKind::Target).then_some(EOS_ID)
    }

    pub fn is_special(&self, id: usize) -> bool {
        id < self.kind.first_regular_id()
    }

    /// Lowest id that belongs to a corpus token, if any
    pub fn first_regular_id(&self) -> Option<usize> {
        let id = self.kind.first_regular_id();
        (id < self.len()).then_some(id)
    }

    /// Map ids back to space-separated tokens
    ///
    /// Ids with no token render as `<unk>`.
    pub fn detokenize(&self, ids: &[usize]) -> String {
        ids.iter()
            .map(|&id| self.token(id).unwrap_or(UNK_TOKEN))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Save the vocabulary as JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Load a vocabulary saved with [`Vocabulary::save`]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn stats(&self) -> VocabStats {
        let reserved = self.kind.first_regular_id();
        VocabStats {
            vocab_size: self.len(),
            reserved,
            regular: self.len() - reserved,
        }
    }
}

/// Vocabulary size summary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VocabStats {
    pub vocab_size: usize,
    pub reserved: usize,
    pub regular: usize,
}

impl std::fmt::Display for VocabStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Vocabulary: {} ids ({} reserved + {} tokens)",
            self.vocab_size, self.reserved, self.regular
        )
    }
}
