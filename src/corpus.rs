//! Corpus Loading and Indexing
//!
//! Turns newline-delimited, whitespace-tokenized text into id sequences.
//!
//! ## Language-Model Windows
//!
//! Every line is indexed on its own and cut into overlapping windows. The
//! target is always the input shifted by one position:
//!
//! ```text
//! Line ids:   [2, 3, 4, 5, 6]     seq_len = 3
//!
//! i = 0   input [2, 3, 4]   target [3, 4, 5]
//! i = 1   input [3, 4, 5]   target [4, 5, 6]
//! ```
//!
//! Offsets range over `0..len - seq_len`, so a line needs at least
//! `seq_len + 1` tokens to contribute anything.
//!
//! ## Parallel Corpora
//!
//! Source and target files are read line by line (empty lines dropped) and
//! must end up with the same number of lines. The target side is wrapped as
//! `[<bos>] + tokens + [<eos>]`.
//!
//! ## Unknown Tokens
//!
//! Tokens missing from the vocabulary become `<unk>`. Each substitution is
//! counted per side and kept on the corpus so callers can report coverage
//! problems instead of evaluating against a sea of `<unk>`.

use crate::error::{Error, Result};
use crate::vocab::{VocabKind, Vocabulary, VocabularyBuilder, UNK_ID};
use std::fs;
use std::path::Path;

/// Split a line on whitespace
pub fn tokenize(line: &str) -> Vec<&str> {
    line.split_whitespace().collect()
}

/// Read a UTF-8 file as trimmed, non-empty lines
pub fn read_lines<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let text = fs::read_to_string(path)?;
    Ok(non_empty_lines(&text))
}

/// Trimmed, non-empty lines of `text`
pub fn non_empty_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Number of tokens replaced by `<unk>` on each side
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UnkCounts {
    pub source: usize,
    pub target: usize,
}

impl UnkCounts {
    pub fn total(&self) -> usize {
        self.source + self.target
    }
}

impl std::fmt::Display for UnkCounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "src: {}, tgt: {}", self.source, self.target)
    }
}

/// One (input, target) pair of id sequences
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Example {
    pub input: Vec<usize>,
    pub target: Vec<usize>,
}

/// Map tokens to ids, adding every `<unk>` substitution to `unk_count`
pub fn index_tokens<T: AsRef<str>>(
    tokens: &[T],
    vocab: &Vocabulary,
    unk_count: &mut usize,
) -> Vec<usize> {
    tokens
        .iter()
        .map(|token| {
            let id = vocab.id_or_unk(token.as_ref());
            if id == UNK_ID {
                *unk_count += 1;
            }
            id
        })
        .collect()
}

/// Sliding windows of `seq_len` over one line's ids
pub fn windows(ids: &[usize], seq_len: usize) -> Vec<Example> {
    if seq_len == 0 || ids.len() <= seq_len {
        return Vec::new();
    }
    (0..ids.len() - seq_len)
        .map(|i| Example {
            input: ids[i..i + seq_len].to_vec(),
            target: ids[i + 1..i + seq_len + 1].to_vec(),
        })
        .collect()
}

fn split_lines(lines: &[String]) -> Vec<Vec<&str>> {
    lines.iter().map(|line| tokenize(line)).collect()
}

/// An indexed language-model corpus and the vocabulary it was indexed with
#[derive(Clone, Debug)]
pub struct LmCorpus {
    pub vocab: Vocabulary,
    pub examples: Vec<Example>,
    pub seq_len: usize,
    pub unk_count: usize,
    pub num_lines: usize,
}

impl LmCorpus {
    /// Build a vocabulary from `lines` and index them
    pub fn from_lines(lines: &[String], seq_len: usize, min_freq: usize) -> Result<Self> {
        let tokens = split_lines(lines);
        let vocab = VocabularyBuilder::new(VocabKind::Source, min_freq).build(&tokens);
        Self::index(&tokens, vocab, seq_len, "<lines>")
    }

    /// Index `lines` with an existing vocabulary (validation and inference)
    pub fn with_vocab(lines: &[String], vocab: Vocabulary, seq_len: usize) -> Result<Self> {
        let tokens = split_lines(lines);
        Self::index(&tokens, vocab, seq_len, "<lines>")
    }

    /// Read a corpus file and build its vocabulary
    pub fn from_file<P: AsRef<Path>>(path: P, seq_len: usize, min_freq: usize) -> Result<Self> {
        let name = path.as_ref().display().to_string();
        let lines = read_lines(&path)?;
        let tokens = split_lines(&lines);
        let vocab = VocabularyBuilder::new(VocabKind::Source, min_freq).build(&tokens);
        Self::index(&tokens, vocab, seq_len, &name)
    }

    /// Read a corpus file using an existing vocabulary
    pub fn from_file_with_vocab<P: AsRef<Path>>(
        path: P,
        vocab: Vocabulary,
        seq_len: usize,
    ) -> Result<Self> {
        let name = path.as_ref().display().to_string();
        let lines = read_lines(&path)?;
        Self::index(&split_lines(&lines), vocab, seq_len, &name)
    }

    fn index(tokens: &[Vec<&str>], vocab: Vocabulary, seq_len: usize, name: &str) -> Result<Self> {
        if seq_len == 0 {
            return Err(Error::InvalidConfig("seq_len must be at least 1".into()));
        }

        let mut unk_count = 0;
        let mut examples = Vec::new();
        for line in tokens {
            let ids = index_tokens(line, &vocab, &mut unk_count);
            examples.extend(windows(&ids, seq_len));
        }

        if examples.is_empty() {
            return Err(Error::EmptyCorpus(format!(
                "{} (no line has more than {} tokens)",
                name, seq_len
            )));
        }

        log::info!(
            "indexed {}: {} lines, {} windows of {} tokens, {} <unk>",
            name,
            tokens.len(),
            examples.len(),
            seq_len,
            unk_count
        );
        warn_unk_saturation(name, "corpus", unk_count, tokens);

        Ok(Self {
            vocab,
            examples,
            seq_len,
            unk_count,
            num_lines: tokens.len(),
        })
    }
}

/// An indexed source/target corpus and its two vocabularies
#[derive(Clone, Debug)]
pub struct ParallelCorpus {
    pub src_vocab: Vocabulary,
    pub tgt_vocab: Vocabulary,
    pub examples: Vec<Example>,
    pub unk: UnkCounts,
}

impl ParallelCorpus {
    /// Build both vocabularies from the lines and index them
    pub fn from_lines(src_lines: &[String], tgt_lines: &[String], min_freq: usize) -> Result<Self> {
        check_line_counts(src_lines, tgt_lines)?;
        let src_tokens = split_lines(src_lines);
        let tgt_tokens = split_lines(tgt_lines);
        let src_vocab = VocabularyBuilder::new(VocabKind::Source, min_freq).build(&src_tokens);
        let tgt_vocab = VocabularyBuilder::new(VocabKind::Target, min_freq).build(&tgt_tokens);
        Self::index(&src_tokens, &tgt_tokens, src_vocab, tgt_vocab, "<lines>")
    }

    /// Index the lines with vocabularies taken from a trained model
    pub fn with_vocabs(
        src_lines: &[String],
        tgt_lines: &[String],
        src_vocab: Vocabulary,
        tgt_vocab: Vocabulary,
    ) -> Result<Self> {
        check_line_counts(src_lines, tgt_lines)?;
        Self::index(
            &split_lines(src_lines),
            &split_lines(tgt_lines),
            src_vocab,
            tgt_vocab,
            "<lines>",
        )
    }

    /// Read a source/target file pair and build both vocabularies
    pub fn from_files<P: AsRef<Path>, Q: AsRef<Path>>(
        src_path: P,
        tgt_path: Q,
        min_freq: usize,
    ) -> Result<Self> {
        let src_lines = read_lines(&src_path)?;
        let tgt_lines = read_lines(&tgt_path)?;
        check_line_counts(&src_lines, &tgt_lines)?;
        let src_tokens = split_lines(&src_lines);
        let tgt_tokens = split_lines(&tgt_lines);
        let src_vocab = VocabularyBuilder::new(VocabKind::Source, min_freq).build(&src_tokens);
        let tgt_vocab = VocabularyBuilder::new(VocabKind::Target, min_freq).build(&tgt_tokens);
        let name = src_path.as_ref().display().to_string();
        Self::index(&src_tokens, &tgt_tokens, src_vocab, tgt_vocab, &name)
    }

    /// Read a source/target file pair using existing vocabularies
    pub fn from_files_with_vocabs<P: AsRef<Path>, Q: AsRef<Path>>(
        src_path: P,
        tgt_path: Q,
        src_vocab: Vocabulary,
        tgt_vocab: Vocabulary,
    ) -> Result<Self> {
        let src_lines = read_lines(&src_path)?;
        let tgt_lines = read_lines(&tgt_path)?;
        check_line_counts(&src_lines, &tgt_lines)?;
        let name = src_path.as_ref().display().to_string();
        Self::index(
            &split_lines(&src_lines),
            &split_lines(&tgt_lines),
            src_vocab,
            tgt_vocab,
            &name,
        )
    }

    fn index(
        src_tokens: &[Vec<&str>],
        tgt_tokens: &[Vec<&str>],
        src_vocab: Vocabulary,
        tgt_vocab: Vocabulary,
        name: &str,
    ) -> Result<Self> {
        let (bos, eos) = match (tgt_vocab.bos_id(), tgt_vocab.eos_id()) {
            (Some(bos), Some(eos)) => (bos, eos),
            _ => {
                return Err(Error::InvalidVocabulary(
                    "target vocabulary has no <bos>/<eos>".into(),
                ))
            }
        };
        if src_tokens.is_empty() {
            return Err(Error::EmptyCorpus(name.to_string()));
        }

        let mut unk = UnkCounts::default();
        let examples = src_tokens
            .iter()
            .zip(tgt_tokens)
            .map(|(src, tgt)| {
                let input = index_tokens(src, &src_vocab, &mut unk.source);
                let mut target = Vec::with_capacity(tgt.len() + 2);
                target.push(bos);
                target.extend(index_tokens(tgt, &tgt_vocab, &mut unk.target));
                target.push(eos);
                Example { input, target }
            })
            .collect::<Vec<_>>();

        log::info!(
            "indexed {}: {} pairs, <unk> {}",
            name,
            examples.len(),
            unk
        );
        warn_unk_saturation(name, "source", unk.source, src_tokens);
        warn_unk_saturation(name, "target", unk.target, tgt_tokens);

        Ok(Self {
            src_vocab,
            tgt_vocab,
            examples,
            unk,
        })
    }
}

/// Warn when more than half the tokens of one side fell back to `<unk>`
fn warn_unk_saturation(name: &str, side: &str, unk: usize, tokens: &[Vec<&str>]) {
    let total: usize = tokens.iter().map(Vec::len).sum();
    if total > 0 && unk * 2 > total {
        log::warn!(
            "{}: {} of {} {} tokens mapped to <unk>; is this the right vocabulary?",
            name,
            unk,
            total,
            side
        );
    }
}

fn check_line_counts(src_lines: &[String], tgt_lines: &[String]) -> Result<()> {
    if src_lines.len() != tgt_lines.len() {
        return Err(Error::LineCountMismatch {
            source_lines: src_lines.len(),
            target_lines: tgt_lines.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(text: &[&str]) -> Vec<String> {
        text.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_index_with_unknown() {
        let corpus = LmCorpus::from_lines(&lines(&["a b a", "b c"]), 1, 1).unwrap();
        let mut unk = 0;
        let ids = index_tokens(&tokenize("a c d"), &corpus.vocab, &mut unk);
        assert_eq!(ids, vec![2, 4, 1]);
        assert_eq!(unk, 1);
    }

    #[test]
    fn test_windows() {
        let examples = windows(&[2, 3, 4, 5, 6], 3);
        assert_eq!(examples.len(), 2);
        assert_eq!(examples[0].input, vec![2, 3, 4]);
        assert_eq!(examples[0].target, vec![3, 4, 5]);
        assert_eq!(examples[1].input, vec![3, 4, 5]);
        assert_eq!(examples[1].target, vec![4, 5, 6]);
    }

    #[test]
    fn test_short_line_contributes_nothing() {
        assert!(windows(&[2, 3, 4], 3).is_empty());
        assert_eq!(windows(&[2, 3, 4, 5], 3).len(), 1);
    }

    #[test]
    fn test_lm_corpus_windows_do_not_cross_lines() {
        let corpus = LmCorpus::from_lines(&lines(&["a b c", "d e f"]), 2, 1).unwrap();
        assert_eq!(corpus.examples.len(), 2);
        assert_eq!(corpus.examples[0].input, vec![2, 3]);
        assert_eq!(corpus.examples[1].input, vec![5, 6]);
    }

    #[test]
    fn test_lm_corpus_all_short_is_empty() {
        let err = LmCorpus::from_lines(&lines(&["a b"]), 4, 1).unwrap_err();
        assert!(matches!(err, Error::EmptyCorpus(_)));
    }

    #[test]
    fn test_lm_validation_reuses_vocab() {
        let train = LmCorpus::from_lines(&lines(&["a b c d"]), 2, 1).unwrap();
        let val = LmCorpus::with_vocab(&lines(&["a z c"]), train.vocab.clone(), 2).unwrap();
        assert_eq!(val.vocab, train.vocab);
        assert_eq!(val.unk_count, 1);
        assert_eq!(val.examples[0].input, vec![2, 1]);
    }

    #[test]
    fn test_parallel_wraps_target() {
        let corpus = ParallelCorpus::from_lines(
            &lines(&["jump twice", "walk"]),
            &lines(&["I_JUMP I_JUMP", "I_WALK"]),
            1,
        )
        .unwrap();
        assert_eq!(corpus.examples[0].input, vec![2, 3]);
        assert_eq!(corpus.examples[0].target, vec![2, 4, 4, 3]);
        assert_eq!(corpus.examples[1].target, vec![2, 5, 3]);
        assert_eq!(corpus.unk, UnkCounts::default());
    }

    #[test]
    fn test_parallel_line_mismatch_is_fatal() {
        let err = ParallelCorpus::from_lines(&lines(&["a", "b"]), &lines(&["x"]), 1).unwrap_err();
        assert!(matches!(
            err,
            Error::LineCountMismatch {
                source_lines: 2,
                target_lines: 1
            }
        ));
    }

    #[test]
    fn test_parallel_counts_unknowns_per_side() {
        let train =
            ParallelCorpus::from_lines(&lines(&["jump"]), &lines(&["I_JUMP"]), 1).unwrap();
        let eval = ParallelCorpus::with_vocabs(
            &lines(&["jump left", "run"]),
            &lines(&["I_JUMP", "I_RUN I_RUN"]),
            train.src_vocab.clone(),
            train.tgt_vocab.clone(),
        )
        .unwrap();
        assert_eq!(eval.unk, UnkCounts { source: 2, target: 2 });
        assert_eq!(eval.examples[1].target, vec![2, 1, 1, 3]);
    }

    #[test]
    fn test_parallel_empty_is_fatal() {
        let err = ParallelCorpus::from_lines(&[], &[], 1).unwrap_err();
        assert!(matches!(err, Error::EmptyCorpus(_)));
    }

    #[test]
    fn test_files_drop_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.txt");
        let tgt = dir.path().join("tgt.txt");
        fs::write(&src, "jump\n\n  walk left \n").unwrap();
        fs::write(&tgt, "I_JUMP\nI_TURN_LEFT I_WALK\n\n").unwrap();
        let corpus = ParallelCorpus::from_files(&src, &tgt, 1).unwrap();
        assert_eq!(corpus.examples.len(), 2);
        assert_eq!(corpus.examples[1].input, vec![3, 4]);
    }
}
