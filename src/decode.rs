//! Autoregressive Decoding
//!
//! Every decode follows the same state machine:
//!
//! ```text
//! Seeded ──step──▶ Generating ──step──▶ ... ──▶ Done
//!    │                                          ▲
//!    └──────────── (budget of 0) ───────────────┘
//! ```
//!
//! Each step rebuilds the causal mask for the current length, scores the
//! whole output so far, keeps only the logits of the last position and
//! picks the next id with a [`DecodePolicy`]. A step that emits the stop id
//! or exhausts the step budget moves the state to `Done`.
//!
//! ## Two Policies
//!
//! - **Language model** ([`generate`]): `DecodePolicy::Sample`. Logits are
//!   divided by the temperature, softmaxed and sampled with a seeded RNG.
//!   There is no stop id; exactly `length` tokens are appended.
//! - **Sequence-to-sequence** ([`greedy_decode`]): `DecodePolicy::Greedy`.
//!   Arg-max of the raw logits, ties to the lowest id. Starts from `<bos>`
//!   and stops at the first `<eos>` or after `max_len` steps.
//!
//! Evaluation accuracy is always measured with the greedy policy.

use crate::corpus::tokenize;
use crate::error::{Error, Result};
use crate::mask::{padding_mask, CausalMask};
use crate::scorer::{check_id_range, LanguageScorer, Seq2SeqScorer};
use crate::tensor::{argmax, softmax, Tensor};
use crate::vocab::Vocabulary;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// How the next id is picked from the last position's logits
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DecodePolicy {
    /// Sample from `softmax(logits / temperature)`
    Sample { temperature: f32 },
    /// Arg-max of the raw logits; ties go to the lowest id
    Greedy,
}

impl DecodePolicy {
    pub fn validate(&self) -> Result<()> {
        match *self {
            DecodePolicy::Sample { temperature } if !(temperature.is_finite() && temperature > 0.0) => {
                Err(Error::InvalidConfig(format!(
                    "temperature must be positive, got {}",
                    temperature
                )))
            }
            _ => Ok(()),
        }
    }

    /// Pick the next id. The greedy policy never draws from `rng`.
    pub fn choose<R: Rng>(&self, logits: &[f32], rng: &mut R) -> usize {
        match *self {
            DecodePolicy::Greedy => argmax(logits),
            DecodePolicy::Sample { temperature } => {
                let scaled: Vec<f32> = logits.iter().map(|&x| x / temperature).collect();
                sample_from_probs(&softmax(&scaled), rng)
            }
        }
    }
}

/// Draw an index from a probability distribution by cumulative sum
fn sample_from_probs<R: Rng>(probs: &[f32], rng: &mut R) -> usize {
    let rand_val: f32 = rng.random();
    let mut cumsum = 0.0;
    for (i, &p) in probs.iter().enumerate() {
        cumsum += p;
        if rand_val < cumsum {
            return i;
        }
    }
    // Rounding can leave the total just under 1.0
    probs.len().saturating_sub(1)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodePhase {
    Seeded,
    Generating,
    Done,
}

/// The growing output of one decode
#[derive(Clone, Debug)]
pub struct DecodeState {
    ids: Vec<usize>,
    budget: usize,
    steps: usize,
    stop_id: Option<usize>,
    phase: DecodePhase,
}

impl DecodeState {
    /// Start from `initial` with room for `budget` more ids
    pub fn new(initial: Vec<usize>, budget: usize, stop_id: Option<usize>) -> Self {
        let phase = if budget == 0 {
            DecodePhase::Done
        } else {
            DecodePhase::Seeded
        };
        Self {
            ids: initial,
            budget,
            steps: 0,
            stop_id,
            phase,
        }
    }

    pub fn ids(&self) -> &[usize] {
        &self.ids
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn phase(&self) -> DecodePhase {
        self.phase
    }

    pub fn is_done(&self) -> bool {
        self.phase == DecodePhase::Done
    }

    /// Append one chosen id and advance the phase
    pub fn push(&mut self, id: usize) {
        debug_assert!(!self.is_done(), "push after Done");
        self.ids.push(id);
        self.steps += 1;
        self.phase = if Some(id) == self.stop_id || self.steps >= self.budget {
            DecodePhase::Done
        } else {
            DecodePhase::Generating
        };
    }

    pub fn into_ids(self) -> Vec<usize> {
        self.ids
    }
}

/// Step `state` to `Done`; `score` returns logits for every position of the prefix
fn run<R, F>(mut state: DecodeState, policy: &DecodePolicy, rng: &mut R, mut score: F) -> Vec<usize>
where
    R: Rng,
    F: FnMut(&[usize], &CausalMask) -> Tensor,
{
    while !state.is_done() {
        let causal = CausalMask::new(state.ids().len());
        let logits = score(state.ids(), &causal);
        let next = policy.choose(logits.row(logits.rows() - 1), rng);
        state.push(next);
    }
    state.into_ids()
}

/// Language-model sampling options
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecodeOptions {
    /// Number of tokens appended after the prompt
    pub length: usize,
    pub temperature: f32,
    /// Seed of the sampling RNG
    pub seed: u64,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            length: 20,
            temperature: 1.0,
            seed: 42,
        }
    }
}

/// Map a prompt to its initial ids
///
/// Unknown tokens become `<unk>`. An empty prompt starts from the first
/// regular id of the vocabulary, or `<unk>` if it has none.
pub fn seed_prompt(prompt: &str, vocab: &Vocabulary) -> Vec<usize> {
    let ids: Vec<usize> = tokenize(prompt).into_iter().map(|t| vocab.id_or_unk(t)).collect();
    if ids.is_empty() {
        vec![vocab.first_regular_id().unwrap_or_else(|| vocab.unk_id())]
    } else {
        ids
    }
}

/// Append exactly `length` ids to `prompt`
///
/// Returns the prompt followed by the generated ids.
pub fn generate<S, R>(
    scorer: &S,
    prompt: Vec<usize>,
    length: usize,
    policy: &DecodePolicy,
    rng: &mut R,
) -> Result<Vec<usize>>
where
    S: LanguageScorer + ?Sized,
    R: Rng,
{
    policy.validate()?;
    if prompt.is_empty() {
        return Err(Error::InvalidConfig("generation needs at least one prompt id".into()));
    }
    check_id_range("prompt", &prompt, scorer.vocab_size())?;
    let state = DecodeState::new(prompt, length, None);
    Ok(run(state, policy, rng, |ids, causal| {
        scorer.score(ids, causal, &padding_mask(ids))
    }))
}

/// Sample a continuation of `prompt` and render it as text
pub fn generate_text<S: LanguageScorer + ?Sized>(
    scorer: &S,
    vocab: &Vocabulary,
    prompt: &str,
    options: &DecodeOptions,
) -> Result<String> {
    let policy = DecodePolicy::Sample {
        temperature: options.temperature,
    };
    let mut rng = StdRng::seed_from_u64(options.seed);
    let ids = generate(scorer, seed_prompt(prompt, vocab), options.length, &policy, &mut rng)?;
    Ok(vocab.detokenize(&ids))
}

/// Greedy seq2seq decode from `<bos>`
///
/// The source is encoded once and its memory reused at every step. Returns
/// the full output including the leading `bos` and, if emitted, the final
/// `eos`; at most `max_len` ids follow `bos`. Source ids and `bos`/`eos`
/// outside the scorer's vocabularies are [`Error::IdOutOfRange`].
pub fn greedy_decode<S: Seq2SeqScorer + ?Sized>(
    scorer: &S,
    source: &[usize],
    bos: usize,
    eos: usize,
    max_len: usize,
) -> Result<Vec<usize>> {
    check_id_range("source", source, scorer.source_vocab_size())?;
    check_id_range("target", &[bos, eos], scorer.target_vocab_size())?;

    let memory = scorer.encode(source, &padding_mask(source));
    let state = DecodeState::new(vec![bos], max_len, Some(eos));
    // Greedy never draws, so the seed is irrelevant
    let mut rng = StdRng::seed_from_u64(0);
    Ok(run(state, &DecodePolicy::Greedy, &mut rng, |ids, causal| {
        scorer.decode(ids, &memory, causal, &padding_mask(ids))
    }))
}

/// Drop one leading `bos` and one trailing `eos`, if present
pub fn strip_bos_eos(ids: &[usize], bos: usize, eos: usize) -> &[usize] {
    let ids = ids.strip_prefix(&[bos]).unwrap_or(ids);
    ids.strip_suffix(&[eos]).unwrap_or(ids)
}

/// Translate one whitespace-tokenized source line
///
/// Returns the predicted target ids without `bos`/`eos`.
pub fn translate<S: Seq2SeqScorer + ?Sized>(
    scorer: &S,
    src_vocab: &Vocabulary,
    tgt_vocab: &Vocabulary,
    line: &str,
    max_len: usize,
) -> Result<Vec<usize>> {
    let (bos, eos) = match (tgt_vocab.bos_id(), tgt_vocab.eos_id()) {
        (Some(bos), Some(eos)) => (bos, eos),
        _ => {
            return Err(Error::InvalidVocabulary(
                "target vocabulary has no <bos>/<eos> tokens".into(),
            ))
        }
    };
    let source: Vec<usize> = tokenize(line).into_iter().map(|t| src_vocab.id_or_unk(t)).collect();
    let output = greedy_decode(scorer, &source, bos, eos, max_len)?;
    Ok(strip_bos_eos(&output, bos, eos).to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab::{VocabKind, VocabularyBuilder, BOS_ID, EOS_ID};

    /// Always prefers `(last id + 1) % vocab`
    struct Counter {
        vocab: usize,
    }

    impl LanguageScorer for Counter {
        fn vocab_size(&self) -> usize {
            self.vocab
        }

        fn score(&self, ids: &[usize], causal: &CausalMask, padding: &[bool]) -> Tensor {
            assert_eq!(causal.len(), ids.len());
            assert_eq!(padding.len(), ids.len());
            let mut logits = Tensor::zeros(vec![ids.len(), self.vocab]);
            for (t, &id) in ids.iter().enumerate() {
                logits.row_mut(t)[(id + 1) % self.vocab] = 10.0;
            }
            logits
        }
    }

    /// Emits the source ids in order, then `eos` (or id 4 forever without `emit_eos`)
    struct Echo {
        vocab: usize,
        emit_eos: bool,
    }

    impl Seq2SeqScorer for Echo {
        type Memory = Vec<usize>;

        fn source_vocab_size(&self) -> usize {
            self.vocab
        }

        fn target_vocab_size(&self) -> usize {
            self.vocab
        }

        fn encode(&self, source: &[usize], _source_padding: &[bool]) -> Vec<usize> {
            source.to_vec()
        }

        fn decode(
            &self,
            target: &[usize],
            memory: &Vec<usize>,
            causal: &CausalMask,
            _target_padding: &[bool],
        ) -> Tensor {
            assert_eq!(causal.len(), target.len());
            let mut logits = Tensor::zeros(vec![target.len(), self.vocab]);
            let t = target.len() - 1;
            let next = match memory.get(t) {
                Some(&id) => id,
                None if self.emit_eos => EOS_ID,
                None => 4,
            };
            logits.row_mut(t)[next] = 5.0;
            logits
        }
    }

    #[test]
    fn test_state_phases() {
        let mut state = DecodeState::new(vec![BOS_ID], 2, Some(EOS_ID));
        assert_eq!(state.phase(), DecodePhase::Seeded);
        state.push(5);
        assert_eq!(state.phase(), DecodePhase::Generating);
        state.push(6);
        assert_eq!(state.phase(), DecodePhase::Done);
        assert_eq!(state.steps(), 2);

        let mut state = DecodeState::new(vec![BOS_ID], 10, Some(EOS_ID));
        state.push(EOS_ID);
        assert!(state.is_done());

        assert!(DecodeState::new(vec![BOS_ID], 0, None).is_done());
    }

    #[test]
    fn test_greedy_stops_at_eos() {
        let scorer = Echo { vocab: 8, emit_eos: true };
        let out = greedy_decode(&scorer, &[5, 6], BOS_ID, EOS_ID, 10).unwrap();
        assert_eq!(out, vec![BOS_ID, 5, 6, EOS_ID]);
        assert_eq!(strip_bos_eos(&out, BOS_ID, EOS_ID), &[5, 6]);
    }

    #[test]
    fn test_greedy_respects_budget_without_eos() {
        let scorer = Echo { vocab: 8, emit_eos: false };
        let out = greedy_decode(&scorer, &[5], BOS_ID, EOS_ID, 3).unwrap();
        assert_eq!(out, vec![BOS_ID, 5, 4, 4]);
        assert_eq!(strip_bos_eos(&out, BOS_ID, EOS_ID), &[5, 4, 4]);
    }

    #[test]
    fn test_greedy_ties_pick_lowest_id() {
        assert_eq!(DecodePolicy::Greedy.choose(&[0.0, 1.0, 1.0, 0.5], &mut StdRng::seed_from_u64(1)), 1);
        assert_eq!(DecodePolicy::Greedy.choose(&[0.0; 5], &mut StdRng::seed_from_u64(1)), 0);
    }

    #[test]
    fn test_generate_runs_exact_length() {
        let scorer = Counter { vocab: 6 };
        let policy = DecodePolicy::Sample { temperature: 0.01 };
        let mut rng = StdRng::seed_from_u64(7);
        let ids = generate(&scorer, vec![2], 5, &policy, &mut rng).unwrap();
        // Near-zero temperature follows the counter; 3 (an end token
        // elsewhere) does not stop a language-model decode.
        assert_eq!(ids, vec![2, 3, 4, 5, 0, 1]);
    }

    #[test]
    fn test_sampling_is_seeded() {
        let scorer = Counter { vocab: 6 };
        let policy = DecodePolicy::Sample { temperature: 50.0 };
        let sample = |seed| generate(&scorer, vec![2], 12, &policy, &mut StdRng::seed_from_u64(seed)).unwrap();
        assert_eq!(sample(3), sample(3));
        assert_eq!(sample(3).len(), 13);
    }

    #[test]
    fn test_invalid_temperature_rejected() {
        let scorer = Counter { vocab: 6 };
        for temperature in [0.0, -1.0, f32::NAN] {
            let policy = DecodePolicy::Sample { temperature };
            let result = generate(&scorer, vec![2], 3, &policy, &mut StdRng::seed_from_u64(0));
            assert!(matches!(result, Err(Error::InvalidConfig(_))));
        }
    }

    #[test]
    fn test_seed_prompt() {
        let vocab = VocabularyBuilder::new(VocabKind::Source, 1).build(&[vec!["to", "be"]]);
        assert_eq!(seed_prompt("be  to", &vocab), vec![3, 2]);
        assert_eq!(seed_prompt("to unseen", &vocab), vec![2, 1]);
        assert_eq!(seed_prompt("   ", &vocab), vec![2]);

        let bare = Vocabulary::empty(VocabKind::Source);
        assert_eq!(seed_prompt("", &bare), vec![bare.unk_id()]);
    }

    #[test]
    fn test_generate_text_renders_tokens() {
        let vocab = VocabularyBuilder::new(VocabKind::Source, 1).build(&[vec!["a", "b", "c", "d"]]);
        let scorer = Counter { vocab: vocab.len() };
        let options = DecodeOptions {
            length: 3,
            temperature: 0.01,
            seed: 1,
        };
        assert_eq!(generate_text(&scorer, &vocab, "a", &options).unwrap(), "a b c d");
    }

    #[test]
    fn test_translate_maps_through_vocabularies() {
        // "p" and "q" get ids 4 and 5 on both sides, so echoing the source
        // reproduces the line.
        let src = VocabularyBuilder::new(VocabKind::Source, 1).build(&[vec!["u", "v", "p", "q"]]);
        let tgt = VocabularyBuilder::new(VocabKind::Target, 1).build(&[vec!["p", "q"]]);
        let scorer = Echo { vocab: 6, emit_eos: true };

        let ids = translate(&scorer, &src, &tgt, "p q", 5).unwrap();
        assert_eq!(ids, vec![4, 5]);
        assert_eq!(tgt.detokenize(&ids), "p q");

        let source_only = Vocabulary::empty(VocabKind::Source);
        assert!(translate(&scorer, &src, &source_only, "p", 5).is_err());
    }

    #[test]
    fn test_ids_outside_scorer_vocabulary_are_fatal() {
        let policy = DecodePolicy::Sample { temperature: 1.0 };
        let result = generate(&Counter { vocab: 6 }, vec![2, 6], 3, &policy, &mut StdRng::seed_from_u64(0));
        assert!(matches!(
            result,
            Err(Error::IdOutOfRange { side: "prompt", id: 6, vocab_size: 6 })
        ));

        let scorer = Echo { vocab: 6, emit_eos: true };
        assert!(matches!(
            greedy_decode(&scorer, &[4, 7], BOS_ID, EOS_ID, 5),
            Err(Error::IdOutOfRange { side: "source", id: 7, .. })
        ));
        assert!(matches!(
            greedy_decode(&scorer, &[4], BOS_ID, 9, 5),
            Err(Error::IdOutOfRange { side: "target", id: 9, .. })
        ));
    }

    #[test]
    fn test_vocabulary_larger_than_model_is_rejected() {
        use crate::models::{BagLmConfig, ContextBagLm, SourceBagTranslator, TranslatorConfig};

        // Ten ids against a four-row model: "h" is id 9
        let vocab = VocabularyBuilder::new(VocabKind::Source, 1)
            .build(&[vec!["a", "b", "c", "d", "e", "f", "g", "h"]]);
        assert_eq!(vocab.len(), 10);
        let lm = ContextBagLm::new(BagLmConfig::new(4));
        assert!(matches!(
            generate_text(&lm, &vocab, "h g", &DecodeOptions::default()),
            Err(Error::IdOutOfRange { side: "prompt", id: 9, vocab_size: 4 })
        ));

        let src = VocabularyBuilder::new(VocabKind::Source, 1).build(&[vec!["u", "v", "w", "x", "y"]]);
        let tgt = VocabularyBuilder::new(VocabKind::Target, 1).build(&[vec!["p", "q"]]);
        let translator = SourceBagTranslator::new(TranslatorConfig::new(3, tgt.len()));
        assert!(matches!(
            translate(&translator, &src, &tgt, "y", 5),
            Err(Error::IdOutOfRange { side: "source", id: 6, vocab_size: 3 })
        ));
    }

    #[test]
    fn test_strip_only_edges() {
        assert_eq!(strip_bos_eos(&[2, 5, 3, 6], 2, 3), &[5, 3, 6]);
        assert_eq!(strip_bos_eos(&[5, 6], 2, 3), &[5, 6]);
        assert_eq!(strip_bos_eos(&[2, 3], 2, 3), &[] as &[usize]);
    }
}
