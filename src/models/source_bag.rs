//! Source-Bag Translator
//!
//! ```text
//! memory    = mean_{s not padded} source_rows[source[s]]
//! logits[t] = memory
//!           + transition[target[t]]
//!           + position[min(t, max_positions - 1)]
//!           + bias
//!           + mean_{j visible from t} context[target[j]]
//! ```
//!
//! The memory is computed once by `encode` and shared by every decode step.

use super::{add_context_average, add_row, context_average_backward};
use crate::checkpoint::{Checkpointable, ModelKind};
use crate::error::{Error, Result};
use crate::mask::CausalMask;
use crate::scorer::{Parameters, Seq2SeqScorer, TrainableSeq2SeqScorer};
use crate::tensor::Tensor;
use serde::{Deserialize, Serialize};

/// Hyperparameters of [`SourceBagTranslator`]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TranslatorConfig {
    pub source_vocab_size: usize,
    pub target_vocab_size: usize,
    /// Number of distinct position rows; later positions share the last one
    pub max_positions: usize,
    pub init_std: f32,
    pub seed: u64,
}

impl TranslatorConfig {
    pub fn new(source_vocab_size: usize, target_vocab_size: usize) -> Self {
        Self {
            source_vocab_size,
            target_vocab_size,
            max_positions: 64,
            init_std: 0.02,
            seed: 23456,
        }
    }
}

/// Encoded source: the pooled row plus the ids it was pooled from
#[derive(Clone, Debug, PartialEq)]
pub struct SourceMemory {
    pub pooled: Vec<f32>,
    pub ids: Vec<usize>,
}

pub struct SourceBagTranslator {
    config: TranslatorConfig,
    source_rows: Tensor,
    transition: Tensor,
    context: Tensor,
    position: Tensor,
    bias: Tensor,
}

impl SourceBagTranslator {
    pub fn new(config: TranslatorConfig) -> Self {
        let s = config.source_vocab_size;
        let t = config.target_vocab_size;
        let p = config.max_positions.max(1);
        let std = config.init_std;
        let seed = config.seed;
        Self {
            source_rows: Tensor::normal(vec![s, t], std, seed),
            transition: Tensor::normal(vec![t, t], std, seed.wrapping_add(1)),
            context: Tensor::normal(vec![t, t], std, seed.wrapping_add(2)),
            position: Tensor::normal(vec![p, t], std, seed.wrapping_add(3)),
            bias: Tensor::zeros(vec![t]),
            config,
        }
    }

    fn position_row(&self, t: usize) -> usize {
        t.min(self.position.rows() - 1)
    }
}

impl Seq2SeqScorer for SourceBagTranslator {
    type Memory = SourceMemory;

    fn source_vocab_size(&self) -> usize {
        self.config.source_vocab_size
    }

    fn target_vocab_size(&self) -> usize {
        self.config.target_vocab_size
    }

    fn encode(&self, source: &[usize], source_padding: &[bool]) -> SourceMemory {
        let ids: Vec<usize> = source
            .iter()
            .zip(source_padding)
            .filter(|&(_, &padded)| !padded)
            .map(|(&id, _)| id)
            .collect();

        let mut pooled = vec![0.0; self.config.target_vocab_size];
        if !ids.is_empty() {
            let weight = 1.0 / ids.len() as f32;
            for &id in &ids {
                for (p, &r) in pooled.iter_mut().zip(self.source_rows.row(id)) {
                    *p += weight * r;
                }
            }
        }
        SourceMemory { pooled, ids }
    }

    fn decode(
        &self,
        target: &[usize],
        memory: &SourceMemory,
        causal: &CausalMask,
        target_padding: &[bool],
    ) -> Tensor {
        let v = self.config.target_vocab_size;
        let mut logits = Tensor::zeros(vec![target.len(), v]);
        for (t, &id) in target.iter().enumerate() {
            let row = logits.row_mut(t);
            add_row(row, &memory.pooled);
            add_row(row, self.transition.row(id));
            add_row(row, self.position.row(self.position_row(t)));
            add_row(row, &self.bias.data);
            add_context_average(&self.context, target, causal, target_padding, t, row);
        }
        logits
    }
}

impl Parameters for SourceBagTranslator {
    fn parameters(&self) -> Vec<&Tensor> {
        vec![
            &self.source_rows,
            &self.transition,
            &self.context,
            &self.position,
            &self.bias,
        ]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        vec![
            &mut self.source_rows,
            &mut self.transition,
            &mut self.context,
            &mut self.position,
            &mut self.bias,
        ]
    }
}

impl TrainableSeq2SeqScorer for SourceBagTranslator {
    fn backward(
        &self,
        source: &[usize],
        source_padding: &[bool],
        target: &[usize],
        causal: &CausalMask,
        target_padding: &[bool],
        grad_logits: &Tensor,
    ) -> Vec<Tensor> {
        let v = self.config.target_vocab_size;
        let memory = self.encode(source, source_padding);

        let mut grad_source = Tensor::zeros_like(&self.source_rows);
        let mut grad_transition = Tensor::zeros_like(&self.transition);
        let mut grad_context = Tensor::zeros_like(&self.context);
        let mut grad_position = Tensor::zeros_like(&self.position);
        let mut grad_bias = Tensor::zeros_like(&self.bias);

        // Every position adds the same pooled memory, so its gradient is the
        // column sum of the logit gradients, spread over the pooled ids.
        let mut grad_pooled = vec![0.0; v];

        for (t, &id) in target.iter().enumerate() {
            let grad = grad_logits.row(t);
            if grad.iter().all(|&g| g == 0.0) {
                continue;
            }
            add_row(&mut grad_pooled, grad);
            add_row(grad_transition.row_mut(id), grad);
            add_row(grad_position.row_mut(self.position_row(t)), grad);
            add_row(&mut grad_bias.data, grad);
            context_average_backward(&mut grad_context, target, causal, target_padding, t, grad);
        }

        if !memory.ids.is_empty() {
            let weight = 1.0 / memory.ids.len() as f32;
            for &id in &memory.ids {
                for (g, &d) in grad_source.row_mut(id).iter_mut().zip(&grad_pooled) {
                    *g += weight * d;
                }
            }
        }

        vec![
            grad_source,
            grad_transition,
            grad_context,
            grad_position,
            grad_bias,
        ]
    }
}

impl Checkpointable for SourceBagTranslator {
    const KIND: ModelKind = ModelKind::Seq2Seq;
    type Config = TranslatorConfig;

    fn config(&self) -> &TranslatorConfig {
        &self.config
    }

    fn vocab_sizes(&self) -> Vec<usize> {
        vec![self.config.source_vocab_size, self.config.target_vocab_size]
    }

    fn from_state(config: TranslatorConfig, state: Vec<Tensor>) -> Result<Self> {
        let s = config.source_vocab_size;
        let t = config.target_vocab_size;
        let p = config.max_positions.max(1);
        let [source_rows, transition, context, position, bias]: [Tensor; 5] =
            state.try_into().map_err(|rest: Vec<Tensor>| {
                Error::InvalidConfig(format!("expected 5 tensors, got {}", rest.len()))
            })?;
        let shapes_ok = source_rows.shape == [s, t]
            && transition.shape == [t, t]
            && context.shape == [t, t]
            && position.shape == [p, t]
            && bias.shape == [t];
        if !shapes_ok {
            return Err(Error::InvalidConfig(format!(
                "model state does not match vocab sizes {}/{} and {} positions",
                s, t, p
            )));
        }
        Ok(Self {
            config,
            source_rows,
            transition,
            context,
            position,
            bias,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::padding_mask;
    use approx::assert_relative_eq;

    fn model() -> SourceBagTranslator {
        let mut config = TranslatorConfig::new(5, 7);
        config.max_positions = 4;
        SourceBagTranslator::new(config)
    }

    #[test]
    fn test_encode_skips_padding() {
        let m = model();
        let padded = m.encode(&[2, 3, 0, 0], &[false, false, true, true]);
        let unpadded = m.encode(&[2, 3], &[false, false]);
        assert_eq!(padded, unpadded);
        assert_eq!(padded.ids, vec![2, 3]);
    }

    #[test]
    fn test_decode_shape() {
        let m = model();
        let memory = m.encode(&[2, 3], &[false, false]);
        let target = [2, 4, 5];
        let logits = m.decode(&target, &memory, &CausalMask::new(3), &padding_mask(&target));
        assert_eq!(logits.shape, vec![3, 7]);
    }

    #[test]
    fn test_backward_matches_finite_difference() {
        let mut m = model();
        let source = [2, 4, 0];
        let source_padding = padding_mask(&source);
        let target = [2, 5, 6];
        let causal = CausalMask::new(3);
        let target_padding = padding_mask(&target);
        let upstream = Tensor::new((0..21).map(|i| (i as f32 * 0.71).cos()).collect(), vec![3, 7]);

        let loss = |m: &SourceBagTranslator| -> f32 {
            let memory = m.encode(&source, &source_padding);
            let l = m.decode(&target, &memory, &causal, &target_padding);
            l.data.iter().zip(&upstream.data).map(|(a, b)| a * b).sum()
        };
        let grads = m.backward(&source, &source_padding, &target, &causal, &target_padding, &upstream);

        let eps = 1e-2;
        // source_rows[4][2], transition[5][1], context[2][6], position[2][3], bias[0]
        for (param, element) in [(0usize, 4 * 7 + 2), (1, 5 * 7 + 1), (2, 2 * 7 + 6), (3, 2 * 7 + 3), (4, 0)] {
            let before = loss(&m);
            m.parameters_mut()[param].data[element] += eps;
            let after = loss(&m);
            m.parameters_mut()[param].data[element] -= eps;
            assert_relative_eq!(
                (after - before) / eps,
                grads[param].data[element],
                epsilon = 1e-3
            );
        }
    }

    #[test]
    fn test_state_roundtrip() {
        let m = model();
        let state: Vec<Tensor> = m.parameters().into_iter().cloned().collect();
        let restored = SourceBagTranslator::from_state(m.config().clone(), state).unwrap();
        assert_eq!(restored.parameters(), m.parameters());
    }
}
