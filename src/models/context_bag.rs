//! Context-Bag Language Model
//!
//! ```text
//! logits[t] = transition[ids[t]] + bias + mean_{j visible from t} context[ids[j]]
//! ```
//!
//! "Visible" is decided by the causal mask and the padding mask together, so
//! the model can never peek at the token it is asked to predict.

use super::{add_context_average, add_row, context_average_backward};
use crate::checkpoint::{Checkpointable, ModelKind};
use crate::error::{Error, Result};
use crate::mask::CausalMask;
use crate::scorer::{LanguageScorer, Parameters, TrainableLanguageScorer};
use crate::tensor::Tensor;
use serde::{Deserialize, Serialize};

/// Hyperparameters of [`ContextBagLm`]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BagLmConfig {
    pub vocab_size: usize,
    /// Standard deviation of the initial weights
    pub init_std: f32,
    /// Seed for weight initialization
    pub seed: u64,
}

impl BagLmConfig {
    pub fn new(vocab_size: usize) -> Self {
        Self {
            vocab_size,
            init_std: 0.02,
            seed: 12345,
        }
    }
}

pub struct ContextBagLm {
    config: BagLmConfig,
    transition: Tensor,
    context: Tensor,
    bias: Tensor,
}

impl ContextBagLm {
    pub fn new(config: BagLmConfig) -> Self {
        let v = config.vocab_size;
        Self {
            transition: Tensor::normal(vec![v, v], config.init_std, config.seed),
            context: Tensor::normal(vec![v, v], config.init_std, config.seed.wrapping_add(1)),
            bias: Tensor::zeros(vec![v]),
            config,
        }
    }
}

impl LanguageScorer for ContextBagLm {
    fn vocab_size(&self) -> usize {
        self.config.vocab_size
    }

    fn score(&self, ids: &[usize], causal: &CausalMask, padding: &[bool]) -> Tensor {
        let v = self.config.vocab_size;
        let mut logits = Tensor::zeros(vec![ids.len(), v]);
        for (t, &id) in ids.iter().enumerate() {
            let row = logits.row_mut(t);
            add_row(row, self.transition.row(id));
            add_row(row, &self.bias.data);
            add_context_average(&self.context, ids, causal, padding, t, row);
        }
        logits
    }
}

impl Parameters for ContextBagLm {
    fn parameters(&self) -> Vec<&Tensor> {
        vec![&self.transition, &self.context, &self.bias]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        vec![&mut self.transition, &mut self.context, &mut self.bias]
    }
}

impl TrainableLanguageScorer for ContextBagLm {
    fn backward(
        &self,
        ids: &[usize],
        causal: &CausalMask,
        padding: &[bool],
        grad_logits: &Tensor,
    ) -> Vec<Tensor> {
        let mut grad_transition = Tensor::zeros_like(&self.transition);
        let mut grad_context = Tensor::zeros_like(&self.context);
        let mut grad_bias = Tensor::zeros_like(&self.bias);

        for (t, &id) in ids.iter().enumerate() {
            let grad = grad_logits.row(t);
            if grad.iter().all(|&g| g == 0.0) {
                continue;
            }
            add_row(grad_transition.row_mut(id), grad);
            add_row(&mut grad_bias.data, grad);
            context_average_backward(&mut grad_context, ids, causal, padding, t, grad);
        }

        vec![grad_transition, grad_context, grad_bias]
    }
}

impl Checkpointable for ContextBagLm {
    const KIND: ModelKind = ModelKind::LanguageModel;
    type Config = BagLmConfig;

    fn config(&self) -> &BagLmConfig {
        &self.config
    }

    fn vocab_sizes(&self) -> Vec<usize> {
        vec![self.config.vocab_size]
    }

    fn from_state(config: BagLmConfig, state: Vec<Tensor>) -> Result<Self> {
        let v = config.vocab_size;
        let [transition, context, bias]: [Tensor; 3] = state
            .try_into()
            .map_err(|s: Vec<Tensor>| Error::InvalidConfig(format!("expected 3 tensors, got {}", s.len())))?;
        if transition.shape != [v, v] || context.shape != [v, v] || bias.shape != [v] {
            return Err(Error::InvalidConfig(format!(
                "model state does not match vocab_size {}",
                v
            )));
        }
        Ok(Self {
            config,
            transition,
            context,
            bias,
        })
    }
}
