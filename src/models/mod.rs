//! Reference Scorers
//!
//! Two small trainable models that implement the scorer traits. The
//! command-line tools train and evaluate these.
//!
//! - **context_bag**: language model. Each position sees a learned
//!   transition row for its own token plus the average of learned context
//!   rows over every key the causal and padding masks leave visible.
//! - **source_bag**: sequence-to-sequence model. The encoder averages learned
//!   rows of the source tokens into one memory vector; the decoder adds a
//!   transition row, a visible-prefix context average and a position row.
//!
//! ## Design Pattern
//!
//! Both follow the same shape:
//!
//! ```rust,ignore
//! pub struct Model {
//!     config: ModelConfig,   // serializable, stored in checkpoints
//!     // parameters as Tensors
//! }
//!
//! impl Model {
//!     pub fn new(config: ModelConfig) -> Self { }
//! }
//! // + scorer trait, Parameters, trainable extension, Checkpointable
//! ```
//!
//! Gradients are written out by hand: every logit row is a sum of parameter
//! rows, so the gradient of each row is the logit gradient itself (scaled
//! by `1 / count` for averaged rows).

pub mod context_bag;
pub mod source_bag;

pub use context_bag::{BagLmConfig, ContextBagLm};
pub use source_bag::{SourceBagTranslator, SourceMemory, TranslatorConfig};

use crate::mask::{visible_keys, CausalMask};
use crate::tensor::Tensor;

/// Add the mean of `table[ids[j]]` over the visible keys of query `i` to `out`
///
/// Returns the number of visible keys (0 leaves `out` untouched).
fn add_context_average(
    table: &Tensor,
    ids: &[usize],
    causal: &CausalMask,
    padding: &[bool],
    i: usize,
    out: &mut [f32],
) -> usize {
    let visible: Vec<usize> = visible_keys(causal, padding, i).collect();
    if visible.is_empty() {
        return 0;
    }
    let weight = 1.0 / visible.len() as f32;
    for &j in &visible {
        for (o, &c) in out.iter_mut().zip(table.row(ids[j])) {
            *o += weight * c;
        }
    }
    visible.len()
}

/// Scatter `grad` back to the context rows averaged by [`add_context_average`]
fn context_average_backward(
    grad_table: &mut Tensor,
    ids: &[usize],
    causal: &CausalMask,
    padding: &[bool],
    i: usize,
    grad: &[f32],
) {
    let visible: Vec<usize> = visible_keys(causal, padding, i).collect();
    if visible.is_empty() {
        return;
    }
    let weight = 1.0 / visible.len() as f32;
    for &j in &visible {
        for (g, &d) in grad_table.row_mut(ids[j]).iter_mut().zip(grad) {
            *g += weight * d;
        }
    }
}

fn add_row(out: &mut [f32], row: &[f32]) {
    for (o, &r) in out.iter_mut().zip(row) {
        *o += r;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::padding_mask;

    #[test]
    fn test_context_average_respects_masks() {
        let table = Tensor::new(vec![0.0, 0.0, 2.0, 0.0, 0.0, 4.0], vec![3, 2]);
        let ids = [1, 2, 0];
        let causal = CausalMask::new(3);
        let padding = padding_mask(&ids);

        let mut out = vec![0.0; 2];
        assert_eq!(add_context_average(&table, &ids, &causal, &padding, 0, &mut out), 1);
        assert_eq!(out, vec![2.0, 0.0]);

        // position 2 sees ids 1 and 2; the pad at index 2 is hidden
        let mut out = vec![0.0; 2];
        assert_eq!(add_context_average(&table, &ids, &causal, &padding, 2, &mut out), 2);
        assert_eq!(out, vec![1.0, 2.0]);
    }
}
