//! Gradient Utilities
//!
//! Helpers applied to a model's gradient list between `backward` and the
//! optimizer step.
//!
//! ## Gradient Clipping
//!
//! Occasional batches produce very large gradients. Clipping rescales the
//! whole gradient list when its global L2 norm exceeds a threshold:
//!
//! ```text
//! norm = √(Σ gradient²)  // over every tensor
//! if norm > max_norm:
//!     gradients *= (max_norm / norm)
//! ```
//!
//! Every tensor is scaled by the same factor, so the update keeps its
//! direction.
//!
//! ## Example
//!
//! ```rust
//! use tokenfill::gradients::{clip_gradients, compute_grad_norm};
//! use tokenfill::Tensor;
//!
//! let mut grads = vec![Tensor::new(vec![3.0, 4.0], vec![2])];
//! assert_eq!(compute_grad_norm(&grads), 5.0);
//!
//! clip_gradients(&mut grads, 1.0);
//! assert!((compute_grad_norm(&grads) - 1.0).abs() < 1e-6);
//! ```

use crate::tensor::Tensor;
use rayon::prelude::*;

/// Global L2 norm over a list of gradient tensors
pub fn compute_grad_norm(grads: &[Tensor]) -> f32 {
    grads
        .iter()
        .map(|g| g.data.par_iter().map(|&val| val * val).sum::<f32>())
        .sum::<f32>()
        .sqrt()
}

/// Scale `grads` so their global norm is at most `max_norm`
///
/// Returns the norm measured before clipping, which the trainer logs.
/// A non-positive `max_norm` disables clipping.
pub fn clip_gradients(grads: &mut [Tensor], max_norm: f32) -> f32 {
    let norm = compute_grad_norm(grads);
    if max_norm > 0.0 && norm > max_norm {
        let scale = max_norm / norm;
        for grad in grads.iter_mut() {
            grad.data.par_iter_mut().for_each(|val| *val *= scale);
        }
    }
    norm
}

/// Element-wise sum of two gradient lists of identical layout
///
/// # Panics
///
/// Panics if the lists differ in length or any pair differs in shape.
pub fn accumulate(total: &mut [Tensor], grads: &[Tensor]) {
    assert_eq!(total.len(), grads.len(), "gradient lists differ in length");
    for (t, g) in total.iter_mut().zip(grads) {
        t.add_assign(g);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_norm_spans_all_tensors() {
        let grads = vec![
            Tensor::new(vec![1.0, 2.0], vec![2]),
            Tensor::new(vec![2.0, 4.0], vec![1, 2]),
        ];
        assert_relative_eq!(compute_grad_norm(&grads), 5.0);
    }

    #[test]
    fn test_clip_leaves_small_gradients_alone() {
        let mut grads = vec![Tensor::new(vec![0.3, 0.4], vec![2])];
        let norm = clip_gradients(&mut grads, 1.0);
        assert_relative_eq!(norm, 0.5);
        assert_eq!(grads[0].data, vec![0.3, 0.4]);
    }

    #[test]
    fn test_clip_preserves_direction() {
        let mut grads = vec![
            Tensor::new(vec![6.0], vec![1]),
            Tensor::new(vec![8.0], vec![1]),
        ];
        clip_gradients(&mut grads, 2.0);
        assert_relative_eq!(grads[0].data[0], 1.2, epsilon = 1e-6);
        assert_relative_eq!(grads[1].data[0], 1.6, epsilon = 1e-6);
    }

    #[test]
    fn test_zero_max_norm_disables_clipping() {
        let mut grads = vec![Tensor::new(vec![30.0, 40.0], vec![2])];
        clip_gradients(&mut grads, 0.0);
        assert_eq!(grads[0].data, vec![30.0, 40.0]);
    }

    #[test]
    fn test_accumulate() {
        let mut total = vec![Tensor::zeros(vec![2])];
        accumulate(&mut total, &[Tensor::new(vec![1.0, 2.0], vec![2])]);
        accumulate(&mut total, &[Tensor::new(vec![0.5, 0.5], vec![2])]);
        assert_eq!(total[0].data, vec![1.5, 2.5]);
    }
}
