//! AdamW Optimizer
//!
//! Adam with decoupled weight decay. For each parameter θ with gradient g:
//!
//! ```text
//! θ = θ * (1 - α * λ)              # Weight decay (2-D tensors only)
//! m = β₁ * m + (1 - β₁) * g        # First moment (momentum)
//! v = β₂ * v + (1 - β₂) * g²       # Second moment (variance)
//! m_hat = m / (1 - β₁^t)           # Bias correction
//! v_hat = v / (1 - β₂^t)           # Bias correction
//! θ = θ - α * m_hat / (√v_hat + ε) # Parameter update
//! ```
//!
//! with β₁ = 0.9, β₂ = 0.95 and ε = 1e-8.
//!
//! ## Selective Weight Decay
//!
//! Decay is applied only to weight matrices (2-D tensors). Biases and other
//! 1-D tensors are left unregularized.
//!
//! ## Parameter Layout
//!
//! The optimizer knows nothing about the model. It keeps one moment pair per
//! tensor of the list returned by
//! [`Parameters::parameters_mut`](crate::scorer::Parameters::parameters_mut),
//! and gradients must arrive in that same order.

use crate::tensor::Tensor;
use rayon::prelude::*;

/// Tensors at or above this size are updated in parallel
const PARALLEL_THRESHOLD: usize = 1000;

/// AdamW optimizer state
///
/// # Fields
///
/// - **m**: first moment per parameter tensor
/// - **v**: second moment per parameter tensor
/// - **step**: number of updates applied (for bias correction)
pub struct AdamWOptimizer {
    pub m: Vec<Tensor>,
    pub v: Vec<Tensor>,
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
    pub step: usize,
}

impl AdamWOptimizer {
    /// Create zeroed optimizer state matching `params`
    pub fn new(params: &[&Tensor]) -> Self {
        Self {
            m: params.iter().map(|p| Tensor::zeros_like(p)).collect(),
            v: params.iter().map(|p| Tensor::zeros_like(p)).collect(),
            beta1: 0.9,
            beta2: 0.95,
            epsilon: 1e-8,
            step: 0,
        }
    }

    /// Apply one AdamW update
    ///
    /// # Panics
    ///
    /// Panics if `params`, `grads` and the optimizer state disagree in
    /// length or shape.
    pub fn step(&mut self, params: Vec<&mut Tensor>, grads: &[Tensor], lr: f32, weight_decay: f32) {
        assert_eq!(params.len(), grads.len(), "one gradient per parameter");
        assert_eq!(params.len(), self.m.len(), "optimizer built for another model");

        self.step += 1;
        let beta1 = self.beta1;
        let beta2 = self.beta2;
        let epsilon = self.epsilon;
        let bias_correction1 = 1.0 - beta1.powi(self.step as i32);
        let bias_correction2 = 1.0 - beta2.powi(self.step as i32);

        for (((param, grad), m), v) in params
            .into_iter()
            .zip(grads)
            .zip(self.m.iter_mut())
            .zip(self.v.iter_mut())
        {
            assert_eq!(param.shape, grad.shape, "gradient shape mismatch");
            let decay = if param.shape.len() == 2 {
                1.0 - lr * weight_decay
            } else {
                1.0
            };

            let update = |(((p, &g), m), v): (((&mut f32, &f32), &mut f32), &mut f32)| {
                *p *= decay;
                *m = beta1 * *m + (1.0 - beta1) * g;
                *v = beta2 * *v + (1.0 - beta2) * g * g;
                let m_hat = *m / bias_correction1;
                let v_hat = *v / bias_correction2;
                *p -= lr * m_hat / (v_hat.sqrt() + epsilon);
            };

            if param.data.len() >= PARALLEL_THRESHOLD {
                param
                    .data
                    .par_iter_mut()
                    .zip(grad.data.par_iter())
                    .zip(m.data.par_iter_mut())
                    .zip(v.data.par_iter_mut())
                    .for_each(update);
            } else {
                param
                    .data
                    .iter_mut()
                    .zip(&grad.data)
                    .zip(m.data.iter_mut())
                    .zip(v.data.iter_mut())
                    .for_each(update);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_first_step_moves_by_learning_rate() {
        // After bias correction the first step is lr * sign(g)
        let mut w = Tensor::new(vec![1.0, -1.0], vec![2]);
        let mut opt = AdamWOptimizer::new(&[&w]);
        let grads = vec![Tensor::new(vec![0.5, -2.0], vec![2])];
        opt.step(vec![&mut w], &grads, 0.1, 0.0);
        assert_relative_eq!(w.data[0], 0.9, epsilon = 1e-5);
        assert_relative_eq!(w.data[1], -0.9, epsilon = 1e-5);
        assert_eq!(opt.step, 1);
    }

    #[test]
    fn test_weight_decay_skips_vectors() {
        let mut matrix = Tensor::new(vec![1.0; 4], vec![2, 2]);
        let mut vector = Tensor::new(vec![1.0; 2], vec![2]);
        let mut opt = AdamWOptimizer::new(&[&matrix, &vector]);
        let grads = vec![Tensor::zeros(vec![2, 2]), Tensor::zeros(vec![2])];
        opt.step(vec![&mut matrix, &mut vector], &grads, 0.1, 0.5);
        assert_relative_eq!(matrix.data[0], 0.95, epsilon = 1e-6);
        assert_eq!(vector.data, vec![1.0, 1.0]);
    }

    #[test]
    fn test_minimizes_quadratic() {
        // f(w) = Σ (w - 3)²
        let mut w = Tensor::zeros(vec![1200]);
        let mut opt = AdamWOptimizer::new(&[&w]);
        for _ in 0..1000 {
            let grad = Tensor::new(w.data.iter().map(|&x| 2.0 * (x - 3.0)).collect(), vec![1200]);
            opt.step(vec![&mut w], &[grad], 0.02, 0.0);
        }
        assert!(w.data.iter().all(|&x| (x - 3.0).abs() < 0.1));
    }
}
