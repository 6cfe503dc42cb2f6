//! Dense Row-Major Tensors
//!
//! A deliberately small tensor type. Scorers exchange logits as a
//! `[positions, vocab_size]` tensor and the reference models keep their
//! parameters as 1-D or 2-D tensors, so nothing here goes beyond
//! rows, element-wise updates and row-wise softmax.
//!
//! ## Example
//!
//! ```rust
//! use tokenfill::Tensor;
//!
//! let logits = Tensor::new(vec![1.0, 2.0, 3.0, 0.0, 0.0, 0.0], vec![2, 3]);
//! assert_eq!(logits.rows(), 2);
//! assert_eq!(logits.row(0), &[1.0, 2.0, 3.0]);
//!
//! let probs = logits.softmax_rows();
//! let sum: f32 = probs.row(1).iter().sum();
//! assert!((sum - 1.0).abs() < 1e-6);
//! ```

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;

/// A dense `f32` array stored in row-major order
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    /// Flat storage of all elements
    pub data: Vec<f32>,
    /// Dimensions, outermost first
    pub shape: Vec<usize>,
}

impl Tensor {
    /// Create a tensor from data and shape
    ///
    /// # Panics
    ///
    /// Panics if the product of `shape` doesn't equal `data.len()`
    pub fn new(data: Vec<f32>, shape: Vec<usize>) -> Self {
        let expected_size: usize = shape.iter().product();
        assert_eq!(
            data.len(),
            expected_size,
            "Data length ({}) doesn't match shape {:?} (expected {})",
            data.len(),
            shape,
            expected_size
        );
        Self { data, shape }
    }

    pub fn zeros(shape: Vec<usize>) -> Self {
        let size: usize = shape.iter().product();
        Self::new(vec![0.0; size], shape)
    }

    /// Zeros with the same shape as `other`
    pub fn zeros_like(other: &Tensor) -> Self {
        Self::zeros(other.shape.clone())
    }

    /// Gaussian initialization, reproducible for a given seed
    pub fn normal(shape: Vec<usize>, std: f32, seed: u64) -> Self {
        let size: usize = shape.iter().product();
        let mut rng = StdRng::seed_from_u64(seed);
        let data = match Normal::new(0.0, std) {
            Ok(normal) => (0..size).map(|_| normal.sample(&mut rng)).collect(),
            // Non-finite or negative std: fall back to zeros
            Err(_) => vec![0.0; size],
        };
        Self::new(data, shape)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of rows (first dimension; a 1-D tensor is a single row)
    pub fn rows(&self) -> usize {
        match self.shape.len() {
            0 | 1 => 1,
            _ => self.shape[0],
        }
    }

    /// Length of one row (product of all but the first dimension)
    pub fn cols(&self) -> usize {
        match self.shape.len() {
            0 => 1,
            1 => self.shape[0],
            _ => self.shape[1..].iter().product(),
        }
    }

    pub fn row(&self, i: usize) -> &[f32] {
        let cols = self.cols();
        &self.data[i * cols..(i + 1) * cols]
    }

    pub fn row_mut(&mut self, i: usize) -> &mut [f32] {
        let cols = self.cols();
        &mut self.data[i * cols..(i + 1) * cols]
    }

    /// Element-wise `self += other`
    ///
    /// # Panics
    ///
    /// Panics if the shapes differ
    pub fn add_assign(&mut self, other: &Tensor) {
        assert_eq!(self.shape, other.shape, "shape mismatch in add_assign");
        for (a, &b) in self.data.iter_mut().zip(&other.data) {
            *a += b;
        }
    }

    /// Multiply every element by `scale`
    pub fn scale(&mut self, scale: f32) {
        self.data.iter_mut().for_each(|x| *x *= scale);
    }

    /// Sum of squared elements
    pub fn sum_squares(&self) -> f32 {
        self.data.iter().map(|&x| x * x).sum()
    }

    /// Softmax applied independently to every row
    pub fn softmax_rows(&self) -> Tensor {
        let cols = self.cols();
        let data: Vec<f32> = self
            .data
            .par_chunks(cols.max(1))
            .flat_map_iter(|row| softmax(row))
            .collect();
        Tensor::new(data, self.shape.clone())
    }
}

/// Numerically stable softmax of one row
pub fn softmax(row: &[f32]) -> Vec<f32> {
    let max = row.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    let exp_values: Vec<f32> = row.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exp_values.iter().sum();
    exp_values.into_iter().map(|v| v / sum).collect()
}

/// Index of the largest value; ties resolve to the lowest index
pub fn argmax(row: &[f32]) -> usize {
    let mut best = 0;
    for (i, &value) in row.iter().enumerate() {
        if value > row[best] {
            best = i;
        }
    }
    best
}

/// `-log softmax(row)[target]`, computed without materializing the softmax
pub fn cross_entropy(row: &[f32], target: usize) -> f32 {
    let max = row.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    let exp_sum: f32 = row.iter().map(|&x| (x - max).exp()).sum();
    -((row[target] - max) - exp_sum.ln())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_rows_and_cols() {
        let t = Tensor::zeros(vec![3, 4]);
        assert_eq!(t.rows(), 3);
        assert_eq!(t.cols(), 4);
        let v = Tensor::zeros(vec![5]);
        assert_eq!(v.rows(), 1);
        assert_eq!(v.cols(), 5);
    }

    #[test]
    #[should_panic(expected = "doesn't match shape")]
    fn test_new_checks_shape() {
        Tensor::new(vec![1.0, 2.0, 3.0], vec![2, 2]);
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let t = Tensor::new(vec![1.0, 2.0, 3.0, -1.0, 0.0, 1000.0], vec![2, 3]);
        let p = t.softmax_rows();
        for i in 0..2 {
            let sum: f32 = p.row(i).iter().sum();
            assert_relative_eq!(sum, 1.0, epsilon = 1e-5);
        }
        assert!(p.row(1)[2] > 0.99);
    }

    #[test]
    fn test_argmax_ties_pick_lowest() {
        assert_eq!(argmax(&[0.5, 2.0, 2.0, 1.0]), 1);
        assert_eq!(argmax(&[3.0]), 0);
    }

    #[test]
    fn test_cross_entropy_uniform() {
        let row = [0.0f32; 4];
        assert_relative_eq!(cross_entropy(&row, 2), 4.0f32.ln(), epsilon = 1e-6);
    }

    #[test]
    fn test_normal_is_reproducible() {
        let a = Tensor::normal(vec![4, 4], 0.02, 7);
        let b = Tensor::normal(vec![4, 4], 0.02, 7);
        let c = Tensor::normal(vec![4, 4], 0.02, 8);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_add_assign_and_scale() {
        let mut a = Tensor::new(vec![1.0, 2.0], vec![2]);
        a.add_assign(&Tensor::new(vec![0.5, 0.5], vec![2]));
        a.scale(2.0);
        assert_eq!(a.data, vec![3.0, 5.0]);
        assert_relative_eq!(a.sum_squares(), 34.0);
    }
}
