//! Attention Masks
//!
//! Two independent structures decide whether position `i` may look at
//! position `j`:
//!
//! - the **causal mask** blocks strictly-future positions (`j > i`);
//! - the **padding mask** blocks positions that hold the pad id.
//!
//! A position is blocked if *either* says so. For `n = 4`:
//!
//! ```text
//! causal            padding [F F T T]     combined
//! [0 1 1 1]                               [0 1 1 1]
//! [0 0 1 1]                               [0 0 1 1]
//! [0 0 0 1]                               [0 0 1 1]
//! [0 0 0 0]                               [0 0 1 1]
//! ```
//!
//! The causal mask is rebuilt for every sequence length; it is cheap and a
//! mask of the wrong size is a silent correctness bug.

use crate::vocab::PAD_ID;

/// Strict upper-triangular blocking structure for one sequence length
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CausalMask {
    len: usize,
    blocked: Vec<bool>,
}

impl CausalMask {
    /// Build the `n × n` mask where `(i, j)` is blocked iff `j > i`
    pub fn new(len: usize) -> Self {
        let mut blocked = vec![false; len * len];
        for i in 0..len {
            for j in (i + 1)..len {
                blocked[i * len + j] = true;
            }
        }
        Self { len, blocked }
    }

    /// Sequence length the mask was built for
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether query position `i` is prevented from attending to key `j`
    ///
    /// # Panics
    ///
    /// Panics if `i` or `j` is not below [`CausalMask::len`]
    pub fn is_blocked(&self, i: usize, j: usize) -> bool {
        assert!(
            i < self.len && j < self.len,
            "position ({}, {}) outside causal mask of length {}",
            i,
            j,
            self.len
        );
        self.blocked[i * self.len + j]
    }

    /// Row `i` of the mask
    pub fn row(&self, i: usize) -> &[bool] {
        &self.blocked[i * self.len..(i + 1) * self.len]
    }
}

/// Padding mask of one id sequence: `true` wherever the id is the pad id
pub fn padding_mask(ids: &[usize]) -> Vec<bool> {
    ids.iter().map(|&id| id == PAD_ID).collect()
}

/// Combined causal and key-padding decision for the pair `(i, j)`
pub fn attention_blocked(causal: &CausalMask, key_padding: &[bool], i: usize, j: usize) -> bool {
    causal.is_blocked(i, j) || key_padding.get(j).copied().unwrap_or(false)
}

/// Keys visible to query `i` under both masks
pub fn visible_keys<'a>(
    causal: &'a CausalMask,
    key_padding: &'a [bool],
    i: usize,
) -> impl Iterator<Item = usize> + 'a {
    (0..causal.len()).filter(move |&j| !attention_blocked(causal, key_padding, i, j))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_causal_mask_four() {
        let mask = CausalMask::new(4);
        assert_eq!(mask.row(0), &[false, true, true, true]);
        assert_eq!(mask.row(3), &[false, false, false, false]);
    }

    #[test]
    fn test_empty_mask() {
        let mask = CausalMask::new(0);
        assert!(mask.is_empty());
    }

    #[test]
    fn test_padding_mask() {
        assert_eq!(padding_mask(&[5, 0, 3, 0]), vec![false, true, false, true]);
    }

    #[test]
    fn test_combined_blocking() {
        let causal = CausalMask::new(4);
        let padding = padding_mask(&[7, 8, 0, 0]);
        assert!(!attention_blocked(&causal, &padding, 3, 1));
        assert!(attention_blocked(&causal, &padding, 3, 2));
        assert!(attention_blocked(&causal, &padding, 0, 1));
        let visible: Vec<usize> = visible_keys(&causal, &padding, 3).collect();
        assert_eq!(visible, vec![0, 1]);
    }

    proptest! {
        #[test]
        fn prop_causal_blocks_exactly_future(n in 0usize..24) {
            let mask = CausalMask::new(n);
            for i in 0..n {
                for j in 0..n {
                    prop_assert_eq!(mask.is_blocked(i, j), j > i);
                }
            }
        }

        #[test]
        fn prop_combined_is_or(ids in prop::collection::vec(0usize..3, 1..12)) {
            let n = ids.len();
            let causal = CausalMask::new(n);
            let padding = padding_mask(&ids);
            for i in 0..n {
                for j in 0..n {
                    prop_assert_eq!(
                        attention_blocked(&causal, &padding, i, j),
                        j > i || ids[j] == 0
                    );
                }
            }
        }
    }
}
