//! Common test utilities

#![allow(dead_code)]

use caratheodory_rust::{MomentMatrix, PruningResult, moments};
use mdarray::DTensor;

/// Simple deterministic pseudo-random number generator (LCG)
///
/// Linear Congruential Generator for reproducible random numbers in tests.
/// Uses the common parameters: a = 1664525, c = 1013904223 (from Numerical Recipes)
pub struct SimpleRng {
    state: u64,
}

impl SimpleRng {
    /// Create a new RNG with the given seed
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Generate next f64 in range [0, 1)
    pub fn next_f64(&mut self) -> f64 {
        self.state = self.state.wrapping_mul(1664525).wrapping_add(1013904223);
        // Map to [0, 1) using upper 48 bits
        ((self.state >> 16) as f64) / ((1u64 << 48) as f64)
    }
}

/// M × N moment matrix with a constant first column and entries in [-1, 1) elsewhere
pub fn random_moments(rng: &mut SimpleRng, m: usize, n: usize) -> DTensor<f64, 2> {
    let data: Vec<f64> = (0..m * n).map(|_| 2.0 * rng.next_f64() - 1.0).collect();
    DTensor::<f64, 2>::from_fn([m, n], |idx| {
        if idx[1] == 0 { 1.0 } else { data[idx[0] * n + idx[1]] }
    })
}

/// Strictly positive weights in (0.1, 1.1)
pub fn random_weights(rng: &mut SimpleRng, m: usize) -> Vec<f64> {
    (0..m).map(|_| 0.1 + rng.next_f64()).collect()
}

/// Deterministic entry used to build the same matrix densely and on demand
pub fn smooth_entry(i: usize, j: usize) -> f64 {
    let x = (i as f64 * 0.618_033_988_7).fract() * 2.0 - 1.0;
    (j as f64 * x.acos()).cos()
}

pub fn smooth_moments(m: usize, n: usize) -> DTensor<f64, 2> {
    DTensor::<f64, 2>::from_fn([m, n], |idx| smooth_entry(idx[0], idx[1]))
}

/// Check cardinality, support and moment preservation of a pruning result
pub fn assert_valid_pruning<M: MomentMatrix + ?Sized>(
    v: &M,
    w_in: &[f64],
    result: &PruningResult,
    tol: f64,
) {
    let (m, n) = (v.nrows(), v.ncols());
    assert_eq!(result.indices.len(), n, "expected {} indices", n);
    assert_eq!(result.weights.len(), n);
    assert!(result.indices.windows(2).all(|p| p[0] < p[1]));
    assert!(result.indices.iter().all(|&i| i < m));

    for (i, x) in result.pairs() {
        assert!(x >= -1e-12, "weight {} is negative: {}", i, x);
    }
    let dense = result.dense_weights(m);
    for (i, &x) in dense.iter().enumerate() {
        if result.indices.binary_search(&i).is_err() {
            assert_eq!(x, 0.0, "weight {} outside the support is {}", i, x);
        }
    }

    let all: Vec<usize> = (0..m).collect();
    let eta = moments(v, w_in, &all);
    let pruned = moments(v, &result.weights, &result.indices);
    for (j, (a, b)) in eta.iter().zip(pruned.iter()).enumerate() {
        assert!((a - b).abs() < tol, "moment {}: {} vs {}", j, a, b);
    }
}
