//! Read access to moment matrices and weight vectors
//!
//! The pruning engine and the downdaters only ever read rows, columns and
//! weighted sums of rows, so dense tensors, lazily generated matrices and
//! transposed views all share the [`MomentMatrix`] interface.

use mdarray::DTensor;
use rayon::prelude::*;

/// Row/column access to an M × N moment matrix
///
/// `forget_*` release cached storage for lazily generated matrices and are
/// no-ops for dense ones.
pub trait MomentMatrix {
    fn nrows(&self) -> usize;

    fn ncols(&self) -> usize;

    /// Row `i` (length `ncols`)
    fn row(&self, i: usize) -> Vec<f64>;

    /// Column `j` (length `nrows`)
    fn column(&self, j: usize) -> Vec<f64>;

    fn forget_row(&self, _i: usize) {}

    fn forget_column(&self, _j: usize) {}

    /// Row `i` without retaining it in any cache
    fn peek_row(&self, i: usize) -> Vec<f64> {
        self.row(i)
    }

    /// Column `j` without retaining it in any cache
    fn peek_column(&self, j: usize) -> Vec<f64> {
        self.column(j)
    }

    /// `Σ_k weights[k] * row(indices[k])`, i.e. `V[S,:]ᵀ w[S]`
    ///
    /// Rows are read with [`peek_row`](MomentMatrix::peek_row).
    fn weighted_column_sums(&self, indices: &[usize], weights: &[f64]) -> Vec<f64> {
        assert_eq!(
            indices.len(),
            weights.len(),
            "indices.len()={} must equal weights.len()={}",
            indices.len(),
            weights.len()
        );

        let mut sums = vec![0.0; self.ncols()];
        for (&i, &w) in indices.iter().zip(weights.iter()) {
            if w == 0.0 {
                continue;
            }
            for (s, x) in sums.iter_mut().zip(self.peek_row(i)) {
                *s += w * x;
            }
        }
        sums
    }

    /// Dense copy of the rows `indices` (|indices| × ncols)
    fn submatrix(&self, indices: &[usize]) -> DTensor<f64, 2> {
        let rows: Vec<Vec<f64>> = indices.iter().map(|&i| self.row(i)).collect();
        DTensor::<f64, 2>::from_fn([indices.len(), self.ncols()], |idx| rows[idx[0]][idx[1]])
    }
}

impl MomentMatrix for DTensor<f64, 2> {
    fn nrows(&self) -> usize {
        self.shape().0
    }

    fn ncols(&self) -> usize {
        self.shape().1
    }

    fn row(&self, i: usize) -> Vec<f64> {
        (0..self.shape().1).map(|j| self[[i, j]]).collect()
    }

    fn column(&self, j: usize) -> Vec<f64> {
        (0..self.shape().0).map(|i| self[[i, j]]).collect()
    }

    fn weighted_column_sums(&self, indices: &[usize], weights: &[f64]) -> Vec<f64> {
        assert_eq!(
            indices.len(),
            weights.len(),
            "indices.len()={} must equal weights.len()={}",
            indices.len(),
            weights.len()
        );

        // Columns are independent
        let columns: Vec<usize> = (0..self.shape().1).collect();
        columns
            .par_iter()
            .map(|&j| {
                indices
                    .iter()
                    .zip(weights.iter())
                    .map(|(&i, &w)| self[[i, j]] * w)
                    .sum::<f64>()
            })
            .collect()
    }

    fn submatrix(&self, indices: &[usize]) -> DTensor<f64, 2> {
        DTensor::<f64, 2>::from_fn([indices.len(), self.shape().1], |idx| {
            self[[indices[idx[0]], idx[1]]]
        })
    }
}

/// Transposed view of a moment matrix; rows and columns swap roles
///
/// Used to run the pruning on wide (N × M) inputs whose points are columns.
pub struct Transposed<'a, M: MomentMatrix + ?Sized> {
    inner: &'a M,
}

impl<'a, M: MomentMatrix + ?Sized> Transposed<'a, M> {
    pub fn new(inner: &'a M) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &'a M {
        self.inner
    }
}

impl<M: MomentMatrix + ?Sized> MomentMatrix for Transposed<'_, M> {
    fn nrows(&self) -> usize {
        self.inner.ncols()
    }

    fn ncols(&self) -> usize {
        self.inner.nrows()
    }

    fn row(&self, i: usize) -> Vec<f64> {
        self.inner.column(i)
    }

    fn column(&self, j: usize) -> Vec<f64> {
        self.inner.row(j)
    }

    fn forget_row(&self, i: usize) {
        self.inner.forget_column(i);
    }

    fn forget_column(&self, j: usize) {
        self.inner.forget_row(j);
    }

    fn peek_row(&self, i: usize) -> Vec<f64> {
        self.inner.peek_column(i)
    }

    fn peek_column(&self, j: usize) -> Vec<f64> {
        self.inner.peek_row(j)
    }
}

/// Indexed access to a weight vector
pub trait WeightSource {
    fn len(&self) -> usize;

    fn get(&self, i: usize) -> f64;

    /// Entry `i` without retaining it in any cache
    fn peek(&self, i: usize) -> f64 {
        self.get(i)
    }

    /// Release cached storage for entry `i`
    fn forget(&self, _i: usize) {}

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl WeightSource for [f64] {
    fn len(&self) -> usize {
        <[f64]>::len(self)
    }

    fn get(&self, i: usize) -> f64 {
        self[i]
    }
}

impl WeightSource for Vec<f64> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn get(&self, i: usize) -> f64 {
        self[i]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn sample() -> DTensor<f64, 2> {
        DTensor::<f64, 2>::from_fn([4, 3], |idx| (idx[0] * 3 + idx[1]) as f64)
    }

    #[test]
    fn test_weighted_column_sums_parallel_matches_default() {
        struct Plain(DTensor<f64, 2>);
        impl MomentMatrix for Plain {
            fn nrows(&self) -> usize {
                self.0.shape().0
            }
            fn ncols(&self) -> usize {
                self.0.shape().1
            }
            fn row(&self, i: usize) -> Vec<f64> {
                MomentMatrix::row(&self.0, i)
            }
            fn column(&self, j: usize) -> Vec<f64> {
                MomentMatrix::column(&self.0, j)
            }
        }

        let a = sample();
        let indices = [0, 2, 3];
        let weights = [0.5, 2.0, 1.0];
        let fast = MomentMatrix::weighted_column_sums(&a, &indices, &weights);
        let slow = Plain(sample()).weighted_column_sums(&indices, &weights);

        // Column 0: 0.5*0 + 2*6 + 1*9
        assert_abs_diff_eq!(fast[0], 21.0, epsilon = 1e-14);
        for (f, s) in fast.iter().zip(slow.iter()) {
            assert_abs_diff_eq!(f, s, epsilon = 1e-14);
        }
    }

    #[test]
    fn test_transposed_view() {
        let a = sample();
        let t = Transposed::new(&a);
        assert_eq!(t.nrows(), 3);
        assert_eq!(t.ncols(), 4);
        assert_eq!(t.row(1), MomentMatrix::column(&a, 1));
        assert_eq!(t.column(2), MomentMatrix::row(&a, 2));

        let sub = t.submatrix(&[2, 0]);
        assert_eq!(*sub.shape(), (2, 4));
        assert_eq!(sub[[0, 3]], a[[3, 2]]);
        assert_eq!(sub[[1, 1]], a[[1, 0]]);
    }

    #[test]
    fn test_weight_sources() {
        let w = vec![1.0, 2.0, 3.0];
        assert_eq!(WeightSource::len(&w), 3);
        assert_eq!(WeightSource::get(&w, 1), 2.0);
        assert_eq!(WeightSource::get(&w[..], 2), 3.0);
    }
}
