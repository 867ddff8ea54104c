//! Sliding-window downdater refactoring the window from scratch

use std::collections::VecDeque;

use mdarray::DTensor;
use tracing::trace;

use super::{
    KernelDowndater, position_of, project_out_columns, projected_kernel_vectors, random_order,
    validate_order, validate_shape,
};
use crate::error::{PruningError, Result};
use crate::linalg::range_basis;
use crate::matrix::MomentMatrix;

/// Keeps a window of N+k indices; each removal pulls in the next index of
/// the insertion order and refactors the window, O((N+k)³)
pub struct FullQRUpDowndater<'a, M: MomentMatrix + ?Sized> {
    v: &'a M,
    k: usize,
    window: Vec<usize>,
    pending: VecDeque<usize>,
    basis: DTensor<f64, 2>,
}

impl<'a, M: MomentMatrix + ?Sized> FullQRUpDowndater<'a, M> {
    /// `ind_order` must be a permutation of `0..nrows`
    pub fn new(v: &'a M, k: usize, ind_order: Vec<usize>) -> Result<Self> {
        validate_shape(v, k)?;
        let m = v.nrows();
        validate_order(&ind_order, m)?;

        let width = (v.ncols() + k).min(m);
        let mut pending: VecDeque<usize> = ind_order.into();
        let window: Vec<usize> = pending.drain(..width).collect();
        let basis = range_basis(&v.submatrix(&window))?;
        Ok(Self {
            v,
            k,
            window,
            pending,
            basis,
        })
    }

    /// Window filled from a random insertion order
    pub fn with_random_order(v: &'a M, k: usize, seed: Option<u64>) -> Result<Self> {
        let order = random_order(v.nrows(), seed);
        Self::new(v, k, order)
    }

    /// Indices not yet inserted into the window
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

impl<M: MomentMatrix + ?Sized> KernelDowndater for FullQRUpDowndater<'_, M> {
    fn active_indices(&self) -> &[usize] {
        &self.window
    }

    fn kernel_vectors(&mut self) -> Result<Vec<Vec<f64>>> {
        let n = self.v.ncols();
        let basis = &self.basis;
        projected_kernel_vectors(self.window.len(), n, self.k, |y| {
            project_out_columns(basis, n, y)
        })
    }

    fn downdate(&mut self, idx: usize) -> Result<()> {
        let pos = position_of(&self.window, idx)?;
        if self.pending.is_empty() && self.window.len() <= self.v.ncols() {
            return Err(PruningError::ExhaustedIndices {
                window: self.window.len(),
            });
        }

        self.window.remove(pos);
        self.v.forget_row(idx);
        if let Some(next) = self.pending.pop_front() {
            self.window.push(next);
        }

        self.basis = range_basis(&self.v.submatrix(&self.window))?;
        trace!(idx, window = self.window.len(), pending = self.pending.len(), "window refactorization");
        Ok(())
    }
}
