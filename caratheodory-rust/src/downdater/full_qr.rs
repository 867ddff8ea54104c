//! Baseline downdater: a fresh factorization after every removal

use mdarray::DTensor;
use tracing::trace;

use super::{
    KernelDowndater, position_of, project_out_columns, projected_kernel_vectors, validate_shape,
};
use crate::error::Result;
use crate::linalg::range_basis;
use crate::matrix::MomentMatrix;

/// Recomputes an orthonormal basis of the range of `V[S,:]` from scratch
/// on each downdate
///
/// O(|S|·N²) per downdate. All other variants are checked against this one.
pub struct FullQRDowndater<'a, M: MomentMatrix + ?Sized> {
    v: &'a M,
    k: usize,
    active: Vec<usize>,
    /// |S| × N, orthonormal columns
    basis: DTensor<f64, 2>,
}

impl<'a, M: MomentMatrix + ?Sized> FullQRDowndater<'a, M> {
    pub fn new(v: &'a M, k: usize) -> Result<Self> {
        validate_shape(v, k)?;
        let active: Vec<usize> = (0..v.nrows()).collect();
        let basis = range_basis(&v.submatrix(&active))?;
        Ok(Self {
            v,
            k,
            active,
            basis,
        })
    }
}

impl<M: MomentMatrix + ?Sized> KernelDowndater for FullQRDowndater<'_, M> {
    fn active_indices(&self) -> &[usize] {
        &self.active
    }

    fn kernel_vectors(&mut self) -> Result<Vec<Vec<f64>>> {
        let n = self.v.ncols();
        let basis = &self.basis;
        projected_kernel_vectors(self.active.len(), n, self.k, |y| {
            project_out_columns(basis, n, y)
        })
    }

    fn downdate(&mut self, idx: usize) -> Result<()> {
        let pos = position_of(&self.active, idx)?;
        self.active.remove(pos);
        self.v.forget_row(idx);

        self.basis = range_basis(&self.v.submatrix(&self.active))?;
        trace!(idx, active = self.active.len(), "full refactorization");
        Ok(())
    }
}
