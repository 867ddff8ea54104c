//! Sliding-window downdater with Givens row deletion and insertion

use std::collections::VecDeque;

use mdarray::DTensor;
use qr_update::{qr_append_row, qr_delete_row};
use tracing::{debug, trace};

use super::{
    KernelDowndater, linear_reset_interval, position_of, project_out_columns,
    projected_kernel_vectors, random_order, validate_order, validate_shape,
};
use crate::error::{PruningError, Result};
use crate::linalg::full_qr;
use crate::matrix::MomentMatrix;

pub const DEFAULT_PCT_FULL_QR: f64 = 2.0;

/// Window of N+k indices with a full QR of the window updated in O((N+k)²)
///
/// Each removal deletes a row of the factorization and appends the row of
/// the next index in the insertion order. Every `round(100 / pct_full_qr)`
/// downdates the window is refactored from scratch.
pub struct GivensUpDowndater<'a, M: MomentMatrix + ?Sized> {
    v: &'a M,
    k: usize,
    window: Vec<usize>,
    pending: VecDeque<usize>,
    q: DTensor<f64, 2>,
    r: DTensor<f64, 2>,
    iteration: usize,
    reset_interval: Option<usize>,
}

impl<'a, M: MomentMatrix + ?Sized> GivensUpDowndater<'a, M> {
    /// `ind_order` must be a permutation of `0..nrows`
    pub fn new(v: &'a M, k: usize, ind_order: Vec<usize>, pct_full_qr: f64) -> Result<Self> {
        validate_shape(v, k)?;
        let m = v.nrows();
        validate_order(&ind_order, m)?;

        let width = (v.ncols() + k).min(m);
        let mut pending: VecDeque<usize> = ind_order.into();
        let window: Vec<usize> = pending.drain(..width).collect();

        let mut downdater = Self {
            v,
            k,
            window,
            pending,
            q: DTensor::<f64, 2>::from_elem([0, 0], 0.0),
            r: DTensor::<f64, 2>::from_elem([0, v.ncols()], 0.0),
            iteration: 0,
            reset_interval: linear_reset_interval(pct_full_qr),
        };
        downdater.refactor()?;
        Ok(downdater)
    }

    /// Window filled from a random insertion order, default reset percentage
    pub fn with_random_order(v: &'a M, k: usize, seed: Option<u64>) -> Result<Self> {
        let order = random_order(v.nrows(), seed);
        Self::new(v, k, order, DEFAULT_PCT_FULL_QR)
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    fn refactor(&mut self) -> Result<()> {
        (self.q, self.r) = full_qr(&self.v.submatrix(&self.window))?;
        Ok(())
    }
}

impl<M: MomentMatrix + ?Sized> KernelDowndater for GivensUpDowndater<'_, M> {
    fn active_indices(&self) -> &[usize] {
        &self.window
    }

    fn kernel_vectors(&mut self) -> Result<Vec<Vec<f64>>> {
        let n = self.v.ncols();
        let q = &self.q;
        projected_kernel_vectors(self.window.len(), n, self.k, |y| {
            project_out_columns(q, n, y)
        })
    }

    fn downdate(&mut self, idx: usize) -> Result<()> {
        let pos = position_of(&self.window, idx)?;
        if self.pending.is_empty() && self.window.len() <= self.v.ncols() {
            return Err(PruningError::ExhaustedIndices {
                window: self.window.len(),
            });
        }

        let (mut q, mut r) = qr_delete_row(&self.q, &self.r, pos)?;
        self.window.remove(pos);
        self.v.forget_row(idx);

        if let Some(next) = self.pending.pop_front() {
            let row = self.v.row(next);
            (q, r) = qr_append_row(&q, &r, &row)?;
            self.window.push(next);
        }
        self.q = q;
        self.r = r;

        self.iteration += 1;
        if let Some(interval) = self.reset_interval {
            if self.iteration % interval == 0 {
                debug!(iteration = self.iteration, window = self.window.len(), "periodic full QR reset");
                self.refactor()?;
            }
        }
        trace!(idx, window = self.window.len(), pending = self.pending.len(), "Givens window update");
        Ok(())
    }
}
