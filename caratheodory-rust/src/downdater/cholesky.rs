//! Downdater based on Cholesky factors of `I - qqᵀ`
//!
//! Removing row p from a thin orthonormal Q (|S| × N) leaves Q' with
//! `Q'ᵀQ' = I - qqᵀ`, q the removed row. With `LLᵀ = I - qqᵀ` the product
//! `Q'L⁻ᵀ` is orthonormal again and spans the same range. The factor is kept
//! either explicitly or as `Q₀[rows, :]·T` with Q₀ the thin Q at the last
//! reset and T an accumulated N × N transform.

use mdarray::DTensor;
use qr_update::{cholesky_downdate, identity, solve_lower};
use tracing::{debug, trace, warn};

use super::{
    KernelDowndater, log_reset_schedule, position_of, projected_kernel_vectors, validate_shape,
};
use crate::error::{PruningError, Result};
use crate::linalg::range_basis;
use crate::matrix::MomentMatrix;

pub const DEFAULT_PCT_FULL_QR: f64 = 10.0;
pub const DEFAULT_SM_TOL: f64 = 1e-6;

#[derive(Debug, Clone)]
pub struct CholeskyConfig {
    /// Kernel vectors per iteration
    pub k: usize,
    /// Percentage of downdates replaced by a full QR reset
    pub pct_full_qr: f64,
    /// Lower bound on the Sherman-Morrison denominator `1 - qᵀq`
    pub sm_tol: f64,
    /// Maintain Q explicitly instead of as `Q₀·T`
    pub full_q: bool,
    /// Reset instead of failing when the denominator guard trips
    pub recover_near_singular: bool,
}

impl Default for CholeskyConfig {
    fn default() -> Self {
        Self {
            k: 1,
            pct_full_qr: DEFAULT_PCT_FULL_QR,
            sm_tol: DEFAULT_SM_TOL,
            full_q: false,
            recover_near_singular: true,
        }
    }
}

impl CholeskyConfig {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            ..Self::default()
        }
    }
}

pub struct CholeskyDowndater<'a, M: MomentMatrix + ?Sized> {
    v: &'a M,
    config: CholeskyConfig,
    active: Vec<usize>,
    /// Thin Q at the last reset (or the explicit Q in `full_q` mode)
    q0: DTensor<f64, 2>,
    /// Row of `q0` belonging to each active position
    rows: Vec<usize>,
    /// Accumulated transform; identity right after a reset
    t: DTensor<f64, 2>,
    iteration: usize,
    resets: Vec<usize>,
}

impl<'a, M: MomentMatrix + ?Sized> CholeskyDowndater<'a, M> {
    pub fn new(v: &'a M, config: CholeskyConfig) -> Result<Self> {
        validate_shape(v, config.k)?;
        if !(config.sm_tol >= 0.0) {
            return Err(PruningError::InvalidInput(format!(
                "Sherman-Morrison tolerance must be nonnegative, got {}",
                config.sm_tol
            )));
        }

        let (m, n) = (v.nrows(), v.ncols());
        let active: Vec<usize> = (0..m).collect();
        let resets = log_reset_schedule(m - n, config.pct_full_qr);
        let mut downdater = Self {
            v,
            config,
            active,
            q0: DTensor::<f64, 2>::from_elem([0, n], 0.0),
            rows: Vec::new(),
            t: identity(n),
            iteration: 0,
            resets,
        };
        downdater.reset()?;
        Ok(downdater)
    }

    /// Iterations at which a full QR replaces the Cholesky update
    pub fn reset_schedule(&self) -> &[usize] {
        &self.resets
    }

    fn reset(&mut self) -> Result<()> {
        self.q0 = range_basis(&self.v.submatrix(&self.active))?;
        self.rows = (0..self.active.len()).collect();
        self.t = identity(self.q0.shape().1);
        Ok(())
    }

    /// Row `pos` of the current thin Q, `Q₀[rows[pos], :]·T`
    fn q_row(&self, pos: usize) -> Vec<f64> {
        let n = self.t.shape().0;
        let r = self.rows[pos];
        (0..n)
            .map(|j| (0..n).map(|l| self.q0[[r, l]] * self.t[[l, j]]).sum())
            .collect()
    }

    fn remove_position(&mut self, pos: usize, idx: usize) {
        self.active.remove(pos);
        self.rows.remove(pos);
        self.v.forget_row(idx);
    }

    /// Replace `T` by `T·L⁻ᵀ`, row by row
    fn apply_inverse_transpose(&mut self, l: &DTensor<f64, 2>) {
        let n = self.t.shape().0;
        for r in 0..n {
            let row: Vec<f64> = (0..n).map(|j| self.t[[r, j]]).collect();
            let solved = solve_lower(l, &row);
            for (j, value) in solved.into_iter().enumerate() {
                self.t[[r, j]] = value;
            }
        }
    }

    /// Fold `T` into an explicit Q over the active rows
    fn materialize(&mut self) {
        let n = self.t.shape().0;
        let explicit = DTensor::<f64, 2>::from_fn([self.rows.len(), n], |idx| {
            let r = self.rows[idx[0]];
            (0..n).map(|l| self.q0[[r, l]] * self.t[[l, idx[1]]]).sum()
        });
        self.q0 = explicit;
        self.rows = (0..self.active.len()).collect();
        self.t = identity(n);
    }

    fn is_reset_iteration(&self, iteration: usize) -> bool {
        self.resets.binary_search(&iteration).is_ok()
    }
}

impl<M: MomentMatrix + ?Sized> KernelDowndater for CholeskyDowndater<'_, M> {
    fn active_indices(&self) -> &[usize] {
        &self.active
    }

    fn kernel_vectors(&mut self) -> Result<Vec<Vec<f64>>> {
        let n = self.t.shape().0;
        let (q0, t, rows) = (&self.q0, &self.t, &self.rows);

        projected_kernel_vectors(self.active.len(), self.v.ncols(), self.config.k, |y| {
            // z = Tᵀ (Q₀[rows,:]ᵀ y), then y -= Q₀[rows,:] (T z)
            let u: Vec<f64> = (0..n)
                .map(|l| rows.iter().zip(y.iter()).map(|(&r, &yi)| q0[[r, l]] * yi).sum())
                .collect();
            let z: Vec<f64> = (0..n)
                .map(|j| (0..n).map(|l| t[[l, j]] * u[l]).sum())
                .collect();
            let tz: Vec<f64> = (0..n)
                .map(|l| (0..n).map(|j| t[[l, j]] * z[j]).sum())
                .collect();
            for (yi, &r) in y.iter_mut().zip(rows.iter()) {
                *yi -= (0..n).map(|l| q0[[r, l]] * tz[l]).sum::<f64>();
            }
        })
    }

    fn downdate(&mut self, idx: usize) -> Result<()> {
        let pos = position_of(&self.active, idx)?;
        let iteration = self.iteration;
        self.iteration += 1;

        if self.is_reset_iteration(iteration) {
            self.remove_position(pos, idx);
            debug!(iteration, active = self.active.len(), "scheduled full QR reset");
            return self.reset();
        }

        let q = self.q_row(pos);
        let denominator = 1.0 - qr_update::dot(&q, &q);
        let factor = if denominator < self.config.sm_tol {
            None
        } else {
            cholesky_downdate(&q).ok()
        };

        let Some(l) = factor else {
            if !self.config.recover_near_singular {
                return Err(PruningError::NearSingularUpdate {
                    denominator,
                    tolerance: self.config.sm_tol,
                });
            }
            warn!(
                iteration,
                denominator,
                tolerance = self.config.sm_tol,
                "near-singular Sherman-Morrison downdate, recomputing QR"
            );
            self.remove_position(pos, idx);
            return self.reset();
        };

        self.remove_position(pos, idx);
        self.apply_inverse_transpose(&l);
        if self.config.full_q {
            self.materialize();
        }
        trace!(iteration, idx, denominator, "Cholesky downdate");
        Ok(())
    }
}
