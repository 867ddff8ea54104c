//! Downdater keeping the full orthogonal factor, updated by Givens sweeps

use mdarray::DTensor;
use qr_update::q_delete_row;

use super::{
    KernelDowndater, position_of, project_out_columns, projected_kernel_vectors, validate_shape,
};
use crate::error::Result;
use crate::linalg::full_range_basis;
use crate::matrix::MomentMatrix;

/// Keeps the full |S| × |S| Q factor of `V[S,:]`
///
/// A removal folds the row of Q belonging to the removed index into the
/// first unit vector with |S|-1 rotations and drops it, O(|S|²). R is not
/// needed: the leading N columns of Q keep spanning the range.
pub struct GivensDowndater<'a, M: MomentMatrix + ?Sized> {
    v: &'a M,
    k: usize,
    active: Vec<usize>,
    q: DTensor<f64, 2>,
}

impl<'a, M: MomentMatrix + ?Sized> GivensDowndater<'a, M> {
    pub fn new(v: &'a M, k: usize) -> Result<Self> {
        validate_shape(v, k)?;
        let active: Vec<usize> = (0..v.nrows()).collect();
        let q = full_range_basis(&v.submatrix(&active))?;
        Ok(Self { v, k, active, q })
    }
}

impl<M: MomentMatrix + ?Sized> KernelDowndater for GivensDowndater<'_, M> {
    fn active_indices(&self) -> &[usize] {
        &self.active
    }

    fn kernel_vectors(&mut self) -> Result<Vec<Vec<f64>>> {
        let n = self.v.ncols();
        let q = &self.q;
        projected_kernel_vectors(self.active.len(), n, self.k, |y| {
            project_out_columns(q, n, y)
        })
    }

    fn downdate(&mut self, idx: usize) -> Result<()> {
        let pos = position_of(&self.active, idx)?;
        self.q = q_delete_row(&self.q, pos)?;
        self.active.remove(pos);
        self.v.forget_row(idx);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downdater::FullQRDowndater;

    fn sample(m: usize, n: usize) -> DTensor<f64, 2> {
        DTensor::<f64, 2>::from_fn([m, n], |idx| {
            let x = (idx[0] as f64 * 0.37 + 0.11).sin();
            x.powi(idx[1] as i32) + 0.1 * idx[1] as f64
        })
    }

    #[test]
    fn test_matches_full_qr_through_downdates() {
        let v = sample(9, 3);
        let mut givens = GivensDowndater::new(&v, 3).unwrap();
        let mut full = FullQRDowndater::new(&v, 3).unwrap();

        for idx in [4, 0, 8, 2, 5] {
            let kg = givens.kernel_vectors().unwrap();
            let kf = full.kernel_vectors().unwrap();
            assert_eq!(kg.len(), kf.len());
            for (a, b) in kg.iter().zip(kf.iter()) {
                for (x, y) in a.iter().zip(b.iter()) {
                    assert!((x - y).abs() < 1e-10, "{} vs {}", x, y);
                }
            }
            givens.downdate(idx).unwrap();
            full.downdate(idx).unwrap();
            assert_eq!(givens.active_indices(), full.active_indices());
        }
    }
}
