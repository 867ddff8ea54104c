//! Fresh dense factorizations through the Faer backend of mdarray-linalg
//!
//! Every from-scratch factorization of an active submatrix `A = V[S,:]`
//! starts from its SVD `A = U Σ Vᵀ`. The leading columns of U span the
//! range of A, which is all the kernel vectors depend on. Downdaters that
//! update a full QR by Givens rotations get one from the SVD as well:
//! `Q = [U₁ U₂]` and `R = [ΣVᵀ; 0]`, after which R is triangularized.

use mdarray::DTensor;
use mdarray_linalg::prelude::SVD;
use mdarray_linalg::svd::SVDDecomp;
use mdarray_linalg::prelude::{MatMul, MatMulBuilder};
use mdarray_linalg_faer::Faer;
use qr_update::triangularize;

use crate::error::{PruningError, Result};

/// Singular values below this fraction of the largest make a solve singular
pub const RANK_TOLERANCE: f64 = 1e-13;

/// Unit vectors whose projection onto the complement is shorter than this
/// are skipped when completing an orthonormal basis
const COMPLETION_TOLERANCE: f64 = 1e-8;

/// Thin SVD of a real matrix
pub(crate) struct RealSVD {
    pub u: DTensor<f64, 2>,
    pub s: Vec<f64>,
    pub vt: DTensor<f64, 2>,
}

pub(crate) fn compute_real_svd(matrix: &DTensor<f64, 2>) -> Result<RealSVD> {
    let mut a = matrix.clone();
    let SVDDecomp { u, s, vt } = Faer
        .svd(&mut *a)
        .map_err(|e| PruningError::Decomposition(format!("SVD failed: {:?}", e)))?;

    // Singular values are stored in the first row
    let min_dim = s.shape().0.min(s.shape().1);
    let s_vec: Vec<f64> = (0..min_dim).map(|i| s[[0, i]]).collect();

    Ok(RealSVD { u, s: s_vec, vt })
}

/// Orthonormal basis (m × min(m, n)) of the range of `a`
pub(crate) fn range_basis(a: &DTensor<f64, 2>) -> Result<DTensor<f64, 2>> {
    let m = a.shape().0;
    let svd = compute_real_svd(a)?;
    let r = svd.s.len();
    Ok(DTensor::<f64, 2>::from_fn([m, r], |idx| svd.u[idx]))
}

/// Square orthogonal matrix whose leading `r` columns are those of `u`
fn complete_basis(u: &DTensor<f64, 2>, r: usize) -> DTensor<f64, 2> {
    let (m, uc) = *u.shape();
    if uc == m {
        return u.clone();
    }

    let mut columns: Vec<Vec<f64>> = (0..r)
        .map(|j| (0..m).map(|i| u[[i, j]]).collect())
        .collect();
    for p in 0..m {
        if columns.len() == m {
            break;
        }
        let mut y = vec![0.0; m];
        y[p] = 1.0;
        // Twice is enough
        for _ in 0..2 {
            for c in &columns {
                let d = qr_update::dot(c, &y);
                for (yi, ci) in y.iter_mut().zip(c.iter()) {
                    *yi -= d * ci;
                }
            }
        }
        let norm = qr_update::norm_2(&y);
        if norm > COMPLETION_TOLERANCE {
            y.iter_mut().for_each(|x| *x /= norm);
            columns.push(y);
        }
    }

    DTensor::<f64, 2>::from_fn([m, columns.len()], |idx| columns[idx[1]][idx[0]])
}

/// Full orthogonal m × m matrix whose leading columns span the range of `a`
pub(crate) fn full_range_basis(a: &DTensor<f64, 2>) -> Result<DTensor<f64, 2>> {
    let svd = compute_real_svd(a)?;
    Ok(complete_basis(&svd.u, svd.s.len()))
}

/// Full QR `a = Q R` with Q m × m orthogonal and R m × n upper trapezoidal
pub(crate) fn full_qr(a: &DTensor<f64, 2>) -> Result<(DTensor<f64, 2>, DTensor<f64, 2>)> {
    let (m, n) = *a.shape();
    let svd = compute_real_svd(a)?;
    let r = svd.s.len();

    let mut q = complete_basis(&svd.u, r);
    let mut r_full = DTensor::<f64, 2>::from_fn([m, n], |idx| {
        if idx[0] < r {
            svd.s[idx[0]] * svd.vt[[idx[0], idx[1]]]
        } else {
            0.0
        }
    });
    triangularize(&mut q, &mut r_full)?;
    Ok((q, r_full))
}

/// Least-squares solution x of `aᵀ x = rhs`
///
/// With `a = U Σ Vᵀ` the solution is `x = U Σ⁻¹ Vᵀ rhs`. A singular value
/// below [`RANK_TOLERANCE`] times the largest one is reported as
/// [`PruningError::RankDeficient`] rather than amplified.
pub(crate) fn solve_transposed(a: &DTensor<f64, 2>, rhs: &[f64]) -> Result<Vec<f64>> {
    let (m, n) = *a.shape();
    assert_eq!(rhs.len(), n, "rhs.len()={} must equal ncols={}", rhs.len(), n);

    let svd = compute_real_svd(a)?;
    let r = svd.s.len();
    let s_max = svd.s.iter().copied().fold(0.0, f64::max);
    for (index, &value) in svd.s.iter().enumerate() {
        if !(value > RANK_TOLERANCE * s_max) {
            return Err(PruningError::RankDeficient { index, value });
        }
    }

    // Vᵀ rhs
    let vt = DTensor::<f64, 2>::from_fn([r, n], |idx| svd.vt[idx]);
    let rhs_col = DTensor::<f64, 2>::from_fn([n, 1], |idx| rhs[idx[0]]);
    let vt_rhs = Faer.matmul(&vt, &rhs_col).eval();

    // Σ⁻¹ Vᵀ rhs
    let scaled = DTensor::<f64, 2>::from_fn([r, 1], |idx| vt_rhs[[idx[0], 0]] / svd.s[idx[0]]);

    // x = U Σ⁻¹ Vᵀ rhs
    let u = DTensor::<f64, 2>::from_fn([m, r], |idx| svd.u[idx]);
    let x = Faer.matmul(&u, &scaled).eval();
    Ok((0..m).map(|i| x[[i, 0]]).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn sample(m: usize, n: usize) -> DTensor<f64, 2> {
        DTensor::<f64, 2>::from_fn([m, n], |idx| {
            let x = (idx[0] as f64 * 0.91 + 0.3).sin();
            x.powi(idx[1] as i32) + 0.05 * (idx[0] * idx[1]) as f64
        })
    }

    fn matmul(a: &DTensor<f64, 2>, b: &DTensor<f64, 2>) -> DTensor<f64, 2> {
        Faer.matmul(a, b).eval()
    }

    #[test]
    fn test_range_basis_is_orthonormal_and_spans_columns() {
        let a = sample(7, 3);
        let u = range_basis(&a).unwrap();
        assert_eq!(*u.shape(), (7, 3));
        assert!(qr_update::is_orthogonal(&u, 1e-12));

        // (I - UUᵀ) a = 0
        let ut_a = matmul(&u.transpose().to_tensor(), &a);
        let proj = matmul(&u, &ut_a);
        for i in 0..7 {
            for j in 0..3 {
                assert_abs_diff_eq!(proj[[i, j]], a[[i, j]], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_full_qr_reconstructs() {
        let a = sample(6, 3);
        let (q, r) = full_qr(&a).unwrap();
        assert_eq!(*q.shape(), (6, 6));
        assert_eq!(*r.shape(), (6, 3));
        assert!(qr_update::is_orthogonal(&q, 1e-12));
        for i in 0..6 {
            for j in 0..i.min(3) {
                assert_abs_diff_eq!(r[[i, j]], 0.0, epsilon = 1e-12);
            }
        }
        let prod = matmul(&q, &r);
        for i in 0..6 {
            for j in 0..3 {
                assert_abs_diff_eq!(prod[[i, j]], a[[i, j]], epsilon = 1e-12);
            }
        }

        let full = full_range_basis(&a).unwrap();
        assert_eq!(*full.shape(), (6, 6));
        assert!(qr_update::is_orthogonal(&full, 1e-12));
    }

    #[test]
    fn test_solve_transposed_square_and_singular() {
        let a = sample(3, 3);
        let x_true = [0.25, 0.5, 0.25];
        let rhs: Vec<f64> = (0..3)
            .map(|j| (0..3).map(|i| a[[i, j]] * x_true[i]).sum())
            .collect();
        let x = solve_transposed(&a, &rhs).unwrap();
        for (xi, ti) in x.iter().zip(x_true.iter()) {
            assert_abs_diff_eq!(xi, ti, epsilon = 1e-12);
        }

        let repeated = DTensor::<f64, 2>::from_fn([2, 2], |idx| (idx[1] + 1) as f64);
        assert!(matches!(
            solve_transposed(&repeated, &[1.0, 2.0]),
            Err(PruningError::RankDeficient { index: 1, .. })
        ));
    }
}
