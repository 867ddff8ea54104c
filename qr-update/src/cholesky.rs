//! Cholesky rank-one updates and triangular solves
//!
//! Given lower-triangular `L` with `P = L·Lᵀ`, compute in place `L'` with
//! `L'·L'ᵀ = L·Lᵀ + sign·v·vᵀ`.

use mdarray::DTensor;

use crate::error::QrError;

/// n × n identity matrix
pub fn identity(n: usize) -> DTensor<f64, 2> {
    DTensor::<f64, 2>::from_fn([n, n], |idx| if idx[0] == idx[1] { 1.0 } else { 0.0 })
}

/// In-place rank-one update (`sign = +1`) or downdate (`sign = -1`)
///
/// `v` is consumed as workspace. Only the lower triangle of `l` is read or
/// written. A downdate fails when the updated matrix is not positive definite.
///
/// For j = 0..n:
///   1. `r = sqrt(L[j,j]² + sign·v[j]²)`
///   2. `c = r / L[j,j]`, `s = v[j] / L[j,j]`
///   3. `L[j,j] = r`
///   4. For i > j: `L[i,j] = (L[i,j] + sign·s·v[i]) / c`, `v[i] = c·v[i] - s·L[i,j]`
pub fn rank_one_update(l: &mut DTensor<f64, 2>, v: &mut [f64], sign: f64) -> Result<(), QrError> {
    let (n, nc) = *l.shape();
    if n != nc {
        return Err(QrError::DimensionMismatch {
            expected: n,
            got: nc,
        });
    }
    if v.len() != n {
        return Err(QrError::DimensionMismatch {
            expected: n,
            got: v.len(),
        });
    }

    for j in 0..n {
        let ljj = l[[j, j]];
        let vj = v[j];
        let arg = ljj * ljj + sign * vj * vj;

        if arg <= 0.0 || ljj == 0.0 {
            return Err(QrError::DowndateFailed { column: j });
        }

        let r = arg.sqrt();
        let c = r / ljj;
        let s = vj / ljj;
        l[[j, j]] = r;

        for i in (j + 1)..n {
            l[[i, j]] = (l[[i, j]] + sign * s * v[i]) / c;
            v[i] = c * v[i] - s * l[[i, j]];
        }
    }

    Ok(())
}

/// Lower Cholesky factor of `I - q·qᵀ`
///
/// Requires `‖q‖ < 1`.
pub fn cholesky_downdate(q: &[f64]) -> Result<DTensor<f64, 2>, QrError> {
    let mut l = identity(q.len());
    let mut v = q.to_vec();
    rank_one_update(&mut l, &mut v, -1.0)?;
    Ok(l)
}

/// Forward substitution `L x = b`
pub fn solve_lower(l: &DTensor<f64, 2>, b: &[f64]) -> Vec<f64> {
    let (n, _) = *l.shape();
    assert_eq!(b.len(), n, "b.len()={} must equal n={}", b.len(), n);

    let mut x = b.to_vec();
    for i in 0..n {
        let mut sum = x[i];
        for j in 0..i {
            sum -= l[[i, j]] * x[j];
        }
        x[i] = sum / l[[i, i]];
    }
    x
}
