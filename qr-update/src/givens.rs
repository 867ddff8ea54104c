//! Givens rotations and row updates of a full QR factorization
//!
//! The factorization is `A = Q * R` with Q square (m × m) and R upper
//! trapezoidal (m × n). Deleting or appending a row of A costs O(m²)
//! instead of the O(m n²) of a fresh factorization. [`triangularize`]
//! brings any `A = Q * B` with orthogonal Q into that form.

use mdarray::DTensor;

use crate::error::QrError;

/// Plane rotation acting on a pair of coordinates (x, y)
///
/// `(x, y) ↦ (c x + s y, -s x + c y)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GivensRotation {
    /// cosine
    pub c: f64,
    /// sine
    pub s: f64,
}

impl GivensRotation {
    pub fn identity() -> Self {
        Self { c: 1.0, s: 0.0 }
    }

    /// Rotation mapping `(a, b)` to `(r, 0)` with `r = hypot(a, b) ≥ 0`
    pub fn zeroing(a: f64, b: f64) -> (Self, f64) {
        let r = a.hypot(b);
        if r == 0.0 {
            return (Self::identity(), 0.0);
        }
        (Self { c: a / r, s: b / r }, r)
    }

    #[inline]
    pub fn rotate(&self, x: f64, y: f64) -> (f64, f64) {
        (self.c * x + self.s * y, -self.s * x + self.c * y)
    }

    /// Apply to rows `p` and `q` of a matrix, columns `col_start..`
    pub fn apply_rows(&self, matrix: &mut DTensor<f64, 2>, p: usize, q: usize, col_start: usize) {
        let (_, n) = *matrix.shape();
        for j in col_start..n {
            let (x, y) = self.rotate(matrix[[p, j]], matrix[[q, j]]);
            matrix[[p, j]] = x;
            matrix[[q, j]] = y;
        }
    }

    /// Apply to columns `p` and `q` of a matrix (right multiplication by Gᵀ)
    pub fn apply_columns(&self, matrix: &mut DTensor<f64, 2>, p: usize, q: usize) {
        let (m, _) = *matrix.shape();
        for i in 0..m {
            let (x, y) = self.rotate(matrix[[i, p]], matrix[[i, q]]);
            matrix[[i, p]] = x;
            matrix[[i, q]] = y;
        }
    }
}

fn validate_square(q: &DTensor<f64, 2>, row: usize) -> Result<usize, QrError> {
    let (m, mq) = *q.shape();
    if m != mq {
        return Err(QrError::DimensionMismatch {
            expected: m,
            got: mq,
        });
    }
    if m == 0 {
        return Err(QrError::EmptyMatrix);
    }
    if row >= m {
        return Err(QrError::IndexOutOfBounds { index: row, len: m });
    }
    Ok(m)
}

/// Rotate row `row` of Q into `e_0`, from the bottom up
///
/// The same rotations act on the rows of R when given, which leaves R upper
/// Hessenberg.
fn fold_row(q: &mut DTensor<f64, 2>, mut r: Option<&mut DTensor<f64, 2>>, row: usize) {
    let (m, _) = *q.shape();
    for j in (1..m).rev() {
        let (g, _) = GivensRotation::zeroing(q[[row, j - 1]], q[[row, j]]);
        g.apply_columns(q, j - 1, j);
        if let Some(r) = r.as_deref_mut() {
            // Columns left of j-1 are zero in both rows
            g.apply_rows(r, j - 1, j, j - 1);
        }
    }
}

/// Q without row `row` and column 0
fn shrink_q(q: &DTensor<f64, 2>, row: usize) -> DTensor<f64, 2> {
    let (m, _) = *q.shape();
    DTensor::<f64, 2>::from_fn([m - 1, m - 1], |idx| {
        let i = if idx[0] < row { idx[0] } else { idx[0] + 1 };
        q[[i, idx[1] + 1]]
    })
}

/// Reduce `r` to upper trapezoidal form while keeping the product `q * r`
///
/// Column by column, the entries below the diagonal are rotated into the
/// row above, from the bottom up; each rotation is mirrored on the columns
/// of `q`. Rows that are already zero are skipped, so a dense leading block
/// over zero rows costs O(n²) rotations.
pub fn triangularize(q: &mut DTensor<f64, 2>, r: &mut DTensor<f64, 2>) -> Result<(), QrError> {
    let (_, qc) = *q.shape();
    let (m, n) = *r.shape();
    if qc != m {
        return Err(QrError::DimensionMismatch {
            expected: m,
            got: qc,
        });
    }

    for j in 0..n.min(m) {
        for i in ((j + 1)..m).rev() {
            if r[[i, j]] == 0.0 {
                continue;
            }
            let (g, rij) = GivensRotation::zeroing(r[[i - 1, j]], r[[i, j]]);
            g.apply_rows(r, i - 1, i, j + 1);
            r[[i - 1, j]] = rij;
            r[[i, j]] = 0.0;
            g.apply_columns(q, i - 1, i);
        }
    }
    Ok(())
}

/// Remove row `row` from a full QR factorization `A = Q * R`
///
/// Rotations fold row `row` of Q into `e_0`, after which row `row` and
/// column 0 of Q and row 0 of R are dropped. The result factorizes A with
/// row `row` removed.
pub fn qr_delete_row(
    q: &DTensor<f64, 2>,
    r: &DTensor<f64, 2>,
    row: usize,
) -> Result<(DTensor<f64, 2>, DTensor<f64, 2>), QrError> {
    let m = validate_square(q, row)?;
    let (rm, n) = *r.shape();
    if rm != m {
        return Err(QrError::DimensionMismatch {
            expected: m,
            got: rm,
        });
    }

    let mut q_work = q.clone();
    let mut r_work = r.clone();
    fold_row(&mut q_work, Some(&mut r_work), row);

    let r_new = DTensor::<f64, 2>::from_fn([m - 1, n], |idx| r_work[[idx[0] + 1, idx[1]]]);
    Ok((shrink_q(&q_work, row), r_new))
}

/// Remove row `row` from the Q factor alone
///
/// Without R the leading columns of the result still span the range of the
/// reduced matrix, and the trailing columns its orthogonal complement.
pub fn q_delete_row(q: &DTensor<f64, 2>, row: usize) -> Result<DTensor<f64, 2>, QrError> {
    validate_square(q, row)?;
    let mut q_work = q.clone();
    fold_row(&mut q_work, None, row);
    Ok(shrink_q(&q_work, row))
}

/// Append `new_row` at the bottom of a full QR factorization
///
/// Q is bordered with a unit diagonal entry and the new row of R is
/// eliminated column by column against the diagonal.
pub fn qr_append_row(
    q: &DTensor<f64, 2>,
    r: &DTensor<f64, 2>,
    new_row: &[f64],
) -> Result<(DTensor<f64, 2>, DTensor<f64, 2>), QrError> {
    let (m, mq) = *q.shape();
    let (rm, n) = *r.shape();
    if m != mq {
        return Err(QrError::DimensionMismatch {
            expected: m,
            got: mq,
        });
    }
    if rm != m {
        return Err(QrError::DimensionMismatch {
            expected: m,
            got: rm,
        });
    }
    if new_row.len() != n {
        return Err(QrError::DimensionMismatch {
            expected: n,
            got: new_row.len(),
        });
    }

    let mut q_new = DTensor::<f64, 2>::from_fn([m + 1, m + 1], |idx| {
        if idx[0] < m && idx[1] < m {
            q[[idx[0], idx[1]]]
        } else if idx[0] == idx[1] {
            1.0
        } else {
            0.0
        }
    });
    let mut r_new = DTensor::<f64, 2>::from_fn([m + 1, n], |idx| {
        if idx[0] < m {
            r[[idx[0], idx[1]]]
        } else {
            new_row[idx[1]]
        }
    });

    for j in 0..m.min(n) {
        let (g, rjj) = GivensRotation::zeroing(r_new[[j, j]], r_new[[m, j]]);
        g.apply_rows(&mut r_new, j, m, j + 1);
        r_new[[j, j]] = rjj;
        r_new[[m, j]] = 0.0;
        g.apply_columns(&mut q_new, j, m);
    }

    Ok((q_new, r_new))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cholesky::identity;
    use crate::utils::is_orthogonal;
    use approx::assert_abs_diff_eq;

    fn matmul(a: &DTensor<f64, 2>, b: &DTensor<f64, 2>) -> DTensor<f64, 2> {
        let (m, k) = *a.shape();
        let (_, n) = *b.shape();
        DTensor::<f64, 2>::from_fn([m, n], |idx| {
            (0..k).map(|l| a[[idx[0], l]] * b[[l, idx[1]]]).sum()
        })
    }

    fn full_qr(a: &DTensor<f64, 2>) -> (DTensor<f64, 2>, DTensor<f64, 2>) {
        let mut q = identity(a.shape().0);
        let mut r = a.clone();
        triangularize(&mut q, &mut r).unwrap();
        (q, r)
    }

    #[test]
    fn test_zeroing() {
        let (g, r) = GivensRotation::zeroing(3.0, 4.0);
        assert_abs_diff_eq!(r, 5.0, epsilon = 1e-15);
        let (x, y) = g.rotate(3.0, 4.0);
        assert_abs_diff_eq!(x, 5.0, epsilon = 1e-15);
        assert_abs_diff_eq!(y, 0.0, epsilon = 1e-15);

        let (g, r) = GivensRotation::zeroing(0.0, 0.0);
        assert_eq!(g, GivensRotation::identity());
        assert_eq!(r, 0.0);
    }

    #[test]
    fn test_delete_row_reconstructs() {
        let a = DTensor::<f64, 2>::from_fn([5, 2], |idx| {
            [[1.0, 0.5], [2.0, -1.0], [0.0, 3.0], [1.5, 1.0], [-1.0, 2.0]][idx[0]][idx[1]]
        });
        let (q0, r0) = full_qr(&a);
        let (q, r) = qr_delete_row(&q0, &r0, 2).unwrap();

        assert_eq!(*q.shape(), (4, 4));
        assert_eq!(*r.shape(), (4, 2));
        assert!(is_orthogonal(&q, 1e-12));

        // Upper trapezoidal
        assert_abs_diff_eq!(r[[1, 0]], 0.0, epsilon = 1e-12);
        for i in 2..4 {
            for j in 0..2 {
                assert_abs_diff_eq!(r[[i, j]], 0.0, epsilon = 1e-12);
            }
        }

        let qr_prod = matmul(&q, &r);
        let kept = [0, 1, 3, 4];
        for (i, &orig) in kept.iter().enumerate() {
            for j in 0..2 {
                assert_abs_diff_eq!(qr_prod[[i, j]], a[[orig, j]], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_append_row_reconstructs() {
        let a = DTensor::<f64, 2>::from_fn([3, 2], |idx| {
            [[1.0, 2.0], [0.0, 1.0], [3.0, -1.0]][idx[0]][idx[1]]
        });
        let (q0, r0) = full_qr(&a);
        let row = [0.5, 4.0];
        let (q, r) = qr_append_row(&q0, &r0, &row).unwrap();

        assert!(is_orthogonal(&q, 1e-12));
        for i in 2..4 {
            for j in 0..2 {
                assert_abs_diff_eq!(r[[i, j]], 0.0, epsilon = 1e-12);
            }
        }

        let prod = matmul(&q, &r);
        for i in 0..3 {
            for j in 0..2 {
                assert_abs_diff_eq!(prod[[i, j]], a[[i, j]], epsilon = 1e-12);
            }
        }
        for j in 0..2 {
            assert_abs_diff_eq!(prod[[3, j]], row[j], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_triangularize_dense_block() {
        // A = Q0 * B with B dense on top of a zero row
        let s = 0.6;
        let c = 0.8;
        let q0 = DTensor::<f64, 2>::from_fn([3, 3], |idx| {
            [[c, -s, 0.0], [s, c, 0.0], [0.0, 0.0, 1.0]][idx[0]][idx[1]]
        });
        let b = DTensor::<f64, 2>::from_fn([3, 2], |idx| {
            [[1.0, 2.0], [3.0, -1.0], [0.0, 0.0]][idx[0]][idx[1]]
        });
        let a = matmul(&q0, &b);

        let mut q = q0.clone();
        let mut r = b.clone();
        triangularize(&mut q, &mut r).unwrap();

        assert!(is_orthogonal(&q, 1e-14));
        assert_eq!(r[[1, 0]], 0.0);
        assert_eq!(r[[2, 0]], 0.0);
        assert_eq!(r[[2, 1]], 0.0);
        assert_abs_diff_eq!(r[[0, 0]], 10.0f64.sqrt(), epsilon = 1e-14);
        let prod = matmul(&q, &r);
        for i in 0..3 {
            for j in 0..2 {
                assert_abs_diff_eq!(prod[[i, j]], a[[i, j]], epsilon = 1e-14);
            }
        }

        let mut wrong = identity(2);
        assert_eq!(
            triangularize(&mut wrong, &mut r).unwrap_err(),
            QrError::DimensionMismatch { expected: 3, got: 2 }
        );
    }

    #[test]
    fn test_delete_row_out_of_bounds() {
        let q = DTensor::<f64, 2>::from_fn([2, 2], |idx| if idx[0] == idx[1] { 1.0 } else { 0.0 });
        let err = q_delete_row(&q, 2).unwrap_err();
        assert_eq!(err, QrError::IndexOutOfBounds { index: 2, len: 2 });
    }
}
