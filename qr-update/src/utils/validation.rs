//! Factorization validation utilities

use mdarray::DTensor;

/// Check whether the columns of a matrix are orthonormal (QᵀQ = I)
pub fn is_orthogonal(matrix: &DTensor<f64, 2>, tolerance: f64) -> bool {
    let (m, k) = *matrix.shape();

    for i in 0..k {
        for j in i..k {
            let mut sum = 0.0;
            for row in 0..m {
                sum += matrix[[row, i]] * matrix[[row, j]];
            }
            let expected = if i == j { 1.0 } else { 0.0 };
            if (sum - expected).abs() > tolerance {
                return false;
            }
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_is_orthogonal() {
        let eye = DTensor::<f64, 2>::from_fn([3, 3], |idx| if idx[0] == idx[1] { 1.0 } else { 0.0 });
        assert!(is_orthogonal(&eye, 1e-14));
    }

    #[test]
    fn test_scaled_is_not_orthogonal() {
        let a = DTensor::<f64, 2>::from_fn([2, 2], |idx| if idx[0] == idx[1] { 2.0 } else { 0.0 });
        assert!(!is_orthogonal(&a, 1e-14));
    }
}
