//! Vector norm computations

/// Inner product of two vectors of equal length
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    assert_eq!(
        a.len(),
        b.len(),
        "dot: length mismatch {} vs {}",
        a.len(),
        b.len()
    );
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Compute the 2-norm (Euclidean norm) of a vector
///
/// Scaled by the largest entry so that tiny and huge inputs do not
/// underflow or overflow.
pub fn norm_2(vec: &[f64]) -> f64 {
    let scale = norm_inf(vec);
    if scale == 0.0 || !scale.is_finite() {
        return scale;
    }
    let sum: f64 = vec
        .iter()
        .map(|x| {
            let y = x / scale;
            y * y
        })
        .sum();
    scale * sum.sqrt()
}

/// Compute the 1-norm (sum of absolute values) of a vector
pub fn norm_1(vec: &[f64]) -> f64 {
    vec.iter().map(|x| x.abs()).sum()
}

/// Compute the maximum absolute value in a vector
pub fn norm_inf(vec: &[f64]) -> f64 {
    let mut max_val = 0.0;
    for &x in vec {
        let abs_val = x.abs();
        if abs_val > max_val || abs_val.is_nan() {
            max_val = abs_val;
        }
    }
    max_val
}
