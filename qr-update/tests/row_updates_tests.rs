//! Sequences of row deletions and appends against fresh factorizations

use mdarray::DTensor;
use qr_update::*;

/// Simple deterministic pseudo-random number generator (LCG)
struct SimpleRng {
    state: u64,
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_f64(&mut self) -> f64 {
        self.state = self.state.wrapping_mul(1664525).wrapping_add(1013904223);
        ((self.state >> 16) as f64) / ((1u64 << 48) as f64)
    }
}

fn random_matrix(rng: &mut SimpleRng, m: usize, n: usize) -> DTensor<f64, 2> {
    let data: Vec<f64> = (0..m * n).map(|_| rng.next_f64() - 0.5).collect();
    DTensor::<f64, 2>::from_fn([m, n], |idx| data[idx[0] * n + idx[1]])
}

fn matmul(a: &DTensor<f64, 2>, b: &DTensor<f64, 2>) -> DTensor<f64, 2> {
    let (m, k1) = *a.shape();
    let (k2, n) = *b.shape();
    assert_eq!(k1, k2, "Matrix dimensions incompatible for multiplication");
    DTensor::<f64, 2>::from_fn([m, n], |idx| {
        (0..k1).map(|k| a[[idx[0], k]] * b[[k, idx[1]]]).sum()
    })
}

/// Full QR of `a` by Givens triangularization of `I * a`
fn full_qr(a: &DTensor<f64, 2>) -> (DTensor<f64, 2>, DTensor<f64, 2>) {
    let mut q = identity(a.shape().0);
    let mut r = a.clone();
    triangularize(&mut q, &mut r).unwrap();
    (q, r)
}

fn assert_factorizes(q: &DTensor<f64, 2>, r: &DTensor<f64, 2>, rows: &[Vec<f64>], tol: f64) {
    assert!(is_orthogonal(q, tol), "Q lost orthogonality");
    let prod = matmul(q, r);
    for (i, row) in rows.iter().enumerate() {
        for (j, &value) in row.iter().enumerate() {
            let err = (prod[[i, j]] - value).abs();
            assert!(err < tol, "QR[{}, {}] off by {}", i, j, err);
        }
    }
    // Upper trapezoidal R
    let (m, n) = *r.shape();
    for i in 0..m {
        for j in 0..n.min(i) {
            assert!(r[[i, j]].abs() < tol, "R[{}, {}] = {} below diagonal", i, j, r[[i, j]]);
        }
    }
}

#[test]
fn test_sliding_window_keeps_factorization() {
    let mut rng = SimpleRng::new(42);
    let n = 4;
    let pool = random_matrix(&mut rng, 20, n);
    let pool_row = |i: usize| -> Vec<f64> { (0..n).map(|j| pool[[i, j]]).collect() };

    let window = 7;
    let mut rows: Vec<Vec<f64>> = (0..window).map(&pool_row).collect();
    let a = DTensor::<f64, 2>::from_fn([window, n], |idx| rows[idx[0]][idx[1]]);
    let (mut q, mut r) = full_qr(&a);
    assert_factorizes(&q, &r, &rows, 1e-12);

    for next in window..20 {
        let victim = (next * 3) % rows.len();
        let (q_del, r_del) = qr_delete_row(&q, &r, victim).unwrap();
        rows.remove(victim);
        assert_factorizes(&q_del, &r_del, &rows, 1e-11);

        let new_row = pool_row(next);
        let (q_app, r_app) = qr_append_row(&q_del, &r_del, &new_row).unwrap();
        rows.push(new_row);
        assert_factorizes(&q_app, &r_app, &rows, 1e-11);

        q = q_app;
        r = r_app;
    }
}

#[test]
fn test_delete_without_r_preserves_range() {
    let mut rng = SimpleRng::new(7);
    let (m, n) = (8, 3);
    let a = random_matrix(&mut rng, m, n);
    let (q, _) = full_qr(&a);

    let q_del = q_delete_row(&q, 5).unwrap();
    assert!(is_orthogonal(&q_del, 1e-12));

    // Columns n.. of the updated Q annihilate the reduced matrix
    let kept: Vec<usize> = (0..m).filter(|&i| i != 5).collect();
    for col in n..(m - 1) {
        for j in 0..n {
            let s: f64 = kept
                .iter()
                .enumerate()
                .map(|(pos, &i)| q_del[[pos, col]] * a[[i, j]])
                .sum();
            assert!(s.abs() < 1e-12, "column {} not orthogonal to range: {}", col, s);
        }
    }
}

#[test]
fn test_appends_build_factorization_from_empty() {
    let mut rng = SimpleRng::new(3);
    let (m, n) = (9, 4);
    let a = random_matrix(&mut rng, m, n);

    let mut q = DTensor::<f64, 2>::from_elem([0, 0], 0.0);
    let mut r = DTensor::<f64, 2>::from_elem([0, n], 0.0);
    let mut rows: Vec<Vec<f64>> = Vec::new();
    for i in 0..m {
        let row: Vec<f64> = (0..n).map(|j| a[[i, j]]).collect();
        (q, r) = qr_append_row(&q, &r, &row).unwrap();
        rows.push(row);
        assert_factorizes(&q, &r, &rows, 1e-12);
    }

    // Same R as the one-shot factorization, up to the signs of its rows
    let (_, r_full) = full_qr(&a);
    for i in 0..n {
        for j in i..n {
            assert!((r[[i, j]].abs() - r_full[[i, j]].abs()).abs() < 1e-12);
        }
    }
}
