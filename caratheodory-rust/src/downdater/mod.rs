//! Kernel-vector downdaters
//!
//! A downdater keeps an orthogonal factorization of `V[S,:]` for the active
//! row set S and hands out unit vectors q with `V[S,:]ᵀ q ≈ 0`. Removing a
//! row (a *downdate*) re-establishes the factorization for `S \ {idx}`.
//!
//! Every variant builds its kernel vectors the same way: the unit vectors
//! `e_0, e_1, …` of the active ordering are projected onto the orthogonal
//! complement of the range of `V[S,:]`, orthogonalized against the vectors
//! already accepted and normalized. The result depends only on the range,
//! not on the particular orthonormal basis, so all variants agree with the
//! full-QR baseline up to rounding.

use std::fmt;
use std::str::FromStr;

use mdarray::DTensor;
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

use crate::error::{PruningError, Result};
use crate::matrix::MomentMatrix;

pub mod cholesky;
pub mod full_qr;
pub mod full_qr_updown;
pub mod givens;
pub mod givens_updown;

pub use cholesky::{CholeskyConfig, CholeskyDowndater};
pub use full_qr::FullQRDowndater;
pub use full_qr_updown::FullQRUpDowndater;
pub use givens::GivensDowndater;
pub use givens_updown::GivensUpDowndater;

/// Projected unit vectors with a smaller norm are treated as lying in the range
pub const KERNEL_TOLERANCE: f64 = 1e-8;

/// Incrementally maintained factorization that yields kernel vectors
pub trait KernelDowndater {
    /// Active row indices; kernel vectors are indexed in this order
    fn active_indices(&self) -> &[usize];

    /// Up to `k` orthonormal vectors q with `V[S,:]ᵀ q ≈ 0`
    fn kernel_vectors(&mut self) -> Result<Vec<Vec<f64>>>;

    /// Remove `idx` from the active set and update the factorization
    fn downdate(&mut self, idx: usize) -> Result<()>;
}

impl<D: KernelDowndater + ?Sized> KernelDowndater for Box<D> {
    fn active_indices(&self) -> &[usize] {
        (**self).active_indices()
    }

    fn kernel_vectors(&mut self) -> Result<Vec<Vec<f64>>> {
        (**self).kernel_vectors()
    }

    fn downdate(&mut self, idx: usize) -> Result<()> {
        (**self).downdate(idx)
    }
}

/// Kernel vectors from a projector onto the complement of an N-dimensional range
///
/// `project_out(y)` must replace `y` by `y - Q₁Q₁ᵀy` for an orthonormal basis
/// Q₁ of the range. Returns `min(k, m - ncols)` vectors when that many exist.
pub(crate) fn projected_kernel_vectors<F>(
    m: usize,
    ncols: usize,
    k: usize,
    mut project_out: F,
) -> Result<Vec<Vec<f64>>>
where
    F: FnMut(&mut [f64]),
{
    if m <= ncols {
        return Err(PruningError::DegenerateKernel { active: m, ncols });
    }

    let wanted = k.min(m - ncols);
    let mut kernel: Vec<Vec<f64>> = Vec::with_capacity(wanted);

    for p in 0..m {
        if kernel.len() == wanted {
            break;
        }

        let mut y = vec![0.0; m];
        y[p] = 1.0;
        project_out(&mut y);

        for q in &kernel {
            let c = qr_update::dot(q, &y);
            for (yi, qi) in y.iter_mut().zip(q.iter()) {
                *yi -= c * qi;
            }
        }

        let norm = qr_update::norm_2(&y);
        if norm > KERNEL_TOLERANCE {
            y.iter_mut().for_each(|x| *x /= norm);
            kernel.push(y);
        }
    }

    if kernel.is_empty() {
        return Err(PruningError::DegenerateKernel { active: m, ncols });
    }
    Ok(kernel)
}

/// `y ← y - Q₁Q₁ᵀy` with Q₁ the first `ncols` columns of `q`
pub(crate) fn project_out_columns(q: &DTensor<f64, 2>, ncols: usize, y: &mut [f64]) {
    let (m, qc) = *q.shape();
    assert_eq!(y.len(), m, "y.len()={} must equal nrows={}", y.len(), m);

    let ncols = ncols.min(qc);
    let coeffs: Vec<f64> = (0..ncols)
        .map(|j| (0..m).map(|i| q[[i, j]] * y[i]).sum())
        .collect();
    for (i, yi) in y.iter_mut().enumerate() {
        *yi -= (0..ncols).map(|j| q[[i, j]] * coeffs[j]).sum::<f64>();
    }
}

/// Position of `idx` in the active ordering
pub(crate) fn position_of(active: &[usize], idx: usize) -> Result<usize> {
    active
        .iter()
        .position(|&i| i == idx)
        .ok_or(PruningError::InactiveIndex(idx))
}

pub(crate) fn validate_shape<M: MomentMatrix + ?Sized>(v: &M, k: usize) -> Result<()> {
    let (m, n) = (v.nrows(), v.ncols());
    if n == 0 {
        return Err(PruningError::InvalidInput(
            "moment matrix has no columns".to_string(),
        ));
    }
    if m < n {
        return Err(PruningError::InvalidInput(format!(
            "moment matrix has {} rows and {} columns; transpose it so that rows are points",
            m, n
        )));
    }
    if k == 0 {
        return Err(PruningError::InvalidInput(
            "number of kernel vectors k must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Check that `order` is a permutation of `0..m`
pub(crate) fn validate_order(order: &[usize], m: usize) -> Result<()> {
    if order.len() != m {
        return Err(PruningError::InvalidInput(format!(
            "index order has length {}, expected {}",
            order.len(),
            m
        )));
    }
    let mut seen = vec![false; m];
    for &i in order {
        if i >= m || seen[i] {
            return Err(PruningError::InvalidInput(format!(
                "index order is not a permutation of 0..{} (offending entry {})",
                m, i
            )));
        }
        seen[i] = true;
    }
    Ok(())
}

/// Random permutation of `0..m`; reproducible when `seed` is given
pub fn random_order(m: usize, seed: Option<u64>) -> Vec<usize> {
    let mut rng = match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };
    let mut order: Vec<usize> = (0..m).collect();
    order.shuffle(&mut rng);
    order
}

/// Downdate iterations at which a full factorization replaces the update
///
/// `ceil(pct/100 · n_iter)` resets at iterations `n_iter - round(n_iter^(j/count))`,
/// `j = 1..=count`. The schedule is dense towards the end of the run, where
/// the active set is small and accumulated rounding matters most.
pub fn log_reset_schedule(n_iter: usize, pct: f64) -> Vec<usize> {
    if n_iter == 0 || !(pct > 0.0) {
        return Vec::new();
    }
    let count = ((pct / 100.0) * n_iter as f64).ceil() as usize;
    let log_n = (n_iter as f64).ln();

    let mut schedule: Vec<usize> = (1..=count)
        .map(|j| {
            let p = (j as f64 * log_n / count as f64).exp().round() as usize;
            n_iter - p.clamp(1, n_iter)
        })
        .collect();
    schedule.sort_unstable();
    schedule.dedup();
    schedule
}

/// Interval between linearly spaced full resets, `round(100 / pct)`
pub fn linear_reset_interval(pct: f64) -> Option<usize> {
    if !(pct > 0.0) {
        return None;
    }
    Some(((100.0 / pct).round() as usize).max(1))
}

/// Symbolic downdater selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DowndaterKind {
    FullQR,
    Givens,
    Cholesky,
    FullQRUpDown,
    #[default]
    GivensUpDown,
}

impl FromStr for DowndaterKind {
    type Err = PruningError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fullqr" | "fullqrdowndater" => Ok(DowndaterKind::FullQR),
            "givens" | "givensdowndater" => Ok(DowndaterKind::Givens),
            "cholesky" | "choleskydowndater" => Ok(DowndaterKind::Cholesky),
            "fullqrupdown" | "fullqrupdowndater" => Ok(DowndaterKind::FullQRUpDown),
            "givensupdown" | "givensupdowndater" => Ok(DowndaterKind::GivensUpDown),
            _ => Err(PruningError::InvalidInput(format!(
                "unknown kernel downdater '{}'",
                s
            ))),
        }
    }
}

impl fmt::Display for DowndaterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DowndaterKind::FullQR => "FullQRDowndater",
            DowndaterKind::Givens => "GivensDowndater",
            DowndaterKind::Cholesky => "CholeskyDowndater",
            DowndaterKind::FullQRUpDown => "FullQRUpDowndater",
            DowndaterKind::GivensUpDown => "GivensUpDowndater",
        };
        f.write_str(name)
    }
}

/// Parameters forwarded to the selected downdater
///
/// Fields that do not apply to the selected variant are ignored.
#[derive(Debug, Clone)]
pub struct DowndaterParams {
    /// Kernel vectors per iteration (window excess for up/down variants)
    pub k: usize,
    /// Full-reset percentage; `None` uses the variant's default
    pub pct_full_qr: Option<f64>,
    /// Sherman-Morrison tolerance (Cholesky)
    pub sm_tol: f64,
    /// Maintain Q explicitly (Cholesky)
    pub full_q: bool,
    /// Insertion order (up/down variants); random when `None`
    pub ind_order: Option<Vec<usize>>,
    /// Seed for the random insertion order
    pub seed: Option<u64>,
}

impl Default for DowndaterParams {
    fn default() -> Self {
        Self {
            k: 1,
            pct_full_qr: None,
            sm_tol: cholesky::DEFAULT_SM_TOL,
            full_q: false,
            ind_order: None,
            seed: None,
        }
    }
}

impl DowndaterParams {
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_order(mut self, order: Vec<usize>) -> Self {
        self.ind_order = Some(order);
        self
    }

    fn order(&self, m: usize) -> Vec<usize> {
        match &self.ind_order {
            Some(order) => order.clone(),
            None => random_order(m, self.seed),
        }
    }
}

/// Construct the downdater named by `kind` over `v`
pub fn build_downdater<'a, M: MomentMatrix + ?Sized>(
    v: &'a M,
    kind: DowndaterKind,
    params: &DowndaterParams,
) -> Result<Box<dyn KernelDowndater + 'a>> {
    let m = v.nrows();
    Ok(match kind {
        DowndaterKind::FullQR => Box::new(FullQRDowndater::new(v, params.k)?),
        DowndaterKind::Givens => Box::new(GivensDowndater::new(v, params.k)?),
        DowndaterKind::Cholesky => {
            let config = CholeskyConfig {
                k: params.k,
                pct_full_qr: params.pct_full_qr.unwrap_or(cholesky::DEFAULT_PCT_FULL_QR),
                sm_tol: params.sm_tol,
                full_q: params.full_q,
                ..CholeskyConfig::default()
            };
            Box::new(CholeskyDowndater::new(v, config)?)
        }
        DowndaterKind::FullQRUpDown => {
            Box::new(FullQRUpDowndater::new(v, params.k, params.order(m))?)
        }
        DowndaterKind::GivensUpDown => Box::new(GivensUpDowndater::new(
            v,
            params.k,
            params.order(m),
            params.pct_full_qr.unwrap_or(givens_updown::DEFAULT_PCT_FULL_QR),
        )?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_parse_aliases() {
        assert_eq!("FullQR".parse::<DowndaterKind>().unwrap(), DowndaterKind::FullQR);
        assert_eq!(
            "FullQRDowndater".parse::<DowndaterKind>().unwrap(),
            DowndaterKind::FullQR
        );
        assert_eq!(
            "GivensUpDowndater".parse::<DowndaterKind>().unwrap(),
            DowndaterKind::GivensUpDown
        );
        assert_eq!("cholesky".parse::<DowndaterKind>().unwrap(), DowndaterKind::Cholesky);
        assert!("Householder".parse::<DowndaterKind>().is_err());

        for kind in [
            DowndaterKind::FullQR,
            DowndaterKind::Givens,
            DowndaterKind::Cholesky,
            DowndaterKind::FullQRUpDown,
            DowndaterKind::GivensUpDown,
        ] {
            assert_eq!(kind.to_string().parse::<DowndaterKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_log_schedule_is_dense_near_end() {
        let schedule = log_reset_schedule(100, 10.0);
        assert!(!schedule.is_empty());
        assert!(schedule.len() <= 10);
        assert!(schedule.windows(2).all(|w| w[0] < w[1]));
        assert!(schedule.iter().all(|&t| t < 100));
        // 100^(1/10) ≈ 1.58 rounds to 2
        assert_eq!(*schedule.last().unwrap(), 98);
        assert_eq!(schedule[0], 0);

        assert!(log_reset_schedule(0, 10.0).is_empty());
        assert!(log_reset_schedule(50, 0.0).is_empty());
    }

    #[test]
    fn test_linear_interval() {
        assert_eq!(linear_reset_interval(2.0), Some(50));
        assert_eq!(linear_reset_interval(100.0), Some(1));
        assert_eq!(linear_reset_interval(0.0), None);
    }

    #[test]
    fn test_random_order_is_seeded_permutation() {
        let a = random_order(20, Some(7));
        let b = random_order(20, Some(7));
        assert_eq!(a, b);
        let mut sorted = a.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..20).collect::<Vec<_>>());
        assert!(validate_order(&a, 20).is_ok());
        assert!(validate_order(&[0, 0, 1], 3).is_err());
    }

    #[test]
    fn test_projected_kernel_vectors_span_complement() {
        // Range spanned by (1, 1, 0)/√2
        let s = 0.5f64.sqrt();
        let q = DTensor::<f64, 2>::from_fn([3, 1], |idx| if idx[0] < 2 { s } else { 0.0 });
        let kernel = projected_kernel_vectors(3, 1, 5, |y| project_out_columns(&q, 1, y)).unwrap();

        assert_eq!(kernel.len(), 2);
        // e_0 projected: (1/2, -1/2, 0) normalized
        assert_abs_diff_eq!(kernel[0][0], s, epsilon = 1e-14);
        assert_abs_diff_eq!(kernel[0][1], -s, epsilon = 1e-14);
        assert_abs_diff_eq!(kernel[0][2], 0.0, epsilon = 1e-14);
        // e_1 is dependent on e_0 after projection, e_2 is accepted
        assert_abs_diff_eq!(kernel[1][2], 1.0, epsilon = 1e-14);
    }

    #[test]
    fn test_projected_kernel_vectors_degenerate() {
        let err = projected_kernel_vectors(2, 2, 1, |_| {}).unwrap_err();
        assert!(matches!(err, PruningError::DegenerateKernel { active: 2, ncols: 2 }));
    }
}
