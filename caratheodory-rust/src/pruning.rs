//! Pruning rules: how a kernel vector is used to zero one weight
//!
//! Moving the active weights along a kernel vector q leaves the moments
//! unchanged. The step α is chosen so that every weight stays nonnegative
//! and exactly one of them, the pivot, reaches zero.

use std::fmt;
use std::str::FromStr;

use crate::error::{PruningError, Result};

/// Feasible step bounds along a kernel vector, `(α⁻, k⁻, α⁺, k⁺)`
///
/// `α⁻ ≤ 0` is the most negative step keeping `w + α·q ≥ 0`, and the
/// weight at position `k⁻` of `inds` reaches zero there; `α⁺ ≥ 0` and `k⁺`
/// likewise for positive steps. A side with no bound reports an infinite
/// step and `None`.
pub type AlphaBounds = (f64, Option<usize>, f64, Option<usize>);

/// Step bounds along `kvec` for the weights `w` of the indices `inds`
///
/// `w`, `kvec` and `inds` are aligned: position p holds the weight, the
/// kernel entry and the original index of the same point.
/// Entries with `kvec[p] > 0` bound negative steps at `-w/kvec[p]`, entries
/// with `kvec[p] < 0` bound positive ones; zero entries are skipped. Ties
/// between equal bounds go to the lowest original index. Negative weights
/// from rounding are treated as zero.
///
/// Fails with `NoFeasibleDirection` when neither side is bounded.
pub fn get_alpha_k0s(w: &[f64], kvec: &[f64], inds: &[usize]) -> Result<AlphaBounds> {
    assert_eq!(
        kvec.len(),
        inds.len(),
        "kvec.len()={} must equal inds.len()={}",
        kvec.len(),
        inds.len()
    );
    assert_eq!(w.len(), inds.len(), "w.len()={} must equal inds.len()={}", w.len(), inds.len());

    let mut neg: Option<(f64, usize)> = None;
    let mut pos: Option<(f64, usize)> = None;

    for (p, ((&q, &i), &wi)) in kvec.iter().zip(inds.iter()).zip(w.iter()).enumerate() {
        if q == 0.0 {
            continue;
        }
        let alpha = -wi.max(0.0) / q;
        if q > 0.0 {
            // Closest to zero from below
            let better = match neg {
                None => true,
                Some((best, bp)) => alpha > best || (alpha == best && i < inds[bp]),
            };
            if better {
                neg = Some((alpha, p));
            }
        } else {
            let better = match pos {
                None => true,
                Some((best, bp)) => alpha < best || (alpha == best && i < inds[bp]),
            };
            if better {
                pos = Some((alpha, p));
            }
        }
    }

    if neg.is_none() && pos.is_none() {
        return Err(PruningError::NoFeasibleDirection);
    }

    let (alpha_n, k_n) = match neg {
        Some((a, p)) => (a, Some(p)),
        None => (f64::NEG_INFINITY, None),
    };
    let (alpha_p, k_p) = match pos {
        Some((a, p)) => (a, Some(p)),
        None => (f64::INFINITY, None),
    };
    Ok((alpha_n, k_n, alpha_p, k_p))
}

/// `w += α·q`, then the pivot at position `k0` is set to exactly zero
fn apply_step(w: &mut [f64], kvec: &[f64], inds: &[usize], alpha: f64, k0: usize) -> usize {
    for (wi, &q) in w.iter_mut().zip(kvec.iter()) {
        *wi += alpha * q;
    }
    w[k0] = 0.0;
    inds[k0]
}

/// The smaller-magnitude side of a set of bounds; the negative side wins ties
fn smaller_step(bounds: AlphaBounds) -> Option<(f64, usize)> {
    let (alpha_n, k_n, alpha_p, k_p) = bounds;
    match (k_n, k_p) {
        (Some(kn), Some(kp)) => {
            if alpha_n.abs() <= alpha_p.abs() {
                Some((alpha_n, kn))
            } else {
                Some((alpha_p, kp))
            }
        }
        (Some(kn), None) => Some((alpha_n, kn)),
        (None, Some(kp)) => Some((alpha_p, kp)),
        (None, None) => None,
    }
}

/// Chooses a step along one of the kernel vectors and applies it
pub trait PruningRule {
    /// Update `w` in place and return the original index of the zeroed pivot
    ///
    /// `w` and the `kernel` vectors are indexed like `inds`: entry p belongs
    /// to the point `inds[p]`.
    fn prune(&self, w: &mut [f64], kernel: &[Vec<f64>], inds: &[usize]) -> Result<usize>;
}

/// Uses the first kernel vector only
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstRule;

impl PruningRule for FirstRule {
    fn prune(&self, w: &mut [f64], kernel: &[Vec<f64>], inds: &[usize]) -> Result<usize> {
        let kvec = kernel.first().ok_or(PruningError::NoFeasibleDirection)?;
        let bounds = get_alpha_k0s(w, kvec, inds)?;
        let (alpha, k0) = smaller_step(bounds).ok_or(PruningError::NoFeasibleDirection)?;
        Ok(apply_step(w, kvec, inds, alpha, k0))
    }
}

/// Takes the globally smallest step over all kernel vectors
///
/// Ties go to the earlier kernel vector, then to the negative side.
/// Kernel vectors with no feasible step are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct MinAbsRule;

impl PruningRule for MinAbsRule {
    fn prune(&self, w: &mut [f64], kernel: &[Vec<f64>], inds: &[usize]) -> Result<usize> {
        let mut best: Option<(usize, f64, usize)> = None;

        for (v, kvec) in kernel.iter().enumerate() {
            let Ok(bounds) = get_alpha_k0s(w, kvec, inds) else {
                continue;
            };
            if let Some((alpha, k0)) = smaller_step(bounds) {
                let better = match best {
                    None => true,
                    Some((_, a, _)) => alpha.abs() < a.abs(),
                };
                if better {
                    best = Some((v, alpha, k0));
                }
            }
        }

        let (v, alpha, k0) = best.ok_or(PruningError::NoFeasibleDirection)?;
        Ok(apply_step(w, &kernel[v], inds, alpha, k0))
    }
}

/// Symbolic pruning rule selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PruningKind {
    #[default]
    First,
    MinAbs,
}

impl PruningRule for PruningKind {
    fn prune(&self, w: &mut [f64], kernel: &[Vec<f64>], inds: &[usize]) -> Result<usize> {
        match self {
            PruningKind::First => FirstRule.prune(w, kernel, inds),
            PruningKind::MinAbs => MinAbsRule.prune(w, kernel, inds),
        }
    }
}

impl FromStr for PruningKind {
    type Err = PruningError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" => Ok(PruningKind::First),
            "minabs" => Ok(PruningKind::MinAbs),
            _ => Err(PruningError::InvalidInput(format!(
                "unknown pruning rule '{}'",
                s
            ))),
        }
    }
}

impl fmt::Display for PruningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PruningKind::First => f.write_str("first"),
            PruningKind::MinAbs => f.write_str("minabs"),
        }
    }
}

#[cfg(test)]
#[path = "pruning_tests.rs"]
mod tests;
