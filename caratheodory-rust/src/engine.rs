//! The pruning loop
//!
//! Starting from M nonnegative weights, each iteration asks the downdater
//! for kernel vectors of `V[S,:]ᵀ`, lets the rule zero one weight along them
//! and removes the pivot from the active set. After `M - N` iterations N
//! indices remain; the surviving weights are optionally re-solved from the
//! original moments `η = Vᵀw`.
//!
//! The input weights are read twice: once, uncached, while streaming η, and
//! once more when an index enters the downdater's active set. Only the
//! weights of the active set are held, so an up/down window over an
//! on-demand vector keeps memory independent of M.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use tracing::{debug, trace, warn};

use crate::config::{ErrorNorm, PruningConfig};
use crate::downdater::{DowndaterKind, DowndaterParams, KernelDowndater, build_downdater};
use crate::error::{PruningError, Result};
use crate::linalg::solve_transposed;
use crate::matrix::{MomentMatrix, Transposed, WeightSource};
use crate::pruning::{PruningKind, PruningRule};

/// Input weights read per block while streaming the moments
const MOMENT_BLOCK: usize = 256;

/// Output of a pruning run
#[derive(Debug, Clone)]
pub struct PruningResult {
    /// Surviving indices in increasing order
    pub indices: Vec<usize>,
    /// Weights of `indices`, position by position
    pub weights: Vec<f64>,
    /// Final moment error, when requested
    pub error: Option<f64>,
    /// Moment error after each iteration, when tracked
    pub error_history: Vec<f64>,
}

impl PruningResult {
    /// Weight of point `i`; zero when it was pruned
    pub fn weight(&self, i: usize) -> f64 {
        self.indices
            .binary_search(&i)
            .map_or(0.0, |p| self.weights[p])
    }

    /// `(index, weight)` of every surviving point
    pub fn pairs(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.indices.iter().copied().zip(self.weights.iter().copied())
    }

    /// Weight vector over all `len` points, exactly zero off the support
    pub fn dense_weights(&self, len: usize) -> Vec<f64> {
        let mut w = vec![0.0; len];
        for (i, x) in self.pairs() {
            w[i] = x;
        }
        w
    }
}

/// Moments `V[S,:]ᵀ w` of the weights `w` of the points `indices`
pub fn moments<M: MomentMatrix + ?Sized>(v: &M, weights: &[f64], indices: &[usize]) -> Vec<f64> {
    v.weighted_column_sums(indices, weights)
}

/// `‖η - V[S,:]ᵀ w‖` under `norm`, `w` aligned with `indices`
pub fn moment_error<M: MomentMatrix + ?Sized>(
    v: &M,
    weights: &[f64],
    indices: &[usize],
    eta: &[f64],
    norm: ErrorNorm,
) -> f64 {
    let current = moments(v, weights, indices);
    let residual: Vec<f64> = eta.iter().zip(current.iter()).map(|(e, c)| e - c).collect();
    norm.apply(&residual)
}

/// Weights on `indices` that reproduce the moments `eta`
///
/// Solves `V[S,:]ᵀ x = η` in the least-squares sense through an SVD of
/// `V[S,:]`. Applying it to the output of a corrected run returns the same
/// weights up to rounding. A (numerically) rank-deficient `V[S,:]` is
/// reported as [`PruningError::RankDeficient`].
pub fn caratheodory_correction<M: MomentMatrix + ?Sized>(
    v: &M,
    indices: &[usize],
    eta: &[f64],
) -> Result<Vec<f64>> {
    let n = v.ncols();
    if eta.len() != n {
        return Err(PruningError::InvalidInput(format!(
            "moment vector has length {}, expected {}",
            eta.len(),
            n
        )));
    }
    if indices.is_empty() {
        return Err(PruningError::InvalidInput(
            "correction needs at least one index".to_string(),
        ));
    }

    solve_transposed(&v.submatrix(indices), eta)
}

fn validate_inputs<M, W>(v: &M, w_in: &W) -> Result<()>
where
    M: MomentMatrix + ?Sized,
    W: WeightSource + ?Sized,
{
    let (m, n) = (v.nrows(), v.ncols());
    if n == 0 {
        return Err(PruningError::InvalidInput(
            "moment matrix has no columns".to_string(),
        ));
    }
    if m < n {
        return Err(PruningError::InvalidInput(format!(
            "moment matrix has {} rows and {} columns; expected at least as many rows as columns",
            m, n
        )));
    }
    if w_in.len() != m {
        return Err(PruningError::InvalidInput(format!(
            "weight vector has length {}, expected {}",
            w_in.len(),
            m
        )));
    }
    Ok(())
}

fn checked_weight(i: usize, x: f64) -> Result<f64> {
    if !x.is_finite() || x < 0.0 {
        return Err(PruningError::InvalidInput(format!(
            "weight {} is {}; weights must be finite and nonnegative",
            i, x
        )));
    }
    Ok(x)
}

/// `η = Vᵀ w_in`, one block of peeked weights at a time
fn stream_moments<M, W>(v: &M, w_in: &W) -> Result<Vec<f64>>
where
    M: MomentMatrix + ?Sized,
    W: WeightSource + ?Sized,
{
    let m = v.nrows();
    let mut eta = vec![0.0; v.ncols()];
    let mut block = Vec::with_capacity(MOMENT_BLOCK.min(m));
    let mut weights = Vec::with_capacity(MOMENT_BLOCK.min(m));

    for start in (0..m).step_by(MOMENT_BLOCK) {
        block.clear();
        weights.clear();
        for i in start..(start + MOMENT_BLOCK).min(m) {
            weights.push(checked_weight(i, w_in.peek(i))?);
            block.push(i);
        }
        for (e, s) in eta.iter_mut().zip(v.weighted_column_sums(&block, &weights)) {
            *e += s;
        }
    }
    Ok(eta)
}

/// Weights of the points in the downdater's active set
struct ActiveWeights {
    weights: HashMap<usize, f64>,
    /// Moments of the points that have not entered the active set yet,
    /// kept only while errors are tracked
    outside: Option<Vec<f64>>,
}

impl ActiveWeights {
    fn new(eta: &[f64], track_errors: bool) -> Self {
        Self {
            weights: HashMap::new(),
            outside: track_errors.then(|| eta.to_vec()),
        }
    }

    /// Read the weights of indices that just entered `active` and release
    /// them from `w_in`
    fn admit<M, W>(&mut self, v: &M, w_in: &W, active: &[usize]) -> Result<()>
    where
        M: MomentMatrix + ?Sized,
        W: WeightSource + ?Sized,
    {
        let mut entered = Vec::new();
        let mut entered_weights = Vec::new();
        for &i in active {
            if let Entry::Vacant(slot) = self.weights.entry(i) {
                let x = checked_weight(i, w_in.get(i))?;
                w_in.forget(i);
                slot.insert(x);
                entered.push(i);
                entered_weights.push(x);
            }
        }

        if let Some(outside) = self.outside.as_mut() {
            if !entered.is_empty() {
                let sums = v.weighted_column_sums(&entered, &entered_weights);
                for (o, s) in outside.iter_mut().zip(sums) {
                    *o -= s;
                }
            }
        }
        Ok(())
    }

    /// Weights aligned with `inds`
    fn gather(&self, inds: &[usize]) -> Vec<f64> {
        inds.iter().map(|i| self.weights[i]).collect()
    }

    /// Moment error of the current weights, points outside the active set
    /// counted with their input weights
    fn error<M: MomentMatrix + ?Sized>(
        &self,
        v: &M,
        active: &[usize],
        eta: &[f64],
        norm: ErrorNorm,
    ) -> f64 {
        let target: Vec<f64> = match &self.outside {
            Some(outside) => eta.iter().zip(outside.iter()).map(|(e, o)| e - o).collect(),
            None => eta.to_vec(),
        };
        moment_error(v, &self.gather(active), active, &target, norm)
    }
}

fn sorted_indices(active: &[usize]) -> Vec<usize> {
    let mut indices = active.to_vec();
    indices.sort_unstable();
    indices
}

/// One iteration: kernel vectors, rule, clamp, downdate. Returns the pivot.
fn prune_once<D, R>(
    downdater: &mut D,
    rule: &R,
    active: &mut ActiveWeights,
    zero_tolerance: f64,
) -> Result<usize>
where
    D: KernelDowndater + ?Sized,
    R: PruningRule + ?Sized,
{
    let kernel = downdater.kernel_vectors()?;
    let inds = downdater.active_indices();
    let mut w = active.gather(inds);
    let pivot = rule.prune(&mut w, &kernel, inds)?;
    for (&i, &x) in inds.iter().zip(w.iter()) {
        active.weights.insert(i, if x < zero_tolerance { 0.0 } else { x });
    }
    active.weights.remove(&pivot);
    downdater.downdate(pivot)?;
    Ok(pivot)
}

/// Prune `w_in` to at most N nonzero weights with the same moments `Vᵀw`
///
/// `v` is M × N with M ≥ N and `w_in` has length M with finite nonnegative
/// entries. `downdater` must have been built over `v` with all of its rows
/// available (the up/down variants keep the rest in their insertion order).
/// The result holds the N surviving indices and their weights; use
/// [`PruningResult::dense_weights`] for a full-length vector.
///
/// Failures inside the loop are reported as [`PruningError::PruningFailed`]
/// carrying the iteration and the downdater's active indices before it; a
/// raised cancel flag yields [`PruningError::Cancelled`]. Indices an up/down
/// window has not reached yet are not part of either.
pub fn caratheodory_pruning<M, W, D, R>(
    v: &M,
    w_in: &W,
    downdater: &mut D,
    rule: &R,
    config: &PruningConfig,
) -> Result<PruningResult>
where
    M: MomentMatrix + ?Sized,
    W: WeightSource + ?Sized,
    D: KernelDowndater + ?Sized,
    R: PruningRule + ?Sized,
{
    validate_inputs(v, w_in)?;
    let (m, n) = (v.nrows(), v.ncols());
    let total = m - n;

    let eta = stream_moments(v, w_in)?;

    let mut active = ActiveWeights::new(&eta, config.track_errors);
    active.admit(v, w_in, downdater.active_indices())?;
    for i in 0..m {
        if !active.weights.contains_key(&i) {
            v.forget_row(i);
        }
    }

    debug!(nrows = m, ncols = n, iterations = total, "starting Carathéodory pruning");

    if total == 0 {
        let indices = sorted_indices(downdater.active_indices());
        let weights = active.gather(&indices);
        let error = config
            .return_error
            .then(|| moment_error(v, &weights, &indices, &eta, config.error_norm));
        return Ok(PruningResult {
            indices,
            weights,
            error,
            error_history: Vec::new(),
        });
    }

    let mut error_history = Vec::new();

    for iteration in 0..total {
        if config.is_cancelled() {
            return Err(PruningError::Cancelled {
                iteration,
                indices: sorted_indices(downdater.active_indices()),
            });
        }

        let before = downdater.active_indices().to_vec();
        let step = prune_once(downdater, rule, &mut active, config.zero_tolerance)
            .and_then(|pivot| {
                active.admit(v, w_in, downdater.active_indices())?;
                Ok(pivot)
            });
        let pivot = step.map_err(|source| PruningError::PruningFailed {
            iteration,
            indices: sorted_indices(&before),
            source: Box::new(source),
        })?;

        if config.track_errors {
            let current = downdater.active_indices();
            error_history.push(active.error(v, current, &eta, config.error_norm));
        }

        trace!(iteration, pivot, remaining = m - iteration - 1, "pruned weight");
        config.report_progress(iteration + 1, total);
    }

    let indices = sorted_indices(downdater.active_indices());
    let mut weights = active.gather(&indices);

    if config.correction {
        let corrected = caratheodory_correction(v, &indices, &eta).map_err(|source| {
            PruningError::PruningFailed {
                iteration: total,
                indices: indices.clone(),
                source: Box::new(source),
            }
        })?;
        let negative = corrected.iter().filter(|&&x| x < 0.0).count();
        if negative > 0 {
            warn!(negative, "corrected weights contain negative entries");
        }
        weights = corrected;
    }

    let error = config
        .return_error
        .then(|| moment_error(v, &weights, &indices, &eta, config.error_norm));

    debug!(indices = indices.len(), error = ?error, "pruning finished");

    Ok(PruningResult {
        indices,
        weights,
        error,
        error_history,
    })
}

/// [`caratheodory_pruning`] with symbolic downdater and rule selection
///
/// Wide inputs (fewer rows than columns) are pruned over their columns: the
/// points are then the columns of `v` and `w_in` has one entry per column.
///
/// ```ignore
/// let kind: DowndaterKind = "FullQR".parse()?;
/// let result = caratheodory_pruning_with(
///     &v, &w, kind, PruningKind::First, &DowndaterParams::default(), &PruningConfig::default(),
/// )?;
/// assert_eq!(result.indices.len(), v.ncols());
/// ```
pub fn caratheodory_pruning_with<M, W>(
    v: &M,
    w_in: &W,
    downdater: DowndaterKind,
    rule: PruningKind,
    params: &DowndaterParams,
    config: &PruningConfig,
) -> Result<PruningResult>
where
    M: MomentMatrix + ?Sized,
    W: WeightSource + ?Sized,
{
    if v.nrows() < v.ncols() {
        let view = Transposed::new(v);
        prune_with_kind(&view, w_in, downdater, rule, params, config)
    } else {
        prune_with_kind(v, w_in, downdater, rule, params, config)
    }
}

fn prune_with_kind<M, W>(
    v: &M,
    w_in: &W,
    kind: DowndaterKind,
    rule: PruningKind,
    params: &DowndaterParams,
    config: &PruningConfig,
) -> Result<PruningResult>
where
    M: MomentMatrix + ?Sized,
    W: WeightSource + ?Sized,
{
    validate_inputs(v, w_in)?;
    let mut downdater = build_downdater(v, kind, params)?;
    caratheodory_pruning(v, w_in, &mut downdater, &rule, config)
}
