//! # caratheodory-rust: Carathéodory pruning of nonnegative weights
//!
//! Given an M × N moment matrix V and nonnegative weights w of length M,
//! the pruning returns weights supported on N indices with the same moments
//! `Vᵀw`, following the constructive proof of Carathéodory's theorem.
//!
//! The loop is driven by two pluggable pieces: a [`KernelDowndater`], which
//! maintains an orthogonal factorization of the active rows and yields
//! kernel vectors, and a [`PruningRule`], which zeroes one weight along them.
//! Matrices and weights are read through [`MomentMatrix`] and
//! [`WeightSource`], so lazily generated [`OnDemandMatrix`] and
//! [`OnDemandVector`] inputs work the same as dense tensors.

pub mod config;
pub mod downdater; // Kernel-vector downdaters (full QR, Givens, Cholesky, up/down windows)
pub mod engine;
pub mod error;
mod linalg;
pub mod matrix;
pub mod ondemand;
pub mod pruning;

pub use config::{ErrorNorm, PruningConfig, ProgressCallback};
pub use downdater::{
    CholeskyConfig, CholeskyDowndater, DowndaterKind, DowndaterParams, FullQRDowndater,
    FullQRUpDowndater, GivensDowndater, GivensUpDowndater, KernelDowndater, build_downdater,
    linear_reset_interval, log_reset_schedule, random_order,
};
pub use engine::{
    PruningResult, caratheodory_correction, caratheodory_pruning, caratheodory_pruning_with,
    moment_error, moments,
};
pub use error::{PruningError, Result};
pub use matrix::{MomentMatrix, Transposed, WeightSource};
pub use ondemand::{OnDemandMatrix, OnDemandVector, Orientation};
pub use pruning::{AlphaBounds, FirstRule, MinAbsRule, PruningKind, PruningRule, get_alpha_k0s};

// Re-export external dependencies for convenience
pub use mdarray::DTensor;
