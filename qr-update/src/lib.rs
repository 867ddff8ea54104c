//! # qr-update: dense QR factorizations that can be updated in place
//!
//! Small, dependency-light building blocks on top of `mdarray` tensors:
//!
//! - Givens rotations, triangularization of `Q * B` into a full QR, and
//!   deletion and appending of a row of a full QR
//! - Rank-one Cholesky downdates and triangular solves
//!
//! Fresh factorizations come from a dense library; this crate only keeps
//! them current as rows leave and enter.

pub mod cholesky;
pub mod error;
pub mod givens;
pub mod utils;

pub use cholesky::{cholesky_downdate, identity, rank_one_update, solve_lower};
pub use error::QrError;
pub use givens::{GivensRotation, q_delete_row, qr_append_row, qr_delete_row, triangularize};
pub use utils::{dot, is_orthogonal, norm_1, norm_2, norm_inf};
