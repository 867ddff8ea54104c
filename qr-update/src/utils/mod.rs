//! Utility functions for vector norms and factorization checks

pub mod norms;
pub mod validation;

pub use norms::{dot, norm_1, norm_2, norm_inf};
pub use validation::is_orthogonal;
