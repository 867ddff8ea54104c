//! Error types for factorization and update routines

/// Errors raised by the factorization routines
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QrError {
    #[error("Matrix is empty")]
    EmptyMatrix,

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("Cholesky downdate lost positive definiteness at column {column}")]
    DowndateFailed { column: usize },
}
