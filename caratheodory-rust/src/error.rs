//! Error types for Carathéodory pruning

use qr_update::QrError;

/// Errors raised by downdaters, pruning rules and the pruning engine
#[derive(Debug, Clone, thiserror::Error)]
pub enum PruningError {
    #[error("no kernel vector could be extracted from {active} active rows with {ncols} columns")]
    DegenerateKernel { active: usize, ncols: usize },

    #[error("Sherman-Morrison denominator {denominator:e} is below the tolerance {tolerance:e}")]
    NearSingularUpdate { denominator: f64, tolerance: f64 },

    #[error("kernel vector admits no finite step that keeps the weights nonnegative")]
    NoFeasibleDirection,

    #[error("insertion order is exhausted and the window of {window} indices cannot shrink further")]
    ExhaustedIndices { window: usize },

    #[error("index {0} is not in the active set")]
    InactiveIndex(usize),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("pruning cancelled after {iteration} iterations")]
    Cancelled {
        iteration: usize,
        indices: Vec<usize>,
    },

    #[error("pruning failed at iteration {iteration} with {} active indices", .indices.len())]
    PruningFailed {
        iteration: usize,
        indices: Vec<usize>,
        #[source]
        source: Box<PruningError>,
    },

    #[error("singular value {index} is {value:e}; the system is rank deficient")]
    RankDeficient { index: usize, value: f64 },

    #[error("dense decomposition failed: {0}")]
    Decomposition(String),

    #[error(transparent)]
    Linalg(#[from] QrError),
}

impl PruningError {
    /// Innermost error, looking through `PruningFailed`
    pub fn root_cause(&self) -> &PruningError {
        match self {
            PruningError::PruningFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, PruningError>;
