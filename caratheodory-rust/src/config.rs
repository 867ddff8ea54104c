//! Options for a pruning run

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Progress callback, called with `(iterations done, total iterations)`
pub type ProgressCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Norm used to report the moment error `‖η - V[S,:]ᵀ w[S]‖`
#[derive(Debug, Clone, Copy)]
pub enum ErrorNorm {
    /// 2-norm
    Euclidean,
    /// Largest absolute entry
    Max,
    /// Sum of absolute entries
    Sum,
    Custom(fn(&[f64]) -> f64),
}

impl ErrorNorm {
    pub fn apply(&self, residual: &[f64]) -> f64 {
        match self {
            ErrorNorm::Euclidean => qr_update::norm_2(residual),
            ErrorNorm::Max => qr_update::norm_inf(residual),
            ErrorNorm::Sum => qr_update::norm_1(residual),
            ErrorNorm::Custom(f) => f(residual),
        }
    }
}

impl Default for ErrorNorm {
    fn default() -> Self {
        ErrorNorm::Euclidean
    }
}

/// Configuration of [`caratheodory_pruning`](crate::caratheodory_pruning)
#[derive(Clone)]
pub struct PruningConfig {
    /// Re-solve `V[S,:]ᵀ v = η` for the surviving weights at the end
    pub correction: bool,
    /// Active weights below this value are clamped to zero after each step
    pub zero_tolerance: f64,
    /// Report the final moment error
    pub return_error: bool,
    /// Record the moment error after every iteration
    pub track_errors: bool,
    pub error_norm: ErrorNorm,
    pub progress: Option<ProgressCallback>,
    /// Checked at the start of every iteration
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for PruningConfig {
    fn default() -> Self {
        Self {
            correction: true,
            zero_tolerance: 1e-16,
            return_error: false,
            track_errors: false,
            error_norm: ErrorNorm::Euclidean,
            progress: None,
            cancel: None,
        }
    }
}

impl PruningConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_correction(mut self, correction: bool) -> Self {
        self.correction = correction;
        self
    }

    pub fn with_error(mut self, norm: ErrorNorm) -> Self {
        self.return_error = true;
        self.error_norm = norm;
        self
    }

    pub fn with_error_tracking(mut self) -> Self {
        self.track_errors = true;
        self
    }

    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(callback));
        self
    }

    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    pub(crate) fn report_progress(&self, done: usize, total: usize) {
        if let Some(callback) = &self.progress {
            callback(done, total);
        }
    }
}

impl fmt::Debug for PruningConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PruningConfig")
            .field("correction", &self.correction)
            .field("zero_tolerance", &self.zero_tolerance)
            .field("return_error", &self.return_error)
            .field("track_errors", &self.track_errors)
            .field("error_norm", &self.error_norm)
            .field("progress", &self.progress.is_some())
            .field("cancel", &self.cancel.is_some())
            .finish()
    }
}
