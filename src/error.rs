//! Error types shared by every comparison routine and the distance engine.

use thiserror::Error;

/// Errors raised by `single-perturbation`.
///
/// Precondition errors are returned before any computation starts. Numerical
/// degeneracies (constant vectors, zero-variance features) are not errors; they
/// surface as `NaN` or infinite values in the returned statistics.
#[derive(Debug, Error)]
pub enum PerturbationError {
    /// Two inputs that must share a dimension do not.
    #[error("Shape mismatch in {context}: expected {expected}, actual {actual}")]
    ShapeMismatch {
        /// Which argument or operation detected the mismatch
        context: String,
        /// Expected size
        expected: usize,
        /// Size actually provided
        actual: usize,
    },

    /// The metric name is not present in the registry.
    #[error("Unknown metric '{0}'")]
    UnknownMetric(String),

    /// The comparison mode string is not recognised.
    #[error("Unknown mode '{0}'. Please choose simple or scaled.")]
    UnknownMode(String),

    /// Invalid combination of configuration values.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Input data violates a precondition of the routine.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Failure raised by a user-supplied classifier.
    #[error(transparent)]
    Classifier(#[from] anyhow::Error),
}

impl PerturbationError {
    pub(crate) fn shape(context: impl Into<String>, expected: usize, actual: usize) -> Self {
        PerturbationError::ShapeMismatch {
            context: context.into(),
            expected,
            actual,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PerturbationError>;
