//! Evaluation error types
//!
//! Every variant maps onto an [`ErrorKind`] so failures can be counted per
//! kind without carrying the full error around.

use symloc_common::models::ErrorKind;
use thiserror::Error;

/// Result type for evaluation operations
pub type EvalResult<T> = std::result::Result<T, EvalError>;

#[derive(Error, Debug)]
pub enum EvalError {
    /// Ground truth entry lacks an organ name or has no locations
    #[error("Malformed annotation in {symptom_id} (unit {unit_index}): {reason}")]
    MalformedAnnotation {
        symptom_id: String,
        unit_index: usize,
        reason: String,
    },

    /// The model produced no payload at all
    #[error("Empty prediction: {0}")]
    EmptyPrediction(String),

    /// Retryable provider failure (timeout, rate limit, 5xx)
    #[error("Transient provider error: {0}")]
    TransientProvider(String),

    /// Non-retryable provider failure (auth, bad request, malformed schema)
    #[error("Permanent provider error: {0}")]
    PermanentProvider(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// Report file could not be read or parsed
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Every unit of the batch failed
    #[error("Batch failed: all {failed_units} units failed (dominant error: {dominant})")]
    BatchFailed {
        dominant: ErrorKind,
        failed_units: usize,
    },

    #[error(transparent)]
    Common(#[from] symloc_common::Error),
}

impl EvalError {
    /// Failure category for summaries; `None` for errors that are not unit outcomes
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            EvalError::MalformedAnnotation { .. } => Some(ErrorKind::MalformedAnnotation),
            EvalError::EmptyPrediction(_) => Some(ErrorKind::EmptyPrediction),
            EvalError::TransientProvider(_) => Some(ErrorKind::TransientProvider),
            EvalError::PermanentProvider(_) => Some(ErrorKind::PermanentProvider),
            EvalError::Retrieval(_) => Some(ErrorKind::Retrieval),
            EvalError::Dataset(_) => Some(ErrorKind::Dataset),
            EvalError::BatchFailed { .. } | EvalError::Common(_) => None,
        }
    }
}

impl From<crate::providers::ProviderError> for EvalError {
    fn from(err: crate::providers::ProviderError) -> Self {
        use crate::providers::ProviderError;
        match err {
            ProviderError::Transient(msg) => EvalError::TransientProvider(msg),
            ProviderError::Permanent(msg) => EvalError::PermanentProvider(msg),
        }
    }
}

impl From<crate::retrieval::RetrievalError> for EvalError {
    fn from(err: crate::retrieval::RetrievalError) -> Self {
        EvalError::Retrieval(err.to_string())
    }
}
