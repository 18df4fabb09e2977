//! Error taxonomy for the sampling engine.

use thiserror::Error;

use tensorfact_core::BlockError;

use crate::checkpoint::CheckpointError;

/// Errors surfaced by training and prediction sessions.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Invalid or inconsistent session configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Data blocks or side info disagree with the declared shape.
    #[error(transparent)]
    Block(#[from] BlockError),

    /// A linear-algebra step failed, typically a Cholesky factorization of
    /// a precision matrix that is not positive definite.
    #[error("numerical failure during {context}: {detail}")]
    Numerical { context: String, detail: String },

    /// Cooperative cancellation was requested between steps.
    #[error("session cancelled after {iter} completed iterations")]
    Cancelled { iter: usize },

    /// Checkpoint persistence or recovery failed.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

impl EngineError {
    pub(crate) fn numerical(context: &str, detail: impl ToString) -> Self {
        EngineError::Numerical {
            context: context.to_string(),
            detail: detail.to_string(),
        }
    }
}
