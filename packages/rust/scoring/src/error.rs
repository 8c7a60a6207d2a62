//! Errors raised by score adapters.

use pressroom_shared::PipelineError;

/// Failure of one batch scoring call. The engine falls back for that source.
#[derive(Debug, thiserror::Error)]
pub enum ScoringError {
    #[error("scoring request timed out after {0}s")]
    Timeout(u64),

    #[error("scoring request failed: {0}")]
    Request(String),

    #[error("scorer returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("unusable scorer response: {0}")]
    InvalidResponse(String),

    /// The response did not score every item in the batch.
    #[error("scorer returned {got} scores for {expected} items")]
    Incomplete { expected: usize, got: usize },
}

impl From<ScoringError> for PipelineError {
    fn from(err: ScoringError) -> Self {
        PipelineError::Scoring(err.to_string())
    }
}
