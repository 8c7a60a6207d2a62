//! Errors raised by fetch adapters and the HTTP layer.

use pressroom_shared::PipelineError;

/// Failure of a single fetch. Always non-fatal to a run.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request to {url} timed out after {secs}s")]
    Timeout { url: String, secs: u64 },

    #[error("request to {url} failed: {message}")]
    Network { url: String, message: String },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("could not parse response from {url}: {message}")]
    Parse { url: String, message: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl From<FetchError> for PipelineError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Timeout { .. } => PipelineError::Timeout(err.to_string()),
            FetchError::Parse { .. } => PipelineError::parse(err.to_string()),
            _ => PipelineError::Network(err.to_string()),
        }
    }
}
