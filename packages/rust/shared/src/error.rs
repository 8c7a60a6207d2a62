//! Error types for Pressroom.
//!
//! Library crates use [`PipelineError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all Pressroom operations.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Configuration loading or parsing error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Malformed or incomplete workflow configuration. Fatal to the call.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A named adapter could not be resolved or constructed at run time.
    #[error("adapter '{adapter}' could not be loaded: {message}")]
    AdapterLoad { adapter: String, message: String },

    /// Network/HTTP error during a fetch.
    #[error("network error: {0}")]
    Network(String),

    /// A fetch or scoring call exceeded its timeout.
    #[error("timed out: {0}")]
    Timeout(String),

    /// Response body could not be parsed into records.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// The score adapter failed for a batch.
    #[error("scoring error: {0}")]
    Scoring(String),

    /// An item with the same identity already exists in a collection.
    #[error("duplicate in {collection}: '{title}' ({link})")]
    Constraint {
        collection: String,
        title: String,
        link: String,
    },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create an adapter-load error for the named adapter.
    pub fn adapter_load(adapter: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::AdapterLoad {
            adapter: adapter.into(),
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error is a uniqueness-constraint rejection (a skip, not a failure).
    pub fn is_constraint(&self) -> bool {
        matches!(self, Self::Constraint { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = PipelineError::validation("sources must not be empty");
        assert_eq!(err.to_string(), "validation error: sources must not be empty");

        let err = PipelineError::adapter_load("openrouter", "API key missing");
        assert!(err.to_string().contains("'openrouter'"));
    }

    #[test]
    fn constraint_is_detected() {
        let err = PipelineError::Constraint {
            collection: "candidates".into(),
            title: "A".into(),
            link: "https://a.example".into(),
        };
        assert!(err.is_constraint());
        assert!(!PipelineError::Storage("boom".into()).is_constraint());
    }
}
