//! Error types for lineage operations.
//!
//! Library crates use [`LineageError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all lineage operations.
#[derive(Debug, thiserror::Error)]
pub enum LineageError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Database or storage layer error (read or write failure).
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad request, invalid format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Document JSON could not be parsed.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// A referenced document does not exist.
    #[error("document not found: {id}")]
    NotFound { id: String },

    /// The requested move would break the hierarchy (cycle, bad parent type, ...).
    #[error("invalid move: {message}")]
    InvalidMove { message: String },

    /// A document reached during traversal lacks the lineage field it must carry.
    #[error("unsupported document shape for {id}: {message}")]
    UnsupportedShape { id: String, message: String },

    /// Optimistic concurrency check failed on write.
    #[error("revision conflict on {id}")]
    Conflict { id: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LineageError>;

impl LineageError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create an invalid-move error from any displayable message.
    pub fn invalid_move(msg: impl Into<String>) -> Self {
        Self::InvalidMove {
            message: msg.into(),
        }
    }

    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    pub fn unsupported_shape(id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::UnsupportedShape {
            id: id.into(),
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = LineageError::config("missing store path");
        assert_eq!(err.to_string(), "config error: missing store path");

        let err = LineageError::not_found("district_9");
        assert_eq!(err.to_string(), "document not found: district_9");

        let err = LineageError::invalid_move("circular hierarchy");
        assert!(err.to_string().contains("circular hierarchy"));

        let err = LineageError::unsupported_shape("report_1", "missing contact");
        assert!(err.to_string().contains("report_1"));
        assert!(err.to_string().contains("missing contact"));
    }
}
