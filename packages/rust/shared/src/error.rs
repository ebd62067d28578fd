//! Error types for hubkit.
//!
//! Library crates use [`HubError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all hubkit operations.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// A content operation reported a failure.
    #[error("content operation failed: {message}")]
    Operation { message: String },

    /// A view was declared with no content operations.
    #[error("no content operations declared for view {view_uri}")]
    EmptyChain { view_uri: String },

    /// No registered feature handles the view URI.
    #[error("no feature registered for view {view_uri}")]
    UnknownView { view_uri: String },

    /// Malformed JSON content data.
    #[error("JSON error: {message}")]
    Json { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad identifier, invalid URI, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// The loader's orchestrator task is no longer running.
    #[error("view model loader is no longer running")]
    LoaderClosed,
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, HubError>;

impl HubError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create an operation failure from any displayable message.
    pub fn operation(msg: impl Into<String>) -> Self {
        Self::Operation {
            message: msg.into(),
        }
    }

    /// Create a JSON error from any displayable message.
    pub fn json(msg: impl Into<String>) -> Self {
        Self::Json {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
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

impl From<serde_json::Error> for HubError {
    fn from(err: serde_json::Error) -> Self {
        Self::json(err.to_string())
    }
}
