//! Error types for schemacat.
//!
//! Library crates use [`SchemacatError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all schemacat operations.
#[derive(Debug, thiserror::Error)]
pub enum SchemacatError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Encoding detection or transcoding error.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A persisted store exists but cannot be read back.
    #[error("corrupt store at {path:?}: {message}")]
    Corrupt { path: PathBuf, message: String },

    /// JSON serialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Version-control collaborator failure.
    #[error("vcs error: {0}")]
    Vcs(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SchemacatError>;

impl SchemacatError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
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

    /// Mark the store at `path` as unreadable.
    pub fn corrupt(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.into(),
            message: msg.into(),
        }
    }
}
