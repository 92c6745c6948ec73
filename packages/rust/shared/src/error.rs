//! Error types for bookbinder.
//!
//! Library crates use [`BookbinderError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

use crate::types::Format;

/// Top-level error type for all bookbinder operations.
#[derive(Debug, thiserror::Error)]
pub enum BookbinderError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An external tool exited with a nonzero status.
    #[error("external tool failed with exit code {exit_code}: {command}")]
    ExternalTool {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    /// A format was requested whose input artifact does not exist.
    #[error("cannot build {format}: {message}")]
    MissingPrecondition { format: Format, message: String },

    /// The master template has no marker line.
    #[error("template {path:?} has no line containing marker '{marker}'")]
    TemplateMarkerMissing { path: PathBuf, marker: String },

    /// A format builder tried to skip or repeat a step.
    #[error("{format} build cannot move from {from} to {to}")]
    InvalidTransition {
        format: Format,
        from: String,
        to: String,
    },

    /// Data validation error (bad chapter id, malformed value, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, BookbinderError>;

impl BookbinderError {
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

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a missing-precondition error for `format`.
    pub fn precondition(format: Format, msg: impl Into<String>) -> Self {
        Self::MissingPrecondition {
            format,
            message: msg.into(),
        }
    }
}
