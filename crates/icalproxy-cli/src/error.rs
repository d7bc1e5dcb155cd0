//! CLI error types.

use std::io;
use std::path::PathBuf;

use icalproxy_core::{StorageError, TracingError};
use icalproxy_server::ServerError;
use thiserror::Error;

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

/// Errors that can occur in the CLI.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Server(#[from] ServerError),

    #[error("invalid storage setting: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// An input file could not be read as a calendar configuration.
    #[error("failed to read {}: {message}", path.display())]
    Input { path: PathBuf, message: String },

    #[error("failed to sync {failed} of {total} calendars")]
    SyncFailed { failed: usize, total: usize },

    #[error("failed to write JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Tracing(#[from] TracingError),
}

impl CliError {
    pub fn input(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Input {
            path: path.into(),
            message: message.into(),
        }
    }
}
