//! Service error types.

use std::io;
use thiserror::Error;

use icalproxy_core::{CodecError, ConfigError, ReconcileError, StorageError};
use icalproxy_feed::FeedError;

/// Result type for service operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors returned by the calendar service.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The proxy configuration file is unreadable or malformed.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// A calendar configuration failed to compile.
    #[error("Calendar `{calendar}` is misconfigured: {source}")]
    Calendar {
        calendar: String,
        #[source]
        source: ConfigError,
    },

    #[error("Unknown calendar: {calendar}")]
    NotFound { calendar: String },

    /// The operation would modify a calendar defined in the configuration file.
    #[error("Calendar `{calendar}` is defined in the configuration file and cannot be {action} here")]
    Conflict {
        calendar: String,
        action: &'static str,
    },

    /// The supplied calendar key does not match.
    #[error("Authentication incorrect for calendar `{calendar}`")]
    Forbidden { calendar: String },

    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ServerError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn calendar(calendar: impl Into<String>, source: ConfigError) -> Self {
        Self::Calendar {
            calendar: calendar.into(),
            source,
        }
    }

    pub fn not_found(calendar: impl Into<String>) -> Self {
        Self::NotFound {
            calendar: calendar.into(),
        }
    }

    pub fn conflict(calendar: impl Into<String>, action: &'static str) -> Self {
        Self::Conflict {
            calendar: calendar.into(),
            action,
        }
    }

    pub fn forbidden(calendar: impl Into<String>) -> Self {
        Self::Forbidden {
            calendar: calendar.into(),
        }
    }
}

impl From<ReconcileError> for ServerError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::Storage(e) => Self::Storage(e),
            ReconcileError::Codec(e) => Self::Codec(e),
        }
    }
}
