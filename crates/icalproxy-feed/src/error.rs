//! Feed retrieval failures.
//!
//! Every failure carries a [`FeedErrorCode`] so callers can tell a dead feed
//! (`not_found`) from a flaky upstream (`server_error`, `network_error`) without
//! matching on message text.

use std::fmt;
use std::io;

use thiserror::Error;

/// Why a fetch failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedErrorCode {
    /// Connection failed, timed out or the body could not be read.
    NetworkError,
    /// Upstream answered 5xx.
    ServerError,
    /// Upstream answered 429.
    RateLimited,
    /// Upstream answered 401 or 403.
    AuthorizationFailed,
    /// The feed does not exist (404, 410, or a missing local file).
    NotFound,
    /// The feed answered with something that is not a calendar body.
    InvalidResponse,
    /// The URL is malformed or uses an unsupported scheme.
    ConfigurationError,
}

impl FeedErrorCode {
    /// Classifies a non-success HTTP status.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::AuthorizationFailed,
            404 | 410 => Self::NotFound,
            429 => Self::RateLimited,
            500..=599 => Self::ServerError,
            _ => Self::InvalidResponse,
        }
    }

    /// Classifies a local read failure.
    pub fn from_io(kind: io::ErrorKind) -> Self {
        match kind {
            io::ErrorKind::NotFound => Self::NotFound,
            io::ErrorKind::InvalidData => Self::InvalidResponse,
            _ => Self::NetworkError,
        }
    }

    /// Transient failures; a later sync may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkError | Self::RateLimited | Self::ServerError
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NetworkError => "network_error",
            Self::ServerError => "server_error",
            Self::RateLimited => "rate_limited",
            Self::AuthorizationFailed => "authorization_failed",
            Self::NotFound => "not_found",
            Self::InvalidResponse => "invalid_response",
            Self::ConfigurationError => "configuration_error",
        }
    }
}

impl fmt::Display for FeedErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed feed fetch. Rendered as `[url] code: message`.
#[derive(Debug, Error)]
#[error("{}{code}: {message}", .url.as_deref().map(|u| format!("[{}] ", u)).unwrap_or_default())]
pub struct FeedError {
    code: FeedErrorCode,
    message: String,
    url: Option<String>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl FeedError {
    pub fn new(code: FeedErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            url: None,
            source: None,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(FeedErrorCode::NetworkError, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(FeedErrorCode::NotFound, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(FeedErrorCode::ConfigurationError, message)
    }

    /// Upstream refused the request with `status`.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::new(FeedErrorCode::from_status(status), message)
    }

    /// A local feed file could not be read.
    pub fn io(err: io::Error, message: impl Into<String>) -> Self {
        Self::new(FeedErrorCode::from_io(err.kind()), message).with_source(err)
    }

    /// Records which feed failed. An earlier URL is kept.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url.get_or_insert_with(|| url.into());
        self
    }

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn code(&self) -> FeedErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

pub type FeedResult<T> = Result<T, FeedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_map_to_codes() {
        let codes: Vec<_> = [401, 403, 404, 410, 429, 500, 503, 302, 418]
            .into_iter()
            .map(|status| FeedErrorCode::from_status(status).as_str())
            .collect();
        assert_eq!(
            codes,
            [
                "authorization_failed",
                "authorization_failed",
                "not_found",
                "not_found",
                "rate_limited",
                "server_error",
                "server_error",
                "invalid_response",
                "invalid_response",
            ]
        );
        assert!(FeedErrorCode::from_status(502).is_retryable());
        assert!(!FeedErrorCode::from_status(404).is_retryable());
    }

    #[test]
    fn local_reads_keep_the_io_error() {
        use std::error::Error;
        let err = FeedError::io(io::Error::from(io::ErrorKind::NotFound), "cannot read feed.ics");
        assert_eq!(err.code(), FeedErrorCode::NotFound);
        assert!(err.source().is_some());

        let err = FeedError::io(io::Error::other("reset"), "cannot read feed.ics");
        assert!(err.is_retryable());
    }

    #[test]
    fn display_prefixes_the_first_url() {
        let err = FeedError::not_found("feed not found")
            .with_url("https://example.com/a.ics")
            .with_url("https://example.com/b.ics");
        assert_eq!(
            err.to_string(),
            "[https://example.com/a.ics] not_found: feed not found"
        );
        assert_eq!(
            FeedError::configuration("bad scheme").to_string(),
            "configuration_error: bad scheme"
        );
    }
}
