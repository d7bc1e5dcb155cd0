//! Feed fetch settings.

use std::time::Duration;

/// Settings shared by every fetch made through a [`crate::FeedClient`].
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Upper bound for connecting and downloading one feed.
    pub timeout: Duration,
    /// Sent as `User-Agent`; some calendar hosts reject empty agents.
    pub user_agent: String,
    /// Off only for feeds served with self-signed certificates.
    pub verify_tls: bool,
}

impl FetchConfig {
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            user_agent: format!("icalproxy/{}", env!("CARGO_PKG_VERSION")),
            verify_tls: true,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the timeout in whole seconds; zero keeps the default.
    pub fn with_timeout_secs(self, secs: u64) -> Self {
        if secs == 0 {
            return self;
        }
        self.with_timeout(Duration::from_secs(secs))
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Disables TLS verification (for self-signed test servers only).
    pub fn with_insecure_tls(mut self) -> Self {
        self.verify_tls = false;
        self
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = FetchConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.user_agent.starts_with("icalproxy/"));
        assert!(config.verify_tls);
    }

    #[test]
    fn builder() {
        let config = FetchConfig::new()
            .with_timeout_secs(5)
            .with_user_agent("test-agent")
            .with_insecure_tls();
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.user_agent, "test-agent");
        assert!(!config.verify_tls);

        assert_eq!(
            FetchConfig::new().with_timeout_secs(0).timeout,
            Duration::from_secs(FetchConfig::DEFAULT_TIMEOUT_SECS)
        );
    }
}
