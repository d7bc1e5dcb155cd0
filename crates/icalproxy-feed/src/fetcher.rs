//! Feed retrieval.
//!
//! [`FeedClient`] understands `http://`, `https://`, `webcal://` (fetched over
//! HTTPS) and `file://` URLs; a bare filesystem path is read as a local file.

use std::collections::HashMap;
use std::path::Path;

use icalproxy_core::BoxFuture;
use tracing::{debug, trace};
use url::Url;

use crate::config::FetchConfig;
use crate::error::{FeedError, FeedResult};

/// Something that turns a feed URL into raw calendar text.
pub trait FeedFetcher: Send + Sync {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, FeedResult<String>>;
}

/// The production fetcher.
pub struct FeedClient {
    #[cfg(feature = "http")]
    client: reqwest::Client,
    config: FetchConfig,
}

impl FeedClient {
    pub fn new(config: FetchConfig) -> FeedResult<Self> {
        #[cfg(feature = "http")]
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(!config.verify_tls)
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| FeedError::network(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            #[cfg(feature = "http")]
            client,
            config,
        })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    async fn fetch_url(&self, raw: &str) -> FeedResult<String> {
        let url = match Url::parse(raw) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                return read_local(Path::new(raw)).await;
            }
            Err(e) => {
                return Err(FeedError::configuration(format!("invalid feed URL: {}", e)));
            }
        };

        match url.scheme() {
            "http" | "https" => self.get(url.as_str()).await,
            "webcal" | "webcals" => self.get(&webcal_to_https(&url)).await,
            "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| FeedError::configuration("file URL has no local path"))?;
                read_local(&path).await
            }
            other => Err(FeedError::configuration(format!(
                "unsupported feed scheme `{}`",
                other
            ))),
        }
    }

    #[cfg(feature = "http")]
    async fn get(&self, url: &str) -> FeedResult<String> {
        debug!(url = %url, "fetching feed");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FeedError::network(format!("request failed: {}", e)))?;
        handle_response(response).await
    }

    #[cfg(not(feature = "http"))]
    async fn get(&self, _url: &str) -> FeedResult<String> {
        Err(FeedError::configuration(
            "built without HTTP support; only local feeds can be read",
        ))
    }
}

impl FeedFetcher for FeedClient {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, FeedResult<String>> {
        Box::pin(async move { self.fetch_url(url).await.map_err(|e| e.with_url(url)) })
    }
}

/// `webcal://host/path` is fetched as `https://host/path`.
fn webcal_to_https(url: &Url) -> String {
    format!("https{}", &url.as_str()[url.scheme().len()..])
}

#[cfg(feature = "http")]
async fn handle_response(response: reqwest::Response) -> FeedResult<String> {
    let status = response.status();
    trace!(status = %status, "received response");

    if !status.is_success() {
        return Err(FeedError::status(
            status.as_u16(),
            format!("feed answered {}", status),
        ));
    }
    response
        .text()
        .await
        .map_err(|e| FeedError::network(format!("failed to read response: {}", e)))
}

async fn read_local(path: &Path) -> FeedResult<String> {
    trace!(path = %path.display(), "reading local feed");
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| FeedError::io(e, format!("cannot read {}", path.display())))
}

/// Serves canned bodies keyed by URL. Unknown URLs fail with `not_found`.
#[derive(Debug, Clone, Default)]
pub struct StaticFetcher {
    bodies: HashMap<String, String>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_feed(mut self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.bodies.insert(url.into(), body.into());
        self
    }
}

impl FeedFetcher for StaticFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, FeedResult<String>> {
        let result = self
            .bodies
            .get(url)
            .cloned()
            .ok_or_else(|| FeedError::not_found("no such feed").with_url(url));
        Box::pin(async move { result })
    }
}
