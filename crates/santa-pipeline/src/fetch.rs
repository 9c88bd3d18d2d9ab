//! Segment download.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use reqwest::{Client, Response, Url};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::egress::{is_internal_host, UrlScope};

/// Redirect hops followed per download.
const MAX_REDIRECTS: usize = 5;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {0}")]
    Status(u16),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid URL '{0}'")]
    InvalidUrl(String),

    #[error("refusing to fetch internal address {0}")]
    Blocked(String),

    #[error("more than {0} redirects")]
    TooManyRedirects(usize),

    #[error("empty body")]
    Empty,

    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Downloads one segment to a local file.
#[async_trait]
pub trait SegmentFetcher: Send + Sync {
    /// Write the body at `url` to `dest`, returning the byte count.
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64, FetchError>;
}

/// [`SegmentFetcher`] over HTTP(S), streaming the body to disk.
///
/// Redirects are followed by hand so every hop is checked against internal
/// addresses and the API key is only attached to hops inside its scope.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    /// Origin and path prefix that needs the generator API key, and the key
    api_key_for: Option<(UrlScope, String)>,
    allow_loopback: bool,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(Policy::none())
            .build()?;
        Ok(Self {
            client,
            api_key_for: None,
            allow_loopback: false,
        })
    }

    /// Send `x-goog-api-key` for URLs under `prefix` (same scheme, host and
    /// port). Generated scene videos are served from the generator API and are
    /// not public.
    pub fn with_api_key_for(
        mut self,
        prefix: &str,
        api_key: impl Into<String>,
    ) -> Result<Self, FetchError> {
        let scope = UrlScope::parse(prefix).map_err(|_| FetchError::InvalidUrl(prefix.to_string()))?;
        self.api_key_for = Some((scope, api_key.into()));
        Ok(self)
    }

    /// Permit loopback targets. Local development and tests only.
    pub fn allow_loopback(mut self) -> Self {
        self.allow_loopback = true;
        self
    }

    fn check_target(&self, url: &Url) -> Result<(), FetchError> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl(url.to_string()));
        }
        let loopback = match url.host() {
            Some(url::Host::Ipv4(ip)) => ip.is_loopback(),
            Some(url::Host::Ipv6(ip)) => ip.is_loopback(),
            _ => false,
        };
        if is_internal_host(url) && !(self.allow_loopback && loopback) {
            warn!(url = %url, "Blocked segment fetch to internal address");
            return Err(FetchError::Blocked(url.to_string()));
        }
        Ok(())
    }

    /// GET `url`, following up to [`MAX_REDIRECTS`] checked hops.
    async fn get(&self, url: &str) -> Result<Response, FetchError> {
        let mut current = Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;

        for _ in 0..=MAX_REDIRECTS {
            self.check_target(&current)?;

            let mut request = self.client.get(current.clone());
            if let Some((scope, key)) = &self.api_key_for {
                if scope.covers(&current) {
                    request = request.header("x-goog-api-key", key);
                }
            }

            let response = request.send().await?;
            let status = response.status();
            if !status.is_redirection() {
                return Ok(response);
            }

            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .ok_or(FetchError::Status(status.as_u16()))?;
            current = current
                .join(location)
                .map_err(|_| FetchError::InvalidUrl(location.to_string()))?;
        }

        Err(FetchError::TooManyRedirects(MAX_REDIRECTS))
    }
}

#[async_trait]
impl SegmentFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        let response = self.get(url).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        if written == 0 {
            return Err(FetchError::Empty);
        }
        Ok(written)
    }
}
