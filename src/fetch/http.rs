use std::time::Duration;

use url::Url;

use super::Fetcher;
use crate::error::{FetchErrorKind, FilterError, Result};

#[cfg(feature = "async")]
use super::AsyncFetcher;
#[cfg(feature = "async")]
use async_trait::async_trait;

/// Default HTTP request timeout.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP(S) fetcher backed by `ureq`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    agent: ureq::Agent,
    timeout: Duration,
}

impl HttpFetcher {
    /// Create a fetcher with the default timeout.
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_FETCH_TIMEOUT)
    }

    /// Create a fetcher whose requests give up after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        Self { agent, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

fn classify(url: &str, err: ureq::Error) -> FilterError {
    match err {
        ureq::Error::StatusCode(code) => {
            FilterError::fetch(FetchErrorKind::Status, url, format!("HTTP {}", code))
        }
        ureq::Error::Timeout(t) => {
            FilterError::fetch(FetchErrorKind::Timeout, url, format!("timed out: {}", t))
        }
        other => FilterError::fetch(FetchErrorKind::Network, url, other.to_string()),
    }
}

/// Only absolute http(s) URLs are fetched.
fn check_url(url: &str) -> Result<()> {
    match Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
        Ok(parsed) => Err(FilterError::InvalidUrl(format!(
            "{}: unsupported scheme '{}'",
            url,
            parsed.scheme()
        ))),
        Err(e) => Err(FilterError::InvalidUrl(format!("{}: {}", url, e))),
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<String> {
        check_url(url)?;
        tracing::debug!(url, "fetching web list");

        let mut response = self.agent.get(url).call().map_err(|e| classify(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FilterError::fetch(
                FetchErrorKind::Status,
                url,
                format!("HTTP {}", status),
            ));
        }

        let text = response.body_mut().read_to_string().map_err(|e| {
            FilterError::fetch(
                FetchErrorKind::Body,
                url,
                format!("failed to read response body: {}", e),
            )
        })?;

        tracing::debug!(url, bytes = text.len(), "fetched web list");
        Ok(text)
    }
}

#[cfg(feature = "async")]
#[async_trait]
impl AsyncFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let fetcher = self.clone();
        let owned = url.to_string();
        tokio::task::spawn_blocking(move || Fetcher::fetch(&fetcher, &owned))
            .await
            .map_err(|e| FilterError::fetch(FetchErrorKind::Network, url, e.to_string()))?
    }
}
