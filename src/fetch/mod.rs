//! Remote list fetching.
//!
//! Provides interfaces and implementations for downloading web lists.

mod http;

pub use http::{HttpFetcher, DEFAULT_FETCH_TIMEOUT};

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{FetchErrorKind, FilterError, Result};

#[cfg(feature = "async")]
use async_trait::async_trait;

/// Fetch interface.
pub trait Fetcher: Send + Sync {
    /// Download `url` and return the body as text.
    ///
    /// Any non-success response is an error.
    fn fetch(&self, url: &str) -> Result<String>;
}

/// Async fetch interface.
#[cfg(feature = "async")]
#[async_trait]
pub trait AsyncFetcher: Send + Sync {
    /// Download `url` and return the body as text.
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// Fetcher that always fails, for offline use.
#[derive(Debug, Clone, Copy, Default)]
pub struct NilFetcher;

impl Fetcher for NilFetcher {
    fn fetch(&self, url: &str) -> Result<String> {
        Err(FilterError::fetch(FetchErrorKind::Network, url, "fetching disabled"))
    }
}

#[cfg(feature = "async")]
#[async_trait]
impl AsyncFetcher for NilFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        Fetcher::fetch(self, url)
    }
}

/// Fetcher serving canned bodies, counting how often it is called.
///
/// URLs without a canned body fail with a `Status` error.
#[derive(Debug, Default)]
pub struct StaticFetcher {
    bodies: HashMap<String, String>,
    calls: AtomicUsize,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` for `url`.
    pub fn with_body(mut self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.bodies.insert(url.into(), body.into());
        self
    }

    /// Number of fetch calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Fetcher for StaticFetcher {
    fn fetch(&self, url: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.bodies
            .get(url)
            .cloned()
            .ok_or_else(|| FilterError::fetch(FetchErrorKind::Status, url, "HTTP 404"))
    }
}

#[cfg(feature = "async")]
#[async_trait]
impl AsyncFetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        Fetcher::fetch(self, url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nil_fetcher_fails() {
        let err = Fetcher::fetch(&NilFetcher, "https://a.test/").unwrap_err();
        assert_eq!(err.fetch_kind(), Some(FetchErrorKind::Network));
    }

    #[test]
    fn test_static_fetcher() {
        let fetcher = StaticFetcher::new().with_body("https://a.test/", "a.com");
        assert_eq!(Fetcher::fetch(&fetcher, "https://a.test/").unwrap(), "a.com");
        let err = Fetcher::fetch(&fetcher, "https://b.test/").unwrap_err();
        assert_eq!(err.fetch_kind(), Some(FetchErrorKind::Status));
        assert_eq!(fetcher.calls(), 2);
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn test_static_fetcher_async() {
        let fetcher = StaticFetcher::new().with_body("https://a.test/", "a.com");
        assert_eq!(AsyncFetcher::fetch(&fetcher, "https://a.test/").await.unwrap(), "a.com");
        assert_eq!(fetcher.calls(), 1);
    }
}
