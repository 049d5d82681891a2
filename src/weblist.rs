//! Web list loading with a persistent cache.
//!
//! A web list is fetched at most once per cache duration. When a fetch fails
//! the last cached copy is used instead, however old it is.

use std::sync::Arc;

use crate::cache::{cache_key, WebListCache, WebListCacheEntry};
use crate::clock::Clock;
use crate::error::Result;
use crate::fetch::Fetcher;
use crate::parser::urls_text_to_lines;

#[cfg(feature = "async")]
use crate::error::{FetchErrorKind, FilterError};
#[cfg(feature = "async")]
use crate::fetch::AsyncFetcher;
#[cfg(feature = "async")]
use std::time::Duration;

/// How a web list may be obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WebListRequest {
    /// A cached copy younger than this is used without fetching; `0` always
    /// fetches
    pub cache_duration_ms: u64,
    /// Never fetch, only read the cache
    pub cache_only: bool,
    /// Do not store a fetched copy
    pub do_not_cache: bool,
}

impl WebListRequest {
    pub fn new(cache_duration_ms: u64) -> Self {
        Self {
            cache_duration_ms,
            ..Self::default()
        }
    }

    pub fn cache_only(mut self) -> Self {
        self.cache_only = true;
        self
    }

    pub fn do_not_cache(mut self) -> Self {
        self.do_not_cache = true;
        self
    }
}

/// Freshness of a cached web list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WebListState {
    /// Fetch time of the cached copy, if there is one
    pub time: Option<u64>,
    pub up_to_date: bool,
}

/// Outcome of [`WebListLoader::update_next`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WebListUpdate {
    /// The source refreshed in this round
    pub updated: Option<String>,
    /// Outdated sources left for later rounds
    pub pending: Vec<String>,
}

impl WebListUpdate {
    /// True once every outdated source has been refreshed, meaning a filter
    /// built from the cache would now see all new lists.
    pub fn needs_reload(&self) -> bool {
        self.updated.is_some() && self.pending.is_empty()
    }
}

/// Decision taken before any network access.
enum Plan {
    /// Serve this text without fetching
    Serve(Option<String>),
    /// Fetch, falling back to the stale copy
    Fetch(Option<WebListCacheEntry>),
}

/// Loads web lists through a cache.
pub struct WebListLoader {
    cache: Arc<dyn WebListCache>,
    fetcher: Arc<dyn Fetcher>,
    #[cfg(feature = "async")]
    async_fetcher: Arc<dyn AsyncFetcher>,
    clock: Arc<dyn Clock>,
}

impl WebListLoader {
    #[cfg(not(feature = "async"))]
    pub fn new(cache: Arc<dyn WebListCache>, fetcher: Arc<dyn Fetcher>, clock: Arc<dyn Clock>) -> Self {
        Self {
            cache,
            fetcher,
            clock,
        }
    }

    #[cfg(feature = "async")]
    pub fn new(
        cache: Arc<dyn WebListCache>,
        fetcher: Arc<dyn Fetcher>,
        async_fetcher: Arc<dyn AsyncFetcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cache,
            fetcher,
            async_fetcher,
            clock,
        }
    }

    /// Read the cached copy of `url`. Cache failures count as a miss.
    pub fn cached(&self, url: &str) -> Option<WebListCacheEntry> {
        match self.cache.get(&cache_key(url)) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(url, error = %e, "failed to read web list cache");
                None
            }
        }
    }

    fn is_fresh(&self, entry: &WebListCacheEntry, now: u64, duration_ms: u64) -> bool {
        now.saturating_sub(entry.fetched_at_millis) < duration_ms
    }

    /// Report whether the cached copy of `url` is younger than `duration_ms`.
    pub fn state(&self, url: &str, duration_ms: u64) -> WebListState {
        let now = self.clock.now_millis();
        match self.cached(url) {
            Some(entry) => WebListState {
                time: Some(entry.fetched_at_millis),
                up_to_date: self.is_fresh(&entry, now, duration_ms),
            },
            None => WebListState {
                time: None,
                up_to_date: false,
            },
        }
    }

    fn plan(&self, url: &str, request: &WebListRequest, now: u64) -> Plan {
        let cached = self.cached(url);
        if let Some(entry) = &cached {
            if request.cache_only || self.is_fresh(entry, now, request.cache_duration_ms) {
                tracing::debug!(url, fetched_at = entry.fetched_at_millis, "using cached web list");
                return Plan::Serve(Some(entry.rule_text.clone()));
            }
        }
        if request.cache_only {
            return Plan::Serve(None);
        }
        Plan::Fetch(cached)
    }

    fn store(&self, url: &str, now: u64, text: &str) {
        let entry = WebListCacheEntry::new(url, now, text);
        if let Err(e) = self.cache.set(&cache_key(url), entry) {
            tracing::warn!(url, error = %e, "failed to cache web list");
        }
    }

    fn settle(
        &self,
        url: &str,
        request: &WebListRequest,
        now: u64,
        stale: Option<WebListCacheEntry>,
        fetched: Result<String>,
    ) -> Option<String> {
        match fetched {
            Ok(text) => {
                if !request.do_not_cache {
                    self.store(url, now, &text);
                }
                Some(text)
            }
            Err(e) => {
                tracing::warn!(url, error = %e, has_cache = stale.is_some(), "unable to get web list");
                stale.map(|entry| entry.rule_text)
            }
        }
    }

    /// Get the rule text of `url`, from the cache when fresh and from the
    /// network otherwise.
    ///
    /// Returns `None` only when there is neither a usable fetch nor a cached
    /// copy.
    pub fn get(&self, url: &str, request: &WebListRequest) -> Option<String> {
        let now = self.clock.now_millis();
        match self.plan(url, request, now) {
            Plan::Serve(text) => text,
            Plan::Fetch(stale) => {
                let fetched = self.fetcher.fetch(url);
                self.settle(url, request, now, stale, fetched)
            }
        }
    }

    /// Async variant of [`get`](Self::get). A fetch taking longer than
    /// `timeout` counts as failed.
    #[cfg(feature = "async")]
    pub async fn get_async(&self, url: &str, request: &WebListRequest, timeout: Duration) -> Option<String> {
        let now = self.clock.now_millis();
        match self.plan(url, request, now) {
            Plan::Serve(text) => text,
            Plan::Fetch(stale) => {
                let fetched = match tokio::time::timeout(timeout, self.async_fetcher.fetch(url)).await {
                    Ok(result) => result,
                    Err(_) => Err(FilterError::fetch(
                        FetchErrorKind::Timeout,
                        url,
                        format!("no response within {:?}", timeout),
                    )),
                };
                self.settle(url, request, now, stale, fetched)
            }
        }
    }

    /// Fetch `url` unconditionally and cache it. Errors are returned.
    pub fn fetch(&self, url: &str) -> Result<String> {
        let now = self.clock.now_millis();
        let text = self.fetcher.fetch(url)?;
        self.cache
            .set(&cache_key(url), WebListCacheEntry::new(url, now, text.as_str()))?;
        Ok(text)
    }

    /// Refresh one outdated source from `urls_text`, oldest cache first.
    ///
    /// Sources that fail are skipped in favour of the next outdated one.
    pub fn update_next(&self, urls_text: &str, duration_ms: u64) -> WebListUpdate {
        let mut outdated: Vec<(u64, String)> = urls_text_to_lines(urls_text)
            .into_iter()
            .filter_map(|url| {
                let state = self.state(&url, duration_ms);
                (!state.up_to_date).then(|| (state.time.unwrap_or(0), url))
            })
            .collect();
        outdated.sort_by_key(|(time, _)| *time);

        let mut pending = outdated.into_iter().map(|(_, url)| url);
        let mut updated = None;
        for url in pending.by_ref() {
            match self.fetch(&url) {
                Ok(_) => {
                    tracing::debug!(url = %url, "refreshed web list");
                    updated = Some(url);
                    break;
                }
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "failed to refresh web list");
                }
            }
        }
        WebListUpdate {
            updated,
            pending: pending.collect(),
        }
    }

    /// Drop cache entries of sources listed in `old_urls_text` but not in
    /// `new_urls_text`. Returns the URLs whose entries were removed.
    pub fn clear_stale(&self, old_urls_text: &str, new_urls_text: &str) -> Result<Vec<String>> {
        let keep: std::collections::HashSet<String> =
            urls_text_to_lines(new_urls_text).into_iter().collect();
        let removed: Vec<String> = urls_text_to_lines(old_urls_text)
            .into_iter()
            .filter(|url| !keep.contains(url))
            .collect();
        if removed.is_empty() {
            return Ok(removed);
        }
        let keys: Vec<String> = removed.iter().map(|url| cache_key(url)).collect();
        self.cache.remove(&keys)?;
        tracing::debug!(count = removed.len(), "removed stale web list cache entries");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryWebListCache;
    use crate::clock::ManualClock;
    use crate::fetch::StaticFetcher;
    #[cfg(feature = "async")]
    use crate::fetch::NilFetcher;

    const URL: &str = "https://lists.test/farms.txt";

    struct Harness {
        cache: Arc<MemoryWebListCache>,
        fetcher: Arc<StaticFetcher>,
        clock: Arc<ManualClock>,
        loader: WebListLoader,
    }

    fn harness(fetcher: StaticFetcher) -> Harness {
        let cache = Arc::new(MemoryWebListCache::new());
        let fetcher = Arc::new(fetcher);
        let clock = Arc::new(ManualClock::new(1_000_000));
        #[cfg(feature = "async")]
        let loader = WebListLoader::new(cache.clone(), fetcher.clone(), fetcher.clone(), clock.clone());
        #[cfg(not(feature = "async"))]
        let loader = WebListLoader::new(cache.clone(), fetcher.clone(), clock.clone());
        Harness {
            cache,
            fetcher,
            clock,
            loader,
        }
    }

    #[test]
    fn test_fresh_cache_skips_fetch() {
        let h = harness(StaticFetcher::new().with_body(URL, "new.com"));
        h.cache
            .set(&cache_key(URL), WebListCacheEntry::new(URL, 1_000_000, "old.com"))
            .unwrap();

        h.clock.advance(5000);
        assert_eq!(h.loader.get(URL, &WebListRequest::new(10000)).as_deref(), Some("old.com"));
        assert_eq!(h.fetcher.calls(), 0);

        h.clock.advance(15000);
        assert_eq!(h.loader.get(URL, &WebListRequest::new(10000)).as_deref(), Some("new.com"));
        assert_eq!(h.fetcher.calls(), 1);
        assert_eq!(h.cache.get(&cache_key(URL)).unwrap().unwrap().fetched_at_millis, 1_020_000);
    }

    #[test]
    fn test_zero_duration_always_fetches() {
        let h = harness(StaticFetcher::new().with_body(URL, "a.com"));
        h.loader.get(URL, &WebListRequest::new(0));
        h.loader.get(URL, &WebListRequest::new(0));
        assert_eq!(h.fetcher.calls(), 2);
    }

    #[test]
    fn test_fetch_failure_falls_back_to_cache() {
        let h = harness(StaticFetcher::new());
        h.cache
            .set(&cache_key(URL), WebListCacheEntry::new(URL, 0, "stale.com"))
            .unwrap();
        assert_eq!(h.loader.get(URL, &WebListRequest::new(10)).as_deref(), Some("stale.com"));
        assert_eq!(h.fetcher.calls(), 1);
        // the stale entry is not rewritten
        assert_eq!(h.cache.get(&cache_key(URL)).unwrap().unwrap().fetched_at_millis, 0);
    }

    #[test]
    fn test_fetch_failure_without_cache() {
        let h = harness(StaticFetcher::new());
        assert_eq!(h.loader.get(URL, &WebListRequest::new(10)), None);
    }

    #[test]
    fn test_cache_only() {
        let h = harness(StaticFetcher::new().with_body(URL, "a.com"));
        assert_eq!(h.loader.get(URL, &WebListRequest::new(0).cache_only()), None);
        h.cache
            .set(&cache_key(URL), WebListCacheEntry::new(URL, 0, "old.com"))
            .unwrap();
        assert_eq!(
            h.loader.get(URL, &WebListRequest::new(0).cache_only()).as_deref(),
            Some("old.com")
        );
        assert_eq!(h.fetcher.calls(), 0);
    }

    #[test]
    fn test_do_not_cache() {
        let h = harness(StaticFetcher::new().with_body(URL, "a.com"));
        let request = WebListRequest::new(10000).do_not_cache();
        assert_eq!(h.loader.get(URL, &request).as_deref(), Some("a.com"));
        assert!(h.cache.is_empty());
    }

    #[test]
    fn test_state() {
        let h = harness(StaticFetcher::new().with_body(URL, "a.com"));
        assert_eq!(
            h.loader.state(URL, 1000),
            WebListState {
                time: None,
                up_to_date: false
            }
        );
        h.loader.fetch(URL).unwrap();
        assert!(h.loader.state(URL, 1000).up_to_date);
        h.clock.advance(1000);
        assert_eq!(
            h.loader.state(URL, 1000),
            WebListState {
                time: Some(1_000_000),
                up_to_date: false
            }
        );
    }

    #[test]
    fn test_forced_fetch_surfaces_errors() {
        let h = harness(StaticFetcher::new());
        assert!(h.loader.fetch(URL).is_err());
    }

    #[test]
    fn test_update_next_oldest_first() {
        let a = "https://lists.test/a.txt";
        let b = "https://lists.test/b.txt";
        let c = "https://lists.test/c.txt";
        let h = harness(
            StaticFetcher::new()
                .with_body(a, "a.com")
                .with_body(b, "b.com"),
        );
        h.cache.set(&cache_key(a), WebListCacheEntry::new(a, 500, "")).unwrap();
        h.cache.set(&cache_key(b), WebListCacheEntry::new(b, 100, "")).unwrap();
        h.cache.set(&cache_key(c), WebListCacheEntry::new(c, 50, "")).unwrap();

        let urls = format!("{}\n{}\n{}", a, b, c);
        // c is oldest but fails, so b is refreshed
        let update = h.loader.update_next(&urls, 1000);
        assert_eq!(update.updated.as_deref(), Some(b));
        assert_eq!(update.pending, vec![a.to_string()]);
        assert!(!update.needs_reload());

        let update = h.loader.update_next(&urls, 1000);
        assert_eq!(update.updated.as_deref(), Some(a));
        assert!(update.needs_reload());
    }

    #[test]
    fn test_clear_stale() {
        let h = harness(StaticFetcher::new());
        for url in ["https://a.test/", "https://b.test/", "https://c.test/"] {
            h.cache.set(&cache_key(url), WebListCacheEntry::new(url, 0, "x.com")).unwrap();
        }
        let removed = h
            .loader
            .clear_stale("https://a.test/\nhttps://b.test/ # old", "https://b.test/\nhttps://d.test/")
            .unwrap();
        assert_eq!(removed, vec!["https://a.test/".to_string()]);
        assert!(h.cache.get(&cache_key("https://a.test/")).unwrap().is_none());
        assert!(h.cache.get(&cache_key("https://b.test/")).unwrap().is_some());
        assert!(h.cache.get(&cache_key("https://c.test/")).unwrap().is_some());
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn test_get_async_falls_back() {
        let cache = Arc::new(MemoryWebListCache::new());
        cache
            .set(&cache_key(URL), WebListCacheEntry::new(URL, 0, "stale.com"))
            .unwrap();
        let loader = WebListLoader::new(
            cache,
            Arc::new(NilFetcher),
            Arc::new(NilFetcher),
            Arc::new(ManualClock::new(1_000_000)),
        );
        let text = loader
            .get_async(URL, &WebListRequest::new(10), Duration::from_secs(1))
            .await;
        assert_eq!(text.as_deref(), Some("stale.com"));
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn test_get_async_stores() {
        let h = harness(StaticFetcher::new().with_body(URL, "a.com"));
        let text = h
            .loader
            .get_async(URL, &WebListRequest::new(10), Duration::from_secs(1))
            .await;
        assert_eq!(text.as_deref(), Some("a.com"));
        assert_eq!(h.cache.len(), 1);
    }
}
