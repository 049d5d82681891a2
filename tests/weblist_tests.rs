//! Integration tests for web list loading, caching and cache cleanup

use std::sync::Arc;

use content_farm_filter::{
    cache_key, BlockOutcome, FileWebListCache, Filter, FilterServices, ManualClock,
    MemoryWebListCache, StaticFetcher, WebListCache, WebListCacheEntry, WebListRequest,
};

const LIST: &str = "https://lists.test/farms.txt";
const T: u64 = 1_700_000_000_000;

struct Setup {
    cache: Arc<MemoryWebListCache>,
    fetcher: Arc<StaticFetcher>,
    clock: Arc<ManualClock>,
    filter: Filter,
}

fn setup(fetcher: StaticFetcher) -> Setup {
    let cache = Arc::new(MemoryWebListCache::new());
    let fetcher = Arc::new(fetcher);
    let clock = Arc::new(ManualClock::new(T));
    let filter = Filter::new(
        FilterServices::offline()
            .with_cache(cache.clone())
            .with_fetcher(fetcher.clone())
            .with_clock(clock.clone()),
    );
    Setup {
        cache,
        fetcher,
        clock,
        filter,
    }
}

#[test]
fn test_cache_ttl() {
    let s = setup(StaticFetcher::new().with_body(LIST, "fresh.test"));
    s.cache
        .set(&cache_key(LIST), WebListCacheEntry::new(LIST, T, "cached.test"))
        .unwrap();
    let request = WebListRequest::new(10_000);

    s.clock.set(T + 5000);
    assert_eq!(
        s.filter.get_black_list_from_url(LIST, &request).as_deref(),
        Some("cached.test")
    );
    assert_eq!(s.fetcher.calls(), 0);

    s.clock.set(T + 20_000);
    assert_eq!(
        s.filter.get_black_list_from_url(LIST, &request).as_deref(),
        Some("fresh.test")
    );
    assert_eq!(s.fetcher.calls(), 1);
}

#[test]
fn test_fetch_failure_uses_cached_text() {
    let s = setup(StaticFetcher::new());
    s.cache
        .set(&cache_key(LIST), WebListCacheEntry::new(LIST, T - 1_000_000, "stale.test"))
        .unwrap();

    assert!(s.filter.add_black_list_from_url(LIST, 10_000, false));
    assert_eq!(s.fetcher.calls(), 1);
    assert_eq!(s.filter.is_blocked("stale.test"), BlockOutcome::BlockedByDomain);
}

#[test]
fn test_failing_source_does_not_abort_others() {
    let s = setup(StaticFetcher::new().with_body("https://lists.test/ok.txt", "ok-farm.test"));
    let loaded = s.filter.add_web_black_lists(
        "https://lists.test/down.txt\nhttps://lists.test/ok.txt",
        0,
    );
    assert_eq!(loaded, 1);
    assert_eq!(s.filter.is_blocked("ok-farm.test"), BlockOutcome::BlockedByDomain);
    assert_eq!(s.filter.get_web_blacklists(), vec!["https://lists.test/ok.txt".to_string()]);
}

#[test]
fn test_web_lists_are_validated_strictly() {
    let s = setup(StaticFetcher::new().with_body(
        LIST,
        "good.test\nhttps://url-form.test/page\nUPPER.test\n/(broken/\n/ok\\d/",
    ));
    assert!(s.filter.add_black_list_from_url(LIST, 0, false));
    assert_eq!(s.filter.get_merged_blacklist(), "good.test\n/ok\\d/");
}

#[test]
fn test_do_not_cache() {
    let s = setup(StaticFetcher::new().with_body(LIST, "a.test"));
    assert!(s.filter.add_black_list_from_url(LIST, 10_000, true));
    assert!(s.cache.is_empty());
}

#[test]
fn test_state_and_forced_fetch() {
    let s = setup(StaticFetcher::new().with_body(LIST, "a.test"));
    assert!(!s.filter.cached_web_list_state(LIST, 1000).up_to_date);

    assert_eq!(s.filter.fetch_web_black_list(LIST).unwrap(), "a.test");
    let state = s.filter.cached_web_list_state(LIST, 1000);
    assert_eq!(state.time, Some(T));
    assert!(state.up_to_date);

    assert!(s.filter.fetch_web_black_list("https://lists.test/404.txt").is_err());
}

#[test]
fn test_update_web_lists() {
    let s = setup(StaticFetcher::new().with_body(LIST, "a.test"));
    let update = s.filter.update_web_lists(LIST, 1000);
    assert_eq!(update.updated.as_deref(), Some(LIST));
    assert!(update.needs_reload());

    let update = s.filter.update_web_lists(LIST, 1000);
    assert_eq!(update.updated, None);
    assert!(!update.needs_reload());
    assert_eq!(s.fetcher.calls(), 1);
}

#[test]
fn test_clear_stale_web_list_cache() {
    let s = setup(StaticFetcher::new());
    let urls = ["https://a.test/l.txt", "https://b.test/l.txt", "https://c.test/l.txt"];
    for url in urls {
        s.cache
            .set(&cache_key(url), WebListCacheEntry::new(url, T, "x.test"))
            .unwrap();
    }

    let removed = s
        .filter
        .clear_stale_web_list_cache(
            "https://a.test/l.txt\nhttps://b.test/l.txt",
            "https://b.test/l.txt  # still here",
        )
        .unwrap();
    assert_eq!(removed, vec!["https://a.test/l.txt".to_string()]);
    assert!(s.cache.get(&cache_key(urls[0])).unwrap().is_none());
    assert!(s.cache.get(&cache_key(urls[1])).unwrap().is_some());
    // never listed in the old sources, so untouched
    assert!(s.cache.get(&cache_key(urls[2])).unwrap().is_some());
}

#[test]
fn test_file_cache_survives_restart() {
    let dir = std::env::temp_dir().join(format!("cff-weblist-{}", std::process::id()));
    let path = dir.join("cache.json");
    let _ = std::fs::remove_file(&path);

    let fetcher = Arc::new(StaticFetcher::new().with_body(LIST, "persisted.test"));
    let clock = Arc::new(ManualClock::new(T));
    let services = || {
        FilterServices::offline()
            .with_cache(Arc::new(FileWebListCache::new(&path)))
            .with_fetcher(fetcher.clone())
            .with_clock(clock.clone())
    };

    let first = Filter::new(services());
    assert!(first.add_black_list_from_url(LIST, 60_000, false));

    let second = Filter::new(services());
    assert!(second.add_black_list_from_url(LIST, 60_000, false));
    assert_eq!(fetcher.calls(), 1);
    assert_eq!(second.is_blocked("persisted.test"), BlockOutcome::BlockedByDomain);

    let _ = std::fs::remove_dir_all(&dir);
}

#[cfg(feature = "async")]
mod async_tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use content_farm_filter::{AsyncFetcher, Fetcher, FilterError, Result};

    /// Fetcher whose async responses never arrive in time
    struct SlowFetcher;

    impl Fetcher for SlowFetcher {
        fn fetch(&self, url: &str) -> Result<String> {
            Err(FilterError::InvalidUrl(url.to_string()))
        }
    }

    #[async_trait]
    impl AsyncFetcher for SlowFetcher {
        async fn fetch(&self, _url: &str) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("late.test".to_string())
        }
    }

    #[tokio::test]
    async fn test_timeout_falls_back_to_cache() {
        let cache = Arc::new(MemoryWebListCache::new());
        cache
            .set(&cache_key(LIST), WebListCacheEntry::new(LIST, 0, "cached.test"))
            .unwrap();
        let filter = Filter::new(
            FilterServices::offline()
                .with_cache(cache)
                .with_fetcher(Arc::new(SlowFetcher))
                .with_clock(Arc::new(ManualClock::new(T))),
        );

        let loaded = filter
            .add_black_list_from_url_async(LIST, 10, false, Duration::from_millis(50))
            .await;
        assert!(loaded);
        assert_eq!(filter.is_blocked("cached.test"), BlockOutcome::BlockedByDomain);
        assert_eq!(filter.is_blocked("late.test"), BlockOutcome::Allowed);
    }

    #[tokio::test]
    async fn test_from_options_async() {
        let fetcher = Arc::new(StaticFetcher::new().with_body(LIST, "farm.test"));
        let options = content_farm_filter::FilterOptions::new()
            .with_web_blacklists(LIST)
            .with_user_whitelist("ok.farm.test");
        let filter = Filter::from_options_async(
            &options,
            FilterServices::offline().with_fetcher(fetcher),
            Duration::from_secs(5),
        )
        .await;
        assert_eq!(filter.is_blocked("a.farm.test"), BlockOutcome::BlockedByDomain);
        assert_eq!(filter.is_blocked("ok.farm.test"), BlockOutcome::Allowed);
    }
}
