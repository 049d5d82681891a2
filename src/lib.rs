//! Content Farm Filter - a block-rule engine for URLs and hostnames
//!
//! This library decides whether a URL or hostname is blocked, given a
//! blacklist, a whitelist and optional remotely fetched lists:
//! - Hostname rules with `*` wildcards, matched against a domain and all
//!   its parent domains
//! - Regex rules (`/expr/flags`) matched against the full URL, merged into
//!   a few large matchers
//! - Transform rules that rewrite rule text before it is stored
//! - Web lists fetched over HTTP and kept in a persistent cache
//! - Temporary, throttled unblocking
//!
//! # Example
//!
//! ```rust
//! use content_farm_filter::{BlockOutcome, Filter, FilterServices};
//!
//! let filter = Filter::new(FilterServices::offline());
//!
//! filter.add_black_list("
//! example.com          # and every subdomain
//! *.ads.example.net
//! /evil\\d+\\.test/    # regex rules match the whole URL
//! ");
//! filter.add_white_list("good.example.com");
//!
//! assert_eq!(filter.is_blocked("www.example.com"), BlockOutcome::BlockedByDomain);
//! assert_eq!(filter.is_blocked("https://good.example.com/"), BlockOutcome::Allowed);
//! assert_eq!(filter.is_blocked("http://evil42.test/x"), BlockOutcome::BlockedByPattern);
//! assert_eq!(filter.is_blocked("notexample.com"), BlockOutcome::Allowed);
//! ```
//!
//! # Rule Syntax
//!
//! One rule per line; text after the first whitespace is a comment.
//!
//! | Type | Example | Matches |
//! |------|---------|---------|
//! | Hostname | `example.com` | The domain and its subdomains |
//! | Wildcard | `*.example.com` | `*` spans any characters of the hostname |
//! | URL | `https://example.com/page` | Reduced to its hostname |
//! | Regex | `/^https?:\/\/[^/]+\/spam/i` | The normalized URL; flags `i`, `m`, `s` |
//!
//! ## Decision order
//!
//! 1. Whitelist hostname rules, then whitelist regex rules: allowed
//! 2. Blacklist hostname rules: blocked by domain
//! 3. Blacklist regex rules: blocked by pattern
//! 4. Otherwise allowed

pub mod cache;
pub mod clock;
pub mod compile;
pub mod config;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod idn;
pub mod matcher;
pub mod parser;
pub mod rule_set;
pub mod transform;
pub mod types;
pub mod unblock;
pub mod validate;
pub mod weblist;

// Re-export commonly used items
pub use compile::{CompiledFilter, MatchIndex};
pub use config::{
    FilterOptions, MergeLimits, DEFAULT_CACHE_DURATION_MS, DEFAULT_DECISION_CACHE_SIZE,
    DEFAULT_UPDATE_INTERVAL_MS, DEFAULT_WEB_BLACKLIST, MAX_MERGED_GROUPS, MAX_MERGED_SOURCE_LEN,
};
pub use error::{FetchErrorKind, FilterError, Result};
pub use filter::{Filter, FilterServices};
pub use matcher::{GlobMatch, GlobTrie, MergedRegexSet};
pub use parser::{
    get_lines, parse_rule_line, parse_transform_rule_line, split_rule_line, urls_text_to_lines,
    validate_rules_text, validate_transform_rules_text, ParseOptions, TransformMode,
    TransformRuleLine, ValidateMode,
};
pub use rule_set::{RuleLine, RuleSet};
pub use transform::{TransformRule, TransformRules};
pub use types::{is_regex_rule, BlockOutcome, Blocker, ListKind, ParsedRule, RuleKind, Source};
pub use unblock::{TempUnblock, UnblockGrant, UnblockPolicy};
pub use validate::validate_rule;
pub use weblist::{WebListLoader, WebListRequest, WebListState, WebListUpdate};

// Re-export collaborator types
pub use cache::{cache_key, FileWebListCache, MemoryWebListCache, WebListCache, WebListCacheEntry};
pub use clock::{Clock, ManualClock, SystemClock};
pub use fetch::{Fetcher, HttpFetcher, NilFetcher, StaticFetcher, DEFAULT_FETCH_TIMEOUT};
pub use idn::{IdnNormalizer, IdnaNormalizer, NilIdnNormalizer};

#[cfg(feature = "async")]
pub use fetch::AsyncFetcher;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_full_workflow() {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let cache = Arc::new(MemoryWebListCache::new());
        let fetcher = Arc::new(StaticFetcher::new().with_body(
            "https://lists.test/farms.txt",
            r#"
# Content farms
farm1.test
*.farm2.test      mirrors
/^https?:\/\/[^/]+\/amp\/farm\d+/
"#,
        ));
        let services = FilterServices::offline()
            .with_cache(cache.clone())
            .with_fetcher(fetcher.clone())
            .with_clock(clock.clone());

        let options = FilterOptions::new()
            .with_user_blacklist("https://WWW.Spam.test/some/page  found it myself")
            .with_user_whitelist("ok.farm1.test")
            .with_web_blacklists("https://lists.test/farms.txt")
            .with_transform_rules("/^https?:\\/\\/amp\\.(.*)$/ https://$1");

        let filter = Filter::from_options(&options, services);

        // user rules
        assert_eq!(filter.is_blocked("spam.test"), BlockOutcome::BlockedByDomain);
        assert_eq!(filter.is_blocked("http://a.b.spam.test/x"), BlockOutcome::BlockedByDomain);

        // web rules
        assert_eq!(filter.is_blocked("https://www.farm1.test/"), BlockOutcome::BlockedByDomain);
        assert_eq!(filter.is_blocked("a.farm2.test"), BlockOutcome::BlockedByDomain);
        assert_eq!(
            filter.is_blocked("https://news.test/amp/farm42"),
            BlockOutcome::BlockedByPattern
        );

        // whitelist wins
        assert_eq!(filter.is_blocked("https://ok.farm1.test/"), BlockOutcome::Allowed);

        // the comment line of the web list is not a canonical rule
        assert!(!filter.is_in_blacklist("#"));
        assert!(filter.is_in_blacklist("farm1.test"));
        assert_eq!(filter.get_web_blacklists(), vec!["https://lists.test/farms.txt".to_string()]);
        assert!(filter.get_merged_blacklist().starts_with("spam.test  found it myself\n"));

        // cached for the next filter
        assert_eq!(fetcher.calls(), 1);
        let again = Filter::from_options(
            &options,
            FilterServices::offline()
                .with_cache(cache.clone())
                .with_fetcher(fetcher.clone())
                .with_clock(clock.clone()),
        );
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(again.is_blocked("farm1.test"), BlockOutcome::BlockedByDomain);

        // dropping the source clears its cache entry
        let removed = filter
            .clear_stale_web_list_cache(&options.web_blacklists, "")
            .unwrap();
        assert_eq!(removed, vec!["https://lists.test/farms.txt".to_string()]);
        assert!(cache.is_empty());
    }
}
