use std::borrow::Cow;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use url::Url;

use crate::config::MergeLimits;
use crate::idn::IdnNormalizer;
use crate::matcher::{hostname_match, GlobTrie, MergedRegexSet};
use crate::types::{BlockOutcome, Blocker, ParsedRule, RuleKind};

/// A leading `scheme://`.
static SCHEME_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z][0-9A-Za-z.+-]*://").expect("SCHEME_PREFIX: hardcoded regex is invalid")
});

/// Compiled, queryable form of one rule list.
///
/// Hostname globs live in a trie; regex rules are merged into a few
/// matchers. An index is immutable once built.
#[derive(Debug, Default)]
pub struct MatchIndex {
    hostnames: GlobTrie<Arc<ParsedRule>>,
    patterns: MergedRegexSet<Arc<ParsedRule>>,
}

impl MatchIndex {
    /// Build an index over valid rules.
    pub fn build(rules: &[Arc<ParsedRule>], limits: MergeLimits) -> Self {
        let mut hostnames = GlobTrie::new();
        let mut regex_rules = Vec::new();

        for record in rules {
            match RuleKind::classify(&record.rule) {
                RuleKind::Regex { body, flags } => regex_rules.push((body, flags, record.clone())),
                RuleKind::Glob(glob) => hostnames.insert(glob, record.clone()),
            }
        }

        Self {
            hostnames,
            patterns: MergedRegexSet::build(regex_rules, limits),
        }
    }

    /// Match a hostname, and its parent domains, against the hostname rules.
    pub fn match_hostname(&self, hostname: &str) -> Option<&Arc<ParsedRule>> {
        hostname_match(&self.hostnames, hostname).map(|found| found.value)
    }

    /// Match a normalized URL against the regex rules.
    pub fn match_url(&self, url: &str) -> Option<&Arc<ParsedRule>> {
        self.patterns.find(url)
    }

    pub fn hostname_rule_count(&self) -> usize {
        self.hostnames.len()
    }

    pub fn pattern_rule_count(&self) -> usize {
        self.patterns.len()
    }

    /// Number of compiled regex matchers.
    pub fn matcher_count(&self) -> usize {
        self.patterns.matcher_count()
    }
}

/// A URL or bare hostname ready for matching.
struct Target {
    hostname: String,
    url: String,
}

impl Target {
    /// Parse `input`, assuming `http://` when it has no scheme.
    fn parse(input: &str, idn: &dyn IdnNormalizer) -> Option<Self> {
        let candidate = if SCHEME_PREFIX.is_match(input) {
            Cow::Borrowed(input)
        } else {
            Cow::Owned(format!("http://{}", input))
        };
        let url = match Url::parse(&candidate) {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!(input, error = %e, "unparsable URL treated as allowed");
                return None;
            }
        };

        let host = url.host_str().unwrap_or("");
        let hostname = if host.starts_with('[') {
            host.to_string()
        } else {
            idn.to_ascii(host)
        };

        Some(Self {
            url: normalized_url(&url, &hostname),
            hostname,
        })
    }
}

/// `scheme://[user[:pass]@]host[:port]path[?query][#fragment]`
fn normalized_url(url: &Url, hostname: &str) -> String {
    let mut out = String::with_capacity(url.as_str().len());
    out.push_str(url.scheme());
    out.push_str("://");
    if !url.username().is_empty() {
        out.push_str(url.username());
        if let Some(password) = url.password().filter(|p| !p.is_empty()) {
            out.push(':');
            out.push_str(password);
        }
        out.push('@');
    }
    out.push_str(hostname);
    if let Some(port) = url.port() {
        out.push(':');
        out.push_str(&port.to_string());
    }
    out.push_str(url.path());
    if let Some(query) = url.query().filter(|q| !q.is_empty()) {
        out.push('?');
        out.push_str(query);
    }
    if let Some(fragment) = url.fragment().filter(|f| !f.is_empty()) {
        out.push('#');
        out.push_str(fragment);
    }
    out
}

/// Both lists compiled together, with a decision cache.
///
/// The cache belongs to this snapshot; a filter builds a new snapshot when
/// either list is recompiled, so cached decisions never outlive their rules.
pub struct CompiledFilter {
    whitelist: Arc<MatchIndex>,
    blacklist: Arc<MatchIndex>,
    cache: Mutex<LruCache<String, Blocker>>,
}

impl CompiledFilter {
    pub fn new(whitelist: Arc<MatchIndex>, blacklist: Arc<MatchIndex>, cache_size: usize) -> Self {
        let cache_size = NonZeroUsize::new(cache_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            whitelist,
            blacklist,
            cache: Mutex::new(LruCache::new(cache_size)),
        }
    }

    /// Whether this snapshot was built from exactly these indexes.
    pub fn is_built_from(&self, whitelist: &Arc<MatchIndex>, blacklist: &Arc<MatchIndex>) -> bool {
        Arc::ptr_eq(&self.whitelist, whitelist) && Arc::ptr_eq(&self.blacklist, blacklist)
    }

    /// Decide a URL or bare hostname.
    pub fn check(&self, url_or_hostname: &str, idn: &dyn IdnNormalizer) -> Blocker {
        let mut cache = self.cache.lock();

        if let Some(cached) = cache.get(url_or_hostname) {
            return cached.clone();
        }

        // matching is CPU-only, so the lock is held to avoid computing the
        // same key twice
        let result = self.find_blocker(url_or_hostname, idn);
        cache.put(url_or_hostname.to_string(), result.clone());
        result
    }

    /// Decide without caching.
    fn find_blocker(&self, url_or_hostname: &str, idn: &dyn IdnNormalizer) -> Blocker {
        let target = match Target::parse(url_or_hostname, idn) {
            Some(target) => target,
            None => return Blocker::allowed(),
        };

        if let Some(rule) = self.whitelist.match_hostname(&target.hostname) {
            return Blocker::new(BlockOutcome::Allowed, rule.clone());
        }
        if let Some(rule) = self.whitelist.match_url(&target.url) {
            return Blocker::new(BlockOutcome::Allowed, rule.clone());
        }
        if let Some(rule) = self.blacklist.match_hostname(&target.hostname) {
            return Blocker::new(BlockOutcome::BlockedByDomain, rule.clone());
        }
        if let Some(rule) = self.blacklist.match_url(&target.url) {
            return Blocker::new(BlockOutcome::BlockedByPattern, rule.clone());
        }
        Blocker::allowed()
    }

    pub fn whitelist(&self) -> &MatchIndex {
        &self.whitelist
    }

    pub fn blacklist(&self) -> &MatchIndex {
        &self.blacklist
    }

    /// Clear the decision cache
    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }
}
