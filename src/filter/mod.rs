//! Filter module.
//!
//! Holds the blacklist, the whitelist and the transform rules, and answers
//! block queries against them. Rule changes take effect on the next query,
//! which recompiles whatever list changed.

mod services;

pub use services::FilterServices;

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::clock::Clock;
use crate::compile::CompiledFilter;
use crate::config::{FilterOptions, MergeLimits};
use crate::error::Result;
use crate::idn::IdnNormalizer;
use crate::parser::{
    self, parse_rule_line, urls_text_to_lines, ParseOptions, TransformMode, ValidateMode,
};
use crate::rule_set::RuleSet;
use crate::transform::{TransformRule, TransformRules};
use crate::types::{BlockOutcome, Blocker, ListKind, ParsedRule, Source};
use crate::unblock::{TempUnblock, UnblockGrant, UnblockPolicy};
use crate::validate::validate_rule;
use crate::weblist::{WebListLoader, WebListRequest, WebListState, WebListUpdate};

#[cfg(feature = "async")]
use std::time::Duration;

/// How user-authored lists are parsed: URLs go through the transform rules,
/// then everything is canonicalized.
const USER_LIST_PARSE: ParseOptions = ParseOptions {
    transform: TransformMode::Url,
    validate: ValidateMode::Standard,
};

/// How fetched web lists are parsed: lines not already in canonical form
/// are dropped.
const WEB_LIST_PARSE: ParseOptions = ParseOptions {
    transform: TransformMode::Always,
    validate: ValidateMode::Strict,
};

/// Block-rule engine.
///
/// All methods take `&self`; a `Filter` can be shared between threads and
/// queried while another thread adds rules.
pub struct Filter {
    transforms: RwLock<TransformRules>,
    blacklist: RwLock<RuleSet>,
    whitelist: RwLock<RuleSet>,
    snapshot: Mutex<Option<Arc<CompiledFilter>>>,
    decision_cache_size: usize,
    unblock: TempUnblock,
    loader: WebListLoader,
    idn: Arc<dyn IdnNormalizer>,
    clock: Arc<dyn Clock>,
}

impl Filter {
    /// Create an empty filter with default options.
    pub fn new(services: FilterServices) -> Self {
        Self::with_options(&FilterOptions::default(), services)
    }

    /// Create an empty filter tuned by `options`. No rules are loaded.
    pub fn with_options(options: &FilterOptions, services: FilterServices) -> Self {
        let limits: MergeLimits = options.merge_limits;

        #[cfg(feature = "async")]
        let loader = WebListLoader::new(
            services.cache,
            services.fetcher,
            services.async_fetcher,
            services.clock.clone(),
        );
        #[cfg(not(feature = "async"))]
        let loader = WebListLoader::new(services.cache, services.fetcher, services.clock.clone());

        Self {
            transforms: RwLock::new(TransformRules::new()),
            blacklist: RwLock::new(RuleSet::new(ListKind::Blacklist, limits)),
            whitelist: RwLock::new(RuleSet::new(ListKind::Whitelist, limits)),
            snapshot: Mutex::new(None),
            decision_cache_size: options.decision_cache_size,
            unblock: TempUnblock::new(UnblockPolicy::from_options(options)),
            loader,
            idn: services.idn,
            clock: services.clock,
        }
    }

    /// Create a filter and load everything `options` configures: transform
    /// rules, the user lists and the web blacklists.
    ///
    /// Never fails; sources that cannot be loaded are logged and skipped.
    pub fn from_options(options: &FilterOptions, services: FilterServices) -> Self {
        let filter = Self::with_options(options, services);
        filter.load_user_lists(options);
        filter.add_web_black_lists(&options.web_blacklists, options.web_blacklists_cache_duration_ms);
        filter
    }

    /// Async variant of [`from_options`](Self::from_options); each web list
    /// fetch is limited to `timeout`.
    #[cfg(feature = "async")]
    pub async fn from_options_async(options: &FilterOptions, services: FilterServices, timeout: Duration) -> Self {
        let filter = Self::with_options(options, services);
        filter.load_user_lists(options);
        filter
            .add_web_black_lists_async(&options.web_blacklists, options.web_blacklists_cache_duration_ms, timeout)
            .await;
        filter
    }

    fn load_user_lists(&self, options: &FilterOptions) {
        self.add_transform_rules(&options.transform_rules);
        self.add_black_list(&options.user_blacklist);
        self.add_white_list(&options.user_whitelist);
    }

    fn list(&self, kind: ListKind) -> &RwLock<RuleSet> {
        match kind {
            ListKind::Blacklist => &self.blacklist,
            ListKind::Whitelist => &self.whitelist,
        }
    }

    /// Parse a rule line with the current transform rules.
    pub fn parse_rule_line(&self, line: &str, options: ParseOptions) -> ParsedRule {
        parse_rule_line(line, options, &self.transforms.read(), self.idn.as_ref())
    }

    /// Add rule text to a list, parsing each line with `options`.
    ///
    /// Returns the number of new lines stored.
    pub fn add_rules(&self, kind: ListKind, text: &str, options: ParseOptions, source: Option<&str>) -> usize {
        let transforms = self.transforms.read();
        let idn = self.idn.as_ref();
        let added = self
            .list(kind)
            .write()
            .add_text(text, source, |line| parse_rule_line(line, options, &transforms, idn));
        tracing::debug!(list = ?kind, added, source, "added rules");
        added
    }

    /// Add user blacklist text.
    pub fn add_black_list(&self, text: &str) -> usize {
        self.add_rules(ListKind::Blacklist, text, USER_LIST_PARSE, None)
    }

    /// Add user whitelist text.
    pub fn add_white_list(&self, text: &str) -> usize {
        self.add_rules(ListKind::Whitelist, text, USER_LIST_PARSE, None)
    }

    fn add_web_list_text(&self, url: &str, text: &str) -> usize {
        self.add_rules(ListKind::Blacklist, text, WEB_LIST_PARSE, Some(url))
    }

    /// Append transform rules. Rules already added keep their parsed form.
    pub fn add_transform_rules(&self, text: &str) -> usize {
        self.transforms.write().add_rules_text(text)
    }

    /// Replace all transform rules.
    pub fn set_transform_rules(&self, text: &str) -> usize {
        let mut transforms = self.transforms.write();
        transforms.clear();
        transforms.add_rules_text(text)
    }

    /// Append one transform rule, for example one with an empty
    /// replacement that rule text cannot express.
    pub fn add_transform_rule(&self, rule: TransformRule) {
        self.transforms.write().push(rule);
    }

    /// Apply the transform rules to one rule.
    pub fn transform_rule(&self, rule: &str) -> String {
        self.transforms.read().apply(rule)
    }

    /// Canonicalize one rule; empty if invalid.
    pub fn validate_rule(&self, rule: &str) -> String {
        validate_rule(rule, self.idn.as_ref())
    }

    /// Canonicalize every line of `text`, keeping comments.
    pub fn validate_rules_text(&self, text: &str, transform: TransformMode) -> String {
        parser::validate_rules_text(
            text,
            ParseOptions::new(transform, ValidateMode::Standard),
            &self.transforms.read(),
            self.idn.as_ref(),
        )
    }

    /// Canonicalize the pattern of every transform line in `text`.
    pub fn validate_transform_rules_text(&self, text: &str) -> String {
        parser::validate_transform_rules_text(text, ValidateMode::Standard, self.idn.as_ref())
    }

    /// The compiled form of both lists, rebuilt if either changed.
    pub fn compiled(&self) -> Arc<CompiledFilter> {
        let whitelist = self.whitelist.read().compiled();
        let blacklist = self.blacklist.read().compiled();

        let mut snapshot = self.snapshot.lock();
        if let Some(current) = &*snapshot {
            if current.is_built_from(&whitelist, &blacklist) {
                return current.clone();
            }
        }
        let fresh = Arc::new(CompiledFilter::new(whitelist, blacklist, self.decision_cache_size));
        *snapshot = Some(fresh.clone());
        fresh
    }

    /// Decide a source URL, falling back to its redirect target when the
    /// source itself is not blocked. Reports the deciding rule.
    pub fn get_blocker(&self, source: &Source) -> Blocker {
        if source.url.is_empty() {
            return Blocker::allowed();
        }
        if self.unblock.is_unblocked(&source.url, self.clock.now_millis()) {
            return Blocker::allowed();
        }

        let compiled = self.compiled();
        let idn = self.idn.as_ref();
        let blocker = compiled.check(&source.url, idn);
        match &source.url_redirected {
            Some(redirected) if !blocker.is_blocked() => compiled.check(redirected, idn),
            _ => blocker,
        }
    }

    /// Decide a URL or bare hostname.
    pub fn is_blocked(&self, url_or_hostname: &str) -> BlockOutcome {
        self.get_blocker(&Source::new(url_or_hostname)).outcome
    }

    /// Whether the canonical rule of `line` is in the blacklist.
    pub fn is_in_blacklist(&self, line: &str) -> bool {
        let parsed = self.parse_rule_line(line, ParseOptions::new(TransformMode::Always, ValidateMode::None));
        self.blacklist.read().contains_rule(&parsed.rule)
    }

    /// Every valid blacklist line, user and web, as `rule sep comment`.
    pub fn get_merged_blacklist(&self) -> String {
        self.blacklist.read().merged_text()
    }

    /// URLs of the web lists loaded into the blacklist.
    pub fn get_web_blacklists(&self) -> Vec<String> {
        self.blacklist.read().sources().to_vec()
    }

    /// Get the text of a web list through the cache.
    pub fn get_black_list_from_url(&self, url: &str, request: &WebListRequest) -> Option<String> {
        self.loader.get(url, request)
    }

    /// Load one web list into the blacklist.
    ///
    /// Returns `false` if neither the network nor the cache had it.
    pub fn add_black_list_from_url(&self, url: &str, cache_duration_ms: u64, do_not_cache: bool) -> bool {
        let request = WebListRequest {
            cache_duration_ms,
            cache_only: false,
            do_not_cache,
        };
        match self.loader.get(url, &request) {
            Some(text) => {
                self.add_web_list_text(url, &text);
                true
            }
            None => false,
        }
    }

    /// Load every web list in `urls_text`. Returns how many were loaded.
    pub fn add_web_black_lists(&self, urls_text: &str, cache_duration_ms: u64) -> usize {
        urls_text_to_lines(urls_text)
            .iter()
            .filter(|url| self.add_black_list_from_url(url, cache_duration_ms, false))
            .count()
    }

    /// Async variant of [`add_black_list_from_url`](Self::add_black_list_from_url).
    #[cfg(feature = "async")]
    pub async fn add_black_list_from_url_async(
        &self,
        url: &str,
        cache_duration_ms: u64,
        do_not_cache: bool,
        timeout: Duration,
    ) -> bool {
        let request = WebListRequest {
            cache_duration_ms,
            cache_only: false,
            do_not_cache,
        };
        match self.loader.get_async(url, &request, timeout).await {
            Some(text) => {
                self.add_web_list_text(url, &text);
                true
            }
            None => false,
        }
    }

    /// Async variant of [`add_web_black_lists`](Self::add_web_black_lists).
    #[cfg(feature = "async")]
    pub async fn add_web_black_lists_async(&self, urls_text: &str, cache_duration_ms: u64, timeout: Duration) -> usize {
        let mut loaded = 0;
        for url in urls_text_to_lines(urls_text) {
            if self
                .add_black_list_from_url_async(&url, cache_duration_ms, false, timeout)
                .await
            {
                loaded += 1;
            }
        }
        loaded
    }

    /// Cache freshness of a web list.
    pub fn cached_web_list_state(&self, url: &str, cache_duration_ms: u64) -> WebListState {
        self.loader.state(url, cache_duration_ms)
    }

    /// Fetch a web list now and cache it, bypassing freshness.
    pub fn fetch_web_black_list(&self, url: &str) -> Result<String> {
        self.loader.fetch(url)
    }

    /// Refresh the oldest outdated web list in `urls_text`.
    ///
    /// Meant to be called periodically; rebuild the filter from options once
    /// [`WebListUpdate::needs_reload`] says so.
    pub fn update_web_lists(&self, urls_text: &str, cache_duration_ms: u64) -> WebListUpdate {
        self.loader.update_next(urls_text, cache_duration_ms)
    }

    /// Remove cached web lists dropped between two source lists.
    pub fn clear_stale_web_list_cache(&self, old_urls_text: &str, new_urls_text: &str) -> Result<Vec<String>> {
        self.loader.clear_stale(old_urls_text, new_urls_text)
    }

    /// Let `url` through for a while, subject to throttling.
    pub fn temp_unblock(&self, url: &str) -> UnblockGrant {
        self.unblock.grant(url, self.clock.now_millis())
    }

    pub fn is_temp_unblocked(&self, url: &str) -> bool {
        self.unblock.is_unblocked(url, self.clock.now_millis())
    }

    pub fn revoke_temp_unblock(&self, url: &str) {
        self.unblock.revoke(url)
    }
}
