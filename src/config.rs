//! Filter configuration.
//!
//! `FilterOptions` mirrors the option set a host application persists for
//! the filter: user lists, web list sources, transform rules and the
//! temporary unblock policy. Options deserialize from JSON with every
//! field defaulted.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{FilterError, Result};

/// Default URL of the community blocklist
pub const DEFAULT_WEB_BLACKLIST: &str =
    "https://danny0838.github.io/content-farm-terminator/files/blocklist/content-farms.txt";

/// Default web list cache duration: 24 hours
pub const DEFAULT_CACHE_DURATION_MS: u64 = 24 * 60 * 60 * 1000;

/// Default web list update interval: 5 minutes
pub const DEFAULT_UPDATE_INTERVAL_MS: u64 = 5 * 60 * 1000;

/// Default decision cache size per compiled snapshot
pub const DEFAULT_DECISION_CACHE_SIZE: usize = 1024;

/// Maximum capturing groups in one merged regex
pub const MAX_MERGED_GROUPS: usize = 16384;

/// Maximum source length of one merged regex
pub const MAX_MERGED_SOURCE_LEN: usize = 8192 * 256;

/// Ceilings that decide when a merged regex alternation is sealed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeLimits {
    pub max_groups: usize,
    pub max_source_len: usize,
}

impl Default for MergeLimits {
    fn default() -> Self {
        Self {
            max_groups: MAX_MERGED_GROUPS,
            max_source_len: MAX_MERGED_SOURCE_LEN,
        }
    }
}

/// Filter options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterOptions {
    pub user_blacklist: String,
    pub user_whitelist: String,
    /// Newline separated URLs; whitespace or `#` starts a comment
    pub web_blacklists: String,
    pub web_blacklists_cache_duration_ms: u64,
    /// How often a host should call `Filter::update_web_lists`
    pub web_blacklists_update_interval_ms: u64,
    pub transform_rules: String,
    pub temp_unblock_duration_ms: u64,
    pub temp_unblock_countdown_base_ms: u64,
    pub temp_unblock_countdown_increment_ms: u64,
    pub temp_unblock_countdown_reset_ms: u64,
    pub decision_cache_size: usize,
    pub merge_limits: MergeLimits,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            user_blacklist: String::new(),
            user_whitelist: String::new(),
            web_blacklists: DEFAULT_WEB_BLACKLIST.to_string(),
            web_blacklists_cache_duration_ms: DEFAULT_CACHE_DURATION_MS,
            web_blacklists_update_interval_ms: DEFAULT_UPDATE_INTERVAL_MS,
            transform_rules: String::new(),
            temp_unblock_duration_ms: 8000,
            temp_unblock_countdown_base_ms: 10000,
            temp_unblock_countdown_increment_ms: 500,
            temp_unblock_countdown_reset_ms: 24 * 60 * 60 * 1000,
            decision_cache_size: DEFAULT_DECISION_CACHE_SIZE,
            merge_limits: MergeLimits::default(),
        }
    }
}

impl FilterOptions {
    /// Create new options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse options from a JSON document.
    pub fn from_json(text: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(text)?;
        options.check()?;
        Ok(options)
    }

    /// Load options from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            FilterError::Config(format!(
                "Failed to read options file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&text)
    }

    fn check(&self) -> Result<()> {
        if self.merge_limits.max_groups == 0 || self.merge_limits.max_source_len == 0 {
            return Err(FilterError::Config(
                "merge limits must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Set the user blacklist text.
    pub fn with_user_blacklist(mut self, text: impl Into<String>) -> Self {
        self.user_blacklist = text.into();
        self
    }

    /// Set the user whitelist text.
    pub fn with_user_whitelist(mut self, text: impl Into<String>) -> Self {
        self.user_whitelist = text.into();
        self
    }

    /// Set the web blacklist sources.
    pub fn with_web_blacklists(mut self, urls: impl Into<String>) -> Self {
        self.web_blacklists = urls.into();
        self
    }

    /// Set the web list cache duration; 0 always revalidates.
    pub fn with_cache_duration_ms(mut self, ms: u64) -> Self {
        self.web_blacklists_cache_duration_ms = ms;
        self
    }

    /// Set the transform rules text.
    pub fn with_transform_rules(mut self, text: impl Into<String>) -> Self {
        self.transform_rules = text.into();
        self
    }

    /// Set the temporary unblock duration.
    pub fn with_temp_unblock_duration_ms(mut self, ms: u64) -> Self {
        self.temp_unblock_duration_ms = ms;
        self
    }

    /// Set the decision cache size.
    pub fn with_decision_cache_size(mut self, size: usize) -> Self {
        self.decision_cache_size = size;
        self
    }

    /// Set the regex merge ceilings.
    pub fn with_merge_limits(mut self, limits: MergeLimits) -> Self {
        self.merge_limits = limits;
        self
    }
}
