//! Persistent cache for fetched web lists.
//!
//! Entries are keyed by [`cache_key`], a stable encoding of the source URL.

mod file;

pub use file::FileWebListCache;

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A fetched web list as stored in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebListCacheEntry {
    pub source_url: String,
    /// Fetch time in milliseconds since the Unix epoch
    pub fetched_at_millis: u64,
    pub rule_text: String,
}

impl WebListCacheEntry {
    pub fn new(source_url: impl Into<String>, fetched_at_millis: u64, rule_text: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            fetched_at_millis,
            rule_text: rule_text.into(),
        }
    }
}

/// Cache key for a web list source URL.
pub fn cache_key(url: &str) -> String {
    serde_json::json!({ "webBlocklistCache": url }).to_string()
}

/// Web list cache interface.
pub trait WebListCache: Send + Sync {
    /// Get the entry stored under `key`.
    fn get(&self, key: &str) -> Result<Option<WebListCacheEntry>>;

    /// Store `entry` under `key`, replacing any previous entry.
    fn set(&self, key: &str, entry: WebListCacheEntry) -> Result<()>;

    /// Remove the entries stored under `keys`. Missing keys are ignored.
    fn remove(&self, keys: &[String]) -> Result<()>;
}

/// In-memory cache.
#[derive(Debug, Default)]
pub struct MemoryWebListCache {
    entries: RwLock<HashMap<String, WebListCacheEntry>>,
}

impl MemoryWebListCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl WebListCache for MemoryWebListCache {
    fn get(&self, key: &str) -> Result<Option<WebListCacheEntry>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, entry: WebListCacheEntry) -> Result<()> {
        self.entries.write().insert(key.to_string(), entry);
        Ok(())
    }

    fn remove(&self, keys: &[String]) -> Result<()> {
        let mut entries = self.entries.write();
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_is_stable_json() {
        assert_eq!(
            cache_key("https://a.test/list.txt"),
            r#"{"webBlocklistCache":"https://a.test/list.txt"}"#
        );
        assert_ne!(cache_key("https://a.test/1"), cache_key("https://a.test/2"));
    }

    #[test]
    fn test_memory_cache_set_get_remove() {
        let cache = MemoryWebListCache::new();
        let key = cache_key("https://a.test/");
        assert!(cache.get(&key).unwrap().is_none());

        cache
            .set(&key, WebListCacheEntry::new("https://a.test/", 5, "a.com"))
            .unwrap();
        assert_eq!(cache.get(&key).unwrap().unwrap().rule_text, "a.com");

        cache
            .set(&key, WebListCacheEntry::new("https://a.test/", 6, "b.com"))
            .unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&key).unwrap().unwrap().fetched_at_millis, 6);

        cache.remove(&[key.clone(), "missing".to_string()]).unwrap();
        assert!(cache.is_empty());
    }
}
