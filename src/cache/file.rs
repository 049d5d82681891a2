use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::{WebListCache, WebListCacheEntry};
use crate::error::{FilterError, Result};

/// Cache persisted as one JSON document on disk.
///
/// The document is read on first access and rewritten on every change via a
/// temporary file and a rename, so a crash never leaves a truncated cache.
pub struct FileWebListCache {
    path: PathBuf,
    entries: Mutex<Option<HashMap<String, WebListCacheEntry>>>,
}

impl FileWebListCache {
    /// Create a cache backed by `path`. The file need not exist yet.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            entries: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<HashMap<String, WebListCacheEntry>> {
        match fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(HashMap::new()),
            Ok(text) => serde_json::from_str(&text).map_err(|e| {
                FilterError::Cache(format!(
                    "Corrupt cache file '{}': {}",
                    self.path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(FilterError::Io(e)),
        }
    }

    fn store(&self, entries: &HashMap<String, WebListCacheEntry>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = self.path.with_extension("tmp");
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(serde_json::to_string(entries)?.as_bytes())?;
        file.flush()?;
        drop(file);

        #[cfg(target_os = "windows")]
        {
            let _ = fs::remove_file(&self.path);
        }
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Run `f` on the loaded entries, loading them first if needed.
    fn with_entries<T>(
        &self,
        f: impl FnOnce(&mut HashMap<String, WebListCacheEntry>) -> T,
    ) -> Result<T> {
        let mut guard = self.entries.lock();
        if guard.is_none() {
            *guard = Some(self.load()?);
        }
        match guard.as_mut() {
            Some(entries) => Ok(f(entries)),
            None => Err(FilterError::Cache("cache not loaded".to_string())),
        }
    }
}

impl WebListCache for FileWebListCache {
    fn get(&self, key: &str) -> Result<Option<WebListCacheEntry>> {
        self.with_entries(|entries| entries.get(key).cloned())
    }

    fn set(&self, key: &str, entry: WebListCacheEntry) -> Result<()> {
        self.with_entries(|entries| {
            entries.insert(key.to_string(), entry);
            self.store(entries)
        })?
    }

    fn remove(&self, keys: &[String]) -> Result<()> {
        self.with_entries(|entries| {
            let before = entries.len();
            for key in keys {
                entries.remove(key);
            }
            if entries.len() == before {
                return Ok(());
            }
            self.store(entries)
        })?
    }
}
