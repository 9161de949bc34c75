// This module is responsible for the persistent install cache (`cache.yml`).
// It loads the cache at the start of a run, treating a missing or corrupt file as an
// empty cache, and writes it back once at the end. Writes go to a sibling temporary
// file that is renamed over the real one, so a crash never leaves a half-written cache.

use crate::libs::errors::{Error, Result};
use crate::schemas::cache_file::{Cache, CacheItem};
use crate::{log_debug, log_info, log_warn};
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};

/// Location of the cache file plus load/save operations.
#[derive(Debug, Clone)]
pub struct CacheStore {
    path: PathBuf,
}

impl CacheStore {
    /// A store backed by `path` (usually `<cache dir>/cache.yml`).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The cache file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the cache.
    ///
    /// # Returns
    /// * `Cache`: the stored records. A missing file gives an empty cache; an
    ///   unreadable or malformed one is reported and also gives an empty cache, which
    ///   the next save rebuilds.
    pub fn load(&self) -> Cache {
        if !self.path.exists() {
            log_debug!("[Cache] No cache file at {}, starting empty", self.path.display());
            return Cache::default();
        }
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) => {
                log_warn!(
                    "[Cache] Cannot read {}: {}. Starting with an empty cache.",
                    self.path.display().to_string().yellow(),
                    e
                );
                return Cache::default();
            }
        };
        if contents.trim().is_empty() {
            return Cache::default();
        }
        match serde_yaml::from_str::<Vec<CacheItem>>(&contents) {
            Ok(items) => {
                log_debug!("[Cache] Loaded {} record(s) from {}", items.len(), self.path.display());
                Cache::from_items(items)
            }
            Err(e) => {
                log_warn!(
                    "[Cache] Corrupt cache file {}: {}. It will be rebuilt.",
                    self.path.display().to_string().yellow(),
                    e
                );
                Cache::default()
            }
        }
    }

    /// Writes the cache, creating the parent directory when needed.
    pub fn save(&self, cache: &Cache) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io_at("create cache directory", parent, e))?;
        }
        let serialized = serde_yaml::to_string(&cache.items())
            .map_err(|e| Error::io("failed to serialize cache", std::io::Error::other(e)))?;

        let staged = self.path.with_extension("yml.tmp");
        fs::write(&staged, serialized).map_err(|e| Error::io_at("write", &staged, e))?;
        fs::rename(&staged, &self.path).map_err(|e| Error::io_at("replace", &self.path, e))?;

        log_info!("[Cache] Saved {} record(s) to {}", cache.len(), self.path.display().to_string().cyan());
        Ok(())
    }

    /// Removes the record of one tool and saves the cache.
    ///
    /// # Returns
    /// * `Result<Option<CacheItem>>`: the removed record, if there was one.
    pub fn remove(&self, id: &str) -> Result<Option<CacheItem>> {
        let mut cache = self.load();
        let removed = cache.remove(id);
        if removed.is_some() {
            self.save(&cache)?;
        }
        Ok(removed)
    }

    /// Deletes the cache file.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                log_info!("[Cache] Removed {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io_at("remove", &self.path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn item(id: &str, version: &str) -> CacheItem {
        CacheItem {
            id: id.into(),
            name: format!("tool-{id}"),
            path: format!("/opt/bin/tool-{id}"),
            version: version.into(),
            downloaded: Utc::now(),
            updated: Utc::now(),
            kind: "github".into(),
        }
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().join("cache.yml"));
        assert!(store.load().is_empty());
    }

    #[test]
    fn saves_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().join("nested/cache.yml"));
        let mut cache = Cache::default();
        cache.add(item("a", "1.0.0"));
        cache.add(item("b", "2.0.0"));
        store.save(&cache).unwrap();

        let loaded = store.load();
        assert_eq!(loaded, cache);
        assert_eq!(loaded.get("b").map(|i| i.version.as_str()), Some("2.0.0"));
        assert!(!dir.path().join("nested/cache.yml.tmp").exists());
    }

    #[test]
    fn corrupt_file_is_rebuilt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.yml");
        fs::write(&path, "{{{ not yaml").unwrap();
        let store = CacheStore::new(&path);
        assert!(store.load().is_empty());

        let mut cache = Cache::default();
        cache.add(item("a", "1.0.0"));
        store.save(&cache).unwrap();
        assert_eq!(store.load().len(), 1);
    }

    #[test]
    fn remove_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().join("cache.yml"));
        let mut cache = Cache::default();
        cache.add(item("a", "1.0.0"));
        store.save(&cache).unwrap();

        assert!(store.remove("a").unwrap().is_some());
        assert!(store.remove("a").unwrap().is_none());
        store.clear().unwrap();
        store.clear().unwrap();
        assert!(!store.path().exists());
    }
}
