//! # Cache File Schema (`cache.yml`)
//!
//! The cache is `forgebin`'s persistent memory: one record per installed tool, keyed
//! by the tool id (`sha256(output + "/" + name)`). It lets the `sync` and `upgrade`
//! strategies compare the resolved version with what was installed last time
//! without running the installed binary.
//!
//! ## Example
//! ```yaml
//! - id: 5b0c3c...
//!   name: gh
//!   path: /home/me/.local/bin/gh
//!   version: v2.40.0
//!   downloaded: 2024-01-15T10:30:45Z
//!   updated: 2024-01-15T10:30:45Z
//!   type: github
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Record of a last successful install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheItem {
    /// `sha256(output + "/" + name)`.
    pub id: String,
    /// Tool name.
    pub name: String,
    /// Full path of the installed executable.
    pub path: String,
    /// Installed version.
    pub version: String,
    /// When this version was downloaded.
    pub downloaded: DateTime<Utc>,
    /// When the record was last written.
    pub updated: DateTime<Utc>,
    /// Source kind the tool was installed from.
    #[serde(rename = "type")]
    pub kind: String,
}

/// In-memory view of the cache file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cache {
    items: BTreeMap<String, CacheItem>,
}

impl Cache {
    /// Builds a cache from a list of records; later duplicates win.
    #[must_use]
    pub fn from_items(items: Vec<CacheItem>) -> Self {
        Self {
            items: items
                .into_iter()
                .map(|item| (item.id.clone(), item))
                .collect(),
        }
    }

    /// Looks up a record by tool id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&CacheItem> {
        self.items.get(id)
    }

    /// Inserts or replaces a record.
    ///
    /// When the same version is recorded again the original download time is kept.
    pub fn add(&mut self, mut item: CacheItem) {
        if let Some(existing) = self.items.get(&item.id) {
            if existing.version == item.version {
                item.downloaded = existing.downloaded;
            }
        }
        self.items.insert(item.id.clone(), item);
    }

    /// Removes a record, returning it if present.
    pub fn remove(&mut self, id: &str) -> Option<CacheItem> {
        self.items.remove(id)
    }

    /// Records ordered by id, as written to disk.
    #[must_use]
    pub fn items(&self) -> Vec<&CacheItem> {
        self.items.values().collect()
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when the cache holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
