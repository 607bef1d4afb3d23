use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Texture,
    Model,
    Font,
    Other,
}

/// Bookkeeping record for an asset that has already been loaded. The loaded
/// data itself lives with the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetEntry {
    pub key: String,
    pub kind: AssetKind,
    #[serde(default)]
    pub bytes: usize,
}

impl AssetEntry {
    pub fn new(key: impl Into<String>, kind: AssetKind, bytes: usize) -> Self {
        Self {
            key: key.into(),
            kind,
            bytes,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub bytes: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Registry of loaded assets keyed by path or logical name.
#[derive(Debug, Default)]
pub struct AssetCache {
    entries: HashMap<String, AssetEntry>,
    hits: u64,
    misses: u64,
}

impl AssetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up `key`, counting the lookup as a hit or a miss.
    pub fn get(&mut self, key: &str) -> Option<&AssetEntry> {
        match self.entries.get(key) {
            Some(entry) => {
                self.hits += 1;
                Some(entry)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Records `entry`, returning the entry it replaced.
    pub fn insert(&mut self, entry: AssetEntry) -> Option<AssetEntry> {
        tracing::trace!(key = %entry.key, kind = ?entry.kind, bytes = entry.bytes, "asset cached");
        self.entries.insert(entry.key.clone(), entry)
    }

    pub fn evict(&mut self, key: &str) -> Option<AssetEntry> {
        self.entries.remove(key)
    }

    /// Drops every entry. Hit and miss counters are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            bytes: self.entries.values().map(|entry| entry.bytes).sum(),
            hits: self.hits,
            misses: self.misses,
        }
    }
}
