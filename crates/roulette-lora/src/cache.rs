//! Metadata cache
//!
//! Caches resolved metadata and derived keyword text per LoRA path so repeated
//! runs over a large library skip sidecar and header reads. The cache is
//! bounded (LRU) with an optional time-to-live, and is handed to resolvers
//! explicitly: clones of one [`SharedMetadataCache`] share entries, separate
//! caches are isolated.

use crate::metadata::ResolvedMetadata;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cache handle shared between resolvers
pub type SharedMetadataCache = Arc<Mutex<MetadataCache>>;

/// Cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached paths
    pub max_entries: usize,
    /// Entry lifetime in seconds; `None` keeps entries until evicted
    pub ttl_secs: Option<u64>,
    /// Also remember that a path has no metadata
    pub cache_negative: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 4096,
            ttl_secs: None,
            cache_negative: true,
        }
    }
}

impl CacheConfig {
    /// Entry lifetime
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }
}

/// Cached data for one LoRA path
#[derive(Debug, Clone)]
pub struct CachedMetadata {
    /// Resolution result; `Some(None)` records that nothing was found
    pub record: Option<Option<ResolvedMetadata>>,
    /// Keyword search text
    pub keywords: Option<String>,
    /// Cache entry creation time
    pub created_at: Instant,
    /// Last access time
    pub last_accessed: Instant,
    /// Access count
    pub access_count: u64,
}

impl CachedMetadata {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            record: None,
            keywords: None,
            created_at: now,
            last_accessed: now,
            access_count: 0,
        }
    }

    /// Mark as accessed
    pub fn touch(&mut self) {
        self.last_accessed = Instant::now();
        self.access_count += 1;
    }

    /// Age in seconds
    pub fn age_seconds(&self) -> f64 {
        self.created_at.elapsed().as_secs_f64()
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Total lookups
    pub lookups: u64,
    /// Cache hits
    pub hits: u64,
    /// Cache misses
    pub misses: u64,
    /// LRU evictions
    pub evictions: u64,
    /// Entries dropped for exceeding the TTL
    pub expirations: u64,
    /// Insertions
    pub insertions: u64,
}

impl CacheStats {
    /// Hit rate (0.0 - 1.0)
    pub fn hit_rate(&self) -> f64 {
        if self.lookups == 0 {
            0.0
        } else {
            self.hits as f64 / self.lookups as f64
        }
    }
}

/// Bounded per-path metadata cache
pub struct MetadataCache {
    entries: HashMap<PathBuf, CachedMetadata>,
    config: CacheConfig,
    stats: CacheStats,
}

impl MetadataCache {
    /// Create a new cache
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: HashMap::new(),
            config,
            stats: CacheStats::default(),
        }
    }

    /// Create a new cache wrapped for sharing
    pub fn shared(config: CacheConfig) -> SharedMetadataCache {
        Arc::new(Mutex::new(Self::new(config)))
    }

    /// Cached resolution result
    ///
    /// `None` on miss; `Some(None)` when the path is known to have no metadata.
    pub fn get_record(&mut self, path: &Path) -> Option<Option<ResolvedMetadata>> {
        self.lookup(path, |e| e.record.clone())
    }

    /// Cached keyword text
    pub fn get_keywords(&mut self, path: &Path) -> Option<String> {
        self.lookup(path, |e| e.keywords.clone())
    }

    /// Store a resolution result
    ///
    /// Negative results are dropped unless `cache_negative` is set.
    pub fn insert_record(&mut self, path: &Path, record: Option<ResolvedMetadata>) {
        if record.is_none() && !self.config.cache_negative {
            return;
        }
        self.entry_mut(path).record = Some(record);
    }

    /// Store keyword text
    pub fn insert_keywords(&mut self, path: &Path, keywords: String) {
        self.entry_mut(path).keywords = Some(keywords);
    }

    /// Check if a path has any cached data
    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    /// Remove a path
    pub fn remove(&mut self, path: &Path) -> Option<CachedMetadata> {
        self.entries.remove(path)
    }

    /// Clear all cached entries
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Drop every entry older than the TTL
    pub fn purge_expired(&mut self) -> usize {
        let Some(ttl) = self.config.ttl() else {
            return 0;
        };
        let before = self.entries.len();
        self.entries.retain(|_, e| e.created_at.elapsed() < ttl);
        let purged = before - self.entries.len();
        self.stats.expirations += purged as u64;
        purged
    }

    /// Get cache statistics
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Get configuration
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Get number of cached paths
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn lookup<T>(&mut self, path: &Path, field: impl Fn(&CachedMetadata) -> Option<T>) -> Option<T> {
        self.stats.lookups += 1;

        if self.is_expired(path) {
            self.entries.remove(path);
            self.stats.expirations += 1;
        }

        let found = self.entries.get_mut(path).and_then(|entry| {
            let value = field(entry);
            if value.is_some() {
                entry.touch();
            }
            value
        });

        if found.is_some() {
            self.stats.hits += 1;
        } else {
            self.stats.misses += 1;
        }
        found
    }

    fn is_expired(&self, path: &Path) -> bool {
        match (self.config.ttl(), self.entries.get(path)) {
            (Some(ttl), Some(entry)) => entry.created_at.elapsed() >= ttl,
            _ => false,
        }
    }

    fn entry_mut(&mut self, path: &Path) -> &mut CachedMetadata {
        if !self.entries.contains_key(path) {
            while self.entries.len() >= self.config.max_entries.max(1) {
                self.evict_one();
            }
            self.stats.insertions += 1;
        }
        self.entries
            .entry(path.to_path_buf())
            .or_insert_with(CachedMetadata::new)
    }

    /// Evict one entry (LRU policy)
    fn evict_one(&mut self) {
        let lru_path = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.last_accessed)
            .map(|(path, _)| path.clone());

        if let Some(path) = lru_path {
            self.entries.remove(&path);
            self.stats.evictions += 1;
        }
    }
}

impl Default for MetadataCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}
