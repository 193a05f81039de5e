//! Cache store seam and the in-memory implementation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

use crate::error::Error;

/// Key/value storage with per-entry TTL and bulk invalidation by tag.
pub trait CacheStore: Send + Sync {
    /// Get a live value.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error>;

    /// Current generation of each tag.
    fn generations(&self, tags: &[String]) -> Result<Vec<(String, u64)>, Error>;

    /// Store a value for `ttl` under tag generations taken before the value
    /// was computed. If any tag was invalidated since, the value is dropped.
    fn set_at(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
        generations: Vec<(String, u64)>,
    ) -> Result<(), Error>;

    /// Store a value for `ttl`, associated with the current generations of
    /// `tags`.
    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration, tags: &[String]) -> Result<(), Error> {
        let generations = self.generations(tags)?;
        self.set_at(key, value, ttl, generations)
    }

    /// Invalidate every entry stored with `tag`.
    fn invalidate(&self, tag: &str) -> Result<(), Error>;

    /// Drop a single entry.
    fn remove(&self, key: &str) -> Result<(), Error>;
}

/// A cached value with the tag generations seen at write time.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Stored bytes.
    pub value: Vec<u8>,
    /// `(tag, generation)` pairs captured when the entry was written.
    pub tags: Vec<(String, u64)>,
    /// Expiry instant.
    pub expires_at: Instant,
}

/// Cache statistics.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
    expirations: AtomicU64,
    evictions: AtomicU64,
}

impl CacheStats {
    /// Get hit count.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Get miss count.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Get tag invalidation count.
    pub fn invalidations(&self) -> u64 {
        self.invalidations.load(Ordering::Relaxed)
    }

    /// Get count of entries dropped on read because they expired or went stale.
    pub fn expirations(&self) -> u64 {
        self.expirations.load(Ordering::Relaxed)
    }

    /// Get count of entries dropped to stay within capacity.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Calculate hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total > 0.0 {
            hits / total
        } else {
            0.0
        }
    }
}

/// Default number of entries a [`MemoryCacheStore`] holds.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// In-process cache store with a fixed capacity.
///
/// Invalidating a tag bumps its generation counter; entries remember the
/// generations of their tags and are treated as missing once any of them
/// moved. When the store is full, a write first sweeps expired and stale
/// entries, then evicts the entry closest to expiry.
#[derive(Debug)]
pub struct MemoryCacheStore {
    entries: DashMap<String, CacheEntry>,
    generations: DashMap<String, u64>,
    max_entries: usize,
    stats: CacheStats,
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MAX_ENTRIES)
    }
}

impl MemoryCacheStore {
    /// Create an empty store with the default capacity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store holding at most `max_entries` entries.
    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            generations: DashMap::new(),
            max_entries: max_entries.max(1),
            stats: CacheStats::default(),
        }
    }

    /// Get cache statistics.
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.max_entries
    }

    /// Number of stored entries, live or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all entries.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Drop every expired or stale entry and return how many went.
    pub fn purge(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| self.is_live(entry, now));
        let purged = before.saturating_sub(self.entries.len());
        if purged > 0 {
            self.stats
                .expirations
                .fetch_add(purged as u64, Ordering::Relaxed);
            debug!(purged, "cache entries purged");
        }
        purged
    }

    fn generation(&self, tag: &str) -> u64 {
        self.generations.get(tag).map(|g| *g).unwrap_or(0)
    }

    fn is_current(&self, generations: &[(String, u64)]) -> bool {
        generations
            .iter()
            .all(|(tag, generation)| self.generation(tag) == *generation)
    }

    fn is_live(&self, entry: &CacheEntry, now: Instant) -> bool {
        entry.expires_at > now && self.is_current(&entry.tags)
    }

    /// Make room for one more entry.
    fn reserve(&self) {
        if self.entries.len() < self.max_entries {
            return;
        }
        self.purge();

        while self.entries.len() >= self.max_entries {
            let victim = self
                .entries
                .iter()
                .min_by_key(|entry| entry.expires_at)
                .map(|entry| entry.key().clone());
            let Some(key) = victim else {
                break;
            };
            self.entries.remove(&key);
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        let now = Instant::now();
        let live = self
            .entries
            .get(key)
            .map(|entry| self.is_live(&entry, now).then(|| entry.value.clone()));

        match live {
            Some(Some(value)) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(value))
            }
            Some(None) => {
                self.entries.remove(key);
                self.stats.expirations.fetch_add(1, Ordering::Relaxed);
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    fn generations(&self, tags: &[String]) -> Result<Vec<(String, u64)>, Error> {
        Ok(tags
            .iter()
            .map(|tag| (tag.clone(), self.generation(tag)))
            .collect())
    }

    fn set_at(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
        generations: Vec<(String, u64)>,
    ) -> Result<(), Error> {
        if !self.is_current(&generations) {
            debug!(key, "dropping value computed before an invalidation");
            self.entries.remove(key);
            return Ok(());
        }
        if !self.entries.contains_key(key) {
            self.reserve();
        }
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                tags: generations,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    fn invalidate(&self, tag: &str) -> Result<(), Error> {
        let generation = {
            let mut entry = self.generations.entry(tag.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };
        self.stats.invalidations.fetch_add(1, Ordering::Relaxed);
        debug!(tag, generation, "cache tag invalidated");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), Error> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn tags(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_get_set() {
        let store = MemoryCacheStore::new();
        assert_eq!(store.get("k").unwrap(), None);

        store
            .set("k", b"v".to_vec(), Duration::from_secs(60), &[])
            .unwrap();
        assert_eq!(store.get("k").unwrap(), Some(b"v".to_vec()));

        assert_eq!(store.stats().hits(), 1);
        assert_eq!(store.stats().misses(), 1);
        assert!((store.stats().hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_ttl_expiry() {
        let store = MemoryCacheStore::new();
        store
            .set("k", b"v".to_vec(), Duration::from_millis(20), &[])
            .unwrap();

        thread::sleep(Duration::from_millis(40));

        assert_eq!(store.get("k").unwrap(), None);
        assert_eq!(store.stats().expirations(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_tag_invalidation() {
        let store = MemoryCacheStore::new();
        let ttl = Duration::from_secs(60);
        store.set("a", b"1".to_vec(), ttl, &tags(&["entity:Element"])).unwrap();
        store
            .set("b", b"2".to_vec(), ttl, &tags(&["entity:Element", "entity:Favorite"]))
            .unwrap();
        store.set("c", b"3".to_vec(), ttl, &tags(&["entity:File"])).unwrap();

        store.invalidate("entity:Favorite").unwrap();

        assert_eq!(store.get("a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.get("b").unwrap(), None);
        assert_eq!(store.get("c").unwrap(), Some(b"3".to_vec()));

        // Entries written after the invalidation are live again.
        store
            .set("b", b"4".to_vec(), ttl, &tags(&["entity:Favorite"]))
            .unwrap();
        assert_eq!(store.get("b").unwrap(), Some(b"4".to_vec()));
        assert_eq!(store.stats().invalidations(), 1);
    }

    #[test]
    fn test_stale_snapshot_is_not_stored() {
        let store = MemoryCacheStore::new();
        let ttl = Duration::from_secs(60);
        let snapshot = store.generations(&tags(&["entity:Element"])).unwrap();

        store.invalidate("entity:Element").unwrap();
        store.set_at("k", b"old".to_vec(), ttl, snapshot).unwrap();
        assert_eq!(store.get("k").unwrap(), None);
        assert!(store.is_empty());

        let snapshot = store.generations(&tags(&["entity:Element"])).unwrap();
        store.set_at("k", b"new".to_vec(), ttl, snapshot).unwrap();
        assert_eq!(store.get("k").unwrap(), Some(b"new".to_vec()));
    }

    #[test]
    fn test_full_store_sweeps_dead_entries() {
        let store = MemoryCacheStore::with_capacity(100);
        for i in 0..100 {
            store
                .set(&format!("k{i}"), b"v".to_vec(), Duration::ZERO, &[])
                .unwrap();
        }
        assert_eq!(store.len(), 100);

        thread::sleep(Duration::from_millis(5));
        store
            .set("fresh", b"v".to_vec(), Duration::from_secs(60), &[])
            .unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.stats().expirations(), 100);
        assert_eq!(store.stats().evictions(), 0);
    }

    #[test]
    fn test_full_store_evicts_closest_to_expiry() {
        let store = MemoryCacheStore::with_capacity(2);
        store.set("a", b"1".to_vec(), Duration::from_secs(60), &[]).unwrap();
        store.set("b", b"2".to_vec(), Duration::from_secs(600), &[]).unwrap();
        store.set("c", b"3".to_vec(), Duration::from_secs(300), &[]).unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.stats().evictions(), 1);
        assert_eq!(store.get("a").unwrap(), None);
        assert_eq!(store.get("b").unwrap(), Some(b"2".to_vec()));
        assert_eq!(store.get("c").unwrap(), Some(b"3".to_vec()));

        // Overwriting a stored key never evicts.
        store.set("b", b"4".to_vec(), Duration::from_secs(60), &[]).unwrap();
        assert_eq!(store.stats().evictions(), 1);
    }

    #[test]
    fn test_purge() {
        let store = MemoryCacheStore::new();
        let ttl = Duration::from_secs(60);
        store.set("a", b"1".to_vec(), ttl, &tags(&["entity:Element"])).unwrap();
        store.set("b", b"2".to_vec(), ttl, &tags(&["entity:File"])).unwrap();

        store.invalidate("entity:Element").unwrap();
        assert_eq!(store.purge(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("b").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn test_remove() {
        let store = MemoryCacheStore::new();
        store
            .set("k", b"v".to_vec(), Duration::from_secs(60), &[])
            .unwrap();
        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }
}
