//! Compute-on-miss caching of serializable values.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use super::store::CacheStore;
use crate::error::Error;

/// Typed front end over a [`CacheStore`].
#[derive(Clone)]
pub struct TaggedCache {
    store: Arc<dyn CacheStore>,
}

impl TaggedCache {
    /// Wrap a cache store.
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Get the underlying store.
    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// Return the cached value under `key`, or compute it with `producer`
    /// and store it for `ttl_secs` with `tags`.
    ///
    /// A payload that fails to decode counts as a miss. Producer errors are
    /// returned as-is and nothing is stored. Tag generations are read before
    /// `producer` runs, so a value computed across an invalidation of one of
    /// its tags is returned but not stored.
    pub fn remember<T, F>(
        &self,
        key: &str,
        ttl_secs: u64,
        tags: &[String],
        producer: F,
    ) -> Result<T, Error>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T, Error>,
    {
        if let Some(bytes) = self.store.get(key)? {
            match serde_json::from_slice::<T>(&bytes) {
                Ok(value) => {
                    debug!(key, "cache hit");
                    return Ok(value);
                }
                Err(e) => {
                    warn!(key, error = %e, "discarding undecodable cache payload");
                    self.store.remove(key)?;
                }
            }
        }

        let generations = self.store.generations(tags)?;
        let value = producer()?;
        let bytes = serde_json::to_vec(&value)?;
        self.store
            .set_at(key, bytes, Duration::from_secs(ttl_secs), generations)?;
        debug!(key, ttl_secs, tags = ?tags, "cache filled");
        Ok(value)
    }

    /// Invalidate every value stored with `tag`.
    pub fn invalidate(&self, tag: &str) -> Result<(), Error> {
        self.store.invalidate(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStore;
    use std::cell::Cell;

    fn cache() -> (TaggedCache, Arc<MemoryCacheStore>) {
        let store = Arc::new(MemoryCacheStore::new());
        (TaggedCache::new(store.clone()), store)
    }

    #[test]
    fn test_remember_computes_once() {
        let (cache, _) = cache();
        let calls = Cell::new(0);
        let produce = || {
            calls.set(calls.get() + 1);
            Ok(vec![1, 2, 3])
        };

        let tags = vec!["entity:Element".to_string()];
        assert_eq!(cache.remember("k", 60, &tags, produce).unwrap(), vec![1, 2, 3]);
        assert_eq!(cache.remember("k", 60, &tags, produce).unwrap(), vec![1, 2, 3]);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_invalidation_forces_recompute() {
        let (cache, _) = cache();
        let tags = vec!["T".to_string()];

        let first: String = cache
            .remember("k", 60, &tags, || Ok("stale".to_string()))
            .unwrap();
        assert_eq!(first, "stale");

        cache.invalidate("T").unwrap();

        let second: String = cache
            .remember("k", 60, &tags, || Ok("fresh".to_string()))
            .unwrap();
        assert_eq!(second, "fresh");
    }

    #[test]
    fn test_invalidation_during_compute_is_not_cached() {
        let (cache, store) = cache();
        let tags = vec!["T".to_string()];

        let first: String = cache
            .remember("k", 60, &tags, || {
                cache.invalidate("T")?;
                Ok("stale".to_string())
            })
            .unwrap();
        assert_eq!(first, "stale");
        assert!(store.is_empty());

        let second: String = cache
            .remember("k", 60, &tags, || Ok("fresh".to_string()))
            .unwrap();
        assert_eq!(second, "fresh");
    }

    #[test]
    fn test_corrupt_payload_is_a_miss() {
        let (cache, store) = cache();
        store
            .set("k", b"{not json".to_vec(), Duration::from_secs(60), &[])
            .unwrap();

        let value: u32 = cache.remember("k", 60, &[], || Ok(7)).unwrap();
        assert_eq!(value, 7);
        assert_eq!(store.get("k").unwrap(), Some(b"7".to_vec()));
    }

    #[test]
    fn test_producer_error_is_not_cached() {
        let (cache, store) = cache();

        let result: Result<u32, Error> =
            cache.remember("k", 60, &[], || Err(Error::DataSource("down".into())));
        assert!(matches!(result, Err(Error::DataSource(_))));
        assert!(store.is_empty());
    }
}
