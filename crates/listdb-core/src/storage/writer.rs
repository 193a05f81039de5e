//! Tag-aware write path.

use std::sync::Arc;

use tracing::warn;

use super::StorageEngine;
use crate::cache::{entity_tag, CacheStore};
use crate::error::Error;
use listdb_proto::Value;

/// Wraps storage writes and drops cached results that depend on the
/// written entity.
///
/// Every successful mutation invalidates the `entity:<name>` tag. A failed
/// invalidation is logged and does not fail the write.
#[derive(Clone)]
pub struct EntityWriter {
    storage: Arc<StorageEngine>,
    cache: Option<Arc<dyn CacheStore>>,
}

impl EntityWriter {
    /// Create a writer without a cache.
    pub fn new(storage: Arc<StorageEngine>) -> Self {
        Self {
            storage,
            cache: None,
        }
    }

    /// Invalidate tags in the given cache store after writes.
    pub fn with_cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Get the underlying storage.
    pub fn storage(&self) -> &Arc<StorageEngine> {
        &self.storage
    }

    /// Insert a record under a fresh id.
    pub fn insert(&self, entity: &str, fields: Vec<(String, Value)>) -> Result<i64, Error> {
        let id = self.storage.insert(entity, fields)?;
        self.invalidate(entity);
        Ok(id)
    }

    /// Write a record under the given id.
    pub fn put(&self, entity: &str, id: i64, fields: Vec<(String, Value)>) -> Result<(), Error> {
        self.storage.put(entity, id, fields)?;
        self.invalidate(entity);
        Ok(())
    }

    /// Delete a record.
    pub fn delete(&self, entity: &str, id: i64) -> Result<bool, Error> {
        let removed = self.storage.delete(entity, id)?;
        if removed {
            self.invalidate(entity);
        }
        Ok(removed)
    }

    fn invalidate(&self, entity: &str) {
        if let Some(cache) = &self.cache {
            let tag = entity_tag(entity);
            if let Err(e) = cache.invalidate(&tag) {
                warn!(tag = %tag, error = %e, "cache invalidation failed");
            }
        }
    }
}
