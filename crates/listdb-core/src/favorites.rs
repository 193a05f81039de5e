//! Per-user favorite items.

use std::sync::Arc;

use listdb_proto::{Filter, ListQuery, OrderSpec, Value};
use tracing::info;

use crate::catalog::FAVORITE_ENTITY;
use crate::error::Error;
use crate::query::QueryEngine;
use crate::storage::{unique_key, EntityWriter};

/// Name of the unique claim guarding one favorite per `(user, item)`.
const USER_ITEM_CONSTRAINT: &str = "user_item";

/// Stores `(user, item)` favorites as `Favorite` records.
///
/// Lookups go through the query engine. Writes go through an
/// [`EntityWriter`], so every mutation invalidates the `entity:Favorite`
/// cache tag. Concurrent adds of the same pair are serialized by a
/// storage-level unique claim; the loser gets [`Error::Conflict`].
pub struct FavoritesStore {
    engine: Arc<QueryEngine>,
    writer: EntityWriter,
}

impl FavoritesStore {
    pub fn new(engine: Arc<QueryEngine>, writer: EntityWriter) -> Self {
        Self { engine, writer }
    }

    /// Id of the favorite for the pair, if any.
    pub fn exists(&self, user_id: &str, item_id: i64) -> Result<Option<i64>, Error> {
        let query = ListQuery::new(FAVORITE_ENTITY)
            .select("ID")
            .with_filter(
                Filter::new()
                    .eq("USER_ID", user_id)
                    .eq("ITEM_ID", item_id),
            )
            .with_order(OrderSpec::asc("ID"))
            .with_limit(1);

        let result = self.engine.execute(&query)?;
        Ok(result
            .rows
            .first()
            .and_then(|row| row.scalar("ID"))
            .and_then(Value::as_i64))
    }

    /// Add a favorite and return its id.
    pub fn add(&self, user_id: &str, item_id: i64) -> Result<i64, Error> {
        Self::check_user(user_id)?;
        if let Some(id) = self.exists(user_id, item_id)? {
            return Err(Self::conflict(user_id, item_id, id));
        }

        let storage = self.writer.storage();
        let id = storage.generate_id()?;
        let claim = Self::claim_key(user_id, item_id);
        if !storage.claim_unique(&claim, id)? {
            let owner = storage.unique_owner(&claim)?.unwrap_or_default();
            return Err(Self::conflict(user_id, item_id, owner));
        }

        let fields = vec![
            ("USER_ID".to_string(), Value::from(user_id)),
            ("ITEM_ID".to_string(), Value::Int64(item_id)),
        ];
        if let Err(e) = self.writer.put(FAVORITE_ENTITY, id, fields) {
            storage.release_unique(&claim)?;
            return Err(e);
        }

        info!(user_id, item_id, id, "favorite added");
        Ok(id)
    }

    /// Remove the favorite for the pair.
    pub fn delete(&self, user_id: &str, item_id: i64) -> Result<(), Error> {
        Self::check_user(user_id)?;
        let id = self.exists(user_id, item_id)?.ok_or_else(|| {
            Error::NotFound(format!("favorite of item {item_id} for user {user_id}"))
        })?;

        self.writer.delete(FAVORITE_ENTITY, id)?;
        self.writer
            .storage()
            .release_unique(&Self::claim_key(user_id, item_id))?;

        info!(user_id, item_id, id, "favorite removed");
        Ok(())
    }

    fn check_user(user_id: &str) -> Result<(), Error> {
        if user_id.is_empty() {
            return Err(Error::Validation("user id is empty".to_string()));
        }
        Ok(())
    }

    fn claim_key(user_id: &str, item_id: i64) -> Vec<u8> {
        unique_key(
            FAVORITE_ENTITY,
            USER_ITEM_CONSTRAINT,
            &[user_id, &item_id.to_string()],
        )
    }

    fn conflict(user_id: &str, item_id: i64, id: i64) -> Error {
        Error::Conflict(format!(
            "item {item_id} is already a favorite of user {user_id} (id {id})"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheStore, MemoryCacheStore};
    use crate::catalog::{Catalog, SchemaBundle};
    use crate::config::EngineConfig;
    use crate::query::StorageSource;
    use crate::storage::{StorageConfig, StorageEngine};

    fn store() -> FavoritesStore {
        let storage = Arc::new(StorageEngine::open(StorageConfig::temporary()).unwrap());
        let catalog = Arc::new(Catalog::open(storage.db()).unwrap());
        catalog
            .apply_schema(SchemaBundle::new(0).with_builtins())
            .unwrap();

        let cache: Arc<dyn CacheStore> = Arc::new(MemoryCacheStore::new());
        let source = Arc::new(StorageSource::new(storage.clone(), catalog));
        let engine = QueryEngine::new(source, EngineConfig::temporary()).with_cache(cache.clone());
        FavoritesStore::new(Arc::new(engine), EntityWriter::new(storage).with_cache(cache))
    }

    #[test]
    fn test_add_exists_delete() {
        let store = store();
        assert_eq!(store.exists("u1", 10).unwrap(), None);

        let id = store.add("u1", 10).unwrap();
        assert_eq!(store.exists("u1", 10).unwrap(), Some(id));
        assert_eq!(store.exists("u2", 10).unwrap(), None);
        assert_eq!(store.exists("u1", 11).unwrap(), None);

        store.delete("u1", 10).unwrap();
        assert_eq!(store.exists("u1", 10).unwrap(), None);

        let again = store.add("u1", 10).unwrap();
        assert_ne!(again, id);
    }

    #[test]
    fn test_duplicate_add_conflicts() {
        let store = store();
        store.add("u1", 10).unwrap();
        assert!(matches!(store.add("u1", 10), Err(Error::Conflict(_))));
    }

    #[test]
    fn test_delete_missing_is_not_found() {
        let store = store();
        assert!(matches!(store.delete("u1", 10), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_empty_user_rejected() {
        let store = store();
        assert!(matches!(store.add("", 10), Err(Error::Validation(_))));
        assert!(matches!(store.delete("", 10), Err(Error::Validation(_))));
    }

    #[test]
    fn test_racing_adds_create_one_record() {
        let store = Arc::new(store());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || store.add("u1", 42))
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let added: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(added.len(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, Error::Conflict(_))));
        assert_eq!(store.exists("u1", 42).unwrap(), Some(*added[0]));
    }
}
