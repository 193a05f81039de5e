//! Wiring of the storage, catalog, cache and engine.

use std::sync::Arc;

use tracing::info;

use crate::cache::{CacheStore, MemoryCacheStore};
use crate::catalog::{Catalog, SchemaBundle};
use crate::config::EngineConfig;
use crate::error::Error;
use crate::favorites::FavoritesStore;
use crate::listing::CatalogListing;
use crate::query::{QueryEngine, StorageSource};
use crate::storage::{EntityWriter, StorageEngine};

/// An opened listdb database.
///
/// Reads go through [`ListDb::engine`]; writes go through
/// [`ListDb::writer`] so cached results of the written entity are dropped.
pub struct ListDb {
    storage: Arc<StorageEngine>,
    catalog: Arc<Catalog>,
    cache: Arc<MemoryCacheStore>,
    engine: Arc<QueryEngine>,
    writer: EntityWriter,
}

impl ListDb {
    /// Open the database described by `config`.
    pub fn open(config: EngineConfig) -> Result<Self, Error> {
        let storage = Arc::new(StorageEngine::open(config.storage.clone())?);
        let catalog = Arc::new(Catalog::open(storage.db())?);
        let cache = Arc::new(MemoryCacheStore::with_capacity(config.cache_max_entries));
        let store: Arc<dyn CacheStore> = cache.clone();

        let source = Arc::new(StorageSource::new(storage.clone(), catalog.clone()));
        let engine = Arc::new(QueryEngine::new(source, config).with_cache(store.clone()));
        let writer = EntityWriter::new(storage.clone()).with_cache(store);

        info!(
            schema_version = catalog.current_version(),
            "database opened"
        );
        Ok(Self {
            storage,
            catalog,
            cache,
            engine,
            writer,
        })
    }

    /// Install a schema and drop every cached result.
    pub fn apply_schema(&self, bundle: SchemaBundle) -> Result<u64, Error> {
        let version = self.catalog.apply_schema(bundle)?;
        self.cache.clear();
        Ok(version)
    }

    pub fn storage(&self) -> &Arc<StorageEngine> {
        &self.storage
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn cache(&self) -> &Arc<MemoryCacheStore> {
        &self.cache
    }

    pub fn engine(&self) -> &Arc<QueryEngine> {
        &self.engine
    }

    pub fn writer(&self) -> &EntityWriter {
        &self.writer
    }

    /// Favorites backed by this database.
    pub fn favorites(&self) -> FavoritesStore {
        FavoritesStore::new(self.engine.clone(), self.writer.clone())
    }

    /// Catalog listing backed by this database.
    pub fn listing(&self) -> CatalogListing {
        CatalogListing::new(self.engine.clone())
    }

    /// Flush storage and catalog to disk.
    pub fn flush(&self) -> Result<(), Error> {
        self.catalog.flush()?;
        self.storage.flush()
    }
}
