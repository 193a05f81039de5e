//! listdb core - paginated list queries over multi-valued properties.
//!
//! This crate provides the catalog, sled storage, query engine with
//! multi-valued decomposition, tag-invalidated result cache, and the
//! favorites, listing and batch services built on them.

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod batch;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod favorites;
pub mod listing;
pub mod pagination;
pub mod query;
pub mod storage;

pub use batch::{BatchJob, BatchRunner, BatchStep, PageOutcome, QueryExportJob};
pub use cache::{CacheStats, CacheStore, MemoryCacheStore, TaggedCache};
pub use catalog::{
    Cardinality, Catalog, EntityDef, FieldDef, RelationDef, ScalarType, SchemaBundle,
};
pub use config::EngineConfig;
pub use db::ListDb;
pub use error::Error;
pub use favorites::FavoritesStore;
pub use listing::{catalog_schema, CatalogListing, ListingItem, ListingPage, ListingRequest};
pub use pagination::PageMeta;
pub use query::{DataSource, DecomposeOptions, Decomposer, QueryEngine, StorageSource};
pub use storage::{EntityWriter, Record, StorageConfig, StorageEngine};

/// Re-export protocol types.
pub use listdb_proto as proto;
