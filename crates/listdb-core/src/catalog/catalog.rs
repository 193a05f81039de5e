//! Catalog manager for storing and retrieving schema metadata.

use super::{EntityDef, RelationDef, SchemaBundle};
use crate::error::Error;
use parking_lot::RwLock;
use sled::{Db, Tree};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Tree name for schema bundles.
const SCHEMA_TREE: &str = "catalog:schemas";

/// Tree name for catalog metadata.
const META_TREE: &str = "catalog:meta";

/// Key for current schema version in meta tree.
const CURRENT_VERSION_KEY: &[u8] = b"current_version";

/// The catalog manager for schema metadata.
pub struct Catalog {
    /// Schema bundles tree.
    schema_tree: Tree,
    /// Metadata tree.
    meta_tree: Tree,
    /// Current schema version (cached).
    current_version: AtomicU64,
    /// Current schema (cached).
    current_schema: RwLock<Option<SchemaBundle>>,
}

impl Catalog {
    /// Open or create a catalog using the given sled database.
    pub fn open(db: &Db) -> Result<Self, Error> {
        let schema_tree = db.open_tree(SCHEMA_TREE)?;
        let meta_tree = db.open_tree(META_TREE)?;

        let current_version = match meta_tree.get(CURRENT_VERSION_KEY)? {
            Some(bytes) => {
                let buf: [u8; 8] = bytes.as_ref().try_into().map_err(|_| {
                    Error::Deserialization("invalid catalog version".to_string())
                })?;
                u64::from_be_bytes(buf)
            }
            None => 0,
        };

        let catalog = Self {
            schema_tree,
            meta_tree,
            current_version: AtomicU64::new(current_version),
            current_schema: RwLock::new(None),
        };

        if current_version > 0 {
            if let Some(schema) = catalog.schema_at_version(current_version)? {
                *catalog.current_schema.write() = Some(schema);
            }
        }

        Ok(catalog)
    }

    /// Get the current schema version.
    pub fn current_version(&self) -> u64 {
        self.current_version.load(Ordering::SeqCst)
    }

    /// Get the current schema bundle.
    pub fn current_schema(&self) -> Option<SchemaBundle> {
        self.current_schema.read().clone()
    }

    /// Get a schema bundle at a specific version.
    pub fn schema_at_version(&self, version: u64) -> Result<Option<SchemaBundle>, Error> {
        match self.schema_tree.get(version.to_be_bytes())? {
            Some(bytes) => Ok(Some(SchemaBundle::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Apply a new schema bundle.
    ///
    /// The bundle is validated and stored under the next version number,
    /// which is returned.
    pub fn apply_schema(&self, mut bundle: SchemaBundle) -> Result<u64, Error> {
        bundle.validate()?;

        let mut current = self.current_schema.write();
        let new_version = self.current_version() + 1;
        bundle.version = new_version;

        self.schema_tree
            .insert(new_version.to_be_bytes(), bundle.to_bytes()?)?;
        self.meta_tree
            .insert(CURRENT_VERSION_KEY, &new_version.to_be_bytes())?;

        self.current_version.store(new_version, Ordering::SeqCst);
        info!(
            version = new_version,
            entities = bundle.entities.len(),
            relations = bundle.relations.len(),
            "schema applied"
        );
        *current = Some(bundle);

        Ok(new_version)
    }

    /// Get an entity definition by name from the current schema.
    pub fn get_entity(&self, name: &str) -> Option<EntityDef> {
        self.current_schema
            .read()
            .as_ref()
            .and_then(|s| s.get_entity(name).cloned())
    }

    /// Get all relations where the given entity is the source.
    pub fn relations_from(&self, entity: &str) -> Vec<RelationDef> {
        self.current_schema
            .read()
            .as_ref()
            .map(|s| s.relations_from(entity).into_iter().cloned().collect())
            .unwrap_or_default()
    }

    /// List all entity names in the current schema, sorted.
    pub fn list_entities(&self) -> Vec<String> {
        self.current_schema
            .read()
            .as_ref()
            .map(|s| s.entity_names().into_iter().map(String::from).collect())
            .unwrap_or_default()
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<(), Error> {
        self.schema_tree.flush()?;
        self.meta_tree.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{FieldDef, ScalarType};

    fn sample_schema() -> SchemaBundle {
        let element = EntityDef::new("Element", "ID")
            .with_field(FieldDef::new("NAME", ScalarType::String))
            .with_field(FieldDef::new("ACTIVE", ScalarType::Bool));
        let tag = EntityDef::new("ElementTag", "ID")
            .with_field(FieldDef::new("ELEMENT_ID", ScalarType::Int64))
            .with_field(FieldDef::new("VALUE", ScalarType::String));

        SchemaBundle::new(0)
            .with_builtins()
            .with_entity(element)
            .with_entity(tag)
            .with_relation(RelationDef::one_to_many(
                "TAGS",
                "Element",
                "ID",
                "ElementTag",
                "ELEMENT_ID",
            ))
    }

    fn test_db() -> sled::Db {
        sled::Config::new().temporary(true).open().unwrap()
    }

    #[test]
    fn test_catalog_open_empty() {
        let db = test_db();
        let catalog = Catalog::open(&db).unwrap();

        assert_eq!(catalog.current_version(), 0);
        assert!(catalog.current_schema().is_none());
        assert!(catalog.list_entities().is_empty());
    }

    #[test]
    fn test_apply_schema() {
        let db = test_db();
        let catalog = Catalog::open(&db).unwrap();

        let version = catalog.apply_schema(sample_schema()).unwrap();

        assert_eq!(version, 1);
        assert_eq!(catalog.current_version(), 1);
        assert_eq!(catalog.get_entity("Element").unwrap().name, "Element");
        assert!(catalog.get_entity("NonExistent").is_none());
    }

    #[test]
    fn test_apply_invalid_schema_keeps_version() {
        let db = test_db();
        let catalog = Catalog::open(&db).unwrap();

        let broken = SchemaBundle::new(0).with_relation(RelationDef::one_to_many(
            "TAGS",
            "Element",
            "ID",
            "ElementTag",
            "ELEMENT_ID",
        ));
        assert!(catalog.apply_schema(broken).is_err());
        assert_eq!(catalog.current_version(), 0);
    }

    #[test]
    fn test_relations() {
        let db = test_db();
        let catalog = Catalog::open(&db).unwrap();
        catalog.apply_schema(sample_schema()).unwrap();

        let relations = catalog.relations_from("Element");
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].to_entity, "ElementTag");
        assert!(catalog.relations_from("ElementTag").is_empty());
    }

    #[test]
    fn test_schema_versioning() {
        let db = test_db();
        let catalog = Catalog::open(&db).unwrap();

        assert_eq!(catalog.apply_schema(sample_schema()).unwrap(), 1);

        let schema2 = sample_schema().with_entity(EntityDef::new("Section", "ID"));
        assert_eq!(catalog.apply_schema(schema2).unwrap(), 2);

        let v1 = catalog.schema_at_version(1).unwrap().unwrap();
        assert_eq!(v1.entities.len(), 5);
        let v2 = catalog.schema_at_version(2).unwrap().unwrap();
        assert_eq!(v2.entities.len(), 6);
        assert!(catalog.schema_at_version(3).unwrap().is_none());
    }

    #[test]
    fn test_persistence() {
        let dir = tempfile::tempdir().unwrap();

        {
            let db = sled::Config::new().path(dir.path()).open().unwrap();
            let catalog = Catalog::open(&db).unwrap();
            catalog.apply_schema(sample_schema()).unwrap();
            catalog.flush().unwrap();
        }

        let db = sled::Config::new().path(dir.path()).open().unwrap();
        let catalog = Catalog::open(&db).unwrap();
        assert_eq!(catalog.current_version(), 1);
        assert!(catalog.get_entity("ElementTag").is_some());
    }
}
