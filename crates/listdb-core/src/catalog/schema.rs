//! Schema bundle - versioned snapshot of the entire schema.

use super::{EntityDef, RelationDef};
use crate::error::Error;
use crate::storage::current_timestamp;
use rkyv::{Archive, Deserialize, Serialize};
use std::collections::HashMap;

/// A versioned snapshot of the entire schema.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct SchemaBundle {
    /// Schema version (monotonically increasing).
    pub version: u64,
    /// Creation timestamp (microseconds since Unix epoch).
    pub created_at: u64,
    /// Entity definitions keyed by name.
    pub entities: HashMap<String, EntityDef>,
    /// Relation definitions.
    pub relations: Vec<RelationDef>,
}

impl SchemaBundle {
    /// Create an empty schema bundle.
    pub fn new(version: u64) -> Self {
        Self {
            version,
            created_at: current_timestamp(),
            entities: HashMap::new(),
            relations: Vec::new(),
        }
    }

    /// Add an entity to the schema.
    pub fn with_entity(mut self, entity: EntityDef) -> Self {
        self.entities.insert(entity.name.clone(), entity);
        self
    }

    /// Add a relation to the schema, replacing one with the same source and name.
    pub fn with_relation(mut self, relation: RelationDef) -> Self {
        self.relations
            .retain(|r| !(r.from_entity == relation.from_entity && r.name == relation.name));
        self.relations.push(relation);
        self
    }

    /// Get an entity by name.
    pub fn get_entity(&self, name: &str) -> Option<&EntityDef> {
        self.entities.get(name)
    }

    /// Get the relation `name` starting at `entity`.
    pub fn get_relation_from(&self, entity: &str, name: &str) -> Option<&RelationDef> {
        self.relations
            .iter()
            .find(|r| r.from_entity == entity && r.name == name)
    }

    /// Get all relations for an entity (as source).
    pub fn relations_from(&self, entity: &str) -> Vec<&RelationDef> {
        self.relations
            .iter()
            .filter(|r| r.from_entity == entity)
            .collect()
    }

    /// List all entity names, sorted.
    pub fn entity_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entities.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Check that every relation connects known entities and fields.
    pub fn validate(&self) -> Result<(), Error> {
        for entity in self.entities.values() {
            if !entity.has_field(&entity.identity_field) {
                return Err(Error::unknown_field(&entity.name, &entity.identity_field));
            }
        }
        for relation in &self.relations {
            let from = self
                .get_entity(&relation.from_entity)
                .ok_or_else(|| Error::UnknownEntity(relation.from_entity.clone()))?;
            let to = self
                .get_entity(&relation.to_entity)
                .ok_or_else(|| Error::UnknownEntity(relation.to_entity.clone()))?;
            if !from.has_field(&relation.from_field) {
                return Err(Error::unknown_field(&from.name, &relation.from_field));
            }
            if !to.has_field(&relation.to_field) {
                return Err(Error::unknown_field(&to.name, &relation.to_field));
            }
            if from.has_field(&relation.name) {
                return Err(Error::Validation(format!(
                    "relation {} shadows a field of {}",
                    relation.name, from.name
                )));
            }
        }
        Ok(())
    }

    /// Serialize the schema bundle to bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|v| v.to_vec())
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize a schema bundle from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(bytes)
            .map_err(|e| Error::Deserialization(e.to_string()))
    }
}

impl Default for SchemaBundle {
    fn default() -> Self {
        Self::new(0)
    }
}
