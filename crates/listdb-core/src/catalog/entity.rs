//! Entity definitions.

use super::field::FieldDef;
use super::types::ScalarType;
use rkyv::{Archive, Deserialize, Serialize};

/// An entity definition (table schema).
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct EntityDef {
    /// Entity name (unique within schema).
    pub name: String,
    /// Name of the primary identity field.
    pub identity_field: String,
    /// Field definitions, identity field included.
    pub fields: Vec<FieldDef>,
}

impl EntityDef {
    /// Create a new entity definition with an `Int64` identity field.
    pub fn new(name: impl Into<String>, identity_field: impl Into<String>) -> Self {
        let identity_field = identity_field.into();
        Self {
            name: name.into(),
            fields: vec![FieldDef::new(identity_field.clone(), ScalarType::Int64)],
            identity_field,
        }
    }

    /// Add a field to the entity.
    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Add multiple fields.
    pub fn with_fields(mut self, fields: impl IntoIterator<Item = FieldDef>) -> Self {
        self.fields.extend(fields);
        self
    }

    /// Get a field by name.
    pub fn get_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Check whether the entity has a field.
    pub fn has_field(&self, name: &str) -> bool {
        self.get_field(name).is_some()
    }

    /// Field names in declaration order.
    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_builder() {
        let entity = EntityDef::new("Element", "ID")
            .with_field(FieldDef::new("NAME", ScalarType::String))
            .with_fields([
                FieldDef::new("ACTIVE", ScalarType::Bool),
                FieldDef::new("KIND_ID", ScalarType::Enum("KIND".into())),
            ]);

        assert_eq!(entity.field_names(), vec!["ID", "NAME", "ACTIVE", "KIND_ID"]);
        assert_eq!(
            entity.get_field("ID").map(|f| &f.field_type),
            Some(&ScalarType::Int64)
        );
        assert!(!entity.has_field("MISSING"));
    }
}
