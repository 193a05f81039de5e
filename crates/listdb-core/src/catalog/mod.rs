//! Semantic catalog for listdb.
//!
//! The catalog stores entity and relation metadata as versioned schema
//! bundles. Paths in queries (`TAGS.VALUE`) are resolved against it.

mod builtin;
mod catalog;
mod entity;
mod field;
mod relation;
mod schema;
mod types;

pub use builtin::{
    favorite_entity, file_entity, property_enum_entity, FAVORITE_ENTITY, FILE_ENTITY,
    PROPERTY_ENUM_ENTITY,
};
pub use catalog::Catalog;
pub use entity::EntityDef;
pub use field::FieldDef;
pub use relation::{Cardinality, RelationDef};
pub use schema::SchemaBundle;
pub use types::ScalarType;
