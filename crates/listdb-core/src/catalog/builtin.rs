//! Entities every listdb schema carries.

use super::{EntityDef, FieldDef, ScalarType, SchemaBundle};

/// File attachments referenced by `File`-typed fields.
pub const FILE_ENTITY: &str = "File";

/// Enumerated property values referenced by `Enum`-typed fields.
pub const PROPERTY_ENUM_ENTITY: &str = "PropertyEnum";

/// User favorites.
pub const FAVORITE_ENTITY: &str = "Favorite";

/// `File`: `{ID, SUBDIR, FILE_NAME, DESCRIPTION}`.
pub fn file_entity() -> EntityDef {
    EntityDef::new(FILE_ENTITY, "ID").with_fields([
        FieldDef::new("SUBDIR", ScalarType::String),
        FieldDef::new("FILE_NAME", ScalarType::String),
        FieldDef::new("DESCRIPTION", ScalarType::String),
    ])
}

/// `PropertyEnum`: `{ID, PROPERTY_CODE, VALUE, XML_ID}`.
pub fn property_enum_entity() -> EntityDef {
    EntityDef::new(PROPERTY_ENUM_ENTITY, "ID").with_fields([
        FieldDef::new("PROPERTY_CODE", ScalarType::String),
        FieldDef::new("VALUE", ScalarType::String),
        FieldDef::new("XML_ID", ScalarType::String),
    ])
}

/// `Favorite`: `{ID, USER_ID, ITEM_ID}`.
pub fn favorite_entity() -> EntityDef {
    EntityDef::new(FAVORITE_ENTITY, "ID").with_fields([
        FieldDef::new("USER_ID", ScalarType::String),
        FieldDef::new("ITEM_ID", ScalarType::Int64),
    ])
}

impl SchemaBundle {
    /// Add the built-in entities.
    pub fn with_builtins(self) -> Self {
        self.with_entity(file_entity())
            .with_entity(property_enum_entity())
            .with_entity(favorite_entity())
    }
}
