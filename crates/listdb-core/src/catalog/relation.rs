//! Relation definitions between entities.

use rkyv::{Archive, Deserialize, Serialize};

/// Cardinality of a relation, seen from its source entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub enum Cardinality {
    /// At most one target per source, target holds the unique key.
    OneToOne,
    /// At most one target per source, source holds the foreign key.
    ManyToOne,
    /// Any number of targets per source (back-reference).
    OneToMany,
}

/// A relation definition between two entities.
///
/// Joins `from_entity.from_field = to_entity.to_field`. The relation is
/// addressed by `name` in paths starting at `from_entity` (`TAGS.VALUE`).
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct RelationDef {
    /// Relation name (unique per source entity).
    pub name: String,
    /// Source entity name.
    pub from_entity: String,
    /// Field on the source entity.
    pub from_field: String,
    /// Target entity name.
    pub to_entity: String,
    /// Field on the target entity.
    pub to_field: String,
    /// Relation cardinality.
    pub cardinality: Cardinality,
}

impl RelationDef {
    fn build(
        name: impl Into<String>,
        from_entity: impl Into<String>,
        from_field: impl Into<String>,
        to_entity: impl Into<String>,
        to_field: impl Into<String>,
        cardinality: Cardinality,
    ) -> Self {
        Self {
            name: name.into(),
            from_entity: from_entity.into(),
            from_field: from_field.into(),
            to_entity: to_entity.into(),
            to_field: to_field.into(),
            cardinality,
        }
    }

    /// Create a one-to-one relation.
    pub fn one_to_one(
        name: impl Into<String>,
        from_entity: impl Into<String>,
        from_field: impl Into<String>,
        to_entity: impl Into<String>,
        to_field: impl Into<String>,
    ) -> Self {
        Self::build(name, from_entity, from_field, to_entity, to_field, Cardinality::OneToOne)
    }

    /// Create a many-to-one relation (foreign key on the source).
    pub fn many_to_one(
        name: impl Into<String>,
        from_entity: impl Into<String>,
        from_field: impl Into<String>,
        to_entity: impl Into<String>,
        to_field: impl Into<String>,
    ) -> Self {
        Self::build(name, from_entity, from_field, to_entity, to_field, Cardinality::ManyToOne)
    }

    /// Create a one-to-many relation (foreign key on the target).
    pub fn one_to_many(
        name: impl Into<String>,
        from_entity: impl Into<String>,
        from_field: impl Into<String>,
        to_entity: impl Into<String>,
        to_field: impl Into<String>,
    ) -> Self {
        Self::build(name, from_entity, from_field, to_entity, to_field, Cardinality::OneToMany)
    }

    /// Check whether following the relation can yield several rows.
    pub fn is_to_many(&self) -> bool {
        self.cardinality == Cardinality::OneToMany
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cardinality() {
        let tags = RelationDef::one_to_many("TAGS", "Element", "ID", "ElementTag", "ELEMENT_ID");
        assert!(tags.is_to_many());

        let owner = RelationDef::many_to_one("ELEMENT", "ElementTag", "ELEMENT_ID", "Element", "ID");
        assert!(!owner.is_to_many());
        assert_eq!(owner.cardinality, Cardinality::ManyToOne);
    }
}
