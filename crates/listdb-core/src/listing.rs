//! Catalog listing pages.
//!
//! Builds the per-user catalog page: active elements with their tags, kind,
//! preview picture and favorite flag, plus the tag values of every active
//! element for client-side filter widgets.

use std::collections::BTreeSet;
use std::sync::Arc;

use listdb_proto::{
    Cell, FileRef, Filter, ListQuery, OrderSpec, ResultRow, RuntimeJoin, SelectItem, Value,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::{
    EntityDef, FieldDef, RelationDef, ScalarType, SchemaBundle, FAVORITE_ENTITY,
};
use crate::error::Error;
use crate::pagination::{self, PageMeta};
use crate::query::{QueryEngine, FILES_KEY};

/// Listed entity.
pub const ELEMENT_ENTITY: &str = "Element";

/// Tag rows of an element.
pub const ELEMENT_TAG_ENTITY: &str = "ElementTag";

/// Enumerated property of `KIND_ID`.
pub const KIND_CODE: &str = "KIND";

/// The schema the listing reads, including the built-in entities.
pub fn catalog_schema() -> SchemaBundle {
    SchemaBundle::new(0)
        .with_builtins()
        .with_entity(EntityDef::new(ELEMENT_ENTITY, "ID").with_fields([
            FieldDef::new("NAME", ScalarType::String),
            FieldDef::new("ACTIVE", ScalarType::Bool),
            FieldDef::new("DATE_CREATE", ScalarType::DateTime),
            FieldDef::new("PREVIEW_PICTURE", ScalarType::File),
            FieldDef::new("KIND_ID", ScalarType::Enum(KIND_CODE.to_string())),
        ]))
        .with_entity(EntityDef::new(ELEMENT_TAG_ENTITY, "ID").with_fields([
            FieldDef::new("ELEMENT_ID", ScalarType::Int64),
            FieldDef::new("VALUE", ScalarType::String),
            FieldDef::new("DESCRIPTION", ScalarType::String),
        ]))
        .with_relation(RelationDef::one_to_many(
            "TAGS",
            ELEMENT_ENTITY,
            "ID",
            ELEMENT_TAG_ENTITY,
            "ELEMENT_ID",
        ))
}

/// A listing page request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingRequest {
    /// User whose favorites are flagged.
    pub user_id: String,
    /// Requested 1-based page; clamped to the available pages.
    pub page: i64,
    /// Items per page; the configured page size when not positive.
    pub limit: i64,
}

/// One tag of a listed element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingTag {
    pub value: String,
    pub description: String,
}

/// A listed element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingItem {
    pub id: i64,
    pub name: String,
    pub date_create: String,
    pub tags: Vec<ListingTag>,
    pub kind: String,
    pub picture: Option<FileRef>,
    pub is_favorite: bool,
}

impl ListingItem {
    /// Build an item from a mapped listing row.
    pub fn from_row(row: &ResultRow) -> Result<Self, Error> {
        let id = row
            .scalar("ID")
            .and_then(Value::as_i64)
            .ok_or_else(|| Error::Validation("listing row has no id".to_string()))?;
        let name = text(row, "NAME");
        if name.is_empty() {
            return Err(Error::Validation(format!("element {id} has no name")));
        }

        let values = row.list("TAGS_VALUE").unwrap_or_default();
        let descriptions = row.list("TAGS_DESCRIPTION").unwrap_or_default();
        let tags = values
            .iter()
            .enumerate()
            .map(|(i, value)| ListingTag {
                value: value.as_str().unwrap_or_default().to_string(),
                description: descriptions
                    .get(i)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            })
            .collect();

        let picture = row
            .get(FILES_KEY)
            .and_then(Cell::as_files)
            .and_then(|files| files.first().cloned())
            .flatten();

        Ok(Self {
            id,
            name,
            date_create: text(row, "DATE_CREATE"),
            tags,
            kind: text(row, "KIND_ID"),
            picture,
            is_favorite: row
                .scalar("FAVORITES_ID")
                .map(|v| !v.is_null())
                .unwrap_or(false),
        })
    }
}

/// A rendered listing page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingPage {
    pub items: Vec<ListingItem>,
    pub pagination: PageMeta,
    /// Distinct tag values over all active elements, sorted.
    pub filter_candidates: Vec<String>,
}

/// Serves catalog listing pages through a [`QueryEngine`].
pub struct CatalogListing {
    engine: Arc<QueryEngine>,
}

impl CatalogListing {
    pub fn new(engine: Arc<QueryEngine>) -> Self {
        Self { engine }
    }

    /// Build the listing query for a user, without pagination.
    pub fn query(&self, user_id: &str) -> ListQuery {
        ListQuery::new(ELEMENT_ENTITY)
            .with_select(["ID", "NAME", "DATE_CREATE", "TAGS", "KIND_ID", "PREVIEW_PICTURE"])
            .select(SelectItem::aliased("FAVORITES_ID", "FAVORITES.ID"))
            .multi_valued("TAGS", ["VALUE", "DESCRIPTION"])
            .join(
                RuntimeJoin::left("FAVORITES", FAVORITE_ENTITY, "ID", "ITEM_ID")
                    .with_extra("USER_ID", user_id),
            )
            .with_relation_field("FAVORITES", "ID")
            .with_enum_field("KIND_ID", KIND_CODE)
            .with_file_field("PREVIEW_PICTURE")
            .with_filter(Filter::new().eq("ACTIVE", true))
            .with_order(OrderSpec::asc("DATE_CREATE"))
            .with_order(OrderSpec::asc("ID"))
            .with_cache_ttl(self.engine.config().default_cache_ttl)
            .with_unlimited_rows()
    }

    /// Render one page. Out-of-range pages are clamped to the nearest
    /// existing page.
    pub fn page(&self, request: &ListingRequest) -> Result<ListingPage, Error> {
        let limit = if request.limit > 0 {
            request.limit
        } else {
            i64::try_from(self.engine.config().page_size)
                .map_err(|_| Error::Validation("configured page size is too large".to_string()))?
        };
        let base = self.query(&request.user_id).with_limit(limit as u64);

        let mut page = request.page.max(1);
        let mut result = self.engine.execute(&Self::at_page(&base, limit, page))?;

        let total = i64::try_from(result.total_count).unwrap_or(i64::MAX);
        let normalized = pagination::normalize_page(page, pagination::pages_quantity(limit, total));
        if normalized != page {
            debug!(requested = page, normalized, "page clamped");
            page = normalized;
            result = self.engine.execute(&Self::at_page(&base, limit, page))?;
        }

        let items = result
            .rows
            .iter()
            .map(ListingItem::from_row)
            .collect::<Result<Vec<_>, _>>()?;

        let filter_candidates = result
            .unlimited_rows
            .iter()
            .flatten()
            .flat_map(|row| row.list("TAGS_VALUE").unwrap_or_default())
            .filter_map(Value::as_str)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        Ok(ListingPage {
            items,
            pagination: pagination::metadata(limit, total, page),
            filter_candidates,
        })
    }

    fn at_page(base: &ListQuery, limit: i64, page: i64) -> ListQuery {
        base.clone()
            .with_offset(pagination::offset(limit, page) as u64)
    }
}

fn text(row: &ResultRow, key: &str) -> String {
    row.scalar(key).map(Value::to_string).unwrap_or_default()
}
