//! The data-source seam the engine issues queries through.

use listdb_proto::{Filter, OrderSpec, RuntimeJoin, SelectItem};

use super::row::RawRow;
use crate::error::Error;

/// One query against a data source.
///
/// Paths in `select`, `filter` and `order` may traverse relations
/// (`TAGS.VALUE`) and runtime joins (`FAVORITES.ID`). To-many traversals
/// multiply rows, exactly as a relational join would.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceQuery {
    /// Base entity.
    pub entity: String,
    /// Projected paths; each output value is keyed by the item alias.
    pub select: Vec<SelectItem>,
    /// Row filter, evaluated per joined row.
    pub filter: Filter,
    /// Ordering, applied before DISTINCT and limit/offset.
    pub order: Vec<OrderSpec>,
    /// Maximum number of output rows.
    pub limit: Option<u64>,
    /// Output rows to skip.
    pub offset: Option<u64>,
    /// Drop duplicate projected rows.
    pub distinct: bool,
    /// Runtime joins available to paths.
    pub joins: Vec<RuntimeJoin>,
}

impl SourceQuery {
    /// Create a query selecting nothing from an entity.
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            select: vec![],
            filter: Filter::default(),
            order: vec![],
            limit: None,
            offset: None,
            distinct: false,
            joins: vec![],
        }
    }

    /// Append a select item.
    pub fn select(mut self, item: impl Into<SelectItem>) -> Self {
        self.select.push(item.into());
        self
    }

    /// Replace the select list.
    pub fn with_select(mut self, items: Vec<SelectItem>) -> Self {
        self.select = items;
        self
    }

    /// Set the filter.
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    /// Set the ordering.
    pub fn with_order(mut self, order: Vec<OrderSpec>) -> Self {
        self.order = order;
        self
    }

    /// Set limit and offset.
    pub fn with_page(mut self, limit: Option<u64>, offset: Option<u64>) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    /// Drop duplicate rows.
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Set the runtime joins.
    pub fn with_joins(mut self, joins: Vec<RuntimeJoin>) -> Self {
        self.joins = joins;
        self
    }
}

/// What a path resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathInfo {
    /// Following the path can yield several rows per base row.
    pub to_many: bool,
    /// The relation prefix of the path (`TAGS` for `TAGS.VALUE` and for
    /// `TAGS` itself), `None` for a plain field.
    pub relation: Option<String>,
    /// Entity the path ends in.
    pub target_entity: String,
    /// Identity field of `target_entity`.
    pub target_primary: String,
    /// The path names a relation rather than a field.
    pub is_relation: bool,
}

/// A queryable store of entity rows.
pub trait DataSource: Send + Sync {
    /// Execute a query.
    fn fetch(&self, query: &SourceQuery) -> Result<Vec<RawRow>, Error>;

    /// Count distinct non-null values of `path` over the rows matching the
    /// query's filter, ignoring select, order, limit and offset.
    fn count_distinct(&self, query: &SourceQuery, path: &str) -> Result<u64, Error>;

    /// Resolve a path starting at `entity`.
    fn describe(&self, entity: &str, path: &str, joins: &[RuntimeJoin]) -> Result<PathInfo, Error>;

    /// Identity field of an entity.
    fn primary_key(&self, entity: &str) -> Result<String, Error>;
}
