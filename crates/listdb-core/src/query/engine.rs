//! List query execution.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use listdb_proto::{Condition, FileRef, ListQuery, Predicate, ResultRow, ResultSet, SelectItem};
use tracing::{debug, instrument};

use super::decompose::{DecomposeOptions, Decomposer};
use super::lookup::{EnumTable, FileResolver};
use super::mapper::ResultMapper;
use super::row::EntityRow;
use super::source::{DataSource, SourceQuery};
use crate::cache::{entity_tag, named_key, query_fingerprint, CacheStore, TaggedCache};
use crate::catalog::{FILE_ENTITY, PROPERTY_ENUM_ENTITY};
use crate::config::EngineConfig;
use crate::error::Error;

/// Executes [`ListQuery`]s against a data source.
///
/// Queries with multi-valued selects or runtime joins go through the
/// [`Decomposer`], as do queries that filter or order through a to-many
/// relation. All others run as a single source query. Results are cached when the query asks for it and a
/// cache store is attached.
pub struct QueryEngine {
    source: Arc<dyn DataSource>,
    cache: Option<TaggedCache>,
    config: EngineConfig,
}

impl QueryEngine {
    /// Create an engine without a cache.
    pub fn new(source: Arc<dyn DataSource>, config: EngineConfig) -> Self {
        Self {
            source,
            cache: None,
            config,
        }
    }

    /// Attach a cache store.
    pub fn with_cache(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(TaggedCache::new(store));
        self
    }

    /// Get the data source.
    pub fn source(&self) -> &dyn DataSource {
        self.source.as_ref()
    }

    /// Get the configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Get the cache, if one is attached.
    pub fn cache(&self) -> Option<&TaggedCache> {
        self.cache.as_ref()
    }

    /// Execute a list query.
    #[instrument(skip(self, query), fields(entity = %query.entity))]
    pub fn execute(&self, query: &ListQuery) -> Result<ResultSet, Error> {
        self.validate(query)?;

        match (query.cache_ttl, &self.cache) {
            (Some(ttl), Some(cache)) => {
                let key = query_fingerprint(query)?;
                let tags = self.cache_tags(query)?;
                cache.remember(&key, ttl, &tags, || self.run(query))
            }
            _ => self.run(query),
        }
    }

    /// Check a query for structural errors without running it.
    pub fn validate(&self, query: &ListQuery) -> Result<(), Error> {
        if query.select.is_empty() {
            return Err(Error::Validation("select list is empty".to_string()));
        }
        if query.limit == Some(0) {
            return Err(Error::Validation("limit must be positive".to_string()));
        }
        if self.config.require_order
            && (query.limit.is_some() || query.offset.is_some())
            && query.order.is_empty()
        {
            return Err(Error::Validation(
                "paginated queries need an explicit order".to_string(),
            ));
        }
        for field in query.multi_valued.fields.keys() {
            if !query.select.iter().any(|s| &s.alias == field) {
                return Err(Error::Validation(format!(
                    "multi-valued field {field} is not selected"
                )));
            }
        }
        Ok(())
    }

    /// Count distinct primary keys matching the query's filter.
    pub fn count(&self, query: &ListQuery) -> Result<u64, Error> {
        let pk = self.source.primary_key(&query.entity)?;
        self.count_with(query, &pk)
    }

    fn count_with(&self, query: &ListQuery, pk: &str) -> Result<u64, Error> {
        let counting = SourceQuery::new(query.entity.clone())
            .with_filter(query.filter.clone())
            .with_joins(query.joins.clone());
        self.source.count_distinct(&counting, pk)
    }

    fn run(&self, query: &ListQuery) -> Result<ResultSet, Error> {
        let pk = self.source.primary_key(&query.entity)?;

        let rows = self.fetch_rows(query, &pk)?;
        let total_count = self.count_with(query, &pk)?;
        let mut result = ResultSet {
            rows: self.map_rows(query, &pk, &rows)?,
            total_count,
            unlimited_rows: None,
        };

        if query.unlimited_rows {
            let unlimited = self.unlimited_query(query);
            let rows = self.fetch_rows(&unlimited, &pk)?;
            result.unlimited_rows = Some(self.map_rows(&unlimited, &pk, &rows)?);
        }

        debug!(
            rows = result.rows.len(),
            total = result.total_count,
            unlimited = ?result.unlimited_rows.as_ref().map(Vec::len),
            "query executed"
        );
        Ok(result)
    }

    fn fetch_rows(&self, query: &ListQuery, pk: &str) -> Result<Vec<EntityRow>, Error> {
        if self.needs_decomposition(query)? {
            return Decomposer::new(self.source.as_ref())
                .decompose(query, DecomposeOptions::default());
        }

        let mut select = vec![SelectItem::field(pk)];
        select.extend(
            query
                .select
                .iter()
                .filter(|item| !(item.alias == pk && item.path == pk))
                .cloned(),
        );
        let source_query = SourceQuery::new(query.entity.clone())
            .with_select(select)
            .with_filter(query.filter.clone())
            .with_order(query.order.clone())
            .with_page(query.limit, query.offset)
            .with_joins(query.joins.clone());

        Ok(self
            .source
            .fetch(&source_query)?
            .into_iter()
            .map(|row| EntityRow::new(row.get_or_null(pk), row))
            .collect())
    }

    fn needs_decomposition(&self, query: &ListQuery) -> Result<bool, Error> {
        // A runtime join may match several rows per parent.
        if !query.multi_valued.is_empty() || !query.joins.is_empty() {
            return Ok(true);
        }
        for path in Self::paths(query) {
            if self
                .source
                .describe(&query.entity, path, &query.joins)?
                .to_many
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn map_rows(
        &self,
        query: &ListQuery,
        pk: &str,
        rows: &[EntityRow],
    ) -> Result<Vec<ResultRow>, Error> {
        let enums = self.enum_table(query)?;
        let files = self.resolve_files(query, rows)?;

        Ok(ResultMapper::new(query, pk)
            .with_enums(&enums)
            .with_files(&files)
            .map(rows))
    }

    fn enum_table(&self, query: &ListQuery) -> Result<EnumTable, Error> {
        let codes: Vec<&str> = query
            .enum_fields
            .values()
            .map(String::as_str)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if codes.is_empty() {
            return Ok(EnumTable::default());
        }

        match &self.cache {
            Some(cache) => cache.remember(
                &named_key("enum", &codes),
                self.config.enum_cache_ttl,
                &[entity_tag(PROPERTY_ENUM_ENTITY)],
                || EnumTable::load(self.source.as_ref(), &codes),
            ),
            None => EnumTable::load(self.source.as_ref(), &codes),
        }
    }

    fn resolve_files(
        &self,
        query: &ListQuery,
        rows: &[EntityRow],
    ) -> Result<HashMap<i64, FileRef>, Error> {
        if query.file_fields.is_empty() {
            return Ok(HashMap::new());
        }
        FileResolver::new(self.source.as_ref(), &self.config.files_root)
            .resolve(&ResultMapper::file_ids(query, rows))
    }

    /// The query without pagination, forced to active rows.
    fn unlimited_query(&self, query: &ListQuery) -> ListQuery {
        let mut unlimited = query.clone();
        unlimited.filter = unlimited.filter.set(Condition::new(
            self.config.active_field.clone(),
            Predicate::Eq(self.config.active_value.clone()),
        ));
        unlimited.limit = None;
        unlimited.offset = None;
        unlimited.cache_ttl = None;
        unlimited.unlimited_rows = false;
        unlimited
    }

    /// Tags for every entity the query reads.
    fn cache_tags(&self, query: &ListQuery) -> Result<Vec<String>, Error> {
        let mut entities = BTreeSet::new();
        entities.insert(query.entity.clone());
        for join in &query.joins {
            entities.insert(join.target_entity.clone());
        }
        for path in Self::paths(query) {
            let info = self.source.describe(&query.entity, path, &query.joins)?;
            entities.insert(info.target_entity);
        }
        if !query.enum_fields.is_empty() {
            entities.insert(PROPERTY_ENUM_ENTITY.to_string());
        }
        if !query.file_fields.is_empty() {
            entities.insert(FILE_ENTITY.to_string());
        }
        Ok(entities.iter().map(|e| entity_tag(e)).collect())
    }

    fn paths(query: &ListQuery) -> impl Iterator<Item = &str> {
        query
            .select
            .iter()
            .map(|s| s.path.as_str())
            .chain(query.filter.fields())
            .chain(query.order.iter().map(|o| o.field.as_str()))
    }
}
