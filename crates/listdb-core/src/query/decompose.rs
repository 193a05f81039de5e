//! Decomposition of list queries over multi-valued properties.
//!
//! Selecting a to-many relation in the same query as the parent multiplies
//! parent rows, which breaks both LIMIT and the shape of the result. The
//! decomposer avoids that in up to three steps:
//!
//! 1. Fair limit: fetch the distinct primary keys of the requested page
//!    first, then fetch rows for exactly those keys.
//! 2. Separate relations: select items that traverse a back-reference are
//!    fetched by their own query per item; everything else goes into one
//!    common query.
//! 3. Merge: rows are folded through an [`IdentityMap`] keyed by primary
//!    key, so every parent appears once and related values attach to it.

use listdb_proto::{Filter, ListQuery, OrderSpec, SelectItem, Value};
use tracing::{debug, instrument};

use super::filter::FilterEvaluator;
use super::row::{EntityRow, IdentityMap, RawRow, RelatedRow, ValueKey};
use super::source::{DataSource, SourceQuery};
use crate::error::Error;

/// Alias of the primary key in relation sub-queries.
const PK_KEY: &str = "#pk";

/// Alias of the related primary key in relation sub-queries.
const ANCHOR_KEY: &str = "#anchor";

/// Decomposition switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecomposeOptions {
    /// Resolve the page as distinct primary keys before fetching rows.
    pub fair_limit: bool,
    /// Fetch back-reference select items with one query each.
    pub separate_relations: bool,
}

impl Default for DecomposeOptions {
    fn default() -> Self {
        Self {
            fair_limit: true,
            separate_relations: true,
        }
    }
}

/// A select item whose values are collected per parent.
#[derive(Debug, Clone)]
struct DividedItem {
    alias: String,
    /// Path of the related primary key.
    anchor: String,
    /// `(output key, path)` per requested sub-attribute.
    attributes: Vec<(String, String)>,
}

/// Select items split by whether they traverse a back-reference.
#[derive(Debug, Default)]
struct SplitSelect {
    common: Vec<SelectItem>,
    divided: Vec<DividedItem>,
}

/// Runs decomposed list queries against a data source.
pub struct Decomposer<'a> {
    source: &'a dyn DataSource,
}

impl<'a> Decomposer<'a> {
    /// Create a decomposer over a data source.
    pub fn new(source: &'a dyn DataSource) -> Self {
        Self { source }
    }

    /// Execute `query` and return one row per primary key, in query order.
    ///
    /// Any failing sub-query fails the whole call; partial rows are never
    /// returned.
    #[instrument(skip(self, query), fields(entity = %query.entity))]
    pub fn decompose(
        &self,
        query: &ListQuery,
        options: DecomposeOptions,
    ) -> Result<Vec<EntityRow>, Error> {
        let pk = self.source.primary_key(&query.entity)?;
        let split = self.split_select(query, &pk)?;

        let mut filter = query.filter.clone();
        let mut limit = query.limit;
        let mut offset = query.offset;

        if options.fair_limit {
            let ids_query = SourceQuery::new(query.entity.clone())
                .select(pk.as_str())
                .with_filter(filter)
                .with_order(query.order.clone())
                .with_page(limit, offset)
                .with_joins(query.joins.clone())
                .distinct();
            let ids: Vec<Value> = self
                .source
                .fetch(&ids_query)?
                .into_iter()
                .map(|row| row.get_or_null(&pk))
                .collect();

            if ids.is_empty() {
                debug!("no primary keys matched");
                return Ok(vec![]);
            }
            debug!(primaries = ids.len(), "page resolved");

            filter = Filter::new().in_list(pk.as_str(), ids);
            limit = None;
            offset = None;
        }

        let separate = options.separate_relations;

        // Common query. Without separation, divided items ride along under
        // prefixed aliases and get folded in below.
        let mut select = vec![SelectItem::field(pk.as_str())];
        select.extend(split.common.iter().cloned());
        if !separate {
            for (i, item) in split.divided.iter().enumerate() {
                select.push(SelectItem::aliased(format!("#{i}{ANCHOR_KEY}"), item.anchor.as_str()));
                for (key, path) in &item.attributes {
                    select.push(SelectItem::aliased(format!("#{i}.{key}"), path.as_str()));
                }
            }
        }

        let common_query = SourceQuery::new(query.entity.clone())
            .with_select(select)
            .with_filter(filter)
            .with_order(query.order.clone())
            .with_page(limit, offset)
            .with_joins(query.joins.clone());
        let rows = self.source.fetch(&common_query)?;
        debug!(rows = rows.len(), separate, "common query");

        let mut map = IdentityMap::new();
        for row in rows {
            let primary = row.get_or_null(&pk);
            let fields: RawRow = row
                .values
                .iter()
                .filter(|(key, _)| !key.starts_with('#'))
                .cloned()
                .collect();

            let mut entity_row = EntityRow::new(primary.clone(), fields);
            for item in &split.divided {
                entity_row.related.insert(item.alias.clone(), vec![]);
            }
            map.put(entity_row);

            if !separate {
                if let Some(target) = map.get_mut(&primary) {
                    for (i, item) in split.divided.iter().enumerate() {
                        let anchor = row.get_or_null(&format!("#{i}{ANCHOR_KEY}"));
                        if anchor.is_null() {
                            continue;
                        }
                        let values = item
                            .attributes
                            .iter()
                            .map(|(key, _)| (key.clone(), row.get_or_null(&format!("#{i}.{key}"))))
                            .collect();
                        target
                            .related
                            .entry(item.alias.clone())
                            .or_default()
                            .push(RelatedRow { anchor, values });
                    }
                }
            }
        }

        if separate && !split.divided.is_empty() && !map.is_empty() {
            let primaries = Filter::new().in_list(pk.as_str(), map.primaries());
            for item in &split.divided {
                self.fetch_divided(query, &pk, item, &primaries, &mut map)?;
            }
        }

        let mut rows = map.into_rows();
        for row in &mut rows {
            for related in row.related.values_mut() {
                related.sort_by(|a, b| FilterEvaluator::order_values(&a.anchor, &b.anchor));
                related.dedup_by(|a, b| ValueKey::from(&a.anchor) == ValueKey::from(&b.anchor));
            }
        }

        debug!(rows = rows.len(), divided = split.divided.len(), "decomposed");
        Ok(rows)
    }

    fn fetch_divided(
        &self,
        query: &ListQuery,
        pk: &str,
        item: &DividedItem,
        primaries: &Filter,
        map: &mut IdentityMap,
    ) -> Result<(), Error> {
        let mut select = vec![
            SelectItem::aliased(PK_KEY, pk),
            SelectItem::aliased(ANCHOR_KEY, item.anchor.as_str()),
        ];
        select.extend(
            item.attributes
                .iter()
                .map(|(key, path)| SelectItem::aliased(key.as_str(), path.as_str())),
        );

        let sub_query = SourceQuery::new(query.entity.clone())
            .with_select(select)
            .with_filter(primaries.clone())
            .with_order(vec![OrderSpec::asc(pk), OrderSpec::asc(item.anchor.as_str())])
            .with_joins(query.joins.clone());
        let rows = self.source.fetch(&sub_query)?;
        debug!(alias = %item.alias, rows = rows.len(), "relation query");

        for row in rows {
            let anchor = row.get_or_null(ANCHOR_KEY);
            if anchor.is_null() {
                continue;
            }
            let Some(target) = map.get_mut(&row.get_or_null(PK_KEY)) else {
                continue;
            };
            let values = item
                .attributes
                .iter()
                .map(|(key, _)| (key.clone(), row.get_or_null(key)))
                .collect();
            target
                .related
                .entry(item.alias.clone())
                .or_default()
                .push(RelatedRow { anchor, values });
        }
        Ok(())
    }

    /// Describe each select item and split off the ones that traverse a
    /// back-reference or are declared multi-valued.
    fn split_select(&self, query: &ListQuery, pk: &str) -> Result<SplitSelect, Error> {
        let mut split = SplitSelect::default();

        for item in &query.select {
            if item.alias == pk && item.path == pk {
                continue;
            }

            let info = self
                .source
                .describe(&query.entity, &item.path, &query.joins)?;
            let declared = query.multi_valued.attributes(&item.alias);

            if !info.to_many && declared.is_none() {
                if info.is_relation {
                    return Err(Error::Validation(format!(
                        "relation {} is selected without a field",
                        item.path
                    )));
                }
                split.common.push(item.clone());
                continue;
            }

            let relation = match &info.relation {
                Some(relation) => relation.clone(),
                None => {
                    return Err(Error::Validation(format!(
                        "{} is declared multi-valued but is a plain field",
                        item.alias
                    )))
                }
            };

            let attributes = match declared {
                Some(attrs) => attrs
                    .iter()
                    .map(|attr| (attr.clone(), format!("{relation}.{attr}")))
                    .collect(),
                None if info.is_relation => {
                    return Err(Error::Validation(format!(
                        "relation {} is selected without attributes",
                        item.path
                    )))
                }
                None => vec![(item.alias.clone(), item.path.clone())],
            };

            split.divided.push(DividedItem {
                alias: item.alias.clone(),
                anchor: format!("{relation}.{}", info.target_primary),
                attributes,
            });
        }

        Ok(split)
    }
}
