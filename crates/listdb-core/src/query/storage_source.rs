//! `DataSource` implementation over the sled record store.
//!
//! Every path referenced by a query becomes a join node. Joins are hash
//! joins: the child entity is scanned once and indexed by its join field
//! (build), then each joined row looks up its matches (probe). Catalog
//! relations and runtime joins expand as left joins unless a runtime join
//! asks for inner semantics.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use listdb_proto::{JoinType, OrderDirection, RuntimeJoin, Value};
use tracing::debug;

use super::filter::FilterEvaluator;
use super::row::{RawRow, ValueKey};
use super::source::{DataSource, PathInfo, SourceQuery};
use crate::catalog::{Catalog, EntityDef, SchemaBundle};
use crate::error::Error;
use crate::storage::StorageEngine;

/// Field values of one stored record, identity field included.
type FieldMap = HashMap<String, Value>;

/// A joined row: for each join node, the index of the matched record in
/// that node's table, `None` where a left join found nothing.
type JoinedRow = Vec<Option<usize>>;

/// How a path segment links one entity to the next.
#[derive(Debug, Clone)]
struct Link {
    entity: String,
    parent_field: String,
    child_field: String,
    inner: bool,
    extra: Option<(String, Value)>,
    to_many: bool,
}

/// A joined entity reached through a path prefix.
#[derive(Debug)]
struct JoinNode {
    entity: String,
    /// Node the link starts from; unused for the root.
    parent: usize,
    link: Option<Link>,
}

/// Join nodes for the paths of one query. Node 0 is the base entity;
/// parents always precede their children.
#[derive(Debug)]
struct JoinPlan {
    nodes: Vec<JoinNode>,
    by_prefix: HashMap<String, usize>,
    /// Resolved `path -> (node, field)`.
    paths: HashMap<String, (usize, String)>,
}

/// Record store as a relational data source.
pub struct StorageSource {
    storage: Arc<StorageEngine>,
    catalog: Arc<Catalog>,
}

impl StorageSource {
    /// Create a data source over a storage engine and its catalog.
    pub fn new(storage: Arc<StorageEngine>, catalog: Arc<Catalog>) -> Self {
        Self { storage, catalog }
    }

    fn schema(&self) -> Result<SchemaBundle, Error> {
        self.catalog
            .current_schema()
            .ok_or_else(|| Error::Validation("no schema applied".to_string()))
    }

    /// Resolve a relation or runtime join named `name` on `entity`.
    fn link(
        schema: &SchemaBundle,
        entity: &EntityDef,
        name: &str,
        joins: &[RuntimeJoin],
        at_root: bool,
    ) -> Result<Option<Link>, Error> {
        if at_root {
            if let Some(join) = joins.iter().find(|j| j.name == name) {
                let target = schema
                    .get_entity(&join.target_entity)
                    .ok_or_else(|| Error::UnknownEntity(join.target_entity.clone()))?;
                if !entity.has_field(&join.source_field) {
                    return Err(Error::unknown_field(&entity.name, &join.source_field));
                }
                if !target.has_field(&join.target_field) {
                    return Err(Error::unknown_field(&target.name, &join.target_field));
                }
                return Ok(Some(Link {
                    entity: join.target_entity.clone(),
                    parent_field: join.source_field.clone(),
                    child_field: join.target_field.clone(),
                    inner: join.join_type == JoinType::Inner,
                    extra: join.extra.clone(),
                    to_many: false,
                }));
            }
        }

        Ok(schema
            .get_relation_from(&entity.name, name)
            .map(|relation| Link {
                entity: relation.to_entity.clone(),
                parent_field: relation.from_field.clone(),
                child_field: relation.to_field.clone(),
                inner: false,
                extra: None,
                to_many: relation.is_to_many(),
            }))
    }

    fn entity<'s>(schema: &'s SchemaBundle, name: &str) -> Result<&'s EntityDef, Error> {
        schema
            .get_entity(name)
            .ok_or_else(|| Error::UnknownEntity(name.to_string()))
    }

    fn plan(schema: &SchemaBundle, query: &SourceQuery) -> Result<JoinPlan, Error> {
        Self::entity(schema, &query.entity)?;

        let mut plan = JoinPlan {
            nodes: vec![JoinNode {
                entity: query.entity.clone(),
                parent: 0,
                link: None,
            }],
            by_prefix: HashMap::new(),
            paths: HashMap::new(),
        };

        let paths = query
            .select
            .iter()
            .map(|s| s.path.as_str())
            .chain(query.filter.fields())
            .chain(query.order.iter().map(|o| o.field.as_str()));

        for path in paths {
            if plan.paths.contains_key(path) {
                continue;
            }
            let resolved = Self::resolve_path(schema, &mut plan, path, &query.joins)?;
            plan.paths.insert(path.to_string(), resolved);
        }

        Ok(plan)
    }

    fn resolve_path(
        schema: &SchemaBundle,
        plan: &mut JoinPlan,
        path: &str,
        joins: &[RuntimeJoin],
    ) -> Result<(usize, String), Error> {
        let segments: Vec<&str> = path.split('.').collect();
        let (field, relations) = match segments.split_last() {
            Some((field, relations)) if !field.is_empty() => (*field, relations),
            _ => return Err(Error::Validation(format!("empty path segment in {path:?}"))),
        };

        let mut node = 0;
        for (depth, name) in relations.iter().enumerate() {
            let prefix = segments[..=depth].join(".");
            if let Some(&existing) = plan.by_prefix.get(&prefix) {
                node = existing;
                continue;
            }

            let entity = Self::entity(schema, &plan.nodes[node].entity)?;
            let link = Self::link(schema, entity, name, joins, node == 0)?
                .ok_or_else(|| Error::unknown_field(&entity.name, name))?;

            plan.nodes.push(JoinNode {
                entity: link.entity.clone(),
                parent: node,
                link: Some(link),
            });
            node = plan.nodes.len() - 1;
            plan.by_prefix.insert(prefix, node);
        }

        let entity = Self::entity(schema, &plan.nodes[node].entity)?;
        if !entity.has_field(field) {
            if Self::link(schema, entity, field, joins, node == 0)?.is_some() {
                return Err(Error::Validation(format!(
                    "relation path {path:?} must name a field of the related entity"
                )));
            }
            return Err(Error::unknown_field(&entity.name, field));
        }

        Ok((node, field.to_string()))
    }

    fn load_table(&self, entity: &EntityDef) -> Result<Vec<FieldMap>, Error> {
        let mut rows = Vec::new();
        for item in self.storage.scan(&entity.name)? {
            let (id, record) = item?;
            let mut fields: FieldMap = record
                .fields
                .into_iter()
                .map(|f| (f.name, f.value))
                .collect();
            fields.insert(entity.identity_field.clone(), Value::Int64(id));
            rows.push(fields);
        }
        Ok(rows)
    }

    /// Expand the base table through every join node, then filter.
    fn joined_rows(
        &self,
        schema: &SchemaBundle,
        plan: &JoinPlan,
        query: &SourceQuery,
    ) -> Result<(Vec<Vec<FieldMap>>, Vec<JoinedRow>), Error> {
        let mut tables: Vec<Vec<FieldMap>> = Vec::with_capacity(plan.nodes.len());
        let mut loaded: HashMap<&str, usize> = HashMap::new();
        for node in &plan.nodes {
            // Tables are per node; nodes on the same entity share a scan.
            let table = match loaded.get(node.entity.as_str()) {
                Some(&index) => tables[index].clone(),
                None => self.load_table(Self::entity(schema, &node.entity)?)?,
            };
            loaded.entry(node.entity.as_str()).or_insert(tables.len());
            tables.push(table);
        }

        let width = plan.nodes.len();
        let mut rows: Vec<JoinedRow> = (0..tables[0].len())
            .map(|i| {
                let mut row = vec![None; width];
                row[0] = Some(i);
                row
            })
            .collect();

        for (index, node) in plan.nodes.iter().enumerate().skip(1) {
            let Some(link) = &node.link else { continue };

            // Build: child join value -> matching child rows, in id order.
            let mut build: HashMap<ValueKey, Vec<usize>> = HashMap::new();
            for (i, child) in tables[index].iter().enumerate() {
                if let Some((field, expected)) = &link.extra {
                    let actual = child.get(field).unwrap_or(&Value::Null);
                    if !FilterEvaluator::values_equal(actual, expected) {
                        continue;
                    }
                }
                match child.get(&link.child_field) {
                    Some(value) if !value.is_null() => {
                        build.entry(ValueKey::from(value)).or_default().push(i)
                    }
                    _ => {}
                }
            }

            // Probe.
            let mut expanded = Vec::with_capacity(rows.len());
            for row in rows {
                let key = row[node.parent]
                    .and_then(|p| tables[node.parent][p].get(&link.parent_field))
                    .filter(|v| !v.is_null())
                    .map(ValueKey::from);
                match key.as_ref().and_then(|k| build.get(k)) {
                    Some(matches) => {
                        for &m in matches {
                            let mut joined = row.clone();
                            joined[index] = Some(m);
                            expanded.push(joined);
                        }
                    }
                    None if link.inner => {}
                    None => expanded.push(row),
                }
            }
            rows = expanded;
        }

        let scanned = rows.len();
        rows.retain(|row| {
            FilterEvaluator::evaluate(&query.filter, |path| {
                Self::value(plan, &tables, row, path)
            })
        });
        debug!(
            entity = %query.entity,
            nodes = width,
            joined = scanned,
            matched = rows.len(),
            "rows joined"
        );

        Ok((tables, rows))
    }

    fn value(plan: &JoinPlan, tables: &[Vec<FieldMap>], row: &JoinedRow, path: &str) -> Value {
        plan.paths
            .get(path)
            .and_then(|(node, field)| {
                row[*node].and_then(|i| tables[*node][i].get(field)).cloned()
            })
            .unwrap_or(Value::Null)
    }
}

impl DataSource for StorageSource {
    fn fetch(&self, query: &SourceQuery) -> Result<Vec<RawRow>, Error> {
        let schema = self.schema()?;
        let plan = Self::plan(&schema, query)?;
        let (tables, mut rows) = self.joined_rows(&schema, &plan, query)?;

        if !query.order.is_empty() {
            rows.sort_by(|a, b| {
                for order in &query.order {
                    let ordering = FilterEvaluator::order_values(
                        &Self::value(&plan, &tables, a, &order.field),
                        &Self::value(&plan, &tables, b, &order.field),
                    );
                    let ordering = match order.direction {
                        OrderDirection::Asc => ordering,
                        OrderDirection::Desc => ordering.reverse(),
                    };
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            });
        }

        let projected = rows.iter().map(|row| {
            query
                .select
                .iter()
                .map(|item| (item.alias.clone(), Self::value(&plan, &tables, row, &item.path)))
                .collect::<RawRow>()
        });

        let mut seen = HashSet::new();
        let result: Vec<RawRow> = projected
            .filter(|row| {
                !query.distinct
                    || seen.insert(
                        row.values
                            .iter()
                            .map(|(_, v)| ValueKey::from(v))
                            .collect::<Vec<_>>(),
                    )
            })
            .skip(query.offset.unwrap_or(0) as usize)
            .take(query.limit.map(|l| l as usize).unwrap_or(usize::MAX))
            .collect();

        debug!(
            entity = %query.entity,
            distinct = query.distinct,
            limit = ?query.limit,
            offset = ?query.offset,
            rows = result.len(),
            "source query"
        );
        Ok(result)
    }

    fn count_distinct(&self, query: &SourceQuery, path: &str) -> Result<u64, Error> {
        let schema = self.schema()?;
        let counting = SourceQuery::new(query.entity.clone())
            .select(path)
            .with_filter(query.filter.clone())
            .with_joins(query.joins.clone());
        let plan = Self::plan(&schema, &counting)?;
        let (tables, rows) = self.joined_rows(&schema, &plan, &counting)?;

        let distinct: HashSet<ValueKey> = rows
            .iter()
            .map(|row| Self::value(&plan, &tables, row, path))
            .filter(|v| !v.is_null())
            .map(|v| ValueKey::from(&v))
            .collect();
        Ok(distinct.len() as u64)
    }

    fn describe(&self, entity: &str, path: &str, joins: &[RuntimeJoin]) -> Result<PathInfo, Error> {
        let schema = self.schema()?;
        let segments: Vec<&str> = path.split('.').collect();

        let mut current = Self::entity(&schema, entity)?;
        let mut to_many = false;
        let mut relation = None;

        for (depth, name) in segments.iter().enumerate() {
            let last = depth + 1 == segments.len();
            if last && current.has_field(name) {
                return Ok(PathInfo {
                    to_many,
                    relation,
                    target_entity: current.name.clone(),
                    target_primary: current.identity_field.clone(),
                    is_relation: false,
                });
            }

            let link = Self::link(&schema, current, name, joins, depth == 0)?
                .ok_or_else(|| Error::unknown_field(&current.name, name))?;
            to_many |= link.to_many;
            relation = Some(segments[..=depth].join("."));
            current = Self::entity(&schema, &link.entity)?;
        }

        Ok(PathInfo {
            to_many,
            relation,
            target_entity: current.name.clone(),
            target_primary: current.identity_field.clone(),
            is_relation: true,
        })
    }

    fn primary_key(&self, entity: &str) -> Result<String, Error> {
        let schema = self.schema()?;
        Ok(Self::entity(&schema, entity)?.identity_field.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{FieldDef, RelationDef, ScalarType};
    use crate::storage::StorageConfig;
    use listdb_proto::{Filter, OrderSpec, SelectItem};

    struct TestContext {
        source: StorageSource,
        storage: Arc<StorageEngine>,
    }

    impl TestContext {
        fn new() -> Self {
            let storage = Arc::new(StorageEngine::open(StorageConfig::temporary()).unwrap());
            let catalog = Arc::new(Catalog::open(storage.db()).unwrap());
            let element = EntityDef::new("Element", "ID").with_fields([
                FieldDef::new("NAME", ScalarType::String),
                FieldDef::new("ACTIVE", ScalarType::Bool),
                FieldDef::new("SORT", ScalarType::Int64),
            ]);
            let tag = EntityDef::new("ElementTag", "ID").with_fields([
                FieldDef::new("ELEMENT_ID", ScalarType::Int64),
                FieldDef::new("VALUE", ScalarType::String),
            ]);
            catalog
                .apply_schema(
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
                        )),
                )
                .unwrap();

            Self {
                source: StorageSource::new(storage.clone(), catalog),
                storage,
            }
        }

        fn element(&self, id: i64, name: &str, sort: i64, tags: &[(i64, &str)]) {
            self.storage
                .put(
                    "Element",
                    id,
                    vec![
                        ("NAME".into(), name.into()),
                        ("ACTIVE".into(), true.into()),
                        ("SORT".into(), sort.into()),
                    ],
                )
                .unwrap();
            for (tag_id, value) in tags {
                self.storage
                    .put(
                        "ElementTag",
                        *tag_id,
                        vec![("ELEMENT_ID".into(), id.into()), ("VALUE".into(), (*value).into())],
                    )
                    .unwrap();
            }
        }
    }

    fn ids(rows: &[RawRow]) -> Vec<Value> {
        rows.iter().map(|r| r.get_or_null("ID")).collect()
    }

    #[test]
    fn test_to_many_join_fans_out() {
        let ctx = TestContext::new();
        ctx.element(1, "a", 10, &[(11, "x"), (12, "y")]);
        ctx.element(2, "b", 20, &[]);

        let rows = ctx
            .source
            .fetch(
                &SourceQuery::new("Element")
                    .select("ID")
                    .select(SelectItem::aliased("TAG", "TAGS.VALUE")),
            )
            .unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(ids(&rows), vec![1.into(), 1.into(), 2.into()]);
        assert_eq!(rows[1].get("TAG"), Some(&Value::from("y")));
        assert_eq!(rows[2].get("TAG"), Some(&Value::Null));
    }

    #[test]
    fn test_distinct_order_and_page() {
        let ctx = TestContext::new();
        ctx.element(1, "a", 30, &[(11, "x"), (12, "y")]);
        ctx.element(2, "b", 10, &[(13, "x")]);
        ctx.element(3, "c", 20, &[(14, "z")]);

        let query = SourceQuery::new("Element")
            .select("ID")
            .with_filter(Filter::new().not_null("TAGS.VALUE"))
            .with_order(vec![OrderSpec::desc("SORT")])
            .distinct();

        let all = ctx.source.fetch(&query).unwrap();
        assert_eq!(ids(&all), vec![1.into(), 3.into(), 2.into()]);

        let page = ctx
            .source
            .fetch(&query.clone().with_page(Some(1), Some(1)))
            .unwrap();
        assert_eq!(ids(&page), vec![3.into()]);

        let count = ctx.source.count_distinct(&query, "ID").unwrap();
        assert_eq!(count, 3);
    }

    #[test]
    fn test_runtime_join_with_extra_condition() {
        let ctx = TestContext::new();
        ctx.element(1, "a", 10, &[]);
        ctx.element(2, "b", 20, &[]);
        ctx.storage
            .put(
                "Favorite",
                100,
                vec![("USER_ID".into(), "u1".into()), ("ITEM_ID".into(), 2.into())],
            )
            .unwrap();
        ctx.storage
            .put(
                "Favorite",
                101,
                vec![("USER_ID".into(), "u2".into()), ("ITEM_ID".into(), 1.into())],
            )
            .unwrap();

        let join = RuntimeJoin::left("FAVORITES", "Favorite", "ID", "ITEM_ID").with_extra("USER_ID", "u1");
        let query = SourceQuery::new("Element")
            .select("ID")
            .select(SelectItem::aliased("FAVORITES_ID", "FAVORITES.ID"))
            .with_joins(vec![join.clone()]);

        let rows = ctx.source.fetch(&query).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("FAVORITES_ID"), Some(&Value::Null));
        assert_eq!(rows[1].get("FAVORITES_ID"), Some(&Value::Int64(100)));

        let inner = RuntimeJoin {
            join_type: JoinType::Inner,
            ..join
        };
        let rows = ctx.source.fetch(&query.with_joins(vec![inner])).unwrap();
        assert_eq!(ids(&rows), vec![2.into()]);
    }

    #[test]
    fn test_describe() {
        let ctx = TestContext::new();
        let joins = vec![RuntimeJoin::left("FAVORITES", "Favorite", "ID", "ITEM_ID")];

        let name = ctx.source.describe("Element", "NAME", &joins).unwrap();
        assert!(!name.to_many);
        assert_eq!(name.relation, None);

        let tags = ctx.source.describe("Element", "TAGS", &joins).unwrap();
        assert!(tags.to_many);
        assert!(tags.is_relation);
        assert_eq!(tags.relation.as_deref(), Some("TAGS"));
        assert_eq!(tags.target_entity, "ElementTag");
        assert_eq!(tags.target_primary, "ID");

        let value = ctx.source.describe("Element", "TAGS.VALUE", &joins).unwrap();
        assert!(value.to_many);
        assert!(!value.is_relation);

        let favorite = ctx.source.describe("Element", "FAVORITES.ID", &joins).unwrap();
        assert!(!favorite.to_many);
        assert_eq!(favorite.target_entity, "Favorite");

        assert!(matches!(
            ctx.source.describe("Element", "MISSING", &joins),
            Err(Error::UnknownField { .. })
        ));
    }

    #[test]
    fn test_unknown_paths_rejected() {
        let ctx = TestContext::new();

        assert!(matches!(
            ctx.source.fetch(&SourceQuery::new("Missing").select("ID")),
            Err(Error::UnknownEntity(_))
        ));
        assert!(matches!(
            ctx.source.fetch(&SourceQuery::new("Element").select("TAGS")),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            ctx.source.fetch(&SourceQuery::new("Element").select("TAGS.MISSING")),
            Err(Error::UnknownField { .. })
        ));
    }
}
