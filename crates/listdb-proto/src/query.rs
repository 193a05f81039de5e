//! Query IR types for paginated list queries.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::value::Value;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderDirection {
    /// Ascending order.
    Asc,
    /// Descending order.
    Desc,
}

/// A single ordering key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSpec {
    /// Field path to order by.
    pub field: String,
    /// Sort direction.
    pub direction: OrderDirection,
}

impl OrderSpec {
    /// Create ascending order.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Asc,
        }
    }

    /// Create descending order.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Desc,
        }
    }
}

/// The test applied by a single filter condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    /// Field equals the value.
    Eq(Value),
    /// Field is less than the value.
    Lt(Value),
    /// Field is less than or equal to the value.
    Le(Value),
    /// Field is greater than the value.
    Gt(Value),
    /// Field is greater than or equal to the value.
    Ge(Value),
    /// SQL LIKE pattern (`%` any run, `_` one char).
    Like(String),
    /// Field equals one of the values.
    In(Vec<Value>),
    /// Field is null or absent.
    IsNull,
}

impl Predicate {
    fn name(&self) -> &'static str {
        match self {
            Predicate::Eq(_) => "eq",
            Predicate::Lt(_) => "lt",
            Predicate::Le(_) => "le",
            Predicate::Gt(_) => "gt",
            Predicate::Ge(_) => "ge",
            Predicate::Like(_) => "like",
            Predicate::In(_) => "in",
            Predicate::IsNull => "is_null",
        }
    }
}

/// One filter condition on a field path, optionally negated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Field path (`NAME`, `TAGS.VALUE`, `FAVORITES.ID`).
    pub field: String,
    /// The test to apply.
    pub predicate: Predicate,
    /// Invert the result of the predicate.
    pub negated: bool,
}

impl Condition {
    /// Create a positive condition.
    pub fn new(field: impl Into<String>, predicate: Predicate) -> Self {
        Self {
            field: field.into(),
            predicate,
            negated: false,
        }
    }

    /// Create a negated condition.
    pub fn not(field: impl Into<String>, predicate: Predicate) -> Self {
        Self {
            field: field.into(),
            predicate,
            negated: true,
        }
    }

    /// Short label used in logs and fingerprints.
    pub fn label(&self) -> String {
        if self.negated {
            format!("!{}:{}", self.predicate.name(), self.field)
        } else {
            format!("{}:{}", self.predicate.name(), self.field)
        }
    }
}

/// The right-hand side of a keyed filter entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A single value; `Null` means "is null".
    Scalar(Value),
    /// A list of values; turns equality into membership.
    List(Vec<Value>),
}

macro_rules! scalar_operand {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Operand {
                fn from(v: $t) -> Self {
                    Operand::Scalar(v.into())
                }
            }
        )*
    };
}

scalar_operand!(Value, bool, i32, i64, u64, f64, String, &str);

impl From<Vec<Value>> for Operand {
    fn from(values: Vec<Value>) -> Self {
        Operand::List(values)
    }
}

impl Operand {
    fn kind(&self) -> &'static str {
        match self {
            Operand::Scalar(Value::Null) => "null",
            Operand::Scalar(_) => "scalar",
            Operand::List(_) => "list",
        }
    }
}

/// An AND-combined set of conditions.
///
/// Conditions can be added with the typed builders or from prefixed keys
/// (`"!FIELD"`, `">=FIELD"`, `"%FIELD"`) via [`Filter::entry`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// Conditions, all of which must hold.
    pub conditions: Vec<Condition>,
}

impl Filter {
    /// Create an empty filter (matches everything).
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether the filter has no conditions.
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Add a condition.
    pub fn with(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Replace every condition on `condition.field` with `condition`.
    pub fn set(mut self, condition: Condition) -> Self {
        self.conditions.retain(|c| c.field != condition.field);
        self.conditions.push(condition);
        self
    }

    /// Append all conditions of another filter.
    pub fn and(mut self, other: Filter) -> Self {
        self.conditions.extend(other.conditions);
        self
    }

    /// Field equals value.
    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(Condition::new(field, Predicate::Eq(value.into())))
    }

    /// Field does not equal value.
    pub fn ne(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(Condition::not(field, Predicate::Eq(value.into())))
    }

    /// Field is less than value.
    pub fn lt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(Condition::new(field, Predicate::Lt(value.into())))
    }

    /// Field is less than or equal to value.
    pub fn le(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(Condition::new(field, Predicate::Le(value.into())))
    }

    /// Field is greater than value.
    pub fn gt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(Condition::new(field, Predicate::Gt(value.into())))
    }

    /// Field is greater than or equal to value.
    pub fn ge(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(Condition::new(field, Predicate::Ge(value.into())))
    }

    /// Field matches a LIKE pattern.
    pub fn like(self, field: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.with(Condition::new(field, Predicate::Like(pattern.into())))
    }

    /// Field is one of the values.
    pub fn in_list(self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.with(Condition::new(field, Predicate::In(values)))
    }

    /// Field is none of the values.
    pub fn not_in(self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.with(Condition::not(field, Predicate::In(values)))
    }

    /// Field is null or absent.
    pub fn is_null(self, field: impl Into<String>) -> Self {
        self.with(Condition::new(field, Predicate::IsNull))
    }

    /// Field is present and not null.
    pub fn not_null(self, field: impl Into<String>) -> Self {
        self.with(Condition::not(field, Predicate::IsNull))
    }

    /// Add a condition from a prefixed key.
    ///
    /// Prefixes: `!` negates, then one of `>=`, `<=`, `=`, `>`, `<`, `%`.
    /// A `Null` scalar means "is null" and a list means "in".
    pub fn entry(self, key: &str, operand: impl Into<Operand>) -> Result<Self, Error> {
        let condition = parse_entry(key, operand.into())?;
        Ok(self.with(condition))
    }

    /// Iterate over the field paths referenced by the filter.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.conditions.iter().map(|c| c.field.as_str())
    }
}

/// Escape `%`, `_` and `\` so `s` matches literally inside a LIKE pattern.
pub fn escape_like(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn parse_entry(key: &str, operand: Operand) -> Result<Condition, Error> {
    let (negated, rest) = match key.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, key),
    };

    let (operator, field) = [">=", "<=", "=", ">", "<", "%"]
        .iter()
        .find_map(|op| rest.strip_prefix(op).map(|field| (*op, field)))
        .unwrap_or(("", rest));

    if field.is_empty() {
        return Err(Error::InvalidFilterKey(key.to_string()));
    }

    let incompatible = |operand: &Operand| Error::IncompatibleOperand {
        field: field.to_string(),
        operator: if operator.is_empty() { "=" } else { operator },
        operand: operand.kind(),
    };

    let predicate = match (operator, operand) {
        ("" | "=", Operand::Scalar(Value::Null)) => Predicate::IsNull,
        ("" | "=", Operand::Scalar(v)) => Predicate::Eq(v),
        ("" | "=", Operand::List(values)) => Predicate::In(values),
        ("%", Operand::Scalar(Value::String(s))) => {
            Predicate::Like(format!("%{}%", escape_like(&s)))
        }
        (">", Operand::Scalar(v)) if !v.is_null() => Predicate::Gt(v),
        (">=", Operand::Scalar(v)) if !v.is_null() => Predicate::Ge(v),
        ("<", Operand::Scalar(v)) if !v.is_null() => Predicate::Lt(v),
        ("<=", Operand::Scalar(v)) if !v.is_null() => Predicate::Le(v),
        (_, other) => return Err(incompatible(&other)),
    };

    Ok(Condition {
        field: field.to_string(),
        predicate,
        negated,
    })
}

/// One entry of a select list.
///
/// `alias` is the key the value is returned under; `path` is what gets read.
/// For plain fields both are the same.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectItem {
    /// Output key.
    pub alias: String,
    /// Field path or relation name.
    pub path: String,
}

impl SelectItem {
    /// Select a plain field or relation under its own name.
    pub fn field(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            alias: path.clone(),
            path,
        }
    }

    /// Select a path under a different output key.
    pub fn aliased(alias: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            path: path.into(),
        }
    }

    /// Check whether the output key differs from the path.
    pub fn is_aliased(&self) -> bool {
        self.alias != self.path
    }
}

impl From<&str> for SelectItem {
    fn from(path: &str) -> Self {
        SelectItem::field(path)
    }
}

/// Join type for runtime joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinType {
    /// Keep the base row when nothing matches.
    Left,
    /// Drop the base row when nothing matches.
    Inner,
}

/// An ad-hoc relation attached to the base entity for one query.
///
/// Joins `this.source_field = ref.target_field`, plus
/// `ref.extra.0 = extra.1` when an extra condition is given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeJoin {
    /// Name the join is addressed by in paths (`FAVORITES.ID`).
    pub name: String,
    /// Entity on the other side.
    pub target_entity: String,
    /// Field on the base entity.
    pub source_field: String,
    /// Field on the target entity.
    pub target_field: String,
    /// Left or inner.
    pub join_type: JoinType,
    /// Additional equality on the target entity.
    pub extra: Option<(String, Value)>,
}

impl RuntimeJoin {
    /// Create a left join.
    pub fn left(
        name: impl Into<String>,
        target_entity: impl Into<String>,
        source_field: impl Into<String>,
        target_field: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            target_entity: target_entity.into(),
            source_field: source_field.into(),
            target_field: target_field.into(),
            join_type: JoinType::Left,
            extra: None,
        }
    }

    /// Create an inner join.
    pub fn inner(
        name: impl Into<String>,
        target_entity: impl Into<String>,
        source_field: impl Into<String>,
        target_field: impl Into<String>,
    ) -> Self {
        Self {
            join_type: JoinType::Inner,
            ..Self::left(name, target_entity, source_field, target_field)
        }
    }

    /// Add an equality condition on the target entity.
    pub fn with_extra(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra = Some((field.into(), value.into()));
        self
    }
}

/// Select fields that may yield 0..N values per parent row, with the
/// sub-attributes requested for each.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiValuedSpec {
    /// Select field → requested sub-attributes (`VALUE`, `DESCRIPTION`).
    pub fields: BTreeMap<String, Vec<String>>,
}

impl MultiValuedSpec {
    /// Check whether any multi-valued field is declared.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Check whether a select alias is multi-valued.
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Sub-attributes requested for a field.
    pub fn attributes(&self, field: &str) -> Option<&[String]> {
        self.fields.get(field).map(|v| v.as_slice())
    }
}

/// A paginated list query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListQuery {
    /// Base entity.
    pub entity: String,
    /// Select list, in output order.
    pub select: Vec<SelectItem>,
    /// Row filter.
    pub filter: Filter,
    /// Ordering, applied before limit/offset.
    pub order: Vec<OrderSpec>,
    /// Maximum number of parent rows.
    pub limit: Option<u64>,
    /// Parent rows to skip.
    pub offset: Option<u64>,
    /// Result cache lifetime in seconds.
    pub cache_ttl: Option<u64>,
    /// Runtime joins available to paths in this query.
    pub joins: Vec<RuntimeJoin>,
    /// Multi-valued select fields.
    pub multi_valued: MultiValuedSpec,
    /// Registered `alias.field` pairs that aliased selects may resolve.
    pub relation_fields: BTreeMap<String, BTreeSet<String>>,
    /// Select alias → enumerated property code.
    pub enum_fields: BTreeMap<String, String>,
    /// Select aliases holding file references.
    pub file_fields: Vec<String>,
    /// Also return the candidate set without pagination.
    pub unlimited_rows: bool,
}

impl ListQuery {
    /// Create a query on an entity with an empty select list.
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            select: vec![],
            filter: Filter::default(),
            order: vec![],
            limit: None,
            offset: None,
            cache_ttl: None,
            joins: vec![],
            multi_valued: MultiValuedSpec::default(),
            relation_fields: BTreeMap::new(),
            enum_fields: BTreeMap::new(),
            file_fields: vec![],
            unlimited_rows: false,
        }
    }

    /// Replace the select list.
    pub fn with_select<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SelectItem>,
    {
        self.select = items.into_iter().map(Into::into).collect();
        self
    }

    /// Append one select item.
    pub fn select(mut self, item: impl Into<SelectItem>) -> Self {
        self.select.push(item.into());
        self
    }

    /// Set the filter.
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    /// Add an ordering key.
    pub fn with_order(mut self, order: OrderSpec) -> Self {
        self.order.push(order);
        self
    }

    /// Set the limit.
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set the offset.
    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Cache results for `ttl` seconds.
    pub fn with_cache_ttl(mut self, ttl: u64) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Attach a runtime join.
    pub fn join(mut self, join: RuntimeJoin) -> Self {
        self.joins.push(join);
        self
    }

    /// Declare a multi-valued select field.
    pub fn multi_valued<I, S>(mut self, field: impl Into<String>, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.multi_valued
            .fields
            .insert(field.into(), attributes.into_iter().map(Into::into).collect());
        self
    }

    /// Register an `alias.field` pair for aliased selects.
    pub fn with_relation_field(mut self, alias: impl Into<String>, field: impl Into<String>) -> Self {
        self.relation_fields
            .entry(alias.into())
            .or_default()
            .insert(field.into());
        self
    }

    /// Translate a select alias through an enumerated property table.
    pub fn with_enum_field(mut self, alias: impl Into<String>, code: impl Into<String>) -> Self {
        self.enum_fields.insert(alias.into(), code.into());
        self
    }

    /// Resolve a select alias as a file reference.
    pub fn with_file_field(mut self, alias: impl Into<String>) -> Self {
        self.file_fields.push(alias.into());
        self
    }

    /// Also fetch the unpaginated candidate set.
    pub fn with_unlimited_rows(mut self) -> Self {
        self.unlimited_rows = true;
        self
    }

    /// Check whether an aliased `alias.field` path was registered.
    pub fn is_registered_relation_path(&self, path: &str) -> bool {
        match path.split_once('.') {
            Some((alias, field)) => self
                .relation_fields
                .get(alias)
                .map(|fields| fields.contains(field))
                .unwrap_or(false),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_prefixes() {
        let filter = Filter::new()
            .entry("ACTIVE", true)
            .unwrap()
            .entry("!TAGS.VALUE", Value::Null)
            .unwrap()
            .entry(">=SORT", 100)
            .unwrap()
            .entry("%NAME", "lake")
            .unwrap()
            .entry("!ID", Operand::List(vec![1.into(), 2.into()]))
            .unwrap();

        assert_eq!(
            filter.conditions,
            vec![
                Condition::new("ACTIVE", Predicate::Eq(Value::Bool(true))),
                Condition::not("TAGS.VALUE", Predicate::IsNull),
                Condition::new("SORT", Predicate::Ge(Value::Int64(100))),
                Condition::new("NAME", Predicate::Like("%lake%".into())),
                Condition::not("ID", Predicate::In(vec![Value::Int64(1), Value::Int64(2)])),
            ]
        );
    }

    #[test]
    fn test_contains_entry_escapes_wildcards() {
        let filter = Filter::new().entry("%NAME", "50%_off\\").unwrap();
        assert_eq!(
            filter.conditions[0].predicate,
            Predicate::Like("%50\\%\\_off\\\\%".into())
        );
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn test_entry_rejects_bad_keys() {
        assert_eq!(
            Filter::new().entry("!", 1).unwrap_err(),
            Error::InvalidFilterKey("!".into())
        );
        assert!(matches!(
            Filter::new().entry(">SORT", Value::Null),
            Err(Error::IncompatibleOperand { operand: "null", .. })
        ));
        assert!(matches!(
            Filter::new().entry("%NAME", 5),
            Err(Error::IncompatibleOperand { operator: "%", .. })
        ));
    }

    #[test]
    fn test_set_replaces_field_conditions() {
        let filter = Filter::new()
            .eq("ACTIVE", false)
            .eq("NAME", "a")
            .set(Condition::new("ACTIVE", Predicate::Eq(Value::Bool(true))));

        assert_eq!(filter.conditions.len(), 2);
        assert_eq!(
            filter.conditions[1],
            Condition::new("ACTIVE", Predicate::Eq(Value::Bool(true)))
        );
    }

    #[test]
    fn test_relation_field_registration() {
        let query = ListQuery::new("Element")
            .select(SelectItem::aliased("FAVORITES_ID", "FAVORITES.ID"))
            .with_relation_field("FAVORITES", "ID");

        assert!(query.is_registered_relation_path("FAVORITES.ID"));
        assert!(!query.is_registered_relation_path("FAVORITES.USER_ID"));
        assert!(!query.is_registered_relation_path("ID"));
    }
}
