//! Row types exchanged between the data source, decomposer and mapper.

use std::collections::{BTreeMap, HashMap};

use listdb_proto::Value;

/// One row as returned by a data source, keyed by select alias.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    /// `(alias, value)` pairs in select order.
    pub values: Vec<(String, Value)>,
}

impl RawRow {
    /// Create an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value.
    pub fn push(&mut self, key: impl Into<String>, value: Value) {
        self.values.push((key.into(), value));
    }

    /// Get a value by alias.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Get a value by alias, `Null` when absent.
    pub fn get_or_null(&self, key: &str) -> Value {
        self.get(key).cloned().unwrap_or(Value::Null)
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check whether the row has no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(String, Value)> for RawRow {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// One related row of a multi-valued property.
#[derive(Debug, Clone, PartialEq)]
pub struct RelatedRow {
    /// Primary key of the related record.
    pub anchor: Value,
    /// Requested sub-attributes keyed by attribute name.
    pub values: RawRow,
}

/// A parent row after decomposition: one per primary key.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRow {
    /// Primary key value.
    pub primary: Value,
    /// Scalar select values keyed by alias.
    pub fields: RawRow,
    /// Related rows per divided select alias, ordered by related key.
    pub related: BTreeMap<String, Vec<RelatedRow>>,
}

impl EntityRow {
    /// Create a row with no related values.
    pub fn new(primary: Value, fields: RawRow) -> Self {
        Self {
            primary,
            fields,
            related: BTreeMap::new(),
        }
    }

    /// Related rows for a select alias.
    pub fn related(&self, alias: &str) -> &[RelatedRow] {
        self.related.get(alias).map(|v| v.as_slice()).unwrap_or(&[])
    }
}

/// Hashable identity of a value, used for joins, DISTINCT and identity maps.
///
/// Integral floats collapse onto integers so `1.0` and `1` are the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueKey {
    /// Null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer or integral float.
    Int(i64),
    /// Non-integral float, by bit pattern.
    Float(u64),
    /// String.
    Str(String),
    /// Timestamp.
    DateTime(i64),
}

impl From<&Value> for ValueKey {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => ValueKey::Null,
            Value::Bool(b) => ValueKey::Bool(*b),
            Value::Int64(i) => ValueKey::Int(*i),
            Value::Float64(f) if f.fract() == 0.0 && f.is_finite() => ValueKey::Int(*f as i64),
            Value::Float64(f) => ValueKey::Float(f.to_bits()),
            Value::String(s) => ValueKey::Str(s.clone()),
            Value::DateTime(t) => ValueKey::DateTime(*t),
        }
    }
}

/// Primary key to row index, merging rows that share a primary key.
///
/// The first row seen for a key wins; later rows only contribute related
/// values.
#[derive(Debug, Default)]
pub struct IdentityMap {
    index: HashMap<ValueKey, usize>,
    rows: Vec<EntityRow>,
}

impl IdentityMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row unless its primary key is already present.
    /// Returns the index of the row holding the key.
    pub fn put(&mut self, row: EntityRow) -> usize {
        let key = ValueKey::from(&row.primary);
        if let Some(&index) = self.index.get(&key) {
            return index;
        }
        let index = self.rows.len();
        self.index.insert(key, index);
        self.rows.push(row);
        index
    }

    /// Find the row for a primary key.
    pub fn get_mut(&mut self, primary: &Value) -> Option<&mut EntityRow> {
        let index = *self.index.get(&ValueKey::from(primary))?;
        self.rows.get_mut(index)
    }

    /// Number of distinct rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Primary keys in insertion order.
    pub fn primaries(&self) -> Vec<Value> {
        self.rows.iter().map(|r| r.primary.clone()).collect()
    }

    /// Consume the map, returning rows in insertion order.
    pub fn into_rows(self) -> Vec<EntityRow> {
        self.rows
    }
}
