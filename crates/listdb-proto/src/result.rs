//! Result types for list queries.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// A resolved file attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    /// Public path of the file.
    pub path: String,
    /// Free-form description, empty when none was stored.
    pub description: String,
}

/// One output cell of a result row.
///
/// Externally tagged in JSON: a cached `[]` or `[null]` has to decode back
/// to the variant it was written from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Cell {
    /// A single scalar.
    Scalar(Value),
    /// Parallel values of a multi-valued field.
    List(Vec<Value>),
    /// Resolved file references; `None` where the id did not resolve.
    Files(Vec<Option<FileRef>>),
}

impl Cell {
    /// Get the scalar value, if this is a scalar cell.
    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            Cell::Scalar(v) => Some(v),
            _ => None,
        }
    }

    /// Get the list values, if this is a list cell.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Cell::List(values) => Some(values),
            _ => None,
        }
    }

    /// Get the files, if this is a files cell.
    pub fn as_files(&self) -> Option<&[Option<FileRef>]> {
        match self {
            Cell::Files(files) => Some(files),
            _ => None,
        }
    }
}

/// One mapped result row, keyed by select alias.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultRow {
    /// Cells keyed by output name.
    pub cells: BTreeMap<String, Cell>,
}

impl ResultRow {
    /// Create an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a cell.
    pub fn insert(&mut self, key: impl Into<String>, cell: Cell) {
        self.cells.insert(key.into(), cell);
    }

    /// Get a cell by key.
    pub fn get(&self, key: &str) -> Option<&Cell> {
        self.cells.get(key)
    }

    /// Get a scalar cell by key.
    pub fn scalar(&self, key: &str) -> Option<&Value> {
        self.get(key).and_then(Cell::as_scalar)
    }

    /// Get a list cell by key.
    pub fn list(&self, key: &str) -> Option<&[Value]> {
        self.get(key).and_then(Cell::as_list)
    }

    /// Check whether a key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.cells.contains_key(key)
    }
}

/// The result of one list query execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    /// The requested page, in query order.
    pub rows: Vec<ResultRow>,
    /// Distinct primary keys matching the filter, ignoring limit/offset.
    pub total_count: u64,
    /// The unpaginated candidate set, when it was requested.
    pub unlimited_rows: Option<Vec<ResultRow>>,
}

impl ResultSet {
    /// Create an empty result.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of rows in the page.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check whether the page is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_json_shape() {
        let mut row = ResultRow::new();
        row.insert("ID", Cell::Scalar(Value::Int64(1)));
        row.insert("TAGS_VALUE", Cell::List(vec!["x".into(), "y".into()]));
        row.insert(
            "FILES",
            Cell::Files(vec![
                Some(FileRef {
                    path: "/upload/a/b.png".into(),
                    description: String::new(),
                }),
                None,
            ]),
        );

        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "FILES": {"Files": [{"path": "/upload/a/b.png", "description": ""}, null]},
                "ID": {"Scalar": 1},
                "TAGS_VALUE": {"List": ["x", "y"]},
            })
        );
    }

    #[test]
    fn test_result_set_cache_roundtrip() {
        let mut row = ResultRow::new();
        row.insert("NAME", Cell::Scalar("Lake house".into()));
        row.insert("TAGS_VALUE", Cell::List(vec![]));
        row.insert("FILES", Cell::Files(vec![None]));
        let set = ResultSet {
            rows: vec![row],
            total_count: 1,
            unlimited_rows: None,
        };

        let bytes = serde_json::to_vec(&set).unwrap();
        let decoded: ResultSet = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded, set);
    }
}
