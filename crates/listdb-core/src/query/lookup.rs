//! Reference tables the result mapper translates ids through.

use std::collections::{BTreeMap, HashMap};

use listdb_proto::{FileRef, Filter, OrderSpec, Value};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::source::{DataSource, SourceQuery};
use crate::catalog::{FILE_ENTITY, PROPERTY_ENUM_ENTITY};
use crate::error::Error;

/// One value of an enumerated property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumEntry {
    /// Entry id, as stored in referencing fields.
    pub id: i64,
    /// Property the entry belongs to.
    pub property_code: String,
    /// Display value.
    pub value: String,
    /// External identifier.
    pub external_id: String,
}

/// Enumerated property entries keyed by property code, then id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnumTable {
    entries: BTreeMap<String, BTreeMap<i64, EnumEntry>>,
}

impl EnumTable {
    /// Load the entries of the given property codes in one query.
    pub fn load<S: AsRef<str>>(source: &dyn DataSource, codes: &[S]) -> Result<Self, Error> {
        let mut table = Self::default();
        if codes.is_empty() {
            return Ok(table);
        }

        let query = SourceQuery::new(PROPERTY_ENUM_ENTITY)
            .select("ID")
            .select("PROPERTY_CODE")
            .select("VALUE")
            .select("XML_ID")
            .with_filter(Filter::new().in_list(
                "PROPERTY_CODE",
                codes.iter().map(|c| Value::from(c.as_ref())).collect(),
            ))
            .with_order(vec![OrderSpec::asc("ID")]);

        for row in source.fetch(&query)? {
            let Some(id) = row.get("ID").and_then(Value::as_i64) else {
                continue;
            };
            let text = |key: &str| {
                row.get(key)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            };
            table.insert(EnumEntry {
                id,
                property_code: text("PROPERTY_CODE"),
                value: text("VALUE"),
                external_id: text("XML_ID"),
            });
        }

        debug!(codes = codes.len(), entries = table.len(), "enum table loaded");
        Ok(table)
    }

    /// Add an entry.
    pub fn insert(&mut self, entry: EnumEntry) {
        self.entries
            .entry(entry.property_code.clone())
            .or_default()
            .insert(entry.id, entry);
    }

    /// Look up an entry by property code and stored id.
    pub fn get(&self, code: &str, id: &Value) -> Option<&EnumEntry> {
        let id = id.as_i64()?;
        self.entries.get(code)?.get(&id)
    }

    /// Display value for a stored id; empty when the id is unknown.
    pub fn display(&self, code: &str, id: &Value) -> String {
        self.get(code, id)
            .map(|entry| entry.value.clone())
            .unwrap_or_default()
    }

    /// Total number of entries.
    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    /// Check whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resolves file ids to public paths.
pub struct FileResolver<'a> {
    source: &'a dyn DataSource,
    files_root: &'a str,
}

impl<'a> FileResolver<'a> {
    /// Create a resolver building paths under `files_root`.
    pub fn new(source: &'a dyn DataSource, files_root: &'a str) -> Self {
        Self { source, files_root }
    }

    /// Resolve all given ids in one query. Falsy ids are skipped; ids with
    /// no stored file are absent from the result.
    pub fn resolve(&self, ids: &[Value]) -> Result<HashMap<i64, FileRef>, Error> {
        let mut wanted: Vec<i64> = ids
            .iter()
            .filter(|id| !id.is_falsy())
            .filter_map(Value::as_i64)
            .collect();
        wanted.sort_unstable();
        wanted.dedup();

        if wanted.is_empty() {
            return Ok(HashMap::new());
        }

        let query = SourceQuery::new(FILE_ENTITY)
            .select("ID")
            .select("SUBDIR")
            .select("FILE_NAME")
            .select("DESCRIPTION")
            .with_filter(Filter::new().in_list(
                "ID",
                wanted.iter().copied().map(Value::Int64).collect(),
            ));

        let mut files = HashMap::new();
        for row in self.source.fetch(&query)? {
            let Some(id) = row.get("ID").and_then(Value::as_i64) else {
                continue;
            };
            let text = |key: &str| row.get(key).and_then(Value::as_str).unwrap_or_default();
            files.insert(
                id,
                FileRef {
                    path: file_path(self.files_root, text("SUBDIR"), text("FILE_NAME")),
                    description: text("DESCRIPTION").to_string(),
                },
            );
        }

        debug!(requested = wanted.len(), resolved = files.len(), "files resolved");
        Ok(files)
    }
}

/// Public path of a stored file: `root + subdir + "/" + name`.
pub fn file_path(root: &str, subdir: &str, file_name: &str) -> String {
    format!("{root}{subdir}/{file_name}")
}
