//! Maps decomposed rows into the output shape of a list query.

use std::collections::HashMap;

use listdb_proto::{Cell, FileRef, ListQuery, ResultRow, Value};

use super::lookup::EnumTable;
use super::row::EntityRow;

/// Output key of the resolved file list.
pub const FILES_KEY: &str = "FILES";

/// Datetime output format.
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Render a datetime (microseconds since epoch, UTC) as `YYYY-MM-DD HH:MM:SS`.
pub fn format_datetime(micros: i64) -> String {
    chrono::DateTime::from_timestamp_micros(micros)
        .map(|dt| dt.format(DATETIME_FORMAT).to_string())
        .unwrap_or_else(|| micros.to_string())
}

/// Convert a stored value to its output form.
pub fn render(value: &Value) -> Value {
    match value {
        Value::DateTime(micros) => Value::String(format_datetime(*micros)),
        other => other.clone(),
    }
}

/// Maps [`EntityRow`]s to [`ResultRow`]s.
///
/// - Multi-valued items become one list per sub-attribute, keyed
///   `<ALIAS>_<ATTR>`, parallel-indexed and empty when there are no values.
/// - An aliased dotted path is only output when its `alias.field` pair is
///   registered on the query.
/// - Enum fields are translated to display values.
/// - When file fields are present, every row gets a `FILES` cell.
pub struct ResultMapper<'a> {
    query: &'a ListQuery,
    primary_key: &'a str,
    enums: Option<&'a EnumTable>,
    files: Option<&'a HashMap<i64, FileRef>>,
}

impl<'a> ResultMapper<'a> {
    /// Create a mapper for a query.
    pub fn new(query: &'a ListQuery, primary_key: &'a str) -> Self {
        Self {
            query,
            primary_key,
            enums: None,
            files: None,
        }
    }

    /// Translate enum fields through a table.
    pub fn with_enums(mut self, enums: &'a EnumTable) -> Self {
        self.enums = Some(enums);
        self
    }

    /// Resolve file fields through a pre-resolved file table.
    pub fn with_files(mut self, files: &'a HashMap<i64, FileRef>) -> Self {
        self.files = Some(files);
        self
    }

    /// Map all rows, keeping their order.
    pub fn map(&self, rows: &[EntityRow]) -> Vec<ResultRow> {
        rows.iter().map(|row| self.map_row(row)).collect()
    }

    /// File ids referenced by the file fields of the given rows.
    pub fn file_ids(query: &ListQuery, rows: &[EntityRow]) -> Vec<Value> {
        rows.iter()
            .flat_map(|row| file_values(query, row))
            .collect()
    }

    fn map_row(&self, row: &EntityRow) -> ResultRow {
        let mut out = ResultRow::new();

        for item in &self.query.select {
            let alias = item.alias.as_str();

            if let Some(attributes) = self.query.multi_valued.attributes(alias) {
                for attribute in attributes {
                    let values = row
                        .related(alias)
                        .iter()
                        .map(|related| self.output_value(alias, &related.values.get_or_null(attribute)))
                        .collect();
                    out.insert(format!("{alias}_{attribute}"), Cell::List(values));
                }
                continue;
            }

            if row.related.contains_key(alias) {
                let values = row
                    .related(alias)
                    .iter()
                    .map(|related| self.output_value(alias, &related.values.get_or_null(alias)))
                    .collect();
                out.insert(alias, Cell::List(values));
                continue;
            }

            if item.is_aliased()
                && item.path.contains('.')
                && !self.query.is_registered_relation_path(&item.path)
            {
                continue;
            }

            let value = row.fields.get_or_null(alias);
            out.insert(alias, Cell::Scalar(self.output_value(alias, &value)));
        }

        if !out.contains(self.primary_key) {
            out.insert(self.primary_key, Cell::Scalar(row.primary.clone()));
        }

        if !self.query.file_fields.is_empty() {
            let files = file_values(self.query, row)
                .iter()
                .map(|id| self.resolve_file(id))
                .collect();
            out.insert(FILES_KEY, Cell::Files(files));
        }

        out
    }

    fn output_value(&self, alias: &str, value: &Value) -> Value {
        match (self.query.enum_fields.get(alias), self.enums) {
            (Some(code), Some(enums)) if !value.is_null() => Value::String(enums.display(code, value)),
            (Some(_), None) if !value.is_null() => Value::String(String::new()),
            _ => render(value),
        }
    }

    fn resolve_file(&self, id: &Value) -> Option<FileRef> {
        if id.is_falsy() {
            return None;
        }
        let id = id.as_i64()?;
        self.files.and_then(|files| files.get(&id).cloned())
    }
}

/// Raw file ids of a row, in file-field order.
fn file_values(query: &ListQuery, row: &EntityRow) -> Vec<Value> {
    let mut values = Vec::new();
    for alias in &query.file_fields {
        if let Some(value) = row.fields.get(alias) {
            values.push(value.clone());
        } else {
            values.extend(row.related(alias).iter().map(|related| {
                related
                    .values
                    .values
                    .first()
                    .map(|(_, v)| v.clone())
                    .unwrap_or(Value::Null)
            }));
        }
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::lookup::EnumEntry;
    use crate::query::row::{RawRow, RelatedRow};
    use listdb_proto::SelectItem;

    fn fields(values: Vec<(&str, Value)>) -> RawRow {
        values
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    fn tag(anchor: i64, value: &str, description: &str) -> RelatedRow {
        RelatedRow {
            anchor: Value::Int64(anchor),
            values: fields(vec![("VALUE", value.into()), ("DESCRIPTION", description.into())]),
        }
    }

    #[test]
    fn test_multi_valued_lists() {
        let query = ListQuery::new("Element")
            .with_select(["ID", "NAME", "TAGS"])
            .multi_valued("TAGS", ["VALUE", "DESCRIPTION"]);

        let mut a = EntityRow::new(
            Value::Int64(1),
            fields(vec![("ID", 1.into()), ("NAME", "a".into())]),
        );
        a.related
            .insert("TAGS".into(), vec![tag(11, "x", "first"), tag(12, "y", "")]);
        let mut b = EntityRow::new(
            Value::Int64(2),
            fields(vec![("ID", 2.into()), ("NAME", "b".into())]),
        );
        b.related.insert("TAGS".into(), vec![]);

        let rows = ResultMapper::new(&query, "ID").map(&[a, b]);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].list("TAGS_VALUE").unwrap(), &[Value::from("x"), Value::from("y")]);
        assert_eq!(
            rows[0].list("TAGS_DESCRIPTION").unwrap(),
            &[Value::from("first"), Value::from("")]
        );
        assert_eq!(rows[1].list("TAGS_VALUE").unwrap(), &[] as &[Value]);
        assert!(!rows[0].contains("TAGS"));
        assert!(!rows[0].contains(FILES_KEY));
    }

    #[test]
    fn test_aliased_paths_need_registration() {
        let row = EntityRow::new(
            Value::Int64(1),
            fields(vec![
                ("ID", 1.into()),
                ("FAVORITES_ID", 7.into()),
                ("OWNER", 3.into()),
                ("TITLE", "a".into()),
            ]),
        );

        let query = ListQuery::new("Element")
            .select("ID")
            .select(SelectItem::aliased("FAVORITES_ID", "FAVORITES.ID"))
            .select(SelectItem::aliased("OWNER", "AUTHOR.ID"))
            .select(SelectItem::aliased("TITLE", "NAME"))
            .with_relation_field("FAVORITES", "ID");

        let mapped = &ResultMapper::new(&query, "ID").map(&[row])[0];
        assert_eq!(mapped.scalar("FAVORITES_ID"), Some(&Value::Int64(7)));
        assert!(!mapped.contains("OWNER"));
        assert_eq!(mapped.scalar("TITLE"), Some(&Value::from("a")));
    }

    #[test]
    fn test_datetime_and_primary_key() {
        let query = ListQuery::new("Element").select("DATE_CREATE");
        let row = EntityRow::new(
            Value::Int64(9),
            fields(vec![("DATE_CREATE", Value::DateTime(1_700_000_000_000_000))]),
        );

        let mapped = &ResultMapper::new(&query, "ID").map(&[row])[0];
        assert_eq!(
            mapped.scalar("DATE_CREATE"),
            Some(&Value::from("2023-11-14 22:13:20"))
        );
        assert_eq!(mapped.scalar("ID"), Some(&Value::Int64(9)));
    }

    #[test]
    fn test_enum_translation() {
        let mut enums = EnumTable::default();
        enums.insert(EnumEntry {
            id: 5,
            property_code: "KIND".into(),
            value: "House".into(),
            external_id: "house".into(),
        });
        let query = ListQuery::new("Element")
            .with_select(["ID", "KIND_ID"])
            .with_enum_field("KIND_ID", "KIND");

        let rows = vec![
            EntityRow::new(1.into(), fields(vec![("ID", 1.into()), ("KIND_ID", 5.into())])),
            EntityRow::new(2.into(), fields(vec![("ID", 2.into()), ("KIND_ID", 6.into())])),
            EntityRow::new(3.into(), fields(vec![("ID", 3.into()), ("KIND_ID", Value::Null)])),
        ];
        let mapped = ResultMapper::new(&query, "ID").with_enums(&enums).map(&rows);

        assert_eq!(mapped[0].scalar("KIND_ID"), Some(&Value::from("House")));
        assert_eq!(mapped[1].scalar("KIND_ID"), Some(&Value::from("")));
        assert_eq!(mapped[2].scalar("KIND_ID"), Some(&Value::Null));
    }

    #[test]
    fn test_files_cell() {
        let query = ListQuery::new("Element")
            .with_select(["ID", "PREVIEW_PICTURE"])
            .with_file_field("PREVIEW_PICTURE");
        let rows = vec![
            EntityRow::new(1.into(), fields(vec![("ID", 1.into()), ("PREVIEW_PICTURE", 40.into())])),
            EntityRow::new(2.into(), fields(vec![("ID", 2.into()), ("PREVIEW_PICTURE", 0.into())])),
            EntityRow::new(3.into(), fields(vec![("ID", 3.into()), ("PREVIEW_PICTURE", 41.into())])),
        ];

        assert_eq!(
            ResultMapper::file_ids(&query, &rows),
            vec![Value::Int64(40), Value::Int64(0), Value::Int64(41)]
        );

        let mut files = HashMap::new();
        files.insert(
            40,
            FileRef {
                path: "/upload/a/b.png".into(),
                description: "cover".into(),
            },
        );
        let mapped = ResultMapper::new(&query, "ID").with_files(&files).map(&rows);

        assert_eq!(
            mapped[0].get(FILES_KEY).and_then(Cell::as_files).unwrap(),
            &[Some(files[&40].clone())]
        );
        assert_eq!(mapped[1].get(FILES_KEY).and_then(Cell::as_files).unwrap(), &[None::<FileRef>]);
        assert_eq!(mapped[2].get(FILES_KEY).and_then(Cell::as_files).unwrap(), &[None::<FileRef>]);
        assert_eq!(mapped[0].scalar("PREVIEW_PICTURE"), Some(&Value::Int64(40)));
    }
}
