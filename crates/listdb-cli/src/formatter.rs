//! Output formatters for command results.

use clap::ValueEnum;
use comfy_table::Table;
use listdb_core::ListingPage;
use listdb_proto::{Cell, ResultRow};

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Trait for formatting output.
pub trait Formatter {
    /// Format mapped result rows.
    fn format_rows(&self, rows: &[ResultRow], total: u64) -> String;

    /// Format a catalog listing page.
    fn format_listing(&self, page: &ListingPage) -> String;

    /// Format a simple message.
    fn format_message(&self, message: &str) -> String;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Table => Box::new(TableFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}

/// Table formatter using comfy-table.
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn format_rows(&self, rows: &[ResultRow], total: u64) -> String {
        if rows.is_empty() {
            return "No results".to_string();
        }

        let mut columns: Vec<&str> = Vec::new();
        for row in rows {
            for key in row.cells.keys() {
                if !columns.contains(&key.as_str()) {
                    columns.push(key);
                }
            }
        }

        let mut table = Table::new();
        table.set_header(columns.iter().copied());
        for row in rows {
            table.add_row(
                columns
                    .iter()
                    .map(|column| row.get(column).map(render_cell).unwrap_or_default()),
            );
        }

        format!("{table}\n{} of {} row(s)", rows.len(), total)
    }

    fn format_listing(&self, page: &ListingPage) -> String {
        let mut table = Table::new();
        table.set_header(["ID", "NAME", "CREATED", "KIND", "TAGS", "PICTURE", "FAVORITE"]);
        for item in &page.items {
            let tags: Vec<&str> = item.tags.iter().map(|t| t.value.as_str()).collect();
            table.add_row([
                item.id.to_string(),
                item.name.clone(),
                item.date_create.clone(),
                item.kind.clone(),
                tags.join(", "),
                item.picture
                    .as_ref()
                    .map(|p| p.path.clone())
                    .unwrap_or_default(),
                if item.is_favorite { "*" } else { "" }.to_string(),
            ]);
        }

        let meta = &page.pagination;
        format!(
            "{table}\npage {} of {} ({} item(s))\nfilters: {}",
            meta.current_page,
            meta.total_pages,
            meta.total_items,
            page.filter_candidates.join(", ")
        )
    }

    fn format_message(&self, message: &str) -> String {
        message.to_string()
    }
}

/// JSON formatter.
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format_rows(&self, rows: &[ResultRow], total: u64) -> String {
        let json = serde_json::json!({ "rows": rows, "total_count": total });
        serde_json::to_string_pretty(&json).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
    }

    fn format_listing(&self, page: &ListingPage) -> String {
        serde_json::to_string_pretty(page).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
    }

    fn format_message(&self, message: &str) -> String {
        serde_json::json!({ "message": message }).to_string()
    }
}

fn render_cell(cell: &Cell) -> String {
    match cell {
        Cell::Scalar(value) => value.to_string(),
        Cell::List(values) => values
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", "),
        Cell::Files(files) => files
            .iter()
            .map(|f| f.as_ref().map(|f| f.path.as_str()).unwrap_or("-"))
            .collect::<Vec<_>>()
            .join(", "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use listdb_proto::{FileRef, Value};

    fn row() -> ResultRow {
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
        row
    }

    #[test]
    fn test_render_cell() {
        let row = row();
        assert_eq!(render_cell(row.get("ID").unwrap()), "1");
        assert_eq!(render_cell(row.get("TAGS_VALUE").unwrap()), "x, y");
        assert_eq!(render_cell(row.get("FILES").unwrap()), "/upload/a/b.png, -");
    }

    #[test]
    fn test_table_rows() {
        let output = TableFormatter.format_rows(&[row()], 7);
        assert!(output.contains("TAGS_VALUE"));
        assert!(output.ends_with("1 of 7 row(s)"));
        assert_eq!(TableFormatter.format_rows(&[], 0), "No results");
    }

    #[test]
    fn test_json_rows() {
        let output = JsonFormatter.format_rows(&[row()], 7);
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["total_count"], 7);
        assert_eq!(parsed["rows"][0]["ID"]["Scalar"], 1);
    }
}
