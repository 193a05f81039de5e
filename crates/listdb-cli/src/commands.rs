//! Subcommand implementations.

use listdb_core::catalog::{FILE_ENTITY, PROPERTY_ENUM_ENTITY};
use listdb_core::listing::{ELEMENT_ENTITY, ELEMENT_TAG_ENTITY, KIND_CODE};
use listdb_core::storage::current_timestamp;
use listdb_core::{
    catalog_schema, BatchRunner, BatchStep, Error, ListDb, ListingRequest, QueryExportJob,
};
use listdb_proto::{Cell, Filter, ListQuery, Operand, OrderSpec, ResultRow, Value};
use tracing::info;

use crate::formatter::Formatter;

/// Errors raised while parsing command arguments.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("invalid filter argument '{0}', expected KEY=VALUE")]
    InvalidFilter(String),

    #[error("invalid multi-valued argument '{0}', expected FIELD=ATTR[,ATTR...]")]
    InvalidMulti(String),

    #[error(transparent)]
    Engine(#[from] Error),

    #[error(transparent)]
    Protocol(#[from] listdb_proto::Error),
}

/// Tag values assigned round-robin by the seeder.
const SEED_TAGS: &[(&str, &str)] = &[
    ("red", "warm"),
    ("green", ""),
    ("blue", "cool"),
    ("oak", "wood"),
];

/// Kinds created by the seeder.
const SEED_KINDS: &[(&str, &str)] = &[("Chair", "chair"), ("Table", "table"), ("Lamp", "lamp")];

/// Install the demo schema and write `elements` elements with tags, kinds
/// and pictures.
pub fn seed(db: &ListDb, elements: i64) -> Result<String, CommandError> {
    let version = db.apply_schema(catalog_schema())?;
    let writer = db.writer();

    let mut kinds = Vec::new();
    for (value, xml_id) in SEED_KINDS {
        kinds.push(writer.insert(
            PROPERTY_ENUM_ENTITY,
            vec![
                ("PROPERTY_CODE".into(), KIND_CODE.into()),
                ("VALUE".into(), (*value).into()),
                ("XML_ID".into(), (*xml_id).into()),
            ],
        )?);
    }

    let now = current_timestamp() as i64;
    for n in 0..elements {
        let picture = if n % 2 == 0 {
            writer.insert(
                FILE_ENTITY,
                vec![
                    ("SUBDIR".into(), format!("iblock/{:03x}", n).into()),
                    ("FILE_NAME".into(), format!("element-{n}.png").into()),
                    ("DESCRIPTION".into(), format!("Element {n}").into()),
                ],
            )?
        } else {
            0
        };

        let id = writer.insert(
            ELEMENT_ENTITY,
            vec![
                ("NAME".into(), format!("Element {n}").into()),
                ("ACTIVE".into(), (n % 5 != 4).into()),
                ("DATE_CREATE".into(), Value::DateTime(now + n * 1_000_000)),
                ("PREVIEW_PICTURE".into(), picture.into()),
                ("KIND_ID".into(), kinds[n as usize % kinds.len()].into()),
            ],
        )?;

        for k in 0..(n as usize % 3) {
            let (value, description) = SEED_TAGS[(n as usize + k) % SEED_TAGS.len()];
            writer.insert(
                ELEMENT_TAG_ENTITY,
                vec![
                    ("ELEMENT_ID".into(), id.into()),
                    ("VALUE".into(), value.into()),
                    ("DESCRIPTION".into(), description.into()),
                ],
            )?;
        }
    }

    db.flush()?;
    info!(elements, schema_version = version, "demo catalog seeded");
    Ok(format!("seeded {elements} element(s), schema version {version}"))
}

/// Render one catalog listing page.
pub fn list(
    db: &ListDb,
    formatter: &dyn Formatter,
    user: &str,
    page: i64,
    limit: i64,
) -> Result<String, CommandError> {
    let page = db.listing().page(&ListingRequest {
        user_id: user.to_string(),
        page,
        limit,
    })?;
    Ok(formatter.format_listing(&page))
}

/// Describe the entities of the current schema, one row per entity.
pub fn schema(db: &ListDb, formatter: &dyn Formatter) -> Result<String, CommandError> {
    let catalog = db.catalog();
    let mut rows = Vec::new();

    for name in catalog.list_entities() {
        let Some(entity) = catalog.get_entity(&name) else {
            continue;
        };
        let relations = catalog
            .relations_from(&name)
            .into_iter()
            .map(|relation| Value::from(format!("{} -> {}", relation.name, relation.to_entity)))
            .collect();

        let mut row = ResultRow::new();
        row.insert("ENTITY", Cell::Scalar(name.into()));
        row.insert("IDENTITY", Cell::Scalar(entity.identity_field.clone().into()));
        row.insert(
            "FIELDS",
            Cell::List(entity.field_names().into_iter().map(Value::from).collect()),
        );
        row.insert("RELATIONS", Cell::List(relations));
        rows.push(row);
    }

    let total = rows.len() as u64;
    Ok(formatter.format_rows(&rows, total))
}

/// Arguments of a generic list query.
#[derive(Debug, Clone, Default)]
pub struct QueryArgs {
    pub entity: String,
    pub select: Vec<String>,
    pub filters: Vec<String>,
    pub order: Vec<String>,
    pub multi: Vec<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Run a generic list query.
pub fn query(db: &ListDb, formatter: &dyn Formatter, args: &QueryArgs) -> Result<String, CommandError> {
    let query = build_query(args)?;
    let result = db.engine().execute(&query)?;
    Ok(formatter.format_rows(&result.rows, result.total_count))
}

/// Add, remove or check a favorite.
pub fn favorite(
    db: &ListDb,
    formatter: &dyn Formatter,
    action: FavoriteAction,
    user: &str,
    item: i64,
) -> Result<String, CommandError> {
    let favorites = db.favorites();
    let message = match action {
        FavoriteAction::Add => {
            let id = favorites.add(user, item)?;
            format!("favorite {id} added")
        }
        FavoriteAction::Remove => {
            favorites.delete(user, item)?;
            "favorite removed".to_string()
        }
        FavoriteAction::Check => match favorites.exists(user, item)? {
            Some(id) => format!("favorite {id}"),
            None => "not a favorite".to_string(),
        },
    };
    db.flush()?;
    Ok(formatter.format_message(&message))
}

/// Favorite subcommand actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FavoriteAction {
    Add,
    Remove,
    Check,
}

/// Export a query page by page as JSON lines, one iteration after another.
pub fn export(
    db: &ListDb,
    args: &QueryArgs,
    start_page: u64,
    max_iterations: Option<u64>,
) -> Result<String, CommandError> {
    let query = build_query(args)?;
    let runner = BatchRunner::from_config(db.engine().config());

    let mut job = QueryExportJob::new(db.engine().clone(), query, |page, rows| {
        for row in rows {
            println!("{}", serde_json::to_string(&row)?);
        }
        info!(page, "page exported");
        Ok(())
    });

    let mut page = start_page;
    let mut iterations = 0;
    let mut exported = 0;
    loop {
        iterations += 1;
        match runner.run_iteration(&mut job, page)? {
            BatchStep::Done { processed } => {
                exported += processed;
                return Ok(format!("exported {exported} row(s)"));
            }
            BatchStep::Continue {
                processed,
                next_page,
            } => {
                exported += processed;
                page = next_page;
                if max_iterations.is_some_and(|max| iterations >= max) {
                    return Ok(format!(
                        "exported {exported} row(s), resume at page {next_page}"
                    ));
                }
            }
        }
    }
}

/// Build a list query from command arguments.
pub fn build_query(args: &QueryArgs) -> Result<ListQuery, CommandError> {
    let mut query = ListQuery::new(args.entity.as_str()).with_select(args.select.iter().map(String::as_str));

    let mut filter = Filter::new();
    for arg in &args.filters {
        let (key, operand) = parse_filter_arg(arg)?;
        filter = filter.entry(&key, operand)?;
    }
    query = query.with_filter(filter);

    for order in &args.order {
        query = query.with_order(parse_order(order));
    }

    for arg in &args.multi {
        let (field, attributes) = arg
            .split_once('=')
            .filter(|(field, attrs)| !field.is_empty() && !attrs.is_empty())
            .ok_or_else(|| CommandError::InvalidMulti(arg.clone()))?;
        query = query.multi_valued(field, attributes.split(',').map(str::trim));
    }

    query.limit = args.limit;
    query.offset = args.offset;
    Ok(query)
}

/// Split `KEY=VALUE`, where `KEY` may carry an operator prefix such as
/// `>=` or `!`.
pub fn parse_filter_arg(arg: &str) -> Result<(String, Operand), CommandError> {
    let prefix_len = arg
        .find(|c: char| !matches!(c, '!' | '<' | '>' | '=' | '%'))
        .ok_or_else(|| CommandError::InvalidFilter(arg.to_string()))?;
    let split = arg[prefix_len..]
        .find('=')
        .map(|i| i + prefix_len)
        .ok_or_else(|| CommandError::InvalidFilter(arg.to_string()))?;

    let key = &arg[..split];
    let raw = &arg[split + 1..];
    let operand = if raw.contains(',') {
        Operand::List(raw.split(',').map(parse_value).collect())
    } else {
        Operand::Scalar(parse_value(raw))
    };
    Ok((key.to_string(), operand))
}

/// Parse a literal: `null`, booleans, integers, floats, otherwise a string.
pub fn parse_value(raw: &str) -> Value {
    let raw = raw.trim();
    match raw {
        "null" => Value::Null,
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => raw
            .parse::<i64>()
            .map(Value::Int64)
            .or_else(|_| raw.parse::<f64>().map(Value::Float64))
            .unwrap_or_else(|_| Value::from(raw)),
    }
}

/// Parse `FIELD` or `FIELD:desc`.
pub fn parse_order(arg: &str) -> OrderSpec {
    match arg.rsplit_once(':') {
        Some((field, dir)) if dir.eq_ignore_ascii_case("desc") => OrderSpec::desc(field),
        Some((field, dir)) if dir.eq_ignore_ascii_case("asc") => OrderSpec::asc(field),
        _ => OrderSpec::asc(arg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use listdb_proto::{OrderDirection, Predicate};

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("null"), Value::Null);
        assert_eq!(parse_value("true"), Value::Bool(true));
        assert_eq!(parse_value("42"), Value::Int64(42));
        assert_eq!(parse_value("1.5"), Value::Float64(1.5));
        assert_eq!(parse_value("oak"), Value::from("oak"));
    }

    #[test]
    fn test_parse_filter_arg() {
        let (key, operand) = parse_filter_arg(">=SORT=10").unwrap();
        assert_eq!(key, ">=SORT");
        assert_eq!(operand, Operand::Scalar(Value::Int64(10)));

        let (key, operand) = parse_filter_arg("!ID=1,2").unwrap();
        assert_eq!(key, "!ID");
        assert_eq!(operand, Operand::List(vec![Value::Int64(1), Value::Int64(2)]));

        let (key, _) = parse_filter_arg("NAME=a=b").unwrap();
        assert_eq!(key, "NAME");

        assert!(parse_filter_arg("ACTIVE").is_err());
        assert!(parse_filter_arg(">=").is_err());
    }

    #[test]
    fn test_build_query() {
        let args = QueryArgs {
            entity: "Element".into(),
            select: vec!["ID".into(), "TAGS".into()],
            filters: vec!["ACTIVE=true".into(), "%NAME=chair".into()],
            order: vec!["DATE_CREATE:desc".into(), "ID".into()],
            multi: vec!["TAGS=VALUE,DESCRIPTION".into()],
            limit: Some(5),
            offset: None,
        };
        let query = build_query(&args).unwrap();

        assert_eq!(query.select.len(), 2);
        assert_eq!(query.filter.conditions.len(), 2);
        assert_eq!(
            query.filter.conditions[1].predicate,
            Predicate::Like("%chair%".into())
        );
        assert_eq!(query.order[0].direction, OrderDirection::Desc);
        assert_eq!(query.order[1].direction, OrderDirection::Asc);
        assert_eq!(
            query.multi_valued.attributes("TAGS").unwrap(),
            &["VALUE".to_string(), "DESCRIPTION".to_string()]
        );
        assert_eq!(query.limit, Some(5));

        let bad = QueryArgs {
            multi: vec!["TAGS".into()],
            ..args
        };
        assert!(matches!(build_query(&bad), Err(CommandError::InvalidMulti(_))));
    }
}
