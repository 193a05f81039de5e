//! listdb Command-Line Client
//!
//! Seeds a demo catalog, lists pages, manages favorites and exports query
//! results in bounded batches against a local listdb database.

mod commands;
mod formatter;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use commands::{CommandError, FavoriteAction, QueryArgs};
use formatter::OutputFormat;
use listdb_core::cache::DEFAULT_MAX_ENTRIES;
use listdb_core::config::DEFAULT_CACHE_TTL;
use listdb_core::{EngineConfig, ListDb, StorageConfig};
use tracing_subscriber::EnvFilter;

/// listdb Command-Line Client
#[derive(Parser, Debug)]
#[command(name = "listdb")]
#[command(version, about = "listdb Command-Line Client")]
pub struct Args {
    /// Database directory
    #[arg(short = 'd', long, default_value = "./listdb_data")]
    pub data_dir: PathBuf,

    /// Use a temporary database that is deleted on exit
    #[arg(long)]
    pub temporary: bool,

    /// Listing cache lifetime in seconds
    #[arg(long, default_value_t = DEFAULT_CACHE_TTL)]
    pub cache_ttl: u64,

    /// Maximum number of cached entries
    #[arg(long, default_value_t = DEFAULT_MAX_ENTRIES)]
    pub cache_max_entries: usize,

    /// Prefix of public file paths
    #[arg(long, default_value = "/upload/")]
    pub files_root: String,

    /// Default page size
    #[arg(long, default_value_t = 10)]
    pub page_size: u64,

    /// Pages processed per batch iteration
    #[arg(long, default_value_t = 10)]
    pub pages_per_iteration: u64,

    /// Output format
    #[arg(long, default_value = "table", value_enum)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Install the demo schema and write sample elements
    Seed {
        /// Number of elements to write
        #[arg(long, default_value_t = 30)]
        elements: i64,
    },

    /// Describe the entities of the current schema
    Schema,

    /// Show one catalog listing page
    List {
        /// User whose favorites are flagged
        #[arg(long)]
        user: String,

        /// 1-based page number
        #[arg(long, default_value_t = 1)]
        page: i64,

        /// Items per page (defaults to --page-size)
        #[arg(long, default_value_t = 0)]
        limit: i64,
    },

    /// Run a list query
    Query(QueryOpts),

    /// Manage favorites
    Favorite {
        #[command(subcommand)]
        action: FavoriteCommand,
    },

    /// Export a query as JSON lines in batches
    Export {
        #[command(flatten)]
        query: QueryOpts,

        /// Page to start at
        #[arg(long, default_value_t = 1)]
        start_page: u64,

        /// Stop after this many iterations
        #[arg(long)]
        max_iterations: Option<u64>,
    },
}

#[derive(clap::Args, Debug)]
pub struct QueryOpts {
    /// Entity to query
    #[arg(long, default_value = "Element")]
    pub entity: String,

    /// Select list
    #[arg(long, value_delimiter = ',', default_value = "ID")]
    pub select: Vec<String>,

    /// Filter entries as KEY=VALUE; KEY may carry a !, =, <, <=, >, >= or % prefix
    #[arg(long = "filter")]
    pub filters: Vec<String>,

    /// Order keys as FIELD or FIELD:desc
    #[arg(long)]
    pub order: Vec<String>,

    /// Multi-valued fields as FIELD=ATTR,ATTR
    #[arg(long)]
    pub multi: Vec<String>,

    #[arg(long)]
    pub limit: Option<u64>,

    #[arg(long)]
    pub offset: Option<u64>,
}

impl From<QueryOpts> for QueryArgs {
    fn from(opts: QueryOpts) -> Self {
        Self {
            entity: opts.entity,
            select: opts.select,
            filters: opts.filters,
            order: opts.order,
            multi: opts.multi,
            limit: opts.limit,
            offset: opts.offset,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum FavoriteCommand {
    /// Mark an item as a favorite
    Add {
        #[arg(long)]
        user: String,
        #[arg(long)]
        item: i64,
    },
    /// Remove a favorite
    Remove {
        #[arg(long)]
        user: String,
        #[arg(long)]
        item: i64,
    },
    /// Check whether an item is a favorite
    Check {
        #[arg(long)]
        user: String,
        #[arg(long)]
        item: i64,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("listdb=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match run(args) {
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn config(args: &Args) -> EngineConfig {
    let storage = if args.temporary {
        StorageConfig::temporary()
    } else {
        StorageConfig::new(&args.data_dir)
    };

    EngineConfig::new(storage)
        .with_cache_ttl(args.cache_ttl)
        .with_cache_max_entries(args.cache_max_entries)
        .with_files_root(args.files_root.clone())
        .with_page_size(args.page_size)
        .with_pages_per_iteration(args.pages_per_iteration)
}

fn run(args: Args) -> Result<String, CommandError> {
    let db = ListDb::open(config(&args))?;
    let formatter = formatter::create_formatter(args.format);

    match args.command {
        Command::Seed { elements } => commands::seed(&db, elements),
        Command::Schema => commands::schema(&db, formatter.as_ref()),
        Command::List { user, page, limit } => {
            commands::list(&db, formatter.as_ref(), &user, page, limit)
        }
        Command::Query(opts) => commands::query(&db, formatter.as_ref(), &opts.into()),
        Command::Favorite { action } => {
            let (action, user, item) = match action {
                FavoriteCommand::Add { user, item } => (FavoriteAction::Add, user, item),
                FavoriteCommand::Remove { user, item } => (FavoriteAction::Remove, user, item),
                FavoriteCommand::Check { user, item } => (FavoriteAction::Check, user, item),
            };
            commands::favorite(&db, formatter.as_ref(), action, &user, item)
        }
        Command::Export {
            query,
            start_page,
            max_iterations,
        } => commands::export(&db, &query.into(), start_page, max_iterations),
    }
}
