//! Query execution for listdb.
//!
//! [`QueryEngine`] runs [`ListQuery`](listdb_proto::ListQuery)s against a
//! [`DataSource`]. Queries over multi-valued properties are split by the
//! [`Decomposer`] and reassembled into one row per entity before the
//! [`ResultMapper`] shapes the output.

mod decompose;
mod engine;
mod filter;
mod lookup;
mod mapper;
mod row;
mod source;
mod storage_source;

pub use decompose::{DecomposeOptions, Decomposer};
pub use engine::QueryEngine;
pub use filter::FilterEvaluator;
pub use lookup::{file_path, EnumEntry, EnumTable, FileResolver};
pub use mapper::{format_datetime, render, ResultMapper, FILES_KEY};
pub use row::{EntityRow, IdentityMap, RawRow, RelatedRow, ValueKey};
pub use source::{DataSource, PathInfo, SourceQuery};
pub use storage_source::StorageSource;
