//! Storage engine for listdb.
//!
//! Records are rkyv-encoded field lists stored in one sled tree per entity.
//! A separate tree holds unique claims used for compare-and-swap de-duplication.

mod config;
mod engine;
mod record;
mod writer;

pub use config::StorageConfig;
pub use engine::{unique_key, StorageEngine};
pub use record::{current_timestamp, Record, StoredField};
pub use writer::EntityWriter;
