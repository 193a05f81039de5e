//! Result caching with tag-based invalidation.
//!
//! [`CacheStore`] is the storage seam; [`MemoryCacheStore`] implements it
//! in-process. [`TaggedCache`] layers typed compute-on-miss on top.

mod key;
mod store;
mod tagged;

pub use key::{entity_tag, named_key, query_fingerprint};
pub use store::{CacheEntry, CacheStats, CacheStore, MemoryCacheStore, DEFAULT_MAX_ENTRIES};
pub use tagged::TaggedCache;
