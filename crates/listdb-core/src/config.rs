//! Engine configuration.

use listdb_proto::Value;

use crate::cache::DEFAULT_MAX_ENTRIES;
use crate::storage::StorageConfig;

/// Default result cache lifetime in seconds.
pub const DEFAULT_CACHE_TTL: u64 = 3600;

/// Default enum table cache lifetime in seconds.
pub const DEFAULT_ENUM_CACHE_TTL: u64 = 86_000;

/// Configuration shared by the engine and the services built on it.
///
/// Built once at startup and passed by reference; nothing mutates it
/// afterwards.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Storage configuration.
    pub storage: StorageConfig,

    /// Cache lifetime for listing results, in seconds.
    pub default_cache_ttl: u64,

    /// Cache lifetime for enum tables, in seconds.
    pub enum_cache_ttl: u64,

    /// Maximum number of cached entries.
    pub cache_max_entries: usize,

    /// Field forced by the unpaginated candidate query.
    pub active_field: String,

    /// Value `active_field` is forced to.
    pub active_value: Value,

    /// Prefix of public file paths.
    pub files_root: String,

    /// Reject paginated queries without an explicit order.
    pub require_order: bool,

    /// Default page size.
    pub page_size: u64,

    /// Pages a batch runner processes per iteration.
    pub pages_per_iteration: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            default_cache_ttl: DEFAULT_CACHE_TTL,
            enum_cache_ttl: DEFAULT_ENUM_CACHE_TTL,
            cache_max_entries: DEFAULT_MAX_ENTRIES,
            active_field: "ACTIVE".to_string(),
            active_value: Value::Bool(true),
            files_root: "/upload/".to_string(),
            require_order: true,
            page_size: 10,
            pages_per_iteration: 10,
        }
    }
}

impl EngineConfig {
    /// Create a config with the given storage settings.
    pub fn new(storage: StorageConfig) -> Self {
        Self {
            storage,
            ..Default::default()
        }
    }

    /// Create a config backed by a temporary database.
    pub fn temporary() -> Self {
        Self::new(StorageConfig::temporary())
    }

    /// Set the listing cache lifetime.
    pub fn with_cache_ttl(mut self, ttl: u64) -> Self {
        self.default_cache_ttl = ttl;
        self
    }

    /// Set the enum table cache lifetime.
    pub fn with_enum_cache_ttl(mut self, ttl: u64) -> Self {
        self.enum_cache_ttl = ttl;
        self
    }

    /// Set the maximum number of cached entries.
    pub fn with_cache_max_entries(mut self, max_entries: usize) -> Self {
        self.cache_max_entries = max_entries;
        self
    }

    /// Set the field and value forced by unpaginated candidate queries.
    pub fn with_active_condition(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.active_field = field.into();
        self.active_value = value.into();
        self
    }

    /// Set the file path prefix.
    pub fn with_files_root(mut self, root: impl Into<String>) -> Self {
        self.files_root = root.into();
        self
    }

    /// Allow or reject paginated queries without an order.
    pub fn with_require_order(mut self, require: bool) -> Self {
        self.require_order = require;
        self
    }

    /// Set the default page size.
    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the pages per batch iteration.
    pub fn with_pages_per_iteration(mut self, pages: u64) -> Self {
        self.pages_per_iteration = pages;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.active_field, "ACTIVE");
        assert_eq!(config.active_value, Value::Bool(true));
        assert_eq!(config.files_root, "/upload/");
        assert!(config.require_order);
        assert_eq!(config.page_size, 10);
        assert_eq!(config.enum_cache_ttl, 86_000);
        assert_eq!(config.cache_max_entries, DEFAULT_MAX_ENTRIES);
    }

    #[test]
    fn test_builder() {
        let config = EngineConfig::temporary()
            .with_cache_ttl(5)
            .with_active_condition("PUBLISHED", "Y")
            .with_files_root("/media/")
            .with_require_order(false)
            .with_page_size(25)
            .with_pages_per_iteration(3)
            .with_cache_max_entries(64);

        assert!(config.storage.temporary);
        assert_eq!(config.default_cache_ttl, 5);
        assert_eq!(config.active_field, "PUBLISHED");
        assert_eq!(config.active_value, Value::from("Y"));
        assert_eq!(config.files_root, "/media/");
        assert!(!config.require_order);
        assert_eq!(config.page_size, 25);
        assert_eq!(config.pages_per_iteration, 3);
        assert_eq!(config.cache_max_entries, 64);
    }
}
