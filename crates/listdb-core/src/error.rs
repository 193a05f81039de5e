//! Core error types.

use thiserror::Error;

/// Core engine errors.
///
/// `Storage` and `DataSource` are data-source failures and are propagated
/// unchanged. `Validation`, `UnknownEntity` and `UnknownField` describe a
/// malformed query and are never retried.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Failure reported by a non-sled data source.
    #[error("data source error: {0}")]
    DataSource(String),

    /// Protocol error while building query IR.
    #[error("protocol error: {0}")]
    Protocol(#[from] listdb_proto::Error),

    /// Malformed query or request.
    #[error("validation error: {0}")]
    Validation(String),

    /// Entity missing from the catalog.
    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    /// Field or relation missing from an entity.
    #[error("unknown field {field} on {entity}")]
    UnknownField { entity: String, field: String },

    /// The record being created already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The record being addressed does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Cache store failure.
    #[error("cache error: {0}")]
    Cache(String),
}

impl Error {
    /// Check whether the error describes a malformed request.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::Validation(_) | Error::UnknownEntity(_) | Error::UnknownField { .. } | Error::Protocol(_)
        )
    }

    pub(crate) fn unknown_field(entity: &str, field: &str) -> Self {
        Error::UnknownField {
            entity: entity.to_string(),
            field: field.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
