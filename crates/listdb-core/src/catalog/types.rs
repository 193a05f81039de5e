//! Core type definitions for the catalog.

use rkyv::{Archive, Deserialize, Serialize};

/// Scalar data types of entity fields.
#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub enum ScalarType {
    /// Boolean value.
    Bool,
    /// 64-bit signed integer.
    Int64,
    /// 64-bit floating point.
    Float64,
    /// UTF-8 string.
    String,
    /// Timestamp (microseconds since Unix epoch).
    DateTime,
    /// Reference to a `File` record by id.
    File,
    /// Reference to a `PropertyEnum` entry of the given property code.
    Enum(String),
}

impl ScalarType {
    /// Check if this type is numeric.
    pub fn is_numeric(&self) -> bool {
        matches!(self, ScalarType::Int64 | ScalarType::Float64)
    }

    /// Check if values of this type are ids of another record.
    pub fn is_reference(&self) -> bool {
        matches!(self, ScalarType::File | ScalarType::Enum(_))
    }

    /// Get the enum property code, if this is an enum reference.
    pub fn enum_code(&self) -> Option<&str> {
        match self {
            ScalarType::Enum(code) => Some(code),
            _ => None,
        }
    }
}
