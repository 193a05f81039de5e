//! Protocol error types.

use thiserror::Error;

/// Errors raised while building query IR.
#[derive(Debug, Error, PartialEq)]
pub enum Error {
    /// A filter key had no field name after its operator prefix.
    #[error("invalid filter key: {0:?}")]
    InvalidFilterKey(String),

    /// An operator prefix that cannot be combined with the given operand.
    #[error("operator {operator} cannot be used with a {operand} operand on {field}")]
    IncompatibleOperand {
        field: String,
        operator: &'static str,
        operand: &'static str,
    },
}
