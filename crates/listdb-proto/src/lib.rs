//! listdb query IR and result types.
//!
//! This crate defines the types exchanged with the list-query engine:
//!
//! - [`value`] - Scalar values stored in records and used in filters
//! - [`query`] - The list query IR: select, filter, order, joins, pagination
//! - [`result`] - Mapped result rows and result sets
//! - [`error`] - Errors raised while building query IR
//!
//! Stored values derive `rkyv` traits for the record store; everything derives
//! `serde` traits so queries can be fingerprinted and results cached.

pub mod error;
pub mod query;
pub mod result;
pub mod value;

pub use error::Error;

// Re-export commonly used types at crate root
pub use query::{
    Condition, Filter, JoinType, ListQuery, MultiValuedSpec, Operand, OrderDirection, OrderSpec,
    Predicate, RuntimeJoin, SelectItem,
};
pub use result::{Cell, FileRef, ResultRow, ResultSet};
pub use value::Value;
