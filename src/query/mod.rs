//! GQL: a small SQL-flavored query language over stored documents.
//!
//! The pipeline is parse once, execute once: [`parse_query`] produces a
//! [`crate::models::Query`], and [`executor_for`] picks the execution
//! strategy the backend supports. Both strategies share the filter and
//! ordering semantics in [`eval`], so a query means the same thing
//! everywhere.

pub mod eval;
pub mod executor;
pub mod indexed;
pub mod lexer;
pub mod parser;
pub mod tree_walk;

pub use executor::{CancelToken, QueryExecutor, executor_for};
pub use indexed::IndexedExecutor;
pub use tree_walk::TreeWalkExecutor;

use crate::Result;
use crate::models::Query;

/// Parses a GQL string into a [`Query`].
///
/// # Errors
///
/// Returns [`crate::Error::QueryParse`] for malformed input, pointing at
/// the byte position of the problem.
pub fn parse_query(input: &str) -> Result<Query> {
    parser::parse(input)
}
