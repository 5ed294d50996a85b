//! SQL generation for rowbind.
//!
//! `rowbind-query` turns descriptors, records and declarative predicates into
//! parameterized SQL. It never talks to a database.
//!
//! - [`expr`]: the expression tree and [`Dialect`] placeholder rendering.
//! - [`clause`]: WHERE and ORDER BY.
//! - [`predicate`]: the `field -> condition` [`Predicate`] and the where-clause
//!   builder that maps it onto physical columns.
//! - [`builder`]: SELECT/INSERT/UPDATE/DELETE builders.
//! - [`dialect`]: unique-violation detection and parsing per backend.

pub mod builder;
pub mod clause;
pub mod dialect;
pub mod expr;
pub mod predicate;

pub use builder::{
    DeleteBuilder, Filterable, InsertBuilder, RawQuery, SelectBuilder, Statement, UpdateBuilder,
};
pub use clause::{Direction, OrderBy, Where};
pub use dialect::{duplicate_key_conflicts, is_duplicate_key_error, parse_duplicate_key_error};
pub use expr::{BinaryOp, Dialect, Expr};
pub use predicate::{Condition, Operator, Predicate, UnknownFieldPolicy, apply, where_expr};
