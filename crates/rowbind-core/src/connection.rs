//! Database driver contract.
//!
//! rowbind does not talk to a database itself. Drivers implement
//! [`Connection`] (parameterized SQL in, rows or a row count out) and hand out
//! transactions implementing [`TransactionOps`].

use std::future::Future;

use crate::error::Result;
use crate::row::Row;
use crate::value::Value;

/// A database connection capable of running parameterized SQL.
pub trait Connection: Send + Sync {
    /// Transaction handle produced by [`Connection::begin`].
    type Tx<'conn>: TransactionOps
    where
        Self: 'conn;

    /// Run a statement that produces rows (SELECT, or DML with RETURNING).
    fn query(&self, sql: &str, params: &[Value]) -> impl Future<Output = Result<Vec<Row>>> + Send;

    /// Run a statement and return the number of rows affected.
    fn execute(&self, sql: &str, params: &[Value]) -> impl Future<Output = Result<u64>> + Send;

    /// Open a transaction.
    fn begin(&self) -> impl Future<Output = Result<Self::Tx<'_>>> + Send;
}

/// Operations available inside a transaction.
pub trait TransactionOps: Send + Sync {
    /// Run a statement that produces rows.
    fn query(&self, sql: &str, params: &[Value]) -> impl Future<Output = Result<Vec<Row>>> + Send;

    /// Run a statement and return the number of rows affected.
    fn execute(&self, sql: &str, params: &[Value]) -> impl Future<Output = Result<u64>> + Send;

    /// Commit, consuming the handle.
    fn commit(self) -> impl Future<Output = Result<()>> + Send;

    /// Roll back, consuming the handle.
    fn rollback(self) -> impl Future<Output = Result<()>> + Send;
}
