//! Pool-backed connection and transaction handles.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rowbind_core::{Connection, Error, Result, Row, TransactionOps, Value, quote_ident};
use sqlx::sqlite::{
    Sqlite, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
};
use tokio::sync::Mutex as AsyncMutex;

use crate::convert::{bind_all, decode_rows, map_err};
use crate::schema::TableDef;

/// A SQLite database behind a sqlx pool.
///
/// Every statement sent through [`Connection`] or [`TransactionOps`] is
/// appended to a shared log, including `BEGIN`, `COMMIT` and `ROLLBACK`.
/// Schema statements and [`table_rows`](Self::table_rows) are not logged.
/// Clones share the pool and the log.
#[derive(Debug, Clone)]
pub struct SqliteConnection {
    pool: SqlitePool,
    log: Arc<Mutex<Vec<String>>>,
}

impl SqliteConnection {
    /// A private in-memory database.
    ///
    /// The pool holds a single connection that is never recycled, so the
    /// database lives as long as the pool.
    pub async fn memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(map_err)?;
        Self::connect_with(options, 1).await
    }

    /// A database file, created if missing.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        Self::connect_with(options, 4).await
    }

    async fn connect_with(options: SqliteConnectOptions, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(map_err)?;
        tracing::debug!(target: "rowbind::sqlite", max_connections, "opened pool");
        Ok(Self {
            pool,
            log: Arc::default(),
        })
    }

    /// Create a table.
    pub async fn create_table(&self, def: &TableDef) -> Result<()> {
        tracing::debug!(target: "rowbind::sqlite", table = def.name(), "create table");
        sqlx::query(&def.create_sql())
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(())
    }

    /// Builder form of [`create_table`](Self::create_table).
    pub async fn with_table(self, def: TableDef) -> Result<Self> {
        self.create_table(&def).await?;
        Ok(self)
    }

    /// Every row of `table` ordered by `id`, without touching the log.
    ///
    /// Waits for a pooled connection, so do not call it while a
    /// transaction on an in-memory database is open.
    pub async fn table_rows(&self, table: &str) -> Result<Vec<Row>> {
        let sql = format!("SELECT * FROM {} ORDER BY \"id\"", quote_ident(table));
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(map_err)?;
        decode_rows(&rows)
    }

    /// Statements sent so far, oldest first.
    pub fn statements(&self) -> Vec<String> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Forget logged statements.
    pub fn clear_statements(&self) {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Logged statements starting with `prefix`, ignoring ASCII case.
    pub fn statement_count(&self, prefix: &str) -> usize {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|sql| {
                sql.get(..prefix.len())
                    .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
            })
            .count()
    }

    fn record(&self, sql: &str) {
        tracing::trace!(target: "rowbind::sqlite", sql, "statement");
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sql.to_string());
    }
}

impl Connection for SqliteConnection {
    type Tx<'conn> = SqliteTransaction<'conn>;

    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.record(sql);
        let rows = bind_all(sqlx::query(sql), params)
            .fetch_all(&self.pool)
            .await
            .map_err(map_err)?;
        decode_rows(&rows)
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.record(sql);
        let done = bind_all(sqlx::query(sql), params)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(done.rows_affected())
    }

    async fn begin(&self) -> Result<Self::Tx<'_>> {
        let tx = self.pool.begin().await.map_err(map_err)?;
        self.record("BEGIN");
        Ok(SqliteTransaction {
            conn: self,
            tx: AsyncMutex::new(Some(tx)),
        })
    }
}

/// An open transaction. Dropping it without commit rolls back.
pub struct SqliteTransaction<'conn> {
    conn: &'conn SqliteConnection,
    tx: AsyncMutex<Option<sqlx::Transaction<'static, Sqlite>>>,
}

fn finished() -> Error {
    Error::custom("transaction already finished")
}

impl TransactionOps for SqliteTransaction<'_> {
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.conn.record(sql);
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(finished)?;
        let rows = bind_all(sqlx::query(sql), params)
            .fetch_all(&mut **tx)
            .await
            .map_err(map_err)?;
        decode_rows(&rows)
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.conn.record(sql);
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(finished)?;
        let done = bind_all(sqlx::query(sql), params)
            .execute(&mut **tx)
            .await
            .map_err(map_err)?;
        Ok(done.rows_affected())
    }

    async fn commit(mut self) -> Result<()> {
        let tx = self.tx.get_mut().take().ok_or_else(finished)?;
        tx.commit().await.map_err(map_err)?;
        self.conn.record("COMMIT");
        Ok(())
    }

    async fn rollback(mut self) -> Result<()> {
        let tx = self.tx.get_mut().take().ok_or_else(finished)?;
        tx.rollback().await.map_err(map_err)?;
        self.conn.record("ROLLBACK");
        Ok(())
    }
}

impl Drop for SqliteTransaction<'_> {
    fn drop(&mut self) {
        if self.tx.get_mut().is_some() {
            tracing::debug!(target: "rowbind::sqlite", "transaction dropped without commit");
            self.conn.record("ROLLBACK");
        }
    }
}

impl fmt::Debug for SqliteTransaction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteTransaction")
            .field("open", &self.tx.try_lock().map(|tx| tx.is_some()).ok())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowbind_query::{is_duplicate_key_error, parse_duplicate_key_error};

    async fn people() -> SqliteConnection {
        SqliteConnection::memory()
            .await
            .unwrap()
            .with_table(TableDef::new("people").column("name").unique("email"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_returning_rows_and_log() {
        let conn = people().await;
        let rows = conn
            .query(
                "INSERT INTO \"people\" (\"name\", \"email\") VALUES ($1, $2) RETURNING *",
                &[Value::from("Ann"), Value::Null],
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_by_name("id"), Some(&Value::BigInt(1)));
        assert_eq!(rows[0].get_by_name("name"), Some(&Value::from("Ann")));
        assert_eq!(rows[0].get_by_name("email"), Some(&Value::Null));
        assert_eq!(conn.statement_count("insert"), 1);

        let affected = conn
            .execute("DELETE FROM \"people\" WHERE \"id\" = ?1", &[Value::BigInt(1)])
            .await
            .unwrap();
        assert_eq!(affected, 1);
        assert_eq!(conn.statements().len(), 2);
        conn.clear_statements();
        assert!(conn.statements().is_empty());
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let conn = people().await;
        let tx = conn.begin().await.unwrap();
        tx.execute(
            "INSERT INTO \"people\" (\"name\") VALUES ($1)",
            &[Value::from("Ann")],
        )
        .await
        .unwrap();
        tx.rollback().await.unwrap();
        assert!(conn.table_rows("people").await.unwrap().is_empty());
        assert_eq!(conn.statements()[0], "BEGIN");
        assert_eq!(conn.statements().last().map(String::as_str), Some("ROLLBACK"));
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let conn = people().await;
        {
            let tx = conn.begin().await.unwrap();
            tx.execute(
                "INSERT INTO \"people\" (\"name\") VALUES ($1)",
                &[Value::from("Ann")],
            )
            .await
            .unwrap();
        }
        assert_eq!(conn.statement_count("ROLLBACK"), 1);
        assert!(conn.table_rows("people").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_commit_persists() {
        let conn = people().await;
        let tx = conn.begin().await.unwrap();
        tx.execute(
            "INSERT INTO \"people\" (\"name\") VALUES ($1)",
            &[Value::from("Ann")],
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();
        let rows = conn.table_rows("people").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(conn.statements().last().map(String::as_str), Some("COMMIT"));
    }

    #[tokio::test]
    async fn test_unique_violation_reports_extended_code() {
        let conn = people().await;
        let insert = "INSERT INTO \"people\" (\"email\") VALUES ($1)";
        conn.execute(insert, &[Value::from("a@b.c")]).await.unwrap();
        let err = conn
            .execute(insert, &[Value::from("a@b.c")])
            .await
            .unwrap_err();
        let Error::Database(db) = &err else {
            panic!("expected a database error, got {err:?}");
        };
        assert_eq!(db.code.as_deref(), Some("2067"));
        assert!(db.message.contains("people.email"));

        assert!(is_duplicate_key_error(&err));
        assert_eq!(
            parse_duplicate_key_error(&err),
            Some(vec![("email".to_string(), Value::Null)])
        );
    }

    #[tokio::test]
    async fn test_values_keep_storage_class() {
        let conn = SqliteConnection::memory()
            .await
            .unwrap()
            .with_table(TableDef::new("t").column("a").column("b").column("c"))
            .await
            .unwrap();
        let rows = conn
            .query(
                "INSERT INTO \"t\" (\"a\", \"b\", \"c\") VALUES ($1, $2, $3) RETURNING *",
                &[
                    Value::Double(1.5),
                    Value::Bool(true),
                    Value::Array(vec![Value::BigInt(1), Value::from("x")]),
                ],
            )
            .await
            .unwrap();
        assert_eq!(rows[0].get_by_name("a"), Some(&Value::Double(1.5)));
        assert_eq!(rows[0].get_by_name("b"), Some(&Value::BigInt(1)));
        assert_eq!(rows[0].get_by_name("c"), Some(&Value::from("[1,\"x\"]")));
    }
}
