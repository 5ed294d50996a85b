//! SQLite driver for rowbind.
//!
//! [`SqliteConnection`] implements [`rowbind_core::Connection`] over a sqlx
//! [`SqlitePool`](sqlx::SqlitePool). Parameters bind positionally to the
//! `$n`/`?n` placeholders rowbind's builders emit, and unique violations
//! surface as [`rowbind_core::Error::Database`] with SQLite's extended code
//! `2067`. Every statement is logged so tests can assert on query counts.
//!
//! ```ignore
//! use rowbind_sqlite::{SqliteConnection, TableDef};
//!
//! let conn = SqliteConnection::memory()
//!     .await?
//!     .with_table(TableDef::new("people").column("name").unique("email"))
//!     .await?;
//! assert!(conn.table_rows("people").await?.is_empty());
//! ```

mod connection;
mod convert;
mod schema;

pub use connection::{SqliteConnection, SqliteTransaction};
pub use schema::TableDef;
