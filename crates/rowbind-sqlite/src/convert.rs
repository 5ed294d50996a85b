//! Value binding, row decoding and error mapping between rowbind and sqlx.

use std::sync::Arc;

use rowbind_core::{DatabaseError, Error, Result, Row, Value};
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteRow};
use sqlx::{Column, Row as _, TypeInfo, ValueRef};

pub(crate) type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// Bind `params` in order to `$1..$n`.
pub(crate) fn bind_all<'q>(mut query: SqliteQuery<'q>, params: &'q [Value]) -> SqliteQuery<'q> {
    for param in params {
        query = match param {
            Value::Null => query.bind(None::<i64>),
            Value::Bool(b) => query.bind(*b),
            Value::BigInt(n) | Value::Timestamp(n) => query.bind(*n),
            Value::Double(f) => query.bind(*f),
            Value::Text(s) => query.bind(s.as_str()),
            Value::Json(_) | Value::Array(_) => query.bind(param.to_json().to_string()),
        };
    }
    query
}

/// Decode fetched rows, sharing one column list between them.
pub(crate) fn decode_rows(rows: &[SqliteRow]) -> Result<Vec<Row>> {
    let Some(first) = rows.first() else {
        return Ok(Vec::new());
    };
    let columns: Arc<Vec<String>> = Arc::new(
        first
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect(),
    );
    rows.iter()
        .map(|row| {
            let values = (0..columns.len())
                .map(|i| decode_value(row, i))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(map_err)?;
            Ok(Row::new(Arc::clone(&columns), values))
        })
        .collect()
}

/// Decode by the storage class of the stored value, not the declared type.
fn decode_value(row: &SqliteRow, idx: usize) -> std::result::Result<Value, sqlx::Error> {
    let class = {
        let raw = row.try_get_raw(idx)?;
        if raw.is_null() {
            return Ok(Value::Null);
        }
        raw.type_info().name().to_string()
    };
    Ok(match class.as_str() {
        "INTEGER" => Value::BigInt(row.try_get(idx)?),
        "REAL" => Value::Double(row.try_get(idx)?),
        "BLOB" => {
            let bytes: Vec<u8> = row.try_get(idx)?;
            Value::Text(String::from_utf8_lossy(&bytes).into_owned())
        }
        _ => Value::Text(row.try_get(idx)?),
    })
}

/// Map a sqlx error, keeping SQLite's extended result code (`2067` for a
/// unique violation) as the error code.
pub(crate) fn map_err(err: sqlx::Error) -> Error {
    match err {
        sqlx::Error::Database(db) => {
            let mut mapped = DatabaseError::new(db.message());
            if let Some(code) = db.code() {
                mapped = mapped.with_code(code.into_owned());
            }
            if let Some(constraint) = db.constraint() {
                mapped = mapped.with_constraint(constraint);
            }
            Error::Database(mapped)
        }
        other => Error::Database(DatabaseError::new(other.to_string())),
    }
}
