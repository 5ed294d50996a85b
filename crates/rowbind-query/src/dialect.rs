//! Dialect-specific error classification.
//!
//! Unique-constraint violations are reported differently by each backend.
//! Postgres raises SQLSTATE `23505` with a `DETAIL` line such as
//! `Key (email)=(jim@example.com) already exists.`; SQLite raises extended
//! code `2067` with `UNIQUE constraint failed: people.email`.

use rowbind_core::{ConflictEntry, Error, ModelDescriptor, Record, SqlType, Value};

const PG_UNIQUE_VIOLATION: &str = "23505";
const SQLITE_CONSTRAINT_UNIQUE: &str = "2067";

/// True if `err` is a unique-constraint violation.
pub fn is_duplicate_key_error(err: &Error) -> bool {
    match err {
        Error::Database(db) => matches!(
            db.code.as_deref(),
            Some(PG_UNIQUE_VIOLATION | SQLITE_CONSTRAINT_UNIQUE)
        ),
        _ => false,
    }
}

/// Extract the conflicting `(column, value)` pairs from a duplicate-key error.
///
/// Column names are physical. SQLite does not report the value, so it comes
/// back as `Null`.
pub fn parse_duplicate_key_error(err: &Error) -> Option<Vec<(String, Value)>> {
    let Error::Database(db) = err else {
        return None;
    };
    if !is_duplicate_key_error(err) {
        return None;
    }

    if let Some(pairs) = db.detail.as_deref().and_then(parse_pg_detail) {
        return Some(pairs);
    }
    if let Some(pairs) = parse_pg_detail(&db.message) {
        return Some(pairs);
    }
    parse_sqlite_message(&db.message)
}

fn parse_pg_detail(detail: &str) -> Option<Vec<(String, Value)>> {
    let rest = detail.trim().strip_prefix("Key (")?;
    let (columns, rest) = rest.split_once(")=(")?;
    let end = rest.rfind(") already exists")?;
    let values = &rest[..end];

    let columns: Vec<&str> = columns.split(", ").collect();
    let values: Vec<&str> = if columns.len() == 1 {
        vec![values]
    } else {
        values.split(", ").collect()
    };
    if columns.len() != values.len() {
        return None;
    }
    Some(
        columns
            .into_iter()
            .zip(values)
            .map(|(c, v)| (c.trim_matches('"').to_string(), Value::from(v)))
            .collect(),
    )
}

fn parse_sqlite_message(message: &str) -> Option<Vec<(String, Value)>> {
    let (_, columns) = message.split_once("UNIQUE constraint failed: ")?;
    Some(
        columns
            .split(", ")
            .map(|qualified| {
                let column = qualified.rsplit('.').next().unwrap_or(qualified);
                (column.trim().to_string(), Value::Null)
            })
            .collect(),
    )
}

fn typed(sql_type: SqlType, raw: Value) -> Value {
    let Some(text) = raw.as_str() else {
        return raw;
    };
    match sql_type {
        SqlType::BigInt => text.parse().map_or(raw.clone(), Value::BigInt),
        SqlType::Double => text.parse().map_or(raw.clone(), Value::Double),
        SqlType::Bool => match text {
            "t" | "true" => Value::Bool(true),
            "f" | "false" => Value::Bool(false),
            _ => raw.clone(),
        },
        _ => raw.clone(),
    }
}

/// Translate a duplicate-key error into conflict entries over friendly names.
///
/// Values the driver did not report are taken from `record`.
pub fn duplicate_key_conflicts(
    descriptor: &ModelDescriptor,
    err: &Error,
    record: &Record,
) -> Option<Vec<ConflictEntry>> {
    let pairs = parse_duplicate_key_error(err)?;
    Some(
        pairs
            .into_iter()
            .map(|(source, raw)| match descriptor.column_by_source(&source) {
                Some(column) => {
                    let value = if raw.is_null() {
                        record.get(&column.name).cloned().unwrap_or(Value::Null)
                    } else {
                        typed(column.sql_type, raw)
                    };
                    ConflictEntry::unique(column.name.clone(), value)
                }
                None => ConflictEntry::unique(source, raw),
            })
            .collect(),
    )
}
