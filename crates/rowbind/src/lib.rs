//! rowbind: descriptor-driven data mapping for SQL tables.
//!
//! Describe a table once with a [`ModelDescriptor`], register it with a
//! [`Database`] next to a driver implementing [`Connection`], then read and
//! write plain [`Record`]s through a [`ModelHandle`]:
//!
//! - friendly camelCase fields map onto snake_case columns
//! - declared rules are checked and lifecycle hooks run on every save
//! - updates on revisioned models are guarded, so a stale copy fails with
//!   a conflict instead of overwriting a newer row
//! - `include` batch-loads `belongsTo` / `hasMany` / `hasOne` relations with
//!   one query per relation per level
//!
//! # Example
//!
//! ```ignore
//! use rowbind::prelude::*;
//!
//! let db = Database::new();
//! db.register_client("default", conn)?;
//! db.define(
//!     ModelDescriptor::builder("person")
//!         .table("people")
//!         .column("name", SqlType::Text)
//!         .column("age", SqlType::BigInt)
//!         .validate_field("age", Rule::required())
//!         .revisioned()
//!         .build(),
//! )?;
//!
//! let people = db.model("person")?;
//! let jim = people.save(&Record::new().with("name", "Jim").with("age", 25)).await?;
//! let adults = people.all(&Predicate::from_json(json!({"age": {"gte": 18}}))?).await?;
//! ```

pub use rowbind_core;
pub use rowbind_query;
pub use rowbind_session;

#[cfg(feature = "sqlite")]
pub use rowbind_sqlite;

pub use rowbind_core::{
    ColumnInfo, ConflictEntry, Connection, DatabaseError, DescriptorBuilder, Error, ErrorKind,
    FieldValidationError, HookName, ModelDescriptor, Record, Related, RelationInfo, RelationKind,
    Result, Row, Rule, SqlType, TransactionOps, ValidationError, Value,
};
pub use rowbind_query::{
    Dialect, Direction, Expr, Operator, Predicate, SelectBuilder, Statement, UnknownFieldPolicy,
};
pub use rowbind_session::{
    Database, EngineConfig, Include, Lookup, ModelHandle, N1Stats, Order, QueryOptions,
};

/// Everything an application usually needs.
pub mod prelude {
    pub use crate::{
        Connection, Database, Direction, EngineConfig, Error, ErrorKind, Expr, HookName, Include,
        Lookup, ModelDescriptor, ModelHandle, Operator, Predicate, QueryOptions, Record, Related,
        RelationKind, Result, Rule, SqlType, Value,
    };
    pub use serde_json::json;
}
