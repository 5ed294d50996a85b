//! Core types and traits for rowbind.
//!
//! `rowbind-core` is the **foundation layer** for the workspace. It defines the
//! data types every other crate passes around and the pure, synchronous
//! pieces of the record lifecycle.
//!
//! # Role In The Architecture
//!
//! - **Contract layer**: [`Connection`] and [`TransactionOps`] are implemented by
//!   database drivers.
//! - **Data model**: [`Value`], [`Row`] and [`Record`] carry query inputs and
//!   outputs; [`ModelDescriptor`] is the static configuration of one table
//!   mapping.
//! - **Pipeline stages**: the column mapper ([`mapper`]), the validator
//!   ([`validate`]) and the hook runner ([`hooks`]) are used by the engine in
//!   `rowbind-session` around every read and write.
//!
//! Most applications should use the `rowbind` facade; reach for `rowbind-core`
//! directly when writing drivers.

pub mod connection;
pub mod descriptor;
pub mod error;
pub mod hooks;
pub mod mapper;
pub mod naming;
pub mod record;
pub mod row;
pub mod validate;
pub mod value;

pub use connection::{Connection, TransactionOps};
pub use descriptor::{
    ColumnInfo, DescriptorBuilder, ModelDescriptor, RelationInfo, RelationKind, SqlType,
};
pub use error::{
    ConflictEntry, DatabaseError, Error, ErrorKind, FieldValidationError, Result, ValidationError,
};
pub use hooks::{HookFn, HookName, run_hooks};
pub use naming::quote_ident;
pub use record::{Record, Related};
pub use row::Row;
pub use validate::{Rule, ValidationContext};
pub use value::Value;
