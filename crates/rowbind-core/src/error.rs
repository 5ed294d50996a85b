//! Error types for rowbind.
//!
//! Every failure leaving the engine carries an [`ErrorKind`] whose
//! [`status_code`](ErrorKind::status_code) mirrors HTTP semantics, so a calling
//! application can forward it directly as a transport-layer status.

use std::fmt;

use serde::Serialize;

use crate::value::Value;

/// Result alias used throughout rowbind.
pub type Result<T> = std::result::Result<T, Error>;

/// Machine-readable error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// No row matched a by-id or guarded lookup.
    NotFound,
    /// Optimistic guard mismatch or unique-constraint violation.
    Conflict,
    /// One or more declared validation rules failed.
    ValidationFailed,
    /// Malformed inclusion spec.
    UnsupportedInclude,
    /// Bounded retries were exhausted.
    TimedOut,
    /// Anything not classified above.
    Unknown,
}

impl ErrorKind {
    /// HTTP-style status code for this kind.
    #[must_use]
    pub const fn status_code(self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::ValidationFailed => 403,
            ErrorKind::UnsupportedInclude => 400,
            ErrorKind::TimedOut => 504,
            ErrorKind::Unknown => 500,
        }
    }

    /// Stable name of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::ValidationFailed => "ValidationFailed",
            ErrorKind::UnsupportedInclude => "UnsupportedInclude",
            ErrorKind::TimedOut => "TimedOut",
            ErrorKind::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single unique-constraint conflict.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConflictEntry {
    /// Friendly field name of the conflicting key.
    pub key: String,
    /// The value that collided.
    pub value: Value,
    /// What the constraint expected (always `"unique"` today).
    pub expected: String,
}

impl ConflictEntry {
    /// Create a uniqueness conflict entry.
    pub fn unique(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
            expected: "unique".to_string(),
        }
    }
}

/// Validation failure for one field.
///
/// Several failed rules on the same field coalesce into one entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldValidationError {
    /// Friendly field name.
    pub field: String,
    /// The value that was checked (`Null` when absent).
    pub value: Value,
    /// Every rule declared for the field.
    pub expected_rules: Vec<String>,
    /// The subset of rules that failed.
    pub failed_rules: Vec<String>,
}

/// The accumulated outcome of validating one record.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationError {
    /// Model the record belongs to.
    pub model: String,
    /// One entry per failing field, in declaration order.
    pub errors: Vec<FieldValidationError>,
}

impl ValidationError {
    /// Create an empty validation result for a model.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            errors: Vec::new(),
        }
    }

    /// True when no field failed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of failing fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Look up the failure entry for a field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldValidationError> {
        self.errors.iter().find(|e| e.field == name)
    }
}

/// An error reported by a database driver.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatabaseError {
    /// SQLSTATE or driver-specific code.
    pub code: Option<String>,
    /// Primary message.
    pub message: String,
    /// Optional detail line (Postgres `DETAIL`).
    pub detail: Option<String>,
    /// Constraint name, when the driver reports one.
    pub constraint: Option<String>,
}

impl DatabaseError {
    /// Create a driver error with only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// Attach a SQLSTATE code.
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Attach a detail line.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Attach a constraint name.
    #[must_use]
    pub fn with_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraint = Some(constraint.into());
        self
    }
}

/// The error type for all rowbind operations.
#[derive(Debug, Clone)]
pub enum Error {
    /// No row matched.
    NotFound {
        /// Model name.
        model: String,
        /// Human readable description of what was looked up.
        criteria: String,
    },
    /// Guard mismatch on update, or unique violation on insert/update.
    Conflict {
        /// Model name.
        model: String,
        /// Human readable description.
        message: String,
        /// Structured unique-key conflicts (empty for guard mismatches).
        conflicts: Vec<ConflictEntry>,
    },
    /// Declared validation rules failed.
    Validation(ValidationError),
    /// The inclusion spec could not be interpreted.
    UnsupportedInclude(String),
    /// A bounded retry loop gave up.
    TimedOut {
        /// Model name.
        model: String,
        /// Attempts made before giving up.
        attempts: u32,
    },
    /// A predicate referenced a field the model does not declare.
    UnknownField {
        /// Model name.
        model: String,
        /// The offending field.
        field: String,
    },
    /// A predicate used an unsupported operator or shape.
    InvalidPredicate(String),
    /// No model registered under this key.
    UnknownModel {
        /// Namespace searched.
        namespace: Option<String>,
        /// Model name searched.
        name: String,
    },
    /// No database client registered under this name.
    UnknownClient(String),
    /// Driver-level failure.
    Database(DatabaseError),
    /// Anything else.
    Custom(String),
}

impl Error {
    /// Create a free-form error.
    pub fn custom(message: impl Into<String>) -> Self {
        Error::Custom(message.into())
    }

    /// Create a guard-mismatch conflict.
    pub fn conflict(model: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Conflict {
            model: model.into(),
            message: message.into(),
            conflicts: Vec::new(),
        }
    }

    /// Create a not-found error.
    pub fn not_found(model: impl Into<String>, criteria: impl Into<String>) -> Self {
        Error::NotFound {
            model: model.into(),
            criteria: criteria.into(),
        }
    }

    /// The machine-readable kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::Conflict { .. } => ErrorKind::Conflict,
            Error::Validation(_) => ErrorKind::ValidationFailed,
            Error::UnsupportedInclude(_) => ErrorKind::UnsupportedInclude,
            Error::TimedOut { .. } => ErrorKind::TimedOut,
            Error::UnknownField { .. }
            | Error::InvalidPredicate(_)
            | Error::UnknownModel { .. }
            | Error::UnknownClient(_)
            | Error::Database(_)
            | Error::Custom(_) => ErrorKind::Unknown,
        }
    }

    /// Shorthand for `self.kind().status_code()`.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        self.kind().status_code()
    }

    /// Per-field failures, when this is a validation error.
    #[must_use]
    pub fn validation_errors(&self) -> Option<&[FieldValidationError]> {
        match self {
            Error::Validation(v) => Some(&v.errors),
            _ => None,
        }
    }

    /// Unique-key conflicts, when this is a conflict error.
    #[must_use]
    pub fn conflicts(&self) -> Option<&[ConflictEntry]> {
        match self {
            Error::Conflict { conflicts, .. } => Some(conflicts),
            _ => None,
        }
    }

    /// True for [`ErrorKind::NotFound`].
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// True for [`ErrorKind::Conflict`].
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotFound { model, criteria } => {
                write!(f, "{model} not found ({criteria})")
            }
            Error::Conflict {
                model,
                message,
                conflicts,
            } => {
                write!(f, "{model} conflict: {message}")?;
                for c in conflicts {
                    write!(f, "; {} = {} is not {}", c.key, c.value, c.expected)?;
                }
                Ok(())
            }
            Error::Validation(v) => {
                write!(f, "{} failed validation", v.model)?;
                for e in &v.errors {
                    write!(f, "; {}: {}", e.field, e.failed_rules.join(", "))?;
                }
                Ok(())
            }
            Error::UnsupportedInclude(msg) => write!(f, "unsupported include: {msg}"),
            Error::TimedOut { model, attempts } => {
                write!(f, "{model} update gave up after {attempts} attempts")
            }
            Error::UnknownField { model, field } => {
                write!(f, "{model} has no field named '{field}'")
            }
            Error::InvalidPredicate(msg) => write!(f, "invalid predicate: {msg}"),
            Error::UnknownModel { namespace, name } => match namespace {
                Some(ns) => write!(f, "no model '{name}' in namespace '{ns}'"),
                None => write!(f, "no model '{name}'"),
            },
            Error::UnknownClient(name) => write!(f, "no database client named '{name}'"),
            Error::Database(e) => {
                match &e.code {
                    Some(code) => write!(f, "database error [{code}]: {}", e.message)?,
                    None => write!(f, "database error: {}", e.message)?,
                }
                if let Some(detail) = &e.detail {
                    write!(f, " ({detail})")?;
                }
                Ok(())
            }
            Error::Custom(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<ValidationError> for Error {
    fn from(value: ValidationError) -> Self {
        Error::Validation(value)
    }
}

impl From<DatabaseError> for Error {
    fn from(value: DatabaseError) -> Self {
        Error::Database(value)
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::Custom(format!("json: {value}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ErrorKind::NotFound.status_code(), 404);
        assert_eq!(ErrorKind::Conflict.status_code(), 409);
        assert_eq!(ErrorKind::ValidationFailed.status_code(), 403);
        assert_eq!(ErrorKind::TimedOut.status_code(), 504);
        assert_eq!(ErrorKind::Unknown.status_code(), 500);
    }

    #[test]
    fn test_driver_errors_are_unknown() {
        let err = Error::from(DatabaseError::new("connection reset").with_code("08006"));
        assert_eq!(err.kind(), ErrorKind::Unknown);
        assert_eq!(
            err.to_string(),
            "database error [08006]: connection reset"
        );
    }

    #[test]
    fn test_validation_accessors() {
        let mut v = ValidationError::new("person");
        v.errors.push(FieldValidationError {
            field: "age".into(),
            value: Value::Null,
            expected_rules: vec!["required".into()],
            failed_rules: vec!["required".into()],
        });
        let err = Error::from(v);
        assert_eq!(err.status_code(), 403);
        assert_eq!(err.validation_errors().map(<[_]>::len), Some(1));
        assert_eq!(err.to_string(), "person failed validation; age: required");
    }

    #[test]
    fn test_conflict_display_lists_keys() {
        let err = Error::Conflict {
            model: "person".into(),
            message: "duplicate key".into(),
            conflicts: vec![ConflictEntry::unique("email", Value::from("a@b.c"))],
        };
        assert!(err.is_conflict());
        assert!(err.to_string().contains("email = a@b.c is not unique"));
    }
}
