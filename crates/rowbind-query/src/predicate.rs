//! Declarative predicates and the where-clause builder.
//!
//! A [`Predicate`] is an ordered list of `field -> condition` entries using
//! friendly field names. A condition is either a plain value (equality) or a
//! set of `operator -> value` pairs:
//!
//! ```
//! use rowbind_query::Predicate;
//! use serde_json::json;
//!
//! let p = Predicate::from_json(json!({"age": {"gt": 20, "lt": 32}, "name": "Jim"})).unwrap();
//! assert_eq!(p.len(), 2);
//! ```
//!
//! [`where_expr`] translates a predicate into an [`Expr`] over physical
//! columns. Equality against null becomes `IS NULL` and not-equals against
//! null becomes `IS NOT NULL`.

use std::fmt;

use rowbind_core::{Error, ModelDescriptor, Result, Value};

use crate::builder::Filterable;
use crate::expr::Expr;

/// Comparison operators accepted in predicate objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `eq`, `is`, `eql`
    Eq,
    /// `not`
    Not,
    /// `gt`
    Gt,
    /// `gte`
    Gte,
    /// `lt`
    Lt,
    /// `lte`
    Lte,
    /// `like`
    Like,
    /// `notLike`
    NotLike,
    /// `in`
    In,
    /// `notIn`
    NotIn,
}

impl Operator {
    /// Parse an operator key.
    pub fn parse(key: &str) -> Result<Self> {
        Ok(match key {
            "eq" | "is" | "eql" => Operator::Eq,
            "not" => Operator::Not,
            "gt" => Operator::Gt,
            "gte" => Operator::Gte,
            "lt" => Operator::Lt,
            "lte" => Operator::Lte,
            "like" => Operator::Like,
            "notLike" => Operator::NotLike,
            "in" => Operator::In,
            "notIn" => Operator::NotIn,
            other => {
                return Err(Error::InvalidPredicate(format!(
                    "unknown operator '{other}'"
                )));
            }
        })
    }

    /// Canonical key.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Not => "not",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::Like => "like",
            Operator::NotLike => "notLike",
            Operator::In => "in",
            Operator::NotIn => "notIn",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What one predicate entry requires of its field.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Plain value: equality (list values mean `IN`).
    Equals(Value),
    /// Operator object, every pair must hold.
    Ops(Vec<(Operator, Value)>),
}

/// An ordered `field -> condition` filter over friendly field names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    entries: Vec<(String, Condition)>,
}

impl Predicate {
    /// An empty predicate (matches everything).
    pub fn new() -> Self {
        Self::default()
    }

    /// `{id: value}`
    pub fn by_id(id: impl Into<Value>) -> Self {
        Self::new().eq("id", id)
    }

    /// Require `field = value`.
    #[must_use]
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries
            .push((field.into(), Condition::Equals(value.into())));
        self
    }

    /// Require `field <op> value`.
    ///
    /// Consecutive calls for the same field accumulate into one operator object.
    #[must_use]
    pub fn op(mut self, field: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        let field = field.into();
        let value = value.into();
        match self.entries.last_mut() {
            Some((last, Condition::Ops(ops))) if *last == field => ops.push((op, value)),
            _ => self.entries.push((field, Condition::Ops(vec![(op, value)]))),
        }
        self
    }

    /// Parse a JSON object literal.
    ///
    /// Object-valued entries are operator maps; anything else is equality.
    pub fn from_json(json: serde_json::Value) -> Result<Self> {
        let map = match json {
            serde_json::Value::Object(map) => map,
            other => {
                return Err(Error::InvalidPredicate(format!(
                    "predicate must be a JSON object, got {other}"
                )));
            }
        };
        let mut entries = Vec::with_capacity(map.len());
        for (field, value) in map {
            let condition = match value {
                serde_json::Value::Object(ops) => Condition::Ops(
                    ops.into_iter()
                        .map(|(key, v)| Ok((Operator::parse(&key)?, Value::from_json(v))))
                        .collect::<Result<Vec<_>>>()?,
                ),
                other => Condition::Equals(Value::from_json(other)),
            };
            entries.push((field, condition));
        }
        Ok(Self { entries })
    }

    /// Append every entry of `other`.
    #[must_use]
    pub fn merge(mut self, other: Predicate) -> Self {
        self.entries.extend(other.entries);
        self
    }

    /// Entries in order.
    pub fn entries(&self) -> &[(String, Condition)] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (field, condition)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match condition {
                Condition::Equals(v) => write!(f, "{field}: {v}")?,
                Condition::Ops(ops) => {
                    write!(f, "{field}: {{")?;
                    for (j, (op, v)) in ops.iter().enumerate() {
                        if j > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{op}: {v}")?;
                    }
                    f.write_str("}")?;
                }
            }
        }
        f.write_str("}")
    }
}

/// What to do with predicate fields the descriptor does not declare.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnknownFieldPolicy {
    /// Drop the entry and log a warning.
    #[default]
    Skip,
    /// Fail with [`Error::UnknownField`].
    Reject,
}

impl UnknownFieldPolicy {
    /// Parse `skip` / `reject`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "skip" => Some(UnknownFieldPolicy::Skip),
            "reject" => Some(UnknownFieldPolicy::Reject),
            _ => None,
        }
    }
}

fn list_operand(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        single => vec![single],
    }
}

fn condition_expr(column: &str, op: Operator, value: Value) -> Expr {
    let col = Expr::col(column);
    match op {
        Operator::Eq if value.is_null() => col.is_null(),
        Operator::Eq => col.eq(value),
        Operator::Not if value.is_null() => col.is_not_null(),
        Operator::Not => col.ne(value),
        Operator::Gt => col.gt(value),
        Operator::Gte => col.ge(value),
        Operator::Lt => col.lt(value),
        Operator::Lte => col.le(value),
        Operator::Like => col.like(value),
        Operator::NotLike => col.not_like(value),
        Operator::In => col.in_list(list_operand(value)),
        Operator::NotIn => col.not_in(list_operand(value)),
    }
}

/// Translate a predicate into a filter over physical columns.
///
/// Returns `None` when no entry produced a condition.
pub fn where_expr(
    descriptor: &ModelDescriptor,
    predicate: &Predicate,
    policy: UnknownFieldPolicy,
) -> Result<Option<Expr>> {
    let mut conditions = Vec::new();
    for (field, condition) in predicate.entries() {
        let Some(column) = descriptor.column(field) else {
            match policy {
                UnknownFieldPolicy::Skip => {
                    tracing::warn!(
                        model = descriptor.name(),
                        field = %field,
                        "skipping predicate on unknown field"
                    );
                    continue;
                }
                UnknownFieldPolicy::Reject => {
                    return Err(Error::UnknownField {
                        model: descriptor.name().to_string(),
                        field: field.clone(),
                    });
                }
            }
        };
        match condition {
            Condition::Equals(Value::Array(items)) => {
                conditions.push(Expr::col(&column.source).in_list(items.clone()));
            }
            Condition::Equals(value) => {
                conditions.push(condition_expr(&column.source, Operator::Eq, value.clone()));
            }
            Condition::Ops(ops) => {
                conditions.extend(
                    ops.iter()
                        .map(|(op, value)| condition_expr(&column.source, *op, value.clone())),
                );
            }
        }
    }
    Ok(Expr::all(conditions))
}

/// Apply a predicate to any filterable builder.
pub fn apply<B: Filterable>(
    descriptor: &ModelDescriptor,
    query: B,
    predicate: &Predicate,
    policy: UnknownFieldPolicy,
) -> Result<B> {
    Ok(match where_expr(descriptor, predicate, policy)? {
        Some(expr) => query.and_where(expr),
        None => query,
    })
}
