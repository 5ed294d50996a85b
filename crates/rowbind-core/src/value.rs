//! Dynamically typed column values.

use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::ser::{Serialize, SerializeSeq, Serializer};

/// A single SQL value as it travels between records, predicates and drivers.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// SQL NULL (and "absent" when read from a record).
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit integer.
    BigInt(i64),
    /// 64-bit float.
    Double(f64),
    /// Text.
    Text(String),
    /// Microseconds since the Unix epoch.
    Timestamp(i64),
    /// Arbitrary JSON document.
    Json(serde_json::Value),
    /// A list of values (used for `IN` operands).
    Array(Vec<Value>),
}

impl Value {
    /// True for `Null`.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Truthiness as used for "does this record have an id".
    ///
    /// `Null`, `false`, `0`, `0.0` and the empty string are falsy.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::BigInt(i) => *i != 0,
            Value::Double(f) => *f != 0.0 && !f.is_nan(),
            Value::Text(s) => !s.is_empty(),
            Value::Timestamp(_) | Value::Array(_) => true,
            Value::Json(j) => !j.is_null(),
        }
    }

    /// Integer view (integral doubles included).
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::BigInt(i) | Value::Timestamp(i) => Some(*i),
            Value::Double(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    /// Float view of numeric values.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::BigInt(i) => Some(*i as f64),
            Value::Double(f) => Some(*f),
            _ => None,
        }
    }

    /// String view of text values.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Boolean view.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Element view of array values.
    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Short type name for diagnostics.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::BigInt(_) => "bigint",
            Value::Double(_) => "double",
            Value::Text(_) => "text",
            Value::Timestamp(_) => "timestamp",
            Value::Json(_) => "json",
            Value::Array(_) => "array",
        }
    }

    /// SQL-style comparison.
    ///
    /// Numbers compare across integer/float, text lexically, timestamps and
    /// booleans by value. Anything involving `Null` or mismatched types is
    /// incomparable.
    #[must_use]
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::BigInt(a), Value::BigInt(b)) | (Value::Timestamp(a), Value::Timestamp(b)) => {
                Some(a.cmp(b))
            }
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => None,
            },
        }
    }

    /// Equality with numeric normalisation (`1 == 1.0`).
    #[must_use]
    pub fn loosely_equals(&self, other: &Value) -> bool {
        match self.compare(other) {
            Some(ordering) => ordering == Ordering::Equal,
            None => self == other,
        }
    }

    /// Stable hash used to group rows by key value.
    ///
    /// Integral doubles hash like the equivalent integer so foreign keys
    /// read back as floats still match their parent id.
    #[must_use]
    pub fn key_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        hash_value(self, &mut hasher);
        hasher.finish()
    }

    /// Convert from a JSON literal.
    ///
    /// Objects become `Json`; everything else maps onto its scalar variant.
    #[must_use]
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::BigInt(i),
                None => Value::Double(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from_json).collect())
            }
            obj @ serde_json::Value::Object(_) => Value::Json(obj),
        }
    }

    /// Convert to a JSON value.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::BigInt(i) | Value::Timestamp(i) => serde_json::Value::from(*i),
            Value::Double(f) => serde_json::Number::from_f64(*f)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Json(j) => j.clone(),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
        }
    }
}

fn hash_value(v: &Value, hasher: &mut impl Hasher) {
    match v {
        Value::Null => 0u8.hash(hasher),
        Value::Bool(b) => {
            1u8.hash(hasher);
            b.hash(hasher);
        }
        Value::BigInt(i) => {
            2u8.hash(hasher);
            i.hash(hasher);
        }
        Value::Double(f) => {
            if f.fract() == 0.0 && f.is_finite() {
                2u8.hash(hasher);
                (*f as i64).hash(hasher);
            } else {
                3u8.hash(hasher);
                f.to_bits().hash(hasher);
            }
        }
        Value::Text(s) => {
            4u8.hash(hasher);
            s.hash(hasher);
        }
        Value::Timestamp(ts) => {
            5u8.hash(hasher);
            ts.hash(hasher);
        }
        Value::Json(j) => {
            6u8.hash(hasher);
            j.to_string().hash(hasher);
        }
        Value::Array(items) => {
            7u8.hash(hasher);
            items.len().hash(hasher);
            for item in items {
                hash_value(item, hasher);
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::BigInt(i) => write!(f, "{i}"),
            Value::Double(x) => write!(f, "{x}"),
            Value::Text(s) => f.write_str(s),
            Value::Timestamp(ts) => write!(f, "@{ts}"),
            Value::Json(j) => write!(f, "{j}"),
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::BigInt(i) | Value::Timestamp(i) => serializer.serialize_i64(*i),
            Value::Double(f) => serializer.serialize_f64(*f),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Json(j) => j.serialize(serializer),
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::BigInt(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::BigInt(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::BigInt(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::from_json(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
