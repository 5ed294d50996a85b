//! Records: one row's worth of friendly-named values.
//!
//! A [`Record`] is a plain keyed bag. The engine additionally keeps a
//! snapshot of the values as they were last loaded from or written to
//! storage; [`Record::changes`] diffs against it so unmodified fields are
//! never re-sent. The snapshot is cloned with the record but excluded from
//! equality and serialization.

use std::collections::BTreeMap;

use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};

use crate::descriptor::ID;
use crate::error::{Error, Result};
use crate::value::Value;

/// Records attached under a relation name by the include resolver.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Related {
    /// `belongsTo` / `hasOne`: at most one record.
    One(Option<Box<Record>>),
    /// `hasMany`: possibly empty list.
    Many(Vec<Record>),
}

/// A row of friendly-named values plus the engine's original snapshot.
#[derive(Debug, Clone, Default)]
pub struct Record {
    fields: BTreeMap<String, Value>,
    related: BTreeMap<String, Related>,
    snapshot: Option<BTreeMap<String, Value>>,
}

impl Record {
    /// An empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from friendly `(field, value)` pairs.
    pub fn from_fields<K: Into<String>>(fields: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self {
            fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            ..Self::default()
        }
    }

    /// Build from a JSON object literal.
    pub fn from_json(json: serde_json::Value) -> Result<Self> {
        match json {
            serde_json::Value::Object(map) => Ok(Self::from_fields(
                map.into_iter().map(|(k, v)| (k, Value::from_json(v))),
            )),
            other => Err(Error::custom(format!(
                "record literal must be a JSON object, got {other}"
            ))),
        }
    }

    /// Builder-style `set`.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    /// Field value, if present.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Set a field, returning the previous value.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(field.into(), value.into())
    }

    /// Remove a field.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    /// Whether a field is present (even if null).
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// All fields.
    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// Iterate `(field, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True if the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The id, when truthy.
    pub fn id(&self) -> Option<&Value> {
        self.fields.get(ID).filter(|v| v.is_truthy())
    }

    /// True when the record has no truthy id and would be inserted on save.
    pub fn is_new(&self) -> bool {
        self.id().is_none()
    }

    /// Values as last loaded from or written to storage.
    pub fn snapshot(&self) -> Option<&BTreeMap<String, Value>> {
        self.snapshot.as_ref()
    }

    /// Capture the current values as the storage snapshot.
    pub fn mark_persisted(&mut self) {
        self.snapshot = Some(self.fields.clone());
    }

    /// Forget the snapshot, making every field count as changed.
    pub fn clear_snapshot(&mut self) {
        self.snapshot = None;
    }

    /// Fields whose value differs from the snapshot.
    ///
    /// Without a snapshot every field counts as changed. Fields removed since
    /// the snapshot are not reported.
    pub fn changes(&self) -> BTreeMap<String, Value> {
        match &self.snapshot {
            None => self.fields.clone(),
            Some(original) => self
                .fields
                .iter()
                .filter(|(k, v)| original.get(*k) != Some(*v))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    /// Attach related records under `name`.
    pub fn set_related(&mut self, name: impl Into<String>, related: Related) {
        self.related.insert(name.into(), related);
    }

    /// Related records attached under `name`.
    pub fn related(&self, name: &str) -> Option<&Related> {
        self.related.get(name)
    }

    /// Mutable access to related records.
    pub fn related_mut(&mut self, name: &str) -> Option<&mut Related> {
        self.related.get_mut(name)
    }

    /// Related list for a `hasMany` relation.
    pub fn related_many(&self, name: &str) -> Option<&[Record]> {
        match self.related.get(name)? {
            Related::Many(records) => Some(records),
            Related::One(_) => None,
        }
    }

    /// Related record for a `belongsTo` / `hasOne` relation.
    pub fn related_one(&self, name: &str) -> Option<&Record> {
        match self.related.get(name)? {
            Related::One(record) => record.as_deref(),
            Related::Many(_) => None,
        }
    }

    /// Names of attached relations.
    pub fn related_names(&self) -> impl Iterator<Item = &str> {
        self.related.keys().map(String::as_str)
    }

    /// JSON view of the fields and attached relations.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields && self.related == other.related
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len() + self.related.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        for (k, v) in &self.related {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}
