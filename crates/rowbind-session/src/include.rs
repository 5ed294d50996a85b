//! Batched loading of related records.
//!
//! Each relation named in an [`Include`] costs exactly one extra query per
//! nesting level, however many owning records there are:
//!
//! - `belongsTo`: `SELECT ... WHERE id IN (owner foreign keys)`
//! - `hasMany` / `hasOne`: `SELECT ... WHERE fk IN (owner ids)`, grouped by `fk`
//!
//! Owners without a match get `[]` (`hasMany`) or `None` (`hasOne`,
//! `belongsTo`).

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use rowbind_core::descriptor::ID;
use rowbind_core::{
    Connection, Error, ModelDescriptor, Record, Related, RelationKind, Result, Value,
};
use rowbind_query::{Operator, Predicate};

use crate::context::Database;
use crate::engine::{ModelHandle, QueryOptions};

/// Which relations to load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Include {
    /// One relation by name.
    Relation(String),
    /// Several specs, each applied to the same records.
    List(Vec<Include>),
    /// Load each named relation, then apply the nested spec to what it loaded.
    Nested(Vec<(String, Include)>),
}

impl Include {
    /// A single relation.
    pub fn relation(name: impl Into<String>) -> Self {
        Include::Relation(name.into())
    }

    /// `name`, then `inner` on the records it loads.
    pub fn nested(name: impl Into<String>, inner: impl Into<Include>) -> Self {
        Include::Nested(vec![(name.into(), inner.into())])
    }

    /// Parse `"posts"`, `["posts", "profile"]` or `{"posts": "comments"}`.
    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        match json {
            serde_json::Value::String(name) => Ok(Include::Relation(name.clone())),
            serde_json::Value::Array(items) => items
                .iter()
                .map(Include::from_json)
                .collect::<Result<Vec<_>>>()
                .map(Include::List),
            serde_json::Value::Object(map) => map
                .iter()
                .map(|(name, inner)| Ok((name.clone(), Include::from_json(inner)?)))
                .collect::<Result<Vec<_>>>()
                .map(Include::Nested),
            other => Err(Error::UnsupportedInclude(format!(
                "expected a relation name, list or object, got {other}"
            ))),
        }
    }
}

impl From<&str> for Include {
    fn from(name: &str) -> Self {
        Include::Relation(name.to_string())
    }
}

impl From<String> for Include {
    fn from(name: String) -> Self {
        Include::Relation(name)
    }
}

impl From<Vec<Include>> for Include {
    fn from(items: Vec<Include>) -> Self {
        Include::List(items)
    }
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Attach the relations named by `spec` to `records`, in place.
///
/// Returns the records fetched by the last relation loaded, after any
/// nested includes were attached to them. Empty input fetches nothing.
pub(crate) fn resolve<'a, C: Connection>(
    db: &'a Database<C>,
    descriptor: &'a ModelDescriptor,
    records: &'a mut [Record],
    spec: &'a Include,
) -> BoxFuture<'a, Result<Vec<Record>>> {
    Box::pin(async move {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let mut tier = Vec::new();
        match spec {
            Include::Relation(name) => {
                tier = load(db, descriptor, records, name).await?.1;
            }
            Include::List(items) => {
                for item in items {
                    tier = resolve(db, descriptor, records, item).await?;
                }
            }
            Include::Nested(entries) => {
                for (name, inner) in entries {
                    let (target, _) = load(db, descriptor, records, name).await?;
                    let (mut children, counts) = take_related(records, name);
                    tier = resolve(db, &target, &mut children, inner).await?;
                    restore_related(records, name, children, &counts);
                }
            }
        }
        Ok(tier)
    })
}

/// Values bucketed by [`Value::key_hash`] and told apart inside a bucket
/// with [`Value::loosely_equals`].
struct KeyGroups<T> {
    buckets: HashMap<u64, Vec<(Value, Vec<T>)>>,
}

impl<T> Default for KeyGroups<T> {
    fn default() -> Self {
        Self {
            buckets: HashMap::new(),
        }
    }
}

impl<T> KeyGroups<T> {
    /// Add `item` under `key`. Returns true if the key was new.
    fn push(&mut self, key: &Value, item: T) -> bool {
        self.push_hashed(key.key_hash(), key, item)
    }

    fn push_hashed(&mut self, hash: u64, key: &Value, item: T) -> bool {
        let bucket = self.buckets.entry(hash).or_default();
        match bucket.iter_mut().find(|(k, _)| k.loosely_equals(key)) {
            Some((_, items)) => {
                items.push(item);
                false
            }
            None => {
                bucket.push((key.clone(), vec![item]));
                true
            }
        }
    }

    fn get(&self, key: &Value) -> &[T] {
        self.get_hashed(key.key_hash(), key)
    }

    fn get_hashed(&self, hash: u64, key: &Value) -> &[T] {
        self.buckets
            .get(&hash)
            .and_then(|bucket| bucket.iter().find(|(k, _)| k.loosely_equals(key)))
            .map_or(&[], |(_, items)| items.as_slice())
    }
}

/// Distinct non-null values, in first-seen order.
fn distinct<'v>(values: impl Iterator<Item = &'v Value>) -> Vec<Value> {
    let mut seen = KeyGroups::default();
    values
        .filter(|v| !v.is_null() && seen.push(v, ()))
        .cloned()
        .collect()
}

/// Load one relation onto `records`.
///
/// Returns the target descriptor and the fetched records.
async fn load<C: Connection>(
    db: &Database<C>,
    descriptor: &ModelDescriptor,
    records: &mut [Record],
    name: &str,
) -> Result<(Arc<ModelDescriptor>, Vec<Record>)> {
    let relation = descriptor.relation(name).ok_or_else(|| {
        Error::UnsupportedInclude(format!(
            "model '{}' has no relation '{name}'",
            descriptor.name()
        ))
    })?;
    let target = db.lookup(descriptor.namespace(), &relation.model)?;
    let handle = ModelHandle::new(db, Arc::clone(&target));
    let fk = relation.foreign_key.as_str();

    let (key_field, keys) = match relation.kind {
        RelationKind::BelongsTo => (ID, distinct(records.iter().filter_map(|r| r.get(fk)))),
        RelationKind::HasMany | RelationKind::HasOne => {
            (fk, distinct(records.iter().filter_map(Record::id)))
        }
    };

    let fetched = if keys.is_empty() {
        Vec::new()
    } else {
        let predicate = Predicate::new().op(key_field, Operator::In, Value::Array(keys));
        handle.fetch(&predicate, &QueryOptions::default()).await?
    };
    tracing::debug!(
        model = descriptor.name(),
        relation = name,
        kind = relation.kind.as_str(),
        owners = records.len(),
        fetched = fetched.len(),
        "loaded relation"
    );

    let mut groups = KeyGroups::default();
    for record in &fetched {
        if let Some(key) = record.get(key_field) {
            groups.push(key, record.clone());
        }
    }

    for record in records.iter_mut() {
        let owner_key = match relation.kind {
            RelationKind::BelongsTo => record.get(fk),
            RelationKind::HasMany | RelationKind::HasOne => record.id(),
        };
        let group = owner_key.map_or_else(Vec::new, |key| groups.get(key).to_vec());
        let related = match relation.kind {
            RelationKind::HasMany => Related::Many(group),
            RelationKind::BelongsTo | RelationKind::HasOne => {
                Related::One(group.into_iter().next().map(Box::new))
            }
        };
        record.set_related(name, related);
    }

    Ok((target, fetched))
}

/// Move the records attached under `name` out into one flat list.
fn take_related(records: &mut [Record], name: &str) -> (Vec<Record>, Vec<usize>) {
    let mut children = Vec::new();
    let mut counts = Vec::with_capacity(records.len());
    for record in records.iter_mut() {
        let before = children.len();
        match record.related_mut(name) {
            Some(Related::Many(list)) => children.append(list),
            Some(Related::One(slot)) => children.extend(slot.take().map(|b| *b)),
            None => {}
        }
        counts.push(children.len() - before);
    }
    (children, counts)
}

/// Inverse of [`take_related`].
fn restore_related(records: &mut [Record], name: &str, children: Vec<Record>, counts: &[usize]) {
    let mut children = children.into_iter();
    for (record, &count) in records.iter_mut().zip(counts) {
        match record.related_mut(name) {
            Some(Related::Many(list)) => list.extend(children.by_ref().take(count)),
            Some(Related::One(slot)) => {
                *slot = children.by_ref().take(count).next().map(Box::new);
            }
            None => {}
        }
    }
}
