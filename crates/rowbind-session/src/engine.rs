//! The record lifecycle engine.
//!
//! A [`ModelHandle`] binds one [`ModelDescriptor`] to a [`Database`] and
//! exposes the read and write operations for that model. Writes go through a
//! fixed pipeline inside one transaction:
//!
//! ```text
//! BEGIN -> beforeValidation -> validate -> afterValidation -> (no changes? COMMIT, done)
//!       -> beforeSave -> INSERT | guarded UPDATE -> afterCreate | afterUpdate
//!       -> afterSave -> COMMIT
//! ```
//!
//! Any failure after `BEGIN` rolls back. An UPDATE that matches no row (the
//! id, the caller's guard and the revision did not all hold) is a
//! [`Error::Conflict`], as is an update of a revisioned model from a record
//! without a revision. A unique-constraint violation is a conflict carrying
//! the offending keys.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use rowbind_core::descriptor::{CREATED_AT, ID, REVISION, UPDATED_AT};
use rowbind_core::{
    Connection, Error, HookName, ModelDescriptor, Record, Result, Row, TransactionOps, Value,
    mapper, run_hooks, validate,
};
use rowbind_query::{
    DeleteBuilder, Direction, Expr, InsertBuilder, Operator, OrderBy, Predicate, SelectBuilder,
    Statement, UpdateBuilder, apply, duplicate_key_conflicts, is_duplicate_key_error,
};

use crate::context::Database;
use crate::include::{self, Include};

/// What [`ModelHandle::get`] should find.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// Match on `id`.
    Id(Value),
    /// Match on an arbitrary predicate.
    Where(Predicate),
    /// Already loaded; returned as is without a query.
    Record(Record),
}

impl From<Value> for Lookup {
    fn from(id: Value) -> Self {
        Lookup::Id(id)
    }
}

impl From<i64> for Lookup {
    fn from(id: i64) -> Self {
        Lookup::Id(Value::BigInt(id))
    }
}

impl From<i32> for Lookup {
    fn from(id: i32) -> Self {
        Lookup::Id(Value::from(id))
    }
}

impl From<&str> for Lookup {
    fn from(id: &str) -> Self {
        Lookup::Id(Value::from(id))
    }
}

impl From<Predicate> for Lookup {
    fn from(predicate: Predicate) -> Self {
        Lookup::Where(predicate)
    }
}

impl From<Record> for Lookup {
    fn from(record: Record) -> Self {
        Lookup::Record(record)
    }
}

/// Low-level ordering hook.
pub type OrderFn = Arc<dyn Fn(SelectBuilder) -> SelectBuilder + Send + Sync>;

/// Result ordering for [`ModelHandle::all_with`].
#[derive(Clone)]
pub enum Order {
    /// Friendly field names with directions, applied in order.
    Fields(Vec<(String, Direction)>),
    /// Arbitrary changes to the SELECT builder.
    Custom(OrderFn),
}

impl fmt::Debug for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Order::Fields(fields) => f.debug_tuple("Fields").field(fields).finish(),
            Order::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Options for read operations.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Friendly names of the only fields to fetch.
    ///
    /// Records fetched this way are not safe to save: a pruned record without
    /// `id` is inserted as a new row.
    pub select: Option<Vec<String>>,
    /// Result ordering.
    pub order: Option<Order>,
    /// LIMIT, passed through verbatim.
    pub limit: Option<u64>,
    /// OFFSET, passed through verbatim.
    pub offset: Option<u64>,
    /// Relations to batch-load onto the results.
    pub include: Option<Include>,
}

impl QueryOptions {
    /// No options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch only these fields.
    #[must_use]
    pub fn select<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.select = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Append an ordering term. Replaces a custom ordering.
    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        let mut fields = match self.order.take() {
            Some(Order::Fields(fields)) => fields,
            _ => Vec::new(),
        };
        fields.push((field.into(), direction));
        self.order = Some(Order::Fields(fields));
        self
    }

    /// Order through a builder callback.
    #[must_use]
    pub fn order_with<F>(mut self, order: F) -> Self
    where
        F: Fn(SelectBuilder) -> SelectBuilder + Send + Sync + 'static,
    {
        self.order = Some(Order::Custom(Arc::new(order)));
        self
    }

    /// Set LIMIT.
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set OFFSET.
    #[must_use]
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Batch-load relations onto the results.
    #[must_use]
    pub fn include(mut self, include: impl Into<Include>) -> Self {
        self.include = Some(include.into());
        self
    }
}

/// Columns the engine writes itself.
fn is_managed(field: &str) -> bool {
    matches!(field, ID | CREATED_AT | UPDATED_AT | REVISION)
}

/// Operations on one model.
///
/// Handles are cheap to create and borrow the [`Database`] they came from.
pub struct ModelHandle<'db, C> {
    db: &'db Database<C>,
    descriptor: Arc<ModelDescriptor>,
}

impl<C> Clone for ModelHandle<'_, C> {
    fn clone(&self) -> Self {
        Self {
            db: self.db,
            descriptor: Arc::clone(&self.descriptor),
        }
    }
}

impl<C> fmt::Debug for ModelHandle<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("model", &self.descriptor.name())
            .field("table", &self.descriptor.table_name())
            .finish_non_exhaustive()
    }
}

impl<'db, C: Connection> ModelHandle<'db, C> {
    pub(crate) fn new(db: &'db Database<C>, descriptor: Arc<ModelDescriptor>) -> Self {
        Self { db, descriptor }
    }

    /// The model's descriptor.
    pub fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    fn model(&self) -> &str {
        self.descriptor.name()
    }

    fn client(&self) -> Result<Arc<C>> {
        self.db.client(self.descriptor.client())
    }

    fn render(&self, statement: &impl Statement) -> (String, Vec<Value>) {
        statement.build_with_dialect(self.db.config().dialect)
    }

    fn physical(&self, field: &str) -> Result<String> {
        self.descriptor
            .column(field)
            .map(|c| c.source.clone())
            .ok_or_else(|| Error::UnknownField {
                model: self.model().to_string(),
                field: field.to_string(),
            })
    }

    /// Map a fetched row, run `afterFetch` and take the snapshot.
    fn hydrate(&self, row: &Row) -> Result<Record> {
        let mut record = mapper::from_source(&self.descriptor, row);
        run_hooks(&self.descriptor, &mut record, HookName::AfterFetch)?;
        record.mark_persisted();
        Ok(record)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Fetch exactly one record.
    ///
    /// Fails with [`Error::NotFound`] if nothing matches. A [`Lookup::Record`]
    /// is returned unchanged without touching the database.
    pub async fn get(&self, lookup: impl Into<Lookup>) -> Result<Record> {
        self.get_with(lookup, &QueryOptions::default()).await
    }

    /// [`get`](Self::get) with options (`select`, `include`, ...).
    #[tracing::instrument(level = "debug", skip(self, lookup, options), fields(model = self.model()))]
    pub async fn get_with(&self, lookup: impl Into<Lookup>, options: &QueryOptions) -> Result<Record> {
        let predicate = match lookup.into() {
            Lookup::Record(record) => return Ok(record),
            Lookup::Id(id) => Predicate::by_id(id),
            Lookup::Where(predicate) => predicate,
        };
        self.db.record_lookup(self.model());
        self.first_with(&predicate, options)
            .await?
            .ok_or_else(|| Error::not_found(self.model(), predicate.to_string()))
    }

    /// Fetch every record whose id is in `ids`.
    ///
    /// Missing ids are simply absent from the result. An empty list returns
    /// an empty result without a query.
    pub async fn mget<I, V>(&self, ids: I) -> Result<Vec<Record>>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.mget_with(ids, &QueryOptions::default()).await
    }

    /// [`mget`](Self::mget) with options.
    pub async fn mget_with<I, V>(&self, ids: I, options: &QueryOptions) -> Result<Vec<Record>>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let ids: Vec<Value> = ids.into_iter().map(Into::into).collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let predicate = Predicate::new().op(ID, Operator::In, Value::Array(ids));
        self.all_with(&predicate, options).await
    }

    /// The first matching record, or `None`.
    pub async fn first(&self, predicate: &Predicate) -> Result<Option<Record>> {
        self.first_with(predicate, &QueryOptions::default()).await
    }

    /// [`first`](Self::first) with options. Any `limit` is replaced by 1.
    pub async fn first_with(
        &self,
        predicate: &Predicate,
        options: &QueryOptions,
    ) -> Result<Option<Record>> {
        let options = QueryOptions {
            limit: Some(1),
            ..options.clone()
        };
        Ok(self.all_with(predicate, &options).await?.into_iter().next())
    }

    /// Every matching record.
    pub async fn all(&self, predicate: &Predicate) -> Result<Vec<Record>> {
        self.all_with(predicate, &QueryOptions::default()).await
    }

    /// [`all`](Self::all) with options.
    #[tracing::instrument(level = "debug", skip(self, predicate, options), fields(model = self.model()))]
    pub async fn all_with(&self, predicate: &Predicate, options: &QueryOptions) -> Result<Vec<Record>> {
        let mut records = self.fetch(predicate, options).await?;
        if let Some(spec) = &options.include {
            include::resolve(self.db, &self.descriptor, &mut records, spec).await?;
        }
        Ok(records)
    }

    /// SELECT, map and hydrate. Ignores `options.include`.
    pub(crate) async fn fetch(
        &self,
        predicate: &Predicate,
        options: &QueryOptions,
    ) -> Result<Vec<Record>> {
        let mut select = SelectBuilder::from_descriptor(&self.descriptor);
        if let Some(fields) = &options.select {
            let columns = fields
                .iter()
                .map(|f| self.physical(f))
                .collect::<Result<Vec<_>>>()?;
            select = select.columns(columns);
        }
        select = apply(
            &self.descriptor,
            select,
            predicate,
            self.db.config().unknown_fields,
        )?;
        match &options.order {
            Some(Order::Fields(fields)) => {
                for (field, direction) in fields {
                    select = select.order_by(OrderBy {
                        column: self.physical(field)?,
                        direction: *direction,
                    });
                }
            }
            Some(Order::Custom(order)) => select = order(select),
            None => {}
        }
        if let Some(limit) = options.limit {
            select = select.limit(limit);
        }
        if let Some(offset) = options.offset {
            select = select.offset(offset);
        }

        let (sql, params) = self.render(&select);
        let rows = self.client()?.query(&sql, &params).await?;
        tracing::trace!(model = self.model(), rows = rows.len(), "fetched");
        rows.iter().map(|row| self.hydrate(row)).collect()
    }

    /// Run an arbitrary statement against the model's table.
    ///
    /// Rows are mapped to records (and snapshotted) but no hooks run.
    pub async fn query<F, S>(&self, build: F) -> Result<Vec<Record>>
    where
        F: FnOnce(SelectBuilder) -> S,
        S: Statement,
    {
        let statement = build(SelectBuilder::from_descriptor(&self.descriptor));
        let (sql, params) = self.render(&statement);
        let rows = self.client()?.query(&sql, &params).await?;
        Ok(rows
            .iter()
            .map(|row| {
                let mut record = mapper::from_source(&self.descriptor, row);
                record.mark_persisted();
                record
            })
            .collect())
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Insert or update a record.
    ///
    /// The record is inserted when it has no truthy `id` and updated
    /// otherwise. The input is never modified; the stored version is returned.
    pub async fn save(&self, record: &Record) -> Result<Record> {
        self.save_where(record, &Predicate::new()).await
    }

    /// [`save`](Self::save) with an extra guard on the UPDATE.
    ///
    /// The update only takes effect if the row still matches `guard` (as well
    /// as the id and, for revisioned models, the record's revision).
    #[tracing::instrument(level = "debug", skip(self, record, guard), fields(model = self.model(), new = record.is_new()))]
    pub async fn save_where(&self, record: &Record, guard: &Predicate) -> Result<Record> {
        let mut record = record.clone();
        let client = self.client()?;
        let tx = client.begin().await?;
        tracing::trace!("transaction open");

        let outcome = self.persist(&tx, &mut record, guard).await;
        match outcome {
            Ok(written) => {
                tx.commit().await?;
                if written {
                    tracing::debug!(id = ?record.id(), "saved");
                }
                Ok(record)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::debug!(error = %rollback_err, "rollback failed");
                }
                let err = self.classify(err, &record);
                tracing::info!(error = %err, "save rolled back");
                Err(err)
            }
        }
    }

    /// Friendly-named changes to non-managed columns.
    fn pending_changes(&self, record: &Record) -> BTreeMap<String, Value> {
        record
            .changes()
            .into_iter()
            .filter(|(field, _)| !is_managed(field) && self.descriptor.has_column(field))
            .collect()
    }

    /// The pipeline between BEGIN and COMMIT. Returns false if nothing was written.
    async fn persist<T: TransactionOps>(
        &self,
        tx: &T,
        record: &mut Record,
        guard: &Predicate,
    ) -> Result<bool> {
        let descriptor = &*self.descriptor;

        run_hooks(descriptor, record, HookName::BeforeValidation)?;
        validate::validate(descriptor, record)?;
        run_hooks(descriptor, record, HookName::AfterValidation)?;

        let existing = !record.is_new();
        if existing && self.pending_changes(record).is_empty() {
            tracing::debug!(id = ?record.id(), "no changes, skipping write");
            return Ok(false);
        }

        run_hooks(descriptor, record, HookName::BeforeSave)?;

        let row = if existing {
            self.update(tx, record, guard).await?
        } else {
            let (sql, params) = self.render(&InsertBuilder::for_record(descriptor, record));
            tx.query(&sql, &params)
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| Error::custom(format!("insert into {} returned no row", descriptor.table_name())))?
        };

        for (field, value) in mapper::from_source(descriptor, &row).fields() {
            record.set(field.clone(), value.clone());
        }
        record.mark_persisted();

        let after = if existing {
            HookName::AfterUpdate
        } else {
            HookName::AfterCreate
        };
        run_hooks(descriptor, record, after)?;
        run_hooks(descriptor, record, HookName::AfterSave)?;
        Ok(true)
    }

    async fn update<T: TransactionOps>(
        &self,
        tx: &T,
        record: &Record,
        guard: &Predicate,
    ) -> Result<Row> {
        let descriptor = &*self.descriptor;
        let id = record.id().cloned().unwrap_or_default();

        let mut conditions = Predicate::by_id(id.clone()).merge(guard.clone());
        if descriptor.is_revisioned() {
            let revision = record
                .get(REVISION)
                .filter(|revision| !revision.is_null())
                .ok_or_else(|| {
                    tracing::info!(%id, "update without a revision");
                    Error::conflict(
                        self.model(),
                        format!("record {id} carries no revision to guard the update"),
                    )
                })?;
            conditions = conditions.eq(REVISION, revision.clone());
        }

        let changes = self.pending_changes(record);
        let update = apply(
            descriptor,
            UpdateBuilder::for_changes(descriptor, &changes),
            &conditions,
            self.db.config().unknown_fields,
        )?;
        let (sql, params) = self.render(&update);
        tx.query(&sql, &params).await?.into_iter().next().ok_or_else(|| {
            tracing::info!(%id, guard = %conditions, "update matched no row");
            Error::conflict(
                self.model(),
                format!("record {id} was changed or no longer matches {conditions}"),
            )
        })
    }

    /// Map unique violations onto [`Error::Conflict`].
    fn classify(&self, err: Error, record: &Record) -> Error {
        if !is_duplicate_key_error(&err) {
            return err;
        }
        let conflicts = duplicate_key_conflicts(&self.descriptor, &err, record).unwrap_or_default();
        Error::Conflict {
            model: self.model().to_string(),
            message: "duplicate key".to_string(),
            conflicts,
        }
    }

    /// Delete by id. Runs no hooks.
    ///
    /// Fails with [`Error::NotFound`] if no row had that id.
    #[tracing::instrument(level = "debug", skip(self, id), fields(model = self.model()))]
    pub async fn remove(&self, id: impl Into<Value>) -> Result<bool> {
        let id = id.into();
        let delete = DeleteBuilder::new(self.descriptor.table_name())
            .filter(Expr::col(self.physical(ID)?).eq(id.clone()));
        let (sql, params) = self.render(&delete);
        match self.client()?.execute(&sql, &params).await? {
            0 => Err(Error::not_found(self.model(), format!("{{id: {id}}}"))),
            _ => Ok(true),
        }
    }

    /// Fetch, mutate and save once.
    ///
    /// A concurrent change surfaces as [`Error::Conflict`]; retrying is up to
    /// the caller (or use [`modify_retrying`](Self::modify_retrying)).
    pub async fn modify<F>(&self, lookup: impl Into<Lookup>, guard: &Predicate, mutator: F) -> Result<Record>
    where
        F: FnOnce(&mut Record),
    {
        let mut record = self.get(lookup).await?;
        mutator(&mut record);
        self.save_where(&record, guard).await
    }

    /// Fetch, mutate and save, starting over on guard conflicts.
    ///
    /// The mutator runs once per attempt on a freshly fetched record. Gives up
    /// with [`Error::TimedOut`] after `attempts` conflicts (default from
    /// [`EngineConfig::retry_attempts`](crate::EngineConfig::retry_attempts)).
    /// At least one attempt is always made. Unique-key conflicts are not
    /// retried.
    #[tracing::instrument(level = "debug", skip(self, id, guard, mutator), fields(model = self.model()))]
    pub async fn modify_retrying<F>(
        &self,
        id: impl Into<Value>,
        guard: &Predicate,
        mutator: F,
        attempts: Option<u32>,
    ) -> Result<Record>
    where
        F: Fn(&mut Record),
    {
        let id = id.into();
        let attempts = attempts.unwrap_or(self.db.config().retry_attempts).max(1);
        for attempt in 1..=attempts {
            let mut record = self.get(Lookup::Id(id.clone())).await?;
            mutator(&mut record);
            match self.save_where(&record, guard).await {
                Err(err) if err.conflicts().is_some_and(<[_]>::is_empty) => {
                    tracing::debug!(attempt, "conflict, retrying");
                }
                result => return result,
            }
        }
        tracing::info!(attempts, "giving up after repeated conflicts");
        Err(Error::TimedOut {
            model: self.model().to_string(),
            attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EngineConfig;
    use rowbind_core::{DescriptorBuilder, Rule, SqlType};
    use rowbind_query::Dialect;
    use rowbind_sqlite::{SqliteConnection, TableDef};
    use std::sync::Mutex;

    type HookLog = Arc<Mutex<Vec<&'static str>>>;

    fn person() -> DescriptorBuilder {
        ModelDescriptor::builder("person")
            .table("people")
            .column("name", SqlType::Text)
            .column("email", SqlType::Text)
            .revisioned()
            .validate_field("name", Rule::required())
            .hook(HookName::BeforeValidation, |r| {
                let trimmed = r.get("name").and_then(Value::as_str).map(|s| s.trim().to_string());
                if let Some(name) = trimmed {
                    r.set("name", name);
                }
                Ok(())
            })
    }

    /// Record every lifecycle hook that fires, by name.
    fn logged(builder: DescriptorBuilder, log: &HookLog) -> DescriptorBuilder {
        [
            (HookName::BeforeValidation, "beforeValidation"),
            (HookName::AfterValidation, "afterValidation"),
            (HookName::BeforeSave, "beforeSave"),
            (HookName::AfterCreate, "afterCreate"),
            (HookName::AfterUpdate, "afterUpdate"),
            (HookName::AfterSave, "afterSave"),
            (HookName::AfterFetch, "afterFetch"),
        ]
        .into_iter()
        .fold(builder, |builder, (hook, label)| {
            let log = Arc::clone(log);
            builder.hook(hook, move |_| {
                log.lock().unwrap().push(label);
                Ok(())
            })
        })
    }

    async fn setup_with(descriptor: ModelDescriptor) -> (Database<SqliteConnection>, SqliteConnection) {
        let db = Database::with_config(EngineConfig::default().dialect(Dialect::Sqlite));
        let descriptor = db.define(descriptor).unwrap();
        let conn = SqliteConnection::memory()
            .await
            .unwrap()
            .with_table(TableDef::from_descriptor(&descriptor).unique("email"))
            .await
            .unwrap();
        db.register_client("default", conn.clone()).unwrap();
        (db, conn)
    }

    async fn setup() -> (Database<SqliteConnection>, SqliteConnection) {
        setup_with(person().build()).await
    }

    fn ann() -> Record {
        Record::new().with("name", " Ann ").with("email", "ann@example.com")
    }

    #[tokio::test]
    async fn test_insert_returns_stored_record() {
        let (db, conn) = setup().await;
        let people = db.model("person").unwrap();
        let input = ann();

        let saved = people.save(&input).await.unwrap();
        assert_eq!(saved.id(), Some(&Value::BigInt(1)));
        assert_eq!(saved.get("name"), Some(&Value::from("Ann")));
        assert_eq!(saved.get(REVISION), Some(&Value::BigInt(1)));
        assert!(saved.get(CREATED_AT).is_some_and(|v| !v.is_null()));
        assert!(saved.changes().is_empty());
        assert!(input.is_new());
        assert_eq!(conn.statement_count("INSERT"), 1);
        assert_eq!(conn.statement_count("COMMIT"), 1);
    }

    #[tokio::test]
    async fn test_unchanged_save_writes_nothing() {
        let (db, conn) = setup().await;
        let people = db.model("person").unwrap();
        let saved = people.save(&ann()).await.unwrap();
        conn.clear_statements();

        let again = people.save(&saved).await.unwrap();
        assert_eq!(again, saved);
        assert_eq!(conn.statements(), vec!["BEGIN", "COMMIT"]);
    }

    #[tokio::test]
    async fn test_stale_revision_conflicts() {
        let (db, _conn) = setup().await;
        let people = db.model("person").unwrap();
        let saved = people.save(&ann()).await.unwrap();

        let mut first = saved.clone();
        first.set("name", "Anne");
        let mut second = saved.clone();
        second.set("name", "Annie");

        let updated = people.save(&first).await.unwrap();
        assert_eq!(updated.get(REVISION), Some(&Value::BigInt(2)));

        let err = people.save(&second).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(err.conflicts().map(<[_]>::len), Some(0));
        assert_eq!(
            people.get(1).await.unwrap().get("name"),
            Some(&Value::from("Anne"))
        );
    }

    #[tokio::test]
    async fn test_update_without_revision_conflicts() {
        let (db, conn) = setup().await;
        let people = db.model("person").unwrap();
        let saved = people.save(&ann()).await.unwrap();
        conn.clear_statements();

        let bare = Record::new()
            .with(ID, saved.id().cloned().unwrap())
            .with("name", "Mallory");
        let err = people.save(&bare).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(err.conflicts().map(<[_]>::len), Some(0));

        let nulled = bare.clone().with(REVISION, Value::Null);
        assert!(people.save(&nulled).await.unwrap_err().is_conflict());

        assert_eq!(conn.statement_count("UPDATE"), 0);
        assert_eq!(conn.statement_count("ROLLBACK"), 2);
        let rows = conn.table_rows("people").await.unwrap();
        assert_eq!(rows[0].get_by_name("name"), Some(&Value::from("Ann")));
        assert_eq!(rows[0].get_by_name("revision"), Some(&Value::BigInt(1)));
    }

    #[tokio::test]
    async fn test_guard_mismatch_rolls_back() {
        let (db, conn) = setup().await;
        let people = db.model("person").unwrap();
        let mut saved = people.save(&ann()).await.unwrap();
        saved.set("email", "new@example.com");

        let guard = Predicate::new().eq("name", "Bob");
        let err = people.save_where(&saved, &guard).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(conn.statement_count("ROLLBACK"), 1);

        let guard = Predicate::new().eq("name", "Ann");
        let updated = people.save_where(&saved, &guard).await.unwrap();
        assert_eq!(updated.get("email"), Some(&Value::from("new@example.com")));
    }

    #[tokio::test]
    async fn test_unique_violation_reports_key() {
        let (db, conn) = setup().await;
        let people = db.model("person").unwrap();
        people.save(&ann()).await.unwrap();

        let dup = Record::new().with("name", "Other").with("email", "ann@example.com");
        let err = people.save(&dup).await.unwrap_err();
        let conflicts = err.conflicts().unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].key, "email");
        assert_eq!(conflicts[0].value, Value::from("ann@example.com"));
        assert_eq!(conn.table_rows("people").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_validation_failure_skips_insert() {
        let (db, conn) = setup().await;
        let people = db.model("person").unwrap();

        let err = people
            .save(&Record::new().with("email", "x@example.com"))
            .await
            .unwrap_err();
        let errors = err.validation_errors().unwrap();
        assert_eq!(errors[0].field, "name");
        assert_eq!(conn.statement_count("INSERT"), 0);
        assert_eq!(conn.statement_count("ROLLBACK"), 1);
    }

    #[tokio::test]
    async fn test_hook_order_on_insert_and_update() {
        let log = HookLog::default();
        let (db, _conn) = setup_with(logged(person(), &log).build()).await;
        let people = db.model("person").unwrap();

        let saved = people.save(&ann()).await.unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            ["beforeValidation", "afterValidation", "beforeSave", "afterCreate", "afterSave"]
        );

        log.lock().unwrap().clear();
        let mut renamed = saved.clone();
        renamed.set("name", "Anne");
        people.save(&renamed).await.unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            ["beforeValidation", "afterValidation", "beforeSave", "afterUpdate", "afterSave"]
        );
    }

    #[tokio::test]
    async fn test_unchanged_save_skips_save_hooks() {
        let log = HookLog::default();
        let (db, _conn) = setup_with(logged(person(), &log).build()).await;
        let people = db.model("person").unwrap();
        let saved = people.save(&ann()).await.unwrap();

        log.lock().unwrap().clear();
        people.save(&saved).await.unwrap();
        assert_eq!(*log.lock().unwrap(), ["beforeValidation", "afterValidation"]);
    }

    #[tokio::test]
    async fn test_failing_after_save_rolls_back() {
        let descriptor = person()
            .hook(HookName::AfterSave, |r| {
                if r.get("name") == Some(&Value::from("Boom")) {
                    return Err(Error::custom("afterSave refused"));
                }
                Ok(())
            })
            .build();
        let (db, conn) = setup_with(descriptor).await;
        let people = db.model("person").unwrap();

        let err = people
            .save(&Record::new().with("name", "Boom"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Custom(_)));
        assert_eq!(conn.statement_count("INSERT"), 1);
        assert_eq!(conn.statement_count("ROLLBACK"), 1);
        assert!(conn.table_rows("people").await.unwrap().is_empty());

        let mut saved = people.save(&ann()).await.unwrap();
        saved.set("name", "Boom");
        assert!(people.save(&saved).await.is_err());
        let rows = conn.table_rows("people").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_by_name("name"), Some(&Value::from("Ann")));
        assert_eq!(rows[0].get_by_name("revision"), Some(&Value::BigInt(1)));
    }

    #[tokio::test]
    async fn test_failing_before_save_writes_nothing() {
        let descriptor = person()
            .hook(HookName::BeforeSave, |r| {
                if r.get("email") == Some(&Value::from("blocked@example.com")) {
                    return Err(Error::custom("beforeSave refused"));
                }
                Ok(())
            })
            .build();
        let (db, conn) = setup_with(descriptor).await;
        let people = db.model("person").unwrap();

        let blocked = Record::new().with("name", "Eve").with("email", "blocked@example.com");
        assert!(matches!(
            people.save(&blocked).await,
            Err(Error::Custom(_))
        ));
        assert_eq!(conn.statement_count("INSERT"), 0);
        assert_eq!(conn.statement_count("ROLLBACK"), 1);
        assert!(conn.table_rows("people").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reads() {
        let (db, conn) = setup().await;
        let people = db.model("person").unwrap();
        people.save(&ann()).await.unwrap();
        people
            .save(&Record::new().with("name", "Bob").with("email", "bob@example.com"))
            .await
            .unwrap();
        conn.clear_statements();

        assert!(people.get(99).await.unwrap_err().is_not_found());
        assert!(people.mget(Vec::<i64>::new()).await.unwrap().is_empty());
        let cached = people.get(ann()).await.unwrap();
        assert_eq!(cached, ann());
        assert_eq!(conn.statement_count("SELECT"), 1);

        let both = people.mget([2, 1, 7]).await.unwrap();
        assert_eq!(both.len(), 2);

        let options = QueryOptions::new()
            .select(["name"])
            .order_by("name", Direction::Desc)
            .limit(1);
        let top = people.all_with(&Predicate::new(), &options).await.unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].get("name"), Some(&Value::from("Bob")));
        assert!(top[0].get("email").is_none());

        let bob = people
            .first(&Predicate::new().eq("email", "bob@example.com"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bob.id(), Some(&Value::BigInt(2)));
        assert!(people.first(&Predicate::new().eq("name", "Zed")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_query_maps_rows_without_fetch_hooks() {
        let descriptor = person()
            .hook(HookName::AfterFetch, |r| {
                r.set("fetched", true);
                Ok(())
            })
            .build();
        let (db, conn) = setup_with(descriptor).await;
        let people = db.model("person").unwrap();
        people.save(&ann()).await.unwrap();
        people
            .save(&Record::new().with("name", "Bob").with("email", "bob@example.com"))
            .await
            .unwrap();
        conn.clear_statements();

        let found = people
            .query(|select| select.filter(Expr::col("email").eq("bob@example.com")))
            .await
            .unwrap();
        assert_eq!(conn.statement_count("SELECT"), 1);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].get("name"), Some(&Value::from("Bob")));
        assert!(found[0].get(CREATED_AT).is_some_and(|v| !v.is_null()));
        assert!(!found[0].contains("created_at"));
        assert!(!found[0].contains("fetched"));
        assert!(found[0].changes().is_empty());

        let fetched = people.get(2).await.unwrap();
        assert_eq!(fetched.get("fetched"), Some(&Value::Bool(true)));
    }

    #[tokio::test]
    async fn test_remove() {
        let (db, _conn) = setup().await;
        let people = db.model("person").unwrap();
        people.save(&ann()).await.unwrap();

        assert!(people.remove(1).await.unwrap());
        assert!(people.remove(1).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_modify_and_retry_limit() {
        let (db, conn) = setup().await;
        let people = db.model("person").unwrap();
        people.save(&ann()).await.unwrap();

        let renamed = people
            .modify(1, &Predicate::new(), |r| {
                r.set("name", "Anna");
            })
            .await
            .unwrap();
        assert_eq!(renamed.get(REVISION), Some(&Value::BigInt(2)));

        conn.clear_statements();
        let never = Predicate::new().eq("name", "Nobody");
        let err = people
            .modify_retrying(1, &never, |r| {
                r.set("email", "other@example.com");
            }, Some(3))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TimedOut { attempts: 3, .. }));
        assert_eq!(conn.statement_count("UPDATE"), 3);
    }

    #[tokio::test]
    async fn test_modify_retrying_zero_attempts_tries_once() {
        let (db, conn) = setup().await;
        let people = db.model("person").unwrap();
        people.save(&ann()).await.unwrap();
        conn.clear_statements();

        let renamed = people
            .modify_retrying(1, &Predicate::new(), |r| {
                r.set("name", "Anna");
            }, Some(0))
            .await
            .unwrap();
        assert_eq!(renamed.get("name"), Some(&Value::from("Anna")));
        assert_eq!(conn.statement_count("UPDATE"), 1);

        let never = Predicate::new().eq("name", "Nobody");
        let err = people
            .modify_retrying(1, &never, |r| {
                r.set("email", "other@example.com");
            }, Some(0))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TimedOut { attempts: 1, .. }));
    }
}
