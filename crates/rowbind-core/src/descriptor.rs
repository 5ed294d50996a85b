//! Model descriptors: the static configuration binding a model to a table.
//!
//! A descriptor is created once at startup with [`ModelDescriptor::builder`] and
//! is immutable afterwards. It lists the columns (friendly name, physical
//! source name, type), per-field validation rules, lifecycle hooks and
//! relations to other models.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::hooks::{HookFn, HookName};
use crate::naming;
use crate::record::Record;
use crate::validate::{Rule, ValidationContext};

/// Friendly name of the implicit primary key.
pub const ID: &str = "id";
/// Friendly name of the implicit creation timestamp.
pub const CREATED_AT: &str = "createdAt";
/// Friendly name of the implicit modification timestamp.
pub const UPDATED_AT: &str = "updatedAt";
/// Friendly name of the optimistic-concurrency counter.
pub const REVISION: &str = "revision";

/// Logical column type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SqlType {
    /// 64-bit integer.
    BigInt,
    /// Floating point.
    Double,
    /// Text.
    #[default]
    Text,
    /// Boolean.
    Bool,
    /// Timestamp.
    Timestamp,
    /// JSON document.
    Json,
}

/// One mapped column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    /// Friendly field name used by callers and records.
    pub name: String,
    /// Physical column name in the table.
    pub source: String,
    /// Logical type.
    pub sql_type: SqlType,
}

impl ColumnInfo {
    /// Create a column whose source name is derived from the friendly name.
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        let name = name.into();
        let source = naming::source_name(&name);
        Self {
            name,
            source,
            sql_type,
        }
    }

    /// Override the physical column name.
    #[must_use]
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }
}

/// The type of relationship between two models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    /// This model holds the foreign key: a `post` belongs to an `author`.
    BelongsTo,
    /// The target holds the foreign key: a `user` has many `posts`.
    HasMany,
    /// As `HasMany`, but at most one target is attached.
    HasOne,
}

impl RelationKind {
    /// Stable name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            RelationKind::BelongsTo => "belongsTo",
            RelationKind::HasMany => "hasMany",
            RelationKind::HasOne => "hasOne",
        }
    }
}

/// Metadata about a relation from one model to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationInfo {
    /// Relation kind.
    pub kind: RelationKind,
    /// Name the related records are attached under.
    pub name: String,
    /// Target model name (same namespace as the owner).
    pub model: String,
    /// Friendly name of the foreign-key field.
    ///
    /// Lives on the owner for `BelongsTo`, on the target otherwise.
    pub foreign_key: String,
}

/// Whole-record validation callback.
pub type ObjectValidator = Arc<dyn Fn(&Record, &mut ValidationContext) + Send + Sync>;

/// Static configuration for one table mapping.
#[derive(Clone)]
pub struct ModelDescriptor {
    name: String,
    namespace: Option<String>,
    table_name: String,
    client: String,
    columns: Vec<ColumnInfo>,
    revisioned: bool,
    validations: Vec<(String, Vec<Rule>)>,
    object_validator: Option<ObjectValidator>,
    hooks: HashMap<HookName, Vec<HookFn>>,
    relations: Vec<RelationInfo>,
}

impl ModelDescriptor {
    /// Start describing a model.
    pub fn builder(name: impl Into<String>) -> DescriptorBuilder {
        DescriptorBuilder::new(name)
    }

    /// Model name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Namespace, if any.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Physical table name.
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Name of the database client this model uses.
    pub fn client(&self) -> &str {
        &self.client
    }

    /// All columns, implicit ones included.
    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    /// Column by friendly name.
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Column by physical name.
    pub fn column_by_source(&self, source: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.source == source)
    }

    /// Whether a friendly field name maps to a column.
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Whether updates are guarded by the `revision` counter.
    pub fn is_revisioned(&self) -> bool {
        self.revisioned
    }

    /// Declared per-field rules, in declaration order.
    pub fn validations(&self) -> &[(String, Vec<Rule>)] {
        &self.validations
    }

    /// Whole-record validation callback.
    pub fn object_validator(&self) -> Option<&ObjectValidator> {
        self.object_validator.as_ref()
    }

    /// Callbacks registered for a hook, in registration order.
    pub fn hooks(&self, hook: HookName) -> &[HookFn] {
        self.hooks.get(&hook).map_or(&[], Vec::as_slice)
    }

    /// All relations.
    pub fn relations(&self) -> &[RelationInfo] {
        &self.relations
    }

    /// Relation by name.
    pub fn relation(&self, name: &str) -> Option<&RelationInfo> {
        self.relations.iter().find(|r| r.name == name)
    }
}

impl fmt::Debug for ModelDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hook_counts: Vec<(&str, usize)> = HookName::ALL
            .iter()
            .map(|h| (h.as_str(), self.hooks(*h).len()))
            .filter(|(_, n)| *n > 0)
            .collect();
        f.debug_struct("ModelDescriptor")
            .field("name", &self.name)
            .field("namespace", &self.namespace)
            .field("table_name", &self.table_name)
            .field("client", &self.client)
            .field("columns", &self.columns)
            .field("revisioned", &self.revisioned)
            .field(
                "validations",
                &self
                    .validations
                    .iter()
                    .map(|(field, rules)| (field, rules.len()))
                    .collect::<Vec<_>>(),
            )
            .field("hooks", &hook_counts)
            .field("relations", &self.relations)
            .finish_non_exhaustive()
    }
}

struct PendingRelation {
    kind: RelationKind,
    name: String,
    model: String,
    foreign_key: Option<String>,
}

/// Builder for [`ModelDescriptor`].
///
/// # Example
///
/// ```
/// use rowbind_core::descriptor::{ModelDescriptor, SqlType};
/// use rowbind_core::validate::Rule;
///
/// let person = ModelDescriptor::builder("person")
///     .table("people")
///     .column("name", SqlType::Text)
///     .column("age", SqlType::BigInt)
///     .revisioned()
///     .validate_field("age", Rule::required())
///     .build();
///
/// assert_eq!(person.table_name(), "people");
/// assert_eq!(person.column("createdAt").unwrap().source, "created_at");
/// ```
pub struct DescriptorBuilder {
    name: String,
    namespace: Option<String>,
    table_name: Option<String>,
    client: String,
    columns: Vec<ColumnInfo>,
    revisioned: bool,
    validations: Vec<(String, Vec<Rule>)>,
    object_validator: Option<ObjectValidator>,
    hooks: HashMap<HookName, Vec<HookFn>>,
    relations: Vec<PendingRelation>,
}

impl DescriptorBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            table_name: None,
            client: "default".to_string(),
            columns: Vec::new(),
            revisioned: false,
            validations: Vec::new(),
            object_validator: None,
            hooks: HashMap::new(),
            relations: Vec::new(),
        }
    }

    /// Place the model in a namespace.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Set the physical table name instead of deriving it.
    pub fn table(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }

    /// Use a named database client (default: `"default"`).
    pub fn client(mut self, client: impl Into<String>) -> Self {
        self.client = client.into();
        self
    }

    /// Add a column with a derived physical name.
    pub fn column(self, name: impl Into<String>, sql_type: SqlType) -> Self {
        self.column_info(ColumnInfo::new(name, sql_type))
    }

    /// Add a column with an explicit physical name.
    pub fn column_with_source(
        self,
        name: impl Into<String>,
        source: impl Into<String>,
        sql_type: SqlType,
    ) -> Self {
        self.column_info(ColumnInfo::new(name, sql_type).source(source))
    }

    /// Add a fully specified column. Redeclaring a name replaces it.
    pub fn column_info(mut self, column: ColumnInfo) -> Self {
        match self.columns.iter_mut().find(|c| c.name == column.name) {
            Some(existing) => *existing = column,
            None => self.columns.push(column),
        }
        self
    }

    /// Guard updates with a `revision` counter.
    pub fn revisioned(mut self) -> Self {
        self.revisioned = true;
        self
    }

    /// Add a validation rule for a field.
    pub fn validate_field(mut self, field: impl Into<String>, rule: Rule) -> Self {
        let field = field.into();
        match self.validations.iter_mut().find(|(f, _)| *f == field) {
            Some((_, rules)) => rules.push(rule),
            None => self.validations.push((field, vec![rule])),
        }
        self
    }

    /// Set the whole-record validation callback.
    pub fn validate_with<F>(mut self, validator: F) -> Self
    where
        F: Fn(&Record, &mut ValidationContext) + Send + Sync + 'static,
    {
        self.object_validator = Some(Arc::new(validator));
        self
    }

    /// Append a callback to a lifecycle hook.
    pub fn hook<F>(mut self, hook: HookName, callback: F) -> Self
    where
        F: Fn(&mut Record) -> crate::Result<()> + Send + Sync + 'static,
    {
        self.hooks.entry(hook).or_default().push(Arc::new(callback));
        self
    }

    /// Declare a `belongsTo` relation.
    pub fn belongs_to(self, name: impl Into<String>, model: impl Into<String>) -> Self {
        self.relation(RelationKind::BelongsTo, name, model)
    }

    /// Declare a `hasMany` relation.
    pub fn has_many(self, name: impl Into<String>, model: impl Into<String>) -> Self {
        self.relation(RelationKind::HasMany, name, model)
    }

    /// Declare a `hasOne` relation.
    pub fn has_one(self, name: impl Into<String>, model: impl Into<String>) -> Self {
        self.relation(RelationKind::HasOne, name, model)
    }

    fn relation(
        mut self,
        kind: RelationKind,
        name: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        self.relations.push(PendingRelation {
            kind,
            name: name.into(),
            model: model.into(),
            foreign_key: None,
        });
        self
    }

    /// Override the foreign key of the most recently declared relation.
    pub fn foreign_key(mut self, field: impl Into<String>) -> Self {
        if let Some(last) = self.relations.last_mut() {
            last.foreign_key = Some(field.into());
        }
        self
    }

    /// Finish the descriptor.
    ///
    /// Adds the implicit `id`, `createdAt`, `updatedAt` (and `revision`)
    /// columns and derives defaults for anything left unspecified.
    pub fn build(self) -> ModelDescriptor {
        let mut columns = Vec::with_capacity(self.columns.len() + 4);
        columns.push(ColumnInfo::new(ID, SqlType::BigInt));
        columns.extend(
            self.columns
                .into_iter()
                .filter(|c| !is_implicit(&c.name, self.revisioned)),
        );
        columns.push(ColumnInfo::new(CREATED_AT, SqlType::Timestamp));
        columns.push(ColumnInfo::new(UPDATED_AT, SqlType::Timestamp));
        if self.revisioned {
            columns.push(ColumnInfo::new(REVISION, SqlType::BigInt));
        }

        let owner = self.name.clone();
        let relations = self
            .relations
            .into_iter()
            .map(|r| {
                let foreign_key = r.foreign_key.unwrap_or_else(|| match r.kind {
                    RelationKind::BelongsTo => naming::foreign_key(&r.name),
                    RelationKind::HasMany | RelationKind::HasOne => naming::foreign_key(&owner),
                });
                RelationInfo {
                    kind: r.kind,
                    name: r.name,
                    model: r.model,
                    foreign_key,
                }
            })
            .collect();

        ModelDescriptor {
            table_name: self
                .table_name
                .unwrap_or_else(|| naming::table_name(&self.name)),
            name: self.name,
            namespace: self.namespace,
            client: self.client,
            columns,
            revisioned: self.revisioned,
            validations: self.validations,
            object_validator: self.object_validator,
            hooks: self.hooks,
            relations,
        }
    }
}

fn is_implicit(name: &str, revisioned: bool) -> bool {
    matches!(name, ID | CREATED_AT | UPDATED_AT) || (revisioned && name == REVISION)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person() -> ModelDescriptor {
        ModelDescriptor::builder("person")
            .table("people")
            .column("name", SqlType::Text)
            .column("age", SqlType::BigInt)
            .revisioned()
            .build()
    }

    #[test]
    fn test_implicit_columns_are_added_in_order() {
        let binding = person();
        let names: Vec<&str> = binding.columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["id", "name", "age", "createdAt", "updatedAt", "revision"]
        );
    }

    #[test]
    fn test_redeclared_implicit_column_is_not_duplicated() {
        let d = ModelDescriptor::builder("tag")
            .column("id", SqlType::Text)
            .column("label", SqlType::Text)
            .build();
        assert_eq!(d.columns().iter().filter(|c| c.name == "id").count(), 1);
        assert!(!d.has_column("revision"));
        assert_eq!(d.table_name(), "tags");
    }

    #[test]
    fn test_source_names() {
        let d = ModelDescriptor::builder("user")
            .column("firstName", SqlType::Text)
            .column_with_source("email", "email_address", SqlType::Text)
            .build();
        assert_eq!(d.column("firstName").unwrap().source, "first_name");
        assert_eq!(d.column_by_source("email_address").unwrap().name, "email");
        assert_eq!(d.column("updatedAt").unwrap().source, "updated_at");
    }

    #[test]
    fn test_relation_foreign_key_defaults() {
        let d = ModelDescriptor::builder("post")
            .belongs_to("author", "user")
            .has_many("comments", "comment")
            .has_one("cover", "image")
            .foreign_key("postRef")
            .build();

        let author = d.relation("author").unwrap();
        assert_eq!(author.kind, RelationKind::BelongsTo);
        assert_eq!(author.foreign_key, "authorId");

        let comments = d.relation("comments").unwrap();
        assert_eq!(comments.foreign_key, "postId");

        assert_eq!(d.relation("cover").unwrap().foreign_key, "postRef");
        assert!(d.relation("missing").is_none());
    }

    #[test]
    fn test_hooks_accumulate() {
        let d = ModelDescriptor::builder("note")
            .hook(HookName::BeforeSave, |_| Ok(()))
            .hook(HookName::BeforeSave, |_| Ok(()))
            .build();
        assert_eq!(d.hooks(HookName::BeforeSave).len(), 2);
        assert!(d.hooks(HookName::AfterSave).is_empty());
        assert_eq!(d.client(), "default");
    }
}
