//! Statement builders for SELECT, INSERT, UPDATE and DELETE.
//!
//! Builders work on physical table and column names. The `for_*`
//! constructors translate a [`ModelDescriptor`] plus friendly-named values
//! into a statement, applying the timestamp and revision rules:
//!
//! - INSERT never sends `id`, `createdAt`, `updatedAt` or `revision`; the
//!   timestamps are set from the database clock and `revision` starts at 1.
//! - UPDATE sends only the given changes, forces `updatedAt` to the database
//!   clock and increments `revision`.

use std::collections::BTreeMap;

use rowbind_core::descriptor::{CREATED_AT, ID, REVISION, UPDATED_AT};
use rowbind_core::{ModelDescriptor, Record, Value};

use crate::clause::{OrderBy, Where};
use crate::expr::{Dialect, Expr};

/// Anything that renders to a parameterized SQL statement.
pub trait Statement {
    /// Render with a specific dialect.
    fn build_with_dialect(&self, dialect: Dialect) -> (String, Vec<Value>);

    /// Render with the default dialect (Postgres).
    fn build(&self) -> (String, Vec<Value>) {
        self.build_with_dialect(Dialect::default())
    }
}

/// Builders that accept WHERE conditions.
pub trait Filterable: Sized {
    /// AND `expr` into the WHERE clause.
    fn and_where(self, expr: Expr) -> Self;
}

fn push_filter(clause: Option<Where>, expr: Expr) -> Option<Where> {
    Some(match clause {
        Some(existing) => existing.and(expr),
        None => Where::new(expr),
    })
}

/// Columns the engine manages itself.
fn is_managed(field: &str) -> bool {
    matches!(field, ID | CREATED_AT | UPDATED_AT | REVISION)
}

fn source_of(descriptor: &ModelDescriptor, field: &str) -> String {
    descriptor
        .column(field)
        .map_or_else(|| field.to_string(), |c| c.source.clone())
}

/// SELECT query builder.
///
/// # Example
///
/// ```
/// use rowbind_query::{Dialect, Expr, OrderBy, SelectBuilder, Statement};
///
/// let (sql, params) = SelectBuilder::new("people")
///     .filter(Expr::col("age").gt(20))
///     .order_by(OrderBy::desc("age"))
///     .limit(10)
///     .build_with_dialect(Dialect::Postgres);
///
/// assert_eq!(
///     sql,
///     "SELECT * FROM \"people\" WHERE \"age\" > $1 ORDER BY \"age\" DESC LIMIT 10"
/// );
/// assert_eq!(params.len(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectBuilder {
    table: String,
    columns: Vec<String>,
    where_clause: Option<Where>,
    order_by: Vec<OrderBy>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl SelectBuilder {
    /// Select every column of `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    /// Select from a model's table.
    pub fn from_descriptor(descriptor: &ModelDescriptor) -> Self {
        Self::new(descriptor.table_name())
    }

    /// Table being selected from.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Restrict the result to physical `columns`.
    pub fn columns<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Add a WHERE condition.
    pub fn filter(mut self, expr: Expr) -> Self {
        self.where_clause = push_filter(self.where_clause, expr);
        self
    }

    /// Append an ORDER BY term.
    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    /// Set LIMIT.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set OFFSET.
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Current LIMIT.
    pub fn limit_value(&self) -> Option<u64> {
        self.limit
    }
}

impl Filterable for SelectBuilder {
    fn and_where(self, expr: Expr) -> Self {
        self.filter(expr)
    }
}

impl Statement for SelectBuilder {
    fn build_with_dialect(&self, dialect: Dialect) -> (String, Vec<Value>) {
        let columns = if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns
                .iter()
                .map(|c| dialect.quote_ident(c))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let mut sql = format!("SELECT {columns} FROM {}", dialect.quote_ident(&self.table));
        let mut params = Vec::new();

        if let Some(where_clause) = &self.where_clause {
            let (where_sql, where_params) = where_clause.build_with_dialect(dialect, 0);
            sql.push_str(" WHERE ");
            sql.push_str(&where_sql);
            params = where_params;
        }

        if !self.order_by.is_empty() {
            let terms: Vec<String> = self.order_by.iter().map(|o| o.to_sql(dialect)).collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }

        (sql, params)
    }
}

/// INSERT query builder.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertBuilder {
    table: String,
    values: Vec<(String, Expr)>,
    returning: bool,
}

impl InsertBuilder {
    /// Insert into `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            values: Vec::new(),
            returning: false,
        }
    }

    /// Insert a record, letting the database assign identity and timestamps.
    ///
    /// Only fields that map to non-managed columns are sent.
    pub fn for_record(descriptor: &ModelDescriptor, record: &Record) -> Self {
        let mut insert = Self::new(descriptor.table_name());
        for column in descriptor.columns() {
            if is_managed(&column.name) {
                continue;
            }
            if let Some(value) = record.get(&column.name) {
                insert = insert.value(column.source.clone(), value.clone());
            }
        }
        insert = insert
            .value_expr(source_of(descriptor, CREATED_AT), Expr::now())
            .value_expr(source_of(descriptor, UPDATED_AT), Expr::now());
        if descriptor.is_revisioned() {
            insert = insert.value(source_of(descriptor, REVISION), 1);
        }
        insert.returning()
    }

    /// Bind a value for `column`.
    pub fn value(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.value_expr(column, Expr::value(value))
    }

    /// Use an expression for `column`.
    pub fn value_expr(mut self, column: impl Into<String>, expr: Expr) -> Self {
        self.values.push((column.into(), expr));
        self
    }

    /// Add RETURNING * to get the inserted row back.
    pub fn returning(mut self) -> Self {
        self.returning = true;
        self
    }
}

impl Statement for InsertBuilder {
    fn build_with_dialect(&self, dialect: Dialect) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let columns: Vec<String> = self
            .values
            .iter()
            .map(|(c, _)| dialect.quote_ident(c))
            .collect();
        let values: Vec<String> = self
            .values
            .iter()
            .map(|(_, e)| e.render(dialect, 0, &mut params))
            .collect();

        let mut sql = if columns.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", dialect.quote_ident(&self.table))
        } else {
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                dialect.quote_ident(&self.table),
                columns.join(", "),
                values.join(", ")
            )
        };
        if self.returning {
            sql.push_str(" RETURNING *");
        }
        (sql, params)
    }
}

/// UPDATE query builder.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateBuilder {
    table: String,
    sets: Vec<(String, Expr)>,
    where_clause: Option<Where>,
    returning: bool,
}

impl UpdateBuilder {
    /// Update rows of `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            sets: Vec::new(),
            where_clause: None,
            returning: false,
        }
    }

    /// Update the given friendly-named changes.
    ///
    /// Managed columns in `changes` are ignored; `updatedAt` is always set
    /// from the database clock and `revision` incremented.
    pub fn for_changes(descriptor: &ModelDescriptor, changes: &BTreeMap<String, Value>) -> Self {
        let mut update = Self::new(descriptor.table_name());
        for column in descriptor.columns() {
            if is_managed(&column.name) {
                continue;
            }
            if let Some(value) = changes.get(&column.name) {
                update = update.set(column.source.clone(), value.clone());
            }
        }
        update = update.set_expr(source_of(descriptor, UPDATED_AT), Expr::now());
        if descriptor.is_revisioned() {
            let revision = source_of(descriptor, REVISION);
            update = update.set_expr(revision.clone(), Expr::col(revision).add(Expr::raw("1")));
        }
        update.returning()
    }

    /// Set `column` to a bound value.
    pub fn set(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_expr(column, Expr::value(value))
    }

    /// Set `column` to an expression.
    pub fn set_expr(mut self, column: impl Into<String>, expr: Expr) -> Self {
        self.sets.push((column.into(), expr));
        self
    }

    /// Add a WHERE condition.
    pub fn filter(mut self, expr: Expr) -> Self {
        self.where_clause = push_filter(self.where_clause, expr);
        self
    }

    /// Add RETURNING * to get the updated rows back.
    pub fn returning(mut self) -> Self {
        self.returning = true;
        self
    }
}

impl Filterable for UpdateBuilder {
    fn and_where(self, expr: Expr) -> Self {
        self.filter(expr)
    }
}

impl Statement for UpdateBuilder {
    /// Renders an empty string when there is nothing to set.
    fn build_with_dialect(&self, dialect: Dialect) -> (String, Vec<Value>) {
        if self.sets.is_empty() {
            return (String::new(), Vec::new());
        }

        let mut params = Vec::new();
        let sets: Vec<String> = self
            .sets
            .iter()
            .map(|(column, expr)| {
                format!(
                    "{} = {}",
                    dialect.quote_ident(column),
                    expr.render(dialect, 0, &mut params)
                )
            })
            .collect();
        let mut sql = format!(
            "UPDATE {} SET {}",
            dialect.quote_ident(&self.table),
            sets.join(", ")
        );

        if let Some(where_clause) = &self.where_clause {
            let (where_sql, where_params) = where_clause.build_with_dialect(dialect, params.len());
            sql.push_str(" WHERE ");
            sql.push_str(&where_sql);
            params.extend(where_params);
        }

        if self.returning {
            sql.push_str(" RETURNING *");
        }

        (sql, params)
    }
}

/// DELETE query builder.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteBuilder {
    table: String,
    where_clause: Option<Where>,
}

impl DeleteBuilder {
    /// Delete from `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            where_clause: None,
        }
    }

    /// Add a WHERE condition.
    pub fn filter(mut self, expr: Expr) -> Self {
        self.where_clause = push_filter(self.where_clause, expr);
        self
    }
}

impl Filterable for DeleteBuilder {
    fn and_where(self, expr: Expr) -> Self {
        self.filter(expr)
    }
}

impl Statement for DeleteBuilder {
    fn build_with_dialect(&self, dialect: Dialect) -> (String, Vec<Value>) {
        let mut sql = format!("DELETE FROM {}", dialect.quote_ident(&self.table));
        let mut params = Vec::new();
        if let Some(where_clause) = &self.where_clause {
            let (where_sql, where_params) = where_clause.build_with_dialect(dialect, 0);
            sql.push_str(" WHERE ");
            sql.push_str(&where_sql);
            params = where_params;
        }
        (sql, params)
    }
}

/// Raw SQL with bound parameters.
///
/// The SQL must already use the target dialect's placeholder syntax.
#[derive(Debug, Clone, PartialEq)]
pub struct RawQuery {
    sql: String,
    params: Vec<Value>,
}

impl RawQuery {
    /// Wrap a SQL string.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Bind a parameter value.
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }

    /// Bind multiple parameter values.
    pub fn bind_all(mut self, values: impl IntoIterator<Item = Value>) -> Self {
        self.params.extend(values);
        self
    }
}

impl Statement for RawQuery {
    fn build_with_dialect(&self, _dialect: Dialect) -> (String, Vec<Value>) {
        (self.sql.clone(), self.params.clone())
    }
}
