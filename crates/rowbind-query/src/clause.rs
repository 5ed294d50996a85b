//! WHERE and ORDER BY clauses.

use rowbind_core::{Error, Result, Value};

use crate::expr::{Dialect, Expr};

/// A WHERE clause: a conjunction of filter expressions.
#[derive(Debug, Clone, PartialEq)]
pub struct Where {
    expr: Expr,
}

impl Where {
    /// Start a clause from one expression.
    pub fn new(expr: Expr) -> Self {
        Self { expr }
    }

    /// Add a condition with AND.
    #[must_use]
    pub fn and(self, expr: Expr) -> Self {
        Self {
            expr: self.expr.and(expr),
        }
    }

    /// Add a condition with OR.
    #[must_use]
    pub fn or(self, expr: Expr) -> Self {
        Self {
            expr: self.expr.or(expr),
        }
    }

    /// The underlying expression.
    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Render with parameters numbered after `offset`.
    pub fn build_with_dialect(&self, dialect: Dialect, offset: usize) -> (String, Vec<Value>) {
        self.expr.build_with_dialect(dialect, offset)
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Direction {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

impl Direction {
    /// Parse `asc` / `desc` (case-insensitive).
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(Direction::Asc),
            "desc" => Ok(Direction::Desc),
            other => Err(Error::custom(format!("unknown sort direction '{other}'"))),
        }
    }

    /// SQL keyword.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// One ORDER BY term on a physical column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    /// Physical column name.
    pub column: String,
    /// Direction.
    pub direction: Direction,
}

impl OrderBy {
    /// Ascending order on `column`.
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: Direction::Asc,
        }
    }

    /// Descending order on `column`.
    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: Direction::Desc,
        }
    }

    /// Render as SQL.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        format!(
            "{} {}",
            dialect.quote_ident(&self.column),
            self.direction.as_sql()
        )
    }
}
