//! SQL expressions and dialect-specific rendering.

use rowbind_core::{Value, quote_ident};

const SQLITE_NOW: &str = "CAST((julianday('now') - 2440587.5) * 86400000000 AS INTEGER)";

/// SQL dialect. Controls placeholder syntax and the clock expression.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Dialect {
    /// `$1, $2, ...`
    #[default]
    Postgres,
    /// `?1, ?2, ...`
    Sqlite,
}

impl Dialect {
    /// Placeholder for the 1-based parameter `index`.
    #[must_use]
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::Sqlite => format!("?{index}"),
        }
    }

    /// Quote an identifier. Both dialects use double quotes.
    #[must_use]
    pub fn quote_ident(self, name: &str) -> String {
        quote_ident(name)
    }

    /// Current time. On SQLite this is microseconds since the epoch, stable
    /// within one statement.
    #[must_use]
    pub const fn now(self) -> &'static str {
        match self {
            Dialect::Postgres => "NOW()",
            Dialect::Sqlite => SQLITE_NOW,
        }
    }

    /// Parse a dialect name (`postgres`, `pg`, `sqlite`).
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Some(Dialect::Postgres),
            "sqlite" | "sqlite3" => Some(Dialect::Sqlite),
            _ => None,
        }
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `LIKE`
    Like,
    /// `NOT LIKE`
    NotLike,
    /// `+`
    Add,
}

impl BinaryOp {
    /// SQL text of the operator.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Like => "LIKE",
            BinaryOp::NotLike => "NOT LIKE",
            BinaryOp::Add => "+",
        }
    }
}

/// A SQL expression tree.
///
/// Values are always bound as parameters; only identifiers and keywords are
/// rendered inline.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A quoted column reference.
    Column(String),
    /// A bound parameter.
    Value(Value),
    /// Literal SQL (keywords and function calls).
    Raw(String),
    /// The database clock, read once per statement.
    Now,
    /// `left op right`
    Binary {
        /// Left operand.
        left: Box<Expr>,
        /// Operator.
        op: BinaryOp,
        /// Right operand.
        right: Box<Expr>,
    },
    /// Conjunction. Empty renders `TRUE`.
    And(Vec<Expr>),
    /// Disjunction. Empty renders `FALSE`.
    Or(Vec<Expr>),
    /// `NOT (expr)`
    Not(Box<Expr>),
    /// `expr IS [NOT] NULL`
    IsNull {
        /// Tested expression.
        expr: Box<Expr>,
        /// `IS NOT NULL` when true.
        negated: bool,
    },
    /// `expr [NOT] IN (...)`
    InList {
        /// Tested expression.
        expr: Box<Expr>,
        /// Candidate values.
        values: Vec<Value>,
        /// `NOT IN` when true.
        negated: bool,
    },
}

impl Expr {
    /// Column reference.
    pub fn col(name: impl Into<String>) -> Self {
        Expr::Column(name.into())
    }

    /// Bound value.
    pub fn value(value: impl Into<Value>) -> Self {
        Expr::Value(value.into())
    }

    /// Literal SQL.
    pub fn raw(sql: impl Into<String>) -> Self {
        Expr::Raw(sql.into())
    }

    /// The database clock.
    pub fn now() -> Self {
        Expr::Now
    }

    fn binary(self, op: BinaryOp, right: Expr) -> Self {
        Expr::Binary {
            left: Box::new(self),
            op,
            right: Box::new(right),
        }
    }

    /// `self = value`
    pub fn eq(self, value: impl Into<Value>) -> Self {
        self.binary(BinaryOp::Eq, Expr::value(value))
    }

    /// `self <> value`
    pub fn ne(self, value: impl Into<Value>) -> Self {
        self.binary(BinaryOp::Ne, Expr::value(value))
    }

    /// `self < value`
    pub fn lt(self, value: impl Into<Value>) -> Self {
        self.binary(BinaryOp::Lt, Expr::value(value))
    }

    /// `self <= value`
    pub fn le(self, value: impl Into<Value>) -> Self {
        self.binary(BinaryOp::Le, Expr::value(value))
    }

    /// `self > value`
    pub fn gt(self, value: impl Into<Value>) -> Self {
        self.binary(BinaryOp::Gt, Expr::value(value))
    }

    /// `self >= value`
    pub fn ge(self, value: impl Into<Value>) -> Self {
        self.binary(BinaryOp::Ge, Expr::value(value))
    }

    /// `self LIKE pattern`
    pub fn like(self, pattern: impl Into<Value>) -> Self {
        self.binary(BinaryOp::Like, Expr::value(pattern))
    }

    /// `self NOT LIKE pattern`
    pub fn not_like(self, pattern: impl Into<Value>) -> Self {
        self.binary(BinaryOp::NotLike, Expr::value(pattern))
    }

    /// `self + other`
    pub fn add(self, other: Expr) -> Self {
        self.binary(BinaryOp::Add, other)
    }

    /// `self IS NULL`
    pub fn is_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: false,
        }
    }

    /// `self IS NOT NULL`
    pub fn is_not_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: true,
        }
    }

    /// `self IN (values)`. An empty list matches nothing.
    pub fn in_list(self, values: Vec<Value>) -> Self {
        Expr::InList {
            expr: Box::new(self),
            values,
            negated: false,
        }
    }

    /// `self NOT IN (values)`. An empty list matches everything.
    pub fn not_in(self, values: Vec<Value>) -> Self {
        Expr::InList {
            expr: Box::new(self),
            values,
            negated: true,
        }
    }

    /// `self AND other`, flattening nested conjunctions.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut items) => {
                items.push(other);
                Expr::And(items)
            }
            first => Expr::And(vec![first, other]),
        }
    }

    /// `self OR other`, flattening nested disjunctions.
    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut items) => {
                items.push(other);
                Expr::Or(items)
            }
            first => Expr::Or(vec![first, other]),
        }
    }

    /// `NOT (self)`
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    /// Conjunction of many expressions; `None` when there are none.
    pub fn all(exprs: impl IntoIterator<Item = Expr>) -> Option<Self> {
        let mut items: Vec<Expr> = exprs.into_iter().collect();
        match items.len() {
            0 => None,
            1 => items.pop(),
            _ => Some(Expr::And(items)),
        }
    }

    /// Render to SQL with parameters numbered after `offset`.
    pub fn build_with_dialect(&self, dialect: Dialect, offset: usize) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let sql = self.render(dialect, offset, &mut params);
        (sql, params)
    }

    /// Render into an existing parameter list.
    ///
    /// Placeholders are numbered `offset + params.len() + 1` onwards.
    pub fn render(&self, dialect: Dialect, offset: usize, params: &mut Vec<Value>) -> String {
        match self {
            Expr::Column(name) => dialect.quote_ident(name),
            Expr::Value(value) => {
                params.push(value.clone());
                dialect.placeholder(offset + params.len())
            }
            Expr::Raw(sql) => sql.clone(),
            Expr::Now => dialect.now().to_string(),
            Expr::Binary { left, op, right } => {
                let l = left.render_operand(dialect, offset, params);
                let r = right.render_operand(dialect, offset, params);
                format!("{l} {} {r}", op.as_str())
            }
            Expr::And(items) => render_joined(items, " AND ", "TRUE", dialect, offset, params),
            Expr::Or(items) => render_joined(items, " OR ", "FALSE", dialect, offset, params),
            Expr::Not(inner) => format!("NOT ({})", inner.render(dialect, offset, params)),
            Expr::IsNull { expr, negated } => {
                let e = expr.render_operand(dialect, offset, params);
                if *negated {
                    format!("{e} IS NOT NULL")
                } else {
                    format!("{e} IS NULL")
                }
            }
            Expr::InList {
                expr,
                values,
                negated,
            } => {
                if values.is_empty() {
                    return if *negated { "TRUE" } else { "FALSE" }.to_string();
                }
                let e = expr.render_operand(dialect, offset, params);
                let placeholders: Vec<String> = values
                    .iter()
                    .map(|v| {
                        params.push(v.clone());
                        dialect.placeholder(offset + params.len())
                    })
                    .collect();
                let keyword = if *negated { "NOT IN" } else { "IN" };
                format!("{e} {keyword} ({})", placeholders.join(", "))
            }
        }
    }

    fn is_compound(&self) -> bool {
        matches!(
            self,
            Expr::Binary { .. } | Expr::And(_) | Expr::Or(_) | Expr::IsNull { .. } | Expr::InList { .. }
        )
    }

    fn render_operand(&self, dialect: Dialect, offset: usize, params: &mut Vec<Value>) -> String {
        let sql = self.render(dialect, offset, params);
        if self.is_compound() {
            format!("({sql})")
        } else {
            sql
        }
    }
}

fn render_joined(
    items: &[Expr],
    separator: &str,
    empty: &str,
    dialect: Dialect,
    offset: usize,
    params: &mut Vec<Value>,
) -> String {
    match items {
        [] => empty.to_string(),
        [only] => only.render(dialect, offset, params),
        _ => items
            .iter()
            .map(|item| match item {
                Expr::And(_) | Expr::Or(_) => {
                    format!("({})", item.render(dialect, offset, params))
                }
                _ => item.render(dialect, offset, params),
            })
            .collect::<Vec<_>>()
            .join(separator),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders() {
        assert_eq!(Dialect::Postgres.placeholder(3), "$3");
        assert_eq!(Dialect::Sqlite.placeholder(3), "?3");
        assert_eq!(Dialect::parse("PG"), Some(Dialect::Postgres));
        assert_eq!(Dialect::parse("mysql"), None);
    }

    #[test]
    fn test_now_follows_dialect() {
        let (pg, params) = Expr::now().build_with_dialect(Dialect::Postgres, 0);
        assert_eq!(pg, "NOW()");
        assert!(params.is_empty());
        let (sqlite, _) = Expr::now().build_with_dialect(Dialect::Sqlite, 0);
        assert!(sqlite.starts_with("CAST((julianday('now')"));
    }

    #[test]
    fn test_comparison_binds_value() {
        let (sql, params) = Expr::col("age").gt(20).build_with_dialect(Dialect::Postgres, 0);
        assert_eq!(sql, "\"age\" > $1");
        assert_eq!(params, vec![Value::BigInt(20)]);
    }

    #[test]
    fn test_and_or_nesting() {
        let expr = Expr::col("a")
            .eq(1)
            .and(Expr::col("b").eq(2).or(Expr::col("c").is_null()));
        let (sql, params) = expr.build_with_dialect(Dialect::Sqlite, 2);
        assert_eq!(sql, "\"a\" = ?3 AND (\"b\" = ?4 OR \"c\" IS NULL)");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_in_list() {
        let (sql, params) = Expr::col("id")
            .in_list(vec![Value::BigInt(1), Value::BigInt(2)])
            .build_with_dialect(Dialect::Postgres, 0);
        assert_eq!(sql, "\"id\" IN ($1, $2)");
        assert_eq!(params.len(), 2);

        let (sql, params) = Expr::col("id").in_list(vec![]).build_with_dialect(Dialect::Postgres, 0);
        assert_eq!(sql, "FALSE");
        assert!(params.is_empty());

        let (sql, _) = Expr::col("id").not_in(vec![]).build_with_dialect(Dialect::Postgres, 0);
        assert_eq!(sql, "TRUE");
    }

    #[test]
    fn test_increment_expression() {
        let (sql, params) = Expr::col("revision")
            .add(Expr::value(1))
            .build_with_dialect(Dialect::Postgres, 4);
        assert_eq!(sql, "\"revision\" + $5");
        assert_eq!(params, vec![Value::BigInt(1)]);
    }

    #[test]
    fn test_all_collapses() {
        assert!(Expr::all(Vec::new()).is_none());
        assert_eq!(Expr::all(vec![Expr::col("x").eq(1)]), Some(Expr::col("x").eq(1)));
    }
}
