//! Result rows returned by drivers.

use std::sync::Arc;

use crate::value::Value;

/// One row of a result set, keyed by physical column name.
///
/// Rows from the same result share their column list.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<Vec<String>>,
    values: Vec<Value>,
}

impl Row {
    /// Create a row. `values` is truncated or padded with `Null` to match `columns`.
    pub fn new(columns: Arc<Vec<String>>, mut values: Vec<Value>) -> Self {
        values.resize(columns.len(), Value::Null);
        Self { columns, values }
    }

    /// Build a standalone row from `(column, value)` pairs.
    pub fn from_pairs<K: Into<String>>(pairs: impl IntoIterator<Item = (K, Value)>) -> Self {
        let (columns, values): (Vec<String>, Vec<Value>) =
            pairs.into_iter().map(|(k, v)| (k.into(), v)).unzip();
        Self {
            columns: Arc::new(columns),
            values,
        }
    }

    /// Column names in result order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Values in result order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at a position.
    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    /// Value for a physical column name.
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == name)
            .and_then(|idx| self.values.get(idx))
    }

    /// Iterate `(column, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_by_name() {
        let row = Row::from_pairs([("id", Value::BigInt(1)), ("name", Value::from("Jim"))]);
        assert_eq!(row.get_by_name("name"), Some(&Value::from("Jim")));
        assert_eq!(row.get_by_name("age"), None);
        assert_eq!(row.len(), 2);
    }

    #[test]
    fn test_new_pads_missing_values() {
        let cols = Arc::new(vec!["a".to_string(), "b".to_string()]);
        let row = Row::new(cols, vec![Value::BigInt(1)]);
        assert_eq!(row.get(1), Some(&Value::Null));
    }
}
