//! Table definitions for test and demo databases.

use rowbind_core::{ModelDescriptor, quote_ident};

/// Column layout and unique constraints of one table.
///
/// Columns are declared without a type so SQLite stores every value with
/// the storage class it was bound with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDef {
    name: String,
    columns: Vec<String>,
    unique: Vec<String>,
}

impl TableDef {
    /// A table with an auto-increment `id` column.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: vec!["id".to_string()],
            unique: Vec::new(),
        }
    }

    /// Lay out a table from a model's physical columns.
    pub fn from_descriptor(descriptor: &ModelDescriptor) -> Self {
        descriptor
            .columns()
            .iter()
            .fold(Self::new(descriptor.table_name()), |def, c| def.column(&c.source))
    }

    /// Add a column (ignored if already present).
    #[must_use]
    pub fn column(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.columns.contains(&name) {
            self.columns.push(name);
        }
        self
    }

    /// Add a single-column unique constraint, declaring the column if needed.
    #[must_use]
    pub fn unique(self, name: impl Into<String>) -> Self {
        let name = name.into();
        let mut def = self.column(name.clone());
        if name != "id" && !def.unique.contains(&name) {
            def.unique.push(name);
        }
        def
    }

    /// Table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Columns in declaration order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// The `CREATE TABLE` statement for this layout.
    pub fn create_sql(&self) -> String {
        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                let ident = quote_ident(c);
                if c == "id" {
                    format!("{ident} INTEGER PRIMARY KEY AUTOINCREMENT")
                } else if self.unique.contains(c) {
                    format!("{ident} UNIQUE")
                } else {
                    ident
                }
            })
            .collect();
        format!(
            "CREATE TABLE {} ({})",
            quote_ident(&self.name),
            columns.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowbind_core::SqlType;

    #[test]
    fn test_from_descriptor_uses_physical_names() {
        let d = ModelDescriptor::builder("person")
            .table("people")
            .column("firstName", SqlType::Text)
            .revisioned()
            .build();
        let def = TableDef::from_descriptor(&d).unique("first_name");
        assert_eq!(def.name(), "people");
        assert_eq!(
            def.columns(),
            ["id", "first_name", "created_at", "updated_at", "revision"]
        );
        assert_eq!(
            def.create_sql(),
            "CREATE TABLE \"people\" (\"id\" INTEGER PRIMARY KEY AUTOINCREMENT, \
             \"first_name\" UNIQUE, \"created_at\", \"updated_at\", \"revision\")"
        );
    }

    #[test]
    fn test_unique_declares_column() {
        let def = TableDef::new("people").unique("email").unique("id");
        assert_eq!(def.columns(), ["id", "email"]);
        assert_eq!(
            def.create_sql(),
            "CREATE TABLE \"people\" (\"id\" INTEGER PRIMARY KEY AUTOINCREMENT, \"email\" UNIQUE)"
        );
    }
}
