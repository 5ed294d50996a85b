//! Naming conventions: identifier quoting, case conversion, pluralization.
//!
//! These are deliberately minimal. Descriptors can always override the
//! derived table, column and foreign-key names explicitly.

use convert_case::{Case, Casing};

/// Quote an identifier for SQL, doubling embedded quotes.
#[must_use]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Physical column name for a friendly field name (`createdAt` -> `created_at`).
#[must_use]
pub fn source_name(field: &str) -> String {
    field.to_case(Case::Snake)
}

/// Friendly field name for a physical column name (`created_at` -> `createdAt`).
#[must_use]
pub fn friendly_name(column: &str) -> String {
    column.to_case(Case::Camel)
}

/// Default table name for a model (`blogPost` -> `blog_posts`).
#[must_use]
pub fn table_name(model: &str) -> String {
    pluralize(&model.to_case(Case::Snake))
}

/// Default foreign key for a relation or owner name (`posts` -> `postId`).
#[must_use]
pub fn foreign_key(name: &str) -> String {
    format!("{}Id", singularize(name).to_case(Case::Camel))
}

/// English plural for simple nouns.
#[must_use]
pub fn pluralize(word: &str) -> String {
    if word.is_empty() {
        return String::new();
    }
    if let Some(stem) = word.strip_suffix('y') {
        if !stem.ends_with(['a', 'e', 'i', 'o', 'u']) {
            return format!("{stem}ies");
        }
    }
    if word.ends_with('s')
        || word.ends_with('x')
        || word.ends_with('z')
        || word.ends_with("ch")
        || word.ends_with("sh")
    {
        return format!("{word}es");
    }
    format!("{word}s")
}

/// English singular for simple nouns; the inverse of [`pluralize`].
#[must_use]
pub fn singularize(word: &str) -> String {
    if let Some(stem) = word.strip_suffix("ies") {
        return format!("{stem}y");
    }
    for suffix in ["ches", "shes", "sses", "xes", "zes"] {
        if word.ends_with(suffix) {
            return word[..word.len() - 2].to_string();
        }
    }
    if word.ends_with("ss") {
        return word.to_string();
    }
    word.strip_suffix('s').unwrap_or(word).to_string()
}
