//! SQL dialect abstraction.
//!
//! Dialects encapsulate the syntax for building a JSON object from a row,
//! aggregating row objects into a JSON array, and aggregating bare column
//! values (the unwrapped-collection case). Everything else about query
//! assembly is dialect-independent.

mod mysql;
mod ora;
mod pg;

pub use mysql::MySqlDialect;
pub use ora::OracleDialect;
pub use pg::PostgresDialect;

use anyhow::bail;

/// Substitute the `$$` alias token in a user-supplied order-by fragment.
fn substitute_alias(order_by: &str, alias: &str) -> String {
    order_by.replace(crate::spec::DEFAULT_ALIAS_TOKEN, alias)
}

pub trait SqlDialect {
    /// Expression building a JSON object from the named columns of the
    /// row source aliased `src_alias`.
    fn row_object_expr(&self, column_names: &[String], src_alias: &str) -> String;

    /// Aggregate expression collecting row objects into a JSON array,
    /// defaulting to an empty-array literal when there are no input rows.
    /// Fails when the dialect cannot honor the requested aggregate
    /// ordering.
    fn aggregated_row_objects_expr(
        &self,
        column_names: &[String],
        order_by: Option<&str>,
        src_alias: &str,
    ) -> Result<String, String>;

    /// Aggregate expression collecting bare values of a single column
    /// into a JSON array, for unwrapped child collections.
    fn aggregated_column_values_expr(
        &self,
        column_name: &str,
        order_by: Option<&str>,
        src_alias: &str,
    ) -> Result<String, String>;

    /// Quote a column name when required by the dialect's identifier rules.
    fn quote_column_name_if_needed(&self, name: &str) -> String;
}

/// Select a dialect by DBMS product name (as recorded in the metadata
/// snapshot). Unrecognized products fail fast rather than guessing at
/// JSON SQL syntax the product may not have.
pub fn sql_dialect_for(dbms_name: &str, indent_spaces: usize) -> anyhow::Result<Box<dyn SqlDialect>> {
    let lower = dbms_name.to_lowercase();
    if lower.starts_with("postgres") {
        Ok(Box::new(PostgresDialect::new(indent_spaces)))
    } else if lower.starts_with("oracle") {
        Ok(Box::new(OracleDialect::new(indent_spaces)))
    } else if lower == "mysql" {
        Ok(Box::new(MySqlDialect::new(indent_spaces)))
    } else {
        bail!("database '{dbms_name}' is not supported for SQL generation");
    }
}

fn is_simple_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

const SQL_KEYWORDS_LOWERCASE: &[&str] = &[
    "select", "from", "where", "user", "order", "group", "by", "over", "is",
];

fn is_sql_keyword(name: &str) -> bool {
    SQL_KEYWORDS_LOWERCASE.contains(&name.to_lowercase().as_str())
}
