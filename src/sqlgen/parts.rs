//! Accumulated parts of a SQL query under construction, and the alias
//! scope they draw table aliases from.

use std::collections::HashSet;

use crate::strings::{indent_lines, make_name_not_in_set};

/// What produced a select entry. The generator filters on this when
/// re-selecting subquery columns, where hidden key exports must not
/// become output properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectEntrySource {
    NativeField,
    InlineParent,
    ParentReference,
    ChildCollection,
    HiddenPk,
}

/// One entry of a select clause: an expression and its output column name.
#[derive(Debug, Clone)]
pub struct SelectEntry {
    pub value_expr: String,
    pub name: String,
    pub source: SelectEntrySource,
    pub comment: Option<String>,
}

impl SelectEntry {
    pub fn new(
        value_expr: impl Into<String>,
        name: impl Into<String>,
        source: SelectEntrySource,
        comment: Option<String>,
    ) -> SelectEntry {
        SelectEntry {
            value_expr: value_expr.into(),
            name: name.into(),
            source,
            comment,
        }
    }

    fn sql(&self) -> String {
        // A name already carrying quote characters gets a plain space
        // separator, reading as a quoted column alias.
        let sep = if self.name.starts_with('"') || self.name.starts_with('`') {
            " "
        } else {
            " as "
        };
        match &self.comment {
            Some(comment) => format!("{}\n{}{}{}", comment, self.value_expr, sep, self.name),
            None => format!("{}{}{}", self.value_expr, sep, self.name),
        }
    }
}

/// Table aliases visible at one level of query nesting. Sibling subqueries
/// at the same level share a scope so their aliases cannot collide;
/// a nested base query starts a fresh scope.
#[derive(Debug, Default)]
pub struct AliasScope {
    aliases: HashSet<String>,
}

impl AliasScope {
    pub fn new() -> AliasScope {
        AliasScope::default()
    }

    /// Reserve an alias allocated elsewhere, e.g. the alias of the other
    /// table of a parent/child join condition.
    pub fn add(&mut self, alias: &str) {
        self.aliases.insert(alias.to_string());
    }

    /// Allocate an alias from the given seed, unique within this scope.
    pub fn make_alias(&mut self, seed: &str) -> String {
        let alias = make_name_not_in_set(seed, &self.aliases, "");
        self.aliases.insert(alias.clone());
        alias
    }
}

/// The clauses of a query being assembled, combined into SQL text only
/// once the whole query level is built.
#[derive(Debug, Default)]
pub struct SqlParts {
    pub select_entries: Vec<SelectEntry>,
    pub from_entries: Vec<String>,
    pub where_entries: Vec<String>,
    pub order_by: Option<String>,
}

impl SqlParts {
    pub fn new() -> SqlParts {
        SqlParts::default()
    }

    pub fn add_select_entry(&mut self, entry: SelectEntry) {
        self.select_entries.push(entry);
    }

    pub fn add_from_entry(&mut self, entry: impl Into<String>) {
        self.from_entries.push(entry.into());
    }

    pub fn add_where_entry(&mut self, entry: impl Into<String>) {
        self.where_entries.push(entry.into());
    }

    /// Absorb the clauses of parts built for a related table.
    pub fn add_parts(&mut self, other: SqlParts) {
        self.select_entries.extend(other.select_entries);
        self.from_entries.extend(other.from_entries);
        self.where_entries.extend(other.where_entries);
    }

    pub fn to_sql(&self, indent_spaces: usize) -> String {
        assert!(!self.select_entries.is_empty(), "empty select clause");
        assert!(!self.from_entries.is_empty(), "empty from clause");

        let select_entries = self
            .select_entries
            .iter()
            .map(|e| e.sql())
            .collect::<Vec<_>>()
            .join(",\n");

        let mut sql = format!(
            "select\n{}\nfrom\n{}",
            indent_lines(&select_entries, indent_spaces, true),
            indent_lines(&self.from_entries.join("\n"), indent_spaces, true)
        );

        if !self.where_entries.is_empty() {
            sql.push_str(&format!(
                "\nwhere (\n{}\n)",
                indent_lines(&self.where_entries.join(" and\n"), indent_spaces, true)
            ));
        }

        if let Some(order_by) = &self.order_by {
            sql.push_str(&format!("\norder by {order_by}"));
        }

        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_scope_dedupes_within_scope() {
        let mut scope = AliasScope::new();
        assert_eq!(scope.make_alias("c"), "c");
        assert_eq!(scope.make_alias("c"), "c1");
        assert_eq!(scope.make_alias("c"), "c2");
        assert_eq!(scope.make_alias("a"), "a");
    }

    #[test]
    fn test_select_entry_quoted_name_omits_as() {
        let plain = SelectEntry::new("c.id", "id", SelectEntrySource::NativeField, None);
        assert_eq!(plain.sql(), "c.id as id");

        let quoted = SelectEntry::new("c.id", "\"theId\"", SelectEntrySource::NativeField, None);
        assert_eq!(quoted.sql(), "c.id \"theId\"");
    }

    #[test]
    fn test_select_entry_comment_precedes_expression() {
        let e = SelectEntry::new(
            "c.id",
            "id",
            SelectEntrySource::NativeField,
            Some("-- field from table 'compound'".to_string()),
        );
        assert_eq!(e.sql(), "-- field from table 'compound'\nc.id as id");
    }

    #[test]
    fn test_to_sql_layout() {
        let mut parts = SqlParts::new();
        parts.add_select_entry(SelectEntry::new("c.id", "id", SelectEntrySource::NativeField, None));
        parts.add_select_entry(SelectEntry::new("c.name", "name", SelectEntrySource::NativeField, None));
        parts.add_from_entry("compound c");
        parts.add_where_entry("c.id = d.compound_id");
        parts.add_where_entry("(c.entered > :since)");
        parts.order_by = Some("name desc".to_string());

        assert_eq!(
            parts.to_sql(2),
            "select\n  c.id as id,\n  c.name as name\nfrom\n  compound c\n\
             where (\n  c.id = d.compound_id and\n  (c.entered > :since)\n)\n\
             order by name desc"
        );
    }

    #[test]
    fn test_to_sql_omits_empty_where() {
        let mut parts = SqlParts::new();
        parts.add_select_entry(SelectEntry::new("c.id", "id", SelectEntrySource::NativeField, None));
        parts.add_from_entry("compound c");
        assert_eq!(parts.to_sql(2), "select\n  c.id as id\nfrom\n  compound c");
    }
}
