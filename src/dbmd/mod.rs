//! Database metadata model and index.
//!
//! The stored metadata document is produced by a separate introspection
//! step and deserialized here verbatim. `DatabaseMetadata` wraps the
//! stored form with lookup maps for O(1) access by relation identity and
//! by foreign-key child/parent relation.

pub mod names;

use serde::Deserialize;
use std::collections::{HashMap, HashSet};

use crate::strings::lowercase_initials;
use names::{case_normalize_name, exact_unquoted_name, split_schema_and_relation, un_double_quote};

/// How user-supplied identifiers are folded before comparison against
/// stored metadata names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseSensitivity {
    InsensitiveStoredLower,
    InsensitiveStoredUpper,
    InsensitiveStoredMixed,
    Sensitive,
}

/// Identity of a relation: optional schema plus relation name, both in
/// stored (already-folded) form.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RelId {
    #[serde(default)]
    pub schema: Option<String>,
    pub name: String,
}

impl RelId {
    /// Construct from a user-supplied, possibly schema-qualified table
    /// name. Quoted parts keep their exact case; unquoted parts are folded
    /// per the case-sensitivity mode.
    pub fn from_table_name(
        table: &str,
        default_schema: Option<&str>,
        case_sensitivity: CaseSensitivity,
    ) -> RelId {
        let (schema, name) = split_schema_and_relation(table);
        let schema = schema
            .or(default_schema)
            .map(|s| exact_unquoted_name(s, case_sensitivity));
        RelId {
            schema,
            name: exact_unquoted_name(name, case_sensitivity),
        }
    }

    /// Lookup key string, unique per relation identity.
    pub fn key(&self) -> String {
        let name = un_double_quote(&self.name);
        match &self.schema {
            Some(schema) => format!("{}.{}", un_double_quote(schema), name),
            None => name.to_string(),
        }
    }

    /// Unquoted `[schema.]name` form for diagnostics.
    pub fn descr(&self) -> String {
        self.key()
    }

    /// Quoted-as-stored `[schema.]name` form for use in SQL text.
    pub fn sql_string(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", schema, self.name),
            None => self.name.clone(),
        }
    }

    /// Lowercased initials of the relation name, used to seed table aliases.
    pub fn alias_seed(&self) -> String {
        let initials = lowercase_initials(&self.name, '_');
        if initials.is_empty() {
            "t".to_string()
        } else {
            initials
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum RelType {
    Table,
    View,
    Unknown,
}

/// A field (column) of a relation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub name: String,
    pub database_type: String,
    #[serde(default)]
    pub nullable: Option<bool>,
    #[serde(default)]
    pub primary_key_part_number: Option<i32>,
    #[serde(default)]
    pub length: Option<i64>,
    #[serde(default)]
    pub precision: Option<i64>,
    #[serde(default)]
    pub precision_radix: Option<i64>,
    #[serde(default)]
    pub fractional_digits: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelMetadata {
    pub relation_id: RelId,
    pub relation_type: RelType,
    pub fields: Vec<Field>,
}

impl RelMetadata {
    /// Primary key fields in `primary_key_part_number` order.
    pub fn primary_key_fields(&self) -> Vec<&Field> {
        let mut pks: Vec<&Field> = self
            .fields
            .iter()
            .filter(|f| f.primary_key_part_number.is_some())
            .collect();
        pks.sort_by_key(|f| f.primary_key_part_number);
        pks
    }

    /// Fields keyed by stored name.
    pub fn fields_by_name(&self) -> HashMap<&str, &Field> {
        self.fields.iter().map(|f| (f.name.as_str(), f)).collect()
    }
}

/// One column pair of a foreign key constraint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKeyComponent {
    pub child_field: String,
    pub parent_field: String,
}

/// A directed foreign-key edge from a child relation to a parent relation.
/// More than one may exist between the same pair of relations.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKey {
    #[serde(default)]
    pub constraint_name: Option<String>,
    pub child_relation_id: RelId,
    pub parent_relation_id: RelId,
    pub components: Vec<ForeignKeyComponent>,
}

impl ForeignKey {
    pub fn child_field_names(&self) -> Vec<&str> {
        self.components.iter().map(|c| c.child_field.as_str()).collect()
    }

    fn child_field_names_set_equals(&self, normalized_names: &HashSet<String>) -> bool {
        if self.components.len() != normalized_names.len() {
            return false;
        }
        self.components
            .iter()
            .all(|c| normalized_names.contains(&c.child_field))
    }
}

/// The stored metadata document as written by the introspection step.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMetadata {
    pub dbms_name: String,
    pub dbms_version: String,
    pub case_sensitivity: CaseSensitivity,
    pub relations: Vec<RelMetadata>,
    pub foreign_keys: Vec<ForeignKey>,
}

/// Failure modes of foreign-key lookup, diagnosed separately so callers
/// can tell "no such FK" from "several candidates, disambiguation needed".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FkLookupError {
    NotFound,
    Ambiguous,
}

/// Read-only index over a stored metadata snapshot.
#[derive(Debug)]
pub struct DatabaseMetadata {
    pub dbms_name: String,
    pub dbms_version: String,
    pub case_sensitivity: CaseSensitivity,
    relations_by_key: HashMap<String, RelMetadata>,
    fks_by_child_key: HashMap<String, Vec<ForeignKey>>,
    fks_by_parent_key: HashMap<String, Vec<ForeignKey>>,
}

impl DatabaseMetadata {
    pub fn new(stored: StoredMetadata) -> DatabaseMetadata {
        let mut relations_by_key = HashMap::new();
        for rel_md in stored.relations {
            relations_by_key.insert(rel_md.relation_id.key(), rel_md);
        }

        let mut fks_by_child_key: HashMap<String, Vec<ForeignKey>> = HashMap::new();
        let mut fks_by_parent_key: HashMap<String, Vec<ForeignKey>> = HashMap::new();
        for fk in stored.foreign_keys {
            fks_by_parent_key
                .entry(fk.parent_relation_id.key())
                .or_default()
                .push(fk.clone());
            fks_by_child_key
                .entry(fk.child_relation_id.key())
                .or_default()
                .push(fk);
        }

        DatabaseMetadata {
            dbms_name: stored.dbms_name,
            dbms_version: stored.dbms_version,
            case_sensitivity: stored.case_sensitivity,
            relations_by_key,
            fks_by_child_key,
            fks_by_parent_key,
        }
    }

    pub fn relation_metadata(&self, rel_id: &RelId) -> Option<&RelMetadata> {
        self.relations_by_key.get(&rel_id.key())
    }

    /// Primary key field names for a known relation, in key order,
    /// optionally alias-qualified. Panics for an unknown relation: callers
    /// are expected to have verified the relation exists, so a miss here is
    /// a programming error rather than a spec error.
    pub fn primary_key_field_names(&self, rel_id: &RelId, alias: Option<&str>) -> Vec<String> {
        let rel_md = self
            .relation_metadata(rel_id)
            .unwrap_or_else(|| panic!("relation metadata not found for '{}'", rel_id.descr()));

        rel_md
            .primary_key_fields()
            .iter()
            .map(|f| match alias {
                Some(a) => format!("{}.{}", a, f.name),
                None => f.name.clone(),
            })
            .collect()
    }

    /// Resolve the foreign key from `child` to `parent`, optionally
    /// restricted to FKs whose child-side field-name set equals
    /// `field_names` exactly. Field names are case-folded here; the scan
    /// deliberately visits every candidate rather than stopping at the
    /// first match, so ambiguity is detected even after a hit.
    pub fn foreign_key(
        &self,
        child: &RelId,
        parent: &RelId,
        field_names: Option<&HashSet<String>>,
    ) -> Result<&ForeignKey, FkLookupError> {
        let normalized_names: Option<HashSet<String>> = field_names.map(|names| {
            names
                .iter()
                .map(|n| case_normalize_name(n, self.case_sensitivity))
                .collect()
        });

        let mut sought: Option<&ForeignKey> = None;

        for fk in self.foreign_keys_from_to(child, parent) {
            let matches = match &normalized_names {
                None => true,
                Some(names) => fk.child_field_names_set_equals(names),
            };
            if matches {
                if sought.is_some() {
                    return Err(FkLookupError::Ambiguous);
                }
                sought = Some(fk);
            }
        }

        sought.ok_or(FkLookupError::NotFound)
    }

    fn foreign_keys_from_to<'a>(
        &'a self,
        child: &RelId,
        parent: &RelId,
    ) -> impl Iterator<Item = &'a ForeignKey> {
        let parent_key = parent.key();
        self.fks_by_child_key
            .get(&child.key())
            .into_iter()
            .flatten()
            .filter(move |fk| fk.parent_relation_id.key() == parent_key)
    }

    /// All foreign keys in which the given relation is the child side.
    pub fn foreign_keys_from_child(&self, child: &RelId) -> &[ForeignKey] {
        self.fks_by_child_key
            .get(&child.key())
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// All foreign keys in which the given relation is the parent side.
    pub fn foreign_keys_to_parent(&self, parent: &RelId) -> &[ForeignKey] {
        self.fks_by_parent_key
            .get(&parent.key())
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}
