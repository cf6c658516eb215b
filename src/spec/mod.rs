//! Query specification data model.
//!
//! A query group document deserializes to these types. The spec tree is
//! immutable input to both the SQL generator and the result-type
//! generator, which must traverse it with identical semantics; the
//! accessor methods here (`field_expressions`, `inline_parents`,
//! `referenced_parents`, `child_tables`) fix the shared traversal order.

use serde::Deserialize;
use std::collections::HashSet;

use crate::dbmd::names::case_normalize_name;
use crate::dbmd::{
    CaseSensitivity, DatabaseMetadata, FkLookupError, ForeignKey, RelId, RelMetadata,
};
use crate::error::{SpecError, SpecErrorKind, SpecLocation, SpecResult};
use crate::strings::lower_camel_case;

/// Default substitution token standing for the table alias in record
/// conditions, field expressions and order-by fragments.
pub const DEFAULT_ALIAS_TOKEN: &str = "$$";

/// Rule for deriving JSON property names from database field names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PropertyNameDefault {
    AsInDb,
    Camelcase,
}

/// Derives default JSON property names from database field names, for
/// fields without an explicit `jsonProperty`. Both generators use the
/// same namer so SQL output columns and result-type properties agree.
#[derive(Debug, Clone, Copy)]
pub struct PropertyNamer {
    name_default: PropertyNameDefault,
    case_sensitivity: CaseSensitivity,
}

impl PropertyNamer {
    pub fn new(name_default: Option<PropertyNameDefault>, case_sensitivity: CaseSensitivity) -> PropertyNamer {
        PropertyNamer {
            name_default: name_default.unwrap_or(PropertyNameDefault::Camelcase),
            case_sensitivity,
        }
    }

    pub fn property_name(&self, field_name: &str) -> String {
        match self.name_default {
            PropertyNameDefault::Camelcase => lower_camel_case(field_name),
            // Mixed-case names pass through unchanged under AS_IN_DB since
            // they cannot match either stored-case convention anyway.
            PropertyNameDefault::AsInDb => match self.case_sensitivity {
                CaseSensitivity::InsensitiveStoredLower if !is_mixed_case(field_name) => {
                    field_name.to_lowercase()
                }
                CaseSensitivity::InsensitiveStoredUpper if !is_mixed_case(field_name) => {
                    field_name.to_uppercase()
                }
                _ => field_name.to_string(),
            },
        }
    }
}

fn is_mixed_case(s: &str) -> bool {
    s.chars().any(|c| c.is_ascii_lowercase()) && s.chars().any(|c| c.is_ascii_uppercase())
}

/// Shape of a query's top-level SQL result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultRepr {
    RowsAsJsonObjects,
    SingleJsonArray,
    PlainColumns,
}

impl ResultRepr {
    /// Lowercase, space-separated descriptor used in artifact file names.
    pub fn file_descr(&self) -> &'static str {
        match self {
            ResultRepr::RowsAsJsonObjects => "rows as json objects",
            ResultRepr::SingleJsonArray => "single json array",
            ResultRepr::PlainColumns => "plain columns",
        }
    }

    pub fn descr(&self) -> &'static str {
        match self {
            ResultRepr::RowsAsJsonObjects => "ROWS_AS_JSON_OBJECTS",
            ResultRepr::SingleJsonArray => "SINGLE_JSON_ARRAY",
            ResultRepr::PlainColumns => "PLAIN_COLUMNS",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct QueryGroupSpec {
    #[serde(default)]
    pub default_schema: Option<String>,
    #[serde(default)]
    pub unqualified_name_schemas: Vec<String>,
    #[serde(default)]
    pub property_naming_default: Option<PropertyNameDefault>,
    pub queries: Vec<QuerySpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct QuerySpec {
    pub query_name: String,
    pub table_json: TableJsonSpec,
    #[serde(default)]
    pub result_representations: Option<Vec<ResultRepr>>,
    #[serde(default)]
    pub generate_result_types: Option<bool>,
    #[serde(default)]
    pub property_naming_default: Option<PropertyNameDefault>,
    #[serde(default)]
    pub order_by: Option<String>,
    #[serde(default)]
    pub for_update: Option<bool>,
}

impl QuerySpec {
    /// Representations to generate, defaulting to JSON object rows.
    pub fn representations(&self) -> Vec<ResultRepr> {
        match &self.result_representations {
            Some(reprs) if !reprs.is_empty() => reprs.clone(),
            _ => vec![ResultRepr::RowsAsJsonObjects],
        }
    }

    /// Bind parameter names declared in record conditions anywhere in the
    /// spec tree, children first (matching generated artifact order).
    pub fn param_names(&self) -> Vec<String> {
        fn collect(tjs: &TableJsonSpec, out: &mut Vec<String>) {
            for child in tjs.child_tables() {
                collect(&child.table_json, out);
            }
            for parent in tjs.inline_parents() {
                collect(&parent.table_json, out);
            }
            for parent in tjs.referenced_parents() {
                collect(&parent.table_json, out);
            }
            if let Some(cond) = &tjs.record_condition {
                out.extend(cond.param_names.iter().cloned());
            }
        }
        let mut out = Vec::new();
        collect(&self.table_json, &mut out);
        out
    }
}

/// The recursive heart of a query spec: one table with its output fields
/// and related-table contributions.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TableJsonSpec {
    pub table: String,
    #[serde(default)]
    pub field_expressions: Vec<TableFieldExpr>,
    #[serde(default)]
    pub inline_parent_tables: Vec<InlineParentSpec>,
    #[serde(default)]
    pub referenced_parent_tables: Vec<ReferencedParentSpec>,
    #[serde(default)]
    pub child_tables: Vec<ChildSpec>,
    #[serde(default)]
    pub record_condition: Option<RecordCondition>,
}

impl TableJsonSpec {
    pub fn field_expressions(&self) -> &[TableFieldExpr] {
        &self.field_expressions
    }

    pub fn inline_parents(&self) -> &[InlineParentSpec] {
        &self.inline_parent_tables
    }

    pub fn referenced_parents(&self) -> &[ReferencedParentSpec] {
        &self.referenced_parent_tables
    }

    pub fn child_tables(&self) -> &[ChildSpec] {
        &self.child_tables
    }

    /// Total count of JSON properties this node contributes, counting
    /// inline parents' contributions recursively. Used for the unwrap
    /// single-property check.
    pub fn json_properties_count(&self) -> usize {
        self.field_expressions.len()
            + self.child_tables.len()
            + self.referenced_parent_tables.len()
            + self
                .inline_parent_tables
                .iter()
                .map(|p| p.table_json.json_properties_count())
                .sum::<usize>()
    }
}

/// One output field: either a bare database field name or a detailed
/// entry with exactly one of `field` / `expression` set.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TableFieldExpr {
    Field(String),
    Detailed(DetailedFieldExpr),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DetailedFieldExpr {
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub expression: Option<String>,
    #[serde(default)]
    pub json_property: Option<String>,
    #[serde(default)]
    pub generated_type: Option<String>,
    #[serde(default)]
    pub alias_token: Option<String>,
}

impl TableFieldExpr {
    /// The database field name, when this entry selects a simple field.
    pub fn field_name(&self) -> Option<&str> {
        match self {
            TableFieldExpr::Field(name) => Some(name),
            TableFieldExpr::Detailed(d) => d.field.as_deref(),
        }
    }

    pub fn expression(&self) -> Option<&str> {
        match self {
            TableFieldExpr::Field(_) => None,
            TableFieldExpr::Detailed(d) => d.expression.as_deref(),
        }
    }

    pub fn json_property(&self) -> Option<&str> {
        match self {
            TableFieldExpr::Field(_) => None,
            TableFieldExpr::Detailed(d) => d.json_property.as_deref(),
        }
    }

    pub fn generated_type(&self) -> Option<&str> {
        match self {
            TableFieldExpr::Field(_) => None,
            TableFieldExpr::Detailed(d) => d.generated_type.as_deref(),
        }
    }

    pub fn alias_token(&self) -> &str {
        match self {
            TableFieldExpr::Field(_) => DEFAULT_ALIAS_TOKEN,
            TableFieldExpr::Detailed(d) => d.alias_token.as_deref().unwrap_or(DEFAULT_ALIAS_TOKEN),
        }
    }
}

/// Common face of inline and referenced parent specs for join resolution.
pub trait ParentLink {
    fn table_json(&self) -> &TableJsonSpec;
    fn via_foreign_key_fields(&self) -> Option<&[String]>;
    fn custom_join_condition(&self) -> Option<&CustomJoinCondition>;
}

/// A parent table whose fields flatten into the referencing level.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct InlineParentSpec {
    pub table_json: TableJsonSpec,
    #[serde(default)]
    pub via_foreign_key_fields: Option<Vec<String>>,
    #[serde(default)]
    pub custom_join_condition: Option<CustomJoinCondition>,
}

impl ParentLink for InlineParentSpec {
    fn table_json(&self) -> &TableJsonSpec {
        &self.table_json
    }
    fn via_foreign_key_fields(&self) -> Option<&[String]> {
        self.via_foreign_key_fields.as_deref()
    }
    fn custom_join_condition(&self) -> Option<&CustomJoinCondition> {
        self.custom_join_condition.as_ref()
    }
}

/// A parent table nested as a named sub-object.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ReferencedParentSpec {
    pub reference_name: String,
    pub table_json: TableJsonSpec,
    #[serde(default)]
    pub via_foreign_key_fields: Option<Vec<String>>,
    #[serde(default)]
    pub custom_join_condition: Option<CustomJoinCondition>,
}

impl ParentLink for ReferencedParentSpec {
    fn table_json(&self) -> &TableJsonSpec {
        &self.table_json
    }
    fn via_foreign_key_fields(&self) -> Option<&[String]> {
        self.via_foreign_key_fields.as_deref()
    }
    fn custom_join_condition(&self) -> Option<&CustomJoinCondition> {
        self.custom_join_condition.as_ref()
    }
}

/// A one-to-many related table surfaced as a named JSON array property.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ChildSpec {
    pub collection_name: String,
    pub table_json: TableJsonSpec,
    #[serde(default)]
    pub foreign_key_fields: Option<Vec<String>>,
    #[serde(default)]
    pub custom_join_condition: Option<CustomJoinCondition>,
    #[serde(default)]
    pub unwrap: bool,
    #[serde(default)]
    pub order_by: Option<String>,
}

/// Explicit field-pair join bypassing foreign-key lookup.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CustomJoinCondition {
    pub equated_fields: Vec<FieldPair>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FieldPair {
    pub child_field: String,
    pub parent_field: String,
}

/// Raw SQL predicate applied to a node's rows, with an alias placeholder
/// and the bind parameter names it mentions.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RecordCondition {
    pub sql: String,
    #[serde(default)]
    pub param_names: Vec<String>,
    #[serde(default)]
    pub alias_token: Option<String>,
}

impl RecordCondition {
    pub fn alias_token(&self) -> &str {
        self.alias_token.as_deref().unwrap_or(DEFAULT_ALIAS_TOKEN)
    }
}

/// Resolve a spec table name against the metadata, failing with
/// `TableNotFound` if absent. Returns the stored relation id so later
/// lookups use stored-form names only.
pub fn identify_table(
    table: &str,
    default_schema: Option<&str>,
    dbmd: &DatabaseMetadata,
    loc: &SpecLocation,
) -> SpecResult<RelId> {
    let rel_id = RelId::from_table_name(table, default_schema, dbmd.case_sensitivity);
    match dbmd.relation_metadata(&rel_id) {
        Some(rel_md) => Ok(rel_md.relation_id.clone()),
        None => Err(SpecError::new(
            loc,
            SpecErrorKind::TableNotFound,
            format!("Table '{table}' was not found in database metadata."),
        )),
    }
}

/// Resolve the foreign key joining a child relation to a parent relation,
/// mapping lookup failures to spec errors naming the sought fields. Both
/// the SQL and the result-type generators resolve joins through this so
/// they agree on which constraint a spec level uses.
pub fn resolve_foreign_key<'a>(
    dbmd: &'a DatabaseMetadata,
    child_rel_id: &RelId,
    parent_rel_id: &RelId,
    fk_fields: Option<&HashSet<String>>,
    loc: &SpecLocation,
) -> SpecResult<&'a ForeignKey> {
    dbmd.foreign_key(child_rel_id, parent_rel_id, fk_fields)
        .map_err(|lookup_err| {
            let via = match fk_fields {
                Some(fields) => {
                    let mut names: Vec<&str> = fields.iter().map(String::as_str).collect();
                    names.sort_unstable();
                    format!("foreign keys [{}]", names.join(", "))
                }
                None => "implicit foreign key fields".to_string(),
            };
            match lookup_err {
                FkLookupError::NotFound => SpecError::new(
                    loc,
                    SpecErrorKind::NoForeignKey,
                    format!(
                        "No foreign key found from {} to {} via {}.",
                        child_rel_id.name, parent_rel_id.name, via
                    ),
                ),
                FkLookupError::Ambiguous => SpecError::new(
                    loc,
                    SpecErrorKind::AmbiguousForeignKey,
                    format!(
                        "Multiple foreign keys found from {} to {} via {}.",
                        child_rel_id.name, parent_rel_id.name, via
                    ),
                ),
            }
        })
}

/// Check the shape of a node's field expressions and that every simple
/// field exists in the table's metadata.
pub fn verify_table_field_expressions_valid(
    table_spec: &TableJsonSpec,
    default_schema: Option<&str>,
    dbmd: &DatabaseMetadata,
    loc: &SpecLocation,
) -> SpecResult<()> {
    let mut simple_fields: Vec<&str> = Vec::new();

    for (ix, fe) in table_spec.field_expressions.iter().enumerate() {
        match fe {
            TableFieldExpr::Field(name) => simple_fields.push(name),
            TableFieldExpr::Detailed(d) => {
                if d.field.is_some() == d.expression.is_some() {
                    return Err(SpecError::new(
                        loc,
                        SpecErrorKind::InvalidFieldSpec,
                        format!(
                            "fieldExpressions entry #{} is invalid: \
                             exactly one of 'field' or 'expression' must be provided.",
                            ix + 1
                        ),
                    ));
                }
                if d.expression.is_some() && (d.json_property.is_none() || d.generated_type.is_none()) {
                    return Err(SpecError::new(
                        loc,
                        SpecErrorKind::InvalidFieldSpec,
                        format!(
                            "fieldExpressions entry #{} is invalid: \
                             'jsonProperty' and 'generatedType' are required with 'expression'.",
                            ix + 1
                        ),
                    ));
                }
                if let Some(field) = &d.field {
                    simple_fields.push(field);
                }
            }
        }
    }

    let rel_id = identify_table(&table_spec.table, default_schema, dbmd, loc)?;
    let rel_md = dbmd
        .relation_metadata(&rel_id)
        .expect("relation metadata present after identify_table");

    verify_fields_exist(rel_md, &simple_fields, dbmd, SpecErrorKind::FieldNotFound, loc)
}

/// Check that both sides of every equated field pair of a custom join
/// condition name real fields of the respective relations.
pub fn validate_custom_join_condition(
    custom_join: &CustomJoinCondition,
    child_rel_id: &RelId,
    parent_rel_id: &RelId,
    dbmd: &DatabaseMetadata,
    loc: &SpecLocation,
) -> SpecResult<()> {
    let child_md = dbmd.relation_metadata(child_rel_id).ok_or_else(|| {
        SpecError::new(loc, SpecErrorKind::TableNotFound, "Child table not found.")
    })?;
    let parent_md = dbmd.relation_metadata(parent_rel_id).ok_or_else(|| {
        SpecError::new(loc, SpecErrorKind::TableNotFound, "Parent table not found.")
    })?;

    let child_fields: Vec<&str> = custom_join
        .equated_fields
        .iter()
        .map(|p| p.child_field.as_str())
        .collect();
    verify_fields_exist(child_md, &child_fields, dbmd, SpecErrorKind::UnknownJoinField, loc)?;

    let parent_fields: Vec<&str> = custom_join
        .equated_fields
        .iter()
        .map(|p| p.parent_field.as_str())
        .collect();
    verify_fields_exist(parent_md, &parent_fields, dbmd, SpecErrorKind::UnknownJoinField, loc)
}

fn verify_fields_exist(
    rel_md: &RelMetadata,
    field_names: &[&str],
    dbmd: &DatabaseMetadata,
    kind: SpecErrorKind,
    loc: &SpecLocation,
) -> SpecResult<()> {
    let md_fields: std::collections::HashSet<&str> =
        rel_md.fields.iter().map(|f| f.name.as_str()).collect();

    let missing: Vec<&str> = field_names
        .iter()
        .filter(|name| !md_fields.contains(case_normalize_name(name, dbmd.case_sensitivity).as_str()))
        .copied()
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(SpecError::new(
            loc,
            kind,
            format!(
                "Field(s) not found in table {}: {}.",
                rel_md.relation_id.descr(),
                missing.join(", ")
            ),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dbmd::{CaseSensitivity, StoredMetadata};

    fn test_dbmd() -> DatabaseMetadata {
        let stored: StoredMetadata = serde_json::from_str(
            r#"{
                "dbmsName": "PostgreSQL", "dbmsVersion": "14",
                "caseSensitivity": "INSENSITIVE_STORED_LOWER",
                "relations": [
                    {"relationId": {"schema": "drugs", "name": "drug"},
                     "relationType": "Table",
                     "fields": [
                        {"name": "id", "databaseType": "int4", "nullable": false, "primaryKeyPartNumber": 1},
                        {"name": "name", "databaseType": "varchar", "nullable": false}
                     ]}
                ],
                "foreignKeys": []
            }"#,
        )
        .unwrap();
        DatabaseMetadata::new(stored)
    }

    fn spec_from_json(json: &str) -> TableJsonSpec {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_table_field_expr_untagged_forms() {
        let tjs = spec_from_json(
            r#"{
                "table": "drug",
                "fieldExpressions": [
                    "id",
                    {"field": "name", "jsonProperty": "drugName"},
                    {"expression": "$$.id + 1", "jsonProperty": "idPlusOne", "generatedType": "number"}
                ]
            }"#,
        );
        assert_eq!(tjs.field_expressions.len(), 3);
        assert_eq!(tjs.field_expressions[0].field_name(), Some("id"));
        assert_eq!(tjs.field_expressions[1].json_property(), Some("drugName"));
        assert_eq!(tjs.field_expressions[2].expression(), Some("$$.id + 1"));
        assert_eq!(tjs.field_expressions[2].alias_token(), "$$");
    }

    #[test]
    fn test_identify_table_not_found() {
        let dbmd = test_dbmd();
        let err = identify_table("nope", Some("drugs"), &dbmd, &SpecLocation::new("q")).unwrap_err();
        assert_eq!(err.kind, SpecErrorKind::TableNotFound);
    }

    #[test]
    fn test_identify_table_case_folds_input_name() {
        let dbmd = test_dbmd();
        let rid = identify_table("DRUG", Some("drugs"), &dbmd, &SpecLocation::new("q")).unwrap();
        assert_eq!(rid.name, "drug");
    }

    #[test]
    fn test_field_expr_shape_violations() {
        let dbmd = test_dbmd();
        let loc = SpecLocation::new("q");

        let both = spec_from_json(
            r#"{"table": "drug",
                "fieldExpressions": [{"field": "id", "expression": "x", "jsonProperty": "p", "generatedType": "t"}]}"#,
        );
        let err = verify_table_field_expressions_valid(&both, Some("drugs"), &dbmd, &loc).unwrap_err();
        assert_eq!(err.kind, SpecErrorKind::InvalidFieldSpec);

        let neither = spec_from_json(r#"{"table": "drug", "fieldExpressions": [{"jsonProperty": "p"}]}"#);
        let err = verify_table_field_expressions_valid(&neither, Some("drugs"), &dbmd, &loc).unwrap_err();
        assert_eq!(err.kind, SpecErrorKind::InvalidFieldSpec);

        let untyped_expr =
            spec_from_json(r#"{"table": "drug", "fieldExpressions": [{"expression": "$$.id + 1", "jsonProperty": "p"}]}"#);
        let err =
            verify_table_field_expressions_valid(&untyped_expr, Some("drugs"), &dbmd, &loc).unwrap_err();
        assert_eq!(err.kind, SpecErrorKind::InvalidFieldSpec);
    }

    #[test]
    fn test_unknown_simple_field() {
        let dbmd = test_dbmd();
        let tjs = spec_from_json(r#"{"table": "drug", "fieldExpressions": ["no_such_field"]}"#);
        let err = verify_table_field_expressions_valid(&tjs, Some("drugs"), &dbmd, &SpecLocation::new("q"))
            .unwrap_err();
        assert_eq!(err.kind, SpecErrorKind::FieldNotFound);
    }

    #[test]
    fn test_param_names_collected_recursively() {
        let qs: QuerySpec = serde_json::from_str(
            r#"{
                "queryName": "drugs query",
                "tableJson": {
                    "table": "drug",
                    "recordCondition": {"sql": "$$.id = :idParam", "paramNames": ["idParam"]},
                    "childTables": [
                        {"collectionName": "refs",
                         "tableJson": {
                            "table": "reference",
                            "recordCondition": {"sql": "$$.year > :minYear", "paramNames": ["minYear"]}
                         }}
                    ]
                }
            }"#,
        )
        .unwrap();
        assert_eq!(qs.param_names(), vec!["minYear".to_string(), "idParam".to_string()]);
    }

    #[test]
    fn test_json_properties_count_recurses_inline_parents() {
        let tjs = spec_from_json(
            r#"{
                "table": "drug",
                "fieldExpressions": ["id"],
                "inlineParentTables": [
                    {"tableJson": {"table": "compound", "fieldExpressions": ["id", "name"]}}
                ]
            }"#,
        );
        assert_eq!(tjs.json_properties_count(), 3);
    }

    #[test]
    fn test_property_namer_modes() {
        let camel = PropertyNamer::new(None, CaseSensitivity::InsensitiveStoredLower);
        assert_eq!(camel.property_name("entered_by"), "enteredBy");

        let as_in_db = PropertyNamer::new(
            Some(PropertyNameDefault::AsInDb),
            CaseSensitivity::InsensitiveStoredLower,
        );
        assert_eq!(as_in_db.property_name("ENTERED_BY"), "entered_by");
        assert_eq!(as_in_db.property_name("mixedCase"), "mixedCase");

        let upper = PropertyNamer::new(
            Some(PropertyNameDefault::AsInDb),
            CaseSensitivity::InsensitiveStoredUpper,
        );
        assert_eq!(upper.property_name("entered_by"), "ENTERED_BY");
    }

    #[test]
    fn test_default_representations() {
        let qs: QuerySpec =
            serde_json::from_str(r#"{"queryName": "q", "tableJson": {"table": "drug"}}"#).unwrap();
        assert_eq!(qs.representations(), vec![ResultRepr::RowsAsJsonObjects]);
    }
}
