//! SQL generation from query specifications.
//!
//! Each table level of a query spec becomes a base query over the table,
//! with inline parents joined in as subqueries, referenced parents and
//! child collections embedded as correlated subqueries, and the result
//! wrapped in dialect-specific JSON construction for the requested result
//! representation. Generated queries carry provenance line comments tying
//! SQL sections back to the tables and collections they came from.

pub mod dialect;
pub mod parts;

use std::collections::HashSet;

use tracing::debug;

use crate::dbmd::names::case_normalize_name;
use crate::dbmd::{DatabaseMetadata, ForeignKeyComponent, RelId};
use crate::error::{SpecError, SpecErrorKind, SpecLocation, SpecResult};
use crate::spec::{
    identify_table, resolve_foreign_key, validate_custom_join_condition,
    verify_table_field_expressions_valid, ChildSpec, CustomJoinCondition, ParentLink,
    PropertyNamer, QuerySpec, ReferencedParentSpec, ResultRepr, TableFieldExpr, TableJsonSpec,
    DEFAULT_ALIAS_TOKEN,
};
use crate::strings::{indent_lines, replace_all};
use dialect::SqlDialect;
use parts::{AliasScope, SelectEntry, SelectEntrySource, SqlParts};

/// Prefix marking primary-key columns exported from an inline-parent
/// subquery for join purposes only, never as output properties.
pub const HIDDEN_PK_PREFIX: &str = "_";

pub struct SqlGenerator<'a> {
    dbmd: &'a DatabaseMetadata,
    default_schema: Option<String>,
    unqualified_name_schemas: HashSet<String>,
    default_property_namer: PropertyNamer,
    dialect: Box<dyn SqlDialect>,
    indent_spaces: usize,
}

struct BaseQuery {
    sql: String,
    result_column_names: Vec<String>,
}

/// A join condition relating a table under construction to an
/// already-aliased table on the other side of the relationship.
enum ParentChildCond {
    /// Filters a parent's rows by equating its primary key with the
    /// foreign-key fields of an already-aliased child.
    ParentPk {
        child_alias: String,
        matched_fields: Vec<ForeignKeyComponent>,
    },
    /// Filters a child's rows by equating its foreign-key fields with the
    /// primary key of an already-aliased parent.
    ChildFk {
        parent_alias: String,
        matched_fields: Vec<ForeignKeyComponent>,
    },
}

impl ParentChildCond {
    fn other_alias(&self) -> &str {
        match self {
            ParentChildCond::ParentPk { child_alias, .. } => child_alias,
            ParentChildCond::ChildFk { parent_alias, .. } => parent_alias,
        }
    }

    /// Equation condition on the table aliased `table_alias`, quoting
    /// field names per the target dialect. `pk_prefix` is prepended to
    /// parent-side names when joining against hidden key exports.
    fn equation_sql(&self, table_alias: &str, dialect: &dyn SqlDialect, pk_prefix: &str) -> String {
        match self {
            ParentChildCond::ParentPk { child_alias, matched_fields } => matched_fields
                .iter()
                .map(|mf| {
                    format!(
                        "{}.{} = {}.{}",
                        child_alias,
                        dialect.quote_column_name_if_needed(&mf.child_field),
                        table_alias,
                        dialect.quote_column_name_if_needed(&format!("{pk_prefix}{}", mf.parent_field))
                    )
                })
                .collect::<Vec<_>>()
                .join(" and "),
            ParentChildCond::ChildFk { parent_alias, matched_fields } => matched_fields
                .iter()
                .map(|mf| {
                    format!(
                        "{}.{} = {}.{}",
                        table_alias,
                        dialect.quote_column_name_if_needed(&mf.child_field),
                        parent_alias,
                        dialect.quote_column_name_if_needed(&mf.parent_field)
                    )
                })
                .collect::<Vec<_>>()
                .join(" and "),
        }
    }
}

impl<'a> SqlGenerator<'a> {
    pub fn new(
        dbmd: &'a DatabaseMetadata,
        default_schema: Option<String>,
        unqualified_name_schemas: &[String],
        default_property_namer: PropertyNamer,
        indent_spaces: usize,
    ) -> anyhow::Result<SqlGenerator<'a>> {
        let dialect = dialect::sql_dialect_for(&dbmd.dbms_name, indent_spaces)?;
        let unqualified_name_schemas = unqualified_name_schemas
            .iter()
            .map(|s| case_normalize_name(s, dbmd.case_sensitivity))
            .collect();

        Ok(SqlGenerator {
            dbmd,
            default_schema,
            unqualified_name_schemas,
            default_property_namer,
            dialect,
            indent_spaces,
        })
    }

    /// Generate SQL for each result representation requested by the query
    /// spec, in spec order.
    pub fn generate_sqls(&self, query_spec: &QuerySpec) -> SpecResult<Vec<(ResultRepr, String)>> {
        let namer = match query_spec.property_naming_default {
            Some(name_default) => PropertyNamer::new(Some(name_default), self.dbmd.case_sensitivity),
            None => self.default_property_namer,
        };

        let mut sqls = Vec::new();
        for repr in query_spec.representations() {
            debug!(query = %query_spec.query_name, repr = repr.descr(), "generating query SQL");
            sqls.push((repr, self.query_result_repr_sql(query_spec, repr, namer)?));
        }
        Ok(sqls)
    }

    fn query_result_repr_sql(
        &self,
        query_spec: &QuerySpec,
        repr: ResultRepr,
        namer: PropertyNamer,
    ) -> SpecResult<String> {
        let loc = SpecLocation::new(&query_spec.query_name);
        let for_update = query_spec.for_update.unwrap_or(false);
        let order_by = query_spec.order_by.as_deref();

        if for_update && repr != ResultRepr::PlainColumns {
            return Err(SpecError::new(
                &loc.with_part("for update clause"),
                SpecErrorKind::InvalidFieldSpec,
                "forUpdate is only allowed with the PLAIN_COLUMNS representation.",
            ));
        }

        match repr {
            ResultRepr::RowsAsJsonObjects => {
                self.json_object_rows_sql(&query_spec.table_json, None, order_by, namer, &loc)
            }
            ResultRepr::SingleJsonArray => {
                self.json_array_row_sql(&query_spec.table_json, None, false, order_by, namer, &loc)
            }
            ResultRepr::PlainColumns => {
                let bq = self.base_query(&query_spec.table_json, None, false, order_by, namer, &loc)?;
                Ok(if for_update { format!("{}\nfor update", bq.sql) } else { bq.sql })
            }
        }
    }

    /// Build the query producing one result column per output property of
    /// the given table spec, with inline parents joined in and related
    /// tables embedded as correlated subqueries.
    fn base_query(
        &self,
        table_spec: &TableJsonSpec,
        parent_child_cond: Option<&ParentChildCond>,
        export_pk_fields_hidden: bool,
        order_by: Option<&str>,
        namer: PropertyNamer,
        loc: &SpecLocation,
    ) -> SpecResult<BaseQuery> {
        let mut scope = AliasScope::new();
        let mut q = SqlParts::new();

        let rel_id = identify_table(&table_spec.table, self.default_schema.as_deref(), self.dbmd, loc)?;
        let alias = scope.make_alias(&rel_id.alias_seed());
        q.add_from_entry(format!("{} {}", self.minimal_rel_identifier(&rel_id), alias));

        if let Some(cond) = parent_child_cond {
            scope.add(cond.other_alias());
        }

        if export_pk_fields_hidden {
            for entry in self.hidden_pk_select_entries(&rel_id, &alias) {
                q.add_select_entry(entry);
            }
        }

        for entry in self.table_field_expression_select_entries(table_spec, &alias, namer, loc)? {
            q.add_select_entry(entry);
        }

        q.add_parts(self.inline_parents_sql_parts(table_spec, &rel_id, &alias, &mut scope, namer, loc)?);

        q.add_parts(self.referenced_parents_sql_parts(table_spec, &rel_id, &alias, namer, loc)?);

        for entry in self.child_collection_select_entries(table_spec, &rel_id, &alias, namer, loc)? {
            q.add_select_entry(entry);
        }

        if let Some(cond) = parent_child_cond {
            q.add_where_entry(cond.equation_sql(&alias, self.dialect.as_ref(), ""));
        }

        if let Some(record_cond) = &table_spec.record_condition {
            q.add_where_entry(format!(
                "({})",
                replace_all(&record_cond.sql, record_cond.alias_token(), &alias)
            ));
        }

        q.order_by = order_by.map(|ob| replace_all(ob, DEFAULT_ALIAS_TOKEN, &alias));

        let result_column_names = q
            .select_entries
            .iter()
            .filter(|e| e.source != SelectEntrySource::HiddenPk)
            .map(|e| e.name.clone())
            .collect();

        Ok(BaseQuery { sql: q.to_sql(self.indent_spaces), result_column_names })
    }

    fn hidden_pk_select_entries(&self, rel_id: &RelId, alias: &str) -> Vec<SelectEntry> {
        self.dbmd
            .primary_key_field_names(rel_id, None)
            .iter()
            .map(|pk_field| {
                SelectEntry::new(
                    format!("{alias}.{}", self.dialect.quote_column_name_if_needed(pk_field)),
                    self.dialect
                        .quote_column_name_if_needed(&format!("{HIDDEN_PK_PREFIX}{pk_field}")),
                    SelectEntrySource::HiddenPk,
                    None,
                )
            })
            .collect()
    }

    fn table_field_expression_select_entries(
        &self,
        table_spec: &TableJsonSpec,
        alias: &str,
        namer: PropertyNamer,
        loc: &SpecLocation,
    ) -> SpecResult<Vec<SelectEntry>> {
        verify_table_field_expressions_valid(table_spec, self.default_schema.as_deref(), self.dbmd, loc)?;

        table_spec
            .field_expressions()
            .iter()
            .enumerate()
            .map(|(ix, tfe)| {
                let fe_loc = loc.with_part(&format!(
                    "fieldExpressions entry #{} of table {}",
                    ix + 1,
                    table_spec.table
                ));
                let name = self
                    .dialect
                    .quote_column_name_if_needed(&json_property_name(tfe, namer, &fe_loc)?);
                Ok(SelectEntry::new(
                    table_field_expression_sql(tfe, alias, self.dialect.as_ref(), &fe_loc)?,
                    name,
                    SelectEntrySource::NativeField,
                    None,
                ))
            })
            .collect()
    }

    fn inline_parents_sql_parts(
        &self,
        table_spec: &TableJsonSpec,
        rel_id: &RelId,
        alias: &str,
        scope: &mut AliasScope,
        namer: PropertyNamer,
        loc: &SpecLocation,
    ) -> SpecResult<SqlParts> {
        let mut parts = SqlParts::new();

        for (ix, parent_spec) in table_spec.inline_parents().iter().enumerate() {
            let parent_loc = loc.with_part(&format!(
                "inlineParentTables entry #{}, '{}' table",
                ix + 1,
                parent_spec.table_json.table
            ));

            let from_query =
                self.base_query(&parent_spec.table_json, None, true, None, namer, &parent_loc)?;

            let join_alias = scope.make_alias("q");

            for (i, parent_column) in from_query.result_column_names.iter().enumerate() {
                let comment = (i == 0).then(|| {
                    format!(
                        "-- field(s) inlined from parent table '{}'",
                        parent_spec.table_json.table
                    )
                });
                parts.add_select_entry(SelectEntry::new(
                    format!("{join_alias}.{parent_column}"),
                    parent_column.clone(),
                    SelectEntrySource::InlineParent,
                    comment,
                ));
            }

            let join_cond = self
                .parent_pk_condition(parent_spec, rel_id, alias, &parent_loc)?
                .equation_sql(&join_alias, self.dialect.as_ref(), HIDDEN_PK_PREFIX);

            parts.add_from_entry(format!(
                "-- parent table '{}', joined for inlined fields\nleft join (\n{}\n) {} on {}",
                parent_spec.table_json.table,
                self.indent(&from_query.sql),
                join_alias,
                join_cond
            ));
        }

        Ok(parts)
    }

    fn referenced_parents_sql_parts(
        &self,
        table_spec: &TableJsonSpec,
        rel_id: &RelId,
        alias: &str,
        namer: PropertyNamer,
        loc: &SpecLocation,
    ) -> SpecResult<SqlParts> {
        let mut parts = SqlParts::new();

        for (ix, parent_spec) in table_spec.referenced_parents().iter().enumerate() {
            let parent_loc = loc.with_part(&format!(
                "referencedParentTables entry #{}, '{}' table",
                ix + 1,
                parent_spec.table_json.table
            ));
            parts.add_select_entry(self.referenced_parent_select_entry(
                parent_spec,
                rel_id,
                alias,
                namer,
                &parent_loc,
            )?);
        }

        Ok(parts)
    }

    fn referenced_parent_select_entry(
        &self,
        parent_spec: &ReferencedParentSpec,
        child_rel_id: &RelId,
        child_alias: &str,
        namer: PropertyNamer,
        loc: &SpecLocation,
    ) -> SpecResult<SelectEntry> {
        let parent_pk_cond = self.parent_pk_condition(parent_spec, child_rel_id, child_alias, loc)?;

        let value_expr = format!(
            "-- parent table '{}' referenced as '{}'\n(\n{}\n)",
            parent_spec.table_json.table,
            parent_spec.reference_name,
            self.indent(&self.json_object_rows_sql(
                &parent_spec.table_json,
                Some(&parent_pk_cond),
                None,
                namer,
                loc,
            )?)
        );

        Ok(SelectEntry::new(
            value_expr,
            self.dialect.quote_column_name_if_needed(&parent_spec.reference_name),
            SelectEntrySource::ParentReference,
            None,
        ))
    }

    fn child_collection_select_entries(
        &self,
        table_spec: &TableJsonSpec,
        rel_id: &RelId,
        alias: &str,
        namer: PropertyNamer,
        loc: &SpecLocation,
    ) -> SpecResult<Vec<SelectEntry>> {
        table_spec
            .child_tables()
            .iter()
            .map(|child_spec| {
                let child_loc =
                    loc.with_part(&format!("child collection '{}'", child_spec.collection_name));
                let value_expr = format!(
                    "-- records from child table '{}' as collection '{}'\n(\n{}\n)",
                    child_spec.table_json.table,
                    child_spec.collection_name,
                    self.indent(&self.child_collection_query(child_spec, rel_id, alias, namer, &child_loc)?)
                );
                Ok(SelectEntry::new(
                    value_expr,
                    self.dialect.quote_column_name_if_needed(&child_spec.collection_name),
                    SelectEntrySource::ChildCollection,
                    None,
                ))
            })
            .collect()
    }

    fn child_collection_query(
        &self,
        child_spec: &ChildSpec,
        parent_rel_id: &RelId,
        parent_alias: &str,
        namer: PropertyNamer,
        loc: &SpecLocation,
    ) -> SpecResult<String> {
        let child_rel_id = identify_table(
            &child_spec.table_json.table,
            self.default_schema.as_deref(),
            self.dbmd,
            loc,
        )?;

        let child_fk_cond =
            self.child_fk_condition(child_spec, &child_rel_id, parent_rel_id, parent_alias, loc)?;

        if child_spec.unwrap && child_spec.table_json.json_properties_count() > 1 {
            return Err(SpecError::new(
                loc,
                SpecErrorKind::InvalidUnwrap,
                "Unwrapped child collection option is incompatible with multiple field expressions.",
            ));
        }

        self.json_array_row_sql(
            &child_spec.table_json,
            Some(&child_fk_cond),
            child_spec.unwrap,
            child_spec.order_by.as_deref(),
            namer,
            loc,
        )
    }

    /// Query producing a single row with a single json column holding the
    /// aggregated row objects (or unwrapped values) of the table's rows.
    fn json_array_row_sql(
        &self,
        table_spec: &TableJsonSpec,
        parent_child_cond: Option<&ParentChildCond>,
        unwrap: bool,
        order_by: Option<&str>,
        namer: PropertyNamer,
        loc: &SpecLocation,
    ) -> SpecResult<String> {
        let bq = self.base_query(table_spec, parent_child_cond, false, None, namer, loc)?;

        if unwrap && bq.result_column_names.len() != 1 {
            return Err(SpecError::new(
                loc,
                SpecErrorKind::InvalidUnwrap,
                "Unwrapped child collections cannot have multiple field expressions.",
            ));
        }

        let agg_expr = if unwrap {
            self.dialect
                .aggregated_column_values_expr(&bq.result_column_names[0], order_by, "q")
        } else {
            self.dialect
                .aggregated_row_objects_expr(&bq.result_column_names, order_by, "q")
        }
        .map_err(|problem| SpecError::new(loc, SpecErrorKind::InvalidFieldSpec, problem))?;

        let agg_comment = if unwrap {
            format!("-- aggregated column values for table '{}'", table_spec.table)
        } else {
            format!("-- aggregated row objects for table '{}'", table_spec.table)
        };

        Ok(format!(
            "select\n{}\n{} json\nfrom (\n{}\n{}\n) q",
            self.indent(&agg_comment),
            self.indent(&agg_expr),
            self.indent(&format!("-- base query for table '{}'", table_spec.table)),
            self.indent(&bq.sql)
        ))
    }

    /// Query producing one JSON object value per result row of the table.
    fn json_object_rows_sql(
        &self,
        table_spec: &TableJsonSpec,
        parent_child_cond: Option<&ParentChildCond>,
        order_by: Option<&str>,
        namer: PropertyNamer,
        loc: &SpecLocation,
    ) -> SpecResult<String> {
        let bq = self.base_query(table_spec, parent_child_cond, false, None, namer, loc)?;

        let mut sql = format!(
            "select\n{}\n{} json\nfrom (\n{}\n{}\n) q",
            self.indent(&format!("-- row object for table '{}'", table_spec.table)),
            self.indent(&self.dialect.row_object_expr(&bq.result_column_names, "q")),
            self.indent(&format!("-- base query for table '{}'", table_spec.table)),
            self.indent(&bq.sql)
        );

        if let Some(order_by) = order_by {
            sql.push_str(&format!(
                "\norder by {}",
                replace_all(order_by, DEFAULT_ALIAS_TOKEN, "q")
            ));
        }

        Ok(sql)
    }

    fn parent_pk_condition<P: ParentLink>(
        &self,
        parent_spec: &P,
        child_rel_id: &RelId,
        child_alias: &str,
        loc: &SpecLocation,
    ) -> SpecResult<ParentChildCond> {
        let parent_rel_id = identify_table(
            &parent_spec.table_json().table,
            self.default_schema.as_deref(),
            self.dbmd,
            loc,
        )?;

        match parent_spec.custom_join_condition() {
            Some(custom_join) => {
                if parent_spec.via_foreign_key_fields().is_some() {
                    return Err(SpecError::new(
                        loc,
                        SpecErrorKind::InvalidFieldSpec,
                        "A parent with a customJoinCondition cannot also specify viaForeignKeyFields.",
                    ));
                }
                validate_custom_join_condition(
                    custom_join,
                    child_rel_id,
                    &parent_rel_id,
                    self.dbmd,
                    &loc.with_part("custom join condition"),
                )?;
                Ok(ParentChildCond::ParentPk {
                    child_alias: child_alias.to_string(),
                    matched_fields: self.virtual_fk_components(custom_join),
                })
            }
            None => {
                let fk_fields: Option<HashSet<String>> = parent_spec
                    .via_foreign_key_fields()
                    .map(|ff| ff.iter().cloned().collect());
                let fk =
                    resolve_foreign_key(self.dbmd, child_rel_id, &parent_rel_id, fk_fields.as_ref(), loc)?;
                Ok(ParentChildCond::ParentPk {
                    child_alias: child_alias.to_string(),
                    matched_fields: fk.components.clone(),
                })
            }
        }
    }

    fn child_fk_condition(
        &self,
        child_spec: &ChildSpec,
        child_rel_id: &RelId,
        parent_rel_id: &RelId,
        parent_alias: &str,
        loc: &SpecLocation,
    ) -> SpecResult<ParentChildCond> {
        match &child_spec.custom_join_condition {
            Some(custom_join) => {
                if child_spec.foreign_key_fields.is_some() {
                    return Err(SpecError::new(
                        loc,
                        SpecErrorKind::InvalidFieldSpec,
                        "A child collection with a customJoinCondition cannot also specify foreignKeyFields.",
                    ));
                }
                validate_custom_join_condition(
                    custom_join,
                    child_rel_id,
                    parent_rel_id,
                    self.dbmd,
                    &loc.with_part("custom join condition"),
                )?;
                Ok(ParentChildCond::ChildFk {
                    parent_alias: parent_alias.to_string(),
                    matched_fields: self.virtual_fk_components(custom_join),
                })
            }
            None => {
                let fk_fields: Option<HashSet<String>> = child_spec
                    .foreign_key_fields
                    .as_ref()
                    .map(|ff| ff.iter().cloned().collect());
                let fk =
                    resolve_foreign_key(self.dbmd, child_rel_id, parent_rel_id, fk_fields.as_ref(), loc)?;
                Ok(ParentChildCond::ChildFk {
                    parent_alias: parent_alias.to_string(),
                    matched_fields: fk.components.clone(),
                })
            }
        }
    }

    /// Join field pairs of a custom join condition in foreign-key
    /// component form, case-folded like metadata names.
    fn virtual_fk_components(&self, custom_join: &CustomJoinCondition) -> Vec<ForeignKeyComponent> {
        custom_join
            .equated_fields
            .iter()
            .map(|pair| ForeignKeyComponent {
                child_field: case_normalize_name(&pair.child_field, self.dbmd.case_sensitivity),
                parent_field: case_normalize_name(&pair.parent_field, self.dbmd.case_sensitivity),
            })
            .collect()
    }

    /// Schema-qualified relation identifier, with the qualifier omitted
    /// for schemas declared to use unqualified names.
    fn minimal_rel_identifier(&self, rel_id: &RelId) -> String {
        match &rel_id.schema {
            None => rel_id.name.clone(),
            Some(schema)
                if self
                    .unqualified_name_schemas
                    .contains(&case_normalize_name(schema, self.dbmd.case_sensitivity)) =>
            {
                rel_id.name.clone()
            }
            Some(_) => rel_id.sql_string(),
        }
    }

    fn indent(&self, s: &str) -> String {
        indent_lines(s, self.indent_spaces, true)
    }
}

fn json_property_name(
    tfe: &TableFieldExpr,
    namer: PropertyNamer,
    loc: &SpecLocation,
) -> SpecResult<String> {
    if let Some(json_property) = tfe.json_property() {
        return Ok(json_property.to_string());
    }
    match tfe.field_name() {
        Some(field) => Ok(namer.property_name(field)),
        None => Err(SpecError::new(
            loc,
            SpecErrorKind::InvalidFieldSpec,
            "A json property name is required for an expression field.",
        )),
    }
}

fn table_field_expression_sql(
    tfe: &TableFieldExpr,
    table_alias: &str,
    dialect: &dyn SqlDialect,
    loc: &SpecLocation,
) -> SpecResult<String> {
    if let Some(field) = tfe.field_name() {
        return Ok(format!("{table_alias}.{}", dialect.quote_column_name_if_needed(field)));
    }
    match tfe.expression() {
        Some(expression) => Ok(replace_all(expression, tfe.alias_token(), table_alias)),
        None => Err(SpecError::new(
            loc,
            SpecErrorKind::InvalidFieldSpec,
            "Exactly one of 'field' or 'expression' must be provided.",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dbmd::StoredMetadata;

    fn drugs_dbmd() -> DatabaseMetadata {
        drugs_dbmd_for("PostgreSQL")
    }

    fn drugs_dbmd_for(dbms_name: &str) -> DatabaseMetadata {
        let stored: StoredMetadata = serde_json::from_str(
            &r#"{
                "dbmsName": "PostgreSQL", "dbmsVersion": "14",
                "caseSensitivity": "INSENSITIVE_STORED_LOWER",
                "relations": [
                    {"relationId": {"schema": "drugs", "name": "analyst"},
                     "relationType": "Table",
                     "fields": [
                        {"name": "id", "databaseType": "int4", "nullable": false, "primaryKeyPartNumber": 1},
                        {"name": "short_name", "databaseType": "varchar", "nullable": false}
                     ]},
                    {"relationId": {"schema": "drugs", "name": "compound"},
                     "relationType": "Table",
                     "fields": [
                        {"name": "id", "databaseType": "int4", "nullable": false, "primaryKeyPartNumber": 1},
                        {"name": "display_name", "databaseType": "varchar", "nullable": true},
                        {"name": "entered_by", "databaseType": "int4", "nullable": false},
                        {"name": "approved_by", "databaseType": "int4", "nullable": true}
                     ]},
                    {"relationId": {"schema": "drugs", "name": "drug"},
                     "relationType": "Table",
                     "fields": [
                        {"name": "id", "databaseType": "int4", "nullable": false, "primaryKeyPartNumber": 1},
                        {"name": "name", "databaseType": "varchar", "nullable": false},
                        {"name": "compound_id", "databaseType": "int4", "nullable": false}
                     ]}
                ],
                "foreignKeys": [
                    {"childRelationId": {"schema": "drugs", "name": "compound"},
                     "parentRelationId": {"schema": "drugs", "name": "analyst"},
                     "components": [{"childField": "entered_by", "parentField": "id"}]},
                    {"childRelationId": {"schema": "drugs", "name": "compound"},
                     "parentRelationId": {"schema": "drugs", "name": "analyst"},
                     "components": [{"childField": "approved_by", "parentField": "id"}]},
                    {"childRelationId": {"schema": "drugs", "name": "drug"},
                     "parentRelationId": {"schema": "drugs", "name": "compound"},
                     "components": [{"childField": "compound_id", "parentField": "id"}]}
                ]
            }"#
            .replace("PostgreSQL", dbms_name),
        )
        .unwrap();
        DatabaseMetadata::new(stored)
    }

    fn generator(dbmd: &DatabaseMetadata) -> SqlGenerator<'_> {
        let namer = PropertyNamer::new(None, dbmd.case_sensitivity);
        SqlGenerator::new(dbmd, Some("drugs".to_string()), &[], namer, 2).unwrap()
    }

    fn query_spec(json: &str) -> QuerySpec {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_simple_json_object_rows_query() {
        let dbmd = drugs_dbmd();
        let gen = generator(&dbmd);
        let qs = query_spec(
            r#"{"queryName": "drugs query",
                "tableJson": {"table": "drug", "fieldExpressions": ["id", "name"]}}"#,
        );
        let sqls = gen.generate_sqls(&qs).unwrap();
        assert_eq!(sqls.len(), 1);
        assert_eq!(sqls[0].0, ResultRepr::RowsAsJsonObjects);

        let sql = &sqls[0].1;
        assert!(sql.contains("-- row object for table 'drug'"));
        assert!(sql.contains("jsonb_build_object("));
        assert!(sql.contains("-- base query for table 'drug'"));
        assert!(sql.contains("drugs.drug d"));
        assert!(sql.contains("d.id as id"));
        assert!(sql.contains("d.name as name"));
    }

    #[test]
    fn test_unqualified_schema_omits_qualifier() {
        let dbmd = drugs_dbmd();
        let namer = PropertyNamer::new(None, dbmd.case_sensitivity);
        let gen = SqlGenerator::new(
            &dbmd,
            Some("drugs".to_string()),
            &["DRUGS".to_string()],
            namer,
            2,
        )
        .unwrap();
        let qs = query_spec(
            r#"{"queryName": "q", "tableJson": {"table": "drug", "fieldExpressions": ["id"]}}"#,
        );
        let sql = &gen.generate_sqls(&qs).unwrap()[0].1;
        assert!(sql.contains("\n  drug d"));
        assert!(!sql.contains("drugs.drug"));
    }

    #[test]
    fn test_camel_case_property_names_quoted() {
        let dbmd = drugs_dbmd();
        let gen = generator(&dbmd);
        let qs = query_spec(
            r#"{"queryName": "q", "tableJson": {"table": "drug", "fieldExpressions": ["compound_id"]}}"#,
        );
        let sql = &gen.generate_sqls(&qs).unwrap()[0].1;
        // Mixed-case output names need quoting under stored-lowercase rules,
        // and quoted names take a space separator instead of "as".
        assert!(sql.contains("d.compound_id \"compoundId\""));
    }

    #[test]
    fn test_field_expression_alias_substitution() {
        let dbmd = drugs_dbmd();
        let gen = generator(&dbmd);
        let qs = query_spec(
            r#"{"queryName": "q",
                "tableJson": {
                    "table": "drug",
                    "fieldExpressions": [
                        {"expression": "$$.id + 1", "jsonProperty": "idPlusOne", "generatedType": "number"}
                    ]
                }}"#,
        );
        let sql = &gen.generate_sqls(&qs).unwrap()[0].1;
        assert!(sql.contains("d.id + 1 \"idPlusOne\""));
    }

    #[test]
    fn test_record_condition_substitution() {
        let dbmd = drugs_dbmd();
        let gen = generator(&dbmd);
        let qs = query_spec(
            r#"{"queryName": "q",
                "tableJson": {
                    "table": "drug",
                    "fieldExpressions": ["id"],
                    "recordCondition": {"sql": "$$.id = :idParam", "paramNames": ["idParam"]}
                }}"#,
        );
        let sql = &gen.generate_sqls(&qs).unwrap()[0].1;
        assert!(sql.contains("where (\n    (d.id = :idParam)\n  )"));
    }

    #[test]
    fn test_top_level_order_by_applied_to_wrapping_query() {
        let dbmd = drugs_dbmd();
        let gen = generator(&dbmd);
        let qs = query_spec(
            r#"{"queryName": "q", "orderBy": "$$.name desc",
                "tableJson": {"table": "drug", "fieldExpressions": ["id", "name"]}}"#,
        );
        let sql = &gen.generate_sqls(&qs).unwrap()[0].1;
        assert!(sql.ends_with("order by q.name desc"));
    }

    #[test]
    fn test_plain_columns_order_by_alias_substituted() {
        let dbmd = drugs_dbmd();
        let gen = generator(&dbmd);
        let qs = query_spec(
            r#"{"queryName": "q", "orderBy": "$$.name desc",
                "resultRepresentations": ["PLAIN_COLUMNS"],
                "tableJson": {"table": "drug", "fieldExpressions": ["id", "name"]}}"#,
        );
        let sql = &gen.generate_sqls(&qs).unwrap()[0].1;
        assert!(sql.ends_with("order by d.name desc"));
        assert!(!sql.contains("$$"));
    }

    #[test]
    fn test_mysql_projected_names_quoted_per_dialect() {
        let dbmd = drugs_dbmd_for("mysql");
        let gen = generator(&dbmd);
        let qs = query_spec(
            r#"{"queryName": "q",
                "tableJson": {
                    "table": "drug",
                    "fieldExpressions": [
                        "compound_id",
                        {"field": "id", "jsonProperty": "order"}
                    ]
                }}"#,
        );
        let sql = &gen.generate_sqls(&qs).unwrap()[0].1;
        assert!(sql.contains("json_object("));
        assert!(sql.contains("d.compound_id as compoundId"));
        // Reserved-word alias takes backticks, never double quotes.
        assert!(sql.contains("d.id `order`"));
        assert!(!sql.contains('"'));
    }

    #[test]
    fn test_inline_parent_joined_via_hidden_pk_export() {
        let dbmd = drugs_dbmd();
        let gen = generator(&dbmd);
        let qs = query_spec(
            r#"{"queryName": "q",
                "tableJson": {
                    "table": "drug",
                    "fieldExpressions": ["id"],
                    "inlineParentTables": [
                        {"tableJson": {"table": "compound", "fieldExpressions": ["display_name"]}}
                    ]
                }}"#,
        );
        let sql = &gen.generate_sqls(&qs).unwrap()[0].1;
        assert!(sql.contains("-- parent table 'compound', joined for inlined fields"));
        assert!(sql.contains("left join ("));
        // The parent subquery exports its pk hidden for the join.
        assert!(sql.contains("c.id as _id"));
        assert!(sql.contains("on d.compound_id = q._id"));
        assert!(sql.contains("-- field(s) inlined from parent table 'compound'"));
        assert!(sql.contains("q.\"displayName\""));
        // Hidden export does not become an output property.
        assert!(!sql.contains("'_id'"));
    }

    #[test]
    fn test_referenced_parent_embedded_as_correlated_subquery() {
        let dbmd = drugs_dbmd();
        let gen = generator(&dbmd);
        let qs = query_spec(
            r#"{"queryName": "q",
                "tableJson": {
                    "table": "compound",
                    "fieldExpressions": ["id"],
                    "referencedParentTables": [
                        {"referenceName": "enteredByAnalyst",
                         "viaForeignKeyFields": ["entered_by"],
                         "tableJson": {"table": "analyst", "fieldExpressions": ["id", "short_name"]}}
                    ]
                }}"#,
        );
        let sql = &gen.generate_sqls(&qs).unwrap()[0].1;
        assert!(sql.contains("-- parent table 'analyst' referenced as 'enteredByAnalyst'"));
        assert!(sql.contains("\"enteredByAnalyst\""));
        assert!(sql.contains("c.entered_by = a.id"));
    }

    #[test]
    fn test_child_collection_embedded_as_aggregate_subquery() {
        let dbmd = drugs_dbmd();
        let gen = generator(&dbmd);
        let qs = query_spec(
            r#"{"queryName": "q",
                "tableJson": {
                    "table": "compound",
                    "fieldExpressions": ["id"],
                    "childTables": [
                        {"collectionName": "drugs",
                         "tableJson": {"table": "drug", "fieldExpressions": ["id", "name"]}}
                    ]
                }}"#,
        );
        let sql = &gen.generate_sqls(&qs).unwrap()[0].1;
        assert!(sql.contains("-- records from child table 'drug' as collection 'drugs'"));
        assert!(sql.contains("-- aggregated row objects for table 'drug'"));
        assert!(sql.contains("coalesce(jsonb_agg("));
        assert!(sql.contains("d.compound_id = c.id"));
    }

    #[test]
    fn test_unwrapped_child_collection_aggregates_values() {
        let dbmd = drugs_dbmd();
        let gen = generator(&dbmd);
        let qs = query_spec(
            r#"{"queryName": "q",
                "tableJson": {
                    "table": "compound",
                    "fieldExpressions": ["id"],
                    "childTables": [
                        {"collectionName": "drugNames", "unwrap": true,
                         "tableJson": {"table": "drug", "fieldExpressions": ["name"]}}
                    ]
                }}"#,
        );
        let sql = &gen.generate_sqls(&qs).unwrap()[0].1;
        assert!(sql.contains("jsonb_agg(q.name)"));
        assert!(sql.contains("-- aggregated column values for table 'drug'"));
        assert!(!sql.contains("aggregated row objects"));
        assert!(!sql.contains("jsonb_build_object(\n      'name'"));
    }

    #[test]
    fn test_unwrap_with_multiple_properties_rejected() {
        let dbmd = drugs_dbmd();
        let gen = generator(&dbmd);
        let qs = query_spec(
            r#"{"queryName": "q",
                "tableJson": {
                    "table": "compound",
                    "childTables": [
                        {"collectionName": "drugs", "unwrap": true,
                         "tableJson": {"table": "drug", "fieldExpressions": ["id", "name"]}}
                    ]
                }}"#,
        );
        let err = gen.generate_sqls(&qs).unwrap_err();
        assert_eq!(err.kind, SpecErrorKind::InvalidUnwrap);
        assert!(err.location.query_part.as_deref().unwrap().contains("child collection 'drugs'"));
    }

    #[test]
    fn test_ambiguous_fk_requires_disambiguating_fields() {
        let dbmd = drugs_dbmd();
        let gen = generator(&dbmd);
        let qs = query_spec(
            r#"{"queryName": "q",
                "tableJson": {
                    "table": "compound",
                    "fieldExpressions": ["id"],
                    "referencedParentTables": [
                        {"referenceName": "analyst",
                         "tableJson": {"table": "analyst", "fieldExpressions": ["id"]}}
                    ]
                }}"#,
        );
        let err = gen.generate_sqls(&qs).unwrap_err();
        assert_eq!(err.kind, SpecErrorKind::AmbiguousForeignKey);
    }

    #[test]
    fn test_missing_fk_reported_with_sought_fields() {
        let dbmd = drugs_dbmd();
        let gen = generator(&dbmd);
        let qs = query_spec(
            r#"{"queryName": "q",
                "tableJson": {
                    "table": "compound",
                    "fieldExpressions": ["id"],
                    "referencedParentTables": [
                        {"referenceName": "analyst",
                         "viaForeignKeyFields": ["id"],
                         "tableJson": {"table": "analyst", "fieldExpressions": ["id"]}}
                    ]
                }}"#,
        );
        let err = gen.generate_sqls(&qs).unwrap_err();
        assert_eq!(err.kind, SpecErrorKind::NoForeignKey);
        assert!(err.problem.contains("foreign keys [id]"));
    }

    #[test]
    fn test_custom_join_condition_excludes_fk_fields() {
        let dbmd = drugs_dbmd();
        let gen = generator(&dbmd);
        let qs = query_spec(
            r#"{"queryName": "q",
                "tableJson": {
                    "table": "compound",
                    "fieldExpressions": ["id"],
                    "childTables": [
                        {"collectionName": "drugs",
                         "foreignKeyFields": ["compound_id"],
                         "customJoinCondition": {"equatedFields": [{"childField": "compound_id", "parentField": "id"}]},
                         "tableJson": {"table": "drug", "fieldExpressions": ["id"]}}
                    ]
                }}"#,
        );
        let err = gen.generate_sqls(&qs).unwrap_err();
        assert_eq!(err.kind, SpecErrorKind::InvalidFieldSpec);
    }

    #[test]
    fn test_custom_join_condition_generates_equations() {
        let dbmd = drugs_dbmd();
        let gen = generator(&dbmd);
        let qs = query_spec(
            r#"{"queryName": "q",
                "tableJson": {
                    "table": "compound",
                    "fieldExpressions": ["id"],
                    "childTables": [
                        {"collectionName": "drugs",
                         "customJoinCondition": {"equatedFields": [{"childField": "compound_id", "parentField": "id"}]},
                         "tableJson": {"table": "drug", "fieldExpressions": ["id"]}}
                    ]
                }}"#,
        );
        let sql = &gen.generate_sqls(&qs).unwrap()[0].1;
        assert!(sql.contains("d.compound_id = c.id"));
    }

    #[test]
    fn test_plain_columns_repr_and_for_update() {
        let dbmd = drugs_dbmd();
        let gen = generator(&dbmd);
        let qs = query_spec(
            r#"{"queryName": "q", "forUpdate": true,
                "resultRepresentations": ["PLAIN_COLUMNS"],
                "tableJson": {"table": "drug", "fieldExpressions": ["id"]}}"#,
        );
        let sqls = gen.generate_sqls(&qs).unwrap();
        assert_eq!(sqls[0].0, ResultRepr::PlainColumns);
        assert!(sqls[0].1.starts_with("select\n"));
        assert!(!sqls[0].1.contains("jsonb_build_object"));
        assert!(sqls[0].1.ends_with("\nfor update"));
    }

    #[test]
    fn test_for_update_rejected_for_json_representations() {
        let dbmd = drugs_dbmd();
        let gen = generator(&dbmd);
        let qs = query_spec(
            r#"{"queryName": "q", "forUpdate": true,
                "tableJson": {"table": "drug", "fieldExpressions": ["id"]}}"#,
        );
        let err = gen.generate_sqls(&qs).unwrap_err();
        assert_eq!(err.kind, SpecErrorKind::InvalidFieldSpec);
        assert_eq!(err.location.query_part.as_deref(), Some("for update clause"));
    }

    #[test]
    fn test_multiple_representations_generated_in_order() {
        let dbmd = drugs_dbmd();
        let gen = generator(&dbmd);
        let qs = query_spec(
            r#"{"queryName": "q",
                "resultRepresentations": ["ROWS_AS_JSON_OBJECTS", "SINGLE_JSON_ARRAY"],
                "tableJson": {"table": "drug", "fieldExpressions": ["id"]}}"#,
        );
        let sqls = gen.generate_sqls(&qs).unwrap();
        assert_eq!(sqls.len(), 2);
        assert_eq!(sqls[0].0, ResultRepr::RowsAsJsonObjects);
        assert_eq!(sqls[1].0, ResultRepr::SingleJsonArray);
        assert!(sqls[1].1.contains("-- aggregated row objects for table 'drug'"));
    }

    #[test]
    fn test_generation_is_deterministic() {
        let dbmd = drugs_dbmd();
        let gen = generator(&dbmd);
        let qs = query_spec(
            r#"{"queryName": "q",
                "tableJson": {
                    "table": "compound",
                    "fieldExpressions": ["id"],
                    "inlineParentTables": [
                        {"viaForeignKeyFields": ["entered_by"],
                         "tableJson": {"table": "analyst", "fieldExpressions": ["short_name"]}}
                    ],
                    "childTables": [
                        {"collectionName": "drugs",
                         "tableJson": {"table": "drug", "fieldExpressions": ["id", "name"]}}
                    ]
                }}"#,
        );
        let first = gen.generate_sqls(&qs).unwrap();
        let second = gen.generate_sqls(&qs).unwrap();
        assert_eq!(first, second);
    }
}
