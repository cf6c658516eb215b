//! Result type descriptor generation.
//!
//! Traverses a query spec tree in the same node order as SQL generation
//! (fields, inline parents, referenced parents, child collections) and
//! produces one structural descriptor per object shape the query can
//! return. The top table's descriptor leads the returned list; inline
//! parents merge into their referencing level and unwrapped collection
//! element types are reachable only through their collection property.

pub mod names;

use std::collections::HashSet;

use tracing::debug;

use crate::dbmd::names::case_normalize_name;
use crate::dbmd::{DatabaseMetadata, Field, RelId};
use crate::error::{SpecError, SpecErrorKind, SpecLocation, SpecResult};
use crate::spec::{
    identify_table, resolve_foreign_key, ChildSpec, ParentLink, PropertyNamer, QuerySpec,
    TableFieldExpr, TableJsonSpec,
};

/// Structural description of one JSON object shape in a query result.
/// Equality is derived structural equality, which drives deduplication.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultTypeDescriptor {
    pub table: String,
    pub table_field_properties: Vec<TableFieldProperty>,
    pub table_expression_properties: Vec<TableExpressionProperty>,
    pub parent_reference_properties: Vec<ParentReferenceProperty>,
    pub child_collection_properties: Vec<ChildCollectionProperty>,
    pub unwrapped: bool,
}

impl ResultTypeDescriptor {
    pub fn properties_count(&self) -> usize {
        self.table_field_properties.len()
            + self.table_expression_properties.len()
            + self.parent_reference_properties.len()
            + self.child_collection_properties.len()
    }
}

/// A property backed directly by a database field.
#[derive(Debug, Clone, PartialEq)]
pub struct TableFieldProperty {
    pub name: String,
    pub database_field_name: String,
    pub database_type: String,
    pub length: Option<i64>,
    pub precision: Option<i64>,
    pub fractional_digits: Option<i64>,
    pub nullable: Option<bool>,
    pub specified_source_type: Option<String>,
}

/// A property backed by a general SQL expression. Its generated-source
/// type always comes from the spec since the expression type is unknown.
#[derive(Debug, Clone, PartialEq)]
pub struct TableExpressionProperty {
    pub name: String,
    pub field_expression: String,
    pub specified_source_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParentReferenceProperty {
    pub name: String,
    pub ref_result_type: ResultTypeDescriptor,
    pub nullable: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChildCollectionProperty {
    pub name: String,
    /// Element type only; the collection wrapper is implied.
    pub element_result_type: ResultTypeDescriptor,
    pub nullable: Option<bool>,
}

#[derive(Default)]
struct Properties {
    table_field_properties: Vec<TableFieldProperty>,
    table_expression_properties: Vec<TableExpressionProperty>,
    parent_reference_properties: Vec<ParentReferenceProperty>,
    child_collection_properties: Vec<ChildCollectionProperty>,
}

impl Properties {
    /// Merge another descriptor's properties in, making field, parent
    /// reference and collection properties nullable when the contributing
    /// parent record may be absent.
    fn absorb(&mut self, contributed: &ResultTypeDescriptor, force_nullable: bool) {
        if force_nullable {
            self.table_field_properties.extend(
                contributed.table_field_properties.iter().cloned().map(|p| TableFieldProperty {
                    nullable: Some(true),
                    ..p
                }),
            );
            self.parent_reference_properties.extend(
                contributed.parent_reference_properties.iter().cloned().map(|p| {
                    ParentReferenceProperty { nullable: Some(true), ..p }
                }),
            );
            self.child_collection_properties.extend(
                contributed.child_collection_properties.iter().cloned().map(|p| {
                    ChildCollectionProperty { nullable: Some(true), ..p }
                }),
            );
        } else {
            self.table_field_properties
                .extend(contributed.table_field_properties.iter().cloned());
            self.parent_reference_properties
                .extend(contributed.parent_reference_properties.iter().cloned());
            self.child_collection_properties
                .extend(contributed.child_collection_properties.iter().cloned());
        }
        self.table_expression_properties
            .extend(contributed.table_expression_properties.iter().cloned());
    }
}

pub struct ResultTypeGenerator<'a> {
    dbmd: &'a DatabaseMetadata,
    default_schema: Option<String>,
    default_property_namer: PropertyNamer,
}

impl<'a> ResultTypeGenerator<'a> {
    pub fn new(
        dbmd: &'a DatabaseMetadata,
        default_schema: Option<String>,
        default_property_namer: PropertyNamer,
    ) -> ResultTypeGenerator<'a> {
        ResultTypeGenerator { dbmd, default_schema, default_property_namer }
    }

    /// Generate descriptors for the query's top table and every related
    /// table reached through its spec tree, top table first. Duplicate
    /// structures are not removed here; see [`names::assign_type_names`].
    pub fn generate(&self, query_spec: &QuerySpec) -> SpecResult<Vec<ResultTypeDescriptor>> {
        debug!(query = %query_spec.query_name, "generating result type descriptors");
        let namer = match query_spec.property_naming_default {
            Some(name_default) => PropertyNamer::new(Some(name_default), self.dbmd.case_sensitivity),
            None => self.default_property_namer,
        };
        let loc = SpecLocation::new(&query_spec.query_name);
        self.descriptors_for(&query_spec.table_json, namer, &loc)
    }

    fn descriptors_for(
        &self,
        table_spec: &TableJsonSpec,
        namer: PropertyNamer,
        loc: &SpecLocation,
    ) -> SpecResult<Vec<ResultTypeDescriptor>> {
        let rel_id = identify_table(&table_spec.table, self.default_schema.as_deref(), self.dbmd, loc)?;

        let mut top = Properties::default();
        let mut result_types: Vec<ResultTypeDescriptor> = Vec::new();

        top.table_field_properties = self.table_field_properties(&rel_id, table_spec, namer, loc)?;
        top.table_expression_properties = table_expression_properties(table_spec, loc)?;

        for (ix, parent_spec) in table_spec.inline_parents().iter().enumerate() {
            let parent_loc = loc.with_part(&format!(
                "inlineParentTables entry #{}, '{}' table",
                ix + 1,
                parent_spec.table_json.table
            ));
            let parent_types = self.descriptors_for(&parent_spec.table_json, namer, &parent_loc)?;

            let force_nullable = parent_spec.table_json.record_condition.is_some()
                || !self.some_fk_field_not_nullable(parent_spec, &rel_id, &parent_loc)?;

            // The parent's own wrapper type is absorbed, not listed.
            top.absorb(&parent_types[0], force_nullable);
            result_types.extend(parent_types.into_iter().skip(1));
        }

        for (ix, parent_spec) in table_spec.referenced_parents().iter().enumerate() {
            let parent_loc = loc.with_part(&format!(
                "referencedParentTables entry #{}, '{}' table",
                ix + 1,
                parent_spec.table_json.table
            ));
            let parent_types = self.descriptors_for(&parent_spec.table_json, namer, &parent_loc)?;

            let nullable = parent_spec.table_json.record_condition.is_some()
                || !self.some_fk_field_not_nullable(parent_spec, &rel_id, &parent_loc)?;

            top.parent_reference_properties.push(ParentReferenceProperty {
                name: parent_spec.reference_name.clone(),
                ref_result_type: parent_types[0].clone(),
                nullable: Some(nullable),
            });
            result_types.extend(parent_types);
        }

        for child_spec in table_spec.child_tables() {
            let child_loc = loc.with_part(&format!("child collection '{}'", child_spec.collection_name));
            top.child_collection_properties
                .push(self.child_collection_property(child_spec, &mut result_types, namer, &child_loc)?);
        }

        result_types.insert(
            0,
            ResultTypeDescriptor {
                table: table_spec.table.clone(),
                table_field_properties: top.table_field_properties,
                table_expression_properties: top.table_expression_properties,
                parent_reference_properties: top.parent_reference_properties,
                child_collection_properties: top.child_collection_properties,
                unwrapped: false,
            },
        );

        Ok(result_types)
    }

    fn child_collection_property(
        &self,
        child_spec: &ChildSpec,
        result_types: &mut Vec<ResultTypeDescriptor>,
        namer: PropertyNamer,
        loc: &SpecLocation,
    ) -> SpecResult<ChildCollectionProperty> {
        let mut child_types = self.descriptors_for(&child_spec.table_json, namer, loc)?;

        let element_result_type = if child_spec.unwrap {
            if child_types[0].properties_count() != 1 {
                return Err(SpecError::new(
                    loc,
                    SpecErrorKind::InvalidUnwrap,
                    "Unwrapped child collection elements must have exactly one property.",
                ));
            }
            // The unwrapped element type is only reachable through this
            // collection property; types it references remain standalone.
            let mut element = child_types.remove(0);
            element.unwrapped = true;
            result_types.extend(child_types);
            element
        } else {
            let element = child_types[0].clone();
            result_types.extend(child_types);
            element
        };

        Ok(ChildCollectionProperty {
            name: child_spec.collection_name.clone(),
            element_result_type,
            nullable: Some(false),
        })
    }

    fn table_field_properties(
        &self,
        rel_id: &RelId,
        table_spec: &TableJsonSpec,
        namer: PropertyNamer,
        loc: &SpecLocation,
    ) -> SpecResult<Vec<TableFieldProperty>> {
        let rel_md = self
            .dbmd
            .relation_metadata(rel_id)
            .unwrap_or_else(|| panic!("relation metadata not found for '{}'", rel_id.descr()));
        let fields_by_name = rel_md.fields_by_name();

        let mut props = Vec::new();

        for tfe in table_spec.field_expressions() {
            let Some(field_name) = tfe.field_name() else { continue };

            let stored_name = case_normalize_name(field_name, self.dbmd.case_sensitivity);
            let db_field = fields_by_name.get(stored_name.as_str()).ok_or_else(|| {
                SpecError::new(
                    loc,
                    SpecErrorKind::FieldNotFound,
                    format!("Field(s) not found in table {}: {}.", rel_id.descr(), field_name),
                )
            })?;

            props.push(make_table_field_property(tfe, db_field, namer));
        }

        Ok(props)
    }

    /// True when at least one child-side join field of the link to the
    /// given parent is known non-nullable, in which case a matching parent
    /// record is guaranteed for every child row.
    fn some_fk_field_not_nullable<P: ParentLink>(
        &self,
        parent_spec: &P,
        child_rel_id: &RelId,
        loc: &SpecLocation,
    ) -> SpecResult<bool> {
        let fk_field_names: Vec<String> = match parent_spec.custom_join_condition() {
            Some(custom_join) => custom_join
                .equated_fields
                .iter()
                .map(|pair| case_normalize_name(&pair.child_field, self.dbmd.case_sensitivity))
                .collect(),
            None => {
                let parent_rel_id = identify_table(
                    &parent_spec.table_json().table,
                    self.default_schema.as_deref(),
                    self.dbmd,
                    loc,
                )?;
                let fk_fields: Option<HashSet<String>> = parent_spec
                    .via_foreign_key_fields()
                    .map(|ff| ff.iter().cloned().collect());
                let fk = resolve_foreign_key(
                    self.dbmd,
                    child_rel_id,
                    &parent_rel_id,
                    fk_fields.as_ref(),
                    loc,
                )?;
                fk.child_field_names().iter().map(|s| s.to_string()).collect()
            }
        };

        let child_md = self
            .dbmd
            .relation_metadata(child_rel_id)
            .unwrap_or_else(|| panic!("relation metadata not found for '{}'", child_rel_id.descr()));
        let fields_by_name = child_md.fields_by_name();

        Ok(fk_field_names.iter().any(|name| {
            fields_by_name
                .get(name.as_str())
                .is_some_and(|f| f.nullable == Some(false))
        }))
    }
}

fn make_table_field_property(
    tfe: &TableFieldExpr,
    db_field: &Field,
    namer: PropertyNamer,
) -> TableFieldProperty {
    let name = tfe
        .json_property()
        .map(str::to_string)
        .unwrap_or_else(|| namer.property_name(&db_field.name));

    TableFieldProperty {
        name,
        database_field_name: db_field.name.clone(),
        database_type: db_field.database_type.clone(),
        length: db_field.length,
        precision: db_field.precision,
        fractional_digits: db_field.fractional_digits,
        nullable: db_field.nullable,
        specified_source_type: tfe.generated_type().map(str::to_string),
    }
}

fn table_expression_properties(
    table_spec: &TableJsonSpec,
    loc: &SpecLocation,
) -> SpecResult<Vec<TableExpressionProperty>> {
    let mut props = Vec::new();

    for tfe in table_spec.field_expressions() {
        let Some(expression) = tfe.expression() else { continue };

        let name = tfe.json_property().ok_or_else(|| {
            SpecError::new(
                loc,
                SpecErrorKind::InvalidFieldSpec,
                format!("Expression field {expression} requires a json property."),
            )
        })?;

        props.push(TableExpressionProperty {
            name: name.to_string(),
            field_expression: expression.to_string(),
            specified_source_type: tfe.generated_type().map(str::to_string),
        });
    }

    Ok(props)
}
