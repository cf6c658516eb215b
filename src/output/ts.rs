//! TypeScript type-declaration source emission.
//!
//! One module is generated per query: constants naming the SQL resource
//! file(s) and bind parameters, then one `export interface` per distinct
//! result type, top-level type first. Structurally identical descriptors
//! share a name and are emitted once; unwrapped collection element types
//! appear only through their collection property's type.

use crate::error::{SpecError, SpecErrorKind, SpecLocation, SpecResult};
use crate::restype::{
    ChildCollectionProperty, ParentReferenceProperty, ResultTypeDescriptor, TableExpressionProperty,
    TableFieldProperty,
};
use crate::spec::QuerySpec;
use crate::strings::upper_camel_case;

use super::QueryReprSqlPath;

#[derive(Debug, Clone, Default)]
pub struct TsSourceOptions {
    /// Prefix prepended to SQL file names in generated `sqlResource`
    /// constants, e.g. a classpath-like resource directory.
    pub sql_resource_path_prefix: String,
    /// Verbatim text heading each generated module, e.g. extra imports.
    pub types_file_header: Option<String>,
}

/// Render the TypeScript module source for one query's result types.
pub fn make_query_types_source(
    query_spec: &QuerySpec,
    descriptors: &[ResultTypeDescriptor],
    type_names: &[String],
    sql_paths: &[QueryReprSqlPath],
    opts: &TsSourceOptions,
) -> SpecResult<String> {
    assert_eq!(descriptors.len(), type_names.len(), "type name per descriptor");

    let emitter = Emitter {
        descriptors,
        type_names,
        loc: SpecLocation::new(&query_spec.query_name),
    };

    let mut src = String::new();

    if let Some(header) = &opts.types_file_header {
        src.push_str(header);
        src.push_str("\n\n");
    }

    src.push_str(
        "// The types defined in this file correspond to results of the following generated SQL queries.\n",
    );
    src.push_str(&sql_resource_consts(sql_paths, &opts.sql_resource_path_prefix));

    src.push_str("\n// query parameters\n");
    for param in query_spec.param_names() {
        src.push_str(&format!("export const {param}Param = '{param}';\n"));
    }

    src.push_str(
        "\n// Below are types representing the result data for the generated query, with top-level type first.\n",
    );

    let mut emitted_names: Vec<&str> = Vec::new();
    for (ix, descriptor) in descriptors.iter().enumerate() {
        if descriptor.unwrapped || emitted_names.contains(&type_names[ix].as_str()) {
            continue;
        }
        emitted_names.push(&type_names[ix]);
        src.push_str(&emitter.interface_declaration(descriptor, &type_names[ix])?);
        src.push('\n');
    }

    Ok(src)
}

fn sql_resource_consts(sql_paths: &[QueryReprSqlPath], path_prefix: &str) -> String {
    let mut paths: Vec<&QueryReprSqlPath> = sql_paths.iter().collect();
    paths.sort_by_key(|p| p.repr.descr());

    let mut out = String::new();
    for p in paths {
        let member_suffix = if sql_paths.len() == 1 {
            String::new()
        } else {
            upper_camel_case(p.repr.descr())
        };
        out.push_str(&format!(
            "export const sqlResource{member_suffix} = \"{path_prefix}{}\";\n",
            p.file_name
        ));
    }
    out
}

struct Emitter<'a> {
    descriptors: &'a [ResultTypeDescriptor],
    type_names: &'a [String],
    loc: SpecLocation,
}

impl<'a> Emitter<'a> {
    fn interface_declaration(
        &self,
        descriptor: &ResultTypeDescriptor,
        type_name: &str,
    ) -> SpecResult<String> {
        let mut member_decls = Vec::new();

        for prop in &descriptor.table_field_properties {
            member_decls.push(format!("  {}: {};", prop.name, self.table_field_type(prop)?));
        }
        for prop in &descriptor.table_expression_properties {
            member_decls.push(format!("  {}: {};", prop.name, self.table_expression_type(prop)?));
        }
        for prop in &descriptor.parent_reference_properties {
            member_decls.push(format!("  {}: {};", prop.name, self.parent_reference_type(prop)));
        }
        for prop in &descriptor.child_collection_properties {
            member_decls.push(format!("  {}: {};", prop.name, self.child_collection_type(prop)?));
        }

        Ok(format!(
            "export interface {type_name}\n{{\n{}\n}}\n",
            member_decls.join("\n")
        ))
    }

    fn table_field_type(&self, prop: &TableFieldProperty) -> SpecResult<String> {
        if let Some(specified) = &prop.specified_source_type {
            return Ok(specified.clone());
        }

        let db_type = prop.database_type.to_lowercase();
        let base_type = match db_type.as_str() {
            "number" | "numeric" | "decimal" | "bigint" | "int" | "integer" | "int4"
            | "smallint" | "int8" => "number",
            "float" | "real" | "double" => "number",
            "varchar" | "varchar2" | "text" | "longvarchar" | "char" | "clob" | "date" | "time"
            | "timestamp" | "timestamp with time zone" | "timestamptz" => "string",
            "bit" | "boolean" | "bool" => "boolean",
            "json" | "jsonb" => "any",
            _ if db_type.starts_with("timestamp") => "string",
            _ => {
                return Err(SpecError::new(
                    &self.loc,
                    SpecErrorKind::InvalidFieldSpec,
                    format!(
                        "Unsupported type for field '{}' of type '{}'.",
                        prop.database_field_name, prop.database_type
                    ),
                ))
            }
        };

        Ok(with_nullability(prop.nullable, base_type))
    }

    fn table_expression_type(&self, prop: &TableExpressionProperty) -> SpecResult<String> {
        match &prop.specified_source_type {
            Some(specified) => Ok(specified.clone()),
            None => Err(SpecError::new(
                &self.loc,
                SpecErrorKind::InvalidFieldSpec,
                format!(
                    "A generated type is required for table expression property {}.",
                    prop.name
                ),
            )),
        }
    }

    fn parent_reference_type(&self, prop: &ParentReferenceProperty) -> String {
        with_nullability(prop.nullable, self.type_name_of(&prop.ref_result_type))
    }

    fn child_collection_type(&self, prop: &ChildCollectionProperty) -> SpecResult<String> {
        let element_type = if prop.element_result_type.unwrapped {
            self.sole_property_type(&prop.element_result_type)?
        } else {
            self.type_name_of(&prop.element_result_type).to_string()
        };

        Ok(with_nullability(prop.nullable, &format!("{element_type}[]")))
    }

    /// Source type of an unwrapped element type's single property.
    fn sole_property_type(&self, descriptor: &ResultTypeDescriptor) -> SpecResult<String> {
        assert_eq!(descriptor.properties_count(), 1, "unwrapped type has one property");

        if let Some(prop) = descriptor.table_field_properties.first() {
            self.table_field_type(prop)
        } else if let Some(prop) = descriptor.table_expression_properties.first() {
            self.table_expression_type(prop)
        } else if let Some(prop) = descriptor.parent_reference_properties.first() {
            Ok(self.parent_reference_type(prop))
        } else {
            self.child_collection_type(&descriptor.child_collection_properties[0])
        }
    }

    /// Assigned name of an embedded descriptor, found by structural
    /// equality against the full descriptor list. A miss means the list
    /// and names fell out of sync, a programming error.
    fn type_name_of(&self, descriptor: &ResultTypeDescriptor) -> &'a str {
        let referenced = ResultTypeDescriptor { unwrapped: false, ..descriptor.clone() };
        self.descriptors
            .iter()
            .position(|d| *d == referenced)
            .map(|ix| self.type_names[ix].as_str())
            .unwrap_or_else(|| panic!("no type name assigned for a '{}' descriptor", descriptor.table))
    }
}

fn with_nullability(nullable: Option<bool>, base_type: &str) -> String {
    // Unknown nullability admits null.
    if nullable.unwrap_or(true) {
        format!("{base_type} | null")
    } else {
        base_type.to_string()
    }
}
