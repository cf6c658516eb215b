//! MySQL JSON SQL syntax (`json_object` / `json_arrayagg`).
//!
//! MySQL's `json_arrayagg` does not accept an `order by` inside the
//! aggregate, so aggregate ordering requests are rejected.

use super::{is_simple_identifier, is_sql_keyword, SqlDialect};
use crate::dbmd::names::un_double_quote;
use crate::strings::indent_lines;

pub struct MySqlDialect {
    indent_spaces: usize,
}

impl MySqlDialect {
    pub fn new(indent_spaces: usize) -> Self {
        MySqlDialect { indent_spaces }
    }
}

impl SqlDialect for MySqlDialect {
    fn row_object_expr(&self, column_names: &[String], src_alias: &str) -> String {
        // Column names arrive pre-quoted where needed; the JSON property
        // key is always their unquoted form.
        let object_field_decls = column_names
            .iter()
            .map(|col| {
                format!(
                    "'{}', {}.{}",
                    un_double_quote(col.trim_matches('`')),
                    src_alias,
                    self.quote_column_name_if_needed(col)
                )
            })
            .collect::<Vec<_>>()
            .join(",\n");

        format!(
            "json_object(\n{}\n)",
            indent_lines(&object_field_decls, self.indent_spaces, true)
        )
    }

    fn aggregated_row_objects_expr(
        &self,
        column_names: &[String],
        order_by: Option<&str>,
        src_alias: &str,
    ) -> Result<String, String> {
        if order_by.is_some() {
            return Err("MySQL does not support ordering in aggregate functions.".to_string());
        }

        Ok(format!(
            "cast(coalesce(json_arrayagg({}), json_type('[]')) as json)",
            self.row_object_expr(column_names, src_alias)
        ))
    }

    fn aggregated_column_values_expr(
        &self,
        column_name: &str,
        order_by: Option<&str>,
        src_alias: &str,
    ) -> Result<String, String> {
        if order_by.is_some() {
            return Err(format!(
                "Error for column {column_name}: MySQL does not support ordering in aggregate functions."
            ));
        }

        Ok(format!(
            "cast(coalesce(json_arrayagg({}.{}), json_type('[]')) as json)",
            src_alias,
            self.quote_column_name_if_needed(column_name)
        ))
    }

    fn quote_column_name_if_needed(&self, name: &str) -> String {
        if name.starts_with('`') && name.ends_with('`') {
            return name.to_string();
        }
        if name.starts_with('"') && name.ends_with('"') {
            return format!("`{}`", un_double_quote(name));
        }
        if !is_simple_identifier(name) || is_sql_keyword(name) {
            format!("`{name}`")
        } else {
            name.to_string()
        }
    }
}
