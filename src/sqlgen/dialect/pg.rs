//! PostgreSQL JSON SQL syntax (`jsonb_build_object` / `jsonb_agg`).

use super::{is_simple_identifier, is_sql_keyword, substitute_alias, SqlDialect};
use crate::dbmd::names::un_double_quote;
use crate::strings::indent_lines;

pub struct PostgresDialect {
    indent_spaces: usize,
}

impl PostgresDialect {
    pub fn new(indent_spaces: usize) -> Self {
        PostgresDialect { indent_spaces }
    }
}

impl SqlDialect for PostgresDialect {
    fn row_object_expr(&self, column_names: &[String], src_alias: &str) -> String {
        // Column names arrive pre-quoted where needed; the JSON property
        // key is always their unquoted form.
        let object_field_decls = column_names
            .iter()
            .map(|col| {
                format!(
                    "'{}', {}.{}",
                    un_double_quote(col),
                    src_alias,
                    self.quote_column_name_if_needed(col)
                )
            })
            .collect::<Vec<_>>()
            .join(",\n");

        format!(
            "jsonb_build_object(\n{}\n)",
            indent_lines(&object_field_decls, self.indent_spaces, true)
        )
    }

    fn aggregated_row_objects_expr(
        &self,
        column_names: &[String],
        order_by: Option<&str>,
        src_alias: &str,
    ) -> Result<String, String> {
        let order_clause = order_by
            .map(|ob| format!(" order by {}", substitute_alias(ob, src_alias)))
            .unwrap_or_default();

        Ok(format!(
            "coalesce(jsonb_agg({}{}),'[]'::jsonb)",
            self.row_object_expr(column_names, src_alias),
            order_clause
        ))
    }

    fn aggregated_column_values_expr(
        &self,
        column_name: &str,
        order_by: Option<&str>,
        src_alias: &str,
    ) -> Result<String, String> {
        let order_clause = order_by
            .map(|ob| format!(" order by {}", substitute_alias(ob, src_alias)))
            .unwrap_or_default();

        Ok(format!(
            "coalesce(jsonb_agg({}.{}{}),'[]'::jsonb)",
            src_alias,
            self.quote_column_name_if_needed(column_name),
            order_clause
        ))
    }

    fn quote_column_name_if_needed(&self, name: &str) -> String {
        if name.starts_with('"') && name.ends_with('"') {
            return name.to_string();
        }
        let all_lower = name.chars().all(|c| c.is_ascii_lowercase() || c == '_');
        if !is_simple_identifier(name) || !all_lower || is_sql_keyword(name) {
            format!("\"{name}\"")
        } else {
            name.to_string()
        }
    }
}
