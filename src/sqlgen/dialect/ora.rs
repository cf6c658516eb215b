//! Oracle JSON SQL syntax (`json_object ... returning clob` /
//! `json_arrayagg ... returning clob`).

use super::{is_simple_identifier, is_sql_keyword, substitute_alias, SqlDialect};
use crate::dbmd::names::un_double_quote;
use crate::strings::indent_lines;

pub struct OracleDialect {
    indent_spaces: usize,
}

impl OracleDialect {
    pub fn new(indent_spaces: usize) -> Self {
        OracleDialect { indent_spaces }
    }
}

impl SqlDialect for OracleDialect {
    fn row_object_expr(&self, column_names: &[String], src_alias: &str) -> String {
        // Column names arrive pre-quoted where needed; the JSON property
        // key is always their unquoted form.
        let object_field_decls = column_names
            .iter()
            .map(|col| {
                format!(
                    "'{}' value {}.{}",
                    un_double_quote(col),
                    src_alias,
                    self.quote_column_name_if_needed(col)
                )
            })
            .collect::<Vec<_>>()
            .join(",\n");

        format!(
            "json_object(\n{}\n)",
            indent_lines(&format!("{object_field_decls}\nreturning clob"), self.indent_spaces, true)
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
            "treat(coalesce(json_arrayagg({}{} returning clob), to_clob('[]')) as json)",
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
            "treat(coalesce(json_arrayagg({}.{}{} returning clob), to_clob('[]')) as json)",
            src_alias,
            self.quote_column_name_if_needed(column_name),
            order_clause
        ))
    }

    fn quote_column_name_if_needed(&self, name: &str) -> String {
        if name.starts_with('"') && name.ends_with('"') {
            return name.to_string();
        }
        let all_upper = name.chars().all(|c| c.is_ascii_uppercase() || c == '_');
        if !is_simple_identifier(name) || !all_upper || is_sql_keyword(name) {
            format!("\"{name}\"")
        } else {
            name.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_row_object_expr_returns_clob() {
        let d = OracleDialect::new(2);
        let sql = d.row_object_expr(&cols(&["ID"]), "q");
        assert!(sql.starts_with("json_object(\n"));
        assert!(sql.contains("'ID' value q.ID"));
        assert!(sql.contains("returning clob"));
    }

    #[test]
    fn test_aggregated_rows_order_by_substitution() {
        let d = OracleDialect::new(2);
        let sql = d
            .aggregated_row_objects_expr(&cols(&["ID"]), Some("$$.ID"), "q")
            .unwrap();
        assert!(sql.contains("order by q.ID"));
        assert!(sql.ends_with("to_clob('[]')) as json)"));
    }

    #[test]
    fn test_column_quoting_uppercase_convention() {
        let d = OracleDialect::new(2);
        assert_eq!(d.quote_column_name_if_needed("ENTERED_BY"), "ENTERED_BY");
        assert_eq!(d.quote_column_name_if_needed("entered_by"), "\"entered_by\"");
    }
}
