//! Generated artifact naming and writing.

pub mod ts;

use std::fs;
use std::path::Path;

use anyhow::Context;
use tracing::info;

use crate::spec::ResultRepr;

const AUTOGEN_WARNING: &str =
    "-- [ THIS QUERY WAS AUTO-GENERATED, ANY CHANGES MADE HERE MAY BE LOST. ]";

/// File stem shared by a query's artifacts: the query name lowercased
/// with spaces as hyphens.
pub fn query_file_stem(query_name: &str) -> String {
    query_name.replace(' ', "-").to_lowercase()
}

/// SQL file name for one representation of a query. The representation
/// descriptor appears only when the query generates several of them.
pub fn sql_file_name(query_name: &str, repr: ResultRepr, multiple_reprs: bool) -> String {
    let stem = query_file_stem(query_name);
    if multiple_reprs {
        format!("{stem}({}).sql", repr.file_descr())
    } else {
        format!("{stem}.sql")
    }
}

/// Record of a written SQL artifact, referenced from generated type
/// declaration sources.
#[derive(Debug, Clone)]
pub struct QueryReprSqlPath {
    pub repr: ResultRepr,
    pub file_name: String,
}

/// Write one SQL file per generated representation of a query, each headed
/// by the auto-generation warning and a representation line.
pub fn write_query_sqls(
    query_name: &str,
    repr_sqls: &[(ResultRepr, String)],
    output_dir: &Path,
) -> anyhow::Result<Vec<QueryReprSqlPath>> {
    let multiple_reprs = repr_sqls.len() > 1;
    let mut paths = Vec::with_capacity(repr_sqls.len());

    for (repr, sql) in repr_sqls {
        let file_name = sql_file_name(query_name, *repr, multiple_reprs);
        let sql_path = output_dir.join(&file_name);

        let contents = format!(
            "{AUTOGEN_WARNING}\n-- {} results representation for {query_name}\n{sql}\n",
            repr.descr()
        );
        fs::write(&sql_path, contents)
            .with_context(|| format!("writing query SQL file '{}'", sql_path.display()))?;
        info!(query = query_name, file = %sql_path.display(), "wrote query SQL");

        paths.push(QueryReprSqlPath { repr: *repr, file_name });
    }

    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_file_stem_slugified() {
        assert_eq!(query_file_stem("Drugs With Analysts"), "drugs-with-analysts");
        assert_eq!(query_file_stem("drugs"), "drugs");
    }

    #[test]
    fn test_sql_file_name_repr_suffix_only_for_multiple() {
        assert_eq!(
            sql_file_name("drugs query", ResultRepr::RowsAsJsonObjects, false),
            "drugs-query.sql"
        );
        assert_eq!(
            sql_file_name("drugs query", ResultRepr::RowsAsJsonObjects, true),
            "drugs-query(rows as json objects).sql"
        );
        assert_eq!(
            sql_file_name("drugs query", ResultRepr::PlainColumns, true),
            "drugs-query(plain columns).sql"
        );
    }

    #[test]
    fn test_write_query_sqls_contents() {
        let dir = std::env::temp_dir().join("tabson-output-test");
        std::fs::create_dir_all(&dir).unwrap();

        let repr_sqls = vec![(ResultRepr::RowsAsJsonObjects, "select 1".to_string())];
        let paths = write_query_sqls("drugs query", &repr_sqls, &dir).unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].file_name, "drugs-query.sql");

        let written = std::fs::read_to_string(dir.join(&paths[0].file_name)).unwrap();
        assert!(written.starts_with(AUTOGEN_WARNING));
        assert!(written.contains("-- ROWS_AS_JSON_OBJECTS results representation for drugs query"));
        assert!(written.ends_with("select 1\n"));
    }
}
