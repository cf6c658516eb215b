//! Identifier normalization.
//!
//! User-supplied schema/table/field names are folded here, once, at the
//! boundary where they enter the system. Names already stored in the
//! metadata snapshot are taken as-is and never re-folded.

use super::CaseSensitivity;

fn is_quoted(id: &str) -> bool {
    (id.starts_with('"') && id.ends_with('"') && id.len() >= 2)
        || (id.starts_with('`') && id.ends_with('`') && id.len() >= 2)
}

/// Case-fold an identifier per the database's case-sensitivity mode.
/// Quoted identifiers are preserved exactly.
pub fn case_normalize_name(id: &str, case_sensitivity: CaseSensitivity) -> String {
    if is_quoted(id) {
        return id.to_string();
    }
    match case_sensitivity {
        CaseSensitivity::InsensitiveStoredLower => id.to_lowercase(),
        CaseSensitivity::InsensitiveStoredUpper => id.to_uppercase(),
        CaseSensitivity::InsensitiveStoredMixed | CaseSensitivity::Sensitive => id.to_string(),
    }
}

/// Strip surrounding double quotes, if present.
pub fn un_double_quote(s: &str) -> &str {
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

/// Convert a possibly-quoted name to unquoted form, case-folding only when
/// the name was originally unquoted. The resulting name would always be
/// recognized by the database if used with quotes applied.
pub fn exact_unquoted_name(name: &str, case_sensitivity: CaseSensitivity) -> String {
    if name.starts_with('"') {
        un_double_quote(name).to_string()
    } else {
        case_normalize_name(name, case_sensitivity)
    }
}

/// Split a possibly schema-qualified relation name into its quoted-or-not
/// schema and relation parts. A dot inside a quoted part does not split.
pub fn split_schema_and_relation(rel: &str) -> (Option<&str>, &str) {
    let dot_pos = if rel.starts_with('"') {
        rel.find("\".").map(|p| p + 1)
    } else {
        rel.find('.')
    };

    match dot_pos {
        Some(p) => (Some(&rel[..p]), &rel[p + 1..]),
        None => (None, rel),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_normalize_per_mode() {
        assert_eq!(case_normalize_name("Drug", CaseSensitivity::InsensitiveStoredLower), "drug");
        assert_eq!(case_normalize_name("Drug", CaseSensitivity::InsensitiveStoredUpper), "DRUG");
        assert_eq!(case_normalize_name("Drug", CaseSensitivity::InsensitiveStoredMixed), "Drug");
        assert_eq!(case_normalize_name("Drug", CaseSensitivity::Sensitive), "Drug");
    }

    #[test]
    fn test_quoted_names_not_folded() {
        assert_eq!(
            case_normalize_name("\"Drug\"", CaseSensitivity::InsensitiveStoredLower),
            "\"Drug\""
        );
    }

    #[test]
    fn test_exact_unquoted_name() {
        assert_eq!(exact_unquoted_name("\"Drug\"", CaseSensitivity::InsensitiveStoredLower), "Drug");
        assert_eq!(exact_unquoted_name("Drug", CaseSensitivity::InsensitiveStoredLower), "drug");
    }

    #[test]
    fn test_split_schema_and_relation() {
        assert_eq!(split_schema_and_relation("drugs.compound"), (Some("drugs"), "compound"));
        assert_eq!(split_schema_and_relation("compound"), (None, "compound"));
        assert_eq!(
            split_schema_and_relation("\"My Schema\".compound"),
            (Some("\"My Schema\""), "compound")
        );
    }
}
