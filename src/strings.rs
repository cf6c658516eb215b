//! General string helpers used across generation: identifier casing,
//! unique-name allocation, and multi-line indentation.

use std::collections::HashSet;

/// Convert a name to UpperCamelCase, splitting on non-alphanumerics.
pub fn upper_camel_case(name: &str) -> String {
    camel_case(name, true)
}

/// Convert a name to lowerCamelCase, splitting on non-alphanumerics.
pub fn lower_camel_case(name: &str) -> String {
    camel_case(name, false)
}

fn camel_case(name: &str, upper_first: bool) -> String {
    let mut out = String::with_capacity(name.len());
    for (ix, word) in name
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .enumerate()
    {
        if ix == 0 && !upper_first {
            out.push_str(&word.to_lowercase());
        } else {
            let mut chars = word.chars();
            if let Some(first) = chars.next() {
                out.extend(first.to_uppercase());
                out.push_str(&chars.as_str().to_lowercase());
            }
        }
    }
    out
}

/// Lowercased initials of the `sep`-separated words of a name, with
/// characters outside `[A-Za-z0-9_]` removed first (`.`, space and `_`
/// all count as word separators when `sep` is `'_'`).
pub fn lowercase_initials(name: &str, sep: char) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c == '.' || c == ' ' { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();

    cleaned
        .split(sep)
        .filter(|word| !word.is_empty())
        .flat_map(|word| word.chars().next().map(|c| c.to_ascii_lowercase()))
        .collect()
}

/// Return `base_name` if it is not already taken, else the first
/// `base_name<sep><i>` for i = 1, 2, ... which is free.
pub fn make_name_not_in_set(base_name: &str, existing: &HashSet<String>, suffix_sep: &str) -> String {
    if !existing.contains(base_name) {
        return base_name.to_string();
    }
    let mut i = 1;
    loop {
        let candidate = format!("{base_name}{suffix_sep}{i}");
        if !existing.contains(&candidate) {
            return candidate;
        }
        i += 1;
    }
}

/// Indent every non-empty line of `s` by `spaces` spaces. The first line
/// is skipped when `indent_first` is false (useful when the text is being
/// appended after an already-indented prefix).
pub fn indent_lines(s: &str, spaces: usize, indent_first: bool) -> String {
    let indention = " ".repeat(spaces);
    let mut out = String::with_capacity(s.len() + 16);

    for (ix, line) in s.split('\n').enumerate() {
        if ix > 0 {
            out.push('\n');
        }
        if (ix > 0 || indent_first) && !line.is_empty() {
            out.push_str(&indention);
        }
        out.push_str(line);
    }
    out
}

/// Replace every occurrence of `from` in `s` with `to`.
pub fn replace_all(s: &str, from: &str, to: &str) -> String {
    s.replace(from, to)
}

/// Stable 32-bit string hash (times-31 accumulation). Used only for cheap
/// bucketing, never for identity.
pub fn hash_string(s: &str) -> i64 {
    let mut hash: i32 = 0;
    for b in s.bytes() {
        hash = hash.wrapping_mul(31).wrapping_add(b as i32);
    }
    hash as i64
}
