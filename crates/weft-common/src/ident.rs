//! Identifier style conversion and Rust keyword escaping.
//!
//! Weft source names are camelCase (values) or PascalCase (types);
//! emitted Rust wants snake_case, SCREAMING_SNAKE for statics, and raw
//! identifiers for anything colliding with a Rust keyword.

/// Convert a camelCase or PascalCase name to snake_case.
///
/// Runs of uppercase letters are treated as one word boundary, so
/// `parseHTTPHeader` becomes `parse_http_header`.
pub fn camel_to_snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let chars: Vec<char> = name.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() {
            let prev_lower = i > 0 && chars[i - 1].is_ascii_lowercase();
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase());
            let prev_upper = i > 0 && chars[i - 1].is_ascii_uppercase();
            if prev_lower || (prev_upper && next_lower) {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Convert a camelCase or PascalCase name to SCREAMING_SNAKE_CASE.
pub fn camel_to_shout(name: &str) -> String {
    camel_to_snake(name).to_ascii_uppercase()
}

/// Convert a dash-separated name (library/directory names) to snake_case.
pub fn dash_to_snake(name: &str) -> String {
    name.replace('-', "_")
}

/// Escape a name that collides with a Rust keyword using a raw
/// identifier, and replace `#` characters that temporaries can carry.
///
/// Keywords that cannot be raw identifiers (`self`, `Self`, `super`,
/// `crate`) get a trailing underscore instead.
pub fn escape_ident(name: &str) -> String {
    let cleaned = if name.contains('#') {
        name.replace('#', "___")
    } else {
        name.to_string()
    };
    if NO_RAW_KEYWORDS.contains(&cleaned.as_str()) {
        format!("{cleaned}_")
    } else if KEYWORDS.contains(&cleaned.as_str()) {
        format!("r#{cleaned}")
    } else {
        cleaned
    }
}

/// Keywords that raw-identifier syntax cannot escape.
const NO_RAW_KEYWORDS: &[&str] = &["self", "Self", "super", "crate"];

/// Strict keywords and reserved words as of the 2018 edition.
const KEYWORDS: &[&str] = &[
    "abstract", "as", "async", "await", "become", "box", "break", "const",
    "continue", "do", "dyn", "else", "enum", "extern", "false", "final",
    "fn", "for", "if", "impl", "in", "let", "loop", "macro", "match",
    "mod", "move", "mut", "override", "priv", "pub", "ref", "return",
    "static", "struct", "trait", "true", "try", "type", "typeof",
    "unsafe", "unsized", "use", "virtual", "where", "while", "yield",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snake_basic() {
        assert_eq!(camel_to_snake("toString"), "to_string");
        assert_eq!(camel_to_snake("ListBuilder"), "list_builder");
        assert_eq!(camel_to_snake("already_snake"), "already_snake");
    }

    #[test]
    fn snake_acronym_runs() {
        assert_eq!(camel_to_snake("parseHTTPHeader"), "parse_http_header");
        assert_eq!(camel_to_snake("XMLName"), "xml_name");
    }

    #[test]
    fn shout_for_statics() {
        assert_eq!(camel_to_shout("maxRetryCount"), "MAX_RETRY_COUNT");
    }

    #[test]
    fn keyword_escaping() {
        assert_eq!(escape_ident("type"), "r#type");
        assert_eq!(escape_ident("match"), "r#match");
        assert_eq!(escape_ident("plain"), "plain");
        assert_eq!(escape_ident("self"), "self_");
    }

    #[test]
    fn hash_temporaries_cleaned() {
        assert_eq!(escape_ident("t#3"), "t___3");
    }
}
