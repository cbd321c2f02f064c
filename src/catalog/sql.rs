//! Identifier and literal quoting for catalog statements.

use std::collections::BTreeMap;

/// Quote an identifier, doubling any embedded double quotes.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote a string literal, doubling any embedded single quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Join quoted identifiers into a qualified name: `"db"."schema"."name"`.
pub fn qualified<S: AsRef<str>>(parts: &[S]) -> String {
    parts
        .iter()
        .map(|p| quote_ident(p.as_ref()))
        .collect::<Vec<_>>()
        .join(".")
}

/// A single `WITH (...)` property value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    /// Rendered as a quoted literal.
    Literal(String),
    /// Rendered verbatim (enumerations such as `KAFKA`).
    Keyword(String),
}

/// Render a `WITH ('k' = v, ...)` clause. Returns an empty string when there
/// are no properties. Keys are emitted in sorted order.
pub fn with_clause(props: &BTreeMap<String, PropertyValue>) -> String {
    if props.is_empty() {
        return String::new();
    }
    let rendered = props
        .iter()
        .map(|(k, v)| {
            let value = match v {
                PropertyValue::Literal(s) => quote_literal(s),
                PropertyValue::Keyword(s) => s.clone(),
            };
            format!("{} = {}", quote_literal(k), value)
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!(" WITH ({})", rendered)
}

/// Split a dotted name (`db.schema.name`) into parts, honouring double
/// quotes around parts that themselves contain dots.
pub fn split_qualified(name: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = name.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            '.' if !quoted => parts.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    parts.push(current);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("db1"), "\"db1\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_quote_literal() {
        assert_eq!(quote_literal("it's"), "'it''s'");
    }

    #[test]
    fn test_qualified() {
        assert_eq!(qualified(&["db", "s", "r"]), "\"db\".\"s\".\"r\"");
    }

    #[test]
    fn test_with_clause() {
        assert_eq!(with_clause(&BTreeMap::new()), "");

        let mut props = BTreeMap::new();
        props.insert("type".to_string(), PropertyValue::Keyword("KAFKA".into()));
        props.insert(
            "uris".to_string(),
            PropertyValue::Literal("broker:9092".into()),
        );
        assert_eq!(
            with_clause(&props),
            " WITH ('type' = KAFKA, 'uris' = 'broker:9092')"
        );
    }

    #[test]
    fn test_split_qualified() {
        assert_eq!(split_qualified("db.s.r"), vec!["db", "s", "r"]);
        assert_eq!(split_qualified("\"a.b\".c"), vec!["a.b", "c"]);
        assert_eq!(split_qualified("\"x\"\"y\""), vec!["x\"y"]);
        assert_eq!(split_qualified("solo"), vec!["solo"]);
    }
}
