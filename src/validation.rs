//! Configuration validation.
//!
//! Validates host-supplied JSON against a [`Schema`] and checks that object
//! names are legal catalog identifiers before any statement is built from
//! them.
//!
//! # Example
//!
//! ```
//! use streamsql_provider::schema::{Schema, Attribute};
//! use streamsql_provider::validation::validate;
//! use serde_json::json;
//!
//! let schema = Schema::v0()
//!     .with_attribute("name", Attribute::required_string())
//!     .with_attribute("owner", Attribute::optional_computed_string());
//!
//! assert!(validate(&schema, &json!({"name": "analytics"})).is_empty());
//!
//! let diagnostics = validate(&schema, &json!({"name": 42}));
//! assert_eq!(diagnostics.len(), 1);
//! assert_eq!(diagnostics[0].attribute, Some("name".to_string()));
//! ```

use serde_json::Value;

use crate::schema::{AttributeType, Diagnostic, Schema};
use crate::types::UNKNOWN_VALUE;

/// Longest identifier the catalog accepts.
pub const MAX_IDENTIFIER_LEN: usize = 255;

/// Validate a JSON object against a schema.
///
/// - Required attributes must be present and non-null
/// - Computed-only attributes are skipped
/// - Values still pending are accepted for any type
/// - Attribute types must match the schema
/// - Attributes not named in the schema are rejected
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let obj = match value {
        Value::Object(map) => map,
        Value::Null => {
            for (name, attr) in &schema.attributes {
                if attr.flags.required {
                    diagnostics.push(missing_required(name));
                }
            }
            return diagnostics;
        }
        other => {
            diagnostics.push(
                Diagnostic::error("Expected object")
                    .with_detail(format!("Got {}", value_type_name(other))),
            );
            return diagnostics;
        }
    };

    for (name, attr) in &schema.attributes {
        if attr.flags.is_computed_only() {
            continue;
        }
        match obj.get(name) {
            None | Some(Value::Null) => {
                if attr.flags.required {
                    diagnostics.push(missing_required(name));
                }
            }
            Some(Value::String(s)) if s == UNKNOWN_VALUE => {}
            Some(v) => validate_type(&attr.attr_type, v, name, &mut diagnostics),
        }
    }

    for name in obj.keys() {
        if !schema.attributes.contains_key(name) {
            diagnostics.push(
                Diagnostic::error(format!("Unsupported attribute '{}'", name))
                    .with_detail("This attribute is not part of the schema")
                    .with_attribute(name.as_str()),
            );
        }
    }

    diagnostics
}

/// Validate, returning `Err` with the diagnostics when any are found.
pub fn validate_result(schema: &Schema, value: &Value) -> Result<(), Vec<Diagnostic>> {
    let diagnostics = validate(schema, value);
    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(diagnostics)
    }
}

/// Whether a value is valid against a schema.
pub fn is_valid(schema: &Schema, value: &Value) -> bool {
    validate(schema, value).is_empty()
}

/// Check that a value is a legal catalog identifier.
///
/// Identifiers are always quoted when rendered into statements, so the only
/// rules are: non-empty, not just whitespace, no control characters, and at
/// most [`MAX_IDENTIFIER_LEN`] characters.
pub fn validate_identifier(path: &str, value: &str) -> Option<Diagnostic> {
    let problem = if value.trim().is_empty() {
        "must not be empty".to_string()
    } else if value.chars().count() > MAX_IDENTIFIER_LEN {
        format!("must be at most {} characters", MAX_IDENTIFIER_LEN)
    } else if value.chars().any(char::is_control) {
        "must not contain control characters".to_string()
    } else {
        return None;
    };

    Some(
        Diagnostic::error(format!("Invalid identifier '{}'", path))
            .with_detail(format!("'{}' {}", path, problem))
            .with_attribute(path),
    )
}

fn validate_type(
    attr_type: &AttributeType,
    value: &Value,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match attr_type {
        AttributeType::String => {
            if !value.is_string() {
                diagnostics.push(type_error(path, "string", value));
            }
        }
        AttributeType::Int64 => {
            if value.as_i64().is_none() {
                diagnostics.push(type_error(path, "int64", value));
            }
        }
        AttributeType::Bool => {
            if !value.is_boolean() {
                diagnostics.push(type_error(path, "bool", value));
            }
        }
        AttributeType::List(element_type) => match value.as_array() {
            Some(items) => {
                for (i, item) in items.iter().enumerate() {
                    validate_type(element_type, item, &format!("{}.{}", path, i), diagnostics);
                }
            }
            None => diagnostics.push(type_error(path, "list", value)),
        },
        AttributeType::Map(value_type) => match value.as_object() {
            Some(map) => {
                for (key, item) in map {
                    validate_type(value_type, item, &format!("{}.{}", path, key), diagnostics);
                }
            }
            None => diagnostics.push(type_error(path, "map", value)),
        },
        AttributeType::Object(fields) => match value.as_object() {
            Some(map) => {
                for (name, field_type) in fields {
                    if let Some(item) = map.get(name).filter(|v| !v.is_null()) {
                        validate_type(field_type, item, &format!("{}.{}", path, name), diagnostics);
                    }
                }
            }
            None => diagnostics.push(type_error(path, "object", value)),
        },
    }
}

fn missing_required(path: &str) -> Diagnostic {
    Diagnostic::error(format!("Missing required attribute '{}'", path))
        .with_detail("This attribute is required and must be provided")
        .with_attribute(path)
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn type_error(path: &str, expected: &str, got: &Value) -> Diagnostic {
    Diagnostic::error(format!("Invalid type for attribute '{}'", path))
        .with_detail(format!("Expected {}, got {}", expected, value_type_name(got)))
        .with_attribute(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Attribute;
    use serde_json::json;

    fn store_schema() -> Schema {
        Schema::v0()
            .with_attribute("name", Attribute::required_string())
            .with_attribute(
                "uris",
                Attribute::new(
                    AttributeType::list(AttributeType::String),
                    crate::schema::AttributeFlags::required(),
                ),
            )
            .with_attribute(
                "properties",
                Attribute::new(
                    AttributeType::map(AttributeType::String),
                    crate::schema::AttributeFlags::optional(),
                ),
            )
            .with_attribute("owner", Attribute::optional_computed_string())
            .with_attribute("state", Attribute::computed_string())
    }

    #[test]
    fn test_valid_config() {
        let value = json!({
            "name": "kafka_store",
            "uris": ["broker-1:9092", "broker-2:9092"],
            "properties": {"tls.disabled": "true"},
        });
        assert!(is_valid(&store_schema(), &value));
        assert!(validate_result(&store_schema(), &value).is_ok());
    }

    #[test]
    fn test_missing_required() {
        let diagnostics = validate(&store_schema(), &json!({"name": "s"}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("uris"));

        let diagnostics = validate(&store_schema(), &Value::Null);
        assert_eq!(diagnostics.len(), 2);
    }

    #[test]
    fn test_type_errors_have_paths() {
        let value = json!({
            "name": "s",
            "uris": ["ok", 7],
            "properties": {"a": true},
        });
        let diagnostics = validate(&store_schema(), &value);
        let paths: Vec<_> = diagnostics
            .iter()
            .filter_map(|d| d.attribute.as_deref())
            .collect();
        assert_eq!(paths, vec!["properties.a", "uris.1"]);
    }

    #[test]
    fn test_pending_and_computed_values() {
        let value = json!({
            "name": "s",
            "uris": UNKNOWN_VALUE,
            "state": 42,
        });
        // `state` is computed-only but still part of the schema; its value is not checked.
        assert!(is_valid(&store_schema(), &value));
    }

    #[test]
    fn test_unknown_attribute() {
        let value = json!({"name": "s", "uris": [], "colour": "blue"});
        let diagnostics = validate(&store_schema(), &value);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].summary, "Unsupported attribute 'colour'");
    }

    #[test]
    fn test_non_object() {
        let diagnostics = validate(&store_schema(), &json!("nope"));
        assert_eq!(diagnostics[0].summary, "Expected object");
    }

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("name", "analytics").is_none());
        assert!(validate_identifier("name", "with \"quotes\" and.dots").is_none());
        assert!(validate_identifier("name", "").is_some());
        assert!(validate_identifier("name", "   ").is_some());
        assert!(validate_identifier("name", "tab\there").is_some());

        let long = "x".repeat(MAX_IDENTIFIER_LEN + 1);
        let diag = validate_identifier("name", &long).unwrap();
        assert_eq!(diag.attribute.as_deref(), Some("name"));
    }
}
