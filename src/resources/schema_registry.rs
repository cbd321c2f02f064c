//! `streamsql_schema_registry`

use std::collections::BTreeMap;

use crate::catalog::sql::{quote_ident, with_clause, PropertyValue};
use crate::catalog::{ErrorCode, Row, Statement};
use crate::error::ProviderError;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Schema};
use crate::types::{AttrValue, Attributes, Identity};

use super::{
    copy_columns, declared, keyword, known_string, state_readiness, with_common_attributes,
    Readiness, ResourceKind, COMMON_COLUMNS,
};

/// A schema registry used to decode records from stores.
pub struct SchemaRegistryResource;

/// The schema registry kind.
pub static SCHEMA_REGISTRY: SchemaRegistryResource = SchemaRegistryResource;

impl ResourceKind for SchemaRegistryResource {
    fn kind(&self) -> &'static str {
        "schema_registry"
    }

    fn plural(&self) -> &'static str {
        "schema_registries"
    }

    fn schema(&self) -> Schema {
        with_common_attributes(
            Schema::v0()
                .with_description("A schema registry for record formats such as Avro")
                .with_attribute("name", Attribute::required_string())
                .with_attribute(
                    "type",
                    Attribute::required_string()
                        .with_description("Registry type, e.g. CONFLUENT or CONFLUENT_CLOUD"),
                )
                .with_attribute(
                    "uris",
                    Attribute::new(
                        AttributeType::list(AttributeType::String),
                        AttributeFlags::required(),
                    ),
                )
                .with_attribute("username", Attribute::optional_string())
                .with_attribute("password", Attribute::optional_string().sensitive())
                .with_attribute("state", Attribute::computed_string()),
        )
    }

    fn identity_attributes(&self) -> &'static [&'static str] {
        &["name"]
    }

    fn absent_codes(&self) -> &'static [ErrorCode] {
        &[ErrorCode::InvalidSchemaRegistry]
    }

    fn failed_to_provision(&self) -> &'static str {
        "schema registry failed to become ready"
    }

    fn create_statement(
        &self,
        identity: Option<&Identity>,
        desired: &Attributes,
    ) -> Result<Statement, ProviderError> {
        let uris = match desired.string_list("uris") {
            AttrValue::Known(uris) if !uris.is_empty() => uris,
            _ => {
                return Err(ProviderError::Validation(
                    "a schema registry needs at least one known uri".to_string(),
                ))
            }
        };

        let mut props = BTreeMap::new();
        props.insert(
            "type".to_string(),
            PropertyValue::Keyword(keyword("type", &known_string(self, desired, "type")?)?),
        );
        props.insert("uris".to_string(), PropertyValue::Literal(uris.join(",")));
        for field in ["username", "password"] {
            if let AttrValue::Known(value) = desired.string(field) {
                props.insert(field.to_string(), PropertyValue::Literal(value));
            }
        }

        let statement = Statement::new(format!(
            "CREATE SCHEMA_REGISTRY {}{}",
            declared(identity)?.qualified(),
            with_clause(&props)
        ));
        Ok(if props.contains_key("password") {
            statement.sensitive()
        } else {
            statement
        })
    }

    fn list_statement(&self, _scope: &Identity) -> Statement {
        Statement::new("LIST SCHEMA_REGISTRIES")
    }

    fn observe(&self, row: &Row) -> Attributes {
        let mut observed = copy_columns(row, &COMMON_COLUMNS);
        observed.merge(&copy_columns(row, &[("type", "type"), ("state", "state")]));
        observed
    }

    fn readiness(&self, observed: &Attributes) -> Readiness {
        state_readiness(observed, "ready", &["failed"])
    }

    fn drop_statement(&self, identity: &Identity, _attrs: &Attributes) -> Statement {
        Statement::new(format!(
            "DROP SCHEMA_REGISTRY {}",
            quote_ident(identity.get("name").unwrap_or_default())
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn identity() -> Identity {
        Identity::new().with("name", "confluent")
    }

    #[test]
    fn test_create_without_credentials() {
        let desired = Attributes::new()
            .with("name", "confluent")
            .with("type", "confluent")
            .with("uris", json!(["https://registry:8081"]));
        let statement = SCHEMA_REGISTRY
            .create_statement(Some(&identity()), &desired)
            .unwrap();

        assert_eq!(
            statement.sql(),
            "CREATE SCHEMA_REGISTRY \"confluent\" WITH ('type' = CONFLUENT, 'uris' = 'https://registry:8081')"
        );
        assert!(!statement.is_sensitive());
    }

    #[test]
    fn test_password_makes_statement_sensitive() {
        let desired = Attributes::new()
            .with("name", "confluent")
            .with("type", "CONFLUENT_CLOUD")
            .with("uris", json!(["https://registry:8081"]))
            .with("username", "svc")
            .with("password", "pw");
        let statement = SCHEMA_REGISTRY
            .create_statement(Some(&identity()), &desired)
            .unwrap();

        assert!(statement.is_sensitive());
        assert!(!format!("{}", statement).contains("pw'"));
    }

    #[test]
    fn test_statements() {
        assert_eq!(
            SCHEMA_REGISTRY.list_statement(&identity()).sql(),
            "LIST SCHEMA_REGISTRIES"
        );
        assert_eq!(
            SCHEMA_REGISTRY
                .drop_statement(&identity(), &Attributes::new())
                .sql(),
            "DROP SCHEMA_REGISTRY \"confluent\""
        );
    }
}
