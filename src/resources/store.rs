//! `streamsql_store`: a connection to an external streaming store.
//!
//! `uris` and `properties` can change in place through `UPDATE STORE`.

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

/// An external store such as a Kafka cluster.
pub struct StoreResource;

/// The store kind.
pub static STORE: StoreResource = StoreResource;

const RESERVED: [&str; 2] = ["type", "uris"];

fn connection_properties(desired: &Attributes) -> Result<BTreeMap<String, PropertyValue>, ProviderError> {
    let uris = match desired.string_list("uris") {
        AttrValue::Known(uris) if !uris.is_empty() => uris,
        AttrValue::Pending => {
            return Err(ProviderError::Validation(
                "'uris' must be known before the store can be changed".to_string(),
            ))
        }
        _ => return Err(ProviderError::Validation("a store needs at least one uri".to_string())),
    };

    let mut props = BTreeMap::new();
    props.insert("uris".to_string(), PropertyValue::Literal(uris.join(",")));

    match desired.string_map("properties") {
        AttrValue::Known(extra) => {
            for (key, value) in extra {
                if RESERVED.contains(&key.as_str()) {
                    return Err(ProviderError::Validation(format!(
                        "'{}' is set by its own attribute and cannot appear in properties",
                        key
                    )));
                }
                props.insert(key, PropertyValue::Literal(value));
            }
        }
        AttrValue::Pending => {
            return Err(ProviderError::Validation(
                "'properties' must be known before the store can be changed".to_string(),
            ))
        }
        AttrValue::Unset => {}
    }
    Ok(props)
}

impl ResourceKind for StoreResource {
    fn kind(&self) -> &'static str {
        "store"
    }

    fn plural(&self) -> &'static str {
        "stores"
    }

    fn schema(&self) -> Schema {
        with_common_attributes(
            Schema::v0()
                .with_description("A connection to an external streaming store")
                .with_attribute("name", Attribute::required_string())
                .with_attribute(
                    "type",
                    Attribute::required_string().with_description("Store type, e.g. KAFKA or KINESIS"),
                )
                .with_attribute(
                    "uris",
                    Attribute::new(
                        AttributeType::list(AttributeType::String),
                        AttributeFlags::required(),
                    )
                    .with_description("Broker or endpoint URIs")
                    .updatable(),
                )
                .with_attribute(
                    "properties",
                    Attribute::new(
                        AttributeType::map(AttributeType::String),
                        AttributeFlags::optional(),
                    )
                    .with_description("Additional connection properties, e.g. credentials")
                    .sensitive()
                    .updatable(),
                )
                .with_attribute("state", Attribute::computed_string()),
        )
    }

    fn identity_attributes(&self) -> &'static [&'static str] {
        &["name"]
    }

    fn absent_codes(&self) -> &'static [ErrorCode] {
        &[ErrorCode::InvalidStore]
    }

    fn failed_to_provision(&self) -> &'static str {
        "store failed to become ready"
    }

    fn create_statement(
        &self,
        identity: Option<&Identity>,
        desired: &Attributes,
    ) -> Result<Statement, ProviderError> {
        let mut props = connection_properties(desired)?;
        let store_type = keyword("type", &known_string(self, desired, "type")?)?;
        props.insert("type".to_string(), PropertyValue::Keyword(store_type));

        Ok(Statement::new(format!(
            "CREATE STORE {}{}",
            declared(identity)?.qualified(),
            with_clause(&props)
        ))
        .sensitive())
    }

    fn list_statement(&self, _scope: &Identity) -> Statement {
        Statement::new("LIST STORES")
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
            "DROP STORE {}",
            quote_ident(identity.get("name").unwrap_or_default())
        ))
    }

    fn update_statement(
        &self,
        identity: &Identity,
        _prior: &Attributes,
        planned: &Attributes,
    ) -> Result<Option<Statement>, ProviderError> {
        let props = connection_properties(planned)?;
        Ok(Some(
            Statement::new(format!(
                "UPDATE STORE {}{}",
                identity.qualified(),
                with_clause(&props)
            ))
            .sensitive(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn desired() -> Attributes {
        Attributes::new()
            .with("name", "kafka")
            .with("type", "kafka")
            .with("uris", json!(["b-1:9092", "b-2:9092"]))
            .with("properties", json!({"sasl.password": "hunter2"}))
    }

    fn identity() -> Identity {
        Identity::new().with("name", "kafka")
    }

    #[test]
    fn test_create_statement() {
        let statement = STORE.create_statement(Some(&identity()), &desired()).unwrap();
        assert_eq!(
            statement.sql(),
            "CREATE STORE \"kafka\" WITH ('sasl.password' = 'hunter2', 'type' = KAFKA, 'uris' = 'b-1:9092,b-2:9092')"
        );
        assert!(statement.is_sensitive());
        assert!(!statement.to_string().contains("hunter2"));
    }

    #[test]
    fn test_reserved_property_is_rejected() {
        let attrs = desired().with("properties", json!({"uris": "x:1"}));
        assert!(matches!(
            STORE.create_statement(Some(&identity()), &attrs),
            Err(ProviderError::Validation(_))
        ));
    }

    #[test]
    fn test_store_needs_uris_and_a_plain_type() {
        let attrs = desired().with("uris", json!([]));
        assert!(STORE.create_statement(Some(&identity()), &attrs).is_err());

        let attrs = desired().with("type", "KAFKA) WITH (x");
        assert!(STORE.create_statement(Some(&identity()), &attrs).is_err());
    }

    #[test]
    fn test_update_statement() {
        let planned = desired().with("uris", json!(["b-3:9092"]));
        let statement = STORE
            .update_statement(&identity(), &desired(), &planned)
            .unwrap()
            .unwrap();
        assert!(statement.sql().starts_with("UPDATE STORE \"kafka\" WITH ("));
        assert!(statement.sql().contains("'uris' = 'b-3:9092'"));
        assert!(!statement.sql().contains("'type'"));
    }

    #[test]
    fn test_updatable_attributes() {
        let schema = STORE.schema();
        assert!(schema.attributes["uris"].updatable);
        assert!(schema.attributes["properties"].updatable);
        assert!(!schema.attributes["type"].updatable);
    }

    #[test]
    fn test_readiness() {
        let row = Row::new().with("name", "kafka").with("state", "failed");
        assert_eq!(
            STORE.readiness(&STORE.observe(&row)),
            Readiness::Failed("failed".to_string())
        );
    }
}
