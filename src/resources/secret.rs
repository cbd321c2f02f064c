//! `streamsql_secret`

use std::collections::BTreeMap;

use crate::catalog::sql::{quote_ident, with_clause, PropertyValue};
use crate::catalog::{ErrorCode, Row, Statement};
use crate::error::ProviderError;
use crate::schema::{Attribute, Schema};
use crate::types::{AttrValue, Attributes, Identity};

use super::{
    copy_columns, declared, keyword, known_string, state_readiness, with_common_attributes,
    Readiness, ResourceKind, COMMON_COLUMNS,
};

/// A named secret referenced by stores and schema registries.
pub struct SecretResource;

/// The secret kind.
pub static SECRET: SecretResource = SecretResource;

impl ResourceKind for SecretResource {
    fn kind(&self) -> &'static str {
        "secret"
    }

    fn plural(&self) -> &'static str {
        "secrets"
    }

    fn schema(&self) -> Schema {
        with_common_attributes(
            Schema::v0()
                .with_description("A secret value stored in the catalog")
                .with_attribute("name", Attribute::required_string())
                .with_attribute(
                    "type",
                    Attribute::required_string().with_description("Secret type, e.g. GENERIC_STRING"),
                )
                .with_attribute("description", Attribute::optional_string())
                .with_attribute(
                    "string_value",
                    Attribute::optional_string()
                        .sensitive()
                        .with_description("Secret payload; never read back"),
                )
                .with_attribute("state", Attribute::computed_string()),
        )
    }

    fn identity_attributes(&self) -> &'static [&'static str] {
        &["name"]
    }

    fn absent_codes(&self) -> &'static [ErrorCode] {
        &[ErrorCode::InvalidSecret]
    }

    fn failed_to_provision(&self) -> &'static str {
        "secret failed to become ready"
    }

    fn create_statement(
        &self,
        identity: Option<&Identity>,
        desired: &Attributes,
    ) -> Result<Statement, ProviderError> {
        let mut props = BTreeMap::new();
        props.insert(
            "type".to_string(),
            PropertyValue::Keyword(keyword("type", &known_string(self, desired, "type")?)?),
        );
        for field in ["description", "string_value"] {
            match desired.string(field) {
                AttrValue::Known(value) => {
                    props.insert(field.to_string(), PropertyValue::Literal(value));
                }
                AttrValue::Pending => {
                    return Err(ProviderError::Validation(format!(
                        "'{}' must be known before the secret can be created",
                        field
                    )))
                }
                AttrValue::Unset => {}
            }
        }

        Ok(Statement::new(format!(
            "CREATE SECRET {}{}",
            declared(identity)?.qualified(),
            with_clause(&props)
        ))
        .sensitive())
    }

    fn list_statement(&self, _scope: &Identity) -> Statement {
        Statement::new("LIST SECRETS")
    }

    fn observe(&self, row: &Row) -> Attributes {
        let mut observed = copy_columns(row, &COMMON_COLUMNS);
        observed.merge(&copy_columns(
            row,
            &[("type", "type"), ("description", "description"), ("status", "state")],
        ));
        observed
    }

    fn readiness(&self, observed: &Attributes) -> Readiness {
        state_readiness(observed, "ready", &["failed"])
    }

    fn drop_statement(&self, identity: &Identity, _attrs: &Attributes) -> Statement {
        Statement::new(format!(
            "DROP SECRET {}",
            quote_ident(identity.get("name").unwrap_or_default())
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_is_redacted() {
        let desired = Attributes::new()
            .with("name", "api")
            .with("type", "generic_string")
            .with("string_value", "s3cr3t");
        let identity = Identity::new().with("name", "api");
        let statement = SECRET.create_statement(Some(&identity), &desired).unwrap();

        assert_eq!(
            statement.sql(),
            "CREATE SECRET \"api\" WITH ('string_value' = 's3cr3t', 'type' = GENERIC_STRING)"
        );
        assert_eq!(
            statement.to_string(),
            "CREATE SECRET \"api\" WITH (<redacted>)"
        );
    }

    #[test]
    fn test_pending_payload_is_rejected() {
        let desired = Attributes::new()
            .with("name", "api")
            .with("type", "GENERIC_STRING")
            .with("string_value", crate::types::UNKNOWN_VALUE);
        let identity = Identity::new().with("name", "api");
        assert!(matches!(
            SECRET.create_statement(Some(&identity), &desired),
            Err(ProviderError::Validation(_))
        ));
    }

    #[test]
    fn test_observe_never_reads_the_payload() {
        let row = Row::new()
            .with("name", "api")
            .with("type", "GENERIC_STRING")
            .with("status", "ready")
            .with("string_value", "leaked");
        let observed = SECRET.observe(&row);

        assert!(observed.raw("string_value").is_none());
        assert_eq!(SECRET.readiness(&observed), Readiness::Ready);
    }

    #[test]
    fn test_payload_is_sensitive() {
        assert!(SECRET.schema().attributes["string_value"].flags.sensitive);
    }
}
