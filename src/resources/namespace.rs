//! `streamsql_schema`: a namespace of relations inside a database.

use crate::catalog::sql::{qualified, quote_ident};
use crate::catalog::{ErrorCode, Row, Statement};
use crate::error::ProviderError;
use crate::schema::{Attribute, Schema};
use crate::types::{Attributes, Identity};

use super::database::DATABASE;
use super::{copy_columns, declared, with_common_attributes, ResourceKind, COMMON_COLUMNS};

/// A schema within a database.
pub struct SchemaResource;

/// The schema kind.
pub static SCHEMA: SchemaResource = SchemaResource;

impl ResourceKind for SchemaResource {
    fn kind(&self) -> &'static str {
        "schema"
    }

    fn plural(&self) -> &'static str {
        "schemas"
    }

    fn schema(&self) -> Schema {
        with_common_attributes(
            Schema::v0()
                .with_description("A schema grouping relations inside a database")
                .with_attribute(
                    "database",
                    Attribute::required_string().with_description("Enclosing database"),
                )
                .with_attribute(
                    "name",
                    Attribute::required_string().with_description("Schema name"),
                ),
        )
    }

    fn identity_attributes(&self) -> &'static [&'static str] {
        &["database", "name"]
    }

    fn scope_attributes(&self) -> &'static [&'static str] {
        &["database"]
    }

    fn absent_codes(&self) -> &'static [ErrorCode] {
        &[ErrorCode::InvalidDatabase, ErrorCode::InvalidSchema]
    }

    fn failed_to_provision(&self) -> &'static str {
        "schema failed to be created"
    }

    fn parent(&self, identity: &Identity) -> Option<(&'static dyn ResourceKind, Identity)> {
        let database = identity.get("database")?;
        Some((&DATABASE, Identity::new().with("name", database)))
    }

    fn create_statement(
        &self,
        identity: Option<&Identity>,
        _desired: &Attributes,
    ) -> Result<Statement, ProviderError> {
        let identity = declared(identity)?;
        Ok(Statement::new(format!(
            "CREATE SCHEMA {} IN DATABASE {}",
            quote_ident(identity.get("name").unwrap_or_default()),
            quote_ident(identity.get("database").unwrap_or_default()),
        )))
    }

    fn list_statement(&self, scope: &Identity) -> Statement {
        Statement::new(format!(
            "LIST SCHEMAS IN DATABASE {}",
            quote_ident(scope.get("database").unwrap_or_default())
        ))
    }

    fn observe(&self, row: &Row) -> Attributes {
        copy_columns(row, &COMMON_COLUMNS)
    }

    fn drop_statement(&self, identity: &Identity, _attrs: &Attributes) -> Statement {
        Statement::new(format!("DROP SCHEMA {}", qualified(&identity.values())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> Identity {
        Identity::new().with("database", "db").with("name", "public")
    }

    #[test]
    fn test_statements() {
        assert_eq!(
            SCHEMA
                .create_statement(Some(&identity()), &Attributes::new())
                .unwrap()
                .sql(),
            "CREATE SCHEMA \"public\" IN DATABASE \"db\""
        );
        assert_eq!(
            SCHEMA.list_statement(&identity()).sql(),
            "LIST SCHEMAS IN DATABASE \"db\""
        );
        assert_eq!(
            SCHEMA.drop_statement(&identity(), &Attributes::new()).sql(),
            "DROP SCHEMA \"db\".\"public\""
        );
    }

    #[test]
    fn test_parent_is_the_database() {
        let (kind, parent) = SCHEMA.parent(&identity()).unwrap();
        assert_eq!(kind.kind(), "database");
        assert_eq!(parent.to_string(), "db");
    }

    #[test]
    fn test_absent_codes_cover_the_scope() {
        let codes = SCHEMA.absent_codes();
        assert!(codes.contains(&ErrorCode::InvalidDatabase));
        assert!(codes.contains(&ErrorCode::InvalidSchema));
    }
}
