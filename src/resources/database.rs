//! `streamsql_database`

use crate::catalog::sql::quote_ident;
use crate::catalog::{ErrorCode, Row, Statement};
use crate::error::ProviderError;
use crate::schema::{Attribute, Schema};
use crate::types::{Attributes, Identity};

use super::{copy_columns, declared, with_common_attributes, ResourceKind, COMMON_COLUMNS};

/// A top-level database.
pub struct DatabaseResource;

/// The database kind.
pub static DATABASE: DatabaseResource = DatabaseResource;

impl ResourceKind for DatabaseResource {
    fn kind(&self) -> &'static str {
        "database"
    }

    fn plural(&self) -> &'static str {
        "databases"
    }

    fn schema(&self) -> Schema {
        with_common_attributes(
            Schema::v0()
                .with_description("A database holding schemas of relations")
                .with_attribute(
                    "name",
                    Attribute::required_string().with_description("Database name"),
                ),
        )
    }

    fn identity_attributes(&self) -> &'static [&'static str] {
        &["name"]
    }

    fn absent_codes(&self) -> &'static [ErrorCode] {
        &[ErrorCode::InvalidDatabase]
    }

    fn failed_to_provision(&self) -> &'static str {
        "database failed to be created"
    }

    fn create_statement(
        &self,
        identity: Option<&Identity>,
        _desired: &Attributes,
    ) -> Result<Statement, ProviderError> {
        Ok(Statement::new(format!(
            "CREATE DATABASE {}",
            declared(identity)?.qualified()
        )))
    }

    fn list_statement(&self, _scope: &Identity) -> Statement {
        Statement::new("LIST DATABASES")
    }

    fn observe(&self, row: &Row) -> Attributes {
        copy_columns(row, &COMMON_COLUMNS)
    }

    fn drop_statement(&self, identity: &Identity, _attrs: &Attributes) -> Statement {
        let name = identity.get("name").unwrap_or_default();
        Statement::new(format!("DROP DATABASE {}", quote_ident(name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::Readiness;

    #[test]
    fn test_statements() {
        let identity = Identity::new().with("name", "db1");
        assert_eq!(
            DATABASE
                .create_statement(Some(&identity), &Attributes::new())
                .unwrap()
                .sql(),
            "CREATE DATABASE \"db1\""
        );
        assert_eq!(
            DATABASE.drop_statement(&identity, &Attributes::new()).sql(),
            "DROP DATABASE \"db1\""
        );
        assert_eq!(DATABASE.list_statement(&identity).sql(), "LIST DATABASES");
    }

    #[test]
    fn test_create_requires_identity() {
        assert!(matches!(
            DATABASE.create_statement(None, &Attributes::new()),
            Err(ProviderError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_listed_means_ready() {
        let row = Row::new()
            .with("name", "db1")
            .with("owner", "sysadmin")
            .with("is_default", false);
        let observed = DATABASE.observe(&row);

        assert_eq!(observed.string("owner").known().as_deref(), Some("sysadmin"));
        assert!(observed.raw("is_default").is_none());
        assert_eq!(DATABASE.readiness(&observed), Readiness::Ready);
        assert!(DATABASE.matches(&Identity::new().with("name", "db1"), &row));
        assert!(!DATABASE.matches(&Identity::new().with("name", "db2"), &row));
    }

    #[test]
    fn test_quoting_in_drop() {
        let identity = Identity::new().with("name", "we\"ird");
        assert_eq!(
            DATABASE.drop_statement(&identity, &Attributes::new()).sql(),
            "DROP DATABASE \"we\"\"ird\""
        );
    }
}
