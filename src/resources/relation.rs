//! `streamsql_relation`: a stream or changelog created from a user statement.
//!
//! The statement is planned with `EXPLAIN` first. The plan reports the
//! relation the statement would create; if that is not the relation the
//! resource declares, nothing is executed.

use crate::catalog::sql::qualified;
use crate::catalog::{ErrorCode, Row, Statement};
use crate::error::ProviderError;
use crate::schema::{Attribute, Schema};
use crate::types::{Attributes, Identity};

use super::namespace::SCHEMA;
use super::{
    copy_columns, known_string, state_readiness, with_common_attributes, Readiness, ResourceKind,
    COMMON_COLUMNS,
};

/// A relation within a schema.
pub struct RelationResource;

/// The relation kind.
pub static RELATION: RelationResource = RelationResource;

/// Relation type used in drop statements when the type was never observed.
const FALLBACK_TYPE: &str = "RELATION";

/// Target reported by one row of an `EXPLAIN` plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PlannedTarget {
    pub database: String,
    pub schema: String,
    pub name: String,
    pub relation_type: Option<String>,
}

impl PlannedTarget {
    pub(crate) fn from_row(row: &Row) -> Option<Self> {
        Some(Self {
            database: row.text("database_name")?.to_string(),
            schema: row.text("schema_name")?.to_string(),
            name: row.text("name")?.to_string(),
            relation_type: row.text("relation_type").map(str::to_string),
        })
    }

    pub(crate) fn matches(&self, database: &str, schema: &str, name: &str) -> bool {
        self.database == database && self.schema == schema && self.name == name
    }

    pub(crate) fn fqn(&self) -> String {
        format!("{}.{}.{}", self.database, self.schema, self.name)
    }
}

/// `EXPLAIN <sql>` for a user statement.
pub(crate) fn explain(sql: &str) -> Statement {
    Statement::new(format!("EXPLAIN {}", sql.trim().trim_end_matches(';')))
}

impl ResourceKind for RelationResource {
    fn kind(&self) -> &'static str {
        "relation"
    }

    fn plural(&self) -> &'static str {
        "relations"
    }

    fn schema(&self) -> Schema {
        with_common_attributes(
            Schema::v0()
                .with_description("A stream or changelog defined by a CREATE statement")
                .with_attribute("database", Attribute::required_string())
                .with_attribute("schema", Attribute::required_string())
                .with_attribute("name", Attribute::required_string())
                .with_attribute(
                    "sql",
                    Attribute::required_string()
                        .with_description("Statement creating the relation"),
                )
                .with_attribute(
                    "type",
                    Attribute::computed_string().with_description("Relation type, e.g. stream"),
                )
                .with_attribute("state", Attribute::computed_string()),
        )
    }

    fn identity_attributes(&self) -> &'static [&'static str] {
        &["database", "schema", "name"]
    }

    fn scope_attributes(&self) -> &'static [&'static str] {
        &["database", "schema"]
    }

    fn absent_codes(&self) -> &'static [ErrorCode] {
        &[
            ErrorCode::InvalidDatabase,
            ErrorCode::InvalidSchema,
            ErrorCode::InvalidRelation,
        ]
    }

    fn failed_to_provision(&self) -> &'static str {
        "relation failed to be created"
    }

    fn parent(&self, identity: &Identity) -> Option<(&'static dyn ResourceKind, Identity)> {
        let parent = Identity::new()
            .with("database", identity.get("database")?)
            .with("name", identity.get("schema")?);
        Some((&SCHEMA, parent))
    }

    fn plan_statement(&self, desired: &Attributes) -> Result<Option<Statement>, ProviderError> {
        Ok(Some(explain(&known_string(self, desired, "sql")?)))
    }

    fn check_plan(
        &self,
        declared: Option<&Identity>,
        _desired: &Attributes,
        plan: &[Row],
    ) -> Result<Attributes, ProviderError> {
        let identity = super::declared(declared)?;
        let target = plan.iter().find_map(PlannedTarget::from_row).ok_or_else(|| {
            ProviderError::Validation(format!(
                "the statement for relation {} does not create a relation",
                identity
            ))
        })?;

        let expected = identity.values();
        if !target.matches(expected[0], expected[1], expected[2]) {
            return Err(ProviderError::Validation(format!(
                "the statement creates relation {} but the resource declares {}",
                target.fqn(),
                identity
            )));
        }

        Ok(target
            .relation_type
            .map(|t| Attributes::new().with("type", t.to_ascii_lowercase()))
            .unwrap_or_default())
    }

    fn create_statement(
        &self,
        _identity: Option<&Identity>,
        desired: &Attributes,
    ) -> Result<Statement, ProviderError> {
        Ok(Statement::new(known_string(self, desired, "sql")?))
    }

    fn list_statement(&self, scope: &Identity) -> Statement {
        let scope: Vec<&str> = ["database", "schema"]
            .iter()
            .filter_map(|key| scope.get(key))
            .collect();
        Statement::new(format!("LIST RELATIONS IN SCHEMA {}", qualified(&scope)))
    }

    fn observe(&self, row: &Row) -> Attributes {
        let mut observed = copy_columns(row, &COMMON_COLUMNS);
        observed.merge(&copy_columns(row, &[("type", "type"), ("state", "state")]));
        observed
    }

    fn readiness(&self, observed: &Attributes) -> Readiness {
        state_readiness(observed, "created", &["errored"])
    }

    fn drop_statement(&self, identity: &Identity, attrs: &Attributes) -> Statement {
        let relation_type = attrs
            .string("type")
            .known()
            .and_then(|t| super::keyword("type", &t).ok())
            .unwrap_or_else(|| FALLBACK_TYPE.to_string());
        Statement::new(format!("DROP {} {}", relation_type, identity.qualified()))
    }
}
