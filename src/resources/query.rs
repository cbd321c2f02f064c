//! `streamsql_query`: a continuous `INSERT INTO ... SELECT` query.
//!
//! Queries are the one kind whose identity the catalog assigns: the create
//! statement returns the new query id. Deleting a query terminates it; a
//! terminated query may stay listed for a while.

use crate::catalog::sql::{quote_ident, split_qualified};
use crate::catalog::{ErrorCode, Row, Statement};
use crate::error::ProviderError;
use crate::schema::{Attribute, Schema};
use crate::types::{AttrValue, Attributes, Identity};

use super::relation::{explain, PlannedTarget};
use super::{
    copy_columns, known_string, state_readiness, with_common_attributes, Readiness, ResourceKind,
};

/// A continuous query.
pub struct QueryResource;

/// The query kind.
pub static QUERY: QueryResource = QueryResource;

impl ResourceKind for QueryResource {
    fn kind(&self) -> &'static str {
        "query"
    }

    fn plural(&self) -> &'static str {
        "queries"
    }

    fn schema(&self) -> Schema {
        with_common_attributes(
            Schema::v0()
                .with_description("A continuous query writing into a sink relation")
                .with_attribute(
                    "query_id",
                    Attribute::computed_string().with_description("Identifier assigned on creation"),
                )
                .with_attribute(
                    "sql",
                    Attribute::required_string().with_description("INSERT INTO statement"),
                )
                .with_attribute(
                    "sink_relation",
                    Attribute::optional_string()
                        .with_description("Fully qualified relation the query must write into"),
                )
                .with_attribute("state", Attribute::computed_string())
                .with_attribute("desired_state", Attribute::computed_string()),
        )
    }

    fn identity_attributes(&self) -> &'static [&'static str] {
        &["query_id"]
    }

    fn absent_codes(&self) -> &'static [ErrorCode] {
        &[ErrorCode::InvalidQuery]
    }

    fn failed_to_provision(&self) -> &'static str {
        "query failed to start"
    }

    fn declared_identity(&self, _desired: &Attributes) -> Result<Option<Identity>, ProviderError> {
        Ok(None)
    }

    fn plan_statement(&self, desired: &Attributes) -> Result<Option<Statement>, ProviderError> {
        Ok(Some(explain(&known_string(self, desired, "sql")?)))
    }

    fn check_plan(
        &self,
        _declared: Option<&Identity>,
        desired: &Attributes,
        plan: &[Row],
    ) -> Result<Attributes, ProviderError> {
        let targets: Vec<PlannedTarget> = plan.iter().filter_map(PlannedTarget::from_row).collect();
        if targets.is_empty() {
            return Err(ProviderError::Validation(
                "the query statement does not write into any relation".to_string(),
            ));
        }

        let sink = match desired.string("sink_relation") {
            AttrValue::Known(sink) => sink,
            AttrValue::Unset => return Ok(Attributes::new()),
            AttrValue::Pending => {
                return Err(ProviderError::Validation(
                    "'sink_relation' must be known before the query can be created".to_string(),
                ))
            }
        };
        let parts = split_qualified(&sink);
        let [database, schema, name] = parts.as_slice() else {
            return Err(ProviderError::Validation(format!(
                "'sink_relation' must be of the form database.schema.name, got '{}'",
                sink
            )));
        };

        if targets.iter().any(|t| t.matches(database, schema, name)) {
            Ok(Attributes::new())
        } else {
            let planned: Vec<String> = targets.iter().map(PlannedTarget::fqn).collect();
            Err(ProviderError::Validation(format!(
                "the query writes into {} but the resource declares sink {}",
                planned.join(", "),
                sink
            )))
        }
    }

    fn create_statement(
        &self,
        _identity: Option<&Identity>,
        desired: &Attributes,
    ) -> Result<Statement, ProviderError> {
        Ok(Statement::new(known_string(self, desired, "sql")?))
    }

    fn created_identity(
        &self,
        _declared: Option<Identity>,
        created: &[Row],
    ) -> Result<Identity, ProviderError> {
        created
            .iter()
            .find_map(|row| row.text("query_id"))
            .map(|id| Identity::new().with("query_id", id))
            .ok_or_else(|| {
                ProviderError::FailedPrecondition(
                    "the catalog did not return an id for the new query".to_string(),
                )
            })
    }

    fn list_statement(&self, _scope: &Identity) -> Statement {
        Statement::new("LIST QUERIES")
    }

    fn matches(&self, identity: &Identity, row: &Row) -> bool {
        identity.get("query_id").is_some() && identity.get("query_id") == row.text("id")
    }

    fn observe(&self, row: &Row) -> Attributes {
        copy_columns(
            row,
            &[
                ("id", "query_id"),
                ("actual_state", "state"),
                ("desired_state", "desired_state"),
                ("sql", "sql"),
                ("owner", "owner"),
                ("created_at", "created_at"),
                ("updated_at", "updated_at"),
            ],
        )
    }

    fn readiness(&self, observed: &Attributes) -> Readiness {
        state_readiness(observed, "running", &["errored"])
    }

    fn is_deleted(&self, observed: &Attributes) -> bool {
        matches!(observed.string("state"), AttrValue::Known(s) if s.eq_ignore_ascii_case("terminated"))
    }

    fn drop_statement(&self, identity: &Identity, _attrs: &Attributes) -> Statement {
        Statement::new(format!(
            "TERMINATE QUERY {}",
            quote_ident(identity.get("query_id").unwrap_or_default())
        ))
    }
}
