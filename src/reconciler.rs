//! The generic create/poll/rollback routine.
//!
//! A [`Reconciler`] drives one remote object at a time. It is parameterized
//! by a [`ResourceKind`], which supplies the statements and the terminal-state
//! predicates; the sequencing, polling, rollback and error classification live
//! here once for every kind.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::catalog::{CatalogClient, CatalogError, ErrorCode, Row, SessionContext, Statement};
use crate::error::ProviderError;
use crate::resources::{computed_view, Readiness, ResourceKind};
use crate::retry::{poll_until, Probe, RetryPolicy};
use crate::types::{AttrValue, Attributes, Identity};

/// Result of looking an object up in the catalog.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    /// The object is listed; carries its observed attributes.
    Found(Attributes),
    /// The object (or its scope) does not exist.
    Missing,
}

enum Failure {
    Catalog(CatalogError),
    Cancelled,
}

impl Failure {
    fn into_error(self, context: String) -> ProviderError {
        match self {
            Self::Catalog(source) => ProviderError::remote(context, source),
            Self::Cancelled => ProviderError::Cancelled(format!("{}: operation cancelled", context)),
        }
    }
}

/// Drives remote objects to their desired state.
pub struct Reconciler {
    client: Arc<dyn CatalogClient>,
    session: SessionContext,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl Reconciler {
    /// Create a reconciler issuing statements through `client`.
    ///
    /// `session` is the base context (organization and default role); each
    /// statement gets its own copy with the kind's scope applied.
    pub fn new(
        client: Arc<dyn CatalogClient>,
        session: SessionContext,
        policy: RetryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            session,
            policy,
            cancel,
        }
    }

    async fn execute(
        &self,
        session: &SessionContext,
        statement: &Statement,
    ) -> Result<Vec<Row>, Failure> {
        debug!(statement = %statement, role = ?session.role, database = ?session.database, "executing");
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Failure::Cancelled),
            result = self.client.query(session, statement) => result.map_err(Failure::Catalog),
        }
    }

    /// Create the object described by `desired` and wait until it is ready.
    ///
    /// Returns the desired attributes merged with what the catalog reports.
    /// If the object was created but never became ready, one drop statement
    /// is issued before the error is returned.
    pub async fn provision(
        &self,
        kind: &dyn ResourceKind,
        desired: &Attributes,
    ) -> Result<Attributes, ProviderError> {
        let declared = kind.declared_identity(desired)?;
        let label = match &declared {
            Some(identity) => format!("{} {}", kind.kind(), identity),
            None => format!("new {}", kind.kind()),
        };

        if let Some((parent_kind, parent)) = declared.as_ref().and_then(|id| kind.parent(id)) {
            self.require(parent_kind, &parent).await?;
        }

        let session = kind.session(declared.as_ref(), desired, &self.session);
        let mut working = desired.clone();

        if let Some(plan) = kind.plan_statement(desired)? {
            let rows = self
                .execute(&session, &plan)
                .await
                .map_err(|f| f.into_error(format!("failed to plan {}", label)))?;
            let learned = kind.check_plan(declared.as_ref(), desired, &rows)?;
            working.merge(&learned);
        }

        let create = kind.create_statement(declared.as_ref(), &working)?;
        info!(kind = kind.kind(), statement = %create, "provisioning");
        let created = self
            .execute(&session, &create)
            .await
            .map_err(|f| f.into_error(format!("failed to create {}", label)))?;
        let identity = kind.created_identity(declared, &created)?;
        working.merge(&identity.to_attributes());

        match self.await_ready(kind, &identity).await {
            Ok(observed) => {
                info!(kind = kind.kind(), identity = %identity, "provisioned");
                working.merge(&computed_view(kind, &observed));
                working.resolve_pending();
                Ok(working)
            }
            Err(err @ ProviderError::Cancelled(_)) => {
                warn!(
                    kind = kind.kind(),
                    identity = %identity,
                    "cancelled while waiting for readiness; the object may exist without being tracked"
                );
                Err(err)
            }
            Err(err) => {
                self.rollback(kind, &identity, &working).await;
                Err(err)
            }
        }
    }

    async fn await_ready(
        &self,
        kind: &dyn ResourceKind,
        identity: &Identity,
    ) -> Result<Attributes, ProviderError> {
        let failure = kind.failed_to_provision();
        poll_until(&self.policy, &self.cancel, failure, |_| async move {
            let observed = match self.refresh(kind, identity).await? {
                Observation::Missing => return Ok(Probe::Pending("absent".to_string())),
                Observation::Found(observed) => observed,
            };
            Ok(match kind.readiness(&observed) {
                Readiness::Ready => Probe::Ready(observed),
                Readiness::Pending(state) => Probe::Pending(state),
                Readiness::Failed(state) => Probe::Failed(ProviderError::FailedPrecondition(
                    format!("{}: {} {} is '{}'", failure, kind.kind(), identity, state),
                )),
            })
        })
        .await
    }

    async fn rollback(&self, kind: &dyn ResourceKind, identity: &Identity, attrs: &Attributes) {
        let session = kind.session(Some(identity), attrs, &self.session);
        let statement = kind.drop_statement(identity, attrs);
        warn!(kind = kind.kind(), identity = %identity, statement = %statement, "rolling back");

        match self.execute(&session, &statement).await {
            Ok(_) => info!(kind = kind.kind(), identity = %identity, "rolled back"),
            Err(Failure::Catalog(e)) if e.is_any(kind.absent_codes()) => {
                info!(kind = kind.kind(), identity = %identity, "nothing to roll back")
            }
            Err(Failure::Catalog(e)) => error!(
                kind = kind.kind(),
                identity = %identity,
                error = %e,
                "rollback failed; the object may still exist"
            ),
            Err(Failure::Cancelled) => error!(
                kind = kind.kind(),
                identity = %identity,
                "rollback cancelled; the object may still exist"
            ),
        }
    }

    /// Drop the object and wait until the catalog no longer lists it.
    ///
    /// An object that is already absent counts as deleted.
    pub async fn deprovision(
        &self,
        kind: &dyn ResourceKind,
        identity: &Identity,
        state: &Attributes,
    ) -> Result<(), ProviderError> {
        let session = kind.session(Some(identity), state, &self.session);
        let statement = kind.drop_statement(identity, state);
        info!(kind = kind.kind(), statement = %statement, "deprovisioning");

        match self.execute(&session, &statement).await {
            Ok(_) => {}
            Err(Failure::Catalog(e)) if e.is_any(kind.absent_codes()) => {
                info!(kind = kind.kind(), identity = %identity, "already absent");
                return Ok(());
            }
            Err(Failure::Catalog(e)) if e.code == ErrorCode::DependentObjectsStillExist => {
                return Err(ProviderError::FailedPrecondition(format!(
                    "cannot delete {} {}: {}",
                    kind.kind(),
                    identity,
                    e.message
                )));
            }
            Err(f) => return Err(f.into_error(format!("failed to delete {} {}", kind.kind(), identity))),
        }

        let failure = format!("{} {} not yet deleted", kind.kind(), identity);
        poll_until(&self.policy, &self.cancel, &failure, |_| async move {
            Ok(match self.refresh(kind, identity).await? {
                Observation::Missing => Probe::Ready(()),
                Observation::Found(observed) if kind.is_deleted(&observed) => Probe::Ready(()),
                Observation::Found(observed) => Probe::Pending(
                    observed.string("state").known().unwrap_or_else(|| "present".to_string()),
                ),
            })
        })
        .await
    }

    /// Look the object up with a single list query.
    pub async fn refresh(
        &self,
        kind: &dyn ResourceKind,
        identity: &Identity,
    ) -> Result<Observation, ProviderError> {
        let session = kind.session(Some(identity), &Attributes::new(), &self.session);
        match self.execute(&session, &kind.list_statement(identity)).await {
            Ok(rows) => Ok(rows
                .iter()
                .find(|row| kind.matches(identity, row))
                .map_or(Observation::Missing, |row| Observation::Found(kind.observe(row)))),
            Err(Failure::Catalog(e)) if e.is_any(kind.absent_codes()) => Ok(Observation::Missing),
            Err(f) => Err(f.into_error(format!("failed to read {} {}", kind.kind(), identity))),
        }
    }

    /// Like [`refresh`](Self::refresh), but a missing object is an error.
    pub async fn require(
        &self,
        kind: &dyn ResourceKind,
        identity: &Identity,
    ) -> Result<Attributes, ProviderError> {
        match self.refresh(kind, identity).await? {
            Observation::Found(observed) => Ok(observed),
            Observation::Missing => Err(ProviderError::NotFound(format!(
                "{} {} does not exist",
                kind.kind(),
                identity
            ))),
        }
    }

    /// Every object listed in `scope`.
    pub async fn list(
        &self,
        kind: &dyn ResourceKind,
        scope: &Identity,
    ) -> Result<Vec<Attributes>, ProviderError> {
        let session = kind.session(Some(scope), &Attributes::new(), &self.session);
        match self.execute(&session, &kind.list_statement(scope)).await {
            Ok(rows) => Ok(rows.iter().map(|row| kind.observe(row)).collect()),
            Err(Failure::Catalog(e)) if e.is_any(kind.absent_codes()) => Err(
                ProviderError::NotFound(format!("scope {} of {} does not exist", scope, kind.plural())),
            ),
            Err(f) => Err(f.into_error(format!("failed to list {}", kind.plural()))),
        }
    }

    /// Apply changes to updatable attributes, then resync from the catalog.
    pub async fn update(
        &self,
        kind: &dyn ResourceKind,
        prior: &Attributes,
        planned: &Attributes,
    ) -> Result<Attributes, ProviderError> {
        let changed = check_update(kind, prior, planned)?;
        let identity = kind.identity(prior)?;

        if !changed.is_empty() {
            let statement = kind.update_statement(&identity, prior, planned)?.ok_or_else(|| {
                ProviderError::Unimplemented(format!(
                    "{} does not support in-place updates of {}",
                    kind.kind(),
                    changed.join(", ")
                ))
            })?;
            let session = kind.session(Some(&identity), prior, &self.session);
            info!(kind = kind.kind(), identity = %identity, changed = ?changed, statement = %statement, "updating");
            match self.execute(&session, &statement).await {
                Ok(_) => {}
                Err(Failure::Catalog(e)) if e.is_any(kind.absent_codes()) => {
                    return Err(ProviderError::NotFound(format!(
                        "{} {} no longer exists",
                        kind.kind(),
                        identity
                    )))
                }
                Err(f) => {
                    return Err(f.into_error(format!("failed to update {} {}", kind.kind(), identity)))
                }
            }
            self.await_ready(kind, &identity).await?;
        }

        let observed = self.require(kind, &identity).await?;
        let mut state = planned.clone();
        state.merge(&computed_view(kind, &observed));
        state.resolve_pending();
        Ok(state)
    }
}

/// Check a planned change against the prior state without touching the catalog.
///
/// Returns the updatable attributes that differ.
///
/// # Errors
///
/// - [`ProviderError::Validation`] if an identity attribute or an immutable
///   attribute differs
/// - [`ProviderError::Unimplemented`] if the owner differs
pub fn check_update(
    kind: &dyn ResourceKind,
    prior: &Attributes,
    planned: &Attributes,
) -> Result<Vec<String>, ProviderError> {
    let differs = |name: &str| {
        if planned.is_pending(name) {
            return false;
        }
        let before = prior.raw(name).filter(|v| !v.is_null());
        let after = planned.raw(name).filter(|v| !v.is_null());
        before != after
    };
    let identity = kind.identity_attributes();

    if let Some(name) = identity.iter().find(|name| differs(name)) {
        return Err(ProviderError::Validation(format!(
            "'{}' of {} '{}' cannot change; identity attributes are fixed at creation, replace the resource instead",
            name,
            kind.kind(),
            prior.string(name).known().unwrap_or_default()
        )));
    }

    if differs("owner") {
        let target = match planned.string("owner") {
            AttrValue::Known(owner) => owner,
            _ => "the default role".to_string(),
        };
        return Err(ProviderError::Unimplemented(format!(
            "transferring ownership of {} to {} is not supported",
            kind.kind(),
            target
        )));
    }

    let mut changed = Vec::new();
    for (name, attr) in kind.schema().attributes {
        if attr.flags.is_computed_only() || identity.contains(&name.as_str()) || name == "owner" {
            continue;
        }
        if !differs(&name) {
            continue;
        }
        if !attr.updatable {
            return Err(ProviderError::Validation(format!(
                "'{}' cannot be changed after the {} is created",
                name,
                kind.kind()
            )));
        }
        changed.push(name);
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::resources::{database::DATABASE, namespace::SCHEMA, query::QUERY, relation::RELATION, store::STORE};
    use crate::testing::MockCatalog;
    use crate::types::UNKNOWN_VALUE;

    fn reconciler(catalog: &Arc<MockCatalog>) -> Reconciler {
        Reconciler::new(
            catalog.clone(),
            SessionContext::new().with_role("sysadmin"),
            RetryPolicy::default(),
            CancellationToken::new(),
        )
    }

    fn database_row(name: &str) -> Row {
        Row::new()
            .with("name", name)
            .with("owner", "sysadmin")
            .with("created_at", "2024-05-01T10:00:00Z")
            .with("updated_at", "2024-05-01T10:00:00Z")
    }

    #[tokio::test(start_paused = true)]
    async fn test_database_ready_on_second_poll() {
        let catalog = Arc::new(MockCatalog::new());
        catalog
            .on("LIST DATABASES", Ok(vec![]))
            .on("LIST DATABASES", Ok(vec![database_row("db1")]));

        let desired = Attributes::new()
            .with("name", "db1")
            .with("owner", UNKNOWN_VALUE)
            .with("created_at", UNKNOWN_VALUE);
        let state = reconciler(&catalog).provision(&DATABASE, &desired).await.unwrap();

        assert_eq!(state.string("owner").known().as_deref(), Some("sysadmin"));
        assert_eq!(
            state.string("created_at").known().as_deref(),
            Some("2024-05-01T10:00:00Z")
        );
        assert_eq!(catalog.count("CREATE DATABASE"), 1);
        assert_eq!(catalog.count("LIST DATABASES"), 2);
        assert_eq!(catalog.count("DROP"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_rolls_back_exactly_once() {
        let catalog = Arc::new(MockCatalog::new());
        catalog.on("LIST DATABASES", Ok(vec![]));

        let desired = Attributes::new().with("name", "db1");
        let err = reconciler(&catalog).provision(&DATABASE, &desired).await.unwrap_err();

        assert!(matches!(err, ProviderError::DeadlineExceeded(_)));
        assert_eq!(catalog.count("DROP DATABASE"), 1);
        assert_eq!(catalog.executed().last().map(|s| s.sql().to_string()), Some("DROP DATABASE \"db1\"".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_rollback_keeps_original_error() {
        let catalog = Arc::new(MockCatalog::new());
        catalog
            .on("LIST DATABASES", Ok(vec![]))
            .on("DROP DATABASE", Err(CatalogError::connection("connection reset")));

        let desired = Attributes::new().with("name", "db1");
        let err = reconciler(&catalog).provision(&DATABASE, &desired).await.unwrap_err();

        assert!(matches!(err, ProviderError::DeadlineExceeded(_)));
        assert_eq!(catalog.count("DROP DATABASE"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_that_never_runs_is_terminated() {
        let catalog = Arc::new(MockCatalog::new());
        catalog
            .on("EXPLAIN", Ok(vec![crate::testing::plan_row("db", "public", "sink")]))
            .on("INSERT INTO", Ok(vec![Row::new().with("query_id", "q1")]))
            .on(
                "LIST QUERIES",
                Ok(vec![Row::new().with("id", "q1").with("actual_state", "starting")]),
            );

        let desired = Attributes::new()
            .with("sql", "INSERT INTO sink SELECT * FROM pageviews;")
            .with("sink_relation", "db.public.sink");
        let err = reconciler(&catalog).provision(&QUERY, &desired).await.unwrap_err();

        assert!(matches!(err, ProviderError::DeadlineExceeded(_)));
        assert!(err.message().starts_with("query failed to start"));
        assert_eq!(catalog.count("TERMINATE QUERY"), 1);
        assert_eq!(
            catalog.statements_matching("TERMINATE QUERY"),
            vec!["TERMINATE QUERY \"q1\"".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_errored_query_rolls_back_without_waiting() {
        let catalog = Arc::new(MockCatalog::new());
        catalog
            .on("EXPLAIN", Ok(vec![crate::testing::plan_row("db", "public", "sink")]))
            .on("INSERT INTO", Ok(vec![Row::new().with("query_id", "q1")]))
            .on(
                "LIST QUERIES",
                Ok(vec![Row::new().with("id", "q1").with("actual_state", "errored")]),
            );

        let desired = Attributes::new()
            .with("sql", "INSERT INTO sink SELECT 1;")
            .with("sink_relation", "db.public.sink");
        let start = tokio::time::Instant::now();
        let err = reconciler(&catalog).provision(&QUERY, &desired).await.unwrap_err();

        assert!(matches!(err, ProviderError::FailedPrecondition(_)));
        assert!(err.message().contains("'errored'"));
        assert_eq!(catalog.count("TERMINATE QUERY"), 1);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_create_failure_is_not_rolled_back() {
        let catalog = Arc::new(MockCatalog::new());
        catalog.on(
            "CREATE DATABASE",
            Err(CatalogError::new(ErrorCode::DuplicateObject, "database db1 already exists")),
        );

        let desired = Attributes::new().with("name", "db1");
        let err = reconciler(&catalog).provision(&DATABASE, &desired).await.unwrap_err();

        assert_eq!(
            err.catalog_error().map(|e| &e.code),
            Some(&ErrorCode::DuplicateObject)
        );
        assert_eq!(catalog.count("DROP"), 0);
        assert_eq!(catalog.count("LIST"), 0);
    }

    #[tokio::test]
    async fn test_plan_mismatch_fails_before_mutation() {
        let catalog = Arc::new(MockCatalog::new());
        catalog
            .on("LIST SCHEMAS", Ok(vec![Row::new().with("name", "public")]))
            .on(
                "EXPLAIN",
                Ok(vec![crate::testing::plan_row("other_db", "public", "pageviews")]),
            );

        let desired = Attributes::new()
            .with("database", "db")
            .with("schema", "public")
            .with("name", "pageviews")
            .with("sql", "CREATE STREAM pageviews (id BIGINT) WITH ('topic' = 'pv');");
        let err = reconciler(&catalog).provision(&RELATION, &desired).await.unwrap_err();

        assert!(matches!(err, ProviderError::Validation(_)));
        assert_eq!(catalog.count("CREATE"), 0);
        assert_eq!(catalog.count("DROP"), 0);
    }

    #[tokio::test]
    async fn test_missing_parent_fails_provision() {
        let catalog = Arc::new(MockCatalog::new());
        catalog.on(
            "LIST DATABASES",
            Ok(vec![database_row("some_other_db")]),
        );

        let desired = Attributes::new().with("database", "db").with("name", "s1");
        let err = reconciler(&catalog).provision(&SCHEMA, &desired).await.unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(catalog.count("CREATE"), 0);
    }

    #[tokio::test]
    async fn test_not_found_detaches_on_refresh() {
        let catalog = Arc::new(MockCatalog::new());
        catalog.on(
            "LIST SCHEMAS",
            Err(CatalogError::new(ErrorCode::InvalidDatabase, "database db does not exist")),
        );

        let identity = Identity::new().with("database", "db").with("name", "s1");
        let rec = reconciler(&catalog);

        assert_eq!(rec.refresh(&SCHEMA, &identity).await.unwrap(), Observation::Missing);
        assert!(rec.require(&SCHEMA, &identity).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_refresh_uses_scoped_session() {
        let catalog = Arc::new(MockCatalog::new());
        catalog.on(
            "LIST RELATIONS",
            Ok(vec![Row::new().with("name", "pageviews").with("type", "stream")]),
        );

        let identity = Identity::new()
            .with("database", "db")
            .with("schema", "public")
            .with("name", "pageviews");
        let observed = reconciler(&catalog).refresh(&RELATION, &identity).await.unwrap();

        assert!(matches!(observed, Observation::Found(_)));
        let session = catalog.sessions().pop().unwrap();
        assert_eq!(session.database.as_deref(), Some("db"));
        assert_eq!(session.schema.as_deref(), Some("public"));
        assert_eq!(session.role.as_deref(), Some("sysadmin"));
    }

    #[tokio::test]
    async fn test_refresh_surfaces_other_errors() {
        let catalog = Arc::new(MockCatalog::new());
        catalog.on("LIST DATABASES", Err(CatalogError::connection("refused")));

        let identity = Identity::new().with("name", "db1");
        let err = reconciler(&catalog).refresh(&DATABASE, &identity).await.unwrap_err();
        assert_eq!(err.catalog_error().map(|e| &e.code), Some(&ErrorCode::Connection));
    }

    #[tokio::test]
    async fn test_delete_of_absent_object_succeeds() {
        let catalog = Arc::new(MockCatalog::new());
        catalog.on(
            "DROP DATABASE",
            Err(CatalogError::new(ErrorCode::InvalidDatabase, "database db1 does not exist")),
        );

        let identity = Identity::new().with("name", "db1");
        reconciler(&catalog)
            .deprovision(&DATABASE, &identity, &Attributes::new())
            .await
            .unwrap();
        assert_eq!(catalog.count("LIST"), 0);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent_for_every_kind() {
        for kind in crate::resources::Registry::builtin().kinds() {
            let identity = kind
                .identity_attributes()
                .iter()
                .fold(Identity::new(), |identity, name| identity.with(*name, "gone"));
            let drop = kind.drop_statement(&identity, &Attributes::new());
            assert!(!kind.absent_codes().is_empty(), "{} has no absent codes", kind.kind());

            for code in kind.absent_codes() {
                let catalog = Arc::new(MockCatalog::new());
                catalog.on(drop.sql(), Err(CatalogError::new(code.clone(), "does not exist")));

                let result = reconciler(&catalog)
                    .deprovision(kind, &identity, &Attributes::new())
                    .await;
                assert!(result.is_ok(), "{} with {}: {:?}", kind.kind(), code, result);
                assert_eq!(catalog.count(drop.sql()), 1, "{}", kind.kind());
                assert_eq!(catalog.count("LIST"), 0, "{} polled after an absent drop", kind.kind());
            }
        }
    }

    #[tokio::test]
    async fn test_delete_with_dependents_is_a_precondition_failure() {
        let catalog = Arc::new(MockCatalog::new());
        catalog.on(
            "DROP DATABASE",
            Err(CatalogError::new(
                ErrorCode::DependentObjectsStillExist,
                "schema public depends on database db1",
            )),
        );

        let identity = Identity::new().with("name", "db1");
        let err = reconciler(&catalog)
            .deprovision(&DATABASE, &identity, &Attributes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::FailedPrecondition(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_waits_for_terminated_query() {
        let catalog = Arc::new(MockCatalog::new());
        catalog
            .on(
                "LIST QUERIES",
                Ok(vec![Row::new().with("id", "q1").with("actual_state", "stopping")]),
            )
            .on(
                "LIST QUERIES",
                Ok(vec![Row::new().with("id", "q1").with("actual_state", "terminated")]),
            );

        let identity = Identity::new().with("query_id", "q1");
        reconciler(&catalog)
            .deprovision(&QUERY, &identity, &Attributes::new())
            .await
            .unwrap();
        assert_eq!(catalog.count("LIST QUERIES"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_timeout() {
        let catalog = Arc::new(MockCatalog::new());
        catalog.on("LIST DATABASES", Ok(vec![database_row("db1")]));

        let identity = Identity::new().with("name", "db1");
        let err = reconciler(&catalog)
            .deprovision(&DATABASE, &identity, &Attributes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::DeadlineExceeded(_)));
        assert!(err.message().contains("not yet deleted"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_skips_rollback() {
        let catalog = Arc::new(MockCatalog::new());
        catalog.on("LIST DATABASES", Ok(vec![]));

        let cancel = CancellationToken::new();
        let rec = Reconciler::new(
            catalog.clone(),
            SessionContext::new(),
            RetryPolicy::default(),
            cancel.clone(),
        );
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            trigger.cancel();
        });

        let err = rec
            .provision(&DATABASE, &Attributes::new().with("name", "db1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Cancelled(_)));
        assert_eq!(catalog.count("DROP"), 0);
    }

    #[test]
    fn test_identity_change_is_rejected() {
        let prior = Attributes::new().with("database", "db").with("name", "s1");
        let planned = Attributes::new().with("database", "db").with("name", "s2");

        let err = check_update(&SCHEMA, &prior, &planned).unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
        assert!(err.message().contains("'name'"));
    }

    #[test]
    fn test_owner_change_is_unsupported() {
        let prior = Attributes::new().with("name", "db1").with("owner", "sysadmin");
        let planned = Attributes::new().with("name", "db1").with("owner", "analyst");

        let err = check_update(&DATABASE, &prior, &planned).unwrap_err();
        assert!(matches!(err, ProviderError::Unimplemented(_)));
    }

    #[test]
    fn test_pending_and_computed_values_are_not_changes() {
        let prior = Attributes::new()
            .with("name", "db1")
            .with("owner", "sysadmin")
            .with("created_at", "2024-05-01T10:00:00Z");
        let planned = Attributes::new()
            .with("name", "db1")
            .with("owner", UNKNOWN_VALUE)
            .with("created_at", "2030-01-01T00:00:00Z");

        assert!(check_update(&DATABASE, &prior, &planned).unwrap().is_empty());
    }

    #[test]
    fn test_updatable_fields_are_reported() {
        let prior = Attributes::new()
            .with("name", "kafka")
            .with("type", "KAFKA")
            .with("uris", serde_json::json!(["a:9092"]));
        let planned = Attributes::new()
            .with("name", "kafka")
            .with("type", "KAFKA")
            .with("uris", serde_json::json!(["b:9092"]));
        assert_eq!(check_update(&STORE, &prior, &planned).unwrap(), vec!["uris"]);

        let planned = prior.clone().with("type", "KINESIS");
        assert!(matches!(
            check_update(&STORE, &prior, &planned),
            Err(ProviderError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_rejected_update_issues_no_statements() {
        let catalog = Arc::new(MockCatalog::new());
        let prior = Attributes::new().with("database", "db").with("name", "s1");
        let planned = Attributes::new().with("database", "db2").with("name", "s1");

        let err = reconciler(&catalog).update(&SCHEMA, &prior, &planned).await.unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
        assert!(catalog.executed().is_empty());
    }

    #[tokio::test]
    async fn test_update_store_uris() {
        let catalog = Arc::new(MockCatalog::new());
        catalog.on(
            "LIST STORES",
            Ok(vec![Row::new()
                .with("name", "kafka")
                .with("type", "KAFKA")
                .with("state", "ready")
                .with("owner", "sysadmin")]),
        );

        let prior = Attributes::new()
            .with("name", "kafka")
            .with("type", "KAFKA")
            .with("uris", serde_json::json!(["a:9092"]));
        let planned = prior.clone().with("uris", serde_json::json!(["b:9092"]));

        let state = reconciler(&catalog).update(&STORE, &prior, &planned).await.unwrap();
        assert_eq!(state.string("state").known().as_deref(), Some("ready"));
        assert_eq!(
            state.string_list("uris").known(),
            Some(vec!["b:9092".to_string()])
        );
        assert_eq!(catalog.count("UPDATE STORE"), 1);
    }

    #[tokio::test]
    async fn test_noop_update_only_refreshes() {
        let catalog = Arc::new(MockCatalog::new());
        catalog.on("LIST DATABASES", Ok(vec![database_row("db1")]));

        let prior = Attributes::new().with("name", "db1").with("owner", "sysadmin");
        let state = reconciler(&catalog).update(&DATABASE, &prior, &prior).await.unwrap();

        assert_eq!(state.string("name").known().as_deref(), Some("db1"));
        assert_eq!(catalog.executed().len(), 1);
    }

    #[tokio::test]
    async fn test_list_in_missing_scope_is_not_found() {
        let catalog = Arc::new(MockCatalog::new());
        catalog.on(
            "LIST SCHEMAS",
            Err(CatalogError::new(ErrorCode::InvalidDatabase, "no such database")),
        );

        let scope = Identity::new().with("database", "nope");
        let err = reconciler(&catalog).list(&SCHEMA, &scope).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
