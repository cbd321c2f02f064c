//! Testing utilities.
//!
//! [`ProviderTester`] drives a [`ProviderService`] directly, and
//! [`MockCatalog`] stands in for the remote catalog with scripted responses.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use streamsql_provider::testing::{MockCatalog, ProviderTester};
//! use streamsql_provider::StreamSqlProvider;
//! use serde_json::json;
//!
//! #[tokio::test]
//! async fn test_create_database() {
//!     let catalog = Arc::new(MockCatalog::new());
//!     catalog.on("LIST DATABASES", Ok(vec![Row::new().with("name", "analytics")]));
//!
//!     let tester = ProviderTester::new(StreamSqlProvider::new(Arc::clone(&catalog)));
//!     tester.configure(json!({"server": "https://api.example.com", "api_key": "t"})).await.unwrap();
//!
//!     let state = tester.create("streamsql_database", json!({"name": "analytics"})).await.unwrap();
//!     assert_eq!(state["name"], "analytics");
//!     assert_eq!(catalog.count("CREATE DATABASE"), 1);
//! }
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use crate::catalog::{CatalogClient, CatalogError, Connector, Row, SessionContext, Statement};
use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::provider::ProviderService;
use crate::schema::{Diagnostic, DiagnosticSeverity, ProviderSchema};
use crate::types::{ImportedResource, PlanResult};

/// A test harness for provider implementations.
pub struct ProviderTester<P: ProviderService> {
    provider: P,
}

impl<P: ProviderService> ProviderTester<P> {
    /// Create a new tester for the given provider.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Get a reference to the underlying provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    // =========================================================================
    // Schema & Metadata
    // =========================================================================

    /// Get the provider schema.
    pub fn schema(&self) -> ProviderSchema {
        self.provider.schema()
    }

    /// Get the list of resource types.
    pub fn resource_types(&self) -> Vec<String> {
        self.provider.metadata().resources
    }

    /// Get the list of data source types.
    pub fn data_source_types(&self) -> Vec<String> {
        self.provider.metadata().data_sources
    }

    // =========================================================================
    // Provider Lifecycle
    // =========================================================================

    /// Validate provider configuration, failing on error diagnostics.
    pub async fn validate_provider_config(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.validate_provider_config(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Configure the provider, failing on error diagnostics.
    pub async fn configure(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.configure(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Stop the provider.
    pub async fn stop(&self) -> Result<(), ProviderError> {
        self.provider.stop().await
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Validate a resource configuration.
    pub async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        let diagnostics = self
            .provider
            .validate_resource_config(resource_type, config)
            .await?;
        check_diagnostics(diagnostics)
    }

    /// Plan a resource creation (no prior state).
    pub async fn plan_create(
        &self,
        resource_type: &str,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, None, proposed_state.clone(), proposed_state)
            .await
    }

    /// Plan a resource update.
    pub async fn plan_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(
                resource_type,
                Some(prior_state),
                proposed_state.clone(),
                proposed_state,
            )
            .await
    }

    /// Plan a resource deletion.
    pub async fn plan_delete(
        &self,
        resource_type: &str,
        prior_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, Some(prior_state), Value::Null, Value::Null)
            .await
    }

    /// Create a new resource.
    pub async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        self.provider.create(resource_type, planned_state).await
    }

    /// Read the current state of a resource.
    pub async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Option<Value>, ProviderError> {
        self.provider.read(resource_type, current_state).await
    }

    /// Update an existing resource.
    pub async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider
            .update(resource_type, prior_state, planned_state)
            .await
    }

    /// Delete a resource.
    pub async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        self.provider.delete(resource_type, current_state).await
    }

    /// Import an existing resource.
    pub async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        self.provider.import_resource(resource_type, id).await
    }

    // =========================================================================
    // Data Source Operations
    // =========================================================================

    /// Validate a data source configuration.
    pub async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        let diagnostics = self
            .provider
            .validate_data_source_config(data_source_type, config)
            .await?;
        check_diagnostics(diagnostics)
    }

    /// Read data from a data source.
    pub async fn read_data_source(&self, data_source_type: &str, config: Value) -> Result<Value, ProviderError> {
        self.provider.read_data_source(data_source_type, config).await
    }

    // =========================================================================
    // Lifecycle Helpers
    // =========================================================================

    /// Run a full create lifecycle: plan → create → read.
    ///
    /// Returns the final state after read. A resource that vanishes between
    /// create and read is reported as [`ProviderError::NotFound`].
    pub async fn lifecycle_create(&self, resource_type: &str, config: Value) -> Result<Value, ProviderError> {
        let plan = self.plan_create(resource_type, config).await?;
        let created = self.create(resource_type, plan.planned_state).await?;
        self.read_existing(resource_type, created).await
    }

    /// Run a full update lifecycle: plan → update → read.
    pub async fn lifecycle_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<Value, ProviderError> {
        let plan = self
            .plan_update(resource_type, prior_state.clone(), proposed_state)
            .await?;
        let updated = self
            .update(resource_type, prior_state, plan.planned_state)
            .await?;
        self.read_existing(resource_type, updated).await
    }

    /// Run a full delete lifecycle: plan → delete.
    pub async fn lifecycle_delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        self.plan_delete(resource_type, current_state.clone()).await?;
        self.delete(resource_type, current_state).await
    }

    async fn read_existing(&self, resource_type: &str, state: Value) -> Result<Value, ProviderError> {
        self.read(resource_type, state).await?.ok_or_else(|| {
            ProviderError::NotFound(format!("{} disappeared after apply", resource_type))
        })
    }
}

/// Error type for test operations that may fail with diagnostics.
#[derive(Debug)]
pub enum TestError {
    /// Error diagnostics were returned.
    Diagnostics(Vec<Diagnostic>),
    /// The provider returned an error.
    Provider(ProviderError),
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestError::Diagnostics(diags) => {
                write!(f, "Diagnostics errors: ")?;
                for (i, d) in diags.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", d.summary)?;
                    if let Some(detail) = &d.detail {
                        write!(f, " ({})", detail)?;
                    }
                }
                Ok(())
            }
            TestError::Provider(e) => write!(f, "Provider error: {}", e),
        }
    }
}

impl std::error::Error for TestError {}

impl From<ProviderError> for TestError {
    fn from(e: ProviderError) -> Self {
        TestError::Provider(e)
    }
}

fn check_diagnostics(diagnostics: Vec<Diagnostic>) -> Result<(), TestError> {
    let errors: Vec<_> = diagnostics.into_iter().filter(Diagnostic::is_error).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(TestError::Diagnostics(errors))
    }
}

// =========================================================================
// Mock Catalog
// =========================================================================

struct Rule {
    prefix: String,
    responses: VecDeque<Result<Vec<Row>, CatalogError>>,
}

/// A scripted in-memory catalog.
///
/// Responses are registered per statement prefix. When several prefixes
/// match, the longest wins. Each rule replays its responses in order and
/// repeats the last one forever. Statements no rule matches succeed with no
/// rows. Every statement is recorded with its session context.
#[derive(Default)]
pub struct MockCatalog {
    rules: Mutex<Vec<Rule>>,
    executed: Mutex<Vec<(SessionContext, Statement)>>,
    connect_error: Mutex<Option<CatalogError>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockCatalog {
    /// An empty catalog that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for statements starting with `prefix`.
    pub fn on(&self, prefix: &str, response: Result<Vec<Row>, CatalogError>) -> &Self {
        let mut rules = lock(&self.rules);
        match rules.iter_mut().find(|r| r.prefix == prefix) {
            Some(rule) => rule.responses.push_back(response),
            None => rules.push(Rule {
                prefix: prefix.to_string(),
                responses: VecDeque::from([response]),
            }),
        }
        self
    }

    /// Make [`Connector::connect`] fail with `error`.
    pub fn refuse_connections(&self, error: CatalogError) {
        *lock(&self.connect_error) = Some(error);
    }

    /// Every statement run so far, oldest first.
    pub fn executed(&self) -> Vec<Statement> {
        lock(&self.executed).iter().map(|(_, s)| s.clone()).collect()
    }

    /// The session context of every statement run so far.
    pub fn sessions(&self) -> Vec<SessionContext> {
        lock(&self.executed).iter().map(|(c, _)| c.clone()).collect()
    }

    /// How many statements started with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        lock(&self.executed)
            .iter()
            .filter(|(_, s)| s.sql().starts_with(prefix))
            .count()
    }

    /// Full text of the statements that started with `prefix`.
    pub fn statements_matching(&self, prefix: &str) -> Vec<String> {
        lock(&self.executed)
            .iter()
            .filter(|(_, s)| s.sql().starts_with(prefix))
            .map(|(_, s)| s.sql().to_string())
            .collect()
    }

    fn respond(&self, sql: &str) -> Result<Vec<Row>, CatalogError> {
        let mut rules = lock(&self.rules);
        let rule = rules
            .iter_mut()
            .filter(|r| sql.starts_with(&r.prefix))
            .max_by_key(|r| r.prefix.len());
        match rule {
            Some(rule) if rule.responses.len() > 1 => rule.responses.pop_front().unwrap_or(Ok(vec![])),
            Some(rule) => rule.responses.front().cloned().unwrap_or(Ok(vec![])),
            None => Ok(vec![]),
        }
    }
}

#[async_trait::async_trait]
impl CatalogClient for MockCatalog {
    async fn query(&self, session: &SessionContext, statement: &Statement) -> Result<Vec<Row>, CatalogError> {
        lock(&self.executed).push((session.clone(), statement.clone()));
        self.respond(statement.sql())
    }
}

#[async_trait::async_trait]
impl Connector for Arc<MockCatalog> {
    async fn connect(&self, _config: &ProviderConfig) -> Result<Arc<dyn CatalogClient>, CatalogError> {
        match lock(&self.connect_error).clone() {
            Some(error) => Err(error),
            None => Ok(Arc::clone(self) as Arc<dyn CatalogClient>),
        }
    }
}

/// One row of an `EXPLAIN` result naming a relation the statement writes.
pub fn plan_row(database: &str, schema: &str, name: &str) -> Row {
    Row::new()
        .with("database_name", database)
        .with("schema_name", schema)
        .with("name", name)
        .with("relation_type", "stream")
}

// =========================================================================
// Assertion Helpers
// =========================================================================

/// Assert that a plan result indicates the resource will be created.
///
/// # Panics
///
/// Panics if the plan has no changes or some change has a prior value.
pub fn assert_plan_creates(plan: &PlanResult) {
    assert!(
        !plan.changes.is_empty(),
        "Expected plan to have changes for create, but got no changes"
    );
    assert!(
        plan.changes.iter().all(|c| c.before.is_none()),
        "Expected plan to create, but some attributes have prior values"
    );
}

/// Assert that a plan result indicates no changes.
///
/// # Panics
///
/// Panics if the plan has any changes.
pub fn assert_plan_no_changes(plan: &PlanResult) {
    assert!(
        plan.changes.is_empty(),
        "Expected no changes, but got {} change(s): {:?}",
        plan.changes.len(),
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that a plan has a change for a specific attribute path.
///
/// # Panics
///
/// Panics if the plan does not have a change for the given path.
pub fn assert_plan_changes_attribute(plan: &PlanResult, path: &str) {
    assert!(
        plan.changes.iter().any(|c| c.path == path),
        "Expected plan to change attribute '{}', but it was not changed. Changed attributes: {:?}",
        path,
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that diagnostics contain no errors.
///
/// # Panics
///
/// Panics if there are any error diagnostics.
pub fn assert_no_errors(diagnostics: &[Diagnostic]) {
    let errors: Vec<_> = diagnostics.iter().filter(|d| d.is_error()).collect();
    assert!(
        errors.is_empty(),
        "Expected no errors, but got {} error(s): {:?}",
        errors.len(),
        errors.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}

/// Assert that diagnostics contain an error with the given summary substring.
///
/// # Panics
///
/// Panics if no error diagnostic contains the given substring.
pub fn assert_error_contains(diagnostics: &[Diagnostic], substring: &str) {
    let has_matching_error = diagnostics
        .iter()
        .any(|d| matches!(d.severity, DiagnosticSeverity::Error) && d.summary.contains(substring));

    assert!(
        has_matching_error,
        "Expected an error containing '{}', but no matching error found. Errors: {:?}",
        substring,
        diagnostics
            .iter()
            .filter(|d| d.is_error())
            .map(|d| &d.summary)
            .collect::<Vec<_>>()
    );
}
