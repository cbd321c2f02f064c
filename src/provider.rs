//! The orchestrator-facing provider.
//!
//! [`ProviderService`] is the surface a host calls: schema, configuration,
//! plan and the four lifecycle operations, plus import and data sources.
//! [`StreamSqlProvider`] implements it by resolving the resource kind from
//! the type name and handing the work to a [`Reconciler`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use streamsql_provider::{ProviderService, StreamSqlProvider};
//! use serde_json::json;
//!
//! let provider = StreamSqlProvider::new(MyConnector::default());
//! provider.configure(json!({"server": "https://api.example.com", "api_key": "..."})).await?;
//! let state = provider.create("streamsql_database", json!({"name": "analytics"})).await?;
//! ```

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::catalog::{CatalogClient, Connector, SessionContext};
use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::reconciler::{check_update, Observation, Reconciler};
use crate::resources::{computed_view, DataSource, Registry, ResourceKind};
use crate::retry::RetryPolicy;
use crate::schema::{has_errors, Diagnostic, ProviderSchema};
use crate::types::{AttrValue, AttributeChange, Attributes, Identity, ImportedResource, PlanResult, ProviderMetadata};
use crate::validation::{validate, validate_identifier};

/// Operations a host invokes on a provider.
///
/// States and configurations travel as JSON objects. Values not known until
/// after apply are encoded as [`UNKNOWN_VALUE`](crate::types::UNKNOWN_VALUE).
#[async_trait::async_trait]
pub trait ProviderService: Send + Sync + 'static {
    // =========================================================================
    // Schema & Metadata
    // =========================================================================

    /// Return the provider's schema including all resources and data sources.
    fn schema(&self) -> ProviderSchema;

    /// Resource and data source names. By default, derived from the schema.
    fn metadata(&self) -> ProviderMetadata {
        let schema = self.schema();
        ProviderMetadata {
            resources: schema.resources.keys().cloned().collect(),
            data_sources: schema.data_sources.keys().cloned().collect(),
        }
    }

    // =========================================================================
    // Provider Lifecycle
    // =========================================================================

    /// Validate the provider configuration before configuring.
    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = config;
        Ok(vec![])
    }

    /// Configure the provider with credentials and settings.
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError>;

    /// Stop the provider, cancelling in-flight operations.
    async fn stop(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Validate a resource's configuration before planning.
    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = (resource_type, config);
        Ok(vec![])
    }

    /// Plan changes for a resource. `proposed_state` is null when the
    /// resource is being destroyed.
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError>;

    /// Create a new resource.
    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError>;

    /// Read the current state of a resource. `None` means the remote object
    /// is gone and the resource should be dropped from state.
    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Option<Value>, ProviderError>;

    /// Update an existing resource.
    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError>;

    /// Delete a resource.
    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError>;

    /// Import an existing object by id.
    async fn import_resource(
        &self,
        resource_type: &str,
        _id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        Err(ProviderError::Unimplemented(format!(
            "import is not supported for {}",
            resource_type
        )))
    }

    // =========================================================================
    // Data Source Operations
    // =========================================================================

    /// Validate a data source's configuration.
    async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = (data_source_type, config);
        Ok(vec![])
    }

    /// Read a data source.
    async fn read_data_source(&self, data_source_type: &str, _config: Value) -> Result<Value, ProviderError> {
        Err(ProviderError::UnknownResource(format!(
            "data source {}",
            data_source_type
        )))
    }
}

struct Connection {
    client: Arc<dyn CatalogClient>,
    session: SessionContext,
    policy: RetryPolicy,
    shutdown: CancellationToken,
}

/// Provider for the streaming SQL platform.
pub struct StreamSqlProvider {
    connector: Arc<dyn Connector>,
    registry: Registry,
    connection: RwLock<Option<Connection>>,
}

impl StreamSqlProvider {
    /// Create a provider that opens its catalog client through `connector`
    /// when configured.
    pub fn new(connector: impl Connector) -> Self {
        Self::with_connector(Arc::new(connector))
    }

    /// Like [`new`](Self::new), for a shared connector.
    pub fn with_connector(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            registry: Registry::builtin(),
            connection: RwLock::new(None),
        }
    }

    /// Token cancelled by [`stop`](ProviderService::stop), or `None` while
    /// unconfigured. Hosts that enforce their own deadlines can cancel it
    /// directly. Each successful [`configure`](ProviderService::configure)
    /// after a stop starts with a fresh token.
    pub async fn shutdown_token(&self) -> Option<CancellationToken> {
        self.connection
            .read()
            .await
            .as_ref()
            .map(|connection| connection.shutdown.clone())
    }

    /// Whether [`configure`](ProviderService::configure) has succeeded.
    pub async fn is_configured(&self) -> bool {
        self.connection.read().await.is_some()
    }

    async fn reconciler(&self) -> Result<Reconciler, ProviderError> {
        let guard = self.connection.read().await;
        let connection = guard.as_ref().ok_or_else(|| {
            ProviderError::FailedPrecondition("the provider has not been configured".to_string())
        })?;
        Ok(Reconciler::new(
            Arc::clone(&connection.client),
            connection.session.clone(),
            connection.policy,
            connection.shutdown.child_token(),
        ))
    }

    fn plan_create(
        &self,
        kind: &dyn ResourceKind,
        proposed: Attributes,
    ) -> Result<PlanResult, ProviderError> {
        let schema = kind.schema();
        let diagnostics = validate(&schema, &proposed.clone().into_value());
        if has_errors(&diagnostics) {
            return Err(validation_error(diagnostics));
        }

        let mut planned = proposed;
        for name in schema.computed_attributes() {
            if matches!(planned.raw(name), None | Some(Value::Null)) {
                planned.set_pending(name);
            }
        }
        let changes = AttributeChange::diff(&Attributes::new(), &planned);
        Ok(PlanResult::with_changes(planned.into_value(), changes))
    }

    fn plan_update(
        &self,
        kind: &dyn ResourceKind,
        prior: Attributes,
        proposed: Attributes,
    ) -> Result<PlanResult, ProviderError> {
        let schema = kind.schema();
        let mut planned = proposed;
        for name in schema.computed_attributes() {
            let unset_or_pending = match planned.raw(name) {
                None | Some(Value::Null) => true,
                Some(_) => planned.is_pending(name),
            };
            if unset_or_pending {
                if let Some(value) = prior.raw(name).filter(|v| !v.is_null()) {
                    planned.set(name, value.clone());
                }
            }
        }

        check_update(kind, &prior, &planned)?;

        if AttributeChange::diff(&prior, &planned).is_empty() {
            return Ok(PlanResult::no_change(planned.into_value()));
        }
        if schema.attribute("updated_at").is_some() {
            planned.set_pending("updated_at");
        }
        let changes = AttributeChange::diff(&prior, &planned);
        Ok(PlanResult::with_changes(planned.into_value(), changes))
    }
}

fn validation_error(diagnostics: Vec<Diagnostic>) -> ProviderError {
    let messages: Vec<String> = diagnostics
        .into_iter()
        .filter(Diagnostic::is_error)
        .map(|d| match d.detail {
            Some(detail) => format!("{}: {}", d.summary, detail),
            None => d.summary,
        })
        .collect();
    ProviderError::Validation(messages.join("; "))
}

fn finish<T>(operation: &str, result: Result<T, ProviderError>) -> Result<T, ProviderError> {
    match &result {
        Ok(_) => info!("{} completed", operation),
        Err(e) => error!(error = %e, "{} failed", operation),
    }
    result
}

#[async_trait::async_trait]
impl ProviderService for StreamSqlProvider {
    fn schema(&self) -> ProviderSchema {
        self.registry
            .provider_schema()
            .with_provider_config(ProviderConfig::schema())
    }

    #[instrument(skip_all, name = "provider.validate_provider_config")]
    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let mut diagnostics = validate(&ProviderConfig::schema(), &config);
        if has_errors(&diagnostics) {
            warn!(diagnostics = diagnostics.len(), "provider block is invalid");
            return Ok(diagnostics);
        }
        match ProviderConfig::from_value(config) {
            Ok(config) => diagnostics.extend(config.with_env_fallback().validate()),
            Err(e) => diagnostics.push(e.into()),
        }
        Ok(diagnostics)
    }

    #[instrument(skip_all, name = "provider.configure")]
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        debug!("Configure called");
        let mut diagnostics = self.validate_provider_config(config.clone()).await?;
        if has_errors(&diagnostics) {
            warn!(diagnostics = diagnostics.len(), "Configure completed with errors");
            return Ok(diagnostics);
        }

        let config = ProviderConfig::from_value(config)?.with_env_fallback();
        let client = match self.connector.connect(&config).await {
            Ok(client) => client,
            Err(e) => {
                error!(error = %e, "failed to connect");
                diagnostics.push(
                    Diagnostic::error("Failed to connect")
                        .with_detail(e.to_string())
                        .with_attribute("server"),
                );
                return Ok(diagnostics);
            }
        };

        let mut connection = self.connection.write().await;
        let shutdown = connection
            .as_ref()
            .map(|previous| previous.shutdown.clone())
            .filter(|token| !token.is_cancelled())
            .unwrap_or_else(CancellationToken::new);
        *connection = Some(Connection {
            client,
            session: config.session(),
            policy: config.retry_policy(),
            shutdown,
        });
        drop(connection);
        info!(
            server = config.server.as_deref().unwrap_or_default(),
            role = config.role(),
            "Configure completed successfully"
        );
        Ok(diagnostics)
    }

    #[instrument(skip_all, name = "provider.stop")]
    async fn stop(&self) -> Result<(), ProviderError> {
        info!("Stop called; cancelling in-flight operations");
        if let Some(connection) = self.connection.write().await.take() {
            connection.shutdown.cancel();
        }
        Ok(())
    }

    #[instrument(skip(self, config), name = "provider.validate_resource_config")]
    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let kind = self.registry.resource(resource_type)?;
        let mut diagnostics = validate(&kind.schema(), &config);
        if let Ok(attrs) = Attributes::from_value(config) {
            for name in kind.identity_attributes() {
                if let AttrValue::Known(value) = attrs.string(name) {
                    diagnostics.extend(validate_identifier(name, &value));
                }
            }
        }
        Ok(diagnostics)
    }

    #[instrument(skip(self, prior_state, proposed_state, _config), name = "provider.plan")]
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        _config: Value,
    ) -> Result<PlanResult, ProviderError> {
        let kind = self.registry.resource(resource_type)?;
        if proposed_state.is_null() {
            debug!("planning destroy");
            return Ok(PlanResult::no_change(Value::Null));
        }
        let proposed = Attributes::from_value(proposed_state)?;
        let result = match prior_state {
            None => self.plan_create(kind, proposed),
            Some(prior) => self.plan_update(kind, Attributes::from_value(prior)?, proposed),
        };
        if let Ok(plan) = &result {
            debug!(changes = plan.changes.len(), "planned");
        }
        finish("Plan", result)
    }

    #[instrument(skip(self, planned_state), name = "provider.create")]
    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        let kind = self.registry.resource(resource_type)?;
        let desired = Attributes::from_value(planned_state)?;
        let result = match self.reconciler().await {
            Ok(reconciler) => reconciler.provision(kind, &desired).await,
            Err(e) => Err(e),
        };
        finish("Create", result.map(Attributes::into_value))
    }

    #[instrument(skip(self, current_state), name = "provider.read")]
    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Option<Value>, ProviderError> {
        let kind = self.registry.resource(resource_type)?;
        let current = Attributes::from_value(current_state)?;
        let identity = kind.identity(&current)?;

        let observation = self.reconciler().await?.refresh(kind, &identity).await;
        let result = observation.map(|observation| match observation {
            Observation::Found(observed) => {
                let mut state = current;
                state.merge(&computed_view(kind, &observed));
                Some(state.into_value())
            }
            Observation::Missing => {
                info!(identity = %identity, "object no longer exists; dropping from state");
                None
            }
        });
        finish("Read", result)
    }

    #[instrument(skip(self, prior_state, planned_state), name = "provider.update")]
    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        let kind = self.registry.resource(resource_type)?;
        let prior = Attributes::from_value(prior_state)?;
        let planned = Attributes::from_value(planned_state)?;
        let result = match self.reconciler().await {
            Ok(reconciler) => reconciler.update(kind, &prior, &planned).await,
            Err(e) => Err(e),
        };
        finish("Update", result.map(Attributes::into_value))
    }

    #[instrument(skip(self, current_state), name = "provider.delete")]
    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        let kind = self.registry.resource(resource_type)?;
        let current = Attributes::from_value(current_state)?;
        let identity = kind.identity(&current)?;
        let result = match self.reconciler().await {
            Ok(reconciler) => reconciler.deprovision(kind, &identity, &current).await,
            Err(e) => Err(e),
        };
        finish("Delete", result)
    }

    #[instrument(skip(self), name = "provider.import_resource")]
    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        let kind = self.registry.resource(resource_type)?;
        let identity = Identity::parse(kind.identity_attributes(), id)?;
        let result = match self.reconciler().await {
            Ok(reconciler) => reconciler.require(kind, &identity).await,
            Err(e) => Err(e),
        };
        finish("Import", result).map(|observed| {
            let mut state = identity.to_attributes();
            state.merge(&observed);
            vec![ImportedResource::new(resource_type, state.into_value())]
        })
    }

    #[instrument(skip(self, config), name = "provider.validate_data_source_config")]
    async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let data_source = self.registry.data_source(data_source_type)?;
        Ok(validate(&data_source.schema(), &config))
    }

    #[instrument(skip(self, config), name = "provider.read_data_source")]
    async fn read_data_source(&self, data_source_type: &str, config: Value) -> Result<Value, ProviderError> {
        let data_source = self.registry.data_source(data_source_type)?;
        let attrs = Attributes::from_value(config)?;
        let reconciler = self.reconciler().await?;

        let result = match data_source {
            DataSource::Lookup(kind) => {
                let identity = kind.identity(&attrs)?;
                reconciler.require(kind, &identity).await.map(|observed| {
                    let mut state = identity.to_attributes();
                    state.merge(&observed);
                    state.into_value()
                })
            }
            DataSource::List(kind) => {
                let scope = Identity::from_attributes(kind.scope_attributes(), &attrs)?;
                reconciler.list(kind, &scope).await.map(|items| {
                    let items: Vec<Value> = items
                        .into_iter()
                        .map(|observed| {
                            let mut item = scope.to_attributes();
                            item.merge(&observed);
                            item.into_value()
                        })
                        .collect();
                    scope
                        .to_attributes()
                        .with(kind.plural(), Value::Array(items))
                        .into_value()
                })
            }
        };
        finish("ReadDataSource", result)
    }
}
