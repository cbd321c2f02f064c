//! StreamSQL Provider
//!
//! An infrastructure-as-code provider that manages objects on a streaming
//! SQL platform: databases, schemas, relations, continuous queries, stores,
//! secrets and schema registries.
//!
//! # Overview
//!
//! - **ProviderService trait**: The surface an orchestrator drives (schema,
//!   configure, plan, create/read/update/delete, import, data sources)
//! - **Reconciler**: One create/poll/rollback routine shared by every kind
//! - **Resource kinds**: Per-kind statements, identity and terminal states
//! - **Catalog seam**: [`CatalogClient`] runs statements under a
//!   [`SessionContext`](catalog::SessionContext) and returns rows or coded errors
//! - **Error types**: [`ProviderError`] and [`CatalogError`]
//! - **Logging**: Integration with `tracing` for structured logging
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use streamsql_provider::{
//!     catalog::{CatalogClient, CatalogError, Connector},
//!     config::ProviderConfig,
//!     ProviderService, StreamSqlProvider,
//! };
//!
//! struct HttpConnector;
//!
//! #[streamsql_provider::async_trait]
//! impl Connector for HttpConnector {
//!     async fn connect(
//!         &self,
//!         config: &ProviderConfig,
//!     ) -> Result<Arc<dyn CatalogClient>, CatalogError> {
//!         Ok(Arc::new(HttpCatalog::new(config)?))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     streamsql_provider::init_logging();
//!     let provider = StreamSqlProvider::new(HttpConnector);
//!     provider
//!         .configure(serde_json::json!({"server": "https://api.example.com"}))
//!         .await?;
//!     let state = provider
//!         .create("streamsql_database", serde_json::json!({"name": "analytics"}))
//!         .await?;
//!     println!("{}", state);
//!     Ok(())
//! }
//! ```
//!
//! # Lifecycle
//!
//! Every create follows the same shape: check the parent exists, dry-run the
//! statement when the kind supports it, execute it, then poll the catalog
//! with exponential backoff until the object reaches a terminal state. An
//! object that fails or times out is dropped again exactly once. Deletes are
//! idempotent and wait until the object disappears from its listing.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod catalog;
pub mod config;
pub mod error;
pub mod logging;
pub mod provider;
pub mod reconciler;
pub mod resources;
pub mod retry;
pub mod schema;
pub mod testing;
pub mod types;
pub mod validation;

// Re-export main types at crate root
pub use catalog::{CatalogClient, CatalogError, Connector, ErrorCode};
pub use config::ProviderConfig;
pub use error::ProviderError;
pub use logging::{init_logging, init_logging_from_config, init_logging_with_default, try_init_logging};
pub use provider::{ProviderService, StreamSqlProvider};
pub use reconciler::{Observation, Reconciler};
pub use resources::{Registry, ResourceKind};
pub use retry::RetryPolicy;
pub use schema::ProviderSchema;
pub use types::{
    AttributeChange, Attributes, Identity, ImportedResource, PlanResult, ProviderMetadata,
    UNKNOWN_VALUE,
};
pub use validation::{is_valid, validate, validate_result};

// Re-export async_trait for convenience
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use serde_json;
pub use tokio_util;
pub use tracing;
