//! Error types for the provider.

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::schema::Diagnostic;

/// Errors surfaced to the orchestrator.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The remote object does not exist.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The requested change or configuration is invalid. Nothing was mutated.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The provider configuration is invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The requested resource or data source type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The catalog rejected a statement.
    #[error("{context}: {source}")]
    Remote {
        /// What the provider was doing.
        context: String,
        /// The coded error reported by the catalog.
        #[source]
        source: CatalogError,
    },

    /// The remote object already exists.
    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    /// The polling budget ran out before the object reached its expected state.
    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// The caller cancelled the operation.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// The remote object is not in a state that allows the operation.
    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    /// The operation is not supported.
    #[error("Unimplemented: {0}")]
    Unimplemented(String),

    /// Malformed input from the orchestrator.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ProviderError {
    /// Wrap a catalog error with context.
    pub fn remote(context: impl Into<String>, source: CatalogError) -> Self {
        Self::Remote {
            context: context.into(),
            source,
        }
    }

    /// Get the error message without the variant prefix.
    pub fn message(&self) -> String {
        match self {
            Self::NotFound(msg)
            | Self::Validation(msg)
            | Self::Configuration(msg)
            | Self::UnknownResource(msg)
            | Self::AlreadyExists(msg)
            | Self::DeadlineExceeded(msg)
            | Self::Cancelled(msg)
            | Self::FailedPrecondition(msg)
            | Self::Unimplemented(msg)
            | Self::InvalidRequest(msg) => msg.clone(),
            Self::Serialization(err) => err.to_string(),
            Self::Remote { context, source } => format!("{}: {}", context, source),
        }
    }

    /// Whether the error means the remote object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// The catalog error behind this error, if any.
    pub fn catalog_error(&self) -> Option<&CatalogError> {
        match self {
            Self::Remote { source, .. } => Some(source),
            _ => None,
        }
    }

    fn summary(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "Resource not found",
            Self::Validation(_) => "Invalid configuration",
            Self::Configuration(_) => "Provider configuration error",
            Self::UnknownResource(_) => "Unknown resource type",
            Self::Serialization(_) => "Malformed state",
            Self::Remote { .. } => "Catalog error",
            Self::AlreadyExists(_) => "Resource already exists",
            Self::DeadlineExceeded(_) => "Timed out",
            Self::Cancelled(_) => "Cancelled",
            Self::FailedPrecondition(_) => "Failed precondition",
            Self::Unimplemented(_) => "Unsupported operation",
            Self::InvalidRequest(_) => "Invalid request",
        }
    }
}

impl From<ProviderError> for Diagnostic {
    fn from(err: ProviderError) -> Self {
        Diagnostic::error(err.summary()).with_detail(err.message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ErrorCode;
    use crate::schema::DiagnosticSeverity;

    #[test]
    fn test_error_display() {
        let err = ProviderError::NotFound("database \"db1\"".to_string());
        assert_eq!(format!("{}", err), "Resource not found: database \"db1\"");

        let err = ProviderError::Validation("name cannot change".to_string());
        assert_eq!(format!("{}", err), "Validation error: name cannot change");

        let err = ProviderError::DeadlineExceeded("query failed to start".to_string());
        assert_eq!(format!("{}", err), "Deadline exceeded: query failed to start");
    }

    #[test]
    fn test_remote_error_keeps_source() {
        let err = ProviderError::remote(
            "failed to drop database \"db1\"",
            CatalogError::new(ErrorCode::DependentObjectsStillExist, "schemas remain"),
        );
        assert_eq!(
            err.to_string(),
            "failed to drop database \"db1\": [2BP01] schemas remain"
        );
        assert_eq!(
            err.catalog_error().map(|e| &e.code),
            Some(&ErrorCode::DependentObjectsStillExist)
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_message_method() {
        let err = ProviderError::Unimplemented("ownership transfer".to_string());
        assert_eq!(err.message(), "ownership transfer");
        assert!(!err.is_not_found());
        assert!(ProviderError::NotFound("x".into()).is_not_found());
    }

    #[test]
    fn test_error_to_diagnostic() {
        let diag: Diagnostic = ProviderError::Cancelled("stopped by host".to_string()).into();
        assert_eq!(diag.severity, DiagnosticSeverity::Error);
        assert_eq!(diag.summary, "Cancelled");
        assert_eq!(diag.detail.as_deref(), Some("stopped by host"));
    }
}
