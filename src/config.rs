//! Provider configuration.
//!
//! The host passes the provider block as JSON to
//! [`ProviderService::configure`](crate::provider::ProviderService::configure).
//! Values left unset fall back to environment variables:
//!
//! | attribute | environment variable |
//! |---|---|
//! | `server` | `STREAMSQL_SERVER` |
//! | `api_key` | `STREAMSQL_API_KEY` |
//! | `organization` | `STREAMSQL_ORGANIZATION` |
//! | `role` | `STREAMSQL_ROLE` |

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::catalog::SessionContext;
use crate::error::ProviderError;
use crate::retry::RetryPolicy;
use crate::schema::{Attribute, AttributeType, AttributeFlags, Diagnostic, Schema};

/// Role used when the configuration names none.
pub const DEFAULT_ROLE: &str = "sysadmin";

/// Environment variable fallback for `server`.
pub const ENV_SERVER: &str = "STREAMSQL_SERVER";
/// Environment variable fallback for `api_key`.
pub const ENV_API_KEY: &str = "STREAMSQL_API_KEY";
/// Environment variable fallback for `organization`.
pub const ENV_ORGANIZATION: &str = "STREAMSQL_ORGANIZATION";
/// Environment variable fallback for `role`.
pub const ENV_ROLE: &str = "STREAMSQL_ROLE";

/// Polling budget and backoff settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Wall-clock budget for reaching a terminal state.
    pub provision_secs: u64,
    /// First delay between polls.
    pub initial_backoff_ms: u64,
    /// Ceiling for the delay between polls.
    pub max_backoff_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            provision_secs: 300,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 10_000,
        }
    }
}

/// Provider configuration.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Base URL of the platform API.
    pub server: Option<String>,
    /// API token.
    pub api_key: Option<String>,
    /// Organization to act in.
    pub organization: Option<String>,
    /// Default role; owns objects created without an explicit owner.
    pub role: Option<String>,
    /// Log level used by [`init_logging_from_config`](crate::logging::init_logging_from_config).
    pub log_level: Option<String>,
    /// Polling settings.
    pub timeouts: Timeouts,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("server", &self.server)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("organization", &self.organization)
            .field("role", &self.role)
            .field("log_level", &self.log_level)
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

impl ProviderConfig {
    /// Parse the provider block. `null` yields the defaults.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ProviderError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value)
            .map_err(|e| ProviderError::Configuration(format!("invalid provider block: {}", e)))
    }

    /// Fill unset values from the process environment.
    pub fn with_env_fallback(self) -> Self {
        self.with_fallback(|key| std::env::var(key).ok())
    }

    /// Fill unset values from the given lookup.
    pub fn with_fallback(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let fill = |slot: &mut Option<String>, key: &str| {
            if slot.is_none() {
                *slot = lookup(key).filter(|v| !v.is_empty());
            }
        };
        fill(&mut self.server, ENV_SERVER);
        fill(&mut self.api_key, ENV_API_KEY);
        fill(&mut self.organization, ENV_ORGANIZATION);
        fill(&mut self.role, ENV_ROLE);
        self
    }

    /// Check the configuration, returning diagnostics for every problem.
    pub fn validate(&self) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();

        match self.server.as_deref() {
            None => diagnostics.push(
                Diagnostic::error("Missing server")
                    .with_detail(format!("Set 'server' or {}", ENV_SERVER))
                    .with_attribute("server"),
            ),
            Some(url) if !(url.starts_with("https://") || url.starts_with("http://")) => {
                diagnostics.push(
                    Diagnostic::error("Invalid server URL")
                        .with_detail(format!("'{}' must start with http:// or https://", url))
                        .with_attribute("server"),
                )
            }
            Some(url) if url.starts_with("http://") => diagnostics.push(
                Diagnostic::warning("Insecure server URL")
                    .with_detail("The API token will be sent without TLS")
                    .with_attribute("server"),
            ),
            Some(_) => {}
        }

        if self.api_key.is_none() {
            diagnostics.push(
                Diagnostic::error("Missing API key")
                    .with_detail(format!("Set 'api_key' or {}", ENV_API_KEY))
                    .with_attribute("api_key"),
            );
        }

        if let Some(level) = &self.log_level {
            if tracing_subscriber::EnvFilter::try_new(level).is_err() {
                diagnostics.push(
                    Diagnostic::error("Invalid log level")
                        .with_detail(format!("'{}' is not a valid filter directive", level))
                        .with_attribute("log_level"),
                );
            }
        }

        let t = &self.timeouts;
        if t.provision_secs == 0 {
            diagnostics.push(
                Diagnostic::error("Invalid timeout")
                    .with_detail("provision_secs must be greater than zero")
                    .with_attribute("timeouts.provision_secs"),
            );
        }
        if t.initial_backoff_ms == 0 || t.initial_backoff_ms > t.max_backoff_ms {
            diagnostics.push(
                Diagnostic::error("Invalid backoff")
                    .with_detail("initial_backoff_ms must be non-zero and at most max_backoff_ms")
                    .with_attribute("timeouts.initial_backoff_ms"),
            );
        }

        diagnostics
    }

    /// The default role.
    pub fn role(&self) -> &str {
        self.role.as_deref().unwrap_or(DEFAULT_ROLE)
    }

    /// Session context every statement starts from.
    pub fn session(&self) -> SessionContext {
        SessionContext {
            organization: self.organization.clone(),
            role: Some(self.role().to_string()),
            database: None,
            schema: None,
        }
    }

    /// Retry policy built from the configured timeouts.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(
            Duration::from_millis(self.timeouts.initial_backoff_ms),
            Duration::from_millis(self.timeouts.max_backoff_ms),
            Duration::from_secs(self.timeouts.provision_secs),
        )
    }

    /// Schema of the provider block.
    pub fn schema() -> Schema {
        let timeouts = AttributeType::Object(
            [
                ("provision_secs".to_string(), AttributeType::Int64),
                ("initial_backoff_ms".to_string(), AttributeType::Int64),
                ("max_backoff_ms".to_string(), AttributeType::Int64),
            ]
            .into_iter()
            .collect(),
        );

        Schema::v0()
            .with_description("Connection settings for the streaming SQL platform")
            .with_attribute(
                "server",
                Attribute::optional_string().with_description("Base URL of the platform API"),
            )
            .with_attribute(
                "api_key",
                Attribute::optional_string()
                    .sensitive()
                    .with_description("API token"),
            )
            .with_attribute("organization", Attribute::optional_string())
            .with_attribute(
                "role",
                Attribute::optional_string()
                    .with_description("Default role used to create objects"),
            )
            .with_attribute("log_level", Attribute::optional_string())
            .with_attribute(
                "timeouts",
                Attribute::new(timeouts, AttributeFlags::optional()),
            )
    }
}
