//! The remote catalog seam.
//!
//! Everything the provider knows about the streaming SQL platform goes
//! through [`CatalogClient::query`]: a statement goes in, rows or a coded
//! [`CatalogError`] come out. Session state (active role, database, schema)
//! is passed with every call in a [`SessionContext`] and is never stored on
//! the connection.

pub mod error;
pub mod sql;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::ProviderConfig;

pub use error::{CatalogError, ErrorCode};

/// A single column value returned by the catalog.
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogValue {
    /// SQL NULL.
    Null,
    /// A boolean column.
    Bool(bool),
    /// An integer column.
    Int(i64),
    /// A text column.
    Text(String),
    /// A timestamp column.
    Timestamp(DateTime<Utc>),
}

impl CatalogValue {
    /// Convert to the JSON representation stored in resource state.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Text(s) => serde_json::Value::String(s.clone()),
            Self::Timestamp(ts) => serde_json::Value::String(ts.to_rfc3339()),
        }
    }
}

impl From<&str> for CatalogValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for CatalogValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<bool> for CatalogValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for CatalogValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<DateTime<Utc>> for CatalogValue {
    fn from(ts: DateTime<Utc>) -> Self {
        Self::Timestamp(ts)
    }
}

/// A row returned by the catalog, keyed by column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: BTreeMap<String, CatalogValue>,
}

impl Row {
    /// Create an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a column to this row.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<CatalogValue>) -> Self {
        self.columns.insert(column.into(), value.into());
        self
    }

    /// Get a raw column value.
    pub fn get(&self, column: &str) -> Option<&CatalogValue> {
        self.columns.get(column)
    }

    /// Get a text column. Returns `None` for NULL or non-text columns.
    pub fn text(&self, column: &str) -> Option<&str> {
        match self.columns.get(column) {
            Some(CatalogValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    /// Get a boolean column.
    pub fn bool(&self, column: &str) -> Option<bool> {
        match self.columns.get(column) {
            Some(CatalogValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    /// Iterate over all columns.
    pub fn columns(&self) -> impl Iterator<Item = (&String, &CatalogValue)> {
        self.columns.iter()
    }
}

/// A statement to run against the catalog.
///
/// Statements that embed credentials are marked sensitive; their
/// [`Display`](fmt::Display) output hides the property list.
#[derive(Clone, PartialEq, Eq)]
pub struct Statement {
    sql: String,
    sensitive: bool,
}

impl Statement {
    /// Create a statement.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            sensitive: false,
        }
    }

    /// Mark the statement as carrying secret material.
    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// The SQL text to send.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Whether the statement carries secret material.
    pub fn is_sensitive(&self) -> bool {
        self.sensitive
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.sensitive {
            return f.write_str(&self.sql);
        }
        match self.sql.find(" WITH (") {
            Some(idx) => write!(f, "{} WITH (<redacted>)", &self.sql[..idx]),
            None => f.write_str("<redacted statement>"),
        }
    }
}

impl fmt::Debug for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Statement").field(&self.to_string()).finish()
    }
}

/// Session-scoped context sent with every statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    /// Organization the session acts in.
    pub organization: Option<String>,
    /// Active role; the role that owns created objects.
    pub role: Option<String>,
    /// Active database.
    pub database: Option<String>,
    /// Active schema within the active database.
    pub schema: Option<String>,
}

impl SessionContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the active role.
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Set the active database.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the active schema.
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }
}

/// Client for the remote catalog.
#[async_trait::async_trait]
pub trait CatalogClient: Send + Sync {
    /// Run a statement within the given session context.
    ///
    /// Queries return their result rows; DDL returns the rows describing the
    /// created artifact, which may be empty.
    async fn query(
        &self,
        session: &SessionContext,
        statement: &Statement,
    ) -> Result<Vec<Row>, CatalogError>;
}

/// Opens catalog clients from provider configuration.
#[async_trait::async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Connect using the given configuration.
    async fn connect(
        &self,
        config: &ProviderConfig,
    ) -> Result<Arc<dyn CatalogClient>, CatalogError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_accessors() {
        let ts = DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let row = Row::new()
            .with("name", "db1")
            .with("is_default", true)
            .with("created_at", ts)
            .with("comment", CatalogValue::Null);

        assert_eq!(row.text("name"), Some("db1"));
        assert_eq!(row.bool("is_default"), Some(true));
        assert_eq!(row.text("comment"), None);
        assert_eq!(
            row.get("created_at").map(CatalogValue::to_json),
            Some(serde_json::json!("2024-05-01T10:00:00+00:00"))
        );
    }

    #[test]
    fn test_statement_redaction() {
        let plain = Statement::new("DROP SECRET \"s\"");
        assert_eq!(plain.to_string(), "DROP SECRET \"s\"");

        let secret =
            Statement::new("CREATE SECRET \"s\" WITH ('string' = 'hunter2')").sensitive();
        assert_eq!(secret.to_string(), "CREATE SECRET \"s\" WITH (<redacted>)");
        assert!(!format!("{:?}", secret).contains("hunter2"));
        assert!(secret.sql().contains("hunter2"));

        let opaque = Statement::new("SET PASSWORD 'x'").sensitive();
        assert_eq!(opaque.to_string(), "<redacted statement>");
    }

    #[test]
    fn test_session_context_builder() {
        let ctx = SessionContext::new()
            .with_role("sysadmin")
            .with_database("db")
            .with_schema("public");
        assert_eq!(ctx.role.as_deref(), Some("sysadmin"));
        assert_eq!(ctx.database.as_deref(), Some("db"));
        assert_eq!(ctx.schema.as_deref(), Some("public"));
        assert_eq!(ctx.organization, None);
    }
}
