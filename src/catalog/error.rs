//! Coded errors returned by the remote catalog.
//!
//! The reconciler branches on [`ErrorCode`] rather than on message text:
//! a drop that fails with the kind's "invalid object" code is an idempotent
//! success, a lookup that fails with it means the object is gone.

use std::fmt;

use thiserror::Error;

/// Stable identifiers carried by catalog errors.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The referenced database does not exist.
    InvalidDatabase,
    /// The referenced schema does not exist.
    InvalidSchema,
    /// The referenced relation does not exist.
    InvalidRelation,
    /// The referenced query does not exist.
    InvalidQuery,
    /// The referenced secret does not exist.
    InvalidSecret,
    /// The referenced store does not exist.
    InvalidStore,
    /// The referenced schema registry does not exist.
    InvalidSchemaRegistry,
    /// The object cannot be dropped while other objects depend on it.
    DependentObjectsStillExist,
    /// An object with the same name already exists.
    DuplicateObject,
    /// The connection to the catalog failed.
    Connection,
    /// Any other SQLSTATE reported by the catalog.
    Other(String),
}

impl ErrorCode {
    /// Parse the SQLSTATE string reported by the driver.
    pub fn from_sqlstate(state: &str) -> Self {
        match state {
            "3D018" => Self::InvalidDatabase,
            "3F018" => Self::InvalidSchema,
            "42P01" => Self::InvalidRelation,
            "42Q18" => Self::InvalidQuery,
            "42S18" => Self::InvalidSecret,
            "42T18" => Self::InvalidStore,
            "42R18" => Self::InvalidSchemaRegistry,
            "2BP01" => Self::DependentObjectsStillExist,
            "42710" => Self::DuplicateObject,
            "08000" => Self::Connection,
            other => Self::Other(other.to_string()),
        }
    }

    /// The SQLSTATE string for this code.
    pub fn sqlstate(&self) -> &str {
        match self {
            Self::InvalidDatabase => "3D018",
            Self::InvalidSchema => "3F018",
            Self::InvalidRelation => "42P01",
            Self::InvalidQuery => "42Q18",
            Self::InvalidSecret => "42S18",
            Self::InvalidStore => "42T18",
            Self::InvalidSchemaRegistry => "42R18",
            Self::DependentObjectsStillExist => "2BP01",
            Self::DuplicateObject => "42710",
            Self::Connection => "08000",
            Self::Other(state) => state,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sqlstate())
    }
}

/// An error reported by the remote catalog.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[{code}] {message}")]
pub struct CatalogError {
    /// The coded reason.
    pub code: ErrorCode,
    /// The message reported by the catalog.
    pub message: String,
}

impl CatalogError {
    /// Create a new catalog error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Create an error from a raw SQLSTATE.
    pub fn from_sqlstate(state: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::from_sqlstate(state), message)
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Connection, message)
    }

    /// Whether this error carries one of the given codes.
    pub fn is_any(&self, codes: &[ErrorCode]) -> bool {
        codes.contains(&self.code)
    }
}
