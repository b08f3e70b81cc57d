//! Result and error types for the core library

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Core library error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    /// A migration unit's SQL was rejected by the database.
    #[error("{message}")]
    UnitExecution {
        message: String,
        statement_index: Option<usize>,
    },

    #[error("Phase order error: {0}")]
    PhaseOrder(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Anchor not found: {0}")]
    AnchorNotFound(String),

    #[error("Registration list not found: {0}")]
    RegistryNotFound(String),

    #[error("Duplicate migration unit: {0}")]
    DuplicateUnit(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a unit execution error without statement granularity
    pub fn unit(msg: impl Into<String>) -> Self {
        Self::UnitExecution {
            message: msg.into(),
            statement_index: None,
        }
    }

    /// Statement index reported by the execution surface, if any
    pub fn statement_index(&self) -> Option<usize> {
        match self {
            Self::UnitExecution { statement_index, .. } => *statement_index,
            _ => None,
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db) => Self::unit(db.to_string()),
            sqlx::Error::Configuration(e) => Self::Config(e.to_string()),
            other => Self::Database(other.to_string()),
        }
    }
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;

/// Operation result with optional context (for transport serialization)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub context: Option<HashMap<String, serde_json::Value>>,
}

impl<T> OperationResult<T> {
    /// Create a successful result
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            context: None,
        }
    }

    /// Create a failed result
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            context: None,
        }
    }

    /// Create a failed result with context
    pub fn fail_with_context(
        error: impl Into<String>,
        context: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            context: Some(context),
        }
    }
}

impl<T> From<Result<T>> for OperationResult<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::fail(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_result_ok() {
        let result: OperationResult<i32> = OperationResult::ok(42);
        assert!(result.success);
        assert_eq!(result.data, Some(42));
        assert!(result.error.is_none());
    }

    #[test]
    fn test_operation_result_fail() {
        let result: OperationResult<i32> = OperationResult::fail("Something went wrong");
        assert!(!result.success);
        assert!(result.data.is_none());
        assert_eq!(result.error, Some("Something went wrong".to_string()));
    }

    #[test]
    fn test_from_result() {
        let ok: Result<i32> = Ok(42);
        let result: OperationResult<i32> = ok.into();
        assert!(result.success);

        let err: Result<i32> = Err(Error::config("DATABASE_URL is not set"));
        let result: OperationResult<i32> = err.into();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("Configuration error"));
    }

    #[test]
    fn test_unit_execution_message_is_verbatim() {
        let err = Error::UnitExecution {
            message: "relation \"orgs\" does not exist".to_string(),
            statement_index: Some(2),
        };
        assert_eq!(err.to_string(), "relation \"orgs\" does not exist");
        assert_eq!(err.statement_index(), Some(2));
        assert_eq!(Error::unit("boom").statement_index(), None);
    }
}
