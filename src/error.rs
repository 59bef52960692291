/// Engine error taxonomy
///
/// Business-level failures are carried inside `ActionResult` as a cause; these
/// variants classify them so callers and tests can match on the kind of failure.

use crate::definition::types::ActionType;
use thiserror::Error;

/// Error type shared by the definition, runtime and session layers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Module, session or field reference absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Field type mismatch, malformed step, return-field count mismatch
    #[error("Validation error: {0}")]
    Validation(String),

    /// SQL error, divide-by-zero, unresolvable label
    #[error("Execution failed: {0}")]
    Execution(String),

    /// Call-depth or iteration ceiling exceeded
    #[error("Resource limit exceeded: {0}")]
    ResourceLimit(String),

    /// Operation not valid in the session's current state
    #[error("Invalid session state: {0}")]
    State(String),

    /// No executor registered for an action type
    #[error("No executor registered for action type {0:?}")]
    UnsupportedAction(ActionType),

    /// Connection or driver level database failure
    #[error("Database error: {0}")]
    Database(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The caller cancelled the operation
    #[error("Operation cancelled")]
    Cancelled,
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        EngineError::Database(err.to_string())
    }
}
