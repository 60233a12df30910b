//! Domain errors for the automation core.

use thiserror::Error;
use uuid::Uuid;

/// Domain-level errors. Caller-visible failures are wrapped into
/// structured API responses at the service boundary; nothing in this
/// taxonomy crosses the API as a panic.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("Rule not found: {0}")]
    RuleNotFound(Uuid),

    #[error("Completion criterion not found: {criterion} on task {task}")]
    CriterionNotFound { task: Uuid, criterion: Uuid },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Webhook authentication failed: {0}")]
    Authentication(String),

    #[error("Unknown webhook endpoint: {0}")]
    UnknownEndpoint(String),

    #[error("Automation rule '{rule}' failed on task {task}: {reason}")]
    AutomationExecution {
        rule: String,
        task: Uuid,
        reason: String,
    },

    #[error("External system '{binding}' error: {reason}")]
    ExternalSystem { binding: String, reason: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::Serialization(err.to_string())
    }
}
