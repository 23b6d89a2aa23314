//! Domain errors for the procflow engine.

use thiserror::Error;

/// Domain-level errors raised by the task engine.
///
/// Routing refusals (no predecessor, ambiguous path, ...) are not errors:
/// reject and withdraw report them through `RoutingOutcome::Refused`.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Copy task not found: {0}")]
    CopyTaskNotFound(String),

    #[error("Attachment not found: {0}")]
    AttachmentNotFound(String),

    #[error("Process definition not found: {0}")]
    ProcessDefinitionNotFound(String),

    #[error("Process instance not found: {0}")]
    ProcessInstanceNotFound(String),

    #[error("Node {node_key} not found in process definition {definition_id}")]
    NodeNotFound { definition_id: String, node_key: String },

    #[error("Execution not found: {0}")]
    ExecutionNotFound(String),

    #[error("Task {task_id} is already claimed by {assignee}")]
    AlreadyClaimed { task_id: String, assignee: String },

    #[error("Invalid state for task {task_id}: {reason}")]
    InvalidState { task_id: String, reason: String },

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Concurrency conflict: {entity} {id} was modified")]
    ConcurrencyConflict { entity: String, id: String },

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Expression error in '{expression}': {reason}")]
    ExpressionError { expression: String, reason: String },
}

pub type DomainResult<T> = Result<T, DomainError>;

impl DomainError {
    /// Whether this error is an infrastructure fault rather than a business rule violation.
    pub fn is_system_fault(&self) -> bool {
        matches!(
            self,
            Self::DatabaseError(_) | Self::SerializationError(_) | Self::ExpressionError { .. }
        )
    }

    pub(crate) fn invalid_state(task_id: &str, reason: impl Into<String>) -> Self {
        Self::InvalidState {
            task_id: task_id.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn conflict(entity: &str, id: &str) -> Self {
        Self::ConcurrencyConflict {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }
}

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_faults_are_separated_from_business_errors() {
        assert!(DomainError::DatabaseError("locked".into()).is_system_fault());
        assert!(DomainError::ExpressionError {
            expression: "a >".into(),
            reason: "eof".into()
        }
        .is_system_fault());
        assert!(!DomainError::TaskNotFound("t1".into()).is_system_fault());
        assert!(!DomainError::conflict("task", "t1").is_system_fault());
    }

    #[test]
    fn test_already_claimed_message() {
        let err = DomainError::AlreadyClaimed {
            task_id: "t1".into(),
            assignee: "kermit".into(),
        };
        assert_eq!(err.to_string(), "Task t1 is already claimed by kermit");
    }
}
