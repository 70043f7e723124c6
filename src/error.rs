//! Error taxonomy for task operations.
//!
//! Collaborator failures (store, dispatcher) are wrapped into
//! [`TaskError::Dependency`] by the retry layer. Ownership failures are
//! reported as [`TaskError::NotFound`] so a caller cannot tell a foreign
//! task from a missing one.

use thiserror::Error;

/// Errors surfaced by the task service.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The task does not exist or belongs to another owner.
    #[error("task not found or unauthorized: {id}")]
    NotFound { id: String },

    /// A referenced user profile is missing.
    #[error("user profile not found: {owner}")]
    ProfileNotFound { owner: String },

    /// The request is malformed or violates a task invariant.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The record store or notification dispatcher failed.
    #[error("{operation} failed after {attempts} attempt(s): {source}")]
    Dependency {
        operation: String,
        attempts: usize,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl TaskError {
    /// Shorthand for a validation failure.
    pub fn validation(message: impl Into<String>) -> Self {
        TaskError::Validation(message.into())
    }

    /// Message safe to show to an end user.
    ///
    /// Dependency failures hide their internal detail.
    pub fn public_message(&self) -> String {
        match self {
            TaskError::Dependency { .. } => {
                "The service is temporarily unavailable. Please try again later.".to_string()
            }
            other => other.to_string(),
        }
    }

    /// Whether the error was caused by the caller's input.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, TaskError::Dependency { .. })
    }
}

pub type TaskResult<T> = Result<T, TaskError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message_does_not_distinguish_owner() {
        let err = TaskError::NotFound {
            id: "t-1".to_string(),
        };
        assert_eq!(err.to_string(), "task not found or unauthorized: t-1");
        assert!(err.is_client_error());
    }

    #[test]
    fn test_dependency_public_message_hides_detail() {
        let err = TaskError::Dependency {
            operation: "store.get".to_string(),
            attempts: 3,
            source: "disk on fire".into(),
        };
        assert!(err.to_string().contains("disk on fire"));
        assert!(!err.public_message().contains("disk on fire"));
        assert!(!err.is_client_error());
    }
}
