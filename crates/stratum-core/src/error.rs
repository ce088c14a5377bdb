// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for stratum-core.
//!
//! Every variant carries a stable code so callers can map failures without
//! parsing messages.

use std::fmt;

/// Result type using CoreError
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors returned by the executor, the todo actor and persistence.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum CoreError {
    /// Run was not found in the store.
    RunNotFound {
        /// The run ID that was not found.
        run_id: String,
    },

    /// A run with this id was already started.
    RunAlreadyExists {
        /// The run ID that already exists.
        run_id: String,
    },

    /// Run is in an invalid state for the requested operation.
    InvalidRunState {
        /// The run ID.
        run_id: String,
        /// The expected status.
        expected: String,
        /// The actual status.
        actual: String,
    },

    /// Node does not exist in the run's tree.
    NodeNotFound {
        /// The run ID.
        run_id: String,
        /// The missing node.
        node_id: String,
    },

    /// Node is in an invalid state for the requested operation.
    InvalidNodeState {
        /// The run ID.
        run_id: String,
        /// The node ID.
        node_id: String,
        /// The expected status.
        expected: String,
        /// The actual status.
        actual: String,
    },

    /// Todo was not found.
    TodoNotFound {
        /// The todo ID that was not found.
        todo_id: String,
    },

    /// Todo was already processed by someone.
    TodoAlreadyProcessed {
        /// The todo ID.
        todo_id: String,
        /// Its current status.
        status: String,
    },

    /// User may not process this todo.
    TodoWrongOperator {
        /// The todo ID.
        todo_id: String,
        /// The rejected user.
        username: String,
    },

    /// Input validation failed.
    ValidationError {
        /// The field that failed validation.
        field: String,
        /// The validation error message.
        message: String,
    },

    /// Database operation failed.
    DatabaseError {
        /// The operation that failed.
        operation: String,
        /// Error details.
        details: String,
    },
}

impl CoreError {
    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::RunNotFound { .. } => "RUN_NOT_FOUND",
            Self::RunAlreadyExists { .. } => "RUN_ALREADY_EXISTS",
            Self::InvalidRunState { .. } => "INVALID_RUN_STATE",
            Self::NodeNotFound { .. } => "NODE_NOT_FOUND",
            Self::InvalidNodeState { .. } => "INVALID_NODE_STATE",
            Self::TodoNotFound { .. } => "TODO_NOT_FOUND",
            Self::TodoAlreadyProcessed { .. } => "TODO_ALREADY_PROCESSED",
            Self::TodoWrongOperator { .. } => "TODO_WRONG_OPERATOR",
            Self::ValidationError { .. } => "VALIDATION_ERROR",
            Self::DatabaseError { .. } => "DATABASE_ERROR",
        }
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RunNotFound { run_id } => write!(f, "Run '{}' not found", run_id),
            Self::RunAlreadyExists { run_id } => write!(f, "Run '{}' already exists", run_id),
            Self::InvalidRunState {
                run_id,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "Run '{}' is in invalid state: expected '{}', got '{}'",
                    run_id, expected, actual
                )
            }
            Self::NodeNotFound { run_id, node_id } => {
                write!(f, "Node '{}' not found in run '{}'", node_id, run_id)
            }
            Self::InvalidNodeState {
                run_id,
                node_id,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "Node '{}' of run '{}' is in invalid state: expected '{}', got '{}'",
                    node_id, run_id, expected, actual
                )
            }
            Self::TodoNotFound { todo_id } => write!(f, "Todo '{}' not found", todo_id),
            Self::TodoAlreadyProcessed { todo_id, status } => {
                write!(
                    f,
                    "Todo '{}' was already processed (status '{}')",
                    todo_id, status
                )
            }
            Self::TodoWrongOperator { todo_id, username } => {
                write!(f, "User '{}' may not process todo '{}'", username, todo_id)
            }
            Self::ValidationError { field, message } => {
                write!(f, "Validation error for '{}': {}", field, message)
            }
            Self::DatabaseError { operation, details } => {
                write!(f, "Database error during '{}': {}", operation, details)
            }
        }
    }
}

impl std::error::Error for CoreError {}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        CoreError::DatabaseError {
            operation: "query".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::DatabaseError {
            operation: "json".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<stratum_pipeline::BuildError> for CoreError {
    fn from(err: stratum_pipeline::BuildError) -> Self {
        CoreError::ValidationError {
            field: "tree".to_string(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let test_cases = vec![
            (
                CoreError::RunNotFound {
                    run_id: "r".to_string(),
                },
                "RUN_NOT_FOUND",
            ),
            (
                CoreError::InvalidRunState {
                    run_id: "r".to_string(),
                    expected: "paused".to_string(),
                    actual: "running".to_string(),
                },
                "INVALID_RUN_STATE",
            ),
            (
                CoreError::TodoAlreadyProcessed {
                    todo_id: "t".to_string(),
                    status: "approved".to_string(),
                },
                "TODO_ALREADY_PROCESSED",
            ),
            (
                CoreError::DatabaseError {
                    operation: "insert".to_string(),
                    details: "disk full".to_string(),
                },
                "DATABASE_ERROR",
            ),
        ];

        for (error, expected_code) in test_cases {
            assert_eq!(error.error_code(), expected_code, "{}", error);
        }
    }

    #[test]
    fn test_display_includes_ids() {
        let err = CoreError::InvalidNodeState {
            run_id: "run-1".to_string(),
            node_id: "n4".to_string(),
            expected: "failed".to_string(),
            actual: "succeeded".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("run-1"));
        assert!(msg.contains("n4"));
        assert!(msg.contains("expected 'failed'"));
    }

    #[test]
    fn test_from_serde_error() {
        let err: CoreError = serde_json::from_str::<u32>("x").unwrap_err().into();
        assert!(matches!(err, CoreError::DatabaseError { ref operation, .. } if operation == "json"));
    }
}
