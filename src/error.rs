//! Error types for the Stackform provisioning engine.
//!
//! This module provides a comprehensive error hierarchy for all stages of a
//! provisioning run: document parsing, graph construction, planning,
//! provider operations, and state management.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the Stackform provisioning engine.
#[derive(Debug, Error)]
pub enum StackformError {
    /// Input document errors.
    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    /// Resource graph construction errors.
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Planning and scheduling errors.
    #[error("Planning error: {0}")]
    Plan(#[from] PlanError),

    /// Provider API errors.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// State management errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Input document errors.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// The stack document was not found.
    #[error("Stack document not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The stack document could not be parsed.
    #[error("Failed to parse stack document: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Stack document validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Environment variable is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },
}

/// Resource graph construction errors.
#[derive(Debug, Error)]
pub enum GraphError {
    /// A property references a logical id that is not declared.
    #[error("Resource '{resource}' references unknown resource '{target}'")]
    MalformedReference {
        /// Resource containing the bad reference.
        resource: String,
        /// The referenced logical id that does not exist.
        target: String,
    },

    /// Two resources share the same logical id.
    #[error("Duplicate logical id: {id}")]
    DuplicateId {
        /// The duplicated logical id.
        id: String,
    },

    /// Dependency edges form a cycle.
    #[error("Cyclic dependency detected: {cycle}")]
    CyclicDependency {
        /// Description of the cycle.
        cycle: String,
    },
}

/// Planning and scheduling errors.
#[derive(Debug, Error)]
pub enum PlanError {
    /// No valid execution order exists for the change set.
    ///
    /// Defensive: reachable only if a cycle slipped past graph construction.
    #[error("No valid execution order for change set: {message}")]
    SchedulingConflict {
        /// Description of the conflict.
        message: String,
    },

    /// A change-set entry refers to a resource missing from graph and state.
    #[error("Change-set entry for unknown resource: {id}")]
    UnknownResource {
        /// The unknown logical id.
        id: String,
    },
}

/// Provider API errors.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Authentication failed.
    #[error("Provider authentication failed: {message}")]
    AuthenticationFailed {
        /// Description of the auth failure.
        message: String,
    },

    /// A create/update/delete operation was rejected or failed.
    #[error("Provider operation failed: {status} - {message}")]
    OperationFailed {
        /// HTTP status code.
        status: u16,
        /// Error detail from the provider.
        message: String,
    },

    /// Rate limited.
    #[error("Provider rate limited, retry after {retry_after_secs} seconds")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// Resource not found on the provider side.
    #[error("Resource not found: {provider_id}")]
    NotFound {
        /// Provider-assigned id of the missing resource.
        provider_id: String,
    },

    /// Network error.
    #[error("Network error communicating with provider: {message}")]
    NetworkError {
        /// Description of the network error.
        message: String,
    },

    /// Invalid response from the provider.
    #[error("Invalid response from provider: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },

    /// Timed out polling an asynchronous operation.
    #[error("Timeout waiting for operation {operation_id} to reach a terminal status")]
    Timeout {
        /// Provider-side operation id.
        operation_id: String,
    },

    /// A reference could not be resolved from a dependency's outputs.
    #[error("Resource '{resource}' has no output attribute '{attribute}'")]
    MissingOutput {
        /// Logical id of the referenced resource.
        resource: String,
        /// The missing output attribute.
        attribute: String,
    },
}

/// State management errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// State snapshot is corrupted.
    ///
    /// Fatal: a run aborts before any provider operation.
    #[error("State snapshot is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// State lock acquisition failed.
    #[error("Failed to acquire state lock: {message}")]
    LockFailed {
        /// Description of the lock failure.
        message: String,
    },

    /// State lock is held by another process.
    #[error("State is locked by another process (lock holder: {holder}, since: {since})")]
    LockedByOther {
        /// Identifier of the lock holder.
        holder: String,
        /// When the lock was acquired.
        since: String,
    },

    /// Serialization error.
    #[error("State serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },

    /// State version mismatch.
    #[error("State version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Expected state version.
        expected: String,
        /// Found state version.
        found: String,
    },

    /// Backend IO error.
    #[error("State backend error: {message}")]
    BackendError {
        /// Description of the backend error.
        message: String,
    },
}

/// Result type alias for Stackform operations.
pub type Result<T> = std::result::Result<T, StackformError>;

impl StackformError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Provider(
                ProviderError::RateLimited { .. } | ProviderError::NetworkError { .. }
            ) | Self::State(StateError::LockFailed { .. })
        )
    }

    /// Returns the suggested retry delay in seconds, if applicable.
    #[must_use]
    pub const fn retry_delay_secs(&self) -> Option<u64> {
        match self {
            Self::Provider(ProviderError::RateLimited { retry_after_secs }) => {
                Some(*retry_after_secs)
            }
            Self::Provider(ProviderError::NetworkError { .. }) => Some(5),
            Self::State(StateError::LockFailed { .. }) => Some(2),
            _ => None,
        }
    }

    /// Returns true if the error is fatal to the whole run before any
    /// provider mutation (safe to retry after fixing the input).
    #[must_use]
    pub const fn is_pre_run_fatal(&self) -> bool {
        matches!(
            self,
            Self::Document(_)
                | Self::Graph(_)
                | Self::Plan(_)
                | Self::State(StateError::Corrupted { .. } | StateError::VersionMismatch { .. })
        )
    }
}

impl DocumentError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a validation error without a specific field.
    #[must_use]
    pub fn validation_general(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: None,
        }
    }
}

impl ProviderError {
    /// Creates an operation failure from an HTTP status and detail.
    #[must_use]
    pub fn operation(status: u16, message: impl Into<String>) -> Self {
        Self::OperationFailed {
            status,
            message: message.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }
}

impl StateError {
    /// Creates a backend error with the given message.
    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::BackendError {
            message: message.into(),
        }
    }

    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }
}
