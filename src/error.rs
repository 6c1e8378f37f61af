//! Error types for the trigger engine.
//!
//! Errors are strongly typed using thiserror and grouped by the scope they
//! affect. Only a [`FetchError`] on the primary resource aborts a whole
//! event; every other error is scoped to a single subscription and is
//! reported alongside the outcomes of its siblings.

use thiserror::Error;

use crate::storage::StorageError;

/// Failures loading the resource an event refers to.
#[allow(missing_docs)]
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FetchError {
    #[error("{resource_type} '{id}' not found")]
    NotFound {
        resource_type: String,
        id: String,
    },

    #[error("{resource_type} '{id}' carries unexpected event data: expected {expected}, got {actual}")]
    DataShape {
        resource_type: String,
        id: String,
        expected: String,
        actual: String,
    },

    #[error("Storage error while fetching: {0}")]
    Storage(#[from] StorageError),
}

/// Problems with a subscription or with the engine's own configuration.
#[allow(missing_docs)]
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("Unknown trigger '{trigger}' on subscription {subscription_id}")]
    UnknownTrigger {
        subscription_id: String,
        trigger: String,
    },

    #[error("Trigger '{trigger}' is not available for {resource_type} events (subscription {subscription_id})")]
    UnsupportedTrigger {
        subscription_id: String,
        trigger: String,
        resource_type: String,
    },

    #[error("Subscription {subscription_id} has no '{key}' parameter")]
    MissingParameter {
        subscription_id: String,
        key: String,
    },

    #[error("Subscription {subscription_id} has an invalid '{key}' parameter: '{value}'")]
    InvalidParameter {
        subscription_id: String,
        key: String,
        value: String,
    },

    #[error("Subscription {subscription_id} is invalid: {reason}")]
    InvalidSubscription {
        subscription_id: String,
        reason: String,
    },

    #[error("Invalid engine configuration: {}", problems.join("; "))]
    InvalidEngineConfig {
        problems: Vec<String>,
    },

    #[error("Failed to read engine configuration: {message}")]
    Unreadable {
        message: String,
    },
}

/// Failures while evaluating a trigger predicate.
#[allow(missing_docs)]
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("Regression classifier failed on task '{task_id}': {message}")]
    Classifier {
        task_id: String,
        message: String,
    },

    #[error("Storage error: {message}")]
    Storage {
        message: String,
    },

    #[error("Admin settings unavailable: {message}")]
    Settings {
        message: String,
    },

    #[error("Operation timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },

    #[error("Channel disconnected: {path}")]
    Disconnected {
        path: String,
    },

    #[error("Too many dispatches in flight ({in_flight})")]
    Saturated {
        in_flight: usize,
    },
}

/// Failures assembling a notification payload.
#[allow(missing_docs)]
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BuildError {
    #[error("No UI URL configured; cannot link to {object} '{id}'")]
    MissingUiUrl {
        object: String,
        id: String,
    },

    #[error("Failed to build {model} model: {message}")]
    Model {
        model: String,
        message: String,
    },
}

/// Top-level error type for the engine.
#[allow(missing_docs)]
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TriggerError {
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl TriggerError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a fetch error.
    #[must_use]
    pub const fn is_fetch(&self) -> bool {
        matches!(self, Self::Fetch(_))
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns true if this is a build error.
    #[must_use]
    pub const fn is_build(&self) -> bool {
        matches!(self, Self::Build(_))
    }

    /// Returns true if the referenced resource no longer exists.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Fetch(FetchError::NotFound { .. })
                | Self::Fetch(FetchError::Storage(
                    StorageError::VersionNotFound(_)
                        | StorageError::BuildNotFound(_)
                        | StorageError::TaskNotFound(_)
                ))
        )
    }

    /// Returns true if a caller-side retry may succeed.
    ///
    /// The engine never retries on its own.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Fetch(FetchError::Storage(e)) => e.is_transient(),
            Self::Fetch(_) => false,
            Self::Configuration(_) => false, // won't change on retry
            Self::Execution(e) => matches!(
                e,
                ExecutionError::Timeout { .. }
                    | ExecutionError::Saturated { .. }
                    | ExecutionError::Storage { .. }
                    | ExecutionError::Settings { .. }
            ),
            Self::Build(_) => false,
            Self::Internal { .. } => false,
        }
    }
}

impl From<StorageError> for TriggerError {
    fn from(err: StorageError) -> Self {
        Self::Execution(ExecutionError::Storage {
            message: err.to_string(),
        })
    }
}

/// Result type alias for engine operations.
pub type TriggerResult<T> = Result<T, TriggerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_not_found() {
        let err = FetchError::NotFound {
            resource_type: "version".to_string(),
            id: "v1".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("version 'v1' not found"));

        let err: TriggerError = err.into();
        assert!(err.is_fetch());
        assert!(err.is_not_found());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_fetch_error_data_shape() {
        let err = FetchError::DataShape {
            resource_type: "version".to_string(),
            id: "v1".to_string(),
            expected: "version".to_string(),
            actual: "build".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("expected version"));
        assert!(msg.contains("got build"));
    }

    #[test]
    fn test_configuration_error_invalid_parameter() {
        let err = ConfigurationError::InvalidParameter {
            subscription_id: "sub-3".to_string(),
            key: "duration-threshold-seconds".to_string(),
            value: "soon".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("sub-3"));
        assert!(msg.contains("soon"));

        let err: TriggerError = err.into();
        assert!(err.is_configuration());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_engine_config_error_lists_all_problems() {
        let err = ConfigurationError::InvalidEngineConfig {
            problems: vec!["ui_url is empty".to_string(), "workers too large".to_string()],
        };
        let msg = format!("{err}");
        assert!(msg.contains("ui_url is empty; workers too large"));
    }

    #[test]
    fn test_execution_error_timeout_is_retryable() {
        let err: TriggerError = ExecutionError::Timeout { duration_ms: 250 }.into();
        assert!(err.is_execution());
        assert!(err.is_retryable());
        assert!(err.to_string().contains("250ms"));
    }

    #[test]
    fn test_classifier_error_is_not_retryable() {
        let err: TriggerError = ExecutionError::Classifier {
            task_id: "t1".to_string(),
            message: "history unavailable".to_string(),
        }
        .into();
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("t1"));
    }

    #[test]
    fn test_transient_storage_fetch_is_retryable() {
        let err: TriggerError =
            FetchError::Storage(StorageError::ConnectionError("reset".to_string())).into();
        assert!(err.is_retryable());
        assert!(!err.is_not_found());

        let err: TriggerError =
            FetchError::Storage(StorageError::VersionNotFound("v9".to_string())).into();
        assert!(err.is_not_found());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_trigger_error_internal() {
        let err = TriggerError::internal("unexpected state");
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("unexpected state"));
    }
}
