//! Read-only storage traits consumed by the engine.
//!
//! The persistence layer is an external collaborator. These traits define
//! the contract it must satisfy:
//! - A missing primary resource is `Ok(None)`, never an error, so callers
//!   can tell "deleted" apart from "storage unavailable".
//! - Lookups of earlier runs return `Ok(None)` when no such run exists.

use thiserror::Error;

use crate::resource::build::BuildLineage;
use crate::resource::version::VersionLineage;
use crate::resource::{Build, BuildId, Task, TaskId, Version, VersionId};

/// Errors that can occur during storage operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Version not found.
    #[error("Version not found: {0}")]
    VersionNotFound(String),

    /// Build not found.
    #[error("Build not found: {0}")]
    BuildNotFound(String),

    /// Task not found.
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// Key already exists.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// Backend error.
    #[error("Storage backend error: {0}")]
    BackendError(String),

    /// Stored document could not be decoded.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Connection failed.
    #[error("Connection error: {0}")]
    ConnectionError(String),
}

impl StorageError {
    /// True for failures that may clear up on a later attempt.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::BackendError(_) | Self::ConnectionError(_))
    }
}

/// Storage trait for versions.
pub trait VersionStore: Send + Sync {
    /// Get a version by ID.
    fn get(&self, id: &VersionId) -> Result<Option<Version>, StorageError>;

    /// The most recent successful version in `lineage`.
    ///
    /// "Most recent" is the latest finish time; ties go to the later start
    /// time, then to the greater id, so the answer is deterministic.
    fn find_last_successful(
        &self,
        lineage: &VersionLineage,
    ) -> Result<Option<Version>, StorageError>;
}

/// Storage trait for builds.
pub trait BuildStore: Send + Sync {
    /// Get a build by ID.
    fn get(&self, id: &BuildId) -> Result<Option<Build>, StorageError>;

    /// The most recent successful build in `lineage`, with the same
    /// tie-breaking as [`VersionStore::find_last_successful`].
    fn find_last_successful(&self, lineage: &BuildLineage) -> Result<Option<Build>, StorageError>;
}

/// Storage trait for tasks.
pub trait TaskStore: Send + Sync {
    /// Get a task by ID.
    fn get(&self, id: &TaskId) -> Result<Option<Task>, StorageError>;

    /// All tasks of a version.
    ///
    /// With `include_display_tasks`, display tasks are returned alongside the
    /// execution tasks grouped under them; without it only execution tasks
    /// are returned.
    fn find_by_version(
        &self,
        version: &VersionId,
        include_display_tasks: bool,
    ) -> Result<Vec<Task>, StorageError>;

    /// The most recent earlier run of `task` that reached a terminal status.
    fn find_previous_completed(&self, task: &Task) -> Result<Option<Task>, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time test: ensure traits are object-safe
    fn _assert_version_store_object_safe(_: &dyn VersionStore) {}
    fn _assert_build_store_object_safe(_: &dyn BuildStore) {}
    fn _assert_task_store_object_safe(_: &dyn TaskStore) {}

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::VersionNotFound("v1".to_string());
        assert!(err.to_string().contains("Version not found"));

        let err = StorageError::BackendError("connection refused".to_string());
        assert!(err.to_string().contains("connection refused"));
        assert!(err.is_transient());
        assert!(!StorageError::TaskNotFound("t".to_string()).is_transient());
    }
}
