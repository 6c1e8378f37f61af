//! In-memory storage backend.
//!
//! Thread-safe implementations of the storage traits, intended for embedded
//! usage, tests, and as a reference for the collaborator contract. Writes are
//! inherent methods; the engine only sees the read-only traits.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use crate::resource::build::BuildLineage;
use crate::resource::version::VersionLineage;
use crate::resource::{Build, BuildId, Status, Task, TaskId, Version, VersionId};
use crate::storage::traits::{BuildStore, StorageError, TaskStore, VersionStore};

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

/// Orders candidate runs so the "most recent" one compares greatest.
fn recency<K: Ord>(
    a: (DateTime<Utc>, DateTime<Utc>, &K),
    b: (DateTime<Utc>, DateTime<Utc>, &K),
) -> Ordering {
    a.0.cmp(&b.0)
        .then_with(|| a.1.cmp(&b.1))
        .then_with(|| a.2.cmp(b.2))
}

/// Thread-safe in-memory version store.
#[derive(Debug, Default)]
pub struct InMemoryVersionStore {
    state: RwLock<BTreeMap<VersionId, Version>>,
}

impl InMemoryVersionStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new version. Returns error if the ID already exists.
    pub fn insert(&self, version: Version) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("version.insert"))?;
        if state.contains_key(&version.id) {
            return Err(StorageError::DuplicateKey(version.id.to_string()));
        }
        state.insert(version.id.clone(), version);
        Ok(())
    }

    /// Replace a stored version. Returns error if not found.
    pub fn update(&self, version: Version) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("version.update"))?;
        match state.get_mut(&version.id) {
            Some(slot) => {
                *slot = version;
                Ok(())
            }
            None => Err(StorageError::VersionNotFound(version.id.to_string())),
        }
    }

    /// Delete a version. Returns error if not found.
    pub fn remove(&self, id: &VersionId) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("version.remove"))?;
        state
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StorageError::VersionNotFound(id.to_string()))
    }
}

impl VersionStore for InMemoryVersionStore {
    fn get(&self, id: &VersionId) -> Result<Option<Version>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("version.get"))?;
        Ok(state.get(id).cloned())
    }

    fn find_last_successful(
        &self,
        lineage: &VersionLineage,
    ) -> Result<Option<Version>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("version.find_last_successful"))?;
        Ok(state
            .values()
            .filter(|v| v.status == Status::Succeeded && lineage.includes(v))
            .max_by(|a, b| {
                recency(
                    (a.finish_time, a.start_time, &a.id),
                    (b.finish_time, b.start_time, &b.id),
                )
            })
            .cloned())
    }
}

/// Thread-safe in-memory build store.
#[derive(Debug, Default)]
pub struct InMemoryBuildStore {
    state: RwLock<BTreeMap<BuildId, Build>>,
}

impl InMemoryBuildStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new build. Returns error if the ID already exists.
    pub fn insert(&self, build: Build) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("build.insert"))?;
        if state.contains_key(&build.id) {
            return Err(StorageError::DuplicateKey(build.id.to_string()));
        }
        state.insert(build.id.clone(), build);
        Ok(())
    }
}

impl BuildStore for InMemoryBuildStore {
    fn get(&self, id: &BuildId) -> Result<Option<Build>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("build.get"))?;
        Ok(state.get(id).cloned())
    }

    fn find_last_successful(&self, lineage: &BuildLineage) -> Result<Option<Build>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("build.find_last_successful"))?;
        Ok(state
            .values()
            .filter(|b| b.status == Status::Succeeded && lineage.includes(b))
            .max_by(|a, b| {
                recency(
                    (a.finish_time, a.start_time, &a.id),
                    (b.finish_time, b.start_time, &b.id),
                )
            })
            .cloned())
    }
}

/// Thread-safe in-memory task store.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    state: RwLock<BTreeMap<TaskId, Task>>,
}

impl InMemoryTaskStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new task. Returns error if the ID already exists.
    pub fn insert(&self, task: Task) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("task.insert"))?;
        if state.contains_key(&task.id) {
            return Err(StorageError::DuplicateKey(task.id.to_string()));
        }
        state.insert(task.id.clone(), task);
        Ok(())
    }
}

impl TaskStore for InMemoryTaskStore {
    fn get(&self, id: &TaskId) -> Result<Option<Task>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("task.get"))?;
        Ok(state.get(id).cloned())
    }

    fn find_by_version(
        &self,
        version: &VersionId,
        include_display_tasks: bool,
    ) -> Result<Vec<Task>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("task.find_by_version"))?;
        Ok(state
            .values()
            .filter(|t| &t.version == version)
            .filter(|t| include_display_tasks || !t.display_only)
            .cloned()
            .collect())
    }

    fn find_previous_completed(&self, task: &Task) -> Result<Option<Task>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("task.find_previous_completed"))?;
        Ok(state
            .values()
            .filter(|t| t.status.is_terminal() && t.is_earlier_run_of(task))
            .max_by(|a, b| {
                a.revision_order
                    .cmp(&b.revision_order)
                    .then_with(|| a.id.cmp(&b.id))
            })
            .cloned())
    }
}

/// Bundle of in-memory stores.
#[derive(Debug, Default)]
pub struct InMemoryStores {
    /// Version store.
    pub versions: InMemoryVersionStore,
    /// Build store.
    pub builds: InMemoryBuildStore,
    /// Task store.
    pub tasks: InMemoryTaskStore,
}

impl InMemoryStores {
    /// Create a new bundle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}
