//! Loading the resource an event refers to.
//!
//! Each event is fetched exactly once, before any subscription is evaluated.
//! A missing resource, or event data of the wrong shape, aborts the whole
//! event with a [`FetchError`].

use std::sync::Arc;

use crate::error::FetchError;
use crate::event::{Event, EventData, ResourceType};
use crate::resource::build::BuildLineage;
use crate::resource::version::VersionLineage;
use crate::resource::{Build, BuildId, Status, Task, TaskId, Version, VersionId};
use crate::storage::{BuildStore, InMemoryStores, StorageError, TaskStore, VersionStore};
use crate::trigger::{RegressionClassifier, TaskHistoryClassifier};

/// Read-only collaborators consulted while handling events.
#[derive(Clone)]
pub struct DataSources {
    versions: Arc<dyn VersionStore>,
    builds: Arc<dyn BuildStore>,
    tasks: Arc<dyn TaskStore>,
    classifier: Arc<dyn RegressionClassifier>,
}

impl DataSources {
    /// Wire up stores. Regressions are classified from task history by default.
    pub fn new(
        versions: Arc<dyn VersionStore>,
        builds: Arc<dyn BuildStore>,
        tasks: Arc<dyn TaskStore>,
    ) -> Self {
        let classifier = Arc::new(TaskHistoryClassifier::new(Arc::clone(&tasks)));
        Self {
            versions,
            builds,
            tasks,
            classifier,
        }
    }

    /// Share an in-memory bundle.
    pub fn in_memory(stores: &Arc<InMemoryStores>) -> Self {
        let versions: Arc<dyn VersionStore> = Arc::new(StoreRef {
            stores: Arc::clone(stores),
        });
        let builds: Arc<dyn BuildStore> = Arc::new(StoreRef {
            stores: Arc::clone(stores),
        });
        let tasks: Arc<dyn TaskStore> = Arc::new(StoreRef {
            stores: Arc::clone(stores),
        });
        Self::new(versions, builds, tasks)
    }

    /// Replace the regression classifier.
    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<dyn RegressionClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Version store.
    pub fn versions(&self) -> &dyn VersionStore {
        self.versions.as_ref()
    }

    /// Build store.
    pub fn builds(&self) -> &dyn BuildStore {
        self.builds.as_ref()
    }

    /// Task store.
    pub fn tasks(&self) -> &dyn TaskStore {
        self.tasks.as_ref()
    }

    /// Regression classifier.
    pub fn classifier(&self) -> &dyn RegressionClassifier {
        self.classifier.as_ref()
    }

    /// Load the version a version event refers to.
    ///
    /// # Errors
    ///
    /// `DataShape` if the event data is not version data, `NotFound` if the
    /// version does not exist, `Storage` if the lookup itself failed.
    pub fn fetch_version(&self, event: &Event) -> Result<VersionSnapshot, FetchError> {
        let EventData::Version { status } = event.data else {
            return Err(shape_error(event, ResourceType::Version));
        };
        let version = self
            .versions
            .get(&VersionId::new(event.resource_id.as_str()))?
            .ok_or_else(|| not_found(event, ResourceType::Version))?;
        Ok(VersionSnapshot { version, status })
    }

    /// Load the build a build event refers to.
    ///
    /// # Errors
    ///
    /// As [`DataSources::fetch_version`].
    pub fn fetch_build(&self, event: &Event) -> Result<BuildSnapshot, FetchError> {
        let EventData::Build { status } = event.data else {
            return Err(shape_error(event, ResourceType::Build));
        };
        let build = self
            .builds
            .get(&BuildId::new(event.resource_id.as_str()))?
            .ok_or_else(|| not_found(event, ResourceType::Build))?;
        Ok(BuildSnapshot { build, status })
    }
}

/// A fetched version plus the status the event reported.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionSnapshot {
    /// The stored version record.
    pub version: Version,
    /// Status carried by the event.
    pub status: Status,
}

/// A fetched build plus the status the event reported.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildSnapshot {
    /// The stored build record.
    pub build: Build,
    /// Status carried by the event.
    pub status: Status,
}

fn shape_error(event: &Event, expected: ResourceType) -> FetchError {
    FetchError::DataShape {
        resource_type: expected.to_string(),
        id: event.resource_id.clone(),
        expected: expected.to_string(),
        actual: event.data.shape().to_string(),
    }
}

fn not_found(event: &Event, resource_type: ResourceType) -> FetchError {
    FetchError::NotFound {
        resource_type: resource_type.to_string(),
        id: event.resource_id.clone(),
    }
}

/// Lets one shared [`InMemoryStores`] back all three store traits.
struct StoreRef {
    stores: Arc<InMemoryStores>,
}

impl VersionStore for StoreRef {
    fn get(&self, id: &VersionId) -> Result<Option<Version>, StorageError> {
        self.stores.versions.get(id)
    }

    fn find_last_successful(&self, lineage: &VersionLineage) -> Result<Option<Version>, StorageError> {
        self.stores.versions.find_last_successful(lineage)
    }
}

impl BuildStore for StoreRef {
    fn get(&self, id: &BuildId) -> Result<Option<Build>, StorageError> {
        self.stores.builds.get(id)
    }

    fn find_last_successful(&self, lineage: &BuildLineage) -> Result<Option<Build>, StorageError> {
        self.stores.builds.find_last_successful(lineage)
    }
}

impl TaskStore for StoreRef {
    fn get(&self, id: &TaskId) -> Result<Option<Task>, StorageError> {
        self.stores.tasks.get(id)
    }

    fn find_by_version(
        &self,
        version: &VersionId,
        include_display_tasks: bool,
    ) -> Result<Vec<Task>, StorageError> {
        self.stores.tasks.find_by_version(version, include_display_tasks)
    }

    fn find_previous_completed(&self, task: &Task) -> Result<Option<Task>, StorageError> {
        self.stores.tasks.find_previous_completed(task)
    }
}
