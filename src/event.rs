//! Events: immutable notices that a tracked resource changed state.
//!
//! The event payload is a tagged union per resource type, decoded once when
//! the event is read. A handler that receives a payload of the wrong shape
//! reports [`FetchError::DataShape`](crate::error::FetchError::DataShape)
//! instead of guessing.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::resource::Status;

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Create a new random event id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind of resource an event refers to.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceType {
    Version,
    Build,
    Task,
    Patch,
    Host,
}

impl ResourceType {
    /// Lowercase name used in messages, selectors and links.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Version => "version",
            Self::Build => "build",
            Self::Task => "task",
            Self::Patch => "patch",
            Self::Host => "host",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to the resource.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    StateChange,
    GithubCheckFinished,
    Created,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::StateChange => "STATE_CHANGE",
            Self::GithubCheckFinished => "GITHUB_CHECK_FINISHED",
            Self::Created => "CREATED",
        })
    }
}

/// Resource-specific data carried by an event.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "resource_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventData {
    Version { status: Status },
    Build { status: Status },
    Task { status: Status },
}

impl EventData {
    /// Name of the payload variant, for shape-mismatch reports.
    #[must_use]
    pub const fn shape(&self) -> &'static str {
        match self {
            Self::Version { .. } => "version",
            Self::Build { .. } => "build",
            Self::Task { .. } => "task",
        }
    }
}

/// An immutable record of a state change on a tracked resource.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub resource_type: ResourceType,
    pub kind: EventKind,
    pub resource_id: String,
    pub timestamp: DateTime<Utc>,
    pub data: EventData,
}

impl Event {
    /// Creates a new event with a fresh id.
    #[must_use]
    pub fn new(
        resource_type: ResourceType,
        kind: EventKind,
        resource_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        data: EventData,
    ) -> Self {
        Self {
            id: EventId::new(),
            resource_type,
            kind,
            resource_id: resource_id.into(),
            timestamp,
            data,
        }
    }

    /// Convenience constructor for a version state change.
    #[must_use]
    pub fn version_state_change(version_id: impl Into<String>, status: Status) -> Self {
        Self::new(
            ResourceType::Version,
            EventKind::StateChange,
            version_id,
            Utc::now(),
            EventData::Version { status },
        )
    }

    /// Convenience constructor for a build state change.
    #[must_use]
    pub fn build_state_change(build_id: impl Into<String>, status: Status) -> Self {
        Self::new(
            ResourceType::Build,
            EventKind::StateChange,
            build_id,
            Utc::now(),
            EventData::Build { status },
        )
    }
}
