//! Resource models consumed from the storage collaborator.
//!
//! These are read-only views of persisted CI resources. The engine never
//! writes them back.

pub mod build;
pub mod task;
pub mod version;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use build::{Build, BuildId};
pub use task::{Task, TaskId};
pub use version::{Version, VersionId};

// ---------------------------------------------------------------------------
// String-backed identifiers.
// Generates: struct, new(), as_str(), Display, From<&str>.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps a raw identifier.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

pub(crate) use string_id;

/// Lifecycle status shared by versions, builds and tasks.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Created,
    Undispatched,
    Dispatched,
    Started,
    #[serde(rename = "success")]
    Succeeded,
    Failed,
    #[serde(other)]
    Unknown,
}

impl Status {
    /// The persisted string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Undispatched => "undispatched",
            Self::Dispatched => "dispatched",
            Self::Started => "started",
            Self::Succeeded => "success",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        }
    }

    /// True for `success` and `failed`, the only states triggers act on.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What caused a version (and everything under it) to be created.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Requester {
    /// Mainline commit picked up by the repository tracker.
    #[serde(rename = "gitter_request")]
    Repotracker,
    #[serde(rename = "patch_request")]
    Patch,
    #[serde(rename = "github_pull_request")]
    GithubPullRequest,
    /// Downstream project trigger.
    #[serde(rename = "trigger_request")]
    Trigger,
    #[serde(rename = "ad_hoc")]
    AdHoc,
    #[serde(rename = "merge_test")]
    MergeTest,
}

impl Requester {
    /// The persisted string form, also used as the `requester` selector value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Repotracker => "gitter_request",
            Self::Patch => "patch_request",
            Self::GithubPullRequest => "github_pull_request",
            Self::Trigger => "trigger_request",
            Self::AdHoc => "ad_hoc",
            Self::MergeTest => "merge_test",
        }
    }

    /// Requesters created by the system itself rather than by a user.
    #[must_use]
    pub const fn is_system(self) -> bool {
        matches!(self, Self::Repotracker | Self::Trigger)
    }
}

impl fmt::Display for Requester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
