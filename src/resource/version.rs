//! Versions: one commit (or patch) of a project and all the builds under it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{string_id, Requester, Status};
use crate::time::RunWindow;

string_id! {
    /// Identifies a version.
    VersionId
}

/// Persisted state of a version.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    pub id: VersionId,

    /// Project identifier the version belongs to.
    pub identifier: String,

    pub requester: Requester,

    /// Author's user id. Empty for commits without a linked user.
    #[serde(default)]
    pub author_id: String,

    /// Display name of the commit author.
    #[serde(default)]
    pub author: String,

    /// Monotonic position of the commit in the project's history.
    pub revision_order: u64,

    pub status: Status,

    pub start_time: DateTime<Utc>,
    pub finish_time: DateTime<Utc>,

    /// Commit message (or patch description).
    #[serde(default)]
    pub message: String,

    #[serde(default)]
    pub revision: String,
}

impl Version {
    /// The start/finish interval of this version.
    #[must_use]
    pub const fn window(&self) -> RunWindow {
        RunWindow::new(self.start_time, self.finish_time)
    }

    /// The lineage used to find comparable earlier runs.
    #[must_use]
    pub fn lineage(&self) -> VersionLineage {
        VersionLineage {
            project: self.identifier.clone(),
            requester: self.requester,
            before_order: self.revision_order,
        }
    }
}

/// Versions of the same project and requester that precede a given revision.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionLineage {
    pub project: String,
    pub requester: Requester,
    /// Only versions with a strictly lower revision order qualify.
    pub before_order: u64,
}

impl VersionLineage {
    /// True if `candidate` is an earlier run in this lineage.
    #[must_use]
    pub fn includes(&self, candidate: &Version) -> bool {
        candidate.identifier == self.project
            && candidate.requester == self.requester
            && candidate.revision_order < self.before_order
    }
}
