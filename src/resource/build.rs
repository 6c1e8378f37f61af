//! Builds: the set of tasks for one build variant within a version.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{string_id, Requester, Status, VersionId};
use crate::time::RunWindow;

string_id! {
    /// Identifies a build.
    BuildId
}

/// Persisted state of a build.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Build {
    pub id: BuildId,

    /// Version the build belongs to.
    pub version: VersionId,

    /// Project identifier.
    pub project: String,

    /// Build variant name, e.g. `ubuntu2204`.
    pub build_variant: String,

    /// Human-readable variant name.
    #[serde(default)]
    pub display_name: String,

    pub requester: Requester,

    pub revision_order: u64,

    pub status: Status,

    pub start_time: DateTime<Utc>,
    pub finish_time: DateTime<Utc>,
}

impl Build {
    /// The start/finish interval of this build.
    #[must_use]
    pub const fn window(&self) -> RunWindow {
        RunWindow::new(self.start_time, self.finish_time)
    }

    /// The lineage used to find comparable earlier builds.
    #[must_use]
    pub fn lineage(&self) -> BuildLineage {
        BuildLineage {
            project: self.project.clone(),
            build_variant: self.build_variant.clone(),
            requester: self.requester,
            before_order: self.revision_order,
        }
    }
}

/// Builds of the same project, variant and requester before a revision.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BuildLineage {
    pub project: String,
    pub build_variant: String,
    pub requester: Requester,
    pub before_order: u64,
}

impl BuildLineage {
    /// True if `candidate` is an earlier run in this lineage.
    #[must_use]
    pub fn includes(&self, candidate: &Build) -> bool {
        candidate.project == self.project
            && candidate.build_variant == self.build_variant
            && candidate.requester == self.requester
            && candidate.revision_order < self.before_order
    }
}
