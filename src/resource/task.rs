//! Tasks, including display tasks that group execution tasks.

use serde::{Deserialize, Serialize};

use super::{string_id, BuildId, Requester, Status, VersionId};

string_id! {
    /// Identifies a task.
    TaskId
}

/// Persisted state of a task.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,

    /// Name shared by every run of this task across revisions.
    pub display_name: String,

    pub version: VersionId,
    pub build_id: BuildId,
    pub build_variant: String,
    pub project: String,
    pub requester: Requester,
    pub revision_order: u64,
    pub status: Status,

    /// True for display tasks, which only group other tasks.
    #[serde(default)]
    pub display_only: bool,

    /// Tasks grouped under this one. Empty unless `display_only`.
    #[serde(default)]
    pub execution_tasks: Vec<TaskId>,

    /// The display task this task is grouped under, if any.
    #[serde(default)]
    pub display_task_id: Option<TaskId>,
}

impl Task {
    /// True if `other` is an earlier run of the same task.
    #[must_use]
    pub fn is_earlier_run_of(&self, other: &Self) -> bool {
        self.project == other.project
            && self.build_variant == other.build_variant
            && self.display_name == other.display_name
            && self.requester == other.requester
            && self.revision_order < other.revision_order
    }
}
