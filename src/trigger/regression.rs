//! Task-level regression classification.
//!
//! A version "regressed" when at least one of its tasks is a regression. What
//! counts as a task regression is decided by a [`RegressionClassifier`]; the
//! default, [`TaskHistoryClassifier`], compares a failed task against its
//! previous completed run.

use std::sync::Arc;

use thiserror::Error;

use crate::error::ExecutionError;
use crate::resource::{Status, Task};
use crate::storage::TaskStore;
use crate::subscription::Subscription;

/// The classifier could not decide.
#[allow(missing_docs)]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("cannot classify task '{task_id}': {message}")]
pub struct ClassifierError {
    pub task_id: String,
    pub message: String,
}

impl From<ClassifierError> for ExecutionError {
    fn from(err: ClassifierError) -> Self {
        Self::Classifier {
            task_id: err.task_id,
            message: err.message,
        }
    }
}

/// Decides whether one task's result is a regression for a subscription.
pub trait RegressionClassifier: Send + Sync {
    /// # Errors
    ///
    /// Returns a [`ClassifierError`] if the decision needs data that could
    /// not be read.
    fn is_regression(&self, sub: &Subscription, task: &Task) -> Result<bool, ClassifierError>;
}

/// Classifies from task history.
///
/// A task regressed when it failed, was created by the system (not a patch
/// or an ad-hoc run), and its previous completed run either succeeded or
/// does not exist.
pub struct TaskHistoryClassifier {
    tasks: Arc<dyn TaskStore>,
}

impl TaskHistoryClassifier {
    /// Classify against the history in `tasks`.
    #[must_use]
    pub fn new(tasks: Arc<dyn TaskStore>) -> Self {
        Self { tasks }
    }
}

impl RegressionClassifier for TaskHistoryClassifier {
    fn is_regression(&self, _sub: &Subscription, task: &Task) -> Result<bool, ClassifierError> {
        if task.status != Status::Failed || !task.requester.is_system() {
            return Ok(false);
        }

        let previous = self
            .tasks
            .find_previous_completed(task)
            .map_err(|e| ClassifierError {
                task_id: task.id.to_string(),
                message: e.to_string(),
            })?;

        Ok(match previous {
            Some(p) => p.status == Status::Succeeded,
            None => true,
        })
    }
}
