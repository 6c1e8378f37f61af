//! Version triggers.
//!
//! | trigger                     | fires when                                        |
//! |-----------------------------|---------------------------------------------------|
//! | `outcome`                   | the version finished                              |
//! | `failure`                   | the version failed                                |
//! | `success`                   | the version succeeded                             |
//! | `regression`                | a mainline version failed with a regressed task   |
//! | `exceeds-duration`          | the version ran at least N seconds                |
//! | `runtime-change-by-percent` | runtime moved N% against the last success         |

use std::sync::Arc;

use crate::error::{ExecutionError, FetchError, TriggerResult};
use crate::event::{Event, ResourceType};
use crate::notification::{PayloadBuilder, ResourceSummary};
use crate::resource::{Requester, Status, Task};
use crate::selector::{version_selectors, Selector, OBJECT_VERSION};
use crate::snapshot::VersionSnapshot;
use crate::subscription::Subscription;
use crate::time::RunWindow;
use crate::trigger::{
    predicates, Deferred, EventHandler, Firing, HandlerContext, TriggerFn, TriggerKind, TriggerTable,
};

/// Handler for one version event.
pub struct VersionTriggers {
    event: Event,
    snapshot: VersionSnapshot,
    selectors: Vec<Selector>,
    ctx: HandlerContext,
    last_successful: Deferred<Option<RunWindow>>,
    tasks: Deferred<Arc<[Task]>>,
}

impl VersionTriggers {
    /// Fetch the version and prepare the handler.
    ///
    /// # Errors
    ///
    /// Propagates the [`FetchError`] from loading the version.
    pub fn fetch(event: &Event, ctx: &HandlerContext) -> Result<Self, FetchError> {
        let snapshot = ctx.sources.fetch_version(event)?;
        let selectors = version_selectors(&snapshot.version);
        Ok(Self {
            event: event.clone(),
            snapshot,
            selectors,
            ctx: ctx.clone(),
            last_successful: Deferred::new(),
            tasks: Deferred::new(),
        })
    }

    /// [`HandlerFactory`](crate::trigger::HandlerFactory) for version state changes.
    ///
    /// # Errors
    ///
    /// As [`VersionTriggers::fetch`].
    pub fn factory(event: &Event, ctx: &HandlerContext) -> Result<Box<dyn EventHandler>, FetchError> {
        Ok(Box::new(Self::fetch(event, ctx)?))
    }

    /// The fetched snapshot.
    #[must_use]
    pub const fn snapshot(&self) -> &VersionSnapshot {
        &self.snapshot
    }

    fn outcome(&self, _sub: &Subscription) -> TriggerResult<Option<Firing>> {
        Ok(predicates::outcome(self.snapshot.status))
    }

    fn failure(&self, _sub: &Subscription) -> TriggerResult<Option<Firing>> {
        Ok(predicates::failure(self.snapshot.status))
    }

    fn success(&self, _sub: &Subscription) -> TriggerResult<Option<Firing>> {
        Ok(predicates::success(self.snapshot.status))
    }

    fn exceeds_duration(&self, sub: &Subscription) -> TriggerResult<Option<Firing>> {
        predicates::exceeds_duration(self.snapshot.status, &self.snapshot.version.window(), sub)
    }

    fn runtime_change(&self, sub: &Subscription) -> TriggerResult<Option<Firing>> {
        let version = &self.snapshot.version;
        predicates::runtime_change(self.snapshot.status, &version.window(), sub, || {
            self.last_successful.get_or_fetch(|| {
                let found = self
                    .ctx
                    .sources
                    .versions()
                    .find_last_successful(&version.lineage())?;
                Ok(found.map(|v| v.window()))
            })
        })
    }

    fn regression(&self, sub: &Subscription) -> TriggerResult<Option<Firing>> {
        let version = &self.snapshot.version;
        if self.snapshot.status != Status::Failed || version.requester != Requester::Repotracker {
            return Ok(None);
        }

        let tasks = self.tasks.get_or_fetch(|| {
            let mut tasks = self.ctx.sources.tasks().find_by_version(&version.id, true)?;
            tasks.sort_by(|a, b| a.id.cmp(&b.id));
            Ok(tasks.into())
        })?;

        let classifier = self.ctx.sources.classifier();
        for task in tasks.iter() {
            if classifier
                .is_regression(sub, task)
                .map_err(ExecutionError::from)?
            {
                tracing::debug!(
                    version_id = %version.id,
                    task_id = %task.id,
                    subscription_id = %sub.id,
                    "Regressed task found"
                );
                return Ok(Some(Firing::plain()));
            }
        }
        Ok(None)
    }
}

impl TriggerTable for VersionTriggers {
    const RESOURCE_TYPE: ResourceType = ResourceType::Version;

    const TRIGGERS: &'static [(TriggerKind, TriggerFn<Self>)] = &[
        (TriggerKind::Outcome, Self::outcome),
        (TriggerKind::Failure, Self::failure),
        (TriggerKind::Success, Self::success),
        (TriggerKind::Regression, Self::regression),
        (TriggerKind::ExceedsDuration, Self::exceeds_duration),
        (TriggerKind::RuntimeChangeByPercent, Self::runtime_change),
    ];

    fn event(&self) -> &Event {
        &self.event
    }

    fn resource_selectors(&self) -> &[Selector] {
        &self.selectors
    }

    fn builder(&self) -> &PayloadBuilder {
        &self.ctx.builder
    }

    fn summary(&self) -> TriggerResult<ResourceSummary> {
        let version = &self.snapshot.version;
        Ok(ResourceSummary {
            object: OBJECT_VERSION,
            id: version.id.to_string(),
            display_name: version.id.to_string(),
            project: version.identifier.clone(),
            status: self.snapshot.status,
            title: "Evergreen Version".to_string(),
            text: version.message.clone(),
            api_model: ResourceSummary::api_model_of("version", version)?,
        })
    }
}
