//! Build triggers.
//!
//! Same vocabulary as versions minus `regression`, which is only defined for
//! versions.

use crate::error::{FetchError, TriggerResult};
use crate::event::{Event, ResourceType};
use crate::notification::{PayloadBuilder, ResourceSummary};
use crate::selector::{build_selectors, Selector, OBJECT_BUILD};
use crate::snapshot::BuildSnapshot;
use crate::subscription::Subscription;
use crate::time::RunWindow;
use crate::trigger::{
    predicates, Deferred, EventHandler, Firing, HandlerContext, TriggerFn, TriggerKind, TriggerTable,
};

/// Handler for one build event.
pub struct BuildTriggers {
    event: Event,
    snapshot: BuildSnapshot,
    selectors: Vec<Selector>,
    ctx: HandlerContext,
    last_successful: Deferred<Option<RunWindow>>,
}

impl BuildTriggers {
    /// Fetch the build and prepare the handler.
    ///
    /// # Errors
    ///
    /// Propagates the [`FetchError`] from loading the build.
    pub fn fetch(event: &Event, ctx: &HandlerContext) -> Result<Self, FetchError> {
        let snapshot = ctx.sources.fetch_build(event)?;
        let selectors = build_selectors(&snapshot.build);
        Ok(Self {
            event: event.clone(),
            snapshot,
            selectors,
            ctx: ctx.clone(),
            last_successful: Deferred::new(),
        })
    }

    /// [`HandlerFactory`](crate::trigger::HandlerFactory) for build state changes.
    ///
    /// # Errors
    ///
    /// As [`BuildTriggers::fetch`].
    pub fn factory(event: &Event, ctx: &HandlerContext) -> Result<Box<dyn EventHandler>, FetchError> {
        Ok(Box::new(Self::fetch(event, ctx)?))
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
        predicates::exceeds_duration(self.snapshot.status, &self.snapshot.build.window(), sub)
    }

    fn runtime_change(&self, sub: &Subscription) -> TriggerResult<Option<Firing>> {
        let build = &self.snapshot.build;
        predicates::runtime_change(self.snapshot.status, &build.window(), sub, || {
            self.last_successful.get_or_fetch(|| {
                let found = self.ctx.sources.builds().find_last_successful(&build.lineage())?;
                Ok(found.map(|b| b.window()))
            })
        })
    }

    fn display_name(&self) -> &str {
        let build = &self.snapshot.build;
        if build.display_name.is_empty() {
            &build.build_variant
        } else {
            &build.display_name
        }
    }
}

impl TriggerTable for BuildTriggers {
    const RESOURCE_TYPE: ResourceType = ResourceType::Build;

    const TRIGGERS: &'static [(TriggerKind, TriggerFn<Self>)] = &[
        (TriggerKind::Outcome, Self::outcome),
        (TriggerKind::Failure, Self::failure),
        (TriggerKind::Success, Self::success),
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
        let build = &self.snapshot.build;
        Ok(ResourceSummary {
            object: OBJECT_BUILD,
            id: build.id.to_string(),
            display_name: self.display_name().to_string(),
            project: build.project.clone(),
            status: self.snapshot.status,
            title: "Evergreen Build".to_string(),
            text: format!("{} on {}", self.display_name(), build.build_variant),
            api_model: ResourceSummary::api_model_of("build", build)?,
        })
    }
}
