//! Trigger evaluation.
//!
//! A handler is built fresh for each event by the factory registered for the
//! event's (resource type, kind). It holds the fetched snapshot and exposes a
//! fixed table mapping trigger names to predicate functions. Handlers are
//! discarded after the event is dispatched; nothing carries over between
//! events.

/// Build handler and its trigger table.
pub mod build;
/// Shared predicates and subscription parameter parsing.
pub mod predicates;
/// Process-wide handler registry.
pub mod registry;
/// Task-level regression classification.
pub mod regression;
/// Version handler and its trigger table.
pub mod version;

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, TriggerResult};
use crate::event::{Event, ResourceType};
use crate::notification::{Notification, PayloadBuilder, ResourceSummary};
use crate::selector::Selector;
use crate::snapshot::DataSources;
use crate::storage::StorageError;
use crate::subscription::Subscription;

pub use registry::{HandlerFactory, RegistryBuilder, RegistryError, TriggerRegistry};
pub use regression::{ClassifierError, RegressionClassifier, TaskHistoryClassifier};

/// The trigger vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerKind {
    /// The resource finished, succeeded or failed.
    Outcome,
    /// The resource failed.
    Failure,
    /// The resource succeeded.
    Success,
    /// A task failed that passed on its previous run.
    Regression,
    /// The run took at least the configured number of seconds.
    ExceedsDuration,
    /// The runtime moved by at least the configured percentage.
    RuntimeChangeByPercent,
}

impl TriggerKind {
    /// Every trigger name, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Outcome,
        Self::Failure,
        Self::Success,
        Self::Regression,
        Self::ExceedsDuration,
        Self::RuntimeChangeByPercent,
    ];

    /// Name used in subscriptions.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Outcome => "outcome",
            Self::Failure => "failure",
            Self::Success => "success",
            Self::Regression => "regression",
            Self::ExceedsDuration => "exceeds-duration",
            Self::RuntimeChangeByPercent => "runtime-change-by-percent",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|k| k.as_str() == s).ok_or(())
    }
}

/// A trigger decided to fire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Firing {
    /// Replaces the default past-tense status text, e.g. `exceeded 120 seconds`.
    pub past_tense_override: Option<String>,
}

impl Firing {
    /// Fire with the default status text.
    #[must_use]
    pub const fn plain() -> Self {
        Self {
            past_tense_override: None,
        }
    }

    /// Fire with a custom status text.
    #[must_use]
    pub fn with_status(text: impl Into<String>) -> Self {
        Self {
            past_tense_override: Some(text.into()),
        }
    }
}

/// A predicate over handler `H` for one subscription.
///
/// `Ok(None)` means "do not notify" and is not an error.
pub type TriggerFn<H> = fn(&H, &Subscription) -> TriggerResult<Option<Firing>>;

/// Shared, cheap-to-clone dependencies for handlers.
#[derive(Clone)]
pub struct HandlerContext {
    /// Stores and the regression classifier.
    pub sources: DataSources,
    /// Payload builder bound to the UI base URL.
    pub builder: PayloadBuilder,
}

/// A per-event handler instance.
pub trait EventHandler: Send + Sync {
    /// The resource type this handler evaluates.
    fn resource_type(&self) -> ResourceType;

    /// Selectors derived from the fetched snapshot.
    fn selectors(&self) -> &[Selector];

    /// Trigger names this handler offers.
    fn triggers(&self) -> Vec<TriggerKind>;

    /// Evaluate `sub`'s trigger and build its notification if it fires.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] for unknown triggers or bad
    /// parameters, an `ExecutionError` for lookup or classifier failures,
    /// and a `BuildError` if the payload cannot be assembled.
    fn process(&self, sub: &Subscription) -> TriggerResult<Option<Notification>>;
}

/// Look up the trigger function a subscription names.
pub(crate) fn resolve<H>(
    table: &[(TriggerKind, TriggerFn<H>)],
    resource_type: ResourceType,
    sub: &Subscription,
) -> Result<TriggerFn<H>, ConfigurationError> {
    let kind: TriggerKind = sub
        .trigger
        .parse()
        .map_err(|()| ConfigurationError::UnknownTrigger {
            subscription_id: sub.id.to_string(),
            trigger: sub.trigger.clone(),
        })?;

    table
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, f)| *f)
        .ok_or_else(|| ConfigurationError::UnsupportedTrigger {
            subscription_id: sub.id.to_string(),
            trigger: sub.trigger.clone(),
            resource_type: resource_type.to_string(),
        })
}

/// A handler described by a static trigger table.
///
/// Implementors get [`EventHandler`] for free: the subscription's trigger
/// name is resolved against [`TriggerTable::TRIGGERS`], the predicate runs,
/// and a fired trigger is turned into a [`Notification`].
pub trait TriggerTable: Sized + Send + Sync + 'static {
    /// Resource type the table applies to.
    const RESOURCE_TYPE: ResourceType;

    /// Trigger name to predicate.
    const TRIGGERS: &'static [(TriggerKind, TriggerFn<Self>)];

    /// The event being handled.
    fn event(&self) -> &Event;

    /// Selectors of the fetched resource.
    fn resource_selectors(&self) -> &[Selector];

    /// Payload builder for fired triggers.
    fn builder(&self) -> &PayloadBuilder;

    /// Summary of the fetched resource for the payload.
    ///
    /// # Errors
    ///
    /// Returns a `BuildError` if the resource model cannot be serialized.
    fn summary(&self) -> TriggerResult<ResourceSummary>;
}

impl<H: TriggerTable> EventHandler for H {
    fn resource_type(&self) -> ResourceType {
        H::RESOURCE_TYPE
    }

    fn selectors(&self) -> &[Selector] {
        self.resource_selectors()
    }

    fn triggers(&self) -> Vec<TriggerKind> {
        H::TRIGGERS.iter().map(|(k, _)| *k).collect()
    }

    fn process(&self, sub: &Subscription) -> TriggerResult<Option<Notification>> {
        let trigger = resolve(H::TRIGGERS, H::RESOURCE_TYPE, sub)?;
        let Some(firing) = trigger(self, sub)? else {
            return Ok(None);
        };

        let summary = self.summary()?;
        let payload = self.builder().build(
            &summary,
            sub,
            self.resource_selectors(),
            firing.past_tense_override.as_deref(),
        )?;
        Ok(Some(Notification::new(self.event(), sub, payload)))
    }
}

/// Auxiliary data fetched on first use and shared by every subscription of
/// the event.
///
/// A failed fetch is cached too: within one event the answer is the same
/// for every subscription, and retrying is the caller's business.
#[derive(Debug)]
pub struct Deferred<T> {
    cell: OnceLock<Result<T, StorageError>>,
}

impl<T> Default for Deferred<T> {
    fn default() -> Self {
        Self {
            cell: OnceLock::new(),
        }
    }
}

impl<T: Clone> Deferred<T> {
    /// An empty cell.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached value, running `fetch` if this is the first call.
    ///
    /// # Errors
    ///
    /// Returns the (cached) storage error from the first fetch.
    pub fn get_or_fetch<F>(&self, fetch: F) -> Result<T, StorageError>
    where
        F: FnOnce() -> Result<T, StorageError>,
    {
        self.cell.get_or_init(fetch).clone()
    }

    /// True once a fetch has completed.
    #[must_use]
    pub fn is_fetched(&self) -> bool {
        self.cell.get().is_some()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::selector::SelectorType;
    use crate::subscription::Subscriber;

    struct AlwaysFires;

    impl AlwaysFires {
        fn always(&self, _sub: &Subscription) -> TriggerResult<Option<Firing>> {
            Ok(Some(Firing::plain()))
        }
    }

    const TABLE: &[(TriggerKind, TriggerFn<AlwaysFires>)] = &[(TriggerKind::Outcome, AlwaysFires::always)];

    fn sub(trigger: &str) -> Subscription {
        Subscription::new(
            "s1",
            trigger,
            vec![Selector::new(SelectorType::Project, "p")],
            Subscriber::Email {
                address: "a@b.c".to_string(),
            },
        )
    }

    #[test]
    fn trigger_names_round_trip() {
        for kind in TriggerKind::ALL {
            assert_eq!(kind.as_str().parse::<TriggerKind>(), Ok(kind));
        }
        assert!("sometimes".parse::<TriggerKind>().is_err());
        assert_eq!(
            serde_json::to_string(&TriggerKind::RuntimeChangeByPercent).unwrap(),
            "\"runtime-change-by-percent\""
        );
    }

    #[test]
    fn resolve_distinguishes_unknown_from_unsupported() {
        let f = resolve(TABLE, ResourceType::Version, &sub("outcome")).unwrap();
        assert_eq!(f(&AlwaysFires, &sub("outcome")).unwrap(), Some(Firing::plain()));

        assert!(matches!(
            resolve(TABLE, ResourceType::Version, &sub("nonsense")),
            Err(ConfigurationError::UnknownTrigger { .. })
        ));
        assert!(matches!(
            resolve(TABLE, ResourceType::Build, &sub("regression")),
            Err(ConfigurationError::UnsupportedTrigger { .. })
        ));
    }

    #[test]
    fn deferred_fetches_once_and_caches_errors() {
        let calls = Cell::new(0);
        let ok: Deferred<u32> = Deferred::new();
        assert!(!ok.is_fetched());
        for _ in 0..3 {
            let v = ok
                .get_or_fetch(|| {
                    calls.set(calls.get() + 1);
                    Ok(7)
                })
                .unwrap();
            assert_eq!(v, 7);
        }
        assert_eq!(calls.get(), 1);
        assert!(ok.is_fetched());

        let failing: Deferred<u32> = Deferred::new();
        let first = failing.get_or_fetch(|| Err(StorageError::ConnectionError("down".to_string())));
        let second = failing.get_or_fetch(|| Ok(1));
        assert_eq!(first, second);
    }
}
