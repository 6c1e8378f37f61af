//! Event dispatch.
//!
//! For each event the dispatcher:
//!
//! 1. reads the admin settings once,
//! 2. resolves the handler factory for the event's (resource type, kind),
//! 3. fetches the primary resource once (a failure here aborts the event),
//! 4. evaluates every subscription, in parallel, against the same snapshot,
//! 5. returns one [`Outcome`] per subscription, in input order.
//!
//! Failures after step 3 are confined to the subscription that caused them.
//!
//! Counters are updated only by the caller's thread, from the report it
//! returns. A worker that outlives its timeout is told to stop and its late
//! result is dropped unseen.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, RecvTimeoutError};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::{EngineConfig, ServiceFlags, SettingsSource};
use crate::error::{ExecutionError, TriggerError, TriggerResult};
use crate::event::{Event, EventId};
use crate::notification::{Notification, PayloadBuilder};
use crate::selector::Selector;
use crate::snapshot::DataSources;
use crate::subscription::{SubscriberKind, Subscription, SubscriptionId};
use crate::trigger::{EventHandler, HandlerContext, TriggerRegistry};

/// Why a subscription produced no notification without failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Event processing is switched off in the admin settings.
    ProcessingDisabled,
    /// Nothing is registered for the event's (resource type, kind).
    NoHandler,
    /// Delivery through this subscriber kind is switched off.
    SubscriberDisabled(SubscriberKind),
    /// The trigger was evaluated and did not fire.
    NotTriggered,
}

/// Result for one subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The trigger fired and the notification was built.
    Notified(Notification),
    /// Nothing to deliver.
    Skipped(SkipReason),
    /// Evaluation failed for this subscription only.
    Failed(TriggerError),
}

impl Outcome {
    /// The notification, if one was built.
    #[must_use]
    pub const fn notification(&self) -> Option<&Notification> {
        match self {
            Self::Notified(n) => Some(n),
            _ => None,
        }
    }

    /// The error, if evaluation failed.
    #[must_use]
    pub const fn error(&self) -> Option<&TriggerError> {
        match self {
            Self::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// A subscription paired with its outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionOutcome {
    /// Subscription this outcome belongs to.
    pub subscription_id: SubscriptionId,
    /// What happened to it.
    pub outcome: Outcome,
}

/// Everything that happened for one event.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchReport {
    /// The dispatched event.
    pub event_id: EventId,
    /// Selectors of the fetched resource; empty if nothing was fetched.
    pub selectors: Vec<Selector>,
    /// One entry per input subscription, in input order.
    pub outcomes: Vec<SubscriptionOutcome>,
}

impl DispatchReport {
    fn uniform(event: &Event, subs: &[Subscription], outcome: &Outcome) -> Self {
        Self {
            event_id: event.id,
            selectors: Vec::new(),
            outcomes: subs
                .iter()
                .map(|s| SubscriptionOutcome {
                    subscription_id: s.id.clone(),
                    outcome: outcome.clone(),
                })
                .collect(),
        }
    }

    /// Built notifications, in subscription order.
    pub fn notifications(&self) -> impl Iterator<Item = &Notification> {
        self.outcomes.iter().filter_map(|o| o.outcome.notification())
    }

    /// Failed subscriptions with their errors.
    pub fn failures(&self) -> impl Iterator<Item = (&SubscriptionId, &TriggerError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.outcome.error().map(|e| (&o.subscription_id, e)))
    }

    /// Outcome for a given subscription.
    #[must_use]
    pub fn outcome_for(&self, id: &SubscriptionId) -> Option<&Outcome> {
        self.outcomes
            .iter()
            .find(|o| &o.subscription_id == id)
            .map(|o| &o.outcome)
    }

    /// Number of notified subscriptions.
    #[must_use]
    pub fn notified_count(&self) -> usize {
        self.notifications().count()
    }

    /// Number of failed subscriptions.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.failures().count()
    }

    /// Number of skipped subscriptions.
    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.outcome, Outcome::Skipped(_)))
            .count()
    }
}

/// Counters accumulated across events.
#[derive(Debug, Default)]
struct Counters {
    events: AtomicU64,
    aborted_events: AtomicU64,
    notifications: AtomicU64,
    failures: AtomicU64,
}

/// Holds one slot of the timed-dispatch budget until dropped.
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    /// Take a slot, or return the current count if none is free.
    fn try_enter(counter: &Arc<AtomicUsize>, max: usize) -> Result<Self, usize> {
        let previous = counter.fetch_add(1, Ordering::AcqRel);
        if previous >= max {
            counter.fetch_sub(1, Ordering::AcqRel);
            return Err(previous);
        }
        Ok(Self(Arc::clone(counter)))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Point-in-time copy of the dispatcher counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    /// Events dispatched.
    pub events: u64,
    /// Events abandoned because the primary fetch failed or timed out.
    pub aborted_events: u64,
    /// Notifications built.
    pub notifications: u64,
    /// Subscriptions that failed.
    pub failures: u64,
}

/// Evaluates events against subscriptions.
///
/// Cheap to clone; clones share the registry, data sources and counters.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<TriggerRegistry>,
    ctx: HandlerContext,
    settings: Arc<dyn SettingsSource>,
    workers: usize,
    timeout: Option<Duration>,
    max_in_flight: usize,
    in_flight: Arc<AtomicUsize>,
    counters: Arc<Counters>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .field("workers", &self.workers)
            .field("timeout", &self.timeout)
            .field("in_flight", &self.in_flight_dispatches())
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Create a dispatcher from validated configuration.
    pub fn new(
        registry: Arc<TriggerRegistry>,
        sources: DataSources,
        settings: Arc<dyn SettingsSource>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            registry,
            ctx: HandlerContext {
                sources,
                builder: PayloadBuilder::new(config.ui_url.as_str()),
            },
            settings,
            workers: config.workers.max(1),
            timeout: config.dispatch_timeout_ms.map(Duration::from_millis),
            max_in_flight: config.max_in_flight_dispatches.max(1),
            in_flight: Arc::new(AtomicUsize::new(0)),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            events: self.counters.events.load(Ordering::Relaxed),
            aborted_events: self.counters.aborted_events.load(Ordering::Relaxed),
            notifications: self.counters.notifications.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
        }
    }

    /// Timed dispatch workers still running, including timed-out ones.
    #[must_use]
    pub fn in_flight_dispatches(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Evaluate `event` against `subs`, honouring the configured timeout.
    ///
    /// Subscriptions are assumed to be the ones matching the event's
    /// selectors already; matching is the subscription source's job.
    ///
    /// # Errors
    ///
    /// Returns `TriggerError::Fetch` if the event's resource cannot be
    /// loaded. Every other problem is reported per subscription in the
    /// returned [`DispatchReport`].
    pub fn dispatch(&self, event: &Event, subs: &[Subscription]) -> TriggerResult<DispatchReport> {
        if let Some(limit) = self.timeout {
            return self.dispatch_within(event, subs, limit);
        }
        let result = self.run(event, subs, &AtomicBool::new(false));
        self.record(&result);
        result
    }

    /// Like [`Dispatcher::dispatch`] with an explicit deadline.
    ///
    /// Evaluation runs on a worker thread. If it does not finish within
    /// `limit`, every subscription is reported as failed with
    /// `ExecutionError::Timeout`. The worker is told to stop before its next
    /// subscription, its late result is discarded, and the counters are
    /// untouched by it. While `max_in_flight_dispatches` workers are still
    /// running, new calls fail every subscription with
    /// `ExecutionError::Saturated` without spawning.
    ///
    /// # Errors
    ///
    /// As [`Dispatcher::dispatch`], plus `TriggerError::Internal` if the
    /// worker thread cannot be spawned.
    pub fn dispatch_within(
        &self,
        event: &Event,
        subs: &[Subscription],
        limit: Duration,
    ) -> TriggerResult<DispatchReport> {
        let slot = match InFlight::try_enter(&self.in_flight, self.max_in_flight) {
            Ok(slot) => slot,
            Err(in_flight) => {
                warn!(event_id = %event.id, in_flight, "Too many dispatches in flight");
                let result = Ok(DispatchReport::uniform(
                    event,
                    subs,
                    &Outcome::Failed(TriggerError::Execution(ExecutionError::Saturated {
                        in_flight,
                    })),
                ));
                self.record(&result);
                return result;
            }
        };

        let (tx, rx) = bounded::<TriggerResult<DispatchReport>>(1);
        let cancelled = Arc::new(AtomicBool::new(false));

        let this = self.clone();
        let owned_event = event.clone();
        let owned_subs = subs.to_vec();
        let worker_cancelled = Arc::clone(&cancelled);
        thread::Builder::new()
            .name("ci-triggers-dispatch".to_string())
            .spawn(move || {
                let _slot = slot;
                let _ = tx.send(this.run(&owned_event, &owned_subs, &worker_cancelled));
            })
            .map_err(|e| TriggerError::internal(format!("failed to spawn dispatch worker: {e}")))?;

        let failure = match rx.recv_timeout(limit) {
            Ok(result) => {
                self.record(&result);
                return result;
            }
            Err(RecvTimeoutError::Timeout) => {
                cancelled.store(true, Ordering::Release);
                let duration_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);
                error!(
                    event_id = %event.id,
                    resource_id = %event.resource_id,
                    duration_ms,
                    "Event dispatch timed out"
                );
                ExecutionError::Timeout { duration_ms }
            }
            Err(RecvTimeoutError::Disconnected) => {
                error!(event_id = %event.id, "Dispatch worker exited without a result");
                ExecutionError::Disconnected {
                    path: "dispatch_worker".to_string(),
                }
            }
        };

        let result = Ok(DispatchReport::uniform(
            event,
            subs,
            &Outcome::Failed(TriggerError::Execution(failure)),
        ));
        self.record(&result);
        self.counters.aborted_events.fetch_add(1, Ordering::Relaxed);
        result
    }

    /// Fold one dispatch result into the counters.
    fn record(&self, result: &TriggerResult<DispatchReport>) {
        self.counters.events.fetch_add(1, Ordering::Relaxed);
        match result {
            Ok(report) => {
                self.counters
                    .notifications
                    .fetch_add(report.notified_count() as u64, Ordering::Relaxed);
                self.counters
                    .failures
                    .fetch_add(report.failed_count() as u64, Ordering::Relaxed);
            }
            Err(_) => {
                self.counters.aborted_events.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn run(
        &self,
        event: &Event,
        subs: &[Subscription],
        cancelled: &AtomicBool,
    ) -> TriggerResult<DispatchReport> {
        let flags = match self.settings.service_flags() {
            Ok(flags) => flags,
            Err(e) => {
                warn!(event_id = %event.id, error = %e, "Admin settings unavailable");
                let err = TriggerError::Execution(ExecutionError::Settings {
                    message: e.to_string(),
                });
                return Ok(DispatchReport::uniform(event, subs, &Outcome::Failed(err)));
            }
        };

        if flags.event_processing_disabled {
            debug!(event_id = %event.id, "Event processing disabled, skipping");
            return Ok(DispatchReport::uniform(
                event,
                subs,
                &Outcome::Skipped(SkipReason::ProcessingDisabled),
            ));
        }

        let factory = match self.registry.lookup(event.resource_type, event.kind) {
            Ok(factory) => factory,
            Err(e) => {
                warn!(event_id = %event.id, error = %e, "No handler for event");
                return Ok(DispatchReport::uniform(
                    event,
                    subs,
                    &Outcome::Skipped(SkipReason::NoHandler),
                ));
            }
        };

        // Nobody waits for a cancelled run; skip the fetch.
        if subs.is_empty() || cancelled.load(Ordering::Acquire) {
            return Ok(DispatchReport {
                event_id: event.id,
                selectors: Vec::new(),
                outcomes: Vec::new(),
            });
        }

        let handler = factory(event, &self.ctx).map_err(|e| {
            error!(
                event_id = %event.id,
                resource_type = %event.resource_type,
                resource_id = %event.resource_id,
                error = %e,
                "Failed to fetch event resource"
            );
            TriggerError::Fetch(e)
        })?;

        let outcomes = self.evaluate_all(handler.as_ref(), subs, flags, cancelled);
        let report = DispatchReport {
            event_id: event.id,
            selectors: handler.selectors().to_vec(),
            outcomes,
        };

        info!(
            event_id = %event.id,
            resource_type = %event.resource_type,
            resource_id = %event.resource_id,
            subscriptions = subs.len(),
            notified = report.notified_count(),
            failed = report.failed_count(),
            skipped = report.skipped_count(),
            "Event dispatched"
        );

        Ok(report)
    }

    fn evaluate_all(
        &self,
        handler: &dyn EventHandler,
        subs: &[Subscription],
        flags: ServiceFlags,
        cancelled: &AtomicBool,
    ) -> Vec<SubscriptionOutcome> {
        let workers = self.workers.min(subs.len());
        if workers <= 1 {
            return subs
                .iter()
                .map(|sub| SubscriptionOutcome {
                    subscription_id: sub.id.clone(),
                    outcome: if cancelled.load(Ordering::Acquire) {
                        cancelled_outcome()
                    } else {
                        evaluate_one(handler, sub, flags)
                    },
                })
                .collect();
        }

        let (job_tx, job_rx) = bounded::<usize>(subs.len());
        let (done_tx, done_rx) = unbounded::<(usize, Outcome)>();
        for index in 0..subs.len() {
            // Capacity equals the job count.
            let _ = job_tx.send(index);
        }
        drop(job_tx);

        thread::scope(|scope| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let done_tx = done_tx.clone();
                scope.spawn(move || {
                    for index in job_rx {
                        if cancelled.load(Ordering::Acquire) {
                            break;
                        }
                        let outcome = evaluate_one(handler, &subs[index], flags);
                        if done_tx.send((index, outcome)).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        drop(done_tx);

        let mut slots: Vec<Option<Outcome>> = vec![None; subs.len()];
        for (index, outcome) in done_rx {
            slots[index] = Some(outcome);
        }

        subs.iter()
            .zip(slots)
            .map(|(sub, slot)| SubscriptionOutcome {
                subscription_id: sub.id.clone(),
                outcome: slot.unwrap_or_else(|| {
                    Outcome::Failed(TriggerError::Execution(ExecutionError::Disconnected {
                        path: "evaluation_worker".to_string(),
                    }))
                }),
            })
            .collect()
    }
}

fn cancelled_outcome() -> Outcome {
    Outcome::Failed(TriggerError::Execution(ExecutionError::Disconnected {
        path: "cancelled".to_string(),
    }))
}

fn evaluate_one(handler: &dyn EventHandler, sub: &Subscription, flags: ServiceFlags) -> Outcome {
    let kind = sub.subscriber.kind();
    if flags.is_disabled(kind) {
        debug!(subscription_id = %sub.id, subscriber = %kind, "Subscriber kind disabled");
        return Outcome::Skipped(SkipReason::SubscriberDisabled(kind));
    }

    match handler.process(sub) {
        Ok(Some(notification)) => Outcome::Notified(notification),
        Ok(None) => {
            debug!(subscription_id = %sub.id, trigger = %sub.trigger, "Trigger did not fire");
            Outcome::Skipped(SkipReason::NotTriggered)
        }
        Err(e) => {
            warn!(
                subscription_id = %sub.id,
                trigger = %sub.trigger,
                error = %e,
                "Subscription failed"
            );
            Outcome::Failed(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use super::*;
    use crate::config::StaticSettings;
    use crate::resource::{Requester, Status, Version, VersionId};
    use crate::selector::SelectorType;
    use crate::storage::{InMemoryStores, StorageError};
    use crate::subscription::Subscriber;

    fn version(id: &str) -> Version {
        Version {
            id: VersionId::new(id),
            identifier: "proj".to_string(),
            requester: Requester::Repotracker,
            author_id: String::new(),
            author: String::new(),
            revision_order: 1,
            status: Status::Failed,
            start_time: DateTime::<Utc>::UNIX_EPOCH,
            finish_time: DateTime::<Utc>::UNIX_EPOCH,
            message: String::new(),
            revision: String::new(),
        }
    }

    fn config(workers: usize) -> EngineConfig {
        EngineConfig {
            ui_url: "https://ci.example.com".to_string(),
            workers,
            ..EngineConfig::default()
        }
    }

    fn dispatcher(stores: &Arc<InMemoryStores>, workers: usize, flags: ServiceFlags) -> Dispatcher {
        Dispatcher::new(
            Arc::new(TriggerRegistry::standard().unwrap()),
            DataSources::in_memory(stores),
            Arc::new(StaticSettings(flags)),
            &config(workers),
        )
    }

    fn sub(id: &str, trigger: &str, subscriber: Subscriber) -> Subscription {
        Subscription::new(
            id,
            trigger,
            vec![Selector::new(SelectorType::Project, "proj")],
            subscriber,
        )
    }

    fn email(id: &str, trigger: &str) -> Subscription {
        sub(
            id,
            trigger,
            Subscriber::Email {
                address: format!("{id}@example.com"),
            },
        )
    }

    #[test]
    fn outcomes_keep_input_order_across_workers() {
        let stores = Arc::new(InMemoryStores::new());
        stores.versions.insert(version("v1")).unwrap();
        let d = dispatcher(&stores, 4, ServiceFlags::default());

        let subs: Vec<_> = (0..20)
            .map(|i| email(&format!("s{i}"), if i % 2 == 0 { "failure" } else { "success" }))
            .collect();
        let report = d
            .dispatch(&Event::version_state_change("v1", Status::Failed), &subs)
            .unwrap();

        let ids: Vec<_> = report.outcomes.iter().map(|o| o.subscription_id.clone()).collect();
        let expected: Vec<_> = subs.iter().map(|s| s.id.clone()).collect();
        assert_eq!(ids, expected);
        assert_eq!(report.notified_count(), 10);
        assert_eq!(report.skipped_count(), 10);
        assert!(!report.selectors.is_empty());
    }

    #[test]
    fn disabled_subscriber_kind_is_skipped() {
        let stores = Arc::new(InMemoryStores::new());
        stores.versions.insert(version("v1")).unwrap();
        let flags = ServiceFlags {
            slack_notifications_disabled: true,
            ..ServiceFlags::default()
        };
        let d = dispatcher(&stores, 1, flags);

        let slack = sub(
            "slack",
            "outcome",
            Subscriber::Slack {
                target: "#ci".to_string(),
            },
        );
        let report = d
            .dispatch(
                &Event::version_state_change("v1", Status::Failed),
                &[slack, email("mail", "outcome")],
            )
            .unwrap();
        assert_eq!(
            report.outcomes[0].outcome,
            Outcome::Skipped(SkipReason::SubscriberDisabled(SubscriberKind::Slack))
        );
        assert!(report.outcomes[1].outcome.notification().is_some());
    }

    #[test]
    fn unreadable_settings_fail_every_subscription() {
        struct Broken;
        impl SettingsSource for Broken {
            fn service_flags(&self) -> Result<ServiceFlags, StorageError> {
                Err(StorageError::ConnectionError("settings db down".to_string()))
            }
        }

        let stores = Arc::new(InMemoryStores::new());
        let d = Dispatcher::new(
            Arc::new(TriggerRegistry::standard().unwrap()),
            DataSources::in_memory(&stores),
            Arc::new(Broken),
            &config(2),
        );
        let report = d
            .dispatch(
                &Event::version_state_change("v1", Status::Failed),
                &[email("a", "outcome"), email("b", "failure")],
            )
            .unwrap();
        assert_eq!(report.failed_count(), 2);
        assert!(report
            .failures()
            .all(|(_, e)| matches!(e, TriggerError::Execution(ExecutionError::Settings { .. }))));
    }

    #[test]
    fn stats_accumulate_across_events() {
        let stores = Arc::new(InMemoryStores::new());
        stores.versions.insert(version("v1")).unwrap();
        let d = dispatcher(&stores, 2, ServiceFlags::default());

        let subs = [email("a", "failure"), email("b", "no-such-trigger")];
        d.dispatch(&Event::version_state_change("v1", Status::Failed), &subs)
            .unwrap();
        let _ = d.dispatch(&Event::version_state_change("missing", Status::Failed), &subs);

        assert_eq!(
            d.stats(),
            DispatchStats {
                events: 2,
                aborted_events: 1,
                notifications: 1,
                failures: 1,
            }
        );
    }

    #[test]
    fn no_subscriptions_means_no_fetch() {
        let stores = Arc::new(InMemoryStores::new());
        let d = dispatcher(&stores, 2, ServiceFlags::default());
        // The version does not exist, but nothing asks for it.
        let report = d
            .dispatch(&Event::version_state_change("ghost", Status::Failed), &[])
            .unwrap();
        assert!(report.outcomes.is_empty());
    }
}
