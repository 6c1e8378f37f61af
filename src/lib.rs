//! # ci-triggers - Event-to-notification trigger engine
//!
//! Turns CI state-change events (a version or build finished) into
//! notifications for the subscriptions that asked for them.
//!
//! ## Core Concepts
//!
//! - **Event**: a state change on a resource, carrying the new status
//! - **Subscription**: selectors to match, a trigger name, and a subscriber
//! - **Trigger**: a named predicate (`outcome`, `failure`, `regression`, ...)
//!   evaluated against a snapshot of the resource
//! - **Notification**: the payload for one (event, subscription) pair
//!
//! Each event is fetched once; every subscription is evaluated against that
//! snapshot, and a failure in one subscription never affects another.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ci_triggers::{DataSources, Dispatcher, EngineConfig, Event, InMemoryStores,
//!     StaticSettings, Status, TriggerRegistry};
//!
//! let config = EngineConfig::from_json_str(r#"{"ui_url": "https://ci.example.com"}"#)?;
//! let stores = Arc::new(InMemoryStores::new());
//! let dispatcher = Dispatcher::new(
//!     TriggerRegistry::shared()?,
//!     DataSources::in_memory(&stores),
//!     Arc::new(StaticSettings(config.flags)),
//!     &config,
//! );
//!
//! let report = dispatcher.dispatch(&Event::version_state_change("v1", Status::Failed), &subs)?;
//! for notification in report.notifications() {
//!     sink.deliver(notification);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Inputs
pub mod config;
pub mod error;
pub mod event;
pub mod resource;
pub mod selector;
pub mod subscription;
pub mod time;

// Collaborators
pub mod snapshot;
pub mod storage;

// Evaluation and output
pub mod dispatch;
pub mod notification;
pub mod trigger;

pub use config::{EngineConfig, ServiceFlags, SettingsSource, StaticSettings};
pub use dispatch::{DispatchReport, DispatchStats, Dispatcher, Outcome, SkipReason, SubscriptionOutcome};
pub use error::{
    BuildError, ConfigurationError, ExecutionError, FetchError, TriggerError, TriggerResult,
};
pub use event::{Event, EventData, EventId, EventKind, ResourceType};
pub use notification::{Body, Notification, NotificationId, Payload, PayloadBuilder};
pub use resource::{Build, BuildId, Requester, Status, Task, TaskId, Version, VersionId};
pub use selector::{Selector, SelectorType};
pub use snapshot::{BuildSnapshot, DataSources, VersionSnapshot};
pub use storage::{
    BuildStore, InMemoryBuildStore, InMemoryStores, InMemoryTaskStore, InMemoryVersionStore,
    StorageError, TaskStore, VersionStore,
};
pub use subscription::{Subscriber, SubscriberKind, Subscription, SubscriptionId};
pub use time::RunWindow;
pub use trigger::{
    EventHandler, Firing, HandlerContext, HandlerFactory, RegistryError, RegressionClassifier,
    TaskHistoryClassifier, TriggerKind, TriggerRegistry,
};
