//! Handler registry keyed by (resource type, event kind).
//!
//! The registry is built once and then only read. [`TriggerRegistry::shared`]
//! exposes the standard registry as a process-wide value so every dispatcher
//! in the process sees the same table.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use thiserror::Error;

use crate::error::FetchError;
use crate::event::{Event, EventKind, ResourceType};
use crate::trigger::build::BuildTriggers;
use crate::trigger::version::VersionTriggers;
use crate::trigger::{EventHandler, HandlerContext};

/// Builds a handler for one event, fetching whatever it needs.
pub type HandlerFactory = fn(&Event, &HandlerContext) -> Result<Box<dyn EventHandler>, FetchError>;

/// Registry errors.
#[allow(missing_docs)]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The pair already has a factory.
    #[error("A handler for {resource_type}/{kind} is already registered")]
    Duplicate {
        resource_type: ResourceType,
        kind: EventKind,
    },

    /// Nothing handles the pair.
    #[error("No handler registered for {resource_type}/{kind}")]
    NotRegistered {
        resource_type: ResourceType,
        kind: EventKind,
    },
}

static SHARED: OnceLock<Result<Arc<TriggerRegistry>, RegistryError>> = OnceLock::new();

/// Immutable mapping from (resource type, event kind) to handler factory.
#[derive(Clone)]
pub struct TriggerRegistry {
    handlers: HashMap<(ResourceType, EventKind), HandlerFactory>,
}

impl TriggerRegistry {
    /// Start an empty registry.
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Version and build state changes.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::Duplicate` if the standard handlers collide.
    pub fn standard() -> Result<Self, RegistryError> {
        Ok(Self::builder().with_standard_handlers()?.build())
    }

    /// The process-wide standard registry, created on first use.
    ///
    /// # Errors
    ///
    /// As [`TriggerRegistry::standard`]; the first outcome is kept.
    pub fn shared() -> Result<Arc<Self>, RegistryError> {
        SHARED
            .get_or_init(|| Self::standard().map(Arc::new))
            .clone()
    }

    /// Find the factory for an event's (resource type, kind).
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NotRegistered` if nothing handles the pair.
    pub fn lookup(
        &self,
        resource_type: ResourceType,
        kind: EventKind,
    ) -> Result<HandlerFactory, RegistryError> {
        self.handlers
            .get(&(resource_type, kind))
            .copied()
            .ok_or(RegistryError::NotRegistered {
                resource_type,
                kind,
            })
    }

    /// Registered pairs, sorted.
    #[must_use]
    pub fn registrations(&self) -> Vec<(ResourceType, EventKind)> {
        let mut keys: Vec<_> = self.handlers.keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    /// Number of registered pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// True if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for TriggerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TriggerRegistry")
            .field("registrations", &self.registrations())
            .finish()
    }
}

/// Collects registrations, rejecting duplicates.
#[derive(Default)]
pub struct RegistryBuilder {
    handlers: HashMap<(ResourceType, EventKind), HandlerFactory>,
}

impl RegistryBuilder {
    /// Register `factory` for (`resource_type`, `kind`).
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::Duplicate` if the pair already has a handler.
    pub fn register(
        mut self,
        resource_type: ResourceType,
        kind: EventKind,
        factory: HandlerFactory,
    ) -> Result<Self, RegistryError> {
        if self.handlers.contains_key(&(resource_type, kind)) {
            return Err(RegistryError::Duplicate {
                resource_type,
                kind,
            });
        }
        self.handlers.insert((resource_type, kind), factory);
        Ok(self)
    }

    /// Register the version and build state-change handlers.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::Duplicate` if either pair is already taken.
    pub fn with_standard_handlers(self) -> Result<Self, RegistryError> {
        self.register(
            ResourceType::Version,
            EventKind::StateChange,
            VersionTriggers::factory,
        )?
        .register(
            ResourceType::Build,
            EventKind::StateChange,
            BuildTriggers::factory,
        )
    }

    /// Freeze the registrations.
    #[must_use]
    pub fn build(self) -> TriggerRegistry {
        TriggerRegistry {
            handlers: self.handlers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_registry_covers_versions_and_builds() {
        let registry = TriggerRegistry::standard().unwrap();
        assert_eq!(
            registry.registrations(),
            vec![
                (ResourceType::Version, EventKind::StateChange),
                (ResourceType::Build, EventKind::StateChange),
            ]
        );
        assert!(registry
            .lookup(ResourceType::Version, EventKind::StateChange)
            .is_ok());
    }

    #[test]
    fn unregistered_pair_is_reported() {
        let registry = TriggerRegistry::standard().unwrap();
        let err = registry
            .lookup(ResourceType::Task, EventKind::StateChange)
            .err()
            .unwrap();
        assert_eq!(
            err,
            RegistryError::NotRegistered {
                resource_type: ResourceType::Task,
                kind: EventKind::StateChange,
            }
        );
        assert!(registry
            .lookup(ResourceType::Version, EventKind::GithubCheckFinished)
            .is_err());
    }

    #[test]
    fn builder_rejects_duplicates() {
        let builder = TriggerRegistry::builder()
            .register(
                ResourceType::Version,
                EventKind::StateChange,
                VersionTriggers::factory,
            )
            .unwrap();
        let err = builder
            .register(
                ResourceType::Version,
                EventKind::StateChange,
                BuildTriggers::factory,
            )
            .err()
            .unwrap();
        assert!(matches!(err, RegistryError::Duplicate { .. }));
    }

    #[test]
    fn standard_handlers_go_through_duplicate_check() {
        let err = TriggerRegistry::builder()
            .register(ResourceType::Build, EventKind::StateChange, BuildTriggers::factory)
            .unwrap()
            .with_standard_handlers()
            .err()
            .unwrap();
        assert_eq!(
            err,
            RegistryError::Duplicate {
                resource_type: ResourceType::Build,
                kind: EventKind::StateChange,
            }
        );

        let twice = TriggerRegistry::builder()
            .with_standard_handlers()
            .unwrap()
            .with_standard_handlers();
        assert!(twice.is_err());
    }

    #[test]
    fn standard_handlers_extend_a_custom_builder() {
        let registry = TriggerRegistry::builder()
            .register(ResourceType::Build, EventKind::Created, BuildTriggers::factory)
            .unwrap()
            .with_standard_handlers()
            .unwrap()
            .build();
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn builder_produces_custom_registry() {
        let registry = TriggerRegistry::builder()
            .register(ResourceType::Build, EventKind::Created, BuildTriggers::factory)
            .unwrap()
            .build();
        assert_eq!(registry.len(), 1);
        assert!(registry.lookup(ResourceType::Build, EventKind::Created).is_ok());
        assert!(TriggerRegistry::builder().build().is_empty());
    }

    #[test]
    fn shared_registry_is_a_single_instance() {
        let a = TriggerRegistry::shared().unwrap();
        let b = TriggerRegistry::shared().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.len(), 2);
    }
}
