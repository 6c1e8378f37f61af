//! Engine configuration and admin-settings toggles.
//!
//! [`EngineConfig`] is static process configuration, loaded once. The
//! [`ServiceFlags`] it carries are defaults; at dispatch time the live flags
//! come from a [`SettingsSource`], the admin-settings collaborator.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::storage::StorageError;
use crate::subscription::SubscriberKind;

/// Upper bound on per-event worker threads.
pub const MAX_WORKERS: usize = 64;

/// Default cap on concurrently running timed dispatch workers.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 16;

/// Global toggles supplied by the admin settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceFlags {
    /// Skip every event without fetching or evaluating anything.
    pub event_processing_disabled: bool,
    /// Skip email subscribers.
    pub email_notifications_disabled: bool,
    /// Skip Slack subscribers.
    pub slack_notifications_disabled: bool,
    /// Skip Jira comment subscribers.
    pub jira_notifications_disabled: bool,
    /// Skip webhook subscribers.
    pub webhook_notifications_disabled: bool,
}

impl ServiceFlags {
    /// True if delivery through `kind` is switched off.
    #[must_use]
    pub const fn is_disabled(&self, kind: SubscriberKind) -> bool {
        match kind {
            SubscriberKind::Email => self.email_notifications_disabled,
            SubscriberKind::Slack => self.slack_notifications_disabled,
            SubscriberKind::JiraComment => self.jira_notifications_disabled,
            SubscriberKind::EvergreenWebhook => self.webhook_notifications_disabled,
        }
    }
}

/// Read-only access to the admin settings.
pub trait SettingsSource: Send + Sync {
    /// Current toggles. Read once per dispatched event.
    fn service_flags(&self) -> Result<ServiceFlags, StorageError>;
}

/// A [`SettingsSource`] with fixed flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticSettings(pub ServiceFlags);

impl SettingsSource for StaticSettings {
    fn service_flags(&self) -> Result<ServiceFlags, StorageError> {
        Ok(self.0)
    }
}

/// Process-level engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Base URL of the web UI, used for deep links.
    pub ui_url: String,

    /// Worker threads used to evaluate one event's subscriptions.
    pub workers: usize,

    /// Whole-event timeout. `None` waits indefinitely.
    pub dispatch_timeout_ms: Option<u64>,

    /// Timed dispatch workers allowed to run at once, including ones that
    /// outlived their timeout. Further timed dispatches fail until one exits.
    pub max_in_flight_dispatches: usize,

    /// Fallback toggles for [`StaticSettings`].
    pub flags: ServiceFlags,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ui_url: String::new(),
            workers: 4,
            dispatch_timeout_ms: None,
            max_in_flight_dispatches: DEFAULT_MAX_IN_FLIGHT,
            flags: ServiceFlags::default(),
        }
    }
}

impl EngineConfig {
    /// Parse from JSON and validate.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::Unreadable` for malformed JSON and
    /// `ConfigurationError::InvalidEngineConfig` for semantic problems.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigurationError> {
        let mut cfg: Self = serde_json::from_str(json).map_err(|e| ConfigurationError::Unreadable {
            message: e.to_string(),
        })?;
        cfg.validate_and_default()?;
        Ok(cfg)
    }

    /// Read a JSON file and validate it.
    ///
    /// # Errors
    ///
    /// As [`EngineConfig::from_json_str`], plus `Unreadable` for I/O failures.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigurationError::Unreadable {
            message: format!("{}: {e}", path.display()),
        })?;
        Self::from_json_str(&raw)
    }

    /// Normalise defaults and report every problem at once.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::InvalidEngineConfig` listing all problems.
    pub fn validate_and_default(&mut self) -> Result<(), ConfigurationError> {
        let mut problems = Vec::new();

        let trimmed = self.ui_url.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            problems.push("ui_url must be set".to_string());
        } else if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
            problems.push(format!("ui_url '{trimmed}' must be an http(s) URL"));
        }
        self.ui_url = trimmed.to_string();

        if self.workers == 0 {
            self.workers = 1;
        }
        if self.workers > MAX_WORKERS {
            problems.push(format!(
                "workers = {} exceeds the maximum of {MAX_WORKERS}",
                self.workers
            ));
        }

        if self.max_in_flight_dispatches == 0 {
            self.max_in_flight_dispatches = 1;
        }

        if self.dispatch_timeout_ms == Some(0) {
            problems.push("dispatch_timeout_ms must be positive when set".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigurationError::InvalidEngineConfig { problems })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn parses_and_normalises() {
        let cfg = EngineConfig::from_json_str(
            r#"{"ui_url": "https://ci.example.com/", "workers": 0,
                "flags": {"slack_notifications_disabled": true}}"#,
        )
        .unwrap();
        assert_eq!(cfg.ui_url, "https://ci.example.com");
        assert_eq!(cfg.workers, 1);
        assert_eq!(cfg.dispatch_timeout_ms, None);
        assert_eq!(cfg.max_in_flight_dispatches, DEFAULT_MAX_IN_FLIGHT);
        assert!(cfg.flags.is_disabled(SubscriberKind::Slack));
        assert!(!cfg.flags.is_disabled(SubscriberKind::Email));
    }

    #[test]
    fn zero_in_flight_cap_becomes_one() {
        let cfg = EngineConfig::from_json_str(
            r#"{"ui_url": "https://ci.example.com", "max_in_flight_dispatches": 0}"#,
        )
        .unwrap();
        assert_eq!(cfg.max_in_flight_dispatches, 1);
    }

    #[test]
    fn collects_every_problem() {
        let err = EngineConfig::from_json_str(
            r#"{"ui_url": "ftp://nope", "workers": 1000, "dispatch_timeout_ms": 0}"#,
        )
        .unwrap_err();
        let ConfigurationError::InvalidEngineConfig { problems } = err else {
            panic!("expected invalid config, got {err:?}");
        };
        assert_eq!(problems.len(), 3);
    }

    #[test]
    fn missing_ui_url_is_rejected() {
        let err = EngineConfig::from_json_str("{}").unwrap_err();
        assert!(err.to_string().contains("ui_url must be set"));
    }

    #[test]
    fn malformed_json_is_unreadable() {
        let err = EngineConfig::from_json_str("{ui_url").unwrap_err();
        assert!(matches!(err, ConfigurationError::Unreadable { .. }));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"ui_url": "http://localhost:9090", "dispatch_timeout_ms": 5000}}"#
        )
        .unwrap();

        let cfg = EngineConfig::from_json_file(file.path()).unwrap();
        assert_eq!(cfg.ui_url, "http://localhost:9090");
        assert_eq!(cfg.dispatch_timeout_ms, Some(5000));
        assert_eq!(cfg.workers, 4);
    }

    #[test]
    fn missing_file_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let err = EngineConfig::from_json_file(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ConfigurationError::Unreadable { .. }));
    }

    #[test]
    fn static_settings_returns_its_flags() {
        let flags = ServiceFlags {
            event_processing_disabled: true,
            ..ServiceFlags::default()
        };
        assert_eq!(StaticSettings(flags).service_flags().unwrap(), flags);
    }
}
