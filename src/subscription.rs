//! Subscriptions: standing requests to be notified when a trigger fires for
//! resources matching a set of selectors.
//!
//! Subscriptions are owned by an external collaborator; the engine treats
//! them as read-only input.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::selector::{all_present, Selector};

/// Unique identifier for a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    /// Wraps a raw identifier.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubscriptionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Delivery category of a subscriber, used for per-category toggles.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubscriberKind {
    Email,
    Slack,
    JiraComment,
    EvergreenWebhook,
}

impl fmt::Display for SubscriberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Email => "email",
            Self::Slack => "slack",
            Self::JiraComment => "jira-comment",
            Self::EvergreenWebhook => "evergreen-webhook",
        })
    }
}

/// Where a notification is delivered.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Subscriber {
    Email {
        address: String,
    },
    /// A `#channel` or `@user`.
    Slack {
        target: String,
    },
    JiraComment {
        issue: String,
    },
    EvergreenWebhook {
        url: String,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        secret: String,
    },
}

impl Subscriber {
    /// Delivery category, used by the admin toggles.
    #[must_use]
    pub const fn kind(&self) -> SubscriberKind {
        match self {
            Self::Email { .. } => SubscriberKind::Email,
            Self::Slack { .. } => SubscriberKind::Slack,
            Self::JiraComment { .. } => SubscriberKind::JiraComment,
            Self::EvergreenWebhook { .. } => SubscriberKind::EvergreenWebhook,
        }
    }

    /// The delivery address, whatever the transport calls it.
    #[must_use]
    pub fn target(&self) -> &str {
        match self {
            Self::Email { address } => address,
            Self::Slack { target } => target,
            Self::JiraComment { issue } => issue,
            Self::EvergreenWebhook { url, .. } => url,
        }
    }
}

/// A subscription as supplied by the subscription source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Subscription identifier.
    pub id: SubscriptionId,

    /// Name of the trigger to evaluate, e.g. `outcome` or `regression`.
    pub trigger: String,

    /// Selectors that must all be present on the event's resource.
    pub selectors: Vec<Selector>,

    /// Where a fired notification goes.
    pub subscriber: Subscriber,

    /// Trigger-specific parameters, e.g. duration thresholds.
    #[serde(default)]
    pub trigger_data: BTreeMap<String, String>,

    /// User that owns the subscription.
    #[serde(default)]
    pub owner: String,
}

impl Subscription {
    /// Creates a subscription with no trigger parameters.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        trigger: impl Into<String>,
        selectors: Vec<Selector>,
        subscriber: Subscriber,
    ) -> Self {
        Self {
            id: SubscriptionId::new(id),
            trigger: trigger.into(),
            selectors,
            subscriber,
            trigger_data: BTreeMap::new(),
            owner: String::new(),
        }
    }

    /// Adds a trigger parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.trigger_data.insert(key.into(), value.into());
        self
    }

    /// Returns a trigger parameter, if present.
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&str> {
        self.trigger_data.get(key).map(String::as_str)
    }

    /// Subset match against a resource's selectors.
    #[must_use]
    pub fn matches(&self, selectors: &[Selector]) -> bool {
        all_present(&self.selectors, selectors)
    }

    /// Structural validation independent of any event.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::InvalidSubscription` if the trigger name or
    /// selector list is empty, or if the subscriber has no target.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let reason = if self.trigger.trim().is_empty() {
            Some("trigger name is empty")
        } else if self.selectors.is_empty() {
            Some("no selectors")
        } else if self.subscriber.target().trim().is_empty() {
            Some("subscriber has no target")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(ConfigurationError::InvalidSubscription {
                subscription_id: self.id.to_string(),
                reason: reason.to_string(),
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::SelectorType;

    fn sub() -> Subscription {
        Subscription::new(
            "s1",
            "outcome",
            vec![Selector::new(SelectorType::Project, "proj")],
            Subscriber::Slack {
                target: "#ci".to_string(),
            },
        )
    }

    #[test]
    fn subscriber_deserializes_from_tagged_json() {
        let s: Subscriber =
            serde_json::from_str(r#"{"type":"jira-comment","issue":"CI-12"}"#).unwrap();
        assert_eq!(s.kind(), SubscriberKind::JiraComment);
        assert_eq!(s.target(), "CI-12");
    }

    #[test]
    fn params_are_looked_up_by_key() {
        let s = sub().with_param("duration-threshold-seconds", "120");
        assert_eq!(s.param("duration-threshold-seconds"), Some("120"));
        assert_eq!(s.param("percent-threshold"), None);
    }

    #[test]
    fn validate_rejects_empty_trigger_and_selectors() {
        assert!(sub().validate().is_ok());

        let mut s = sub();
        s.trigger = " ".to_string();
        assert!(matches!(
            s.validate(),
            Err(ConfigurationError::InvalidSubscription { .. })
        ));

        let mut s = sub();
        s.selectors.clear();
        assert!(s.validate().is_err());

        let mut s = sub();
        s.subscriber = Subscriber::Email {
            address: String::new(),
        };
        assert!(s.validate().is_err());
    }

    #[test]
    fn matches_uses_subset_semantics() {
        let s = sub();
        let available = vec![
            Selector::new(SelectorType::Id, "v1"),
            Selector::new(SelectorType::Project, "proj"),
        ];
        assert!(s.matches(&available));
        assert!(!s.matches(&available[..1]));
    }
}
