//! Notification payloads.
//!
//! A [`Notification`] is the engine's output: one per (event, subscription)
//! pair whose trigger fired. The payload is transport-agnostic; the
//! per-subscriber [`Body`] is a rendering hint for the delivery sink, which
//! owns the actual transport.
//!
//! Payloads are built only from the snapshot and the event, never from the
//! wall clock, so re-dispatching an unchanged event yields byte-identical
//! notifications.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::BuildError;
use crate::event::{Event, EventId};
use crate::resource::Status;
use crate::selector::Selector;
use crate::subscription::{Subscriber, Subscription, SubscriptionId};

/// Slack attachment color for successful runs.
pub const SUCCESS_COLOR: &str = "#4ead4a";
/// Slack attachment color for everything else.
pub const FAILURE_COLOR: &str = "#ce3c3e";

/// Deterministic notification identifier.
///
/// Derived from the event id, subscription id and trigger name, so the same
/// (event, subscription) pair always maps to the same id and delivery sinks
/// can deduplicate retries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationId(String);

impl NotificationId {
    /// Derive the id for an (event, subscription, trigger) triple.
    #[must_use]
    pub fn derive(event_id: EventId, subscription_id: &SubscriptionId, trigger: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(event_id.as_bytes());
        hasher.update(&[0]);
        hasher.update(subscription_id.as_str().as_bytes());
        hasher.update(&[0]);
        hasher.update(trigger.as_bytes());
        Self(hasher.finalize().to_hex().to_string())
    }

    /// Hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Rich summary block (rendered as a Slack attachment, for example).
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub title: String,
    pub title_link: String,
    pub color: String,
    pub text: String,
}

/// Transport-specific rendering of a payload.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "kebab-case")]
pub enum Body {
    Email {
        subject: String,
        text: String,
    },
    Slack {
        message: String,
        attachments: Vec<Attachment>,
    },
    JiraComment {
        text: String,
    },
    /// The resource's API model as JSON.
    Webhook {
        json: serde_json::Value,
    },
}

/// The transport-agnostic notification document.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub subject: String,
    /// Past-tense status text, e.g. `succeeded` or `exceeded 120 seconds`.
    pub status: String,
    pub url: String,
    pub object: String,
    pub id: String,
    pub display_name: String,
    pub project: String,
    pub attachment: Attachment,
    pub selectors: Vec<Selector>,
    pub body: Body,
}

/// A built notification, ready to hand to the delivery sink.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub event_id: EventId,
    pub subscription_id: SubscriptionId,
    pub trigger: String,
    pub subscriber: Subscriber,
    pub payload: Payload,
}

impl Notification {
    /// Bind a payload to a subscription's delivery target.
    #[must_use]
    pub fn new(event: &Event, sub: &Subscription, payload: Payload) -> Self {
        Self {
            id: NotificationId::derive(event.id, &sub.id, &sub.trigger),
            event_id: event.id,
            subscription_id: sub.id.clone(),
            trigger: sub.trigger.clone(),
            subscriber: sub.subscriber.clone(),
            payload,
        }
    }
}

/// What a handler knows about its resource, handed to the builder.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSummary {
    /// `version` or `build`; also the URL path segment.
    pub object: &'static str,
    pub id: String,
    pub display_name: String,
    pub project: String,
    /// Status reported by the event.
    pub status: Status,
    /// Title of the attachment block.
    pub title: String,
    /// Free text for the attachment body (commit message, description).
    pub text: String,
    /// Serialized API model of the resource.
    pub api_model: serde_json::Value,
}

impl ResourceSummary {
    /// Serialize `model` as the summary's API model.
    ///
    /// # Errors
    ///
    /// Returns `BuildError::Model` if the resource cannot be serialized.
    pub fn api_model_of<T: Serialize>(model_name: &str, model: &T) -> Result<serde_json::Value, BuildError> {
        serde_json::to_value(model).map_err(|e| BuildError::Model {
            model: model_name.to_string(),
            message: e.to_string(),
        })
    }
}

/// Assembles payloads. Cheap to clone; holds only the UI base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadBuilder {
    ui_url: String,
}

impl PayloadBuilder {
    /// Builder linking into `ui_url`; a trailing `/` is dropped.
    #[must_use]
    pub fn new(ui_url: impl Into<String>) -> Self {
        Self {
            ui_url: ui_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Deep link to a resource's UI page.
    ///
    /// # Errors
    ///
    /// Returns `BuildError::MissingUiUrl` if no UI URL is configured.
    pub fn link(&self, object: &str, id: &str) -> Result<String, BuildError> {
        if self.ui_url.is_empty() {
            return Err(BuildError::MissingUiUrl {
                object: object.to_string(),
                id: id.to_string(),
            });
        }
        Ok(format!("{}/{object}/{id}", self.ui_url))
    }

    /// Build the payload for `sub`.
    ///
    /// The status text is `succeeded` for successful runs and the raw status
    /// otherwise, unless the trigger supplied `past_tense_override`.
    ///
    /// # Errors
    ///
    /// Returns a [`BuildError`] if the link cannot be formed.
    pub fn build(
        &self,
        summary: &ResourceSummary,
        sub: &Subscription,
        selectors: &[Selector],
        past_tense_override: Option<&str>,
    ) -> Result<Payload, BuildError> {
        let url = self.link(summary.object, &summary.id)?;

        let (default_status, color) = if summary.status == Status::Succeeded {
            ("succeeded".to_string(), SUCCESS_COLOR)
        } else {
            (summary.status.as_str().to_string(), FAILURE_COLOR)
        };
        let status = past_tense_override.map_or(default_status, str::to_string);

        let attachment = Attachment {
            title: summary.title.clone(),
            title_link: url.clone(),
            color: color.to_string(),
            text: summary.text.clone(),
        };

        let subject = format!(
            "Evergreen {} {} in '{}' has {status}!",
            summary.object, summary.display_name, summary.project
        );

        let body = match &sub.subscriber {
            Subscriber::Email { .. } => Body::Email {
                subject: subject.clone(),
                text: format!("{subject}\n\n{url}\n\n{}", summary.text),
            },
            Subscriber::Slack { .. } => Body::Slack {
                message: format!(
                    "<{url}|Evergreen {} {}> in '{}' has {status}!",
                    summary.object, summary.display_name, summary.project
                ),
                attachments: vec![attachment.clone()],
            },
            Subscriber::JiraComment { .. } => Body::JiraComment {
                text: format!(
                    "[Evergreen {} {}|{url}] in '{}' has {status}!",
                    summary.object, summary.display_name, summary.project
                ),
            },
            Subscriber::EvergreenWebhook { .. } => Body::Webhook {
                json: summary.api_model.clone(),
            },
        };

        Ok(Payload {
            subject,
            status,
            url,
            object: summary.object.to_string(),
            id: summary.id.clone(),
            display_name: summary.display_name.clone(),
            project: summary.project.clone(),
            attachment,
            selectors: selectors.to_vec(),
            body,
        })
    }
}
