//! Predicates shared by the version and build trigger tables.
//!
//! All status guards look at the status carried by the event, not the stored
//! resource: the event says what happened, the store may already have moved on.

use chrono::Duration;

use crate::error::{ConfigurationError, TriggerResult};
use crate::resource::Status;
use crate::storage::StorageError;
use crate::subscription::Subscription;
use crate::time::RunWindow;
use crate::trigger::Firing;

/// Subscription parameter for `exceeds-duration`, in whole seconds.
pub const DURATION_THRESHOLD_KEY: &str = "duration-threshold-seconds";

/// Subscription parameter for `runtime-change-by-percent`.
pub const PERCENT_THRESHOLD_KEY: &str = "percent-threshold";

pub(crate) fn outcome(status: Status) -> Option<Firing> {
    status.is_terminal().then(Firing::plain)
}

pub(crate) fn failure(status: Status) -> Option<Firing> {
    (status == Status::Failed).then(Firing::plain)
}

pub(crate) fn success(status: Status) -> Option<Firing> {
    (status == Status::Succeeded).then(Firing::plain)
}

/// Fires when a finished run took at least the configured number of seconds.
pub(crate) fn exceeds_duration(
    status: Status,
    window: &RunWindow,
    sub: &Subscription,
) -> TriggerResult<Option<Firing>> {
    if !status.is_terminal() {
        return Ok(None);
    }
    let threshold = duration_threshold(sub)?;
    let reached = Duration::try_seconds(threshold).is_some_and(|limit| window.reached(limit));
    if !reached {
        return Ok(None);
    }
    Ok(Some(Firing::with_status(format!("exceeded {threshold} seconds"))))
}

/// Fires when a finished run's duration moved by at least the configured
/// percentage, in either direction, relative to the last successful run.
///
/// `baseline` is consulted only after the status and parameter checks pass.
/// No baseline, or a zero-length one, means no notification.
pub(crate) fn runtime_change<F>(
    status: Status,
    window: &RunWindow,
    sub: &Subscription,
    baseline: F,
) -> TriggerResult<Option<Firing>>
where
    F: FnOnce() -> Result<Option<RunWindow>, StorageError>,
{
    if !status.is_terminal() {
        return Ok(None);
    }
    let (threshold, raw) = percent_threshold(sub)?;

    let Some(previous) = baseline()? else {
        return Ok(None);
    };
    let Some(change) = window.percent_change_from(&previous) else {
        return Ok(None);
    };
    if !runtime_exceeds_threshold(threshold, change) {
        return Ok(None);
    }

    Ok(Some(Firing::with_status(format!(
        "changed in runtime by {change:+.1}% (over threshold of {raw}%)"
    ))))
}

/// True when a signed percentage change meets the threshold in magnitude.
#[must_use]
pub fn runtime_exceeds_threshold(threshold_percent: f64, change_percent: f64) -> bool {
    change_percent.abs() >= threshold_percent
}

/// Parse the `exceeds-duration` threshold.
///
/// # Errors
///
/// `MissingParameter` if absent, `InvalidParameter` unless it is a
/// non-negative integer.
pub fn duration_threshold(sub: &Subscription) -> Result<i64, ConfigurationError> {
    let raw = required_param(sub, DURATION_THRESHOLD_KEY)?;
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|secs| *secs >= 0)
        .ok_or_else(|| invalid_param(sub, DURATION_THRESHOLD_KEY, raw))
}

/// Parse the `runtime-change-by-percent` threshold.
///
/// Returns the value and the raw text, which is echoed back in the status.
///
/// # Errors
///
/// `MissingParameter` if absent, `InvalidParameter` unless it is a finite,
/// non-negative number.
pub fn percent_threshold(sub: &Subscription) -> Result<(f64, &str), ConfigurationError> {
    let raw = required_param(sub, PERCENT_THRESHOLD_KEY)?;
    let value = raw
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|p| p.is_finite() && *p >= 0.0)
        .ok_or_else(|| invalid_param(sub, PERCENT_THRESHOLD_KEY, raw))?;
    Ok((value, raw.trim()))
}

fn required_param<'a>(sub: &'a Subscription, key: &str) -> Result<&'a str, ConfigurationError> {
    sub.param(key).ok_or_else(|| ConfigurationError::MissingParameter {
        subscription_id: sub.id.to_string(),
        key: key.to_string(),
    })
}

fn invalid_param(sub: &Subscription, key: &str, value: &str) -> ConfigurationError {
    ConfigurationError::InvalidParameter {
        subscription_id: sub.id.to_string(),
        key: key.to_string(),
        value: value.to_string(),
    }
}
