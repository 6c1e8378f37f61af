//! Run windows: the start/finish interval of a version, build or task.
//!
//! Duration and runtime-change triggers are both phrased in terms of how long
//! a run took, so the arithmetic lives here once.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// The interval between a run starting and finishing.
///
/// Unlike a validity range this is closed on both ends and may be empty
/// (a run that finished in the same instant it started).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunWindow {
    /// When the run started.
    pub start: DateTime<Utc>,

    /// When the run finished.
    pub finish: DateTime<Utc>,
}

impl RunWindow {
    /// Creates a window from two timestamps.
    #[must_use]
    pub const fn new(start: DateTime<Utc>, finish: DateTime<Utc>) -> Self {
        Self { start, finish }
    }

    /// Wall-clock time the run took. Negative if the timestamps are inverted.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.finish - self.start
    }

    /// Elapsed time in fractional seconds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn elapsed_secs_f64(&self) -> f64 {
        let elapsed = self.elapsed();
        match elapsed.num_microseconds() {
            Some(us) => us as f64 / 1_000_000.0,
            None => elapsed.num_milliseconds() as f64 / 1_000.0,
        }
    }

    /// True when the run took at least `threshold`.
    ///
    /// Equivalent to `start + threshold` not being strictly after `finish`.
    #[must_use]
    pub fn reached(&self, threshold: Duration) -> bool {
        self.start
            .checked_add_signed(threshold)
            .is_some_and(|end| end <= self.finish)
    }

    /// Signed percentage change of this run's duration relative to `baseline`.
    ///
    /// Returns `None` when the baseline took no time, since no meaningful
    /// percentage exists.
    #[must_use]
    pub fn percent_change_from(&self, baseline: &Self) -> Option<f64> {
        let previous = baseline.elapsed_secs_f64();
        if previous == 0.0 {
            return None;
        }
        let current = self.elapsed_secs_f64();
        let change = (current - previous) / previous * 100.0;
        change.is_finite().then_some(change)
    }
}
