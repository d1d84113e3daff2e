//! Adaptive polling cadence.
//!
//! With a server estimate `E` and elapsed wait `t`, the progress ratio
//! `r = clamp(t / E, 0, 1)` picks one of three bands. Each band interpolates
//! linearly from its upper bound down to its lower bound:
//!
//! | band            | interval              | bounds   |
//! |-----------------|-----------------------|----------|
//! | `r < 0.5`       | `30 - 50 r`           | [5, 30]  |
//! | `0.5 <= r < 0.8`| `15 - 40 (r - 0.5)`   | [3, 15]  |
//! | `r >= 0.8`      | `10 - 40 (r - 0.8)`   | [2, 10]  |
//!
//! Without an estimate the cadence is 5s, 10s, then 15s for every later poll.
//!
//! A [`PollingPolicy`] from the settings `polling` section can replace the bands
//! with a fixed interval and clamp whichever cadence is in use.

use serde::Serialize;
use std::time::Duration;

/// Shortest interval the schedule can produce.
pub const MIN_INTERVAL: Duration = Duration::from_secs(2);

/// Intervals used, by poll index, when the server gives no estimate.
pub const UNKNOWN_ESTIMATE_STEPS: [u64; 3] = [5, 10, 15];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    Early,
    Middle,
    Late,
}

impl Band {
    pub fn for_ratio(r: f64) -> Self {
        if r < 0.5 {
            Band::Early
        } else if r < 0.8 {
            Band::Middle
        } else {
            Band::Late
        }
    }

    /// Inclusive (min, max) interval in seconds.
    pub fn bounds(&self) -> (f64, f64) {
        match self {
            Band::Early => (5.0, 30.0),
            Band::Middle => (3.0, 15.0),
            Band::Late => (2.0, 10.0),
        }
    }

    fn seconds_at(&self, r: f64) -> f64 {
        let raw = match self {
            Band::Early => 30.0 - 50.0 * r,
            Band::Middle => 15.0 - 40.0 * (r - 0.5),
            Band::Late => 10.0 - 40.0 * (r - 0.8),
        };
        let (min, max) = self.bounds();
        raw.clamp(min, max)
    }
}

/// `t / E` clamped to [0, 1]. `None` when the estimate is missing or not positive.
pub fn progress_ratio(elapsed: Duration, estimated_seconds: Option<f64>) -> Option<f64> {
    let estimate = estimated_seconds.filter(|e| e.is_finite() && *e > 0.0)?;
    Some((elapsed.as_secs_f64() / estimate).clamp(0.0, 1.0))
}

/// Interval to sleep before poll number `poll_index` (zero based).
///
/// `estimated_seconds` must be the freshest estimate the server has given.
pub fn next_interval(
    estimated_seconds: Option<f64>,
    elapsed: Duration,
    poll_index: u32,
) -> Duration {
    match progress_ratio(elapsed, estimated_seconds) {
        Some(r) => {
            let secs = Band::for_ratio(r).seconds_at(r);
            Duration::from_millis((secs * 1000.0).round() as u64)
        }
        None => {
            let step = (poll_index as usize).min(UNKNOWN_ESTIMATE_STEPS.len() - 1);
            Duration::from_secs(UNKNOWN_ESTIMATE_STEPS[step])
        }
    }
}

/// Bounds applied to a fixed cadence when the settings give none.
pub const DEFAULT_FIXED_MIN: Duration = Duration::from_secs(2);
pub const DEFAULT_FIXED_MAX: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Cadence {
    /// Follow the server estimate through the three bands.
    Adaptive,
    /// Poll at a constant interval and ignore the estimate.
    Fixed(Duration),
}

/// How the controller paces status polls and reacts to transient failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PollingPolicy {
    pub cadence: Cadence,
    pub min_interval: Option<Duration>,
    pub max_interval: Option<Duration>,
    /// When false a transient status/results failure ends the wait at once.
    pub retry_transient: bool,
    /// Stop waiting after this many polls even if budget is left.
    pub max_polls: Option<u32>,
}

impl Default for PollingPolicy {
    fn default() -> Self {
        Self {
            cadence: Cadence::Adaptive,
            min_interval: None,
            max_interval: None,
            retry_transient: true,
            max_polls: None,
        }
    }
}

impl PollingPolicy {
    /// Interval to sleep before poll number `poll_index` (zero based).
    pub fn interval(
        &self,
        estimated_seconds: Option<f64>,
        elapsed: Duration,
        poll_index: u32,
    ) -> Duration {
        let raw = match self.cadence {
            Cadence::Adaptive => next_interval(estimated_seconds, elapsed, poll_index),
            Cadence::Fixed(every) => every,
        };
        let raw = self.max_interval.map_or(raw, |max| raw.min(max));
        self.min_interval.map_or(raw, |min| raw.max(min))
    }

    pub fn poll_limit_reached(&self, polls: u32) -> bool {
        self.max_polls.is_some_and(|max| polls >= max)
    }
}
