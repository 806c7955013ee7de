//! Breaker construction settings.
//!
//! Every field is optional in spirit: zero values and `None` fall back to the
//! defaults below when the breaker is built.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::resilience::observer::StateObserver;
use crate::resilience::state::{Counts, Policy, TripPredicate};

/// Probe quota used when `max_requests` is zero.
pub const DEFAULT_MAX_REQUESTS: u32 = 1;

/// Open-state timeout used when `timeout` is zero.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Consecutive failures that trip a breaker without a custom predicate.
pub const DEFAULT_CONSECUTIVE_FAILURES: u32 = 5;

/// Settings for a single breaker.
#[derive(Clone, Default)]
pub struct Settings {
    /// Probe calls allowed while HalfOpen (0 means 1).
    pub max_requests: u32,
    /// How long Closed-state counts stay valid (0 means forever).
    pub interval: Duration,
    /// How long to stay Open before probing (0 means 60s).
    pub timeout: Duration,
    /// Closed → Open decision; defaults to five consecutive failures.
    pub ready_to_trip: Option<TripPredicate>,
    /// Transition observer; defaults to logging + metrics.
    pub on_state_change: Option<Arc<dyn StateObserver>>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings used by [`Registry::default`](crate::resilience::Registry):
    /// three probes, 10s counting interval, 30s open timeout, trip at 60%
    /// failures once at least three requests were seen.
    pub fn registry_defaults() -> Self {
        Self::new()
            .with_max_requests(3)
            .with_interval(Duration::from_secs(10))
            .with_timeout(Duration::from_secs(30))
            .with_trip_predicate(failure_ratio(3, 0.6))
    }

    pub fn with_max_requests(mut self, max_requests: u32) -> Self {
        self.max_requests = max_requests;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_ready_to_trip<F>(self, predicate: F) -> Self
    where
        F: Fn(&Counts) -> bool + Send + Sync + 'static,
    {
        self.with_trip_predicate(Arc::new(predicate))
    }

    pub fn with_trip_predicate(mut self, predicate: TripPredicate) -> Self {
        self.ready_to_trip = Some(predicate);
        self
    }

    pub fn with_observer<O>(mut self, observer: O) -> Self
    where
        O: StateObserver + 'static,
    {
        self.on_state_change = Some(Arc::new(observer));
        self
    }

    pub(crate) fn policy(&self) -> Policy {
        Policy {
            max_requests: if self.max_requests == 0 {
                DEFAULT_MAX_REQUESTS
            } else {
                self.max_requests
            },
            interval: self.interval,
            timeout: if self.timeout.is_zero() {
                DEFAULT_TIMEOUT
            } else {
                self.timeout
            },
            ready_to_trip: self
                .ready_to_trip
                .clone()
                .unwrap_or_else(|| consecutive_failures(DEFAULT_CONSECUTIVE_FAILURES)),
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("max_requests", &self.max_requests)
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .field("ready_to_trip", &self.ready_to_trip.as_ref().map(|_| "<predicate>"))
            .field("on_state_change", &self.on_state_change.as_ref().map(|_| "<observer>"))
            .finish()
    }
}

/// Trip after `threshold` failures in a row.
pub fn consecutive_failures(threshold: u32) -> TripPredicate {
    Arc::new(move |counts: &Counts| counts.consecutive_failures >= threshold)
}

/// Trip once `min_requests` were admitted and the failure share reaches `ratio`.
pub fn failure_ratio(min_requests: u32, ratio: f64) -> TripPredicate {
    Arc::new(move |counts: &Counts| {
        counts.requests >= min_requests && counts.failure_ratio() >= ratio
    })
}
