//! Breaker state machine and counting window.
//!
//! # States
//! - Closed: calls pass through, outcomes are counted
//! - Open: dependency assumed down, calls fail fast
//! - HalfOpen: a bounded number of probe calls test recovery
//!
//! # State Transitions
//! ```text
//! Closed → Closed:   interval elapsed (new generation, counters reset)
//! Closed → Open:     a failure makes ready_to_trip(counts) true
//! Open → HalfOpen:   timeout elapsed since entering Open
//! HalfOpen → Closed: consecutive successes reach max_requests
//! HalfOpen → Open:   any probe failure
//! ```
//!
//! # Design Decisions
//! - No background timer: every access first evaluates the effective state
//!   for "now" from `(state, expiry, now)`
//! - Every transition starts a new generation; outcome reports carrying an
//!   older generation are ignored
//! - The window never calls observers itself, it reports transitions so the
//!   caller can notify outside the exclusive section

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

/// Predicate deciding whether the Closed-state counts warrant tripping.
pub type TripPredicate = Arc<dyn Fn(&Counts) -> bool + Send + Sync>;

/// Breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum State {
    Closed,
    Open,
    HalfOpen,
}

impl State {
    /// Stable lowercase name, used in logs, metrics labels and JSON.
    pub fn as_str(&self) -> &'static str {
        match self {
            State::Closed => "closed",
            State::Open => "open",
            State::HalfOpen => "half-open",
        }
    }

    /// Numeric encoding for gauges (0 closed, 1 half-open, 2 open).
    pub fn as_gauge(&self) -> f64 {
        match self {
            State::Closed => 0.0,
            State::HalfOpen => 1.0,
            State::Open => 2.0,
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request outcomes counted within one generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub requests: u32,
    pub total_successes: u32,
    pub total_failures: u32,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
}

impl Counts {
    /// Share of admitted requests that failed, 0.0 when nothing was admitted.
    pub fn failure_ratio(&self) -> f64 {
        if self.requests == 0 {
            return 0.0;
        }
        f64::from(self.total_failures) / f64::from(self.requests)
    }

    fn on_request(&mut self) {
        self.requests = self.requests.saturating_add(1);
    }

    fn on_success(&mut self) {
        self.total_successes = self.total_successes.saturating_add(1);
        self.consecutive_successes = self.consecutive_successes.saturating_add(1);
        self.consecutive_failures = 0;
    }

    fn on_failure(&mut self) {
        self.total_failures = self.total_failures.saturating_add(1);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_successes = 0;
    }
}

/// A state change reported by the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: State,
    pub to: State,
}

/// Why admission was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Rejection {
    Open { remaining: Duration },
    TooManyRequests,
}

/// Immutable per-breaker tuning, already normalised.
#[derive(Clone)]
pub(crate) struct Policy {
    pub max_requests: u32,
    pub interval: Duration,
    pub timeout: Duration,
    pub ready_to_trip: TripPredicate,
}

/// The mutable part of a breaker, only ever touched under its mutex.
#[derive(Debug, Clone)]
pub(crate) struct Window {
    state: State,
    generation: u64,
    counts: Counts,
    /// When the current generation goes stale. `None` never expires.
    expiry: Option<Instant>,
}

impl Window {
    pub fn new(policy: &Policy, now: Instant) -> Self {
        let mut window = Self {
            state: State::Closed,
            generation: 0,
            counts: Counts::default(),
            expiry: None,
        };
        window.start_generation(policy, now);
        window
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn counts(&self) -> Counts {
        self.counts
    }

    /// Time left before an Open window admits a probe.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        match (self.state, self.expiry) {
            (State::Open, Some(expiry)) => Some(expiry.saturating_duration_since(now)),
            _ => None,
        }
    }

    /// Bring the window up to date with `now` and return the effective state.
    pub fn current(&mut self, policy: &Policy, now: Instant) -> (State, Option<Transition>) {
        let transition = match self.state {
            State::Closed => {
                if self.expired(now) {
                    self.start_generation(policy, now);
                }
                None
            }
            State::Open => {
                if self.expired(now) {
                    self.set_state(State::HalfOpen, policy, now)
                } else {
                    None
                }
            }
            State::HalfOpen => None,
        };
        (self.state, transition)
    }

    /// Admission check. On success the request is counted and the current
    /// generation is returned as a receipt.
    pub fn admit(
        &mut self,
        policy: &Policy,
        now: Instant,
    ) -> (Result<u64, Rejection>, Option<Transition>) {
        let (state, transition) = self.current(policy, now);

        let verdict = match state {
            State::Open => Err(Rejection::Open {
                remaining: self.remaining(now).unwrap_or_default(),
            }),
            State::HalfOpen if self.counts.requests >= policy.max_requests => {
                Err(Rejection::TooManyRequests)
            }
            _ => {
                self.counts.on_request();
                Ok(self.generation)
            }
        };

        (verdict, transition)
    }

    /// Record the outcome of a call admitted under `receipt`.
    pub fn record(
        &mut self,
        receipt: u64,
        success: bool,
        policy: &Policy,
        now: Instant,
    ) -> Option<Transition> {
        let (state, transition) = self.current(policy, now);
        if self.generation != receipt {
            return transition;
        }

        match (state, success) {
            (State::Closed, true) => {
                self.counts.on_success();
                None
            }
            (State::HalfOpen, true) => {
                self.counts.on_success();
                if self.counts.consecutive_successes >= policy.max_requests {
                    self.set_state(State::Closed, policy, now)
                } else {
                    None
                }
            }
            (State::Closed, false) => {
                self.counts.on_failure();
                if (policy.ready_to_trip)(&self.counts) {
                    self.set_state(State::Open, policy, now)
                } else {
                    None
                }
            }
            (State::HalfOpen, false) => {
                self.counts.on_failure();
                self.set_state(State::Open, policy, now)
            }
            // Admission never hands out an Open receipt.
            (State::Open, _) => None,
        }
    }

    /// Force Closed with a fresh generation, whatever the current state.
    pub fn reset(&mut self, policy: &Policy, now: Instant) -> Option<Transition> {
        let from = self.state;
        self.state = State::Closed;
        self.start_generation(policy, now);
        (from != State::Closed).then_some(Transition {
            from,
            to: State::Closed,
        })
    }

    fn expired(&self, now: Instant) -> bool {
        self.expiry.is_some_and(|expiry| expiry <= now)
    }

    fn set_state(&mut self, to: State, policy: &Policy, now: Instant) -> Option<Transition> {
        if self.state == to {
            return None;
        }
        let from = self.state;
        self.state = to;
        self.start_generation(policy, now);
        Some(Transition { from, to })
    }

    fn start_generation(&mut self, policy: &Policy, now: Instant) {
        self.generation = self.generation.wrapping_add(1);
        self.counts = Counts::default();
        self.expiry = match self.state {
            State::Closed if policy.interval.is_zero() => None,
            State::Closed => Some(saturating_add(now, policy.interval)),
            State::Open => Some(saturating_add(now, policy.timeout)),
            State::HalfOpen => None,
        };
    }
}

/// `now + d`, clamped to roughly thirty years out.
fn saturating_add(now: Instant, d: Duration) -> Instant {
    const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);
    now.checked_add(d.min(FAR_FUTURE))
        .or_else(|| now.checked_add(Duration::from_secs(86_400)))
        .unwrap_or(now)
}
