//! Circuit breaker for dependency protection.
//!
//! # Call Flow
//! ```text
//! execute(call)
//!     → admission under the breaker mutex (Open / quota check, receipt)
//!     → call spawned as its own task, raced against deadline/cancellation
//!     → outcome recorded under the mutex, ignored if the generation moved on
//!     → observer notified after the mutex is released
//! ```
//!
//! # Design Decisions
//! - One mutex per breaker, held only for state bookkeeping, never across
//!   the protected call
//! - Fail fast in Open state (no waiting for the timeout)
//! - A timed-out, cancelled or dropped call is recorded as a failure at once and
//!   left running in the background; abandoned calls are tracked so the leak
//!   is at least visible
//! - Panics inside the call count as failures and are resumed on the caller

use std::future::Future;
use std::panic;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;

use crate::observability::metrics;
use crate::resilience::errors::{BreakerError, ExecuteError};
use crate::resilience::observer::{self, LogStateChanges, StateObserver};
use crate::resilience::settings::Settings;
use crate::resilience::state::{Counts, Policy, Rejection, State, Transition, Window};
use crate::resilience::timeouts::{self, Interrupt};

/// A single breaker guarding one dependency.
pub struct CircuitBreaker {
    name: String,
    policy: Policy,
    observer: Arc<dyn StateObserver>,
    window: Mutex<Window>,
    load: Arc<CallLoad>,
}

/// Point-in-time view of a breaker, taken under one lock acquisition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: State,
    pub generation: u64,
    pub counts: Counts,
    pub in_flight: usize,
    pub orphaned_calls: usize,
    /// Milliseconds until an open breaker admits a probe.
    pub retry_after_ms: Option<u64>,
}

impl CircuitBreaker {
    /// Create a breaker. Zero/absent settings take their defaults.
    pub fn new(name: impl Into<String>, settings: Settings) -> Self {
        let name = name.into();
        let policy = settings.policy();
        let window = Window::new(&policy, Instant::now());
        let observer = settings
            .on_state_change
            .unwrap_or_else(|| Arc::new(LogStateChanges));

        Self {
            load: Arc::new(CallLoad::new(&name)),
            name,
            policy,
            observer,
            window: Mutex::new(window),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Effective state right now.
    pub fn state(&self) -> State {
        self.with_window(|window, now| window.current(&self.policy, now))
    }

    /// Counts of the current generation.
    pub fn counts(&self) -> Counts {
        self.with_window(|window, now| {
            let (_, transition) = window.current(&self.policy, now);
            (window.counts(), transition)
        })
    }

    pub fn generation(&self) -> u64 {
        self.with_window(|window, now| {
            let (_, transition) = window.current(&self.policy, now);
            (window.generation(), transition)
        })
    }

    /// Calls still executing, abandoned ones included.
    pub fn in_flight(&self) -> usize {
        self.load.in_flight.load(Ordering::Acquire)
    }

    /// Calls whose caller stopped waiting but which have not finished yet.
    pub fn orphaned_calls(&self) -> usize {
        self.load.orphaned.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        self.with_window(|window, now| {
            let (state, transition) = window.current(&self.policy, now);
            let snapshot = BreakerSnapshot {
                name: self.name.clone(),
                state,
                generation: window.generation(),
                counts: window.counts(),
                in_flight: self.in_flight(),
                orphaned_calls: self.orphaned_calls(),
                retry_after_ms: window
                    .remaining(now)
                    .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            };
            (snapshot, transition)
        })
    }

    /// Force the breaker back to Closed with fresh counts.
    pub fn reset(&self) {
        self.with_window(|window, now| ((), window.reset(&self.policy, now)));
        tracing::info!(breaker = %self.name, "Circuit breaker reset");
    }

    /// Run `call` if the breaker admits it.
    pub async fn execute<F, Fut, T, E>(&self, call: F) -> Result<T, ExecuteError<E>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        self.dispatch(timeouts::never(), move |tracker| {
            tokio::spawn(async move {
                let _tracker = tracker;
                call().await
            })
        })
        .await
    }

    /// Run `call`, giving up (and counting a failure) after `deadline`.
    pub async fn execute_with_timeout<F, Fut, T, E>(
        &self,
        deadline: Duration,
        call: F,
    ) -> Result<T, ExecuteError<E>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        self.dispatch(timeouts::deadline(deadline), move |tracker| {
            tokio::spawn(async move {
                let _tracker = tracker;
                call().await
            })
        })
        .await
    }

    /// Run `call`, giving up (and counting a failure) when `cancel` resolves.
    pub async fn execute_until<S, F, Fut, T, E>(
        &self,
        cancel: S,
        call: F,
    ) -> Result<T, ExecuteError<E>>
    where
        S: Future,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        self.dispatch(timeouts::cancelled_by(cancel), move |tracker| {
            tokio::spawn(async move {
                let _tracker = tracker;
                call().await
            })
        })
        .await
    }

    /// Run a blocking `call` on the blocking pool.
    pub async fn execute_blocking<F, T, E>(&self, call: F) -> Result<T, ExecuteError<E>>
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        self.dispatch(timeouts::never(), move |tracker| {
            tokio::task::spawn_blocking(move || {
                let _tracker = tracker;
                call()
            })
        })
        .await
    }

    async fn dispatch<I, S, T, E>(&self, interrupt: I, spawn: S) -> Result<T, ExecuteError<E>>
    where
        I: Future<Output = Interrupt>,
        S: FnOnce(CallTracker) -> JoinHandle<Result<T, E>>,
    {
        let receipt = self.before_request()?;

        let tracker = CallTracker::start(Arc::clone(&self.load));
        let admission = Admission {
            breaker: self,
            receipt,
            lifecycle: Arc::clone(&tracker.lifecycle),
            settled: false,
        };
        let mut handle = spawn(tracker);

        tokio::pin!(interrupt);
        tokio::select! {
            biased;
            joined = &mut handle => self.settle(admission, joined),
            reason = &mut interrupt => {
                admission.abandon(reason.outcome_label());
                Err(reason.into_error(&self.name))
            }
        }
    }

    fn settle<T, E>(
        &self,
        admission: Admission<'_>,
        joined: Result<Result<T, E>, JoinError>,
    ) -> Result<T, ExecuteError<E>> {
        match joined {
            Ok(Ok(value)) => {
                admission.complete(true);
                metrics::record_call(&self.name, "success");
                Ok(value)
            }
            Ok(Err(err)) => {
                admission.complete(false);
                metrics::record_call(&self.name, "failure");
                Err(ExecuteError::Call(err))
            }
            Err(join_error) => {
                admission.complete(false);
                if join_error.is_panic() {
                    metrics::record_call(&self.name, "panic");
                    tracing::error!(breaker = %self.name, "Protected call panicked");
                    panic::resume_unwind(join_error.into_panic());
                }
                // The runtime is shutting down underneath us.
                metrics::record_call(&self.name, "cancelled");
                Err(Interrupt::Cancelled.into_error(&self.name))
            }
        }
    }

    fn before_request(&self) -> Result<u64, BreakerError> {
        let verdict = self.with_window(|window, now| window.admit(&self.policy, now));

        verdict.map_err(|rejection| {
            let err = match rejection {
                Rejection::Open { remaining } => {
                    metrics::record_call(&self.name, "rejected_open");
                    BreakerError::OpenState {
                        name: self.name.clone(),
                        state: State::Open,
                        remaining: round_to_millis(remaining),
                    }
                }
                Rejection::TooManyRequests => {
                    metrics::record_call(&self.name, "rejected_half_open");
                    BreakerError::TooManyRequests {
                        name: self.name.clone(),
                        state: State::HalfOpen,
                    }
                }
            };
            tracing::debug!(breaker = %self.name, error = %err, "Call rejected");
            err
        })
    }

    fn after_request(&self, receipt: u64, success: bool) {
        self.with_window(|window, now| {
            ((), window.record(receipt, success, &self.policy, now))
        });
    }

    /// Run `f` under the breaker mutex, then notify the observer of any
    /// transition once the lock is released.
    fn with_window<R>(&self, f: impl FnOnce(&mut Window, Instant) -> (R, Option<Transition>)) -> R {
        let (result, transition) = {
            let mut window = self.lock();
            f(&mut *window, Instant::now())
        };

        if let Some(transition) = transition {
            metrics::record_state_change(&self.name, transition.from, transition.to);
            observer::notify(self.observer.as_ref(), &self.name, transition);
        }
        result
    }

    fn lock(&self) -> MutexGuard<'_, Window> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("max_requests", &self.policy.max_requests)
            .field("interval", &self.policy.interval)
            .field("timeout", &self.policy.timeout)
            .field("window", &*self.lock())
            .finish()
    }
}

fn round_to_millis(d: Duration) -> Duration {
    Duration::from_millis(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// Live call accounting shared between a breaker and its spawned calls.
#[derive(Debug)]
struct CallLoad {
    breaker: Arc<str>,
    in_flight: AtomicUsize,
    orphaned: AtomicUsize,
}

impl CallLoad {
    fn new(breaker: &str) -> Self {
        Self {
            breaker: Arc::from(breaker),
            in_flight: AtomicUsize::new(0),
            orphaned: AtomicUsize::new(0),
        }
    }

    fn abandon(&self, lifecycle: &AtomicU8) {
        // Count first so a concurrent finish never decrements below zero.
        self.orphaned.fetch_add(1, Ordering::AcqRel);
        if lifecycle
            .compare_exchange(RUNNING, ABANDONED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.orphaned.fetch_sub(1, Ordering::AcqRel);
        }
        self.publish_orphaned();
    }

    fn publish_orphaned(&self) {
        metrics::record_orphaned(&self.breaker, self.orphaned.load(Ordering::Acquire));
    }
}

/// An admitted call whose outcome has not been recorded yet.
///
/// Dropping it unsettled (the caller's future was dropped mid-call) records a
/// failure and leaves the spawned call running as an orphan.
struct Admission<'a> {
    breaker: &'a CircuitBreaker,
    receipt: u64,
    lifecycle: Arc<AtomicU8>,
    settled: bool,
}

impl Admission<'_> {
    fn complete(mut self, success: bool) {
        self.settled = true;
        self.breaker.after_request(self.receipt, success);
    }

    fn abandon(mut self, outcome: &'static str) {
        self.give_up(outcome);
    }

    fn give_up(&mut self, outcome: &'static str) {
        self.settled = true;
        let breaker = self.breaker;
        breaker.after_request(self.receipt, false);
        breaker.load.abandon(&self.lifecycle);
        metrics::record_call(&breaker.name, outcome);
        tracing::warn!(
            breaker = %breaker.name,
            reason = outcome,
            orphaned = breaker.orphaned_calls(),
            "Caller stopped waiting; call left running"
        );
    }
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.give_up("dropped");
        }
    }
}

const RUNNING: u8 = 0;
const FINISHED: u8 = 1;
const ABANDONED: u8 = 2;

/// A RAII guard that lives inside the spawned call.
struct CallTracker {
    load: Arc<CallLoad>,
    lifecycle: Arc<AtomicU8>,
}

impl CallTracker {
    fn start(load: Arc<CallLoad>) -> Self {
        load.in_flight.fetch_add(1, Ordering::AcqRel);
        Self {
            load,
            lifecycle: Arc::new(AtomicU8::new(RUNNING)),
        }
    }
}

impl Drop for CallTracker {
    fn drop(&mut self) {
        if self.lifecycle.swap(FINISHED, Ordering::AcqRel) == ABANDONED {
            self.load.orphaned.fetch_sub(1, Ordering::AcqRel);
            self.load.publish_orphaned();
        }
        self.load.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}
