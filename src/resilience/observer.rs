//! State change observation.
//!
//! Observers are notified after the breaker has released its lock, and any
//! panic they raise is caught and dropped.

use std::panic::{self, AssertUnwindSafe};

use crate::resilience::state::{State, Transition};

/// Receives every state transition of a breaker.
pub trait StateObserver: Send + Sync {
    fn on_state_change(&self, name: &str, from: State, to: State);
}

impl<F> StateObserver for F
where
    F: Fn(&str, State, State) + Send + Sync,
{
    fn on_state_change(&self, name: &str, from: State, to: State) {
        self(name, from, to)
    }
}

/// Default observer: one structured log line per transition.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogStateChanges;

impl StateObserver for LogStateChanges {
    fn on_state_change(&self, name: &str, from: State, to: State) {
        if to == State::Open {
            tracing::warn!(breaker = %name, from = %from, to = %to, "Circuit breaker opened");
        } else {
            tracing::info!(breaker = %name, from = %from, to = %to, "Circuit breaker state change");
        }
    }
}

pub(crate) fn notify(observer: &dyn StateObserver, name: &str, transition: Transition) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        observer.on_state_change(name, transition.from, transition.to)
    }));

    if outcome.is_err() {
        tracing::error!(
            breaker = %name,
            from = %transition.from,
            to = %transition.to,
            "State change observer panicked; ignoring"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_closure_observer_receives_transition() {
        let seen = Mutex::new(Vec::new());
        let observer = |name: &str, from: State, to: State| {
            seen.lock().unwrap().push((name.to_string(), from, to));
        };

        notify(
            &observer,
            "idp",
            Transition { from: State::Closed, to: State::Open },
        );

        assert_eq!(
            *seen.lock().unwrap(),
            vec![("idp".to_string(), State::Closed, State::Open)]
        );
    }

    #[test]
    fn test_panicking_observer_is_isolated() {
        let observer = |_: &str, _: State, _: State| panic!("observer bug");
        notify(
            &observer,
            "policy-engine",
            Transition { from: State::HalfOpen, to: State::Closed },
        );
    }
}
