//! Breaker error taxonomy.
//!
//! - Admission rejected: the call was never attempted ([`BreakerError`])
//! - Deadline / cancellation: the caller stopped waiting, counted as a failure
//! - Call failure: the protected call's own error, passed through untouched

use std::time::Duration;

use thiserror::Error;

use crate::resilience::state::State;

/// Admission was refused by the breaker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BreakerError {
    /// Breaker is open; `remaining` is the time until the next probe window.
    #[error("circuit breaker '{name}' is {state} (remaining: {remaining:?})")]
    OpenState {
        name: String,
        state: State,
        remaining: Duration,
    },

    /// Half-open probe quota is exhausted.
    #[error("circuit breaker '{name}' is {state}: too many requests")]
    TooManyRequests { name: String, state: State },
}

impl BreakerError {
    pub fn name(&self) -> &str {
        match self {
            BreakerError::OpenState { name, .. } | BreakerError::TooManyRequests { name, .. } => {
                name
            }
        }
    }

    pub fn state(&self) -> State {
        match self {
            BreakerError::OpenState { state, .. } | BreakerError::TooManyRequests { state, .. } => {
                *state
            }
        }
    }
}

/// Result of running a call through a breaker.
#[derive(Debug, Error)]
pub enum ExecuteError<E> {
    /// The breaker refused to run the call.
    #[error(transparent)]
    Rejected(#[from] BreakerError),

    /// The caller's deadline fired before the call finished.
    #[error("call through circuit breaker '{name}' exceeded its {deadline:?} deadline")]
    DeadlineExceeded { name: String, deadline: Duration },

    /// The caller's cancellation signal fired before the call finished.
    #[error("call through circuit breaker '{name}' was cancelled")]
    Cancelled { name: String },

    /// The protected call itself failed.
    #[error(transparent)]
    Call(E),
}

impl<E> ExecuteError<E> {
    /// True when the call was never attempted.
    pub fn is_rejection(&self) -> bool {
        matches!(self, ExecuteError::Rejected(_))
    }

    /// True when the caller gave up waiting (deadline or cancellation).
    pub fn is_interrupted(&self) -> bool {
        matches!(
            self,
            ExecuteError::DeadlineExceeded { .. } | ExecuteError::Cancelled { .. }
        )
    }

    /// How long until an open breaker admits a probe.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ExecuteError::Rejected(BreakerError::OpenState { remaining, .. }) => Some(*remaining),
            _ => None,
        }
    }

    /// The call's own error, if that is what this is.
    pub fn into_call_error(self) -> Option<E> {
        match self {
            ExecuteError::Call(e) => Some(e),
            _ => None,
        }
    }
}
