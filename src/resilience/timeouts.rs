//! Deadlines and cancellation for protected calls.
//!
//! # Responsibilities
//! - Turn a caller deadline or cancellation future into an interrupt signal
//! - Map the interrupt to the error the caller observes
//!
//! # Design Decisions
//! - Uses Tokio's timer, so paused test clocks drive deadlines too
//! - Interrupting only stops the caller's wait; the call itself keeps running
//! - Timeout errors are distinct from call errors

use std::future::{self, Future};
use std::time::Duration;

use crate::resilience::errors::ExecuteError;

/// Why the caller stopped waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Interrupt {
    Deadline(Duration),
    Cancelled,
}

impl Interrupt {
    pub fn into_error<E>(self, name: &str) -> ExecuteError<E> {
        match self {
            Interrupt::Deadline(deadline) => ExecuteError::DeadlineExceeded {
                name: name.to_string(),
                deadline,
            },
            Interrupt::Cancelled => ExecuteError::Cancelled {
                name: name.to_string(),
            },
        }
    }

    pub fn outcome_label(&self) -> &'static str {
        match self {
            Interrupt::Deadline(_) => "deadline_exceeded",
            Interrupt::Cancelled => "cancelled",
        }
    }
}

/// Never interrupts.
pub(crate) fn never() -> impl Future<Output = Interrupt> {
    future::pending()
}

/// Interrupts once `deadline` has elapsed.
pub(crate) fn deadline(deadline: Duration) -> impl Future<Output = Interrupt> {
    async move {
        tokio::time::sleep(deadline).await;
        Interrupt::Deadline(deadline)
    }
}

/// Interrupts when `signal` resolves.
pub(crate) fn cancelled_by<S>(signal: S) -> impl Future<Output = Interrupt>
where
    S: Future,
{
    async move {
        signal.await;
        Interrupt::Cancelled
    }
}
