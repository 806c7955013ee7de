//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to a dependency:
//!     → registry.rs (breaker for that dependency, created on first use)
//!     → circuit_breaker.rs (admit, run, record outcome)
//!         → state.rs (effective state, generation, counts)
//!         → timeouts.rs (deadline / cancellation race)
//!         → observer.rs (transition notifications)
//!     → errors.rs (rejection vs. interruption vs. call failure)
//! ```
//!
//! # Design Decisions
//! - Breakers only gate single attempts; retries belong to the caller
//! - Contention is per breaker, never registry-wide
//! - Breaker state is in-memory only and starts Closed on every boot

pub mod circuit_breaker;
pub mod errors;
pub mod observer;
pub mod registry;
pub mod settings;
pub mod state;
pub mod timeouts;

pub use circuit_breaker::{BreakerSnapshot, CircuitBreaker};
pub use errors::{BreakerError, ExecuteError};
pub use observer::{LogStateChanges, StateObserver};
pub use registry::Registry;
pub use settings::{consecutive_failures, failure_ratio, Settings};
pub use state::{Counts, State, TripPredicate};
