//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Breakers and the gateway produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging with breaker/dependency fields for machine parsing
//! - Request ID flows from the edge to the dependency call
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
