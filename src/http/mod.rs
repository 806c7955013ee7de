//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing, timeout)
//!     → registry lookup for the named dependency
//!     → circuit breaker admits or rejects the call
//!     → response.rs (upstream reply or mapped error)
//!     → Send to client
//! ```

pub mod response;
pub mod server;

pub use response::{GatewayError, UpstreamError, UpstreamReply};
pub use server::{AppState, HttpServer, X_REQUEST_ID};
