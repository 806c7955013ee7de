//! Circuit breakers for calls to unreliable dependencies, with a registry,
//! an HTTP gateway and an admin API on top.

pub mod admin;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::schema::ServiceConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use resilience::{
    BreakerError, CircuitBreaker, ExecuteError, Registry, Settings, State, StateObserver,
};
