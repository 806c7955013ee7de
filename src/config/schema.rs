//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resilience::settings::{failure_ratio, Settings};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,

    /// Settings for breakers the registry creates on first use.
    pub breaker: BreakerConfig,

    /// Dependencies reachable through the gateway.
    pub dependencies: Vec<DependencyConfig>,
}

impl ServiceConfig {
    pub fn dependency(&self, name: &str) -> Option<&DependencyConfig> {
        self.dependencies.iter().find(|d| d.name == name)
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration for inbound requests.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AdminConfig {
    /// Mount the admin routes.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
        }
    }
}

/// Registry-wide breaker defaults.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BreakerConfig {
    /// Probe calls allowed while half-open.
    pub max_requests: u32,

    /// How long closed-state counts stay valid in milliseconds (0 = forever).
    pub interval_ms: u64,

    /// How long to stay open before probing, in milliseconds.
    pub timeout_ms: u64,

    /// Requests needed before the failure ratio is considered.
    pub min_requests: u32,

    /// Failure share that trips the breaker.
    pub failure_ratio: f64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            max_requests: 3,
            interval_ms: 10_000,
            timeout_ms: 30_000,
            min_requests: 3,
            failure_ratio: 0.6,
        }
    }
}

impl BreakerConfig {
    pub fn settings(&self) -> Settings {
        Settings::new()
            .with_max_requests(self.max_requests)
            .with_interval(Duration::from_millis(self.interval_ms))
            .with_timeout(Duration::from_millis(self.timeout_ms))
            .with_trip_predicate(failure_ratio(self.min_requests, self.failure_ratio))
    }

    /// These defaults with any `overrides` applied on top.
    pub fn merged(&self, overrides: &BreakerOverrides) -> Self {
        Self {
            max_requests: overrides.max_requests.unwrap_or(self.max_requests),
            interval_ms: overrides.interval_ms.unwrap_or(self.interval_ms),
            timeout_ms: overrides.timeout_ms.unwrap_or(self.timeout_ms),
            min_requests: overrides.min_requests.unwrap_or(self.min_requests),
            failure_ratio: overrides.failure_ratio.unwrap_or(self.failure_ratio),
        }
    }
}

/// Per-dependency breaker tuning; unset fields inherit `[breaker]`.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct BreakerOverrides {
    pub max_requests: Option<u32>,
    pub interval_ms: Option<u64>,
    pub timeout_ms: Option<u64>,
    pub min_requests: Option<u32>,
    pub failure_ratio: Option<f64>,
}

/// An external dependency reachable through the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct DependencyConfig {
    /// Unique dependency name; also the breaker name.
    pub name: String,

    /// URL the gateway calls.
    pub url: String,

    /// How long the caller waits before the call counts as failed, in milliseconds.
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,

    /// Breaker overrides for this dependency.
    #[serde(default)]
    pub breaker: BreakerOverrides,
}

impl DependencyConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

fn default_deadline_ms() -> u64 {
    5_000
}
