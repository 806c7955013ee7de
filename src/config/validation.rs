//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ratios in range, addresses parse)
//! - Detect duplicate dependency names
//! - Keep dependency deadlines inside the inbound request timeout
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{BreakerConfig, ServiceConfig};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field}: '{value}' is not a socket address")]
    InvalidAddress { field: String, value: String },

    #[error("{field}: must be greater than zero")]
    Zero { field: String },

    #[error("{field}: failure ratio {value} must be in (0, 1]")]
    FailureRatio { field: String, value: f64 },

    #[error("dependencies.{name}.deadline_ms: {deadline_ms}ms must be shorter than the {request_timeout_ms}ms request timeout")]
    DeadlineNotBelowRequestTimeout {
        name: String,
        deadline_ms: u64,
        request_timeout_ms: u64,
    },

    #[error("admin.api_key: must be set when the admin API is enabled")]
    EmptyApiKey,

    #[error("dependencies[{index}]: name must not be empty")]
    EmptyName { index: usize },

    #[error("dependency '{name}' is defined more than once")]
    DuplicateDependency { name: String },

    #[error("dependency '{name}': invalid url '{url}': {reason}")]
    InvalidUrl {
        name: String,
        url: String,
        reason: String,
    },
}

pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero {
            field: "timeouts.request_secs".into(),
        });
    }
    if config.admin.enabled && config.admin.api_key.is_empty() {
        errors.push(ValidationError::EmptyApiKey);
    }

    check_breaker(&mut errors, "breaker", &config.breaker);

    // The inbound request timeout must not cut a call off before its own deadline.
    let request_timeout_ms = config.timeouts.request_secs.saturating_mul(1000);
    let mut seen = HashSet::new();
    for (index, dependency) in config.dependencies.iter().enumerate() {
        if dependency.name.trim().is_empty() {
            errors.push(ValidationError::EmptyName { index });
            continue;
        }
        if !seen.insert(dependency.name.as_str()) {
            errors.push(ValidationError::DuplicateDependency {
                name: dependency.name.clone(),
            });
        }
        if let Err(e) = reqwest::Url::parse(&dependency.url) {
            errors.push(ValidationError::InvalidUrl {
                name: dependency.name.clone(),
                url: dependency.url.clone(),
                reason: e.to_string(),
            });
        }
        if dependency.deadline_ms == 0 {
            errors.push(ValidationError::Zero {
                field: format!("dependencies.{}.deadline_ms", dependency.name),
            });
        } else if request_timeout_ms > 0 && dependency.deadline_ms >= request_timeout_ms {
            errors.push(ValidationError::DeadlineNotBelowRequestTimeout {
                name: dependency.name.clone(),
                deadline_ms: dependency.deadline_ms,
                request_timeout_ms,
            });
        }
        check_breaker(
            &mut errors,
            &format!("dependencies.{}.breaker", dependency.name),
            &config.breaker.merged(&dependency.breaker),
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: field.to_string(),
            value: value.to_string(),
        });
    }
}

fn check_breaker(errors: &mut Vec<ValidationError>, prefix: &str, breaker: &BreakerConfig) {
    if breaker.max_requests == 0 {
        errors.push(ValidationError::Zero {
            field: format!("{prefix}.max_requests"),
        });
    }
    if breaker.timeout_ms == 0 {
        errors.push(ValidationError::Zero {
            field: format!("{prefix}.timeout_ms"),
        });
    }
    if !(breaker.failure_ratio > 0.0 && breaker.failure_ratio <= 1.0) {
        errors.push(ValidationError::FailureRatio {
            field: format!("{prefix}.failure_ratio"),
            value: breaker.failure_ratio,
        });
    }
}
