//! Response handling for gateway calls.
//!
//! # Responsibilities
//! - Carry the upstream reply back to the client
//! - Map breaker and upstream errors to HTTP status codes
//!
//! # Design Decisions
//! - Open breaker results in 503 with a `Retry-After` hint
//! - Caller deadline results in 504 Gateway Timeout
//! - Upstream 5xx and transport errors result in 502 Bad Gateway

use std::time::Duration;

use axum::{
    body::Bytes,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::resilience::{BreakerError, ExecuteError};

/// A successful (non-5xx) upstream reply.
#[derive(Debug, Clone)]
pub struct UpstreamReply {
    pub status: StatusCode,
    pub content_type: Option<HeaderValue>,
    pub body: Bytes,
}

impl IntoResponse for UpstreamReply {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.body).into_response();
        if let Some(content_type) = self.content_type {
            response
                .headers_mut()
                .insert(header::CONTENT_TYPE, content_type);
        }
        response
    }
}

/// Why an upstream call counted as a failure.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream returned {0}")]
    Status(StatusCode),
}

/// Errors surfaced by the gateway handler.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("unknown dependency '{0}'")]
    UnknownDependency(String),

    #[error(transparent)]
    Breaker(#[from] ExecuteError<UpstreamError>),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::UnknownDependency(_) => StatusCode::NOT_FOUND,
            GatewayError::Breaker(err) => match err {
                ExecuteError::Rejected(_) | ExecuteError::Cancelled { .. } => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                ExecuteError::DeadlineExceeded { .. } => StatusCode::GATEWAY_TIMEOUT,
                ExecuteError::Call(_) => StatusCode::BAD_GATEWAY,
            },
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            GatewayError::Breaker(ExecuteError::Rejected(BreakerError::OpenState {
                remaining,
                ..
            })) => Some(*remaining),
            _ => None,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let retry_after = self.retry_after();
        let mut response = (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response();

        if let Some(remaining) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs(remaining)));
        }
        response
    }
}

/// Whole seconds for `Retry-After`, rounded up and never zero.
fn retry_after_secs(remaining: Duration) -> u64 {
    let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
    secs.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::State;

    #[test]
    fn test_open_breaker_maps_to_503_with_retry_after() {
        let err = GatewayError::from(ExecuteError::Rejected(BreakerError::OpenState {
            name: "opa".into(),
            state: State::Open,
            remaining: Duration::from_millis(1500),
        }));
        let response = err.into_response();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[header::RETRY_AFTER], "2");
    }

    #[test]
    fn test_status_mapping() {
        let deadline = GatewayError::from(ExecuteError::<UpstreamError>::DeadlineExceeded {
            name: "idp".into(),
            deadline: Duration::from_millis(200),
        });
        assert_eq!(deadline.status(), StatusCode::GATEWAY_TIMEOUT);

        let upstream = GatewayError::from(ExecuteError::Call(UpstreamError::Status(
            StatusCode::INTERNAL_SERVER_ERROR,
        )));
        assert_eq!(upstream.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(upstream.to_string(), "upstream returned 500 Internal Server Error");

        let quota = GatewayError::from(ExecuteError::<UpstreamError>::Rejected(
            BreakerError::TooManyRequests {
                name: "idp".into(),
                state: State::HalfOpen,
            },
        ));
        let response = quota.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.headers().get(header::RETRY_AFTER).is_none());

        let missing = GatewayError::UnknownDependency("nope".into());
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_retry_after_rounds_up() {
        assert_eq!(retry_after_secs(Duration::ZERO), 1);
        assert_eq!(retry_after_secs(Duration::from_secs(3)), 3);
        assert_eq!(retry_after_secs(Duration::from_millis(3001)), 4);
    }
}
