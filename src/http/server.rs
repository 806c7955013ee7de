//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (request ID, tracing, timeout)
//! - Forward dependency calls through their circuit breakers
//! - Apply configuration updates from the watcher
//! - Serve until the shutdown signal fires

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin::setup_admin_router;
use crate::config::ServiceConfig;
use crate::http::response::{GatewayError, UpstreamError, UpstreamReply};
use crate::observability::metrics;
use crate::resilience::{Registry, State as BreakerState};

pub const X_REQUEST_ID: &str = "x-request-id";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub config: Arc<ArcSwap<ServiceConfig>>,
    pub client: reqwest::Client,
}

/// HTTP front end for the breaker registry.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ServiceConfig) -> Result<Self, reqwest::Error> {
        let registry = Arc::new(Registry::new(config.breaker.settings()));
        Self::with_registry(config, registry)
    }

    /// Create a server that serves an existing registry.
    pub fn with_registry(
        config: ServiceConfig,
        registry: Arc<Registry>,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().no_proxy().build()?;

        for dependency in &config.dependencies {
            registry.get_or_create_with(&dependency.name, || {
                config.breaker.merged(&dependency.breaker).settings()
            });
        }

        let router_config = config.clone();
        let state = AppState {
            registry,
            config: Arc::new(ArcSwap::from_pointee(config)),
            client,
        };

        let router = Self::build_router(&router_config, state.clone());
        Ok(Self { router, state })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ServiceConfig, state: AppState) -> Router {
        let mut router = Router::new()
            .route("/health", get(health_handler))
            .route("/dependencies/{name}", get(dependency_handler))
            .with_state(state.clone());

        if config.admin.enabled {
            router = router.merge(setup_admin_router(state));
        }

        router.layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(TimeoutLayer::new(Duration::from_secs(
                    config.timeouts.request_secs,
                ))),
        )
    }

    /// The registry this server routes calls through.
    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.state.registry)
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<ServiceConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let shared_config = Arc::clone(&self.state.config);
        tokio::spawn(async move {
            while let Some(new_config) = config_updates.recv().await {
                tracing::info!(
                    dependencies = new_config.dependencies.len(),
                    "Applying configuration update"
                );
                shared_config.store(Arc::new(new_config));
            }
        });

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

#[derive(Serialize)]
struct HealthReport {
    status: &'static str,
    version: &'static str,
    breakers: BTreeMap<String, BreakerState>,
}

/// Liveness plus a summary of every breaker.
async fn health_handler(State(state): State<AppState>) -> Json<HealthReport> {
    let breakers = state.registry.list();
    let status = if breakers.values().all(|s| *s == BreakerState::Closed) {
        "healthy"
    } else {
        "degraded"
    };

    Json(HealthReport {
        status,
        version: env!("CARGO_PKG_VERSION"),
        breakers,
    })
}

/// Call a configured dependency through its breaker.
async fn dependency_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Result<Response, GatewayError> {
    let start = Instant::now();
    let config = state.config.load_full();

    let Some(dependency) = config.dependency(&name) else {
        tracing::warn!(dependency = %name, "Unknown dependency requested");
        return Err(GatewayError::UnknownDependency(name));
    };

    let breaker = state.registry.get_or_create_with(&name, || {
        config.breaker.merged(&dependency.breaker).settings()
    });

    let request_id = headers.get(X_REQUEST_ID).cloned();
    let client = state.client.clone();
    let url = dependency.url.clone();

    tracing::debug!(
        dependency = %name,
        request_id = ?request_id,
        url = %url,
        "Calling dependency"
    );

    let result = breaker
        .execute_with_timeout(dependency.deadline(), move || {
            call_upstream(client, url, request_id)
        })
        .await;

    match result {
        Ok(reply) => {
            metrics::record_request(&name, reply.status.as_u16(), start);
            Ok(reply.into_response())
        }
        Err(err) => {
            let err = GatewayError::from(err);
            tracing::warn!(dependency = %name, error = %err, "Dependency call failed");
            metrics::record_request(&name, err.status().as_u16(), start);
            Err(err)
        }
    }
}

async fn call_upstream(
    client: reqwest::Client,
    url: String,
    request_id: Option<HeaderValue>,
) -> Result<UpstreamReply, UpstreamError> {
    let mut request = client.get(url);
    if let Some(id) = request_id {
        request = request.header(X_REQUEST_ID, id);
    }

    let response = request.send().await?;
    let status = response.status();
    if status.is_server_error() {
        return Err(UpstreamError::Status(status));
    }

    let content_type = response.headers().get(header::CONTENT_TYPE).cloned();
    let body = response.bytes().await?;
    Ok(UpstreamReply {
        status,
        content_type,
        body,
    })
}
