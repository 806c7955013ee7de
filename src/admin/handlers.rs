use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::http::server::AppState;
use crate::resilience::{BreakerSnapshot, State as BreakerState};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub breakers: usize,
    pub open: usize,
    pub half_open: usize,
    pub orphaned_calls: usize,
}

#[derive(Serialize)]
pub struct ResetResponse {
    pub reset: usize,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let snapshots = state.registry.snapshots();
    let count = |target: BreakerState| {
        snapshots.iter().filter(|s| s.state == target).count()
    };

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        breakers: snapshots.len(),
        open: count(BreakerState::Open),
        half_open: count(BreakerState::HalfOpen),
        orphaned_calls: snapshots.iter().map(|s| s.orphaned_calls).sum(),
    })
}

pub async fn list_breakers(State(state): State<AppState>) -> Json<Vec<BreakerSnapshot>> {
    Json(state.registry.snapshots())
}

pub async fn get_breaker(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<BreakerSnapshot>, StatusCode> {
    state
        .registry
        .lookup(&name)
        .map(|breaker| Json(breaker.snapshot()))
        .ok_or(StatusCode::NOT_FOUND)
}

pub async fn reset_breaker(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<BreakerSnapshot>, StatusCode> {
    let breaker = state.registry.lookup(&name).ok_or(StatusCode::NOT_FOUND)?;
    breaker.reset();
    tracing::info!(breaker = %name, "Breaker reset via admin API");
    Ok(Json(breaker.snapshot()))
}

pub async fn reset_all(State(state): State<AppState>) -> Json<ResetResponse> {
    let reset = state.registry.reset_all();
    tracing::info!(count = reset, "All breakers reset via admin API");
    Json(ResetResponse { reset })
}
