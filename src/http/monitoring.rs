//! Health and monitoring endpoints (allowlisted, no tenant required
//! except the per-tenant session view).

use axum::{extract::State, Json};
use serde::Serialize;
use serde_json::{json, Value};

use super::common::ApiResponse;
use super::router::AppState;
use crate::ocpp::SessionStats;

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: &'static str,
    pub connected_stations: usize,
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "Monitoring",
    responses((status = 200, body = HealthStatus))
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "UP",
        version: env!("CARGO_PKG_VERSION"),
        connected_stations: state.registry.count(),
    })
}

pub async fn root() -> Json<Value> {
    Json(json!({
        "service": "csms-service",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Prometheus exposition; empty when no recorder is installed (tests).
pub async fn metrics(State(state): State<AppState>) -> String {
    state
        .prometheus
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default()
}

#[utoipa::path(
    get,
    path = "/api/v1/monitoring/sessions",
    tag = "Monitoring",
    responses((status = 200, body = ApiResponse<SessionStats>)),
    security(("bearer_auth" = []))
)]
pub async fn session_stats(State(state): State<AppState>) -> Json<ApiResponse<SessionStats>> {
    Json(ApiResponse::success(state.registry.stats()))
}
