//! Charging-session endpoints (read-only; sessions are driven by OCPP).

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use super::common::{api_error, ApiResponse, ApiResult};
use super::router::AppState;
use crate::domain::{ChargingSession, SessionStatus};
use crate::shared::errors::DomainError;
use crate::shared::pagination::{validate_pagination, PaginatedResult};

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct SessionDto {
    pub session_uuid: String,
    #[schema(value_type = String)]
    pub status: SessionStatus,
    pub station_id: String,
    pub connector_id: Option<u32>,
    pub ocpp_transaction_id: Option<i64>,
    pub id_tag: Option<String>,
    pub start_time: Option<chrono::DateTime<chrono::Utc>>,
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
    #[schema(value_type = Option<f64>)]
    pub energy_delivered_kwh: Option<rust_decimal::Decimal>,
    pub duration_minutes: Option<i64>,
    pub max_power_kw: Option<f64>,
    pub average_power_kw: Option<f64>,
    pub stop_reason: Option<String>,
    #[schema(value_type = Option<f64>)]
    pub total_cost: Option<rust_decimal::Decimal>,
    pub currency: Option<String>,
    pub meter_value_count: usize,
}

impl SessionDto {
    fn from_domain(session: ChargingSession) -> Self {
        Self {
            session_uuid: session.session_uuid,
            status: session.status,
            station_id: session.station_id,
            connector_id: session.connector_id,
            ocpp_transaction_id: session.ocpp_transaction_id,
            id_tag: session.ocpp_id_tag,
            start_time: session.start_time,
            end_time: session.end_time,
            energy_delivered_kwh: session.energy_delivered_kwh,
            duration_minutes: session.duration_minutes,
            max_power_kw: session.max_power_kw,
            average_power_kw: session.average_power_kw,
            stop_reason: session.stop_reason.map(|r| format!("{:?}", r)),
            total_cost: session.costs.as_ref().map(|c| c.total_cost),
            currency: session.costs.map(|c| c.currency),
            meter_value_count: session.meter_values.len(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionListQuery {
    pub station_id: Option<String>,
    pub active: Option<bool>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[utoipa::path(
    get,
    path = "/api/v1/sessions",
    tag = "Sessions",
    params(
        ("stationId" = Option<String>, Query),
        ("active" = Option<bool>, Query),
        ("page" = Option<u64>, Query),
        ("limit" = Option<u64>, Query)
    ),
    responses((status = 200, body = ApiResponse<PaginatedResult<SessionDto>>)),
    security(("bearer_auth" = []))
)]
pub async fn list_sessions(
    State(state): State<AppState>,
    Query(query): Query<SessionListQuery>,
) -> ApiResult<PaginatedResult<SessionDto>> {
    let mut sessions = match &query.station_id {
        Some(station_id) => state
            .repos
            .sessions()
            .find_for_station(station_id)
            .await
            .map_err(api_error)?,
        None => state.repos.sessions().find_all().await.map_err(api_error)?,
    };
    if query.active == Some(true) {
        sessions.retain(|s| s.status.is_active());
    }
    sessions.sort_by(|a, b| b.start_time.cmp(&a.start_time));

    let (page, limit) = validate_pagination(query.page, query.limit);
    let dtos: Vec<SessionDto> = sessions.into_iter().map(SessionDto::from_domain).collect();
    Ok(Json(ApiResponse::success(PaginatedResult::paginate(
        dtos, page, limit,
    ))))
}

#[utoipa::path(
    get,
    path = "/api/v1/sessions/{session_uuid}",
    tag = "Sessions",
    params(("session_uuid" = String, Path)),
    responses((status = 200, body = ApiResponse<SessionDto>), (status = 404)),
    security(("bearer_auth" = []))
)]
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_uuid): Path<String>,
) -> ApiResult<SessionDto> {
    let session = state
        .repos
        .sessions()
        .find_by_uuid(&session_uuid)
        .await
        .map_err(api_error)?
        .ok_or_else(|| {
            api_error(DomainError::NotFound {
                entity: "ChargingSession",
                field: "session_uuid",
                value: session_uuid.clone(),
            })
        })?;
    Ok(Json(ApiResponse::success(SessionDto::from_domain(session))))
}
