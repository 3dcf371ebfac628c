//! Station endpoints: CRUD, lifecycle toggles, search, statistics and
//! remote commands. Thin controllers; all work happens in the charging
//! core and the command dispatcher.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::common::{api_error, ApiResponse, ApiResult, ValidatedJson};
use super::router::AppState;
use crate::domain::{ChargingStation, GeoLocation};
use crate::ocpp::CommandError;
use crate::shared::errors::DomainError;

// ── DTOs ───────────────────────────────────────────────────────

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct StationDto {
    pub station_id: String,
    pub name: Option<String>,
    pub vendor: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub firmware_version: Option<String>,
    pub heartbeat_interval_secs: u32,
    pub connection_timeout_secs: u32,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub active: bool,
    pub maintenance: bool,
    pub maintenance_reason: Option<String>,
    pub connected: bool,
    pub online: bool,
    pub last_heartbeat_at: Option<chrono::DateTime<Utc>>,
    pub total_energy_kwh: f64,
    pub total_sessions: u64,
}

impl StationDto {
    fn from_domain(station: ChargingStation, connected_now: bool) -> Self {
        let online = station.is_online(Utc::now());
        Self {
            online,
            connected: connected_now || station.connected,
            station_id: station.station_id,
            name: station.name,
            vendor: station.vendor,
            model: station.model,
            serial_number: station.serial_number,
            firmware_version: station.firmware_version,
            heartbeat_interval_secs: station.heartbeat_interval_secs,
            connection_timeout_secs: station.connection_timeout_secs,
            latitude: station.location.map(|l| l.latitude),
            longitude: station.location.map(|l| l.longitude),
            active: station.active,
            maintenance: station.maintenance,
            maintenance_reason: station.maintenance_reason,
            last_heartbeat_at: station.last_heartbeat_at,
            total_energy_kwh: station.statistics.total_energy_kwh,
            total_sessions: station.statistics.total_sessions,
        }
    }
}

#[derive(Debug, Deserialize, Validate, utoipa::ToSchema)]
pub struct CreateStationRequest {
    #[validate(length(min = 1, max = 100))]
    pub station_id: String,
    pub name: Option<String>,
    pub vendor: Option<String>,
    pub model: Option<String>,
    #[validate(range(min = 30, max = 3600))]
    pub heartbeat_interval_secs: Option<u32>,
    #[validate(range(min = 10, max = 600))]
    pub connection_timeout_secs: Option<u32>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Deserialize, Validate, utoipa::ToSchema)]
pub struct UpdateStationRequest {
    pub name: Option<String>,
    #[validate(range(min = 30, max = 3600))]
    pub heartbeat_interval_secs: Option<u32>,
    #[validate(range(min = 10, max = 600))]
    pub connection_timeout_secs: Option<u32>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub query: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub radius_km: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct ReasonQuery {
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct StationsStatistics {
    pub total: usize,
    pub connected: usize,
    pub in_maintenance: usize,
    pub total_energy_kwh: f64,
    pub total_sessions: u64,
}

#[derive(Debug, Deserialize, Validate, utoipa::ToSchema)]
pub struct RemoteStartRequest {
    #[validate(length(min = 1))]
    pub id_tag: String,
    pub connector_id: Option<u32>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct RemoteStopRequest {
    pub transaction_id: i64,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CommandResponse {
    pub status: String,
    pub accepted: bool,
}

fn command_error<T>(station_id: &str, err: CommandError) -> (StatusCode, Json<ApiResponse<T>>) {
    let domain = match err {
        CommandError::NotConnected(_) => DomainError::StationOffline(station_id.to_string()),
        CommandError::Timeout => DomainError::CommandTimeout(station_id.to_string()),
        other => DomainError::Validation(other.to_string()),
    };
    api_error(domain)
}

// ── CRUD ───────────────────────────────────────────────────────

#[utoipa::path(
    get,
    path = "/api/v1/stations",
    tag = "Stations",
    responses((status = 200, body = ApiResponse<Vec<StationDto>>)),
    security(("bearer_auth" = []))
)]
pub async fn list_stations(State(state): State<AppState>) -> ApiResult<Vec<StationDto>> {
    let stations = state.repos.stations().find_all().await.map_err(api_error)?;
    let dtos = stations
        .into_iter()
        .map(|s| {
            let live = state.live_session_exists(&s.station_id);
            StationDto::from_domain(s, live)
        })
        .collect();
    Ok(Json(ApiResponse::success(dtos)))
}

#[utoipa::path(
    get,
    path = "/api/v1/stations/{station_id}",
    tag = "Stations",
    params(("station_id" = String, Path)),
    responses((status = 200, body = ApiResponse<StationDto>), (status = 404)),
    security(("bearer_auth" = []))
)]
pub async fn get_station(
    State(state): State<AppState>,
    Path(station_id): Path<String>,
) -> ApiResult<StationDto> {
    let station = state
        .find_station(&station_id)
        .await
        .map_err(api_error)?;
    let live = state.live_session_exists(&station_id);
    Ok(Json(ApiResponse::success(StationDto::from_domain(
        station, live,
    ))))
}

#[utoipa::path(
    post,
    path = "/api/v1/stations",
    tag = "Stations",
    request_body = CreateStationRequest,
    responses((status = 201, body = ApiResponse<StationDto>), (status = 400), (status = 409)),
    security(("bearer_auth" = []))
)]
pub async fn create_station(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<CreateStationRequest>,
) -> Result<(StatusCode, Json<ApiResponse<StationDto>>), (StatusCode, Json<ApiResponse<StationDto>>)>
{
    let mut station = ChargingStation::new(&body.station_id);
    station.name = body.name;
    station.vendor = body.vendor;
    station.model = body.model;
    if let Some(interval) = body.heartbeat_interval_secs {
        station.heartbeat_interval_secs = interval;
    }
    if let Some(timeout) = body.connection_timeout_secs {
        station.connection_timeout_secs = timeout;
    }
    if let (Some(latitude), Some(longitude)) = (body.latitude, body.longitude) {
        station.location = Some(GeoLocation {
            latitude,
            longitude,
        });
    }

    let saved = state
        .repos
        .stations()
        .save(station)
        .await
        .map_err(api_error)?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(StationDto::from_domain(saved, false))),
    ))
}

#[utoipa::path(
    put,
    path = "/api/v1/stations/{station_id}",
    tag = "Stations",
    request_body = UpdateStationRequest,
    params(("station_id" = String, Path)),
    responses((status = 200, body = ApiResponse<StationDto>), (status = 404)),
    security(("bearer_auth" = []))
)]
pub async fn update_station(
    State(state): State<AppState>,
    Path(station_id): Path<String>,
    ValidatedJson(body): ValidatedJson<UpdateStationRequest>,
) -> ApiResult<StationDto> {
    let mut station = state.find_station(&station_id).await.map_err(api_error)?;
    if body.name.is_some() {
        station.name = body.name;
    }
    if let Some(interval) = body.heartbeat_interval_secs {
        station.heartbeat_interval_secs = interval;
    }
    if let Some(timeout) = body.connection_timeout_secs {
        station.connection_timeout_secs = timeout;
    }
    if let (Some(latitude), Some(longitude)) = (body.latitude, body.longitude) {
        station.location = Some(GeoLocation {
            latitude,
            longitude,
        });
    }
    let updated = state
        .repos
        .stations()
        .update(station)
        .await
        .map_err(api_error)?;
    let live = state.live_session_exists(&station_id);
    Ok(Json(ApiResponse::success(StationDto::from_domain(
        updated, live,
    ))))
}

#[utoipa::path(
    delete,
    path = "/api/v1/stations/{station_id}",
    tag = "Stations",
    params(("station_id" = String, Path)),
    responses((status = 204), (status = 404)),
    security(("bearer_auth" = []))
)]
pub async fn delete_station(
    State(state): State<AppState>,
    Path(station_id): Path<String>,
) -> Result<StatusCode, (StatusCode, Json<ApiResponse<()>>)> {
    state
        .repos
        .stations()
        .delete(&station_id)
        .await
        .map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Lifecycle toggles ──────────────────────────────────────────

#[utoipa::path(
    post,
    path = "/api/v1/stations/{station_id}/activate",
    tag = "Stations",
    params(("station_id" = String, Path)),
    responses((status = 200, body = ApiResponse<StationDto>)),
    security(("bearer_auth" = []))
)]
pub async fn activate_station(
    State(state): State<AppState>,
    Path(station_id): Path<String>,
) -> ApiResult<StationDto> {
    set_active(state, station_id, true).await
}

#[utoipa::path(
    post,
    path = "/api/v1/stations/{station_id}/deactivate",
    tag = "Stations",
    params(("station_id" = String, Path)),
    responses((status = 200, body = ApiResponse<StationDto>)),
    security(("bearer_auth" = []))
)]
pub async fn deactivate_station(
    State(state): State<AppState>,
    Path(station_id): Path<String>,
) -> ApiResult<StationDto> {
    set_active(state, station_id, false).await
}

async fn set_active(state: AppState, station_id: String, active: bool) -> ApiResult<StationDto> {
    let mut station = state.find_station(&station_id).await.map_err(api_error)?;
    station.active = active;
    let updated = state
        .repos
        .stations()
        .update(station)
        .await
        .map_err(api_error)?;
    let live = state.live_session_exists(&station_id);
    Ok(Json(ApiResponse::success(StationDto::from_domain(
        updated, live,
    ))))
}

#[utoipa::path(
    post,
    path = "/api/v1/stations/{station_id}/maintenance/start",
    tag = "Stations",
    params(("station_id" = String, Path), ("reason" = Option<String>, Query)),
    responses((status = 200, body = ApiResponse<StationDto>)),
    security(("bearer_auth" = []))
)]
pub async fn start_maintenance(
    State(state): State<AppState>,
    Path(station_id): Path<String>,
    Query(query): Query<ReasonQuery>,
) -> ApiResult<StationDto> {
    set_maintenance(
        state,
        station_id,
        true,
        Some(query.reason.unwrap_or_else(|| "maintenance".into())),
    )
    .await
}

#[utoipa::path(
    post,
    path = "/api/v1/stations/{station_id}/maintenance/end",
    tag = "Stations",
    params(("station_id" = String, Path)),
    responses((status = 200, body = ApiResponse<StationDto>)),
    security(("bearer_auth" = []))
)]
pub async fn end_maintenance(
    State(state): State<AppState>,
    Path(station_id): Path<String>,
) -> ApiResult<StationDto> {
    set_maintenance(state, station_id, false, None).await
}

async fn set_maintenance(
    state: AppState,
    station_id: String,
    maintenance: bool,
    reason: Option<String>,
) -> ApiResult<StationDto> {
    let mut station = state.find_station(&station_id).await.map_err(api_error)?;
    if maintenance {
        station.start_maintenance(reason.unwrap_or_default());
    } else {
        station.end_maintenance();
    }
    let updated = state
        .repos
        .stations()
        .update(station)
        .await
        .map_err(api_error)?;
    let live = state.live_session_exists(&station_id);
    Ok(Json(ApiResponse::success(StationDto::from_domain(
        updated, live,
    ))))
}

// ── Search and statistics ──────────────────────────────────────

#[utoipa::path(
    get,
    path = "/api/v1/stations/search",
    tag = "Stations",
    params(
        ("query" = Option<String>, Query),
        ("latitude" = Option<f64>, Query),
        ("longitude" = Option<f64>, Query),
        ("radiusKm" = Option<f64>, Query)
    ),
    responses((status = 200, body = ApiResponse<Vec<StationDto>>)),
    security(("bearer_auth" = []))
)]
pub async fn search_stations(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Vec<StationDto>> {
    let stations = state.repos.stations().find_all().await.map_err(api_error)?;

    let filtered: Vec<ChargingStation> = match (&query.query, query.latitude, query.longitude) {
        (Some(text), _, _) => {
            let needle = text.to_lowercase();
            stations
                .into_iter()
                .filter(|s| {
                    s.station_id.to_lowercase().contains(&needle)
                        || s.name.as_deref().is_some_and(|n| n.to_lowercase().contains(&needle))
                        || s.vendor.as_deref().is_some_and(|v| v.to_lowercase().contains(&needle))
                })
                .collect()
        }
        (None, Some(latitude), Some(longitude)) => {
            let center = GeoLocation {
                latitude,
                longitude,
            };
            let radius = query.radius_km.unwrap_or(10.0);
            stations
                .into_iter()
                .filter(|s| {
                    s.location
                        .is_some_and(|loc| loc.distance_km(&center) <= radius)
                })
                .collect()
        }
        _ => stations,
    };

    let dtos = filtered
        .into_iter()
        .map(|s| {
            let live = state.live_session_exists(&s.station_id);
            StationDto::from_domain(s, live)
        })
        .collect();
    Ok(Json(ApiResponse::success(dtos)))
}

#[utoipa::path(
    get,
    path = "/api/v1/stations/statistics",
    tag = "Stations",
    responses((status = 200, body = ApiResponse<StationsStatistics>)),
    security(("bearer_auth" = []))
)]
pub async fn stations_statistics(State(state): State<AppState>) -> ApiResult<StationsStatistics> {
    let stations = state.repos.stations().find_all().await.map_err(api_error)?;
    let stats = StationsStatistics {
        total: stations.len(),
        connected: stations
            .iter()
            .filter(|s| state.live_session_exists(&s.station_id))
            .count(),
        in_maintenance: stations.iter().filter(|s| s.maintenance).count(),
        total_energy_kwh: stations.iter().map(|s| s.statistics.total_energy_kwh).sum(),
        total_sessions: stations.iter().map(|s| s.statistics.total_sessions).sum(),
    };
    Ok(Json(ApiResponse::success(stats)))
}

// ── Remote commands ────────────────────────────────────────────

#[utoipa::path(
    post,
    path = "/api/v1/stations/{station_id}/remote-start",
    tag = "Commands",
    request_body = RemoteStartRequest,
    params(("station_id" = String, Path)),
    responses(
        (status = 200, body = ApiResponse<CommandResponse>),
        (status = 503, description = "Station offline"),
        (status = 504, description = "Station did not answer")
    ),
    security(("bearer_auth" = []))
)]
pub async fn remote_start(
    State(state): State<AppState>,
    Path(station_id): Path<String>,
    ValidatedJson(body): ValidatedJson<RemoteStartRequest>,
) -> ApiResult<CommandResponse> {
    let outcome = state
        .commands
        .remote_start(&station_id, &body.id_tag, body.connector_id)
        .await
        .map_err(|e| command_error(&station_id, e))?;
    Ok(Json(ApiResponse::success(CommandResponse {
        status: outcome.status,
        accepted: outcome.accepted,
    })))
}

#[utoipa::path(
    post,
    path = "/api/v1/stations/{station_id}/remote-stop",
    tag = "Commands",
    request_body = RemoteStopRequest,
    params(("station_id" = String, Path)),
    responses((status = 200, body = ApiResponse<CommandResponse>)),
    security(("bearer_auth" = []))
)]
pub async fn remote_stop(
    State(state): State<AppState>,
    Path(station_id): Path<String>,
    Json(body): Json<RemoteStopRequest>,
) -> ApiResult<CommandResponse> {
    let outcome = state
        .commands
        .remote_stop(&station_id, body.transaction_id)
        .await
        .map_err(|e| command_error(&station_id, e))?;
    Ok(Json(ApiResponse::success(CommandResponse {
        status: outcome.status,
        accepted: outcome.accepted,
    })))
}
