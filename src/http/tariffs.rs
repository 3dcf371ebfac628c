//! Tariff endpoints. The domain `Tariff` is serde-ready and is served
//! directly; a preview endpoint exercises the tariff engine without a
//! session.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;

use super::common::{api_error, ApiResponse, ApiResult};
use super::router::AppState;
use crate::charging::tariff_engine;
use crate::domain::{SessionCosts, Tariff};
use crate::shared::errors::DomainError;

#[utoipa::path(
    get,
    path = "/api/v1/tariffs",
    tag = "Tariffs",
    responses((status = 200)),
    security(("bearer_auth" = []))
)]
pub async fn list_tariffs(State(state): State<AppState>) -> ApiResult<Vec<Tariff>> {
    let tariffs = state.repos.tariffs().find_all().await.map_err(api_error)?;
    Ok(Json(ApiResponse::success(tariffs)))
}

#[utoipa::path(
    get,
    path = "/api/v1/tariffs/{code}",
    tag = "Tariffs",
    params(("code" = String, Path)),
    responses((status = 200), (status = 404)),
    security(("bearer_auth" = []))
)]
pub async fn get_tariff(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<Tariff> {
    let tariff = state
        .repos
        .tariffs()
        .find_by_code(&code)
        .await
        .map_err(api_error)?
        .ok_or_else(|| {
            api_error(DomainError::NotFound {
                entity: "Tariff",
                field: "code",
                value: code.clone(),
            })
        })?;
    Ok(Json(ApiResponse::success(tariff)))
}

#[utoipa::path(
    post,
    path = "/api/v1/tariffs",
    tag = "Tariffs",
    responses((status = 201), (status = 400), (status = 409)),
    security(("bearer_auth" = []))
)]
pub async fn create_tariff(
    State(state): State<AppState>,
    Json(tariff): Json<Tariff>,
) -> Result<(StatusCode, Json<ApiResponse<Tariff>>), (StatusCode, Json<ApiResponse<Tariff>>)> {
    let saved = state
        .repos
        .tariffs()
        .save(tariff)
        .await
        .map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(saved))))
}

#[utoipa::path(
    put,
    path = "/api/v1/tariffs/{code}",
    tag = "Tariffs",
    params(("code" = String, Path)),
    responses((status = 200), (status = 404)),
    security(("bearer_auth" = []))
)]
pub async fn update_tariff(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(mut tariff): Json<Tariff>,
) -> ApiResult<Tariff> {
    tariff.code = code;
    let updated = state
        .repos
        .tariffs()
        .update(tariff)
        .await
        .map_err(api_error)?;
    Ok(Json(ApiResponse::success(updated)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/tariffs/{code}",
    tag = "Tariffs",
    params(("code" = String, Path)),
    responses((status = 204), (status = 404)),
    security(("bearer_auth" = []))
)]
pub async fn delete_tariff(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<StatusCode, (StatusCode, Json<ApiResponse<()>>)> {
    state
        .repos
        .tariffs()
        .delete(&code)
        .await
        .map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewQuery {
    pub energy_kwh: Decimal,
    pub duration_minutes: i64,
    pub max_power_kw: Option<f64>,
}

#[utoipa::path(
    get,
    path = "/api/v1/tariffs/{code}/preview",
    tag = "Tariffs",
    params(
        ("code" = String, Path),
        ("energyKwh" = f64, Query),
        ("durationMinutes" = i64, Query),
        ("maxPowerKw" = Option<f64>, Query)
    ),
    responses((status = 200), (status = 404)),
    security(("bearer_auth" = []))
)]
pub async fn preview_cost(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Query(query): Query<PreviewQuery>,
) -> ApiResult<SessionCosts> {
    let tariff = state
        .repos
        .tariffs()
        .find_by_code(&code)
        .await
        .map_err(api_error)?
        .ok_or_else(|| {
            api_error(DomainError::NotFound {
                entity: "Tariff",
                field: "code",
                value: code.clone(),
            })
        })?;
    let costs = tariff_engine::compute_cost(
        &tariff,
        query.energy_kwh,
        query.duration_minutes,
        query.max_power_kw,
    );
    Ok(Json(ApiResponse::success(costs)))
}
