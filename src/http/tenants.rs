//! Tenant administration endpoints.
//!
//! The tenant registry is global: these endpoints operate outside any
//! bound tenant scope and are meant for platform operators. Tenants are
//! never deleted, only suspended.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::common::{api_error, ApiResponse, ApiResult, ValidatedJson};
use super::router::AppState;
use crate::domain::{Tenant, TenantType};
use crate::shared::errors::DomainError;

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct TenantDto {
    pub code: String,
    pub name: String,
    pub tenant_type: String,
    pub active: bool,
    pub suspension_reason: Option<String>,
    pub currency: String,
    pub timezone: String,
    pub features: Vec<String>,
}

impl TenantDto {
    fn from_domain(tenant: Tenant) -> Self {
        Self {
            code: tenant.code,
            name: tenant.name,
            tenant_type: format!("{:?}", tenant.tenant_type),
            active: tenant.active,
            suspension_reason: tenant.suspension_reason,
            currency: tenant.config.currency,
            timezone: tenant.config.timezone,
            features: tenant
                .features
                .iter()
                .map(|f| format!("{:?}", f))
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize, Validate, utoipa::ToSchema)]
pub struct CreateTenantRequest {
    #[validate(length(min = 1, max = 50))]
    pub code: String,
    #[validate(length(min = 1))]
    pub name: String,
    /// CPO, EMSP, HUB, ENTERPRISE, DEMO or INTERNAL
    pub tenant_type: Option<String>,
    pub currency: Option<String>,
    pub timezone: Option<String>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct SuspendTenantRequest {
    pub reason: String,
}

fn parse_tenant_type(s: &str) -> Option<TenantType> {
    match s.to_ascii_uppercase().as_str() {
        "CPO" => Some(TenantType::Cpo),
        "EMSP" => Some(TenantType::Emsp),
        "HUB" => Some(TenantType::Hub),
        "ENTERPRISE" => Some(TenantType::Enterprise),
        "DEMO" => Some(TenantType::Demo),
        "INTERNAL" => Some(TenantType::Internal),
        _ => None,
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/tenants",
    tag = "Tenants",
    responses((status = 200, body = ApiResponse<Vec<TenantDto>>)),
    security(("bearer_auth" = []))
)]
pub async fn list_tenants(State(state): State<AppState>) -> ApiResult<Vec<TenantDto>> {
    let tenants = state.repos.tenants().find_all().await.map_err(api_error)?;
    Ok(Json(ApiResponse::success(
        tenants.into_iter().map(TenantDto::from_domain).collect(),
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/tenants/{code}",
    tag = "Tenants",
    params(("code" = String, Path)),
    responses((status = 200, body = ApiResponse<TenantDto>), (status = 404)),
    security(("bearer_auth" = []))
)]
pub async fn get_tenant(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<TenantDto> {
    let tenant = find_tenant(&state, &code).await.map_err(api_error)?;
    Ok(Json(ApiResponse::success(TenantDto::from_domain(tenant))))
}

#[utoipa::path(
    post,
    path = "/api/v1/tenants",
    tag = "Tenants",
    request_body = CreateTenantRequest,
    responses((status = 201, body = ApiResponse<TenantDto>), (status = 400), (status = 409)),
    security(("bearer_auth" = []))
)]
pub async fn create_tenant(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<CreateTenantRequest>,
) -> Result<(StatusCode, Json<ApiResponse<TenantDto>>), (StatusCode, Json<ApiResponse<TenantDto>>)>
{
    let tenant_type = match body.tenant_type.as_deref() {
        Some(raw) => parse_tenant_type(raw).ok_or_else(|| {
            api_error(DomainError::Validation(format!(
                "unknown tenant type '{}'",
                raw
            )))
        })?,
        None => TenantType::Cpo,
    };

    let mut tenant = Tenant::new(&body.code, &body.name, tenant_type);
    if let Some(currency) = body.currency {
        tenant.config.currency = currency;
    }
    if let Some(timezone) = body.timezone {
        tenant.config.timezone = timezone;
    }

    let saved = state
        .repos
        .tenants()
        .save(tenant)
        .await
        .map_err(api_error)?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(TenantDto::from_domain(saved))),
    ))
}

#[utoipa::path(
    post,
    path = "/api/v1/tenants/{code}/suspend",
    tag = "Tenants",
    request_body = SuspendTenantRequest,
    params(("code" = String, Path)),
    responses((status = 200, body = ApiResponse<TenantDto>), (status = 404)),
    security(("bearer_auth" = []))
)]
pub async fn suspend_tenant(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(body): Json<SuspendTenantRequest>,
) -> ApiResult<TenantDto> {
    let mut tenant = find_tenant(&state, &code).await.map_err(api_error)?;
    tenant.suspend(body.reason);
    let updated = state
        .repos
        .tenants()
        .update(tenant)
        .await
        .map_err(api_error)?;
    Ok(Json(ApiResponse::success(TenantDto::from_domain(updated))))
}

#[utoipa::path(
    post,
    path = "/api/v1/tenants/{code}/activate",
    tag = "Tenants",
    params(("code" = String, Path)),
    responses((status = 200, body = ApiResponse<TenantDto>), (status = 404)),
    security(("bearer_auth" = []))
)]
pub async fn activate_tenant(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<TenantDto> {
    let mut tenant = find_tenant(&state, &code).await.map_err(api_error)?;
    tenant.activate();
    let updated = state
        .repos
        .tenants()
        .update(tenant)
        .await
        .map_err(api_error)?;
    Ok(Json(ApiResponse::success(TenantDto::from_domain(updated))))
}

async fn find_tenant(state: &AppState, code: &str) -> Result<Tenant, DomainError> {
    state
        .repos
        .tenants()
        .find_by_code(code)
        .await?
        .ok_or_else(|| DomainError::NotFound {
            entity: "Tenant",
            field: "code",
            value: code.to_string(),
        })
}
