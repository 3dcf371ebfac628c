//! Login and token refresh.
//!
//! `/auth/login` is on the unauthenticated allowlist; the tenant comes
//! from the request body and the handler enters its scope explicitly.

use axum::{extract::State, Json};
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};
use validator::Validate;

use super::common::{api_error, ApiResponse, ApiResult, ValidatedJson};
use super::router::AppState;
use crate::auth::jwt::{issue_token_pair, verify_token, TokenPair, TokenUse};
use crate::auth::verify_password;
use crate::shared::errors::DomainError;
use crate::tenant::TenantContext;

#[derive(Debug, Deserialize, Validate, utoipa::ToSchema)]
pub struct LoginRequest {
    #[validate(length(min = 1))]
    pub username: String,
    #[validate(length(min = 1))]
    pub password: String,
    #[validate(length(min = 1, max = 50))]
    pub tenant: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, body = ApiResponse<TokenPair>),
        (status = 401, description = "Bad credentials or locked account")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<LoginRequest>,
) -> ApiResult<TokenPair> {
    let tenant_id = body.tenant.clone();
    TenantContext::new(&tenant_id)
        .scope(async move {
            let now = Utc::now();
            let user = state
                .repos
                .users()
                .find_by_username(&body.username)
                .await
                .map_err(api_error)?;

            let Some(mut user) = user else {
                warn!(username = body.username.as_str(), "Login for unknown user");
                return Err(api_error(DomainError::Unauthorized(
                    "invalid credentials".into(),
                )));
            };

            user.ensure_can_login(now).map_err(api_error)?;

            if !verify_password(&body.password, &user.password_hash) {
                user.record_failed_login(now);
                let _ = state.repos.users().update(user).await;
                return Err(api_error(DomainError::Unauthorized(
                    "invalid credentials".into(),
                )));
            }

            user.record_successful_login(now);
            let username = user.username.clone();
            state.repos.users().update(user).await.map_err(api_error)?;

            info!(username = username.as_str(), tenant_id = tenant_id.as_str(), "Login");
            let pair = issue_token_pair(&username, &tenant_id, &state.jwt).map_err(api_error)?;
            Ok(Json(ApiResponse::success(pair)))
        })
        .await
}

#[utoipa::path(
    post,
    path = "/auth/refresh",
    tag = "Auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, body = ApiResponse<TokenPair>),
        (status = 401, description = "Invalid refresh token")
    )
)]
pub async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> ApiResult<TokenPair> {
    let claims = verify_token(&body.refresh_token, &state.jwt).map_err(api_error)?;
    if claims.token_use != TokenUse::Refresh {
        return Err(api_error(DomainError::Unauthorized(
            "not a refresh token".into(),
        )));
    }
    let pair = issue_token_pair(&claims.sub, &claims.tenant_id, &state.jwt).map_err(api_error)?;
    Ok(Json(ApiResponse::success(pair)))
}
