//! User and authorization-token endpoints (tenant-scoped).

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::common::{api_error, ApiResponse, ApiResult, ValidatedJson};
use super::router::AppState;
use crate::auth::hash_password;
use crate::domain::{AuthToken, TokenType, User};
use crate::shared::errors::DomainError;

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct UserDto {
    pub id: String,
    pub username: String,
    pub email: String,
    pub email_verified: bool,
    pub active: bool,
    pub roles: Vec<String>,
    pub last_login_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl UserDto {
    fn from_domain(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            email_verified: user.email_verified,
            active: user.active,
            roles: user.roles,
            last_login_at: user.last_login_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate, utoipa::ToSchema)]
pub struct CreateUserRequest {
    #[validate(length(min = 3, max = 50))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8))]
    pub password: String,
    pub roles: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Validate, utoipa::ToSchema)]
pub struct CreateTokenRequest {
    #[validate(length(min = 1, max = 100))]
    pub token_value: String,
    /// RFID, NFC, MOBILE_APP, API_KEY, CREDIT_CARD, BARCODE, BIOMETRIC,
    /// VEHICLE_ID or CUSTOM
    pub token_type: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct TokenDto {
    pub token_value: String,
    pub token_type: String,
    pub user_id: Option<String>,
    pub active: bool,
    pub blocked: bool,
}

fn parse_token_type(s: &str) -> Option<TokenType> {
    match s.to_ascii_uppercase().as_str() {
        "RFID" => Some(TokenType::Rfid),
        "NFC" => Some(TokenType::Nfc),
        "MOBILE_APP" => Some(TokenType::MobileApp),
        "API_KEY" => Some(TokenType::ApiKey),
        "CREDIT_CARD" => Some(TokenType::CreditCard),
        "BARCODE" => Some(TokenType::Barcode),
        "BIOMETRIC" => Some(TokenType::Biometric),
        "VEHICLE_ID" => Some(TokenType::VehicleId),
        "CUSTOM" => Some(TokenType::Custom),
        _ => None,
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/users",
    tag = "Users",
    responses((status = 200, body = ApiResponse<Vec<UserDto>>)),
    security(("bearer_auth" = []))
)]
pub async fn list_users(State(state): State<AppState>) -> ApiResult<Vec<UserDto>> {
    let users = state.repos.users().find_all().await.map_err(api_error)?;
    Ok(Json(ApiResponse::success(
        users.into_iter().map(UserDto::from_domain).collect(),
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/users/{id}",
    tag = "Users",
    params(("id" = String, Path)),
    responses((status = 200, body = ApiResponse<UserDto>), (status = 404)),
    security(("bearer_auth" = []))
)]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<UserDto> {
    let user = state
        .repos
        .users()
        .find_by_id(&id)
        .await
        .map_err(api_error)?
        .ok_or_else(|| {
            api_error(DomainError::NotFound {
                entity: "User",
                field: "id",
                value: id.clone(),
            })
        })?;
    Ok(Json(ApiResponse::success(UserDto::from_domain(user))))
}

#[utoipa::path(
    post,
    path = "/api/v1/users",
    tag = "Users",
    request_body = CreateUserRequest,
    responses((status = 201, body = ApiResponse<UserDto>), (status = 400), (status = 409)),
    security(("bearer_auth" = []))
)]
pub async fn create_user(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<CreateUserRequest>,
) -> Result<(StatusCode, Json<ApiResponse<UserDto>>), (StatusCode, Json<ApiResponse<UserDto>>)> {
    let password_hash = hash_password(&body.password).map_err(api_error)?;
    let mut user = User::new(
        Uuid::new_v4().to_string(),
        body.username,
        body.email,
        password_hash,
    );
    user.roles = body.roles.unwrap_or_default();

    let saved = state.repos.users().save(user).await.map_err(api_error)?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(UserDto::from_domain(saved))),
    ))
}

#[utoipa::path(
    delete,
    path = "/api/v1/users/{id}",
    tag = "Users",
    params(("id" = String, Path)),
    responses((status = 204), (status = 404)),
    security(("bearer_auth" = []))
)]
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, (StatusCode, Json<ApiResponse<()>>)> {
    state.repos.users().delete(&id).await.map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/v1/users/tokens",
    tag = "Users",
    request_body = CreateTokenRequest,
    responses((status = 201, body = ApiResponse<TokenDto>), (status = 400), (status = 409)),
    security(("bearer_auth" = []))
)]
pub async fn create_auth_token(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<CreateTokenRequest>,
) -> Result<(StatusCode, Json<ApiResponse<TokenDto>>), (StatusCode, Json<ApiResponse<TokenDto>>)> {
    let token_type = match body.token_type.as_deref() {
        Some(raw) => parse_token_type(raw).ok_or_else(|| {
            api_error(DomainError::Validation(format!(
                "unknown token type '{}'",
                raw
            )))
        })?,
        None => TokenType::Rfid,
    };

    let mut token = AuthToken::new(body.token_value, token_type);
    token.user_id = body.user_id;

    let saved = state
        .repos
        .auth_tokens()
        .save(token)
        .await
        .map_err(api_error)?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(TokenDto {
            token_value: saved.token_value,
            token_type: format!("{:?}", saved.token_type),
            user_id: saved.user_id,
            active: saved.active,
            blocked: saved.blocked,
        })),
    ))
}
