//! Shared HTTP plumbing: the response envelope, domain-error mapping and
//! the validating JSON extractor.

use axum::{
    extract::{FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use validator::Validate;

use crate::shared::errors::DomainError;

/// Uniform JSON envelope for every API response.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// HTTP status for a domain error: 400 validation, 401 unauthenticated,
/// 403 forbidden, 404 not found, 409 conflict, 504 command timeout,
/// 500 otherwise.
pub fn error_status(error: &DomainError) -> StatusCode {
    match error {
        DomainError::Validation(_) => StatusCode::BAD_REQUEST,
        DomainError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        DomainError::Forbidden(_) | DomainError::Security(_) => StatusCode::FORBIDDEN,
        DomainError::NotFound { .. } => StatusCode::NOT_FOUND,
        DomainError::Conflict(_) | DomainError::VersionConflict { .. } => StatusCode::CONFLICT,
        DomainError::CommandTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        DomainError::StationOffline(_) => StatusCode::SERVICE_UNAVAILABLE,
        DomainError::InvalidState(_)
        | DomainError::InvalidSessionState { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Standard error tuple for handler `Result`s.
pub fn api_error<T>(error: DomainError) -> (StatusCode, Json<ApiResponse<T>>) {
    (error_status(&error), Json(ApiResponse::error(error.to_string())))
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, (StatusCode, Json<ApiResponse<T>>)>;

/// JSON extractor that also runs `validator` rules; rejects with 400.
pub struct ValidatedJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await.map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::<()>::error(format!("invalid JSON body: {}", e))),
            )
                .into_response()
        })?;
        value.validate().map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::<()>::error(format!("validation failed: {}", e))),
            )
                .into_response()
        })?;
        Ok(ValidatedJson(value))
    }
}
