//! Authentication and tenant-binding middleware for the HTTP edge.
//!
//! Order matters: `authenticate` runs first and attaches the JWT claims
//! when a bearer token is present; `bind_tenant` then resolves the tenant
//! (header, query, subdomain, custom domain, JWT claim, path) and runs the
//! rest of the request inside the tenant scope. Allowlisted paths pass
//! through unbound.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use super::jwt::{verify_token, Claims, JwtConfig, TokenUse};
use crate::tenant::resolver::{self, RequestParts, TenantDirectory};
use crate::tenant::TenantContext;

/// Middleware state shared by both layers.
#[derive(Clone)]
pub struct AuthState {
    pub jwt: JwtConfig,
    pub directory: Arc<dyn TenantDirectory>,
    /// When false (`DOMAIN_STRATEGY=false`), subdomains and custom domains
    /// take no part in tenant resolution.
    pub domain_strategy: bool,
}

/// The authenticated principal attached to a request.
#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    pub username: String,
    pub tenant_id: String,
}

impl AuthenticatedUser {
    fn from_claims(claims: &Claims) -> Self {
        Self {
            username: claims.sub.clone(),
            tenant_id: claims.tenant_id.clone(),
        }
    }
}

fn bearer_token(request: &Request<Body>) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "success": false, "error": message }))).into_response()
}

/// Attach claims when a valid access token is present; invalid tokens are
/// rejected outright, absent ones pass through (the allowlist and
/// `require_auth` decide what is reachable).
pub async fn authenticate(
    State(state): State<AuthState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if let Some(token) = bearer_token(&request) {
        match verify_token(token, &state.jwt) {
            Ok(claims) if claims.token_use == TokenUse::Access => {
                request
                    .extensions_mut()
                    .insert(AuthenticatedUser::from_claims(&claims));
                request.extensions_mut().insert(claims);
            }
            Ok(_) => {
                return error_response(
                    StatusCode::UNAUTHORIZED,
                    "refresh token cannot authenticate requests",
                )
            }
            Err(_) => return error_response(StatusCode::UNAUTHORIZED, "invalid token"),
        }
    }
    next.run(request).await
}

/// Reject requests that did not authenticate.
pub async fn require_auth(request: Request<Body>, next: Next) -> Response {
    if request.extensions().get::<AuthenticatedUser>().is_none() {
        return error_response(StatusCode::UNAUTHORIZED, "authentication required");
    }
    next.run(request).await
}

/// Resolve the tenant for this request and bind it for the handler.
pub async fn bind_tenant(
    State(state): State<AuthState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let jwt_tenant = request
        .extensions()
        .get::<Claims>()
        .map(|claims| claims.tenant_id.clone());

    let path = request.uri().path().to_string();
    let host = if state.domain_strategy {
        request
            .headers()
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
    } else {
        None
    };
    let parts = RequestParts {
        tenant_header: request
            .headers()
            .get(resolver::TENANT_HEADER)
            .and_then(|v| v.to_str().ok()),
        query: request.uri().query(),
        host,
        jwt_tenant: jwt_tenant.as_deref(),
        path: &path,
    };

    match resolver::resolve_http(&parts, state.directory.as_ref()).await {
        Ok(Some(tenant_id)) => {
            let ctx = TenantContext::new(&tenant_id);
            let mut request = request;
            request.extensions_mut().insert(ctx.clone());
            ctx.scope(next.run(request)).await
        }
        Ok(None) => next.run(request).await,
        Err(_) => error_response(StatusCode::BAD_REQUEST, "Tenant identification required"),
    }
}
