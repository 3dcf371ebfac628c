//! HTTP router assembly and shared application state.

use std::sync::Arc;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use super::{auth_handlers, monitoring, sessions, stations, tariffs, tenants, users};
use crate::auth::middleware::{authenticate, bind_tenant, require_auth};
use crate::auth::{AuthState, JwtConfig};
use crate::charging::ChargingService;
use crate::domain::ChargingStation;
use crate::ocpp::commands::SharedCommandDispatcher;
use crate::ocpp::SharedSessionRegistry;
use crate::shared::errors::DomainError;
use crate::storage::RepositoryProvider;
use crate::tenant::TenantContext;

/// Shared state handed to every HTTP handler.
#[derive(Clone)]
pub struct AppState {
    pub repos: Arc<dyn RepositoryProvider>,
    pub registry: SharedSessionRegistry,
    pub commands: SharedCommandDispatcher,
    pub service: Arc<ChargingService>,
    pub jwt: JwtConfig,
    pub prometheus: Option<PrometheusHandle>,
}

impl AppState {
    /// Whether the station has a live gateway session in the bound tenant.
    pub fn live_session_exists(&self, station_id: &str) -> bool {
        TenantContext::current()
            .map(|ctx| self.registry.is_connected(station_id, ctx.tenant_id()))
            .unwrap_or(false)
    }

    pub async fn find_station(&self, station_id: &str) -> Result<ChargingStation, DomainError> {
        self.repos
            .stations()
            .find_by_id(station_id)
            .await?
            .ok_or_else(|| DomainError::NotFound {
                entity: "ChargingStation",
                field: "station_id",
                value: station_id.to_string(),
            })
    }
}

#[derive(OpenApi)]
#[openapi(
    info(title = "CSMS API", description = "Charging Station Management System"),
    paths(
        stations::list_stations,
        stations::get_station,
        stations::create_station,
        stations::update_station,
        stations::delete_station,
        stations::search_stations,
        stations::stations_statistics,
        stations::remote_start,
        stations::remote_stop,
        sessions::list_sessions,
        sessions::get_session,
        tenants::list_tenants,
        tenants::create_tenant,
        users::list_users,
        users::create_user,
        auth_handlers::login,
        auth_handlers::refresh,
        monitoring::health,
        monitoring::session_stats,
    ),
    components(schemas(
        stations::StationDto,
        stations::CreateStationRequest,
        stations::UpdateStationRequest,
        stations::RemoteStartRequest,
        stations::RemoteStopRequest,
        stations::CommandResponse,
        stations::StationsStatistics,
        sessions::SessionDto,
        tenants::TenantDto,
        tenants::CreateTenantRequest,
        users::UserDto,
        users::CreateUserRequest,
        auth_handlers::LoginRequest,
        auth_handlers::RefreshRequest,
        crate::auth::jwt::TokenPair,
        crate::ocpp::SessionStats,
        monitoring::HealthStatus,
    ))
)]
struct ApiDoc;

/// Build the full API router: allowlisted meta endpoints, auth endpoints,
/// and the tenant-scoped `/api/v1` surface behind the middleware stack.
pub fn create_api_router(state: AppState, auth_state: AuthState) -> Router {
    let protected = Router::new()
        // Stations (static segments before the {station_id} capture)
        .route(
            "/api/v1/stations",
            get(stations::list_stations).post(stations::create_station),
        )
        .route("/api/v1/stations/search", get(stations::search_stations))
        .route(
            "/api/v1/stations/statistics",
            get(stations::stations_statistics),
        )
        .route(
            "/api/v1/stations/{station_id}",
            get(stations::get_station)
                .put(stations::update_station)
                .delete(stations::delete_station),
        )
        .route(
            "/api/v1/stations/{station_id}/activate",
            post(stations::activate_station),
        )
        .route(
            "/api/v1/stations/{station_id}/deactivate",
            post(stations::deactivate_station),
        )
        .route(
            "/api/v1/stations/{station_id}/maintenance/start",
            post(stations::start_maintenance),
        )
        .route(
            "/api/v1/stations/{station_id}/maintenance/end",
            post(stations::end_maintenance),
        )
        .route(
            "/api/v1/stations/{station_id}/remote-start",
            post(stations::remote_start),
        )
        .route(
            "/api/v1/stations/{station_id}/remote-stop",
            post(stations::remote_stop),
        )
        // Sessions
        .route("/api/v1/sessions", get(sessions::list_sessions))
        .route("/api/v1/sessions/{session_uuid}", get(sessions::get_session))
        // Tariffs
        .route(
            "/api/v1/tariffs",
            get(tariffs::list_tariffs).post(tariffs::create_tariff),
        )
        .route(
            "/api/v1/tariffs/{code}",
            get(tariffs::get_tariff)
                .put(tariffs::update_tariff)
                .delete(tariffs::delete_tariff),
        )
        .route("/api/v1/tariffs/{code}/preview", get(tariffs::preview_cost))
        // Tenants (platform administration)
        .route(
            "/api/v1/tenants",
            get(tenants::list_tenants).post(tenants::create_tenant),
        )
        .route("/api/v1/tenants/{code}", get(tenants::get_tenant))
        .route(
            "/api/v1/tenants/{code}/suspend",
            post(tenants::suspend_tenant),
        )
        .route(
            "/api/v1/tenants/{code}/activate",
            post(tenants::activate_tenant),
        )
        // Users and charging credentials
        .route(
            "/api/v1/users",
            get(users::list_users).post(users::create_user),
        )
        .route(
            "/api/v1/users/{id}",
            get(users::get_user).delete(users::delete_user),
        )
        .route("/api/v1/users/tokens", post(users::create_auth_token))
        // Monitoring (tenant-scoped view of the registry)
        .route("/api/v1/monitoring/sessions", get(monitoring::session_stats))
        .route_layer(from_fn(require_auth));

    let public = Router::new()
        .route("/", get(monitoring::root))
        .route("/health", get(monitoring::health))
        .route("/actuator/health", get(monitoring::health))
        .route("/metrics", get(monitoring::metrics))
        .route("/auth/login", post(auth_handlers::login))
        .route("/auth/refresh", post(auth_handlers::refresh));

    Router::new()
        .merge(protected)
        .merge(public)
        .merge(SwaggerUi::new("/swagger").url("/v3/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(from_fn_with_state(auth_state.clone(), bind_tenant))
        .layer(from_fn_with_state(auth_state, authenticate))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
