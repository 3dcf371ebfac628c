//! CSMS entry point.
//!
//! Wires configuration, storage, the charging core, the OCPP gateway, the
//! REST API and the scheduled sweeps, then runs both servers until a
//! shutdown signal arrives.
//!
//! Exit codes: 0 normal, 1 configuration error, 2 unrecoverable runtime
//! error.

use std::process::ExitCode;

use tracing::{error, info};

use voltgrid_csms::auth::{AuthState, JwtConfig};
use voltgrid_csms::charging::{sweeps, ChargingService};
use voltgrid_csms::config::AppConfig;
use voltgrid_csms::http::{create_api_router, AppState};
use voltgrid_csms::ocpp::server::OcppGatewayServer;
use voltgrid_csms::ocpp::{reaper, CommandDispatcher, MessageRouter, SessionRegistry};
use voltgrid_csms::shared::shutdown::ShutdownCoordinator;
use voltgrid_csms::storage::InMemoryRepositoryProvider;

/// Heartbeat silence after which the stale-session detector closes a
/// session (default heartbeat interval plus a generous grace).
const STALE_SESSION_TIMEOUT_SECS: i64 = 900;

#[tokio::main]
async fn main() -> ExitCode {
    // ── Configuration (exit 1 on failure) ──────────────────────
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::from(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .init();

    let jwt = match JwtConfig::from_base64_secret(
        config.security.jwt_secret.as_deref().unwrap_or(""),
        config.jwt_expiration_secs(),
        config.jwt_refresh_expiration_secs(),
    ) {
        Ok(jwt) => jwt,
        Err(e) => {
            error!(error = %e, "Configuration error");
            return ExitCode::from(1);
        }
    };

    info!(profile = config.profile(), "Starting CSMS");

    match run(config, jwt).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Unrecoverable runtime error");
            ExitCode::from(2)
        }
    }
}

async fn run(
    config: AppConfig,
    jwt: JwtConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // ── Prometheus recorder (before any metrics calls) ─────────
    let prometheus = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| format!("failed to install Prometheus recorder: {}", e))?;

    // ── Storage and core services ──────────────────────────────
    // The in-memory adapter stands in for the SQL layer; swap the provider
    // to move to a database (config.database_url selects the DSN there).
    let repos = InMemoryRepositoryProvider::shared();
    let service = ChargingService::shared(repos.clone());
    let registry = SessionRegistry::shared();
    let router = MessageRouter::shared(service.clone());
    let commands = CommandDispatcher::shared(registry.clone(), router.clone(), service.clone());

    // ── Shutdown coordination ──────────────────────────────────
    let shutdown = ShutdownCoordinator::new(config.server.shutdown_timeout_secs);
    let shutdown_signal = shutdown.signal();
    shutdown.start_signal_listener();

    // ── Scheduled sweeps ───────────────────────────────────────
    reaper::start_session_reaper(registry.clone(), service.clone(), shutdown_signal.clone());
    sweeps::start_reservation_expiry(service.clone(), shutdown_signal.clone());
    sweeps::start_stale_session_detector(
        registry.clone(),
        service.clone(),
        STALE_SESSION_TIMEOUT_SECS,
        shutdown_signal.clone(),
    );

    // ── OCPP gateway ───────────────────────────────────────────
    let gateway = OcppGatewayServer::new(
        config.ws_addr(),
        registry.clone(),
        router,
        service.clone(),
        repos.clone(),
        config.tenancy.default_tenant.clone(),
    )
    .with_shutdown(shutdown_signal.clone());

    // ── REST API ───────────────────────────────────────────────
    let state = AppState {
        repos: repos.clone(),
        registry,
        commands,
        service,
        jwt: jwt.clone(),
        prometheus: Some(prometheus),
    };
    let auth_state = AuthState {
        jwt,
        directory: repos,
        domain_strategy: config.tenancy.domain_strategy,
    };
    let api_router = create_api_router(state, auth_state);

    let api_addr = config.api_addr();
    let listener = tokio::net::TcpListener::bind(&api_addr).await?;
    info!(addr = api_addr.as_str(), "REST API listening");
    info!("Swagger UI available at http://{}/swagger/", api_addr);

    let api_shutdown = shutdown_signal.clone();
    let api_server = axum::serve(listener, api_router).with_graceful_shutdown(async move {
        api_shutdown.wait().await;
        info!("REST API received shutdown signal");
    });

    // ── Run both servers until one stops ───────────────────────
    let ws_task = tokio::spawn(async move { gateway.run().await });
    let api_task = tokio::spawn(async move { api_server.await });

    tokio::select! {
        result = ws_task => match result {
            Ok(Ok(())) => info!("OCPP gateway stopped"),
            Ok(Err(e)) => return Err(e),
            Err(e) => return Err(Box::new(e)),
        },
        result = api_task => match result {
            Ok(Ok(())) => info!("REST API stopped"),
            Ok(Err(e)) => return Err(Box::new(e)),
            Err(e) => return Err(Box::new(e)),
        },
    }

    info!("CSMS shutdown complete");
    Ok(())
}
