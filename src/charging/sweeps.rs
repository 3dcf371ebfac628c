//! Scheduled charging sweeps: reservation expiry and the stale-heartbeat
//! detector. Both run every 60 s on the shared scheduler interval and
//! enter each tenant's scope explicitly.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use super::service::ChargingService;
use crate::ocpp::registry::SharedSessionRegistry;
use crate::shared::shutdown::ShutdownSignal;
use crate::tenant::TenantContext;

pub const SWEEP_INTERVAL_SECS: u64 = 60;

/// Expire overdue connector reservations across all tenants.
pub fn start_reservation_expiry(service: Arc<ChargingService>, shutdown: ShutdownSignal) {
    tokio::spawn(async move {
        info!(interval_secs = SWEEP_INTERVAL_SECS, "Reservation expiry sweep started");
        let mut interval = tokio::time::interval(Duration::from_secs(SWEEP_INTERVAL_SECS));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = expire_all(&service).await {
                        warn!(error = %e, "Reservation expiry sweep error");
                    }
                }
                _ = shutdown.notified().wait() => {
                    info!("Reservation expiry sweep shutting down");
                    break;
                }
            }
        }
    });
}

async fn expire_all(service: &Arc<ChargingService>) -> crate::shared::DomainResult<()> {
    let tenants = service.repos().tenants().find_all().await?;
    let now = Utc::now();
    for tenant in tenants {
        let expired = TenantContext::new(&tenant.code)
            .scope(service.expire_reservations(now))
            .await?;
        if expired > 0 {
            info!(tenant = tenant.code.as_str(), expired, "Expired reservations released");
        }
    }
    Ok(())
}

/// Detect sessions whose heartbeat went silent. The registry only reports
/// them; closing is this detector's policy: the session is closed and the
/// station marked offline, and the next station-initiated reconnect
/// resumes service.
pub fn start_stale_session_detector(
    registry: SharedSessionRegistry,
    service: Arc<ChargingService>,
    heartbeat_timeout_secs: i64,
    shutdown: ShutdownSignal,
) {
    tokio::spawn(async move {
        info!(
            heartbeat_timeout_secs,
            "Stale-session detector started"
        );
        let mut interval = tokio::time::interval(Duration::from_secs(SWEEP_INTERVAL_SECS));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    for session in registry.expired_sessions(heartbeat_timeout_secs) {
                        warn!(
                            station_id = session.station_id.as_str(),
                            tenant_id = session.tenant_id.as_str(),
                            last_heartbeat = %session.last_heartbeat(),
                            "Closing session with silent heartbeat"
                        );
                        registry.unregister(&session.session_id);
                        let result = TenantContext::new(&session.tenant_id)
                            .scope(service.mark_station_connected(&session.station_id, false))
                            .await;
                        if let Err(e) = result {
                            warn!(error = %e, "Failed to mark stale station offline");
                        }
                    }
                }
                _ = shutdown.notified().wait() => {
                    info!("Stale-session detector shutting down");
                    break;
                }
            }
        }
    });
}
