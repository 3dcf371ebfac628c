//! Scheduled session reaper.
//!
//! Every sweep (60 s): drop sessions whose transport is gone, expire
//! pending outbound messages older than the pending timeout (their futures
//! complete with `Timeout`), and log when anything was removed.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use super::registry::SharedSessionRegistry;
use super::router::PENDING_MESSAGE_TIMEOUT_SECS;
use crate::charging::ChargingService;
use crate::shared::shutdown::ShutdownSignal;
use crate::tenant::TenantContext;

pub const REAPER_INTERVAL_SECS: u64 = 60;

/// Start the reaper background task.
pub fn start_session_reaper(
    registry: SharedSessionRegistry,
    service: Arc<ChargingService>,
    shutdown: ShutdownSignal,
) {
    tokio::spawn(async move {
        info!(
            interval_secs = REAPER_INTERVAL_SECS,
            pending_timeout_secs = PENDING_MESSAGE_TIMEOUT_SECS,
            "Session reaper started"
        );

        let mut interval = tokio::time::interval(Duration::from_secs(REAPER_INTERVAL_SECS));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    sweep(&registry, &service).await;
                }
                _ = shutdown.notified().wait() => {
                    info!("Session reaper shutting down");
                    break;
                }
            }
        }
    });
}

/// One reaper pass; separated from the task loop for testability.
pub async fn sweep(registry: &SharedSessionRegistry, service: &Arc<ChargingService>) {
    let now = Utc::now();
    let mut removed_sessions = 0usize;
    let mut expired_pending = 0usize;

    for session in registry.all() {
        if !session.transport_open() {
            registry.unregister(&session.session_id);
            // The station-state component learns about the disconnect in
            // the session's own tenant scope.
            let result = TenantContext::new(&session.tenant_id)
                .scope(service.mark_station_connected(&session.station_id, false))
                .await;
            if let Err(e) = result {
                warn!(
                    station_id = session.station_id.as_str(),
                    error = %e,
                    "Failed to mark station disconnected"
                );
            }
            removed_sessions += 1;
            continue;
        }

        expired_pending += session.expire_pending(PENDING_MESSAGE_TIMEOUT_SECS as i64, now);
    }

    if removed_sessions > 0 || expired_pending > 0 {
        info!(
            removed_sessions,
            expired_pending, "Session reaper removed stale state"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OcppVersion, Tenant, TenantType};
    use crate::ocpp::session::OcppSession;
    use crate::ocpp::{CommandError, SessionRegistry};
    use crate::storage::{InMemoryRepositoryProvider, RepositoryProvider};
    use chrono::Duration as ChronoDuration;
    use tokio::sync::mpsc;

    async fn setup() -> (SharedSessionRegistry, Arc<ChargingService>) {
        let repos = InMemoryRepositoryProvider::shared();
        repos
            .tenants()
            .save(Tenant::new("t1", "Tenant One", TenantType::Cpo))
            .await
            .unwrap();
        let service = ChargingService::shared(repos);
        (SessionRegistry::shared(), service)
    }

    #[tokio::test]
    async fn dead_transports_are_removed() {
        let (registry, service) = setup().await;
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Arc::new(OcppSession::new(
            "CP-1",
            "t1",
            OcppVersion::V16,
            "127.0.0.1:9",
            tx,
        ));
        registry.register(session.clone());
        assert_eq!(registry.count(), 1);

        // Transport goes away: receiver dropped
        drop(rx);
        sweep(&registry, &service).await;
        assert_eq!(registry.count(), 0);
        assert!(session.is_closed());
    }

    #[tokio::test]
    async fn old_pending_messages_expire_with_timeout() {
        let (registry, service) = setup().await;
        let (tx, _rx) = mpsc::unbounded_channel();
        let session = Arc::new(OcppSession::new(
            "CP-1",
            "t1",
            OcppVersion::V16,
            "127.0.0.1:9",
            tx,
        ));
        registry.register(session.clone());

        let stale_rx = session.register_pending("m-old", "Reset", serde_json::json!({}));
        // Backdate far enough that the sweep sees it as stale. The fresh
        // entry created below must survive.
        let now = Utc::now() + ChronoDuration::seconds(PENDING_MESSAGE_TIMEOUT_SECS as i64 + 1);
        assert_eq!(
            session.expire_pending(PENDING_MESSAGE_TIMEOUT_SECS as i64, now),
            1
        );
        assert!(matches!(
            stale_rx.await.unwrap(),
            Err(CommandError::Timeout)
        ));

        let _fresh_rx = session.register_pending("m-new", "Reset", serde_json::json!({}));
        sweep(&registry, &service).await;
        assert_eq!(session.pending_count(), 1);
        assert_eq!(registry.count(), 1);
    }
}
