//! Session registry — owns every live station session.
//!
//! Two mappings: `session_id -> session` and `(station_id, tenant_id) ->
//! session_id`. Registration of a station that already holds a session
//! evicts the old one (latest wins): its outstanding futures are cancelled
//! and its transport is told to close.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tracing::{info, warn};

use super::session::OcppSession;

/// On-demand registry statistics.
#[derive(Debug, Clone, Default, serde::Serialize, utoipa::ToSchema)]
pub struct SessionStats {
    pub total_sessions: usize,
    pub by_version: HashMap<String, usize>,
    pub by_tenant: HashMap<String, usize>,
    pub total_messages: u64,
    pub total_pending_messages: usize,
}

/// Thread-safe registry of active OCPP sessions.
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<OcppSession>>,
    index: DashMap<(String, String), String>,
}

pub type SharedSessionRegistry = Arc<SessionRegistry>;

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            index: DashMap::new(),
        }
    }

    pub fn shared() -> SharedSessionRegistry {
        Arc::new(Self::new())
    }

    /// Register a session. If the station already holds one in this tenant
    /// the old session is closed and returned so the caller can finish
    /// disconnect bookkeeping.
    pub fn register(&self, session: Arc<OcppSession>) -> Option<Arc<OcppSession>> {
        let key = (session.station_id.clone(), session.tenant_id.clone());

        let evicted = self.index.remove(&key).and_then(|(_, old_id)| {
            self.sessions.remove(&old_id).map(|(_, old)| old)
        });
        if let Some(old) = &evicted {
            warn!(
                station_id = old.station_id.as_str(),
                tenant_id = old.tenant_id.as_str(),
                old_session = old.session_id.as_str(),
                "Evicting stale session, new connection replaces old"
            );
            old.close();
        }

        info!(
            station_id = session.station_id.as_str(),
            tenant_id = session.tenant_id.as_str(),
            session_id = session.session_id.as_str(),
            version = %session.ocpp_version,
            "Registering station session"
        );
        self.index.insert(key, session.session_id.clone());
        self.sessions
            .insert(session.session_id.clone(), session);

        metrics::gauge!("ocpp_connected_stations").set(self.sessions.len() as f64);
        evicted
    }

    /// Remove a session by id. Safe against eviction races: the index entry
    /// is only cleared when it still points at this session.
    pub fn unregister(&self, session_id: &str) -> Option<Arc<OcppSession>> {
        let (_, session) = self.sessions.remove(session_id)?;
        let key = (session.station_id.clone(), session.tenant_id.clone());
        if let Some(entry) = self.index.get(&key) {
            if *entry == session_id {
                drop(entry);
                self.index.remove(&key);
            }
        }
        session.close();
        metrics::gauge!("ocpp_connected_stations").set(self.sessions.len() as f64);
        info!(
            station_id = session.station_id.as_str(),
            session_id, "Unregistered station session"
        );
        Some(session)
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<OcppSession>> {
        self.sessions.get(session_id).map(|s| s.clone())
    }

    /// The authoritative session for a station within a tenant.
    pub fn find(&self, station_id: &str, tenant_id: &str) -> Option<Arc<OcppSession>> {
        let session_id = self
            .index
            .get(&(station_id.to_string(), tenant_id.to_string()))?
            .clone();
        self.get(&session_id)
    }

    pub fn is_connected(&self, station_id: &str, tenant_id: &str) -> bool {
        self.find(station_id, tenant_id).is_some()
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Snapshot of all sessions (reaper, statistics).
    pub fn all(&self) -> Vec<Arc<OcppSession>> {
        self.sessions.iter().map(|e| e.clone()).collect()
    }

    /// Sessions whose heartbeat is older than `timeout_secs`. Closing them
    /// is the caller's decision.
    pub fn expired_sessions(&self, timeout_secs: i64) -> Vec<Arc<OcppSession>> {
        let now = Utc::now();
        self.sessions
            .iter()
            .filter(|e| e.is_expired(timeout_secs, now))
            .map(|e| e.clone())
            .collect()
    }

    pub fn stats(&self) -> SessionStats {
        let mut stats = SessionStats::default();
        for session in self.sessions.iter() {
            stats.total_sessions += 1;
            *stats
                .by_version
                .entry(session.ocpp_version.version_string().to_string())
                .or_default() += 1;
            *stats
                .by_tenant
                .entry(session.tenant_id.clone())
                .or_default() += 1;
            stats.total_messages += session.message_count();
            stats.total_pending_messages += session.pending_count();
        }
        stats
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OcppVersion;
    use tokio::sync::mpsc;

    fn make_session(station: &str, tenant: &str, version: OcppVersion) -> Arc<OcppSession> {
        let (tx, _rx) = mpsc::unbounded_channel();
        Arc::new(OcppSession::new(station, tenant, version, "127.0.0.1:1", tx))
    }

    #[tokio::test]
    async fn register_and_find() {
        let registry = SessionRegistry::new();
        let session = make_session("CP-1", "t1", OcppVersion::V16);
        assert!(registry.register(session.clone()).is_none());

        assert!(registry.is_connected("CP-1", "t1"));
        assert!(!registry.is_connected("CP-1", "t2"));
        assert_eq!(
            registry.find("CP-1", "t1").unwrap().session_id,
            session.session_id
        );
    }

    #[tokio::test]
    async fn reconnect_evicts_previous_session() {
        let registry = SessionRegistry::new();
        let old = make_session("CP-1", "t1", OcppVersion::V16);
        let pending_rx = old.register_pending("m1", "Reset", serde_json::json!({}));
        registry.register(old.clone());

        let new = make_session("CP-1", "t1", OcppVersion::V16);
        let evicted = registry.register(new.clone()).expect("old session evicted");
        assert_eq!(evicted.session_id, old.session_id);
        assert!(old.is_closed());
        // Eviction cancelled the old session's outstanding futures
        assert!(matches!(
            pending_rx.await.unwrap(),
            Err(super::super::CommandError::Cancelled)
        ));

        // The new session is authoritative
        assert_eq!(
            registry.find("CP-1", "t1").unwrap().session_id,
            new.session_id
        );
        assert_eq!(registry.count(), 1);
    }

    #[tokio::test]
    async fn same_station_in_two_tenants_coexists() {
        let registry = SessionRegistry::new();
        registry.register(make_session("CP-1", "t1", OcppVersion::V16));
        registry.register(make_session("CP-1", "t2", OcppVersion::V201));
        assert_eq!(registry.count(), 2);
        assert!(registry.is_connected("CP-1", "t1"));
        assert!(registry.is_connected("CP-1", "t2"));
    }

    #[tokio::test]
    async fn unregister_clears_index() {
        let registry = SessionRegistry::new();
        let session = make_session("CP-1", "t1", OcppVersion::V16);
        registry.register(session.clone());
        registry.unregister(&session.session_id);
        assert!(!registry.is_connected("CP-1", "t1"));
        assert_eq!(registry.count(), 0);
        assert!(session.is_closed());
    }

    #[tokio::test]
    async fn stale_unregister_does_not_remove_successor() {
        let registry = SessionRegistry::new();
        let old = make_session("CP-1", "t1", OcppVersion::V16);
        registry.register(old.clone());
        let new = make_session("CP-1", "t1", OcppVersion::V16);
        registry.register(new.clone());

        // The old transport winds down late; the new session must survive.
        registry.unregister(&old.session_id);
        assert!(registry.is_connected("CP-1", "t1"));
        assert_eq!(
            registry.find("CP-1", "t1").unwrap().session_id,
            new.session_id
        );
    }

    #[tokio::test]
    async fn stats_aggregate() {
        let registry = SessionRegistry::new();
        let a = make_session("CP-1", "t1", OcppVersion::V16);
        let b = make_session("CP-2", "t1", OcppVersion::V201);
        let c = make_session("CP-3", "t2", OcppVersion::V16);
        let _rx = b.register_pending("m1", "Reset", serde_json::json!({}));
        a.touch_received();
        a.touch_received();
        for s in [&a, &b, &c] {
            registry.register(s.clone());
        }

        let stats = registry.stats();
        assert_eq!(stats.total_sessions, 3);
        assert_eq!(stats.by_version.get("1.6"), Some(&2));
        assert_eq!(stats.by_version.get("2.0.1"), Some(&1));
        assert_eq!(stats.by_tenant.get("t1"), Some(&2));
        assert_eq!(stats.total_messages, 2);
        assert_eq!(stats.total_pending_messages, 1);
    }
}
