//! Gateway session — one per connected station.
//!
//! A session is exclusively owned by the [`super::registry::SessionRegistry`];
//! the WebSocket transport keeps an `Arc` back-reference used only to write
//! frames and to observe the close signal. Teardown always goes through the
//! registry.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use super::CommandError;
use crate::domain::OcppVersion;
use crate::shared::shutdown::ShutdownSignal;

/// A server-initiated CALL awaiting its CALLRESULT/CALLERROR.
pub struct PendingMessage {
    pub message_id: String,
    pub action: String,
    pub payload: Value,
    pub sent_at: DateTime<Utc>,
    pub retry_count: u32,
    responder: oneshot::Sender<Result<Value, CommandError>>,
}

/// Mutable per-session bookkeeping.
#[derive(Debug, Clone)]
struct SessionState {
    last_heartbeat: DateTime<Utc>,
    last_message_sent: Option<DateTime<Utc>>,
    last_message_received: Option<DateTime<Utc>>,
    authenticated: bool,
    boot_status: Option<String>,
}

/// One OCPP connection, keyed by `(station_id, tenant_id)` in the registry.
pub struct OcppSession {
    pub session_id: String,
    pub station_id: String,
    pub tenant_id: String,
    pub ocpp_version: OcppVersion,
    pub client_addr: String,
    pub connected_at: DateTime<Utc>,

    /// Serialised writer: the single transport write task drains this.
    sender: mpsc::UnboundedSender<String>,
    state: RwLock<SessionState>,
    message_counter: AtomicU64,
    pending: DashMap<String, PendingMessage>,
    /// Per-session close signal observed by the transport tasks.
    close_signal: ShutdownSignal,
    closed: AtomicBool,
}

impl OcppSession {
    pub fn new(
        station_id: impl Into<String>,
        tenant_id: impl Into<String>,
        ocpp_version: OcppVersion,
        client_addr: impl Into<String>,
        sender: mpsc::UnboundedSender<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4().to_string(),
            station_id: station_id.into(),
            tenant_id: tenant_id.into(),
            ocpp_version,
            client_addr: client_addr.into(),
            connected_at: now,
            sender,
            state: RwLock::new(SessionState {
                last_heartbeat: now,
                last_message_sent: None,
                last_message_received: None,
                authenticated: false,
                boot_status: None,
            }),
            message_counter: AtomicU64::new(0),
            pending: DashMap::new(),
            close_signal: ShutdownSignal::new(),
            closed: AtomicBool::new(false),
        }
    }

    // ── Transport ──────────────────────────────────────────

    /// Queue a frame for the serialised writer task.
    pub fn send(&self, text: String) -> Result<(), CommandError> {
        if self.is_closed() {
            return Err(CommandError::NotConnected(self.station_id.clone()));
        }
        self.sender
            .send(text)
            .map_err(|e| CommandError::SendFailed(e.to_string()))?;
        let mut state = self.state.write().unwrap();
        state.last_message_sent = Some(Utc::now());
        self.message_counter.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Whether the transport writer is still attached.
    pub fn transport_open(&self) -> bool {
        !self.sender.is_closed() && !self.is_closed()
    }

    /// Signal observed by the transport tasks; triggered on close.
    pub fn close_signal(&self) -> &ShutdownSignal {
        &self.close_signal
    }

    /// Close the session: every outstanding outbound future completes with
    /// `Cancelled` and the transport tasks are told to stop.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.fail_all_pending(|_| CommandError::Cancelled);
        self.close_signal.trigger();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    // ── Activity bookkeeping ───────────────────────────────

    pub fn touch_received(&self) {
        let mut state = self.state.write().unwrap();
        state.last_message_received = Some(Utc::now());
        self.message_counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_heartbeat(&self, at: DateTime<Utc>) {
        self.state.write().unwrap().last_heartbeat = at;
    }

    pub fn last_heartbeat(&self) -> DateTime<Utc> {
        self.state.read().unwrap().last_heartbeat
    }

    pub fn set_authenticated(&self, authenticated: bool) {
        self.state.write().unwrap().authenticated = authenticated;
    }

    pub fn set_boot_status(&self, status: impl Into<String>) {
        self.state.write().unwrap().boot_status = Some(status.into());
    }

    pub fn message_count(&self) -> u64 {
        self.message_counter.load(Ordering::Relaxed)
    }

    /// A session is expired when no heartbeat arrived within the timeout.
    /// Closing expired sessions is the caller's policy, not the session's.
    pub fn is_expired(&self, timeout_secs: i64, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.last_heartbeat()).num_seconds() > timeout_secs
    }

    // ── Pending outbound CALLs ─────────────────────────────

    /// Fresh MessageId for a server-initiated CALL. UUID-based, so it can
    /// never collide with station-chosen ids.
    pub fn next_message_id(&self) -> String {
        format!("cs-{}", Uuid::new_v4())
    }

    /// Record an outstanding CALL; the returned receiver resolves on the
    /// matching CALLRESULT/CALLERROR, on reaper timeout, or on close.
    pub fn register_pending(
        &self,
        message_id: &str,
        action: &str,
        payload: Value,
    ) -> oneshot::Receiver<Result<Value, CommandError>> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(
            message_id.to_string(),
            PendingMessage {
                message_id: message_id.to_string(),
                action: action.to_string(),
                payload,
                sent_at: Utc::now(),
                retry_count: 0,
                responder: tx,
            },
        );
        rx
    }

    /// Complete an outstanding CALL. Returns false when the MessageId is
    /// unknown (stations may not invent ids).
    pub fn complete_pending(&self, message_id: &str, result: Result<Value, CommandError>) -> bool {
        match self.pending.remove(message_id) {
            Some((_, pending)) => {
                let _ = pending.responder.send(result);
                true
            }
            None => false,
        }
    }

    /// Drop a pending entry without completing it (local send failure).
    pub fn discard_pending(&self, message_id: &str) {
        self.pending.remove(message_id);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn pending_action(&self, message_id: &str) -> Option<String> {
        self.pending.get(message_id).map(|p| p.action.clone())
    }

    /// Expire pending messages older than `max_age_secs`; their futures
    /// complete with `Timeout`. Returns how many were expired.
    pub fn expire_pending(&self, max_age_secs: i64, now: DateTime<Utc>) -> usize {
        let expired: Vec<String> = self
            .pending
            .iter()
            .filter(|entry| {
                now.signed_duration_since(entry.sent_at).num_seconds() > max_age_secs
            })
            .map(|entry| entry.key().clone())
            .collect();
        for message_id in &expired {
            self.complete_pending(message_id, Err(CommandError::Timeout));
        }
        expired.len()
    }

    fn fail_all_pending(&self, error: impl Fn(&PendingMessage) -> CommandError) {
        let ids: Vec<String> = self.pending.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            if let Some((_, pending)) = self.pending.remove(&id) {
                let err = error(&pending);
                let _ = pending.responder.send(Err(err));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session() -> (OcppSession, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            OcppSession::new("CP-1", "t1", OcppVersion::V16, "127.0.0.1:9", tx),
            rx,
        )
    }

    #[tokio::test]
    async fn send_updates_counters() {
        let (session, mut rx) = session();
        session.send("[2,\"a\",\"Heartbeat\",{}]".into()).unwrap();
        assert_eq!(rx.recv().await.unwrap(), "[2,\"a\",\"Heartbeat\",{}]");
        assert_eq!(session.message_count(), 1);
    }

    #[tokio::test]
    async fn pending_roundtrip() {
        let (session, _rx) = session();
        let message_id = session.next_message_id();
        let rx = session.register_pending(&message_id, "Reset", serde_json::json!({}));
        assert_eq!(session.pending_count(), 1);

        assert!(session.complete_pending(&message_id, Ok(serde_json::json!({"status":"Accepted"}))));
        assert_eq!(session.pending_count(), 0);
        let result = rx.await.unwrap().unwrap();
        assert_eq!(result["status"], "Accepted");

        // Unknown ids are refused
        assert!(!session.complete_pending("made-up", Ok(Value::Null)));
    }

    #[tokio::test]
    async fn expire_pending_completes_with_timeout() {
        let (session, _rx) = session();
        let rx = session.register_pending("m1", "Reset", serde_json::json!({}));
        let later = Utc::now() + Duration::seconds(301);
        assert_eq!(session.expire_pending(300, later), 1);
        assert!(matches!(rx.await.unwrap(), Err(CommandError::Timeout)));
        assert_eq!(session.pending_count(), 0);

        // Fresh entries survive
        let _rx2 = session.register_pending("m2", "Reset", serde_json::json!({}));
        assert_eq!(session.expire_pending(300, Utc::now()), 0);
        assert_eq!(session.pending_count(), 1);
    }

    #[tokio::test]
    async fn close_cancels_pending_and_rejects_sends() {
        let (session, _rx) = session();
        let rx = session.register_pending("m1", "Reset", serde_json::json!({}));
        session.close();
        assert!(matches!(rx.await.unwrap(), Err(CommandError::Cancelled)));
        assert!(session.is_closed());
        assert!(session.send("x".into()).is_err());
        // Idempotent
        session.close();
    }

    #[test]
    fn heartbeat_expiry_query() {
        let (session, _rx) = session();
        let now = Utc::now();
        session.record_heartbeat(now - Duration::seconds(400));
        assert!(session.is_expired(300, now));
        session.record_heartbeat(now);
        assert!(!session.is_expired(300, now));
    }

    #[test]
    fn message_ids_are_unique() {
        let (session, _rx) = session();
        let a = session.next_message_id();
        let b = session.next_message_id();
        assert_ne!(a, b);
        assert!(a.starts_with("cs-"));
    }
}
