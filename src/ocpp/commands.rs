//! Server-initiated command synthesis.
//!
//! The HTTP edge asks for "remote start on CP-7"; this module resolves the
//! station's live session, builds the version-appropriate CALL
//! (`RemoteStartTransaction` in 1.6, `RequestStartTransaction` in 2.0.1),
//! sends it through the router's outbound path and surfaces the station's
//! accepted/rejected answer. A station without a session fails immediately
//! with `NotConnected`.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::info;

use super::registry::SharedSessionRegistry;
use super::router::SharedMessageRouter;
use super::session::OcppSession;
use super::CommandError;
use crate::charging::ChargingService;
use crate::domain::OcppVersion;
use crate::tenant::TenantContext;

/// Version-agnostic reset kind: Soft/Hard in 1.6, OnIdle/Immediate in 2.0.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetKind {
    Soft,
    Hard,
}

/// Messages a TriggerMessage command can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    BootNotification,
    Heartbeat,
    MeterValues,
    StatusNotification,
}

impl TriggerKind {
    fn wire_name(&self) -> &'static str {
        match self {
            Self::BootNotification => "BootNotification",
            Self::Heartbeat => "Heartbeat",
            Self::MeterValues => "MeterValues",
            Self::StatusNotification => "StatusNotification",
        }
    }
}

/// The station's answer to a command.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub status: String,
    pub accepted: bool,
}

impl CommandOutcome {
    fn from_response(response: &Value) -> Result<Self, CommandError> {
        let status = response["status"]
            .as_str()
            .ok_or_else(|| CommandError::InvalidResponse("missing status field".into()))?
            .to_string();
        let accepted = status == "Accepted";
        Ok(Self { status, accepted })
    }
}

pub struct CommandDispatcher {
    registry: SharedSessionRegistry,
    router: SharedMessageRouter,
    service: Arc<ChargingService>,
}

pub type SharedCommandDispatcher = Arc<CommandDispatcher>;

impl CommandDispatcher {
    pub fn new(
        registry: SharedSessionRegistry,
        router: SharedMessageRouter,
        service: Arc<ChargingService>,
    ) -> Self {
        Self {
            registry,
            router,
            service,
        }
    }

    pub fn shared(
        registry: SharedSessionRegistry,
        router: SharedMessageRouter,
        service: Arc<ChargingService>,
    ) -> SharedCommandDispatcher {
        Arc::new(Self::new(registry, router, service))
    }

    /// The live session for a station in the bound tenant.
    fn resolve_session(&self, station_id: &str) -> Result<Arc<OcppSession>, CommandError> {
        let tenant = TenantContext::require()
            .map_err(|_| CommandError::NotConnected(station_id.to_string()))?;
        self.registry
            .find(station_id, tenant.tenant_id())
            .ok_or_else(|| CommandError::NotConnected(station_id.to_string()))
    }

    async fn send(
        &self,
        session: &Arc<OcppSession>,
        action: &'static str,
        payload: Value,
    ) -> Result<CommandOutcome, CommandError> {
        let start = std::time::Instant::now();
        let response = self.router.send_call(session, action, payload).await;
        metrics::histogram!("ocpp_command_latency_seconds", "action" => action)
            .record(start.elapsed().as_secs_f64());
        metrics::counter!("ocpp_commands_total", "action" => action).increment(1);
        CommandOutcome::from_response(&response?)
    }

    // ── Remote start ───────────────────────────────────────────

    pub async fn remote_start(
        &self,
        station_id: &str,
        id_tag: &str,
        connector_id: Option<u32>,
    ) -> Result<CommandOutcome, CommandError> {
        let session = self.resolve_session(station_id)?;
        info!(station_id, id_tag, ?connector_id, version = %session.ocpp_version, "Dispatching remote start");

        match session.ocpp_version {
            OcppVersion::V16 => {
                let mut payload = json!({ "idTag": id_tag });
                if let Some(connector) = connector_id {
                    payload["connectorId"] = json!(connector);
                }
                self.send(&session, "RemoteStartTransaction", payload).await
            }
            OcppVersion::V201 => {
                let mut payload = json!({
                    "remoteStartId": rand::random::<u32>() & 0x7fff_ffff,
                    "idToken": { "idToken": id_tag, "type": "Central" },
                });
                if let Some(evse) = connector_id {
                    payload["evseId"] = json!(evse);
                }
                self.send(&session, "RequestStartTransaction", payload).await
            }
        }
    }

    // ── Remote stop ────────────────────────────────────────────

    pub async fn remote_stop(
        &self,
        station_id: &str,
        transaction_id: i64,
    ) -> Result<CommandOutcome, CommandError> {
        let session = self.resolve_session(station_id)?;
        info!(station_id, transaction_id, version = %session.ocpp_version, "Dispatching remote stop");

        match session.ocpp_version {
            OcppVersion::V16 => {
                self.send(
                    &session,
                    "RemoteStopTransaction",
                    json!({ "transactionId": transaction_id }),
                )
                .await
            }
            OcppVersion::V201 => {
                // 2.0.1 stops by the station's own string id; recover it
                // from the stored session.
                let remote_id = self
                    .service
                    .repos()
                    .sessions()
                    .find_by_transaction_id(transaction_id)
                    .await
                    .ok()
                    .flatten()
                    .and_then(|s| s.remote_transaction_id)
                    .unwrap_or_else(|| transaction_id.to_string());
                self.send(
                    &session,
                    "RequestStopTransaction",
                    json!({ "transactionId": remote_id }),
                )
                .await
            }
        }
    }

    // ── Reset ──────────────────────────────────────────────────

    pub async fn reset(
        &self,
        station_id: &str,
        kind: ResetKind,
    ) -> Result<CommandOutcome, CommandError> {
        let session = self.resolve_session(station_id)?;
        let reset_type = match (session.ocpp_version, kind) {
            (OcppVersion::V16, ResetKind::Soft) => "Soft",
            (OcppVersion::V16, ResetKind::Hard) => "Hard",
            (OcppVersion::V201, ResetKind::Soft) => "OnIdle",
            (OcppVersion::V201, ResetKind::Hard) => "Immediate",
        };
        self.send(&session, "Reset", json!({ "type": reset_type }))
            .await
    }

    // ── Unlock connector ───────────────────────────────────────

    pub async fn unlock_connector(
        &self,
        station_id: &str,
        connector_id: u32,
    ) -> Result<CommandOutcome, CommandError> {
        let session = self.resolve_session(station_id)?;
        let payload = match session.ocpp_version {
            OcppVersion::V16 => json!({ "connectorId": connector_id }),
            // 2.0.1 addresses the first connector within the EVSE
            OcppVersion::V201 => json!({ "evseId": connector_id, "connectorId": 1 }),
        };
        self.send(&session, "UnlockConnector", payload).await
    }

    // ── Trigger message ────────────────────────────────────────

    pub async fn trigger_message(
        &self,
        station_id: &str,
        trigger: TriggerKind,
        connector_id: Option<u32>,
    ) -> Result<CommandOutcome, CommandError> {
        let session = self.resolve_session(station_id)?;
        let payload = match session.ocpp_version {
            OcppVersion::V16 => {
                let mut payload = json!({ "requestedMessage": trigger.wire_name() });
                if let Some(connector) = connector_id {
                    payload["connectorId"] = json!(connector);
                }
                payload
            }
            OcppVersion::V201 => {
                let mut payload = json!({ "requestedMessage": trigger.wire_name() });
                if let Some(evse) = connector_id {
                    payload["evse"] = json!({ "id": evse });
                }
                payload
            }
        };
        self.send(&session, "TriggerMessage", payload).await
    }
}
