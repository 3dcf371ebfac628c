//! Message router and RPC correlator.
//!
//! Inbound CALLs are dispatched by `(version, action)` inside the
//! session's tenant scope; handler results are framed as CALLRESULT or
//! CALLERROR. Inbound CALLRESULT/CALLERROR frames complete the session's
//! pending outbound futures. Outbound CALLs allocate a fresh MessageId,
//! record a pending entry and resolve on the response, on reaper timeout,
//! or with `Cancelled` when the session closes.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{error, info, warn};

use super::handlers::{self, HandlerContext};
use super::session::OcppSession;
use super::CommandError;
use crate::charging::ChargingService;
use crate::shared::errors::OcppError;
use crate::shared::ocpp_frame::{OcppFrame, OcppFrameError};
use crate::tenant::TenantContext;

/// Default time an outbound CALL may stay unanswered.
pub const PENDING_MESSAGE_TIMEOUT_SECS: u64 = 300;

pub struct MessageRouter {
    service: Arc<ChargingService>,
    response_timeout: Duration,
}

pub type SharedMessageRouter = Arc<MessageRouter>;

impl MessageRouter {
    pub fn new(service: Arc<ChargingService>) -> Self {
        Self {
            service,
            response_timeout: Duration::from_secs(PENDING_MESSAGE_TIMEOUT_SECS),
        }
    }

    pub fn shared(service: Arc<ChargingService>) -> SharedMessageRouter {
        Arc::new(Self::new(service))
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Handle one inbound text frame; the returned string, if any, is the
    /// frame to write back.
    pub async fn handle_text(&self, session: &Arc<OcppSession>, text: &str) -> Option<String> {
        session.touch_received();

        let frame = match OcppFrame::decode(text) {
            Ok(frame) => frame,
            Err(err) => return Some(self.malformed_frame_response(session, text, err)),
        };

        match frame {
            OcppFrame::Call {
                message_id,
                action,
                payload,
            } => Some(self.handle_call(session, message_id, action, payload).await),
            OcppFrame::CallResult { message_id, payload } => {
                self.handle_call_result(session, &message_id, Ok(payload));
                None
            }
            OcppFrame::CallError {
                message_id,
                error_code,
                error_description,
                ..
            } => {
                self.handle_call_result(
                    session,
                    &message_id,
                    Err(CommandError::CallError {
                        code: error_code,
                        description: error_description,
                    }),
                );
                None
            }
        }
    }

    async fn handle_call(
        &self,
        session: &Arc<OcppSession>,
        message_id: String,
        action: String,
        payload: Value,
    ) -> String {
        let ctx = HandlerContext {
            session: session.clone(),
            service: self.service.clone(),
        };

        // Every frame on a session runs with that session's tenant bound.
        let tenant = TenantContext::new(&session.tenant_id);
        let result = tenant
            .scope(handlers::dispatch(&ctx, &action, &payload))
            .await;

        // Heartbeat also refreshes the gateway session's liveness clock;
        // the handler itself updates the station record.
        if action == "Heartbeat" {
            session.record_heartbeat(chrono::Utc::now());
        }

        metrics::counter!("ocpp_inbound_calls_total", "action" => action.clone()).increment(1);

        let frame = match result {
            Ok(payload) => OcppFrame::CallResult {
                message_id,
                payload,
            },
            Err(err) => {
                warn!(
                    station_id = session.station_id.as_str(),
                    action = action.as_str(),
                    code = err.code.as_str(),
                    description = err.description.as_str(),
                    "Handler returned an OCPP error"
                );
                OcppFrame::error_response(message_id, &err)
            }
        };
        frame.encode()
    }

    fn handle_call_result(
        &self,
        session: &Arc<OcppSession>,
        message_id: &str,
        result: Result<Value, CommandError>,
    ) {
        let action = session.pending_action(message_id);
        if session.complete_pending(message_id, result) {
            info!(
                station_id = session.station_id.as_str(),
                message_id,
                action = action.as_deref().unwrap_or("?"),
                "Outbound CALL completed"
            );
        } else {
            // Stations may not invent MessageIds: log and drop.
            warn!(
                station_id = session.station_id.as_str(),
                message_id, "Response for unknown MessageId dropped"
            );
        }
    }

    fn malformed_frame_response(
        &self,
        session: &Arc<OcppSession>,
        text: &str,
        err: OcppFrameError,
    ) -> String {
        error!(
            station_id = session.station_id.as_str(),
            error = %err,
            raw = text,
            "Malformed OCPP frame"
        );
        // Correlate the error to the offending frame when an id is present.
        let message_id = serde_json::from_str::<Vec<Value>>(text)
            .ok()
            .and_then(|arr| arr.get(1).and_then(|v| v.as_str()).map(String::from))
            .unwrap_or_else(|| "-1".to_string());
        let error = OcppError::new(err.error_code(session.ocpp_version), err.to_string());
        OcppFrame::error_response(message_id, &error).encode()
    }

    /// Issue a server-initiated CALL and await the station's response.
    pub async fn send_call(
        &self,
        session: &Arc<OcppSession>,
        action: &str,
        payload: Value,
    ) -> Result<Value, CommandError> {
        let message_id = session.next_message_id();
        let rx = session.register_pending(&message_id, action, payload.clone());

        let frame = OcppFrame::Call {
            message_id: message_id.clone(),
            action: action.to_string(),
            payload,
        };

        info!(
            station_id = session.station_id.as_str(),
            action,
            message_id = message_id.as_str(),
            "Sending command"
        );
        if let Err(e) = session.send(frame.encode()) {
            session.discard_pending(&message_id);
            return Err(e);
        }

        metrics::counter!("ocpp_outbound_calls_total", "action" => action.to_string())
            .increment(1);

        // The reaper also expires the entry; this local timeout bounds the
        // caller even if the reaper is behind.
        match tokio::time::timeout(self.response_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                session.discard_pending(&message_id);
                Err(CommandError::Cancelled)
            }
            Err(_) => {
                session.discard_pending(&message_id);
                warn!(
                    station_id = session.station_id.as_str(),
                    action,
                    message_id = message_id.as_str(),
                    "Command timed out"
                );
                Err(CommandError::Timeout)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OcppVersion, Tenant, TenantType};
    use crate::storage::{InMemoryRepositoryProvider, RepositoryProvider};
    use tokio::sync::mpsc;

    async fn setup() -> (
        Arc<InMemoryRepositoryProvider>,
        MessageRouter,
        Arc<OcppSession>,
        mpsc::UnboundedReceiver<String>,
    ) {
        let repos = InMemoryRepositoryProvider::shared();
        repos
            .tenants()
            .save(Tenant::new("t1", "Tenant One", TenantType::Cpo))
            .await
            .unwrap();
        let service = ChargingService::shared(repos.clone());
        let router = MessageRouter::new(service);
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Arc::new(OcppSession::new(
            "CP-1",
            "t1",
            OcppVersion::V16,
            "127.0.0.1:9",
            tx,
        ));
        (repos, router, session, rx)
    }

    #[tokio::test]
    async fn boot_notification_roundtrip() {
        let (_repos, router, session, _rx) = setup().await;
        let response = router
            .handle_text(
                &session,
                r#"[2,"m1","BootNotification",{"chargePointVendor":"Acme","chargePointModel":"M1"}]"#,
            )
            .await
            .unwrap();
        let frame = OcppFrame::decode(&response).unwrap();
        match frame {
            OcppFrame::CallResult { message_id, payload } => {
                assert_eq!(message_id, "m1");
                assert_eq!(payload["status"], "Accepted");
                assert_eq!(payload["interval"], 300);
            }
            other => panic!("expected CallResult, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unknown_action_yields_not_implemented() {
        let (_repos, router, session, _rx) = setup().await;
        let response = router
            .handle_text(&session, r#"[2,"m2","FancyAction",{}]"#)
            .await
            .unwrap();
        let frame = OcppFrame::decode(&response).unwrap();
        match frame {
            OcppFrame::CallError {
                message_id,
                error_code,
                ..
            } => {
                assert_eq!(message_id, "m2");
                assert_eq!(error_code, "NotImplemented");
            }
            other => panic!("expected CallError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn malformed_payload_yields_formation_violation() {
        let (_repos, router, session, _rx) = setup().await;
        // StartTransaction without its required fields
        let response = router
            .handle_text(&session, r#"[2,"m3","StartTransaction",{"connectorId":1}]"#)
            .await
            .unwrap();
        let frame = OcppFrame::decode(&response).unwrap();
        match frame {
            OcppFrame::CallError { error_code, .. } => {
                assert_eq!(error_code, "FormationViolation");
            }
            other => panic!("expected CallError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn malformed_frame_yields_callerror() {
        let (_repos, router, session, _rx) = setup().await;
        let response = router.handle_text(&session, r#"{"not":"an array"}"#).await.unwrap();
        let frame = OcppFrame::decode(&response).unwrap();
        assert!(matches!(frame, OcppFrame::CallError { .. }));
    }

    #[tokio::test]
    async fn heartbeat_refreshes_session_clock() {
        let (_repos, router, session, _rx) = setup().await;
        let before = session.last_heartbeat();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let response = router
            .handle_text(&session, r#"[2,"hb","Heartbeat",{}]"#)
            .await
            .unwrap();
        assert!(response.contains("currentTime"));
        assert!(session.last_heartbeat() > before);
    }

    #[tokio::test]
    async fn outbound_call_correlates_with_result() {
        let (_repos, router, session, mut rx) = setup().await;

        let session_for_reply = session.clone();
        let router_handle = tokio::spawn(async move {
            // Read the CALL off the wire and answer it.
            let sent = rx.recv().await.unwrap();
            let frame = OcppFrame::decode(&sent).unwrap();
            let message_id = frame.message_id().to_string();
            (message_id, session_for_reply)
        });

        let call = router.send_call(
            &session,
            "RemoteStartTransaction",
            serde_json::json!({"idTag": "RFID-ABC"}),
        );

        let respond = async {
            let (message_id, session) = router_handle.await.unwrap();
            let reply = format!(r#"[3,"{}",{{"status":"Accepted"}}]"#, message_id);
            router.handle_text(&session, &reply).await;
        };

        let (result, _) = tokio::join!(call, respond);
        assert_eq!(result.unwrap()["status"], "Accepted");
        assert_eq!(session.pending_count(), 0);
    }

    #[tokio::test]
    async fn outbound_call_error_is_surfaced() {
        let (_repos, router, session, mut rx) = setup().await;

        let call = router.send_call(&session, "Reset", serde_json::json!({"type": "Soft"}));
        let respond = async {
            let sent = rx.recv().await.unwrap();
            let message_id = OcppFrame::decode(&sent).unwrap().message_id().to_string();
            let reply = format!(r#"[4,"{}","NotSupported","no reset here",{{}}]"#, message_id);
            router.handle_text(&session, &reply).await;
        };

        let (result, _) = tokio::join!(call, respond);
        match result.unwrap_err() {
            CommandError::CallError { code, .. } => assert_eq!(code, "NotSupported"),
            other => panic!("expected CallError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unknown_message_id_is_dropped() {
        let (_repos, router, session, _rx) = setup().await;
        // No pending entry for this id; nothing is returned, nothing panics.
        assert!(router
            .handle_text(&session, r#"[3,"never-sent",{"status":"Accepted"}]"#)
            .await
            .is_none());
    }

    /// Full 1.6 lifecycle driven by wire frames: boot, heartbeat, start,
    /// meter values, stop, with the default tariff pricing the session.
    #[tokio::test]
    async fn v16_lifecycle_over_frames() {
        let (repos, router, session, _rx) = setup().await;
        TenantContext::new("t1")
            .scope(async {
                repos
                    .auth_tokens()
                    .save(crate::domain::AuthToken::new(
                        "RFID-ABC",
                        crate::domain::TokenType::Rfid,
                    ))
                    .await
                    .unwrap();
            })
            .await;

        router
            .handle_text(
                &session,
                r#"[2,"m1","BootNotification",{"chargePointVendor":"Acme","chargePointModel":"M1"}]"#,
            )
            .await
            .unwrap();

        let response = router
            .handle_text(
                &session,
                r#"[2,"m2","StartTransaction",{"connectorId":1,"idTag":"RFID-ABC","meterStart":0,"timestamp":"2025-01-01T10:00:00Z"}]"#,
            )
            .await
            .unwrap();
        let frame = OcppFrame::decode(&response).unwrap();
        let transaction_id = match &frame {
            OcppFrame::CallResult { payload, .. } => {
                assert_eq!(payload["idTagInfo"]["status"], "Accepted");
                payload["transactionId"].as_i64().unwrap()
            }
            other => panic!("expected CallResult, got {:?}", other),
        };
        assert_eq!(transaction_id, 1);

        let meter_values = format!(
            r#"[2,"m3","MeterValues",{{"connectorId":1,"transactionId":{},"meterValue":[{{"timestamp":"2025-01-01T10:15:00Z","sampledValue":[{{"value":"9000","measurand":"Energy.Active.Import.Register","unit":"Wh"}}]}}]}}]"#,
            transaction_id
        );
        let response = router.handle_text(&session, &meter_values).await.unwrap();
        assert!(OcppFrame::decode(&response).unwrap().message_id() == "m3");

        let stop = format!(
            r#"[2,"m4","StopTransaction",{{"transactionId":{},"idTag":"RFID-ABC","meterStop":18000,"timestamp":"2025-01-01T10:30:00Z","reason":"Local"}}]"#,
            transaction_id
        );
        let response = router.handle_text(&session, &stop).await.unwrap();
        match OcppFrame::decode(&response).unwrap() {
            OcppFrame::CallResult { payload, .. } => {
                assert_eq!(payload["idTagInfo"]["status"], "Accepted");
            }
            other => panic!("expected CallResult, got {:?}", other),
        }

        let stored = TenantContext::new("t1")
            .scope(repos.sessions().find_by_transaction_id(transaction_id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, crate::domain::SessionStatus::Completed);
        assert_eq!(stored.duration_minutes, Some(30));
        assert_eq!(
            stored.energy_delivered_kwh,
            Some(rust_decimal::Decimal::from(18))
        );
        assert_eq!(stored.stop_reason, Some(crate::domain::StopReason::Local));
        // Default tariff: 18 kWh * 0.30 + 30 min * 0.02 = 6.00
        assert_eq!(
            stored.costs.unwrap().total_cost,
            rust_decimal::Decimal::new(600, 2)
        );
    }

    /// A stop with a foreign idTag answers Invalid and keeps charging.
    #[tokio::test]
    async fn v16_stop_with_wrong_id_tag_over_frames() {
        let (repos, router, session, _rx) = setup().await;
        TenantContext::new("t1")
            .scope(async {
                repos
                    .auth_tokens()
                    .save(crate::domain::AuthToken::new(
                        "RFID-A",
                        crate::domain::TokenType::Rfid,
                    ))
                    .await
                    .unwrap();
            })
            .await;

        router
            .handle_text(
                &session,
                r#"[2,"m1","StartTransaction",{"connectorId":1,"idTag":"RFID-A","meterStart":0,"timestamp":"2025-01-01T10:00:00Z"}]"#,
            )
            .await
            .unwrap();

        let response = router
            .handle_text(
                &session,
                r#"[2,"m2","StopTransaction",{"transactionId":1,"idTag":"RFID-B","meterStop":100,"timestamp":"2025-01-01T10:05:00Z"}]"#,
            )
            .await
            .unwrap();
        match OcppFrame::decode(&response).unwrap() {
            OcppFrame::CallResult { payload, .. } => {
                assert_eq!(payload["idTagInfo"]["status"], "Invalid");
            }
            other => panic!("expected CallResult, got {:?}", other),
        }

        let stored = TenantContext::new("t1")
            .scope(repos.sessions().find_by_transaction_id(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, crate::domain::SessionStatus::Charging);
    }

    /// 2.0.1 lifecycle: TransactionEvent Started / Updated / Ended with the
    /// string transaction id hashed into the integer key space.
    #[tokio::test]
    async fn v201_transaction_event_flow() {
        let repos = InMemoryRepositoryProvider::shared();
        repos
            .tenants()
            .save(Tenant::new("t1", "Tenant One", TenantType::Cpo))
            .await
            .unwrap();
        let service = ChargingService::shared(repos.clone());
        let router = MessageRouter::new(service);
        let (tx, _rx) = mpsc::unbounded_channel();
        let session = Arc::new(OcppSession::new(
            "CP-9",
            "t1",
            OcppVersion::V201,
            "127.0.0.1:9",
            tx,
        ));
        TenantContext::new("t1")
            .scope(async {
                repos
                    .auth_tokens()
                    .save(crate::domain::AuthToken::new(
                        "EMAID-1",
                        crate::domain::TokenType::MobileApp,
                    ))
                    .await
                    .unwrap();
            })
            .await;

        let started = r#"[2,"e1","TransactionEvent",{"eventType":"Started","timestamp":"2025-02-01T08:00:00Z","triggerReason":"Authorized","seqNo":0,"transactionInfo":{"transactionId":"TX-55"},"evse":{"id":1},"idToken":{"idToken":"EMAID-1","type":"ISO14443"}}]"#;
        let response = router.handle_text(&session, started).await.unwrap();
        match OcppFrame::decode(&response).unwrap() {
            OcppFrame::CallResult { payload, .. } => {
                assert_eq!(payload["idTokenInfo"]["status"], "Accepted");
            }
            other => panic!("expected CallResult, got {:?}", other),
        }

        let ended = r#"[2,"e2","TransactionEvent",{"eventType":"Ended","timestamp":"2025-02-01T09:00:00Z","triggerReason":"EVDeparted","seqNo":1,"transactionInfo":{"transactionId":"TX-55","stoppedReason":"EVDisconnected"},"evse":{"id":1},"idToken":{"idToken":"EMAID-1","type":"ISO14443"},"meterValue":[{"timestamp":"2025-02-01T09:00:00Z","sampledValue":[{"value":7500,"measurand":"Energy.Active.Import.Register"}]}]}]"#;
        let response = router.handle_text(&session, ended).await.unwrap();
        assert!(OcppFrame::decode(&response).unwrap().message_id() == "e2");

        let key = crate::domain::ChargingSession::hash_remote_transaction_id("t1", "TX-55");
        let stored = TenantContext::new("t1")
            .scope(repos.sessions().find_by_transaction_id(key))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, crate::domain::SessionStatus::Completed);
        assert_eq!(stored.remote_transaction_id.as_deref(), Some("TX-55"));
        assert_eq!(
            stored.stop_reason,
            Some(crate::domain::StopReason::EvDisconnected)
        );
        assert_eq!(stored.duration_minutes, Some(60));
    }

    #[tokio::test]
    async fn send_call_times_out() {
        let (_repos, router, session, _rx) = setup().await;
        let router = MessageRouter {
            response_timeout: Duration::from_millis(20),
            ..router
        };
        let err = router
            .send_call(&session, "Reset", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Timeout));
        assert_eq!(session.pending_count(), 0);
    }
}
