//! OCPP 2.0.1 action handlers.
//!
//! 2.0.1 folds the 1.6 StartTransaction/MeterValues/StopTransaction trio
//! into `TransactionEvent` (Started / Updated / Ended); the charging core
//! is driven natively from those events, never by transcoding to 1.6.

use chrono::Utc;
use rust_decimal::Decimal;
use rust_ocpp::v2_0_1::datatypes::id_token_info_type::IdTokenInfoType;
use rust_ocpp::v2_0_1::enumerations::authorization_status_enum_type::AuthorizationStatusEnumType;
use rust_ocpp::v2_0_1::enumerations::data_transfer_status_enum_type::DataTransferStatusEnumType;
use rust_ocpp::v2_0_1::enumerations::registration_status_enum_type::RegistrationStatusEnumType;
use rust_ocpp::v2_0_1::enumerations::transaction_event_enum_type::TransactionEventEnumType;
use rust_ocpp::v2_0_1::messages::authorize::{AuthorizeRequest, AuthorizeResponse};
use rust_ocpp::v2_0_1::messages::boot_notification::{
    BootNotificationRequest, BootNotificationResponse,
};
use rust_ocpp::v2_0_1::messages::datatransfer::{DataTransferRequest, DataTransferResponse};
use rust_ocpp::v2_0_1::messages::heartbeat::HeartbeatResponse;
use rust_ocpp::v2_0_1::messages::meter_values::{MeterValuesRequest, MeterValuesResponse};
use rust_ocpp::v2_0_1::messages::status_notification::{
    StatusNotificationRequest, StatusNotificationResponse,
};
use rust_ocpp::v2_0_1::messages::transaction_event::{
    TransactionEventRequest, TransactionEventResponse,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{info, warn};

use super::{refuse_cs_to_cp, sampled_to_domain, HandlerContext};
use crate::charging::ReportedStatus;
use crate::domain::{ChargingSession, MeterValue, OcppVersion, TokenStatus};
use crate::shared::errors::OcppError;

/// Route an OCPP 2.0.1 action to its handler.
pub async fn dispatch(
    ctx: &HandlerContext,
    action: &str,
    payload: &Value,
) -> Result<Value, OcppError> {
    match action {
        "BootNotification" => handle_boot_notification(ctx, payload).await,
        "Heartbeat" => handle_heartbeat(ctx).await,
        "Authorize" => handle_authorize(ctx, payload).await,
        "StatusNotification" => handle_status_notification(ctx, payload).await,
        "MeterValues" => handle_meter_values(ctx, payload).await,
        "TransactionEvent" => handle_transaction_event(ctx, payload).await,
        "DataTransfer" => handle_data_transfer(ctx, payload).await,
        // Notification-only actions acknowledged without processing
        "FirmwareStatusNotification" | "LogStatusNotification" | "NotifyEvent"
        | "NotifyReport" | "NotifyMonitoringReport" | "SecurityEventNotification" => {
            Ok(serde_json::json!({}))
        }
        unknown if is_cs_to_cp_action(unknown) => Err(refuse_cs_to_cp(ctx, unknown)),
        unknown => Err(OcppError::not_implemented(unknown)),
    }
}

fn is_cs_to_cp_action(action: &str) -> bool {
    matches!(
        action,
        "CancelReservation"
            | "ChangeAvailability"
            | "ClearCache"
            | "ClearChargingProfile"
            | "GetBaseReport"
            | "GetChargingProfiles"
            | "GetCompositeSchedule"
            | "GetLocalListVersion"
            | "GetLog"
            | "GetTransactionStatus"
            | "GetVariables"
            | "RequestStartTransaction"
            | "RequestStopTransaction"
            | "ReserveNow"
            | "Reset"
            | "SendLocalList"
            | "SetChargingProfile"
            | "SetVariables"
            | "TriggerMessage"
            | "UnlockConnector"
            | "UpdateFirmware"
    )
}

fn parse<T: DeserializeOwned>(payload: &Value) -> Result<T, OcppError> {
    serde_json::from_value(payload.clone())
        .map_err(|e| OcppError::malformed_payload(OcppVersion::V201, e.to_string()))
}

fn ok<T: serde::Serialize>(response: &T) -> Result<Value, OcppError> {
    serde_json::to_value(response).map_err(|e| OcppError::internal(e.to_string()))
}

fn wire_name<T: serde::Serialize>(value: &T) -> Option<String> {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(String::from))
}

fn id_token_info(status: TokenStatus) -> IdTokenInfoType {
    let status = match status {
        TokenStatus::Accepted => AuthorizationStatusEnumType::Accepted,
        TokenStatus::Blocked => AuthorizationStatusEnumType::Blocked,
        TokenStatus::Expired => AuthorizationStatusEnumType::Expired,
        TokenStatus::Invalid => AuthorizationStatusEnumType::Invalid,
        TokenStatus::ConcurrentTx => AuthorizationStatusEnumType::ConcurrentTx,
    };
    IdTokenInfoType {
        status,
        cache_expiry_date_time: None,
        charging_priority: None,
        language1: None,
        evse_id: None,
        language2: None,
        group_id_token: None,
        personal_message: None,
    }
}

fn transaction_event_response(status: Option<TokenStatus>) -> Result<Value, OcppError> {
    ok(&TransactionEventResponse {
        total_cost: None,
        charging_priority: None,
        id_token_info: status.map(id_token_info),
        updated_personal_message: None,
    })
}

/// Flatten the request's meter values into domain samples.
fn collect_samples(meter_value: &Option<Vec<impl serde::Serialize>>) -> Vec<MeterValue> {
    let mut samples = Vec::new();
    if let Some(entries) = meter_value {
        for entry in entries {
            let raw = serde_json::to_value(entry).unwrap_or_default();
            let timestamp = raw["timestamp"]
                .as_str()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(Utc::now);
            if let Some(values) = raw["sampledValue"].as_array() {
                samples.extend(values.iter().map(|sv| sampled_to_domain(timestamp, sv)));
            }
        }
    }
    samples
}

/// The last energy register among the samples, in watt-hours.
fn last_register_wh(samples: &[MeterValue]) -> Option<Decimal> {
    samples
        .iter()
        .rev()
        .find_map(|s| s.energy_kwh)
        .and_then(|kwh| Decimal::from_f64_retain(kwh * 1000.0))
}

// ── Handlers ───────────────────────────────────────────────────

async fn handle_boot_notification(
    ctx: &HandlerContext,
    payload: &Value,
) -> Result<Value, OcppError> {
    let req: BootNotificationRequest = parse(payload)?;
    let cs = &req.charging_station;

    info!(
        station_id = ctx.station_id(),
        vendor = cs.vendor_name.as_str(),
        model = cs.model.as_str(),
        reason = ?req.reason,
        "BootNotification"
    );

    let interval = ctx
        .service
        .register_boot(
            ctx.station_id(),
            &cs.vendor_name,
            &cs.model,
            cs.serial_number.as_deref(),
            cs.firmware_version.as_deref(),
        )
        .await?;

    ctx.session.set_boot_status("Accepted");

    ok(&BootNotificationResponse {
        current_time: Utc::now(),
        interval: interval as u16,
        status: RegistrationStatusEnumType::Accepted,
        status_info: None,
    })
}

async fn handle_heartbeat(ctx: &HandlerContext) -> Result<Value, OcppError> {
    ctx.service
        .record_heartbeat(ctx.station_id(), Utc::now())
        .await?;
    ok(&HeartbeatResponse {
        current_time: Utc::now(),
    })
}

async fn handle_authorize(ctx: &HandlerContext, payload: &Value) -> Result<Value, OcppError> {
    let req: AuthorizeRequest = parse(payload)?;
    let status = ctx
        .service
        .authorize(ctx.station_id(), &req.id_token.id_token)
        .await?;
    ok(&AuthorizeResponse {
        certificate_status: None,
        id_token_info: id_token_info(status),
    })
}

async fn handle_status_notification(
    ctx: &HandlerContext,
    payload: &Value,
) -> Result<Value, OcppError> {
    let req: StatusNotificationRequest = parse(payload)?;

    let reported = wire_name(&req.connector_status)
        .as_deref()
        .and_then(ReportedStatus::from_wire)
        .ok_or_else(|| {
            OcppError::malformed_payload(OcppVersion::V201, "unknown connector status")
        })?;

    // The EVSE id is the connector key in this model; no error codes in
    // 2.0.1 status notifications.
    ctx.service
        .status_notification(
            ctx.station_id(),
            req.evse_id as u32,
            reported,
            Default::default(),
            None,
        )
        .await?;

    ok(&StatusNotificationResponse {})
}

async fn handle_meter_values(ctx: &HandlerContext, payload: &Value) -> Result<Value, OcppError> {
    let req: MeterValuesRequest = parse(payload)?;
    let samples = collect_samples(&Some(req.meter_value));
    ctx.service
        .record_meter_values(ctx.station_id(), req.evse_id as u32, None, samples)
        .await?;
    ok(&MeterValuesResponse {})
}

async fn handle_transaction_event(
    ctx: &HandlerContext,
    payload: &Value,
) -> Result<Value, OcppError> {
    let req: TransactionEventRequest = parse(payload)?;

    let remote_id = req.transaction_info.transaction_id.clone();
    let evse_id = req.evse.as_ref().map(|e| e.id as u32).unwrap_or(1);
    let id_tag = req
        .id_token
        .as_ref()
        .map(|t| t.id_token.clone())
        .unwrap_or_default();

    info!(
        station_id = ctx.station_id(),
        event_type = ?req.event_type,
        transaction_id = remote_id.as_str(),
        trigger_reason = ?req.trigger_reason,
        evse_id,
        "TransactionEvent"
    );

    let samples = collect_samples(&req.meter_value);

    match req.event_type {
        TransactionEventEnumType::Started => {
            let meter_start = last_register_wh(&samples).unwrap_or(Decimal::ZERO);
            let outcome = ctx
                .service
                .start_transaction(
                    ctx.station_id(),
                    evse_id,
                    &id_tag,
                    meter_start,
                    req.timestamp,
                    req.reservation_id.map(|r| r as i32),
                    Some(&remote_id),
                )
                .await?;
            transaction_event_response(Some(outcome.status))
        }

        TransactionEventEnumType::Updated => {
            let transaction_id =
                ChargingSession::hash_remote_transaction_id(&ctx.session.tenant_id, &remote_id);
            ctx.service
                .record_meter_values(
                    ctx.station_id(),
                    evse_id,
                    Some(transaction_id),
                    samples,
                )
                .await?;

            // chargingState drives suspension mid-transaction.
            if let Some(reported) = req
                .transaction_info
                .charging_state
                .as_ref()
                .and_then(wire_name)
                .as_deref()
                .and_then(ReportedStatus::from_wire)
            {
                ctx.service
                    .status_notification(
                        ctx.station_id(),
                        evse_id,
                        reported,
                        Default::default(),
                        None,
                    )
                    .await?;
            }
            transaction_event_response(None)
        }

        TransactionEventEnumType::Ended => {
            let transaction_id =
                ChargingSession::hash_remote_transaction_id(&ctx.session.tenant_id, &remote_id);
            let meter_stop = last_register_wh(&samples).unwrap_or(Decimal::ZERO);
            let reason = req
                .transaction_info
                .stopped_reason
                .as_ref()
                .and_then(wire_name);

            let outcome = ctx
                .service
                .stop_transaction(
                    ctx.station_id(),
                    transaction_id,
                    (!id_tag.is_empty()).then_some(id_tag.as_str()),
                    meter_stop,
                    req.timestamp,
                    reason.as_deref(),
                    OcppVersion::V201,
                    samples,
                )
                .await?;

            if outcome.status != TokenStatus::Accepted {
                warn!(
                    station_id = ctx.station_id(),
                    transaction_id = remote_id.as_str(),
                    status = outcome.status.as_str(),
                    "TransactionEvent Ended not accepted"
                );
            }
            transaction_event_response(Some(outcome.status))
        }
    }
}

async fn handle_data_transfer(ctx: &HandlerContext, payload: &Value) -> Result<Value, OcppError> {
    let req: DataTransferRequest = parse(payload)?;
    info!(
        station_id = ctx.station_id(),
        vendor_id = req.vendor_id.as_str(),
        "DataTransfer"
    );
    ok(&DataTransferResponse {
        status: DataTransferStatusEnumType::UnknownVendorId,
        data: None,
        status_info: None,
    })
}
