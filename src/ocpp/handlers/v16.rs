//! OCPP 1.6 action handlers.
//!
//! Payloads are deserialized into `rust_ocpp::v1_6` request types; a
//! payload that fails schema validation yields `FormationViolation`.

use chrono::Utc;
use rust_ocpp::v1_6::messages::authorize::{AuthorizeRequest, AuthorizeResponse};
use rust_ocpp::v1_6::messages::boot_notification::{
    BootNotificationRequest, BootNotificationResponse,
};
use rust_ocpp::v1_6::messages::data_transfer::{DataTransferRequest, DataTransferResponse};
use rust_ocpp::v1_6::messages::heart_beat::HeartbeatResponse;
use rust_ocpp::v1_6::messages::meter_values::{MeterValuesRequest, MeterValuesResponse};
use rust_ocpp::v1_6::messages::start_transaction::{
    StartTransactionRequest, StartTransactionResponse,
};
use rust_ocpp::v1_6::messages::status_notification::{
    StatusNotificationRequest, StatusNotificationResponse,
};
use rust_ocpp::v1_6::messages::stop_transaction::{
    StopTransactionRequest, StopTransactionResponse,
};
use rust_ocpp::v1_6::types::{AuthorizationStatus, DataTransferStatus, IdTagInfo, RegistrationStatus};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{info, warn};

use super::{refuse_cs_to_cp, sampled_to_domain, HandlerContext};
use crate::charging::ReportedStatus;
use crate::domain::{ConnectorErrorCode, MeterValue, OcppVersion, TokenStatus};
use crate::shared::errors::OcppError;

/// Route an OCPP 1.6 action to its handler.
pub async fn dispatch(
    ctx: &HandlerContext,
    action: &str,
    payload: &Value,
) -> Result<Value, OcppError> {
    match action {
        "BootNotification" => handle_boot_notification(ctx, payload).await,
        "Heartbeat" => handle_heartbeat(ctx).await,
        "Authorize" => handle_authorize(ctx, payload).await,
        "StartTransaction" => handle_start_transaction(ctx, payload).await,
        "MeterValues" => handle_meter_values(ctx, payload).await,
        "StatusNotification" => handle_status_notification(ctx, payload).await,
        "StopTransaction" => handle_stop_transaction(ctx, payload).await,
        "DataTransfer" => handle_data_transfer(ctx, payload).await,
        // CP-to-CS actions we acknowledge without further processing
        "DiagnosticsStatusNotification" | "FirmwareStatusNotification" => {
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
            | "ChangeConfiguration"
            | "ClearCache"
            | "ClearChargingProfile"
            | "GetCompositeSchedule"
            | "GetConfiguration"
            | "GetDiagnostics"
            | "GetLocalListVersion"
            | "RemoteStartTransaction"
            | "RemoteStopTransaction"
            | "ReserveNow"
            | "Reset"
            | "SendLocalList"
            | "SetChargingProfile"
            | "TriggerMessage"
            | "UnlockConnector"
            | "UpdateFirmware"
    )
}

fn parse<T: DeserializeOwned>(payload: &Value) -> Result<T, OcppError> {
    serde_json::from_value(payload.clone())
        .map_err(|e| OcppError::malformed_payload(OcppVersion::V16, e.to_string()))
}

fn ok<T: serde::Serialize>(response: &T) -> Result<Value, OcppError> {
    serde_json::to_value(response).map_err(|e| OcppError::internal(e.to_string()))
}

fn id_tag_info(status: TokenStatus) -> IdTagInfo {
    let status = match status {
        TokenStatus::Accepted => AuthorizationStatus::Accepted,
        TokenStatus::Blocked => AuthorizationStatus::Blocked,
        TokenStatus::Expired => AuthorizationStatus::Expired,
        TokenStatus::Invalid => AuthorizationStatus::Invalid,
        TokenStatus::ConcurrentTx => AuthorizationStatus::ConcurrentTx,
    };
    IdTagInfo {
        status,
        expiry_date: None,
        parent_id_tag: None,
    }
}

/// The enum's wire name, for version-agnostic parsing of statuses and
/// reasons without re-stating every variant.
fn wire_name<T: serde::Serialize>(value: &T) -> Option<String> {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(String::from))
}

// ── Handlers ───────────────────────────────────────────────────

async fn handle_boot_notification(
    ctx: &HandlerContext,
    payload: &Value,
) -> Result<Value, OcppError> {
    let req: BootNotificationRequest = parse(payload)?;

    info!(
        station_id = ctx.station_id(),
        vendor = req.charge_point_vendor.as_str(),
        model = req.charge_point_model.as_str(),
        "BootNotification"
    );

    let interval = ctx
        .service
        .register_boot(
            ctx.station_id(),
            &req.charge_point_vendor,
            &req.charge_point_model,
            req.charge_point_serial_number.as_deref(),
            req.firmware_version.as_deref(),
        )
        .await?;

    ctx.session.set_boot_status("Accepted");

    ok(&BootNotificationResponse {
        current_time: Utc::now(),
        interval: interval as u32,
        status: RegistrationStatus::Accepted,
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
    let status = ctx.service.authorize(ctx.station_id(), &req.id_tag).await?;
    ok(&AuthorizeResponse {
        id_tag_info: id_tag_info(status),
    })
}

async fn handle_start_transaction(
    ctx: &HandlerContext,
    payload: &Value,
) -> Result<Value, OcppError> {
    let req: StartTransactionRequest = parse(payload)?;

    let connector_id = req.connector_id as u32;
    if connector_id == 0 || connector_id > crate::domain::connector::MAX_CONNECTOR_ID {
        return Err(OcppError::property_constraint(format!(
            "connectorId {} out of range",
            connector_id
        )));
    }

    let outcome = ctx
        .service
        .start_transaction(
            ctx.station_id(),
            connector_id,
            &req.id_tag,
            Decimal::from(req.meter_start),
            req.timestamp,
            req.reservation_id.map(|r| r as i32),
            None,
        )
        .await?;

    ok(&StartTransactionResponse {
        transaction_id: outcome.transaction_id as i32,
        id_tag_info: id_tag_info(outcome.status),
    })
}

async fn handle_meter_values(ctx: &HandlerContext, payload: &Value) -> Result<Value, OcppError> {
    let req: MeterValuesRequest = parse(payload)?;

    let mut samples: Vec<MeterValue> = Vec::new();
    for entry in &req.meter_value {
        let raw = serde_json::to_value(&entry.sampled_value).unwrap_or_default();
        if let Some(values) = raw.as_array() {
            samples.extend(values.iter().map(|sv| sampled_to_domain(entry.timestamp, sv)));
        }
    }

    ctx.service
        .record_meter_values(
            ctx.station_id(),
            req.connector_id as u32,
            req.transaction_id.map(|tx| tx as i64),
            samples,
        )
        .await?;

    ok(&MeterValuesResponse {})
}

async fn handle_status_notification(
    ctx: &HandlerContext,
    payload: &Value,
) -> Result<Value, OcppError> {
    let req: StatusNotificationRequest = parse(payload)?;

    let connector_id = req.connector_id as u32;
    if connector_id > crate::domain::connector::MAX_CONNECTOR_ID {
        return Err(OcppError::property_constraint(format!(
            "connectorId {} out of range",
            connector_id
        )));
    }

    let reported = wire_name(&req.status)
        .as_deref()
        .and_then(ReportedStatus::from_wire)
        .ok_or_else(|| {
            OcppError::malformed_payload(OcppVersion::V16, "unknown connector status")
        })?;
    let error_code = wire_name(&req.error_code)
        .as_deref()
        .map(ConnectorErrorCode::from_wire)
        .unwrap_or_default();

    ctx.service
        .status_notification(
            ctx.station_id(),
            connector_id,
            reported,
            error_code,
            req.info.as_deref(),
        )
        .await?;

    ok(&StatusNotificationResponse {})
}

async fn handle_stop_transaction(
    ctx: &HandlerContext,
    payload: &Value,
) -> Result<Value, OcppError> {
    let req: StopTransactionRequest = parse(payload)?;

    // transactionData entries become ordinary meter values.
    let mut trailing: Vec<MeterValue> = Vec::new();
    if let Some(data) = &req.transaction_data {
        for entry in data {
            let raw = serde_json::to_value(&entry.sampled_value).unwrap_or_default();
            if let Some(values) = raw.as_array() {
                trailing.extend(values.iter().map(|sv| sampled_to_domain(entry.timestamp, sv)));
            }
        }
    }

    let reason = req.reason.as_ref().and_then(wire_name);

    let outcome = ctx
        .service
        .stop_transaction(
            ctx.station_id(),
            req.transaction_id as i64,
            req.id_tag.as_deref(),
            Decimal::from(req.meter_stop),
            req.timestamp,
            reason.as_deref(),
            OcppVersion::V16,
            trailing,
        )
        .await?;

    if outcome.status != TokenStatus::Accepted {
        warn!(
            station_id = ctx.station_id(),
            transaction_id = req.transaction_id,
            status = outcome.status.as_str(),
            reason = ?outcome.status_reason,
            "StopTransaction not accepted"
        );
    }

    ok(&StopTransactionResponse {
        id_tag_info: Some(id_tag_info(outcome.status)),
    })
}

async fn handle_data_transfer(ctx: &HandlerContext, payload: &Value) -> Result<Value, OcppError> {
    let req: DataTransferRequest = parse(payload)?;
    info!(
        station_id = ctx.station_id(),
        vendor_id = req.vendor_string.as_str(),
        message_id = ?req.message_id,
        "DataTransfer"
    );
    // No vendor extensions are wired in; refuse by vendor id.
    ok(&DataTransferResponse {
        status: DataTransferStatus::UnknownVendorId,
        data: None,
    })
}
