//! OCPP action handlers.
//!
//! Handlers take the raw JSON payload of a CALL, deserialize it into the
//! version's typed request (`rust_ocpp`), run the charging core, and return
//! `Result<Value, OcppError>`: the router frames either the CALLRESULT or
//! the CALLERROR, so nothing in here throws for control flow.

pub mod v16;
pub mod v201;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::warn;

use super::session::OcppSession;
use crate::charging::ChargingService;
use crate::domain::{Measurand, MeterLocation, MeterValue, OcppVersion, ReadingContext};
use crate::shared::errors::OcppError;

/// Everything a handler needs: the session identifies the station and the
/// tenant, the service owns the lifecycle.
pub struct HandlerContext {
    pub session: Arc<OcppSession>,
    pub service: Arc<ChargingService>,
}

impl HandlerContext {
    pub fn station_id(&self) -> &str {
        &self.session.station_id
    }
}

/// Dispatch an inbound CALL by `(version, action)`.
///
/// Runs inside the session's tenant scope (the router enters it).
pub async fn dispatch(
    ctx: &HandlerContext,
    action: &str,
    payload: &Value,
) -> Result<Value, OcppError> {
    match ctx.session.ocpp_version {
        OcppVersion::V16 => v16::dispatch(ctx, action, payload).await,
        OcppVersion::V201 => v201::dispatch(ctx, action, payload).await,
    }
}

/// Log-and-refuse for actions that only ever travel server to station.
pub(crate) fn refuse_cs_to_cp(ctx: &HandlerContext, action: &str) -> OcppError {
    warn!(
        station_id = ctx.station_id(),
        action, "Received a CS-to-CP action from a station"
    );
    OcppError::not_implemented(action)
}

/// Convert one sampled value (either version, passed as raw JSON) into a
/// domain [`MeterValue`].
///
/// The value is a string in 1.6 and a number in 2.0.1; context defaults to
/// `Sample.Periodic` and location to `Outlet` per the OCPP defaults.
pub(crate) fn sampled_to_domain(timestamp: DateTime<Utc>, sampled: &Value) -> MeterValue {
    let raw_value = match &sampled["value"] {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    };
    let measurand = sampled["measurand"]
        .as_str()
        .map(Measurand::from_wire)
        .unwrap_or(Measurand::EnergyActiveImportRegister);
    // 2.0.1 nests the unit inside unitOfMeasure
    let unit = sampled["unit"]
        .as_str()
        .or_else(|| sampled["unitOfMeasure"]["unit"].as_str())
        .map(String::from);

    let mut value = MeterValue::new(timestamp, measurand, raw_value, unit);
    if let Some(context) = sampled["context"].as_str() {
        value.context = ReadingContext::from_wire(context);
    }
    if let Some(location) = sampled["location"].as_str() {
        value.location = MeterLocation::from_wire(location);
    }
    if let Some(phase) = sampled["phase"].as_str() {
        value.phase = Some(phase.to_string());
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampled_value_v16_shape() {
        let now = Utc::now();
        let sampled = serde_json::json!({
            "value": "18000",
            "measurand": "Energy.Active.Import.Register",
            "unit": "Wh",
            "context": "Sample.Periodic",
            "location": "Outlet"
        });
        let mv = sampled_to_domain(now, &sampled);
        assert_eq!(mv.measurand, Measurand::EnergyActiveImportRegister);
        assert_eq!(mv.energy_kwh, Some(18.0));
        assert_eq!(mv.context, ReadingContext::SamplePeriodic);
        assert_eq!(mv.location, MeterLocation::Outlet);
    }

    #[test]
    fn sampled_value_v201_shape() {
        let now = Utc::now();
        let sampled = serde_json::json!({
            "value": 7.2,
            "measurand": "Power.Active.Import",
            "unitOfMeasure": { "unit": "kW" }
        });
        let mv = sampled_to_domain(now, &sampled);
        assert_eq!(mv.measurand, Measurand::PowerActiveImport);
        assert_eq!(mv.power_kw, Some(7.2));
    }

    #[test]
    fn missing_measurand_defaults_to_energy_register() {
        let mv = sampled_to_domain(Utc::now(), &serde_json::json!({"value": "500"}));
        assert_eq!(mv.measurand, Measurand::EnergyActiveImportRegister);
        // No unit means Wh
        assert_eq!(mv.energy_kwh, Some(0.5));
        assert_eq!(mv.context, ReadingContext::SamplePeriodic);
        assert_eq!(mv.location, MeterLocation::Outlet);
    }
}
