//! Charging session domain entity and its transaction lifecycle.
//!
//! The state machine lives in [`SessionStatus`] and
//! [`ChargingSession::transition_to`]: every accepted transition appends a
//! status-history entry atomically with the status update; a disallowed
//! transition reports `InvalidSessionState` and leaves the session untouched.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::audit::{AuditRecord, TenantScoped};
use crate::shared::errors::{DomainError, DomainResult};

// ── Session status ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Pending,
    Authorizing,
    Authorized,
    Starting,
    Charging,
    SuspendedEv,
    SuspendedEvse,
    Finishing,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    /// Active statuses participate in the one-active-session-per-connector
    /// invariant.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Starting | Self::Charging | Self::SuspendedEv | Self::SuspendedEvse
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// The guarded transition table.
    pub fn can_transition_to(self, to: SessionStatus) -> bool {
        use SessionStatus::*;
        match (self, to) {
            (Pending, Authorizing) => true,
            (Authorizing, Authorized) => true,
            (Authorized, Starting) => true,
            (Starting, Charging) => true,
            (Charging, SuspendedEv | SuspendedEvse | Finishing | Completed | Cancelled) => true,
            (SuspendedEv | SuspendedEvse, Charging | Finishing | Completed | Failed) => true,
            (Finishing, Completed | Failed) => true,
            // Any non-terminal pre-completion state may fail or be cancelled
            (Pending | Authorizing | Authorized | Starting, Failed | Cancelled) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ── Stop reason ────────────────────────────────────────────────

/// Why a transaction stopped, normalised across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    DeAuthorized,
    EmergencyStop,
    EnergyLimitReached,
    EvDisconnected,
    GroundFault,
    HardReset,
    Local,
    LocalOutOfCredit,
    Other,
    PowerLoss,
    PowerQuality,
    Reboot,
    Remote,
    SoftReset,
    StoppedByEv,
    TimeLimitReached,
    Timeout,
    UnlockCommand,
}

impl StopReason {
    /// OCPP 1.6 `Reason` values map directly.
    pub fn parse_v16(s: &str) -> Self {
        match s {
            "DeAuthorized" => Self::DeAuthorized,
            "EmergencyStop" => Self::EmergencyStop,
            "EVDisconnected" => Self::EvDisconnected,
            "HardReset" => Self::HardReset,
            "Local" => Self::Local,
            "PowerLoss" => Self::PowerLoss,
            "Reboot" => Self::Reboot,
            "Remote" => Self::Remote,
            "SoftReset" => Self::SoftReset,
            "UnlockCommand" => Self::UnlockCommand,
            _ => Self::Other,
        }
    }

    /// OCPP 2.0.1 `stoppedReason` values, matched case-insensitively.
    pub fn parse_v201(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "deauthorized" => Self::DeAuthorized,
            "emergencystop" => Self::EmergencyStop,
            "energylimitreached" => Self::EnergyLimitReached,
            "evdisconnected" => Self::EvDisconnected,
            "groundfault" => Self::GroundFault,
            "immediatereset" => Self::HardReset,
            "local" => Self::Local,
            "localoutofcredit" => Self::LocalOutOfCredit,
            "powerloss" => Self::PowerLoss,
            "powerquality" => Self::PowerQuality,
            "reboot" => Self::Reboot,
            "remote" => Self::Remote,
            "socleveloutofrange" => Self::Other,
            "stoppedbyev" => Self::StoppedByEv,
            "timelimitreached" => Self::TimeLimitReached,
            "timeout" => Self::Timeout,
            _ => Self::Other,
        }
    }
}

// ── Meter values ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Measurand {
    EnergyActiveImportRegister,
    EnergyActiveExportRegister,
    PowerActiveImport,
    PowerActiveExport,
    CurrentImport,
    CurrentExport,
    Voltage,
    SoC,
    Temperature,
    Frequency,
    Other,
}

impl Measurand {
    /// Parse the OCPP wire name (identical in 1.6 and 2.0.1).
    pub fn from_wire(s: &str) -> Self {
        match s {
            "Energy.Active.Import.Register" => Self::EnergyActiveImportRegister,
            "Energy.Active.Export.Register" => Self::EnergyActiveExportRegister,
            "Power.Active.Import" => Self::PowerActiveImport,
            "Power.Active.Export" => Self::PowerActiveExport,
            "Current.Import" => Self::CurrentImport,
            "Current.Export" => Self::CurrentExport,
            "Voltage" => Self::Voltage,
            "SoC" => Self::SoC,
            "Temperature" => Self::Temperature,
            "Frequency" => Self::Frequency,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReadingContext {
    #[default]
    SamplePeriodic,
    SampleClock,
    TransactionBegin,
    TransactionEnd,
    InterruptionBegin,
    InterruptionEnd,
    Trigger,
    Other,
}

impl ReadingContext {
    pub fn from_wire(s: &str) -> Self {
        match s {
            "Sample.Periodic" => Self::SamplePeriodic,
            "Sample.Clock" => Self::SampleClock,
            "Transaction.Begin" => Self::TransactionBegin,
            "Transaction.End" => Self::TransactionEnd,
            "Interruption.Begin" => Self::InterruptionBegin,
            "Interruption.End" => Self::InterruptionEnd,
            "Trigger" => Self::Trigger,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MeterLocation {
    #[default]
    Outlet,
    Inlet,
    Body,
    Cable,
    Ev,
}

impl MeterLocation {
    pub fn from_wire(s: &str) -> Self {
        match s {
            "Inlet" => Self::Inlet,
            "Body" => Self::Body,
            "Cable" => Self::Cable,
            "EV" => Self::Ev,
            _ => Self::Outlet,
        }
    }
}

/// One sampled measurement taken during a transaction.
///
/// The raw value is kept verbatim; the typed projection fields are filled
/// by [`MeterValue::project`] according to the measurand and unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterValue {
    pub timestamp: DateTime<Utc>,
    pub measurand: Measurand,
    pub raw_value: String,
    pub unit: Option<String>,
    pub context: ReadingContext,
    pub location: MeterLocation,
    pub phase: Option<String>,

    // Typed projections
    pub energy_kwh: Option<f64>,
    pub power_kw: Option<f64>,
    pub current_a: Option<f64>,
    pub voltage_v: Option<f64>,
    pub soc_percent: Option<f64>,
    pub temperature_c: Option<f64>,
}

impl MeterValue {
    pub fn new(
        timestamp: DateTime<Utc>,
        measurand: Measurand,
        raw_value: impl Into<String>,
        unit: Option<String>,
    ) -> Self {
        let mut value = Self {
            timestamp,
            measurand,
            raw_value: raw_value.into(),
            unit,
            context: ReadingContext::default(),
            location: MeterLocation::default(),
            phase: None,
            energy_kwh: None,
            power_kw: None,
            current_a: None,
            voltage_v: None,
            soc_percent: None,
            temperature_c: None,
        };
        value.project();
        value
    }

    /// Fill the typed field for this measurand, converting units:
    /// Wh to kWh and W to kW divide by 1000; A, V, %, and Celsius pass
    /// through; Frequency has no projection.
    pub fn project(&mut self) {
        let parsed: f64 = match self.raw_value.parse() {
            Ok(v) => v,
            Err(_) => return,
        };
        match self.measurand {
            Measurand::EnergyActiveImportRegister | Measurand::EnergyActiveExportRegister => {
                let kwh = match self.unit.as_deref() {
                    Some("kWh") => parsed,
                    _ => parsed / 1000.0,
                };
                self.energy_kwh = Some(kwh);
            }
            Measurand::PowerActiveImport | Measurand::PowerActiveExport => {
                let kw = match self.unit.as_deref() {
                    Some("kW") => parsed,
                    _ => parsed / 1000.0,
                };
                self.power_kw = Some(kw);
            }
            Measurand::CurrentImport | Measurand::CurrentExport => {
                self.current_a = Some(parsed);
            }
            Measurand::Voltage => self.voltage_v = Some(parsed),
            Measurand::SoC => self.soc_percent = Some(parsed),
            Measurand::Temperature => self.temperature_c = Some(parsed),
            Measurand::Frequency | Measurand::Other => {}
        }
    }
}

// ── Status history ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub from_status: SessionStatus,
    pub to_status: SessionStatus,
    pub timestamp: DateTime<Utc>,
    pub reason: Option<String>,
}

// ── Pricing and costs ──────────────────────────────────────────

/// Tariff snapshot captured on the session when pricing is resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingSnapshot {
    pub currency: String,
    pub price_per_kwh: Option<Decimal>,
    pub price_per_minute: Option<Decimal>,
}

/// Itemised session costs produced by the tariff engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCosts {
    pub currency: String,
    pub energy_cost: Decimal,
    pub time_cost: Decimal,
    pub service_fee: Decimal,
    /// Pre-tax session cost
    pub session_cost: Decimal,
    /// Final cost including tax
    pub total_cost: Decimal,
}

// ── Charging session ───────────────────────────────────────────

/// Charging session aggregate; owns its meter values and status history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargingSession {
    /// Globally unique id
    pub session_uuid: String,
    pub status: SessionStatus,
    pub station_id: String,
    /// Bound at StartTransaction time; a session created by a bare
    /// Authorize does not know its connector yet.
    pub connector_id: Option<u32>,
    /// Server-side integer transaction key, unique per tenant. Immutable
    /// once set. For OCPP 2.0.1 the station's string id is hashed via
    /// [`ChargingSession::hash_remote_transaction_id`].
    pub ocpp_transaction_id: Option<i64>,
    /// The 2.0.1 string id as received, kept for correlation and display.
    pub remote_transaction_id: Option<String>,
    pub ocpp_id_tag: Option<String>,

    pub authorization_time: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Meter register at start/stop, watt-hours
    pub meter_start_wh: Option<Decimal>,
    pub meter_stop_wh: Option<Decimal>,
    pub energy_delivered_kwh: Option<Decimal>,
    pub duration_minutes: Option<i64>,
    pub max_power_kw: Option<f64>,
    pub average_power_kw: Option<f64>,
    pub stop_reason: Option<StopReason>,

    pub tariff_id: Option<String>,
    pub pricing: Option<PricingSnapshot>,
    pub costs: Option<SessionCosts>,

    pub vehicle_id: Option<String>,
    pub reservation_id: Option<i32>,
    pub roaming_session_id: Option<String>,

    pub meter_values: Vec<MeterValue>,
    pub status_history: Vec<StatusHistoryEntry>,

    /// Rolling power sum for the live average
    power_kw_sum: f64,
    power_kw_samples: u64,

    pub audit: AuditRecord,
}

impl ChargingSession {
    pub fn new(station_id: impl Into<String>) -> Self {
        Self {
            session_uuid: Uuid::new_v4().to_string(),
            status: SessionStatus::Pending,
            station_id: station_id.into(),
            connector_id: None,
            ocpp_transaction_id: None,
            remote_transaction_id: None,
            ocpp_id_tag: None,
            authorization_time: None,
            start_time: None,
            end_time: None,
            meter_start_wh: None,
            meter_stop_wh: None,
            energy_delivered_kwh: None,
            duration_minutes: None,
            max_power_kw: None,
            average_power_kw: None,
            stop_reason: None,
            tariff_id: None,
            pricing: None,
            costs: None,
            vehicle_id: None,
            reservation_id: None,
            roaming_session_id: None,
            meter_values: Vec::new(),
            status_history: Vec::new(),
            power_kw_sum: 0.0,
            power_kw_samples: 0,
            audit: AuditRecord::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Perform a guarded status transition, appending the history entry
    /// atomically with the status change.
    pub fn transition_to(
        &mut self,
        to: SessionStatus,
        reason: Option<&str>,
        at: DateTime<Utc>,
    ) -> DomainResult<()> {
        if !self.status.can_transition_to(to) {
            return Err(DomainError::InvalidSessionState {
                from: format!("{:?}", self.status),
                to: format!("{:?}", to),
            });
        }
        self.status_history.push(StatusHistoryEntry {
            from_status: self.status,
            to_status: to,
            timestamp: at,
            reason: reason.map(String::from),
        });
        self.status = to;
        Ok(())
    }

    /// Bind the server-allocated transaction id. Once set it never changes.
    pub fn bind_transaction_id(&mut self, transaction_id: i64) -> DomainResult<()> {
        match self.ocpp_transaction_id {
            None => {
                self.ocpp_transaction_id = Some(transaction_id);
                Ok(())
            }
            Some(existing) if existing == transaction_id => Ok(()),
            Some(existing) => Err(DomainError::InvalidState(format!(
                "transaction id already bound to {}",
                existing
            ))),
        }
    }

    /// Map a 2.0.1 string transaction id to the integer key space.
    ///
    /// The tenant id is mixed into the hash so equal station-chosen ids in
    /// different tenants never contend for the same key; the result is
    /// truncated to 31 bits and kept positive.
    pub fn hash_remote_transaction_id(tenant_id: &str, remote_id: &str) -> i64 {
        let mut hasher = Sha256::new();
        hasher.update(tenant_id.as_bytes());
        hasher.update([0x1f]);
        hasher.update(remote_id.as_bytes());
        let digest = hasher.finalize();
        let word = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
        i64::from(word & 0x7fff_ffff).max(1)
    }

    /// Append one meter value (append-only) and refresh the power extremes.
    pub fn append_meter_value(&mut self, value: MeterValue) {
        if let Some(kw) = value.power_kw {
            self.power_kw_sum += kw;
            self.power_kw_samples += 1;
            self.average_power_kw = Some(self.power_kw_sum / self.power_kw_samples as f64);
            if self.max_power_kw.map_or(true, |max| kw > max) {
                self.max_power_kw = Some(kw);
            }
        }
        self.meter_values.push(value);
    }

    /// Last known energy register projection (kWh), if any sample carried one.
    pub fn last_energy_kwh(&self) -> Option<f64> {
        self.meter_values
            .iter()
            .rev()
            .find_map(|mv| mv.energy_kwh)
    }

    /// Derive completion figures at StopTransaction time.
    ///
    /// `energy_delivered_kwh = (meter_stop - meter_start) / 1000`, rounded
    /// half-up to 3 decimals; `average_power_kw = energy * 60 / duration`
    /// when the duration is positive.
    pub fn complete_metering(&mut self, meter_stop_wh: Decimal, end_time: DateTime<Utc>) {
        self.meter_stop_wh = Some(meter_stop_wh);
        self.end_time = Some(end_time);

        let meter_start = self.meter_start_wh.unwrap_or(Decimal::ZERO);
        let energy = ((meter_stop_wh - meter_start) / Decimal::from(1000))
            .round_dp_with_strategy(3, RoundingStrategy::MidpointAwayFromZero);
        self.energy_delivered_kwh = Some(energy);

        if let Some(start) = self.start_time {
            let minutes = end_time.signed_duration_since(start).num_seconds() / 60;
            self.duration_minutes = Some(minutes);
            if minutes > 0 {
                let avg = energy * Decimal::from(60) / Decimal::from(minutes);
                self.average_power_kw = avg.to_f64();
            }
        }
    }
}

impl TenantScoped for ChargingSession {
    fn audit(&self) -> &AuditRecord {
        &self.audit
    }

    fn audit_mut(&mut self) -> &mut AuditRecord {
        &mut self.audit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::str::FromStr;

    fn session() -> ChargingSession {
        ChargingSession::new("CP-001")
    }

    fn drive_to_charging(s: &mut ChargingSession) {
        let now = Utc::now();
        s.transition_to(SessionStatus::Authorizing, None, now).unwrap();
        s.transition_to(SessionStatus::Authorized, None, now).unwrap();
        s.transition_to(SessionStatus::Starting, None, now).unwrap();
        s.transition_to(SessionStatus::Charging, None, now).unwrap();
    }

    #[test]
    fn happy_path_transitions() {
        let mut s = session();
        drive_to_charging(&mut s);
        assert!(s.is_active());
        s.transition_to(SessionStatus::Finishing, None, Utc::now())
            .unwrap();
        s.transition_to(SessionStatus::Completed, Some("Local"), Utc::now())
            .unwrap();
        assert_eq!(s.status, SessionStatus::Completed);
        assert_eq!(s.status_history.len(), 6);
        // Charging was visited between Authorized and Finishing
        let visited: Vec<_> = s.status_history.iter().map(|h| h.to_status).collect();
        assert!(visited.contains(&SessionStatus::Charging));
    }

    #[test]
    fn disallowed_transition_does_not_mutate() {
        let mut s = session();
        let err = s
            .transition_to(SessionStatus::Charging, None, Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidSessionState { .. }));
        assert_eq!(s.status, SessionStatus::Pending);
        assert!(s.status_history.is_empty());
    }

    #[test]
    fn suspension_roundtrip() {
        let mut s = session();
        drive_to_charging(&mut s);
        s.transition_to(SessionStatus::SuspendedEv, Some("SuspendedEV"), Utc::now())
            .unwrap();
        s.transition_to(SessionStatus::Charging, None, Utc::now())
            .unwrap();
        s.transition_to(SessionStatus::SuspendedEvse, None, Utc::now())
            .unwrap();
        s.transition_to(SessionStatus::Finishing, None, Utc::now())
            .unwrap();
        s.transition_to(SessionStatus::Completed, None, Utc::now())
            .unwrap();
        assert_eq!(s.status, SessionStatus::Completed);
    }

    #[test]
    fn terminal_states_reject_everything() {
        let mut s = session();
        s.transition_to(SessionStatus::Failed, Some("InvalidToken"), Utc::now())
            .unwrap();
        for to in [
            SessionStatus::Pending,
            SessionStatus::Charging,
            SessionStatus::Completed,
            SessionStatus::Cancelled,
        ] {
            assert!(s.transition_to(to, None, Utc::now()).is_err());
        }
    }

    #[test]
    fn transaction_id_is_immutable() {
        let mut s = session();
        s.bind_transaction_id(42).unwrap();
        assert!(s.bind_transaction_id(42).is_ok(), "idempotent rebind");
        assert!(s.bind_transaction_id(43).is_err());
        assert_eq!(s.ocpp_transaction_id, Some(42));
    }

    #[test]
    fn remote_transaction_hash_is_stable_and_tenant_mixed() {
        let a = ChargingSession::hash_remote_transaction_id("t1", "TX-9f3b");
        let b = ChargingSession::hash_remote_transaction_id("t1", "TX-9f3b");
        let c = ChargingSession::hash_remote_transaction_id("t2", "TX-9f3b");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a > 0);
        assert!(a <= i64::from(i32::MAX));
    }

    #[test]
    fn meter_value_projection_table() {
        let now = Utc::now();
        let energy = MeterValue::new(
            now,
            Measurand::EnergyActiveImportRegister,
            "18000",
            Some("Wh".into()),
        );
        assert_eq!(energy.energy_kwh, Some(18.0));

        let energy_kwh = MeterValue::new(
            now,
            Measurand::EnergyActiveImportRegister,
            "18",
            Some("kWh".into()),
        );
        assert_eq!(energy_kwh.energy_kwh, Some(18.0));

        let power = MeterValue::new(now, Measurand::PowerActiveImport, "7200", Some("W".into()));
        assert_eq!(power.power_kw, Some(7.2));

        let current = MeterValue::new(now, Measurand::CurrentImport, "16.5", Some("A".into()));
        assert_eq!(current.current_a, Some(16.5));

        let voltage = MeterValue::new(now, Measurand::Voltage, "230", Some("V".into()));
        assert_eq!(voltage.voltage_v, Some(230.0));

        let soc = MeterValue::new(now, Measurand::SoC, "80", Some("Percent".into()));
        assert_eq!(soc.soc_percent, Some(80.0));

        let temp = MeterValue::new(now, Measurand::Temperature, "31.5", None);
        assert_eq!(temp.temperature_c, Some(31.5));

        let freq = MeterValue::new(now, Measurand::Frequency, "50", Some("Hz".into()));
        assert!(freq.energy_kwh.is_none() && freq.power_kw.is_none());
    }

    #[test]
    fn append_meter_value_tracks_power_extremes() {
        let mut s = session();
        let now = Utc::now();
        for (raw, _) in [("4000", 4.0), ("8000", 8.0), ("6000", 6.0)] {
            s.append_meter_value(MeterValue::new(
                now,
                Measurand::PowerActiveImport,
                raw,
                Some("W".into()),
            ));
        }
        assert_eq!(s.max_power_kw, Some(8.0));
        assert_eq!(s.average_power_kw, Some(6.0));
        assert_eq!(s.meter_values.len(), 3);
    }

    #[test]
    fn complete_metering_math() {
        let mut s = session();
        s.start_time = Some(Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap());
        s.meter_start_wh = Some(Decimal::ZERO);
        s.complete_metering(
            Decimal::from(18_000),
            Utc.with_ymd_and_hms(2025, 1, 1, 10, 30, 0).unwrap(),
        );
        assert_eq!(s.energy_delivered_kwh, Some(Decimal::from_str("18.000").unwrap()));
        assert_eq!(s.duration_minutes, Some(30));
        assert_eq!(s.average_power_kw, Some(36.0));
    }

    #[test]
    fn complete_metering_rounds_half_up() {
        let mut s = session();
        s.start_time = Some(Utc::now());
        s.meter_start_wh = Some(Decimal::ZERO);
        // 1.2345 kWh rounds half-up to 1.235 at 3 decimals
        s.complete_metering(Decimal::from_str("1234.5").unwrap(), Utc::now());
        assert_eq!(
            s.energy_delivered_kwh,
            Some(Decimal::from_str("1.235").unwrap())
        );
    }

    #[test]
    fn stop_reason_parsing() {
        assert_eq!(StopReason::parse_v16("Local"), StopReason::Local);
        assert_eq!(StopReason::parse_v16("EVDisconnected"), StopReason::EvDisconnected);
        assert_eq!(StopReason::parse_v16("SomethingNew"), StopReason::Other);

        assert_eq!(StopReason::parse_v201("DeAuthorized"), StopReason::DeAuthorized);
        assert_eq!(StopReason::parse_v201("EMERGENCYSTOP"), StopReason::EmergencyStop);
        assert_eq!(StopReason::parse_v201("stoppedByEV"), StopReason::StoppedByEv);
        assert_eq!(StopReason::parse_v201("whatever"), StopReason::Other);
    }
}
