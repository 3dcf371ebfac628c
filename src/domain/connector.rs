//! Connector domain entity — one physical outlet on a station.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::audit::{AuditRecord, TenantScoped};
use crate::shared::errors::{DomainError, DomainResult};

pub const MIN_CONNECTOR_ID: u32 = 1;
pub const MAX_CONNECTOR_ID: u32 = 50;

/// Internal connector status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectorStatus {
    Available,
    Occupied,
    Reserved,
    Unavailable,
    Faulted,
}

impl std::fmt::Display for ConnectorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Available => "Available",
            Self::Occupied => "Occupied",
            Self::Reserved => "Reserved",
            Self::Unavailable => "Unavailable",
            Self::Faulted => "Faulted",
        };
        f.write_str(s)
    }
}

/// OCPP connector error codes (fixed set, shared by both versions)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectorErrorCode {
    #[default]
    NoError,
    ConnectorLockFailure,
    EvCommunicationError,
    GroundFailure,
    HighTemperature,
    InternalError,
    LocalListConflict,
    OtherError,
    OverCurrentFailure,
    OverVoltage,
    PowerMeterFailure,
    PowerSwitchFailure,
    ReaderFailure,
    ResetFailure,
    UnderVoltage,
    WeakSignal,
}

impl ConnectorErrorCode {
    /// Parse the OCPP 1.6 wire name; anything unknown maps to `OtherError`.
    pub fn from_wire(s: &str) -> Self {
        match s {
            "NoError" => Self::NoError,
            "ConnectorLockFailure" => Self::ConnectorLockFailure,
            "EVCommunicationError" => Self::EvCommunicationError,
            "GroundFailure" => Self::GroundFailure,
            "HighTemperature" => Self::HighTemperature,
            "InternalError" => Self::InternalError,
            "LocalListConflict" => Self::LocalListConflict,
            "OverCurrentFailure" => Self::OverCurrentFailure,
            "OverVoltage" => Self::OverVoltage,
            "PowerMeterFailure" => Self::PowerMeterFailure,
            "PowerSwitchFailure" => Self::PowerSwitchFailure,
            "ReaderFailure" => Self::ReaderFailure,
            "ResetFailure" => Self::ResetFailure,
            "UnderVoltage" => Self::UnderVoltage,
            "WeakSignal" => Self::WeakSignal,
            _ => Self::OtherError,
        }
    }
}

/// Physical plug standard (IEC 62196 and friends)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectorStandard {
    Iec62196T1,
    Iec62196T2,
    Iec62196T2Combo,
    Chademo,
    Ccs1,
    Ccs2,
    Domestic,
}

impl ConnectorStandard {
    /// Whether the plug standard supports DC charging.
    pub fn dc_capable(&self) -> bool {
        matches!(
            self,
            Self::Chademo | Self::Ccs1 | Self::Ccs2 | Self::Iec62196T2Combo
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectorFormat {
    Socket,
    Cable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerType {
    Ac1Phase,
    Ac3Phase,
    Dc,
}

/// Active reservation on a connector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorReservation {
    pub reservation_id: i32,
    pub id_tag: String,
    pub expires_at: DateTime<Utc>,
}

impl ConnectorReservation {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Per-connector statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectorStatistics {
    pub total_energy_kwh: f64,
    pub total_sessions: u64,
}

/// Connector aggregate, keyed by `(station_id, connector_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connector {
    pub station_id: String,
    /// 1-based connector number, at most [`MAX_CONNECTOR_ID`]
    pub connector_id: u32,
    pub status: ConnectorStatus,
    pub error_code: ConnectorErrorCode,
    pub standard: Option<ConnectorStandard>,
    pub format: Option<ConnectorFormat>,
    pub power_type: Option<PowerType>,
    /// Maximum voltage (V, at most 1000)
    pub max_voltage: Option<u32>,
    /// Maximum amperage (A, at most 1000)
    pub max_amperage: Option<u32>,
    /// Maximum electric power (kW, at most 1000)
    pub max_power_kw: Option<u32>,

    // Runtime state while a transaction is active
    pub current_transaction_id: Option<i64>,
    pub current_id_tag: Option<String>,
    pub current_charging_power_kw: Option<f64>,
    pub current_energy_kwh: Option<f64>,
    /// Meter register value (Wh) captured when the active session started;
    /// energy deltas are computed against it, never against a previous delta.
    pub session_meter_start_wh: Option<f64>,
    pub session_start: Option<DateTime<Utc>>,

    pub reservation: Option<ConnectorReservation>,
    pub maintenance: bool,
    pub statistics: ConnectorStatistics,
    pub audit: AuditRecord,
}

impl Connector {
    pub fn new(station_id: impl Into<String>, connector_id: u32) -> Self {
        Self {
            station_id: station_id.into(),
            connector_id,
            status: ConnectorStatus::Available,
            error_code: ConnectorErrorCode::NoError,
            standard: None,
            format: None,
            power_type: None,
            max_voltage: None,
            max_amperage: None,
            max_power_kw: None,
            current_transaction_id: None,
            current_id_tag: None,
            current_charging_power_kw: None,
            current_energy_kwh: None,
            session_meter_start_wh: None,
            session_start: None,
            reservation: None,
            maintenance: false,
            statistics: ConnectorStatistics::default(),
            audit: AuditRecord::new(),
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        if !(MIN_CONNECTOR_ID..=MAX_CONNECTOR_ID).contains(&self.connector_id) {
            return Err(DomainError::Validation(format!(
                "connector id must be in [{}, {}]",
                MIN_CONNECTOR_ID, MAX_CONNECTOR_ID
            )));
        }
        if self.max_voltage.is_some_and(|v| v > 1000) {
            return Err(DomainError::Validation("max voltage above 1000 V".into()));
        }
        if self.max_amperage.is_some_and(|v| v > 1000) {
            return Err(DomainError::Validation("max amperage above 1000 A".into()));
        }
        if self.max_power_kw.is_some_and(|v| v > 1000) {
            return Err(DomainError::Validation("max power above 1000 kW".into()));
        }
        // DC power on a non-DC plug standard is suspicious but accepted.
        if self.power_type == Some(PowerType::Dc) {
            if let Some(standard) = self.standard {
                if !standard.dc_capable() {
                    warn!(
                        station_id = self.station_id.as_str(),
                        connector_id = self.connector_id,
                        ?standard,
                        "DC power type paired with a non-DC connector standard"
                    );
                }
            }
        }
        Ok(())
    }

    /// Effective status: an expired reservation reads as `Available`.
    pub fn effective_status(&self, now: DateTime<Utc>) -> ConnectorStatus {
        match (&self.status, &self.reservation) {
            (ConnectorStatus::Reserved, Some(res)) if res.is_expired(now) => {
                ConnectorStatus::Available
            }
            (status, _) => *status,
        }
    }

    /// Bind an active transaction to this connector (status becomes Occupied).
    pub fn occupy(
        &mut self,
        transaction_id: i64,
        id_tag: impl Into<String>,
        meter_start_wh: f64,
        started_at: DateTime<Utc>,
    ) {
        self.status = ConnectorStatus::Occupied;
        self.current_transaction_id = Some(transaction_id);
        self.current_id_tag = Some(id_tag.into());
        self.session_meter_start_wh = Some(meter_start_wh);
        self.current_energy_kwh = Some(0.0);
        self.session_start = Some(started_at);
    }

    /// Update live charging telemetry from a meter reading.
    ///
    /// `register_wh` is the absolute meter register; the session delta is
    /// computed against the value captured at `occupy` time.
    pub fn update_meter_reading(&mut self, register_wh: Option<f64>, power_kw: Option<f64>) {
        if let (Some(reading), Some(start)) = (register_wh, self.session_meter_start_wh) {
            self.current_energy_kwh = Some(((reading - start) / 1000.0).max(0.0));
        }
        if power_kw.is_some() {
            self.current_charging_power_kw = power_kw;
        }
    }

    /// Release the connector after a transaction ends.
    pub fn release(&mut self, energy_kwh: f64) {
        self.statistics.total_energy_kwh += energy_kwh;
        self.statistics.total_sessions += 1;
        self.status = ConnectorStatus::Available;
        self.current_transaction_id = None;
        self.current_id_tag = None;
        self.current_charging_power_kw = None;
        self.current_energy_kwh = None;
        self.session_meter_start_wh = None;
        self.session_start = None;
    }

    pub fn reserve(&mut self, reservation: ConnectorReservation) {
        self.status = ConnectorStatus::Reserved;
        self.reservation = Some(reservation);
    }

    /// Drop the reservation (consumed by a matching StartTransaction or
    /// expired by the sweep).
    pub fn clear_reservation(&mut self) {
        self.reservation = None;
        if self.status == ConnectorStatus::Reserved {
            self.status = ConnectorStatus::Available;
        }
    }

    /// Invariant: `current_transaction_id` is set iff `current_id_tag` is set
    /// and the connector is Occupied.
    pub fn check_occupancy_invariant(&self) -> bool {
        match self.current_transaction_id {
            Some(_) => self.current_id_tag.is_some() && self.status == ConnectorStatus::Occupied,
            None => self.current_id_tag.is_none(),
        }
    }
}

impl TenantScoped for Connector {
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
    use chrono::Duration;

    fn connector() -> Connector {
        Connector::new("CP-001", 1)
    }

    #[test]
    fn validate_connector_id_range() {
        assert!(connector().validate().is_ok());
        assert!(Connector::new("CP-001", 0).validate().is_err());
        assert!(Connector::new("CP-001", 51).validate().is_err());
    }

    #[test]
    fn validate_electrical_limits() {
        let mut c = connector();
        c.max_voltage = Some(1001);
        assert!(c.validate().is_err());
        c.max_voltage = Some(400);
        c.max_amperage = Some(32);
        c.max_power_kw = Some(22);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn occupy_and_release_keep_invariant() {
        let mut c = connector();
        assert!(c.check_occupancy_invariant());

        c.occupy(7, "RFID-ABC", 1000.0, Utc::now());
        assert_eq!(c.status, ConnectorStatus::Occupied);
        assert!(c.check_occupancy_invariant());

        c.release(5.0);
        assert_eq!(c.status, ConnectorStatus::Available);
        assert!(c.current_transaction_id.is_none());
        assert!(c.check_occupancy_invariant());
        assert_eq!(c.statistics.total_sessions, 1);
    }

    #[test]
    fn meter_reading_delta_is_against_session_start() {
        let mut c = connector();
        c.occupy(7, "RFID-ABC", 1000.0, Utc::now());

        c.update_meter_reading(Some(3500.0), Some(7.2));
        assert_eq!(c.current_energy_kwh, Some(2.5));
        assert_eq!(c.current_charging_power_kw, Some(7.2));

        // A replayed earlier reading never yields a negative delta
        c.update_meter_reading(Some(500.0), None);
        assert_eq!(c.current_energy_kwh, Some(0.0));
    }

    #[test]
    fn expired_reservation_reads_available() {
        let now = Utc::now();
        let mut c = connector();
        c.reserve(ConnectorReservation {
            reservation_id: 1,
            id_tag: "RFID-ABC".into(),
            expires_at: now + Duration::minutes(10),
        });
        assert_eq!(c.effective_status(now), ConnectorStatus::Reserved);
        assert_eq!(
            c.effective_status(now + Duration::minutes(11)),
            ConnectorStatus::Available
        );
    }

    #[test]
    fn clear_reservation_restores_available() {
        let mut c = connector();
        c.reserve(ConnectorReservation {
            reservation_id: 1,
            id_tag: "RFID-ABC".into(),
            expires_at: Utc::now(),
        });
        c.clear_reservation();
        assert_eq!(c.status, ConnectorStatus::Available);
        assert!(c.reservation.is_none());
    }
}
