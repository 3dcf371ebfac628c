//! Charging station domain entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::audit::{AuditRecord, TenantScoped};
use crate::shared::errors::{DomainError, DomainResult};

pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u32 = 300;
pub const DEFAULT_METER_SAMPLE_INTERVAL_SECS: u32 = 60;
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u32 = 60;

/// OCPP version a station declares support for (station attribute; the
/// connection itself negotiates 1.6 or 2.0.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StationProtocol {
    V15,
    V16,
    V20,
    V201,
}

/// Geographic position of a station
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoLocation {
    pub fn validate(&self) -> DomainResult<()> {
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(DomainError::Validation("latitude out of range".into()));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(DomainError::Validation("longitude out of range".into()));
        }
        Ok(())
    }

    /// Great-circle distance in kilometres (haversine).
    pub fn distance_km(&self, other: &GeoLocation) -> f64 {
        const EARTH_RADIUS_KM: f64 = 6371.0;
        let (lat1, lat2) = (self.latitude.to_radians(), other.latitude.to_radians());
        let dlat = (other.latitude - self.latitude).to_radians();
        let dlng = (other.longitude - self.longitude).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
    }
}

/// Cumulative per-station statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StationStatistics {
    pub total_energy_kwh: f64,
    pub total_sessions: u64,
    pub total_revenue: f64,
}

/// Charging station aggregate, keyed by `(station_id, tenant_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargingStation {
    /// Operator-assigned identifier: alphanumeric, `_`, `-`; at most 100 chars
    pub station_id: String,
    pub name: Option<String>,
    pub vendor: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub firmware_version: Option<String>,
    pub protocol: StationProtocol,
    /// Heartbeat interval advertised to the station (30-3600 s)
    pub heartbeat_interval_secs: u32,
    /// Meter sample interval (5-3600 s)
    pub meter_sample_interval_secs: u32,
    /// Grace period on top of the heartbeat interval (10-600 s)
    pub connection_timeout_secs: u32,
    pub location: Option<GeoLocation>,
    pub operator_metadata: Option<String>,
    /// Deactivated stations keep their history but are refused service.
    pub active: bool,
    pub maintenance: bool,
    pub maintenance_reason: Option<String>,
    pub statistics: StationStatistics,

    // Transient runtime attributes (refreshed by the gateway)
    pub connected: bool,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub last_boot_at: Option<DateTime<Utc>>,

    pub audit: AuditRecord,
}

impl ChargingStation {
    pub fn new(station_id: impl Into<String>) -> Self {
        Self {
            station_id: station_id.into(),
            name: None,
            vendor: None,
            model: None,
            serial_number: None,
            firmware_version: None,
            protocol: StationProtocol::V16,
            heartbeat_interval_secs: DEFAULT_HEARTBEAT_INTERVAL_SECS,
            meter_sample_interval_secs: DEFAULT_METER_SAMPLE_INTERVAL_SECS,
            connection_timeout_secs: DEFAULT_CONNECTION_TIMEOUT_SECS,
            location: None,
            operator_metadata: None,
            active: true,
            maintenance: false,
            maintenance_reason: None,
            statistics: StationStatistics::default(),
            connected: false,
            last_heartbeat_at: None,
            last_boot_at: None,
            audit: AuditRecord::new(),
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.station_id.is_empty() || self.station_id.len() > 100 {
            return Err(DomainError::Validation(
                "station id must be 1-100 characters".into(),
            ));
        }
        if !self
            .station_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(DomainError::Validation(
                "station id may contain only alphanumerics, '_' and '-'".into(),
            ));
        }
        if !(30..=3600).contains(&self.heartbeat_interval_secs) {
            return Err(DomainError::Validation(
                "heartbeat interval must be 30-3600 seconds".into(),
            ));
        }
        if !(5..=3600).contains(&self.meter_sample_interval_secs) {
            return Err(DomainError::Validation(
                "meter sample interval must be 5-3600 seconds".into(),
            ));
        }
        if !(10..=600).contains(&self.connection_timeout_secs) {
            return Err(DomainError::Validation(
                "connection timeout must be 10-600 seconds".into(),
            ));
        }
        if let Some(loc) = &self.location {
            loc.validate()?;
        }
        Ok(())
    }

    /// A station is online iff connected and its last heartbeat is within
    /// `heartbeat_interval + connection_timeout`.
    pub fn is_online(&self, now: DateTime<Utc>) -> bool {
        if !self.connected {
            return false;
        }
        match self.last_heartbeat_at {
            Some(last) => {
                let window =
                    i64::from(self.heartbeat_interval_secs) + i64::from(self.connection_timeout_secs);
                now.signed_duration_since(last).num_seconds() < window
            }
            None => false,
        }
    }

    pub fn record_boot(
        &mut self,
        vendor: &str,
        model: &str,
        serial_number: Option<&str>,
        firmware_version: Option<&str>,
    ) {
        self.vendor = Some(vendor.to_string());
        self.model = Some(model.to_string());
        if serial_number.is_some() {
            self.serial_number = serial_number.map(String::from);
        }
        if firmware_version.is_some() {
            self.firmware_version = firmware_version.map(String::from);
        }
        self.last_boot_at = Some(Utc::now());
    }

    pub fn record_heartbeat(&mut self, at: DateTime<Utc>) {
        self.last_heartbeat_at = Some(at);
    }

    pub fn start_maintenance(&mut self, reason: impl Into<String>) {
        self.maintenance = true;
        self.maintenance_reason = Some(reason.into());
    }

    pub fn end_maintenance(&mut self) {
        self.maintenance = false;
        self.maintenance_reason = None;
    }

    pub fn record_completed_session(&mut self, energy_kwh: f64, revenue: f64) {
        self.statistics.total_energy_kwh += energy_kwh;
        self.statistics.total_sessions += 1;
        self.statistics.total_revenue += revenue;
    }
}

impl TenantScoped for ChargingStation {
    fn audit(&self) -> &AuditRecord {
        &self.audit
    }

    fn audit_mut(&mut self) -> &mut AuditRecord {
        &mut self.audit
    }
}
