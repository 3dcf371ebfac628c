//! Charging lifecycle service.
//!
//! Orchestrates the per-connector transaction lifecycle driven by OCPP
//! events: authorize, start, meter values, status notifications and stop.
//! All state-machine mutations for one connector are serialised on a
//! per-`(tenant, station, connector)` async lock, which is what allows
//! inbound handlers for distinct messages to otherwise run in parallel.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::tariff_engine;
use crate::domain::{
    ChargingSession, ChargingStation, Connector, ConnectorStatus, MeterValue, OcppVersion,
    PricingSnapshot, SessionStatus, StopReason, TokenStatus,
};
use crate::shared::errors::{DomainError, DomainResult};
use crate::storage::RepositoryProvider;
use crate::tenant::TenantContext;

/// Connector status as reported by the station (OCPP status enum, shared
/// shape across versions).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportedStatus {
    Available,
    Preparing,
    Charging,
    SuspendedEv,
    SuspendedEvse,
    Finishing,
    Reserved,
    Unavailable,
    Faulted,
}

impl ReportedStatus {
    /// Parse the wire name: the OCPP 1.6 `ChargePointStatus` values, plus
    /// 2.0.1's `Occupied` (which carries no charging-state detail).
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "Available" => Some(Self::Available),
            "Preparing" | "Occupied" => Some(Self::Preparing),
            "Charging" => Some(Self::Charging),
            "SuspendedEV" => Some(Self::SuspendedEv),
            "SuspendedEVSE" => Some(Self::SuspendedEvse),
            "Finishing" => Some(Self::Finishing),
            "Reserved" => Some(Self::Reserved),
            "Unavailable" => Some(Self::Unavailable),
            "Faulted" => Some(Self::Faulted),
            _ => None,
        }
    }

    /// Map onto the internal connector status.
    fn connector_status(self) -> ConnectorStatus {
        match self {
            Self::Available => ConnectorStatus::Available,
            Self::Preparing | Self::Charging | Self::SuspendedEv | Self::SuspendedEvse
            | Self::Finishing => ConnectorStatus::Occupied,
            Self::Reserved => ConnectorStatus::Reserved,
            Self::Unavailable => ConnectorStatus::Unavailable,
            Self::Faulted => ConnectorStatus::Faulted,
        }
    }

    /// Session transition implied by this report, if any.
    fn session_status(self) -> Option<SessionStatus> {
        match self {
            Self::Charging => Some(SessionStatus::Charging),
            Self::SuspendedEv => Some(SessionStatus::SuspendedEv),
            Self::SuspendedEvse => Some(SessionStatus::SuspendedEvse),
            Self::Finishing => Some(SessionStatus::Finishing),
            _ => None,
        }
    }
}

/// Outcome of a StartTransaction event.
#[derive(Debug)]
pub struct StartOutcome {
    pub transaction_id: i64,
    pub status: TokenStatus,
}

/// Outcome of a StopTransaction event.
#[derive(Debug)]
pub struct StopOutcome {
    pub status: TokenStatus,
    pub status_reason: Option<&'static str>,
    pub session: Option<ChargingSession>,
}

type ConnectorKey = (String, String, u32);

/// The charging-session lifecycle orchestrator.
pub struct ChargingService {
    repos: Arc<dyn RepositoryProvider>,
    connector_locks: DashMap<ConnectorKey, Arc<Mutex<()>>>,
}

impl ChargingService {
    pub fn new(repos: Arc<dyn RepositoryProvider>) -> Self {
        Self {
            repos,
            connector_locks: DashMap::new(),
        }
    }

    pub fn shared(repos: Arc<dyn RepositoryProvider>) -> Arc<Self> {
        Arc::new(Self::new(repos))
    }

    pub fn repos(&self) -> &Arc<dyn RepositoryProvider> {
        &self.repos
    }

    /// Serialise state-machine mutations per `(tenant, station, connector)`.
    async fn connector_lock(&self, station_id: &str, connector_id: u32) -> Arc<Mutex<()>> {
        let tenant = TenantContext::require()
            .map(|c| c.tenant_id().to_string())
            .unwrap_or_default();
        self.connector_locks
            .entry((tenant, station_id.to_string(), connector_id))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Check the bound tenant exists and is active.
    pub async fn validate_current_tenant(&self) -> DomainResult<()> {
        let ctx = TenantContext::require()?;
        let tenant = self.repos.tenants().find_by_code(ctx.tenant_id()).await?;
        match tenant {
            Some(t) if t.active => Ok(()),
            _ => Err(DomainError::InvalidState(
                "invalid or inactive tenant".into(),
            )),
        }
    }

    // ── Boot / heartbeat / connection state ────────────────────

    /// Upsert the station from a BootNotification and return the heartbeat
    /// interval to advertise.
    pub async fn register_boot(
        &self,
        station_id: &str,
        vendor: &str,
        model: &str,
        serial_number: Option<&str>,
        firmware_version: Option<&str>,
    ) -> DomainResult<u32> {
        let station = match self.repos.stations().find_by_id(station_id).await? {
            Some(mut station) => {
                station.record_boot(vendor, model, serial_number, firmware_version);
                station.connected = true;
                self.repos.stations().update(station).await?
            }
            None => {
                let mut station = ChargingStation::new(station_id);
                station.record_boot(vendor, model, serial_number, firmware_version);
                station.connected = true;
                self.repos.stations().save(station).await?
            }
        };

        // Make sure at least the first physical connector exists; the real
        // set is filled in by StatusNotification messages.
        if self
            .repos
            .connectors()
            .find(station_id, 1)
            .await?
            .is_none()
        {
            self.repos
                .connectors()
                .save(Connector::new(station_id, 1))
                .await?;
        }

        Ok(station.heartbeat_interval_secs)
    }

    pub async fn record_heartbeat(&self, station_id: &str, at: DateTime<Utc>) -> DomainResult<()> {
        if let Some(mut station) = self.repos.stations().find_by_id(station_id).await? {
            station.record_heartbeat(at);
            self.repos.stations().update(station).await?;
        }
        Ok(())
    }

    pub async fn mark_station_connected(
        &self,
        station_id: &str,
        connected: bool,
    ) -> DomainResult<()> {
        if let Some(mut station) = self.repos.stations().find_by_id(station_id).await? {
            station.connected = connected;
            self.repos.stations().update(station).await?;
        }
        Ok(())
    }

    // ── Authorize ──────────────────────────────────────────────

    /// Validate an idTag. Creates a session driven to AUTHORIZED (or
    /// FAILED) so a following StartTransaction can adopt it.
    pub async fn authorize(&self, station_id: &str, id_tag: &str) -> DomainResult<TokenStatus> {
        let status = self.token_status(id_tag).await?;

        let mut session = ChargingSession::new(station_id);
        session.ocpp_id_tag = Some(id_tag.to_string());
        let now = Utc::now();
        session.transition_to(SessionStatus::Authorizing, None, now)?;
        if status == TokenStatus::Accepted {
            session.transition_to(SessionStatus::Authorized, None, now)?;
            session.authorization_time = Some(now);
        } else {
            session.transition_to(SessionStatus::Failed, Some(status.as_str()), now)?;
        }
        self.repos.sessions().save(session).await?;

        info!(station_id, id_tag, status = status.as_str(), "Authorize");
        Ok(status)
    }

    async fn token_status(&self, id_tag: &str) -> DomainResult<TokenStatus> {
        let token = self.repos.auth_tokens().find_by_value(id_tag).await?;
        Ok(match token {
            Some(token) => token.status(Utc::now()),
            None => TokenStatus::Invalid,
        })
    }

    // ── StartTransaction ───────────────────────────────────────

    /// Start a transaction on a connector.
    ///
    /// Allocates the per-tenant integer transaction id (for 2.0.1 the
    /// station's string id is hashed), binds it immutably, moves the
    /// session to CHARGING and occupies the connector. A cited reservation
    /// is consumed when its idTag matches.
    #[allow(clippy::too_many_arguments)]
    pub async fn start_transaction(
        &self,
        station_id: &str,
        connector_id: u32,
        id_tag: &str,
        meter_start_wh: Decimal,
        timestamp: DateTime<Utc>,
        reservation_id: Option<i32>,
        remote_transaction_id: Option<&str>,
    ) -> DomainResult<StartOutcome> {
        let lock = self.connector_lock(station_id, connector_id).await;
        let _guard = lock.lock().await;

        let status = self.token_status(id_tag).await?;
        if status != TokenStatus::Accepted {
            return Ok(StartOutcome {
                transaction_id: 0,
                status,
            });
        }

        // At most one active session per (tenant, connector).
        if self
            .repos
            .sessions()
            .find_active_for_connector(station_id, connector_id)
            .await?
            .is_some()
        {
            warn!(station_id, connector_id, "Connector already has an active session");
            return Ok(StartOutcome {
                transaction_id: 0,
                status: TokenStatus::ConcurrentTx,
            });
        }

        // Adopt the session a prior Authorize created, or create one.
        let mut session = match self
            .repos
            .sessions()
            .find_authorized(station_id, id_tag)
            .await?
        {
            Some(session) => session,
            None => {
                let mut session = ChargingSession::new(station_id);
                session.ocpp_id_tag = Some(id_tag.to_string());
                session.transition_to(SessionStatus::Authorizing, None, timestamp)?;
                session.transition_to(SessionStatus::Authorized, None, timestamp)?;
                session.authorization_time = Some(timestamp);
                self.repos.sessions().save(session).await?
            }
        };

        let transaction_id = self
            .allocate_transaction_id(remote_transaction_id, &session.session_uuid)
            .await?;

        session.connector_id = Some(connector_id);
        session.bind_transaction_id(transaction_id)?;
        session.remote_transaction_id = remote_transaction_id.map(String::from);
        session.meter_start_wh = Some(meter_start_wh);
        session.start_time = Some(timestamp);
        session.reservation_id = reservation_id;
        session.transition_to(SessionStatus::Starting, None, timestamp)?;
        session.transition_to(SessionStatus::Charging, None, timestamp)?;

        // Connector bookkeeping, including reservation consumption.
        let mut connector = self
            .repos
            .connectors()
            .find(station_id, connector_id)
            .await?
            .unwrap_or_else(|| Connector::new(station_id, connector_id));
        let is_new_connector = connector.audit.tenant_id.is_none();

        if let (Some(cited), Some(reservation)) = (reservation_id, connector.reservation.clone()) {
            if reservation.reservation_id == cited && reservation.id_tag == id_tag {
                connector.clear_reservation();
                info!(station_id, connector_id, reservation_id = cited, "Reservation consumed");
            }
        }
        connector.occupy(
            transaction_id,
            id_tag,
            decimal_to_f64(meter_start_wh),
            timestamp,
        );

        let session = self.repos.sessions().update(session).await?;
        if is_new_connector {
            self.repos.connectors().save(connector).await?;
        } else {
            self.repos.connectors().update(connector).await?;
        }

        info!(
            station_id,
            connector_id,
            transaction_id,
            id_tag,
            session_uuid = session.session_uuid.as_str(),
            "Transaction started"
        );

        Ok(StartOutcome {
            transaction_id,
            status: TokenStatus::Accepted,
        })
    }

    /// Transaction ids are unique per tenant. 2.0.1 string ids are hashed
    /// with the tenant mixed in; on the (rare) collision with an existing
    /// session the sequential allocator takes over.
    async fn allocate_transaction_id(
        &self,
        remote_transaction_id: Option<&str>,
        session_uuid: &str,
    ) -> DomainResult<i64> {
        if let Some(remote) = remote_transaction_id {
            let ctx = TenantContext::require()?;
            let hashed = ChargingSession::hash_remote_transaction_id(ctx.tenant_id(), remote);
            match self.repos.sessions().find_by_transaction_id(hashed).await? {
                Some(existing) if existing.session_uuid != session_uuid => {
                    warn!(remote, hashed, "Remote transaction id hash collision");
                }
                _ => return Ok(hashed),
            }
        }
        self.repos.sessions().next_transaction_id().await
    }

    // ── MeterValues ────────────────────────────────────────────

    /// Append sampled values to the active session, looked up by
    /// transaction id when given, else by connector.
    pub async fn record_meter_values(
        &self,
        station_id: &str,
        connector_id: u32,
        transaction_id: Option<i64>,
        samples: Vec<MeterValue>,
    ) -> DomainResult<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let session = match transaction_id {
            Some(tx) => self.repos.sessions().find_by_transaction_id(tx).await?,
            None => {
                self.repos
                    .sessions()
                    .find_active_for_connector(station_id, connector_id)
                    .await?
            }
        };
        let Some(mut session) = session else {
            warn!(
                station_id,
                connector_id,
                ?transaction_id,
                "MeterValues without a matching session, dropped"
            );
            return Ok(());
        };

        let connector_id = session.connector_id.unwrap_or(connector_id);
        let lock = self.connector_lock(station_id, connector_id).await;
        let _guard = lock.lock().await;

        // Live connector telemetry from the latest energy/power samples.
        let register_wh = samples
            .iter()
            .rev()
            .find_map(|s| s.energy_kwh)
            .map(|kwh| kwh * 1000.0);
        let power_kw = samples.iter().rev().find_map(|s| s.power_kw);

        for sample in samples {
            session.append_meter_value(sample);
        }
        // Children are ordered by event timestamps, not server receive time.
        session
            .meter_values
            .sort_by_key(|mv| mv.timestamp);

        self.repos.sessions().update(session).await?;

        if let Some(mut connector) = self.repos.connectors().find(station_id, connector_id).await? {
            connector.update_meter_reading(register_wh, power_kw);
            self.repos.connectors().update(connector).await?;
        }

        Ok(())
    }

    // ── StatusNotification ─────────────────────────────────────

    /// Apply a station-reported connector status and drive the session
    /// through Suspended/Finishing when the report implies it.
    pub async fn status_notification(
        &self,
        station_id: &str,
        connector_id: u32,
        reported: ReportedStatus,
        error_code: crate::domain::ConnectorErrorCode,
        info_text: Option<&str>,
    ) -> DomainResult<()> {
        // Connector 0 refers to the station as a whole in OCPP 1.6.
        if connector_id == 0 {
            info!(station_id, ?reported, "Station-level status notification");
            return Ok(());
        }

        let lock = self.connector_lock(station_id, connector_id).await;
        let _guard = lock.lock().await;

        let mut connector = self
            .repos
            .connectors()
            .find(station_id, connector_id)
            .await?
            .unwrap_or_else(|| Connector::new(station_id, connector_id));
        let is_new = connector.audit.tenant_id.is_none();

        connector.error_code = error_code;
        // Occupied is owned by the transaction lifecycle; a status report
        // never un-occupies a connector with a live transaction.
        let mapped = reported.connector_status();
        if connector.current_transaction_id.is_none() || mapped != ConnectorStatus::Available {
            connector.status = mapped;
        }

        if is_new {
            self.repos.connectors().save(connector).await?;
        } else {
            self.repos.connectors().update(connector).await?;
        }

        if let Some(target) = reported.session_status() {
            if let Some(mut session) = self
                .repos
                .sessions()
                .find_active_for_connector(station_id, connector_id)
                .await?
            {
                if session.status != target && session.status.can_transition_to(target) {
                    session.transition_to(target, info_text, Utc::now())?;
                    self.repos.sessions().update(session).await?;
                }
            }
        }

        Ok(())
    }

    // ── StopTransaction ────────────────────────────────────────

    /// Stop a transaction.
    ///
    /// An unknown transaction id or a mismatched idTag leaves the session
    /// untouched and reports Invalid; otherwise the session is driven to
    /// COMPLETED, completion figures are derived, the tariff engine prices
    /// the session, and the connector is released.
    #[allow(clippy::too_many_arguments)]
    pub async fn stop_transaction(
        &self,
        station_id: &str,
        transaction_id: i64,
        id_tag: Option<&str>,
        meter_stop_wh: Decimal,
        timestamp: DateTime<Utc>,
        raw_reason: Option<&str>,
        version: OcppVersion,
        transaction_data: Vec<MeterValue>,
    ) -> DomainResult<StopOutcome> {
        let Some(session) = self
            .repos
            .sessions()
            .find_by_transaction_id(transaction_id)
            .await?
        else {
            warn!(station_id, transaction_id, "StopTransaction for unknown transaction");
            return Ok(StopOutcome {
                status: TokenStatus::Invalid,
                status_reason: Some("UnknownTransaction"),
                session: None,
            });
        };

        // The stopping idTag must match the starting one.
        if let Some(stop_tag) = id_tag {
            if session.ocpp_id_tag.as_deref() != Some(stop_tag) {
                warn!(
                    station_id,
                    transaction_id,
                    stop_tag,
                    start_tag = ?session.ocpp_id_tag,
                    "StopTransaction idTag mismatch, session kept running"
                );
                return Ok(StopOutcome {
                    status: TokenStatus::Invalid,
                    status_reason: Some("InvalidToken"),
                    session: None,
                });
            }
        }

        let connector_id = session.connector_id.unwrap_or(1);
        let lock = self.connector_lock(station_id, connector_id).await;
        let _guard = lock.lock().await;

        // Re-read under the lock.
        let mut session = self
            .repos
            .sessions()
            .find_by_transaction_id(transaction_id)
            .await?
            .ok_or(DomainError::NotFound {
                entity: "ChargingSession",
                field: "transaction_id",
                value: transaction_id.to_string(),
            })?;

        if session.status.is_terminal() {
            // Duplicate StopTransaction: idempotent accept.
            return Ok(StopOutcome {
                status: TokenStatus::Accepted,
                status_reason: None,
                session: Some(session),
            });
        }

        // Trailing transactionData samples become ordinary meter values.
        for sample in transaction_data {
            session.append_meter_value(sample);
        }
        session.meter_values.sort_by_key(|mv| mv.timestamp);

        if session.status != SessionStatus::Finishing {
            session.transition_to(SessionStatus::Finishing, raw_reason, timestamp)?;
        }

        session.stop_reason = Some(match (raw_reason, version) {
            (Some(reason), OcppVersion::V16) => StopReason::parse_v16(reason),
            (Some(reason), OcppVersion::V201) => StopReason::parse_v201(reason),
            (None, _) => StopReason::Local,
        });
        session.complete_metering(meter_stop_wh, timestamp);
        session.transition_to(SessionStatus::Completed, raw_reason, timestamp)?;

        // Price the session.
        let costs = self.price_session(&mut session).await?;
        session.costs = Some(costs.clone());

        let session = self.repos.sessions().update(session).await?;

        // Release the connector and roll up station statistics.
        let energy_kwh = session
            .energy_delivered_kwh
            .map(decimal_to_f64)
            .unwrap_or(0.0);
        if let Some(mut connector) = self.repos.connectors().find(station_id, connector_id).await? {
            connector.release(energy_kwh);
            self.repos.connectors().update(connector).await?;
        }
        if let Some(mut station) = self.repos.stations().find_by_id(station_id).await? {
            station.record_completed_session(energy_kwh, decimal_to_f64(costs.total_cost));
            self.repos.stations().update(station).await?;
        }

        info!(
            station_id,
            transaction_id,
            energy_kwh,
            total_cost = %costs.total_cost,
            currency = costs.currency.as_str(),
            reason = ?session.stop_reason,
            "Transaction stopped"
        );

        Ok(StopOutcome {
            status: TokenStatus::Accepted,
            status_reason: None,
            session: Some(session),
        })
    }

    /// Resolve the tariff chain (session tariff, tenant default, built-in)
    /// and compute costs; snapshots the pricing onto the session.
    async fn price_session(
        &self,
        session: &mut ChargingSession,
    ) -> DomainResult<crate::domain::SessionCosts> {
        let tariff = match &session.tariff_id {
            Some(code) => self.repos.tariffs().find_by_code(code).await?,
            None => None,
        };
        let tariff = match tariff {
            Some(t) => t,
            None => match self.repos.tariffs().find_default().await? {
                Some(t) => t,
                None => tariff_engine::built_in_default_tariff(),
            },
        };

        session.pricing = Some(PricingSnapshot {
            currency: tariff.currency.clone(),
            price_per_kwh: tariff.price_per_kwh,
            price_per_minute: tariff.price_per_minute,
        });

        Ok(tariff_engine::compute_cost(
            &tariff,
            session.energy_delivered_kwh.unwrap_or(Decimal::ZERO),
            session.duration_minutes.unwrap_or(0),
            session.max_power_kw,
        ))
    }

    // ── Reservation expiry sweep ───────────────────────────────

    /// Clear expired reservations for the bound tenant; returns how many
    /// were released.
    pub async fn expire_reservations(&self, now: DateTime<Utc>) -> DomainResult<usize> {
        let reserved = self.repos.connectors().find_reserved().await?;
        let mut expired = 0;
        for mut connector in reserved {
            let is_expired = connector
                .reservation
                .as_ref()
                .is_some_and(|r| r.is_expired(now));
            if is_expired {
                connector.clear_reservation();
                self.repos.connectors().update(connector).await?;
                expired += 1;
            }
        }
        Ok(expired)
    }
}

fn decimal_to_f64(value: Decimal) -> f64 {
    use rust_decimal::prelude::ToPrimitive;
    value.to_f64().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AuthToken, Measurand, Tenant, TenantType, TokenType};
    use crate::storage::InMemoryRepositoryProvider;
    use chrono::TimeZone;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    async fn setup() -> (Arc<InMemoryRepositoryProvider>, Arc<ChargingService>) {
        let repos = InMemoryRepositoryProvider::shared();
        let service = ChargingService::shared(repos.clone());
        repos
            .tenants()
            .save(Tenant::new("t1", "Tenant One", TenantType::Cpo))
            .await
            .unwrap();
        TenantContext::new("t1")
            .scope(async {
                service
                    .register_boot("CP-1", "Acme", "M1", None, None)
                    .await
                    .unwrap();
                repos
                    .auth_tokens()
                    .save(AuthToken::new("RFID-ABC", TokenType::Rfid))
                    .await
                    .unwrap();
            })
            .await;
        (repos, service)
    }

    fn ts(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, h, m, 0).unwrap()
    }

    #[tokio::test]
    async fn happy_path_session_lifecycle() {
        let (repos, service) = setup().await;
        TenantContext::new("t1")
            .scope(async {
                let start = service
                    .start_transaction("CP-1", 1, "RFID-ABC", dec("0"), ts(10, 0), None, None)
                    .await
                    .unwrap();
                assert_eq!(start.status, TokenStatus::Accepted);
                assert_eq!(start.transaction_id, 1);

                let session = repos
                    .sessions()
                    .find_by_transaction_id(1)
                    .await
                    .unwrap()
                    .unwrap();
                assert_eq!(session.status, SessionStatus::Charging);

                let connector = repos.connectors().find("CP-1", 1).await.unwrap().unwrap();
                assert_eq!(connector.status, ConnectorStatus::Occupied);
                assert_eq!(connector.current_id_tag.as_deref(), Some("RFID-ABC"));

                // Meter samples over the session
                service
                    .record_meter_values(
                        "CP-1",
                        1,
                        Some(1),
                        vec![MeterValue::new(
                            ts(10, 15),
                            Measurand::EnergyActiveImportRegister,
                            "9000",
                            Some("Wh".into()),
                        )],
                    )
                    .await
                    .unwrap();

                let stop = service
                    .stop_transaction(
                        "CP-1",
                        1,
                        Some("RFID-ABC"),
                        dec("18000"),
                        ts(10, 30),
                        Some("Local"),
                        OcppVersion::V16,
                        vec![MeterValue::new(
                            ts(10, 30),
                            Measurand::EnergyActiveImportRegister,
                            "18000",
                            Some("Wh".into()),
                        )],
                    )
                    .await
                    .unwrap();
                assert_eq!(stop.status, TokenStatus::Accepted);

                let session = stop.session.unwrap();
                assert_eq!(session.status, SessionStatus::Completed);
                assert_eq!(session.energy_delivered_kwh, Some(dec("18.000")));
                assert_eq!(session.duration_minutes, Some(30));
                assert_eq!(session.stop_reason, Some(StopReason::Local));

                // Built-in default tariff: 18 * 0.30 + 30 * 0.02 = 6.00
                let costs = session.costs.unwrap();
                assert_eq!(costs.total_cost, dec("6.00"));
                assert_eq!(costs.currency, "EUR");

                let connector = repos.connectors().find("CP-1", 1).await.unwrap().unwrap();
                assert_eq!(connector.status, ConnectorStatus::Available);
                assert!(connector.current_transaction_id.is_none());

                let station = repos.stations().find_by_id("CP-1").await.unwrap().unwrap();
                assert_eq!(station.statistics.total_sessions, 1);
                assert!((station.statistics.total_energy_kwh - 18.0).abs() < 1e-9);
            })
            .await;
    }

    #[tokio::test]
    async fn stop_with_wrong_id_tag_keeps_session_charging() {
        let (repos, service) = setup().await;
        TenantContext::new("t1")
            .scope(async {
                service
                    .start_transaction("CP-1", 1, "RFID-ABC", dec("0"), ts(10, 0), None, None)
                    .await
                    .unwrap();

                let stop = service
                    .stop_transaction(
                        "CP-1",
                        1,
                        Some("RFID-OTHER"),
                        dec("500"),
                        ts(10, 5),
                        Some("Local"),
                        OcppVersion::V16,
                        vec![],
                    )
                    .await
                    .unwrap();
                assert_eq!(stop.status, TokenStatus::Invalid);
                assert_eq!(stop.status_reason, Some("InvalidToken"));

                let session = repos
                    .sessions()
                    .find_by_transaction_id(1)
                    .await
                    .unwrap()
                    .unwrap();
                assert_eq!(session.status, SessionStatus::Charging);
            })
            .await;
    }

    #[tokio::test]
    async fn stop_unknown_transaction_reports_invalid() {
        let (_repos, service) = setup().await;
        TenantContext::new("t1")
            .scope(async {
                let stop = service
                    .stop_transaction(
                        "CP-1",
                        99,
                        None,
                        dec("0"),
                        ts(10, 0),
                        None,
                        OcppVersion::V16,
                        vec![],
                    )
                    .await
                    .unwrap();
                assert_eq!(stop.status, TokenStatus::Invalid);
                assert_eq!(stop.status_reason, Some("UnknownTransaction"));
            })
            .await;
    }

    #[tokio::test]
    async fn second_start_on_connector_is_concurrent() {
        let (repos, service) = setup().await;
        TenantContext::new("t1")
            .scope(async {
                repos
                    .auth_tokens()
                    .save(AuthToken::new("RFID-2", TokenType::Rfid))
                    .await
                    .unwrap();
                service
                    .start_transaction("CP-1", 1, "RFID-ABC", dec("0"), ts(10, 0), None, None)
                    .await
                    .unwrap();
                let second = service
                    .start_transaction("CP-1", 1, "RFID-2", dec("0"), ts(10, 1), None, None)
                    .await
                    .unwrap();
                assert_eq!(second.status, TokenStatus::ConcurrentTx);

                // Exactly one active session on the connector
                let active = repos
                    .sessions()
                    .find_active_for_connector("CP-1", 1)
                    .await
                    .unwrap();
                assert!(active.is_some());
            })
            .await;
    }

    #[tokio::test]
    async fn unknown_id_tag_is_rejected() {
        let (_repos, service) = setup().await;
        TenantContext::new("t1")
            .scope(async {
                let outcome = service
                    .start_transaction("CP-1", 1, "NOBODY", dec("0"), ts(10, 0), None, None)
                    .await
                    .unwrap();
                assert_eq!(outcome.status, TokenStatus::Invalid);
                assert_eq!(outcome.transaction_id, 0);
            })
            .await;
    }

    #[tokio::test]
    async fn authorize_then_start_adopts_the_session() {
        let (repos, service) = setup().await;
        TenantContext::new("t1")
            .scope(async {
                let status = service.authorize("CP-1", "RFID-ABC").await.unwrap();
                assert_eq!(status, TokenStatus::Accepted);

                service
                    .start_transaction("CP-1", 1, "RFID-ABC", dec("0"), ts(10, 0), None, None)
                    .await
                    .unwrap();

                // One session total: the authorized one was adopted.
                let sessions = repos.sessions().find_for_station("CP-1").await.unwrap();
                assert_eq!(sessions.len(), 1);
                assert_eq!(sessions[0].status, SessionStatus::Charging);
                assert!(sessions[0].authorization_time.is_some());
            })
            .await;
    }

    #[tokio::test]
    async fn suspension_via_status_notification() {
        let (repos, service) = setup().await;
        TenantContext::new("t1")
            .scope(async {
                service
                    .start_transaction("CP-1", 1, "RFID-ABC", dec("0"), ts(10, 0), None, None)
                    .await
                    .unwrap();

                service
                    .status_notification(
                        "CP-1",
                        1,
                        ReportedStatus::SuspendedEv,
                        Default::default(),
                        None,
                    )
                    .await
                    .unwrap();
                let session = repos
                    .sessions()
                    .find_by_transaction_id(1)
                    .await
                    .unwrap()
                    .unwrap();
                assert_eq!(session.status, SessionStatus::SuspendedEv);

                service
                    .status_notification(
                        "CP-1",
                        1,
                        ReportedStatus::Charging,
                        Default::default(),
                        None,
                    )
                    .await
                    .unwrap();
                let session = repos
                    .sessions()
                    .find_by_transaction_id(1)
                    .await
                    .unwrap()
                    .unwrap();
                assert_eq!(session.status, SessionStatus::Charging);

                // Stop still works after a suspension round-trip
                let stop = service
                    .stop_transaction(
                        "CP-1",
                        1,
                        Some("RFID-ABC"),
                        dec("1000"),
                        ts(11, 0),
                        Some("EVDisconnected"),
                        OcppVersion::V16,
                        vec![],
                    )
                    .await
                    .unwrap();
                assert_eq!(stop.status, TokenStatus::Accepted);
                assert_eq!(
                    stop.session.unwrap().stop_reason,
                    Some(StopReason::EvDisconnected)
                );
            })
            .await;
    }

    #[tokio::test]
    async fn v201_stop_reason_is_case_insensitive() {
        let (_repos, service) = setup().await;
        TenantContext::new("t1")
            .scope(async {
                service
                    .start_transaction(
                        "CP-1",
                        1,
                        "RFID-ABC",
                        dec("0"),
                        ts(10, 0),
                        None,
                        Some("TX-abc"),
                    )
                    .await
                    .unwrap();
                let tx_id =
                    ChargingSession::hash_remote_transaction_id("t1", "TX-abc");
                let stop = service
                    .stop_transaction(
                        "CP-1",
                        tx_id,
                        Some("RFID-ABC"),
                        dec("2000"),
                        ts(10, 20),
                        Some("deauthorized"),
                        OcppVersion::V201,
                        vec![],
                    )
                    .await
                    .unwrap();
                assert_eq!(
                    stop.session.unwrap().stop_reason,
                    Some(StopReason::DeAuthorized)
                );
            })
            .await;
    }

    #[tokio::test]
    async fn reservation_is_consumed_by_matching_start() {
        let (repos, service) = setup().await;
        TenantContext::new("t1")
            .scope(async {
                let mut connector = repos.connectors().find("CP-1", 1).await.unwrap().unwrap();
                connector.reserve(crate::domain::ConnectorReservation {
                    reservation_id: 7,
                    id_tag: "RFID-ABC".into(),
                    expires_at: ts(12, 0),
                });
                repos.connectors().update(connector).await.unwrap();

                service
                    .start_transaction("CP-1", 1, "RFID-ABC", dec("0"), ts(10, 0), Some(7), None)
                    .await
                    .unwrap();

                let connector = repos.connectors().find("CP-1", 1).await.unwrap().unwrap();
                assert!(connector.reservation.is_none());
                assert_eq!(connector.status, ConnectorStatus::Occupied);
            })
            .await;
    }

    #[tokio::test]
    async fn expire_reservations_sweep() {
        let (repos, service) = setup().await;
        TenantContext::new("t1")
            .scope(async {
                let mut connector = repos.connectors().find("CP-1", 1).await.unwrap().unwrap();
                connector.reserve(crate::domain::ConnectorReservation {
                    reservation_id: 7,
                    id_tag: "RFID-ABC".into(),
                    expires_at: ts(10, 0),
                });
                repos.connectors().update(connector).await.unwrap();

                let expired = service.expire_reservations(ts(10, 1)).await.unwrap();
                assert_eq!(expired, 1);

                let connector = repos.connectors().find("CP-1", 1).await.unwrap().unwrap();
                assert!(connector.reservation.is_none());
                assert_eq!(connector.status, ConnectorStatus::Available);
            })
            .await;
    }

    #[tokio::test]
    async fn validate_current_tenant_checks_active() {
        let (repos, service) = setup().await;
        TenantContext::new("t1")
            .scope(service.validate_current_tenant())
            .await
            .unwrap();

        let mut tenant = repos.tenants().find_by_code("t1").await.unwrap().unwrap();
        tenant.suspend("maintenance");
        repos.tenants().update(tenant).await.unwrap();

        let err = TenantContext::new("t1")
            .scope(service.validate_current_tenant())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));

        let err = TenantContext::new("ghost")
            .scope(service.validate_current_tenant())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
    }
}
