//! Repository trait definitions.
//!
//! Every method on a tenant-scoped repository operates within the tenant
//! bound to the current task (see [`crate::tenant::TenantContext`]); reads
//! never return rows of another tenant and writes run through the guard
//! hook in [`super::guard`]. The tenant registry itself is global.

use async_trait::async_trait;

use crate::domain::{
    AuthToken, ChargingSession, ChargingStation, Connector, Tariff, Tenant, User,
};
use crate::shared::errors::DomainResult;

// ── Global registry ────────────────────────────────────────────

#[async_trait]
pub trait TenantRepository: Send + Sync {
    async fn save(&self, tenant: Tenant) -> DomainResult<Tenant>;
    async fn update(&self, tenant: Tenant) -> DomainResult<Tenant>;
    async fn find_by_code(&self, code: &str) -> DomainResult<Option<Tenant>>;
    async fn find_all(&self) -> DomainResult<Vec<Tenant>>;
}

// ── Tenant-scoped repositories ─────────────────────────────────

#[async_trait]
pub trait StationRepository: Send + Sync {
    async fn save(&self, station: ChargingStation) -> DomainResult<ChargingStation>;
    async fn update(&self, station: ChargingStation) -> DomainResult<ChargingStation>;
    async fn find_by_id(&self, station_id: &str) -> DomainResult<Option<ChargingStation>>;
    async fn find_all(&self) -> DomainResult<Vec<ChargingStation>>;
    async fn delete(&self, station_id: &str) -> DomainResult<()>;
}

#[async_trait]
pub trait ConnectorRepository: Send + Sync {
    async fn save(&self, connector: Connector) -> DomainResult<Connector>;
    async fn update(&self, connector: Connector) -> DomainResult<Connector>;
    async fn find(&self, station_id: &str, connector_id: u32) -> DomainResult<Option<Connector>>;
    async fn find_for_station(&self, station_id: &str) -> DomainResult<Vec<Connector>>;
    /// Connectors with a live reservation, across the bound tenant.
    async fn find_reserved(&self) -> DomainResult<Vec<Connector>>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn save(&self, session: ChargingSession) -> DomainResult<ChargingSession>;
    async fn update(&self, session: ChargingSession) -> DomainResult<ChargingSession>;
    async fn find_by_uuid(&self, session_uuid: &str) -> DomainResult<Option<ChargingSession>>;
    /// Lookup by the per-tenant integer transaction key.
    async fn find_by_transaction_id(
        &self,
        transaction_id: i64,
    ) -> DomainResult<Option<ChargingSession>>;
    /// The unique active session on a connector, if one exists.
    async fn find_active_for_connector(
        &self,
        station_id: &str,
        connector_id: u32,
    ) -> DomainResult<Option<ChargingSession>>;
    /// Most recent authorized-but-not-started session for an idTag.
    async fn find_authorized(
        &self,
        station_id: &str,
        id_tag: &str,
    ) -> DomainResult<Option<ChargingSession>>;
    async fn find_for_station(&self, station_id: &str) -> DomainResult<Vec<ChargingSession>>;
    async fn find_all(&self) -> DomainResult<Vec<ChargingSession>>;
    /// Allocate the next OCPP transaction id, unique within the bound tenant.
    async fn next_transaction_id(&self) -> DomainResult<i64>;
}

#[async_trait]
pub trait TariffRepository: Send + Sync {
    async fn save(&self, tariff: Tariff) -> DomainResult<Tariff>;
    async fn update(&self, tariff: Tariff) -> DomainResult<Tariff>;
    async fn find_by_code(&self, code: &str) -> DomainResult<Option<Tariff>>;
    async fn find_default(&self) -> DomainResult<Option<Tariff>>;
    async fn find_all(&self) -> DomainResult<Vec<Tariff>>;
    async fn delete(&self, code: &str) -> DomainResult<()>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn save(&self, user: User) -> DomainResult<User>;
    async fn update(&self, user: User) -> DomainResult<User>;
    async fn find_by_id(&self, id: &str) -> DomainResult<Option<User>>;
    async fn find_by_username(&self, username: &str) -> DomainResult<Option<User>>;
    async fn find_by_email(&self, email: &str) -> DomainResult<Option<User>>;
    async fn find_all(&self) -> DomainResult<Vec<User>>;
    async fn delete(&self, id: &str) -> DomainResult<()>;
}

#[async_trait]
pub trait AuthTokenRepository: Send + Sync {
    async fn save(&self, token: AuthToken) -> DomainResult<AuthToken>;
    async fn update(&self, token: AuthToken) -> DomainResult<AuthToken>;
    async fn find_by_value(&self, token_value: &str) -> DomainResult<Option<AuthToken>>;
    async fn find_all(&self) -> DomainResult<Vec<AuthToken>>;
}

/// Access point for all repositories; one instance per deployment.
pub trait RepositoryProvider: Send + Sync {
    fn tenants(&self) -> &dyn TenantRepository;
    fn stations(&self) -> &dyn StationRepository;
    fn connectors(&self) -> &dyn ConnectorRepository;
    fn sessions(&self) -> &dyn SessionRepository;
    fn tariffs(&self) -> &dyn TariffRepository;
    fn users(&self) -> &dyn UserRepository;
    fn auth_tokens(&self) -> &dyn AuthTokenRepository;
}
