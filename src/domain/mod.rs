//! Core business entities and value objects.
//!
//! Every tenant-scoped aggregate embeds an [`audit::AuditRecord`] and
//! implements [`audit::TenantScoped`] so the storage adapter can enforce
//! the tenancy invariants without reflection.

pub mod audit;
pub mod connector;
pub mod ocpp;
pub mod session;
pub mod station;
pub mod tariff;
pub mod tenant;
pub mod user;

pub use audit::{AuditRecord, TenantScoped};
pub use connector::{
    Connector, ConnectorErrorCode, ConnectorReservation, ConnectorStatus, PowerType,
};
pub use ocpp::OcppVersion;
pub use session::{
    ChargingSession, Measurand, MeterLocation, MeterValue, PricingSnapshot, ReadingContext,
    SessionCosts, SessionStatus, StatusHistoryEntry, StopReason,
};
pub use station::{ChargingStation, GeoLocation, StationProtocol};
pub use tariff::{PriceComponent, Tariff, TariffElement, TariffType};
pub use tenant::{Tenant, TenantConfig, TenantFeature, TenantType};
pub use user::{AuthToken, Permission, Role, TokenStatus, TokenType, User};
