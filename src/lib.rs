//! # VoltGrid CSMS
//!
//! Multi-tenant Charging Station Management System: the server side of
//! OCPP 1.6 and 2.0.1.
//!
//! - **shared**: cross-cutting utilities (errors, OCPP-J framing, shutdown)
//! - **tenant**: per-unit-of-work tenant binding and request resolution
//! - **domain**: business entities and the session state machine
//! - **ocpp**: WebSocket gateway, session registry, router, handlers
//! - **charging**: lifecycle orchestration and the tariff engine
//! - **storage**: repository traits, tenant guard, in-memory adapter
//! - **auth**: JWT, passwords, HTTP middleware
//! - **http**: operator REST API
//! - **config**: TOML + env application configuration

pub mod auth;
pub mod charging;
pub mod config;
pub mod domain;
pub mod http;
pub mod ocpp;
pub mod shared;
pub mod storage;
pub mod tenant;

pub use charging::ChargingService;
pub use config::AppConfig;
pub use http::{create_api_router, AppState};
pub use ocpp::{CommandDispatcher, MessageRouter, OcppSession, SessionRegistry};
pub use shared::{DomainError, DomainResult, OcppFrame};
pub use storage::InMemoryRepositoryProvider;
pub use tenant::TenantContext;
