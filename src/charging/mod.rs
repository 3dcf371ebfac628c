//! Charging core: the transaction lifecycle orchestrator and the tariff
//! engine it prices completed sessions with.

pub mod service;
pub mod sweeps;
pub mod tariff_engine;

pub use service::{ChargingService, ReportedStatus, StartOutcome, StopOutcome};
