//! Error taxonomy shared by the OCPP gateway, the charging core and the
//! HTTP edge.
//!
//! OCPP handlers return `Result<Value, OcppError>` so the router can frame
//! a CALLERROR without catching; everything else speaks `DomainError`.

use thiserror::Error;

use crate::shared::ocpp_frame::OcppErrorCode;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Not found: {entity} with {field}={value}")]
    NotFound {
        entity: &'static str,
        field: &'static str,
        value: String,
    },

    #[error("Validation: {0}")]
    Validation(String),

    #[error("Already exists: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Security: {0}")]
    Security(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid session state: {from} -> {to}")]
    InvalidSessionState { from: String, to: String },

    #[error("Station {0} is not connected")]
    StationOffline(String),

    #[error("Command timeout for {0}")]
    CommandTimeout(String),

    #[error("Concurrent update on {entity} (expected version {expected})")]
    VersionConflict { entity: &'static str, expected: u64 },
}

impl DomainError {
    /// Tenant-guard violation: entity carries a different tenant than the
    /// bound context.
    pub fn tenant_mismatch() -> Self {
        Self::Security("tenant mismatch".into())
    }

    /// Tenant-guard violation: an update tried to move a row between tenants.
    pub fn tenant_immutable() -> Self {
        Self::Security("tenant immutable".into())
    }
}

pub type DomainResult<T> = Result<T, DomainError>;

// ── OCPP handler errors ────────────────────────────────────────

/// Error returned by an OCPP action handler.
///
/// The router frames this as `[4, messageId, code, description, details]`.
#[derive(Debug, Clone)]
pub struct OcppError {
    pub code: OcppErrorCode,
    pub description: String,
    pub details: serde_json::Value,
}

impl OcppError {
    pub fn new(code: OcppErrorCode, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
            details: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn not_implemented(action: &str) -> Self {
        Self::new(
            OcppErrorCode::NotImplemented,
            format!("Action '{}' is not implemented", action),
        )
    }

    pub fn internal(description: impl Into<String>) -> Self {
        Self::new(OcppErrorCode::InternalError, description)
    }

    /// Payload failed schema validation. The code differs per OCPP version
    /// (FormationViolation in 1.6, FormatViolation in 2.0.1).
    pub fn malformed_payload(
        version: crate::domain::OcppVersion,
        description: impl Into<String>,
    ) -> Self {
        Self::new(OcppErrorCode::formation_violation(version), description)
    }

    pub fn property_constraint(description: impl Into<String>) -> Self {
        Self::new(OcppErrorCode::PropertyConstraintViolation, description)
    }
}

impl std::fmt::Display for OcppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.description)
    }
}

impl std::error::Error for OcppError {}

impl From<DomainError> for OcppError {
    fn from(err: DomainError) -> Self {
        match &err {
            DomainError::Security(msg) => Self::new(OcppErrorCode::SecurityError, msg.clone()),
            DomainError::Validation(msg) => {
                Self::new(OcppErrorCode::PropertyConstraintViolation, msg.clone())
            }
            _ => Self::internal(err.to_string()),
        }
    }
}
