//! Tenant domain entity
//!
//! A tenant is an isolated customer organisation. Tenants are created
//! active, may be suspended and re-activated, and are never deleted.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::audit::{AuditRecord, TenantScoped};
use crate::shared::errors::{DomainError, DomainResult};

/// Tenant organisation type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TenantType {
    /// Charge point operator
    Cpo,
    /// E-mobility service provider
    Emsp,
    Hub,
    Enterprise,
    Demo,
    Internal,
}

/// Features a tenant can have enabled
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TenantFeature {
    Ocpp16,
    Ocpp201,
    Ocpi221,
    SmartCharging,
    Reservations,
    RemoteCommands,
}

/// Embedded per-tenant configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantConfig {
    pub timezone: String,
    /// ISO 4217 currency used for tariffs without an explicit currency
    pub currency: String,
    pub max_stations: u32,
    pub max_users: u32,
    /// Default command timeout towards stations (seconds)
    pub command_timeout_secs: u64,
    pub webhook_url: Option<String>,
    pub branding_name: Option<String>,
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
            currency: "EUR".to_string(),
            max_stations: 1000,
            max_users: 500,
            command_timeout_secs: 300,
            webhook_url: None,
            branding_name: None,
        }
    }
}

/// Contact sub-record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TenantContact {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Billing sub-record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TenantBilling {
    pub company_name: Option<String>,
    pub vat_number: Option<String>,
    pub address: Option<String>,
}

/// Tenant aggregate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    /// Stable unique code, 1-50 chars
    pub code: String,
    pub name: String,
    pub tenant_type: TenantType,
    pub active: bool,
    pub suspension_reason: Option<String>,
    pub suspended_at: Option<DateTime<Utc>>,
    pub config: TenantConfig,
    pub contact: TenantContact,
    pub billing: TenantBilling,
    pub features: BTreeSet<TenantFeature>,
    /// Opaque key-value metadata; `custom_domain` participates in HTTP
    /// tenant resolution.
    pub metadata: BTreeMap<String, String>,
    pub audit: AuditRecord,
}

impl Tenant {
    pub fn new(code: impl Into<String>, name: impl Into<String>, tenant_type: TenantType) -> Self {
        let code = code.into();
        let mut features = BTreeSet::new();
        features.insert(TenantFeature::Ocpp16);
        features.insert(TenantFeature::Ocpp201);
        Self {
            audit: AuditRecord::for_tenant(&code),
            code,
            name: name.into(),
            tenant_type,
            active: true,
            suspension_reason: None,
            suspended_at: None,
            config: TenantConfig::default(),
            contact: TenantContact::default(),
            billing: TenantBilling::default(),
            features,
            metadata: BTreeMap::new(),
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.code.is_empty() || self.code.len() > 50 {
            return Err(DomainError::Validation(
                "tenant code must be 1-50 characters".into(),
            ));
        }
        if !self
            .code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(DomainError::Validation(
                "tenant code may contain only alphanumerics, '_' and '-'".into(),
            ));
        }
        Ok(())
    }

    /// Suspend the tenant. A suspended tenant fails `validate_current_tenant`
    /// checks and its stations are rejected at handshake.
    pub fn suspend(&mut self, reason: impl Into<String>) {
        self.active = false;
        self.suspension_reason = Some(reason.into());
        self.suspended_at = Some(Utc::now());
    }

    pub fn activate(&mut self) {
        self.active = true;
        self.suspension_reason = None;
        self.suspended_at = None;
    }

    pub fn has_feature(&self, feature: TenantFeature) -> bool {
        self.features.contains(&feature)
    }

    pub fn custom_domain(&self) -> Option<&str> {
        self.metadata.get("custom_domain").map(String::as_str)
    }
}

impl TenantScoped for Tenant {
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

    #[test]
    fn new_tenant_is_active() {
        let t = Tenant::new("acme", "Acme Mobility", TenantType::Cpo);
        assert!(t.active);
        assert!(t.validate().is_ok());
        assert!(t.has_feature(TenantFeature::Ocpp16));
    }

    #[test]
    fn suspend_records_reason() {
        let mut t = Tenant::new("acme", "Acme Mobility", TenantType::Cpo);
        t.suspend("unpaid invoices");
        assert!(!t.active);
        assert_eq!(t.suspension_reason.as_deref(), Some("unpaid invoices"));

        t.activate();
        assert!(t.active);
        assert!(t.suspension_reason.is_none());
    }

    #[test]
    fn validate_rejects_bad_codes() {
        assert!(Tenant::new("", "x", TenantType::Demo).validate().is_err());
        assert!(Tenant::new("a".repeat(51), "x", TenantType::Demo)
            .validate()
            .is_err());
        assert!(Tenant::new("has space", "x", TenantType::Demo)
            .validate()
            .is_err());
    }

    #[test]
    fn custom_domain_from_metadata() {
        let mut t = Tenant::new("acme", "Acme", TenantType::Cpo);
        assert!(t.custom_domain().is_none());
        t.metadata
            .insert("custom_domain".into(), "charge.acme.example".into());
        assert_eq!(t.custom_domain(), Some("charge.acme.example"));
    }
}
