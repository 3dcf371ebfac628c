//! Embedded audit record carried by every tenant-scoped entity.
//!
//! Composition instead of an abstract base entity: each aggregate embeds an
//! `AuditRecord` and the storage adapter reads/writes it generically via
//! [`TenantScoped`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Auditing and tenancy columns shared by all tenant-scoped rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct AuditRecord {
    /// Owning tenant. Filled from the bound context on first insert and
    /// immutable afterwards.
    pub tenant_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<String>,
    /// Monotonic version for optimistic locking.
    pub version: u64,
}

impl AuditRecord {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            tenant_id: None,
            created_at: now,
            updated_at: now,
            created_by: None,
            updated_by: None,
            deleted: false,
            deleted_at: None,
            deleted_by: None,
            version: 0,
        }
    }

    /// Audit record pre-bound to a tenant (used by fixtures and seeding).
    pub fn for_tenant(tenant_id: impl Into<String>) -> Self {
        let mut record = Self::new();
        record.tenant_id = Some(tenant_id.into());
        record
    }

    pub fn touch(&mut self, by: Option<&str>) {
        self.updated_at = Utc::now();
        self.updated_by = by.map(String::from);
        self.version += 1;
    }

    pub fn mark_deleted(&mut self, by: Option<&str>) {
        self.deleted = true;
        self.deleted_at = Some(Utc::now());
        self.deleted_by = by.map(String::from);
        self.touch(by);
    }
}

impl Default for AuditRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// Implemented by every entity the tenant guard protects.
///
/// The storage adapter uses these accessors to enforce the tenancy
/// invariants without reflection.
pub trait TenantScoped {
    fn audit(&self) -> &AuditRecord;
    fn audit_mut(&mut self) -> &mut AuditRecord;

    fn tenant_id(&self) -> Option<&str> {
        self.audit().tenant_id.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touch_bumps_version() {
        let mut record = AuditRecord::new();
        assert_eq!(record.version, 0);
        record.touch(Some("operator"));
        assert_eq!(record.version, 1);
        assert_eq!(record.updated_by.as_deref(), Some("operator"));
    }

    #[test]
    fn mark_deleted_sets_tombstone() {
        let mut record = AuditRecord::for_tenant("t1");
        record.mark_deleted(None);
        assert!(record.deleted);
        assert!(record.deleted_at.is_some());
        assert_eq!(record.tenant_id.as_deref(), Some("t1"));
    }
}
