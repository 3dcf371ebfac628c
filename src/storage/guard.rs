//! Tenant guard — the persistence hook enforcing the tenancy invariants.
//!
//! Runs on every insert and update of a tenant-scoped entity:
//! - insert with a null `tenant_id` fills it from the bound context;
//! - insert with a foreign `tenant_id` fails with *tenant mismatch*;
//! - update may never change `tenant_id` (*tenant immutable*);
//! - update checks the optimistic-lock `version` and bumps it.

use crate::domain::audit::TenantScoped;
use crate::shared::errors::{DomainError, DomainResult};
use crate::tenant::TenantContext;

/// Prepare an entity for insert under the bound tenant.
pub fn guard_insert<E: TenantScoped>(entity: &mut E) -> DomainResult<()> {
    let ctx = TenantContext::require()?;
    match entity.audit().tenant_id.as_deref() {
        None => {
            entity.audit_mut().tenant_id = Some(ctx.tenant_id().to_string());
        }
        Some(id) if id == ctx.tenant_id() => {}
        Some(_) => return Err(DomainError::tenant_mismatch()),
    }
    Ok(())
}

/// Validate an update of `incoming` over `existing` and bump the version.
pub fn guard_update<E: TenantScoped>(existing: &E, incoming: &mut E) -> DomainResult<()> {
    let ctx = TenantContext::require()?;

    let existing_tenant = existing.audit().tenant_id.as_deref();
    if existing_tenant != Some(ctx.tenant_id()) {
        // The row belongs to another tenant; to the caller it does not exist.
        return Err(DomainError::tenant_mismatch());
    }
    if incoming.audit().tenant_id.as_deref() != existing_tenant {
        return Err(DomainError::tenant_immutable());
    }
    if incoming.audit().version != existing.audit().version {
        return Err(DomainError::VersionConflict {
            entity: "entity",
            expected: existing.audit().version,
        });
    }
    incoming.audit_mut().touch(None);
    Ok(())
}

/// Whether a stored row is visible in the bound tenant context.
pub fn visible<E: TenantScoped>(entity: &E) -> bool {
    match TenantContext::current() {
        Some(ctx) => entity.audit().tenant_id.as_deref() == Some(ctx.tenant_id()),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AuthToken, TokenType};

    #[test]
    fn insert_fills_tenant_from_context() {
        TenantContext::new("t1").sync_scope(|| {
            let mut token = AuthToken::new("RFID-1", TokenType::Rfid);
            guard_insert(&mut token).unwrap();
            assert_eq!(token.audit.tenant_id.as_deref(), Some("t1"));
        });
    }

    #[test]
    fn insert_rejects_foreign_tenant() {
        TenantContext::new("t1").sync_scope(|| {
            let mut token = AuthToken::new("RFID-1", TokenType::Rfid);
            token.audit.tenant_id = Some("t2".into());
            let err = guard_insert(&mut token).unwrap_err();
            assert!(err.to_string().contains("tenant mismatch"));
        });
    }

    #[test]
    fn insert_requires_a_bound_tenant() {
        let mut token = AuthToken::new("RFID-1", TokenType::Rfid);
        assert!(guard_insert(&mut token).is_err());
    }

    #[test]
    fn update_rejects_tenant_change() {
        TenantContext::new("t1").sync_scope(|| {
            let mut existing = AuthToken::new("RFID-1", TokenType::Rfid);
            guard_insert(&mut existing).unwrap();

            let mut moved = existing.clone();
            moved.audit.tenant_id = Some("t2".into());
            let err = guard_update(&existing, &mut moved).unwrap_err();
            assert!(err.to_string().contains("tenant immutable"));
        });
    }

    #[test]
    fn update_rejects_rows_of_other_tenants() {
        let mut existing = AuthToken::new("RFID-1", TokenType::Rfid);
        TenantContext::new("t1").sync_scope(|| guard_insert(&mut existing)).unwrap();

        TenantContext::new("t2").sync_scope(|| {
            let mut incoming = existing.clone();
            assert!(guard_update(&existing, &mut incoming).is_err());
        });
    }

    #[test]
    fn update_checks_and_bumps_version() {
        TenantContext::new("t1").sync_scope(|| {
            let mut existing = AuthToken::new("RFID-1", TokenType::Rfid);
            guard_insert(&mut existing).unwrap();

            let mut fresh = existing.clone();
            guard_update(&existing, &mut fresh).unwrap();
            assert_eq!(fresh.audit.version, existing.audit.version + 1);

            // A stale copy (old version) is rejected
            let mut stale = existing.clone();
            stale.audit.version = existing.audit.version.wrapping_sub(1);
            assert!(guard_update(&existing, &mut stale).is_err());
        });
    }

    #[test]
    fn visibility_is_tenant_scoped() {
        let mut token = AuthToken::new("RFID-1", TokenType::Rfid);
        TenantContext::new("t1").sync_scope(|| guard_insert(&mut token)).unwrap();

        assert!(TenantContext::new("t1").sync_scope(|| visible(&token)));
        assert!(!TenantContext::new("t2").sync_scope(|| visible(&token)));
        assert!(!visible(&token), "unbound context sees nothing");
    }
}
