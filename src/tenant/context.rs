//! Tenant binding for the current unit of work.
//!
//! Every unit of work (an HTTP request, an OCPP frame, a scheduled sweep)
//! runs with exactly one bound tenant. The binding is a task-local context
//! value: entered with [`TenantContext::scope`] at the edge and read by the
//! storage guard at insert/update time. It is never process-global; any
//! spawned task must re-enter the scope explicitly with a captured clone.

use std::sync::Arc;

use crate::shared::errors::{DomainError, DomainResult};

tokio::task_local! {
    static CURRENT_TENANT: TenantContext;
}

/// The tenant bound to the current unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    tenant_id: Arc<str>,
}

impl TenantContext {
    pub fn new(tenant_id: impl AsRef<str>) -> Self {
        Self {
            tenant_id: Arc::from(tenant_id.as_ref()),
        }
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// The context bound to the current task, if any.
    pub fn current() -> Option<TenantContext> {
        CURRENT_TENANT.try_with(|ctx| ctx.clone()).ok()
    }

    /// The context bound to the current task, or a security error: work
    /// that touches tenant-scoped state must never run unbound.
    pub fn require() -> DomainResult<TenantContext> {
        Self::current()
            .ok_or_else(|| DomainError::Security("no tenant bound to the current task".into()))
    }

    /// Run a future with this tenant bound. The binding covers the whole
    /// future, including every await point, but not tasks it spawns;
    /// those capture a clone and re-enter the scope themselves.
    pub async fn scope<F>(self, fut: F) -> F::Output
    where
        F: std::future::Future,
    {
        CURRENT_TENANT.scope(self, fut).await
    }

    /// Synchronous variant for non-async units of work (tests, helpers).
    pub fn sync_scope<R>(self, f: impl FnOnce() -> R) -> R {
        CURRENT_TENANT.sync_scope(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scope_binds_and_unbinds() {
        assert!(TenantContext::current().is_none());

        let ctx = TenantContext::new("t1");
        ctx.clone()
            .scope(async {
                assert_eq!(TenantContext::current().unwrap().tenant_id(), "t1");
                // Nested scope shadows the outer binding
                TenantContext::new("t2")
                    .scope(async {
                        assert_eq!(TenantContext::current().unwrap().tenant_id(), "t2");
                    })
                    .await;
                assert_eq!(TenantContext::current().unwrap().tenant_id(), "t1");
            })
            .await;

        assert!(TenantContext::current().is_none());
    }

    #[tokio::test]
    async fn spawned_tasks_do_not_inherit() {
        let ctx = TenantContext::new("t1");
        ctx.scope(async {
            let handle = tokio::spawn(async { TenantContext::current() });
            assert!(handle.await.unwrap().is_none());
        })
        .await;
    }

    #[test]
    fn require_fails_unbound() {
        assert!(TenantContext::require().is_err());
        let bound = TenantContext::new("t9").sync_scope(|| TenantContext::require());
        assert_eq!(bound.unwrap().tenant_id(), "t9");
    }
}
