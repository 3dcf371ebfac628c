//! Tenant resolution for incoming HTTP requests and OCPP handshakes.
//!
//! Resolution order for HTTP (first match wins): `X-Tenant-ID` header,
//! `tenantId` query parameter, subdomain, custom-domain mapping, JWT
//! `tenantId` claim, `/api/tenants/{code}/...` path segment. OCPP
//! handshakes use the first three only.

use async_trait::async_trait;

use crate::shared::errors::{DomainError, DomainResult};

/// Header and query-parameter names carrying an explicit tenant id.
pub const TENANT_HEADER: &str = "X-Tenant-ID";
pub const TENANT_QUERY_PARAM: &str = "tenantId";
/// OCPP handshakes also accept the shorter `?tenant=` form.
pub const TENANT_QUERY_PARAM_WS: &str = "tenant";

/// Path prefixes that never require a tenant.
const ALLOWLIST_PREFIXES: &[&str] = &[
    "/actuator",
    "/health",
    "/metrics",
    "/swagger",
    "/v3/api-docs",
    "/auth/login",
    "/auth/register",
    "/public",
];

/// Subdomain labels that never identify a tenant.
const RESERVED_SUBDOMAINS: &[&str] = &["www", "api"];

/// Registry lookups the resolver needs; implemented by the storage layer.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    /// Whether an active tenant with this code exists.
    async fn is_active_tenant(&self, code: &str) -> bool;
    /// Tenant code mapped to a custom domain, if any.
    async fn tenant_for_domain(&self, host: &str) -> Option<String>;
}

/// Everything extracted from the request before resolution runs.
#[derive(Debug, Default)]
pub struct RequestParts<'a> {
    pub tenant_header: Option<&'a str>,
    pub query: Option<&'a str>,
    pub host: Option<&'a str>,
    pub jwt_tenant: Option<&'a str>,
    pub path: &'a str,
}

/// Whether the path is on the unauthenticated allowlist.
pub fn is_allowlisted(path: &str) -> bool {
    if path == "/" {
        return true;
    }
    ALLOWLIST_PREFIXES
        .iter()
        .any(|prefix| path == *prefix || path.starts_with(&format!("{}/", prefix)))
}

/// Extract one parameter from a raw query string.
pub fn query_param<'a>(query: &'a str, key: &str) -> Option<&'a str> {
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == key && !v.is_empty()).then_some(v)
    })
}

/// Candidate tenant from the subdomain, excluding reserved labels.
fn subdomain_candidate(host: &str) -> Option<&str> {
    let host = host.split(':').next().unwrap_or(host);
    let (label, rest) = host.split_once('.')?;
    if rest.is_empty() || label.is_empty() {
        return None;
    }
    if RESERVED_SUBDOMAINS.contains(&label) {
        return None;
    }
    Some(label)
}

/// Candidate tenant from a `/api/tenants/{code}/...` path.
fn path_candidate(path: &str) -> Option<&str> {
    let rest = path.strip_prefix("/api/tenants/")?;
    let code = rest.split('/').next()?;
    (!code.is_empty()).then_some(code)
}

/// Resolve the tenant for an HTTP request.
///
/// Returns the tenant code, or `Validation` when no source matched a
/// non-allowlisted path.
pub async fn resolve_http(
    parts: &RequestParts<'_>,
    directory: &dyn TenantDirectory,
) -> DomainResult<Option<String>> {
    // 1. Explicit header
    if let Some(code) = parts.tenant_header {
        return Ok(Some(code.to_string()));
    }

    // 2. Query parameter
    if let Some(code) = parts.query.and_then(|q| query_param(q, TENANT_QUERY_PARAM)) {
        return Ok(Some(code.to_string()));
    }

    // 3. Subdomain, validated against the registry
    if let Some(candidate) = parts.host.and_then(subdomain_candidate) {
        if directory.is_active_tenant(candidate).await {
            return Ok(Some(candidate.to_string()));
        }
    }

    // 4. Custom-domain mapping from tenant metadata
    if let Some(host) = parts.host {
        let bare_host = host.split(':').next().unwrap_or(host);
        if let Some(code) = directory.tenant_for_domain(bare_host).await {
            return Ok(Some(code));
        }
    }

    // 5. JWT claim
    if let Some(code) = parts.jwt_tenant {
        return Ok(Some(code.to_string()));
    }

    // 6. Path segment
    if let Some(code) = path_candidate(parts.path) {
        return Ok(Some(code.to_string()));
    }

    if is_allowlisted(parts.path) {
        return Ok(None);
    }

    Err(DomainError::Validation(
        "Tenant identification required".into(),
    ))
}

/// Resolve the tenant for an OCPP WebSocket handshake: header, then query
/// parameter (`tenant` or `tenantId`), then subdomain.
pub fn resolve_ws(
    tenant_header: Option<&str>,
    query: Option<&str>,
    host: Option<&str>,
) -> Option<String> {
    if let Some(code) = tenant_header {
        return Some(code.to_string());
    }
    if let Some(q) = query {
        if let Some(code) =
            query_param(q, TENANT_QUERY_PARAM_WS).or_else(|| query_param(q, TENANT_QUERY_PARAM))
        {
            return Some(code.to_string());
        }
    }
    host.and_then(subdomain_candidate).map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FakeDirectory {
        active: Vec<&'static str>,
        domains: HashMap<&'static str, &'static str>,
    }

    #[async_trait]
    impl TenantDirectory for FakeDirectory {
        async fn is_active_tenant(&self, code: &str) -> bool {
            self.active.contains(&code)
        }

        async fn tenant_for_domain(&self, host: &str) -> Option<String> {
            self.domains.get(host).map(|s| s.to_string())
        }
    }

    fn directory() -> FakeDirectory {
        FakeDirectory {
            active: vec!["tenant1"],
            domains: HashMap::from([("charge.acme.example", "acme")]),
        }
    }

    #[tokio::test]
    async fn header_wins_over_everything() {
        let parts = RequestParts {
            tenant_header: Some("t-header"),
            query: Some("tenantId=t-query"),
            host: Some("tenant1.example.com"),
            jwt_tenant: Some("t-jwt"),
            path: "/api/v1/stations",
        };
        let resolved = resolve_http(&parts, &directory()).await.unwrap();
        assert_eq!(resolved.as_deref(), Some("t-header"));
    }

    #[tokio::test]
    async fn query_param_beats_subdomain() {
        let parts = RequestParts {
            query: Some("a=b&tenantId=t-query"),
            host: Some("tenant1.example.com"),
            path: "/api/v1/stations",
            ..Default::default()
        };
        let resolved = resolve_http(&parts, &directory()).await.unwrap();
        assert_eq!(resolved.as_deref(), Some("t-query"));
    }

    #[tokio::test]
    async fn subdomain_requires_registry_match() {
        let parts = RequestParts {
            host: Some("tenant1.example.com:8080"),
            jwt_tenant: Some("t-jwt"),
            path: "/api/v1/stations",
            ..Default::default()
        };
        let resolved = resolve_http(&parts, &directory()).await.unwrap();
        assert_eq!(resolved.as_deref(), Some("tenant1"));

        // Unknown subdomain falls through to the JWT claim
        let parts = RequestParts {
            host: Some("ghost.example.com"),
            jwt_tenant: Some("t-jwt"),
            path: "/api/v1/stations",
            ..Default::default()
        };
        let resolved = resolve_http(&parts, &directory()).await.unwrap();
        assert_eq!(resolved.as_deref(), Some("t-jwt"));
    }

    #[tokio::test]
    async fn www_and_api_subdomains_are_reserved() {
        for host in ["www.example.com", "api.example.com"] {
            let parts = RequestParts {
                host: Some(host),
                path: "/api/tenants/acme/stations",
                ..Default::default()
            };
            let resolved = resolve_http(&parts, &directory()).await.unwrap();
            assert_eq!(resolved.as_deref(), Some("acme"), "host {}", host);
        }
    }

    #[tokio::test]
    async fn custom_domain_mapping() {
        let parts = RequestParts {
            host: Some("charge.acme.example"),
            path: "/api/v1/stations",
            ..Default::default()
        };
        let resolved = resolve_http(&parts, &directory()).await.unwrap();
        assert_eq!(resolved.as_deref(), Some("acme"));
    }

    #[tokio::test]
    async fn miss_on_protected_path_is_an_error() {
        let parts = RequestParts {
            path: "/api/v1/stations",
            ..Default::default()
        };
        let err = resolve_http(&parts, &directory()).await.unwrap_err();
        assert!(err.to_string().contains("Tenant identification required"));
    }

    #[tokio::test]
    async fn miss_on_allowlisted_path_is_none() {
        for path in ["/", "/health", "/metrics", "/swagger/index.html", "/auth/login"] {
            let parts = RequestParts {
                path,
                ..Default::default()
            };
            let resolved = resolve_http(&parts, &directory()).await.unwrap();
            assert!(resolved.is_none(), "path {}", path);
        }
    }

    #[test]
    fn allowlist_is_prefix_based_but_exact_for_root() {
        assert!(is_allowlisted("/"));
        assert!(is_allowlisted("/actuator/info"));
        assert!(is_allowlisted("/v3/api-docs/swagger-config"));
        assert!(!is_allowlisted("/healthz"));
        assert!(!is_allowlisted("/api/v1/stations"));
    }

    #[test]
    fn ws_resolution_order() {
        assert_eq!(
            resolve_ws(Some("t1"), Some("tenant=t2"), Some("t3.example.com")),
            Some("t1".into())
        );
        assert_eq!(
            resolve_ws(None, Some("tenant=t2"), Some("t3.example.com")),
            Some("t2".into())
        );
        assert_eq!(
            resolve_ws(None, Some("tenantId=t2b"), None),
            Some("t2b".into())
        );
        assert_eq!(
            resolve_ws(None, None, Some("t3.example.com")),
            Some("t3".into())
        );
        assert_eq!(resolve_ws(None, None, Some("www.example.com")), None);
        assert_eq!(resolve_ws(None, None, None), None);
    }
}
