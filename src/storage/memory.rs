//! In-memory repository adapter.
//!
//! Backs the repository traits with `DashMap`s keyed by
//! `(tenant_id, natural key)`. Every read filters through the bound tenant
//! context and every write runs the guard hook, so the tenancy invariants
//! hold exactly as they would with the SQL adapter in front of the
//! documented schema.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use super::guard::{guard_insert, guard_update};
use super::traits::{
    AuthTokenRepository, ConnectorRepository, RepositoryProvider, SessionRepository,
    StationRepository, TariffRepository, TenantRepository, UserRepository,
};
use crate::domain::audit::TenantScoped;
use crate::domain::{
    AuthToken, ChargingSession, ChargingStation, Connector, Tariff, Tenant, User,
};
use crate::shared::errors::{DomainError, DomainResult};
use crate::tenant::resolver::TenantDirectory;
use crate::tenant::TenantContext;

type TenantKey = (String, String);

#[derive(Default)]
struct Store {
    tenants: DashMap<String, Tenant>,
    stations: DashMap<TenantKey, ChargingStation>,
    connectors: DashMap<(String, String, u32), Connector>,
    sessions: DashMap<TenantKey, ChargingSession>,
    tariffs: DashMap<TenantKey, Tariff>,
    users: DashMap<TenantKey, User>,
    auth_tokens: DashMap<TenantKey, AuthToken>,
    transaction_counters: DashMap<String, i64>,
}

fn bound_tenant() -> DomainResult<String> {
    Ok(TenantContext::require()?.tenant_id().to_string())
}

/// Verify a stored row belongs to the bound tenant; used on updates where
/// the key already encodes the tenant.
fn owned_by<E: TenantScoped>(entity: &E, tenant: &str) -> bool {
    entity.audit().tenant_id.as_deref() == Some(tenant)
}

// ── Tenants (global registry) ──────────────────────────────────

struct MemTenantRepo(Arc<Store>);

#[async_trait]
impl TenantRepository for MemTenantRepo {
    async fn save(&self, tenant: Tenant) -> DomainResult<Tenant> {
        tenant.validate()?;
        if self.0.tenants.contains_key(&tenant.code) {
            return Err(DomainError::Conflict(format!(
                "tenant '{}' already exists",
                tenant.code
            )));
        }
        self.0.tenants.insert(tenant.code.clone(), tenant.clone());
        Ok(tenant)
    }

    async fn update(&self, mut tenant: Tenant) -> DomainResult<Tenant> {
        let mut entry = self.0.tenants.get_mut(&tenant.code).ok_or_else(|| {
            DomainError::NotFound {
                entity: "Tenant",
                field: "code",
                value: tenant.code.clone(),
            }
        })?;
        if tenant.audit.version != entry.audit.version {
            return Err(DomainError::VersionConflict {
                entity: "Tenant",
                expected: entry.audit.version,
            });
        }
        tenant.audit.touch(None);
        *entry = tenant.clone();
        Ok(tenant)
    }

    async fn find_by_code(&self, code: &str) -> DomainResult<Option<Tenant>> {
        Ok(self.0.tenants.get(code).map(|t| t.clone()))
    }

    async fn find_all(&self) -> DomainResult<Vec<Tenant>> {
        Ok(self.0.tenants.iter().map(|t| t.clone()).collect())
    }
}

// ── Stations ───────────────────────────────────────────────────

struct MemStationRepo(Arc<Store>);

#[async_trait]
impl StationRepository for MemStationRepo {
    async fn save(&self, mut station: ChargingStation) -> DomainResult<ChargingStation> {
        station.validate()?;
        guard_insert(&mut station)?;
        let tenant = bound_tenant()?;
        let key = (tenant, station.station_id.clone());
        if self.0.stations.contains_key(&key) {
            return Err(DomainError::Conflict(format!(
                "station '{}' already exists",
                station.station_id
            )));
        }
        self.0.stations.insert(key, station.clone());
        Ok(station)
    }

    async fn update(&self, mut station: ChargingStation) -> DomainResult<ChargingStation> {
        station.validate()?;
        let tenant = bound_tenant()?;
        let key = (tenant, station.station_id.clone());
        let mut entry = self.0.stations.get_mut(&key).ok_or_else(|| {
            DomainError::NotFound {
                entity: "ChargingStation",
                field: "station_id",
                value: station.station_id.clone(),
            }
        })?;
        guard_update(&*entry, &mut station)?;
        *entry = station.clone();
        Ok(station)
    }

    async fn find_by_id(&self, station_id: &str) -> DomainResult<Option<ChargingStation>> {
        let tenant = bound_tenant()?;
        Ok(self
            .0
            .stations
            .get(&(tenant, station_id.to_string()))
            .filter(|s| !s.audit.deleted)
            .map(|s| s.clone()))
    }

    async fn find_all(&self) -> DomainResult<Vec<ChargingStation>> {
        let tenant = bound_tenant()?;
        Ok(self
            .0
            .stations
            .iter()
            .filter(|e| owned_by(e.value(), &tenant) && !e.audit.deleted)
            .map(|e| e.clone())
            .collect())
    }

    async fn delete(&self, station_id: &str) -> DomainResult<()> {
        let tenant = bound_tenant()?;
        let key = (tenant, station_id.to_string());
        match self.0.stations.get_mut(&key) {
            Some(mut entry) => {
                entry.audit_mut().mark_deleted(None);
                Ok(())
            }
            None => Err(DomainError::NotFound {
                entity: "ChargingStation",
                field: "station_id",
                value: station_id.to_string(),
            }),
        }
    }
}

// ── Connectors ─────────────────────────────────────────────────

struct MemConnectorRepo(Arc<Store>);

#[async_trait]
impl ConnectorRepository for MemConnectorRepo {
    async fn save(&self, mut connector: Connector) -> DomainResult<Connector> {
        connector.validate()?;
        guard_insert(&mut connector)?;
        let tenant = bound_tenant()?;
        let key = (tenant, connector.station_id.clone(), connector.connector_id);
        if self.0.connectors.contains_key(&key) {
            return Err(DomainError::Conflict(format!(
                "connector {}/{} already exists",
                connector.station_id, connector.connector_id
            )));
        }
        self.0.connectors.insert(key, connector.clone());
        Ok(connector)
    }

    async fn update(&self, mut connector: Connector) -> DomainResult<Connector> {
        let tenant = bound_tenant()?;
        let key = (tenant, connector.station_id.clone(), connector.connector_id);
        let mut entry = self.0.connectors.get_mut(&key).ok_or_else(|| {
            DomainError::NotFound {
                entity: "Connector",
                field: "connector_id",
                value: format!("{}/{}", connector.station_id, connector.connector_id),
            }
        })?;
        guard_update(&*entry, &mut connector)?;
        *entry = connector.clone();
        Ok(connector)
    }

    async fn find(&self, station_id: &str, connector_id: u32) -> DomainResult<Option<Connector>> {
        let tenant = bound_tenant()?;
        Ok(self
            .0
            .connectors
            .get(&(tenant, station_id.to_string(), connector_id))
            .map(|c| c.clone()))
    }

    async fn find_for_station(&self, station_id: &str) -> DomainResult<Vec<Connector>> {
        let tenant = bound_tenant()?;
        let mut connectors: Vec<Connector> = self
            .0
            .connectors
            .iter()
            .filter(|e| {
                let (t, s, _) = e.key();
                *t == tenant && s == station_id
            })
            .map(|e| e.clone())
            .collect();
        connectors.sort_by_key(|c| c.connector_id);
        Ok(connectors)
    }

    async fn find_reserved(&self) -> DomainResult<Vec<Connector>> {
        let tenant = bound_tenant()?;
        Ok(self
            .0
            .connectors
            .iter()
            .filter(|e| owned_by(e.value(), &tenant) && e.reservation.is_some())
            .map(|e| e.clone())
            .collect())
    }
}

// ── Charging sessions ──────────────────────────────────────────

struct MemSessionRepo(Arc<Store>);

#[async_trait]
impl SessionRepository for MemSessionRepo {
    async fn save(&self, mut session: ChargingSession) -> DomainResult<ChargingSession> {
        guard_insert(&mut session)?;
        let tenant = bound_tenant()?;
        let key = (tenant, session.session_uuid.clone());
        if self.0.sessions.contains_key(&key) {
            return Err(DomainError::Conflict(format!(
                "session '{}' already exists",
                session.session_uuid
            )));
        }
        self.0.sessions.insert(key, session.clone());
        Ok(session)
    }

    async fn update(&self, mut session: ChargingSession) -> DomainResult<ChargingSession> {
        let tenant = bound_tenant()?;
        let key = (tenant, session.session_uuid.clone());
        let mut entry = self.0.sessions.get_mut(&key).ok_or_else(|| {
            DomainError::NotFound {
                entity: "ChargingSession",
                field: "session_uuid",
                value: session.session_uuid.clone(),
            }
        })?;
        // ocpp_transaction_id is immutable once set
        if let (Some(old), Some(new)) = (entry.ocpp_transaction_id, session.ocpp_transaction_id) {
            if old != new {
                return Err(DomainError::InvalidState(
                    "ocpp transaction id is immutable".into(),
                ));
            }
        }
        guard_update(&*entry, &mut session)?;
        *entry = session.clone();
        Ok(session)
    }

    async fn find_by_uuid(&self, session_uuid: &str) -> DomainResult<Option<ChargingSession>> {
        let tenant = bound_tenant()?;
        Ok(self
            .0
            .sessions
            .get(&(tenant, session_uuid.to_string()))
            .map(|s| s.clone()))
    }

    async fn find_by_transaction_id(
        &self,
        transaction_id: i64,
    ) -> DomainResult<Option<ChargingSession>> {
        let tenant = bound_tenant()?;
        Ok(self
            .0
            .sessions
            .iter()
            .find(|e| {
                owned_by(e.value(), &tenant) && e.ocpp_transaction_id == Some(transaction_id)
            })
            .map(|e| e.clone()))
    }

    async fn find_active_for_connector(
        &self,
        station_id: &str,
        connector_id: u32,
    ) -> DomainResult<Option<ChargingSession>> {
        let tenant = bound_tenant()?;
        Ok(self
            .0
            .sessions
            .iter()
            .find(|e| {
                owned_by(e.value(), &tenant)
                    && e.station_id == station_id
                    && e.connector_id == Some(connector_id)
                    && e.status.is_active()
            })
            .map(|e| e.clone()))
    }

    async fn find_authorized(
        &self,
        station_id: &str,
        id_tag: &str,
    ) -> DomainResult<Option<ChargingSession>> {
        let tenant = bound_tenant()?;
        let mut candidates: Vec<ChargingSession> = self
            .0
            .sessions
            .iter()
            .filter(|e| {
                owned_by(e.value(), &tenant)
                    && e.station_id == station_id
                    && e.ocpp_id_tag.as_deref() == Some(id_tag)
                    && e.status == crate::domain::SessionStatus::Authorized
            })
            .map(|e| e.clone())
            .collect();
        candidates.sort_by_key(|s| s.authorization_time);
        Ok(candidates.pop())
    }

    async fn find_for_station(&self, station_id: &str) -> DomainResult<Vec<ChargingSession>> {
        let tenant = bound_tenant()?;
        Ok(self
            .0
            .sessions
            .iter()
            .filter(|e| owned_by(e.value(), &tenant) && e.station_id == station_id)
            .map(|e| e.clone())
            .collect())
    }

    async fn find_all(&self) -> DomainResult<Vec<ChargingSession>> {
        let tenant = bound_tenant()?;
        Ok(self
            .0
            .sessions
            .iter()
            .filter(|e| owned_by(e.value(), &tenant))
            .map(|e| e.clone())
            .collect())
    }

    async fn next_transaction_id(&self) -> DomainResult<i64> {
        let tenant = bound_tenant()?;
        let mut counter = self.0.transaction_counters.entry(tenant).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }
}

// ── Tariffs ────────────────────────────────────────────────────

struct MemTariffRepo(Arc<Store>);

#[async_trait]
impl TariffRepository for MemTariffRepo {
    async fn save(&self, mut tariff: Tariff) -> DomainResult<Tariff> {
        tariff.validate()?;
        guard_insert(&mut tariff)?;
        let tenant = bound_tenant()?;
        let key = (tenant, tariff.code.clone());
        if self.0.tariffs.contains_key(&key) {
            return Err(DomainError::Conflict(format!(
                "tariff '{}' already exists",
                tariff.code
            )));
        }
        self.0.tariffs.insert(key, tariff.clone());
        Ok(tariff)
    }

    async fn update(&self, mut tariff: Tariff) -> DomainResult<Tariff> {
        tariff.validate()?;
        let tenant = bound_tenant()?;
        let key = (tenant, tariff.code.clone());
        let mut entry = self.0.tariffs.get_mut(&key).ok_or_else(|| {
            DomainError::NotFound {
                entity: "Tariff",
                field: "code",
                value: tariff.code.clone(),
            }
        })?;
        guard_update(&*entry, &mut tariff)?;
        *entry = tariff.clone();
        Ok(tariff)
    }

    async fn find_by_code(&self, code: &str) -> DomainResult<Option<Tariff>> {
        let tenant = bound_tenant()?;
        Ok(self
            .0
            .tariffs
            .get(&(tenant, code.to_string()))
            .filter(|t| !t.audit.deleted)
            .map(|t| t.clone()))
    }

    async fn find_default(&self) -> DomainResult<Option<Tariff>> {
        let tenant = bound_tenant()?;
        Ok(self
            .0
            .tariffs
            .iter()
            .find(|e| owned_by(e.value(), &tenant) && e.is_default && !e.audit.deleted)
            .map(|e| e.clone()))
    }

    async fn find_all(&self) -> DomainResult<Vec<Tariff>> {
        let tenant = bound_tenant()?;
        Ok(self
            .0
            .tariffs
            .iter()
            .filter(|e| owned_by(e.value(), &tenant) && !e.audit.deleted)
            .map(|e| e.clone())
            .collect())
    }

    async fn delete(&self, code: &str) -> DomainResult<()> {
        let tenant = bound_tenant()?;
        match self.0.tariffs.get_mut(&(tenant, code.to_string())) {
            Some(mut entry) => {
                entry.audit_mut().mark_deleted(None);
                Ok(())
            }
            None => Err(DomainError::NotFound {
                entity: "Tariff",
                field: "code",
                value: code.to_string(),
            }),
        }
    }
}

// ── Users ──────────────────────────────────────────────────────

struct MemUserRepo(Arc<Store>);

#[async_trait]
impl UserRepository for MemUserRepo {
    async fn save(&self, mut user: User) -> DomainResult<User> {
        guard_insert(&mut user)?;
        let tenant = bound_tenant()?;
        let duplicate = self.0.users.iter().any(|e| {
            owned_by(e.value(), &tenant)
                && !e.audit.deleted
                && (e.username == user.username || e.email == user.email)
        });
        if duplicate {
            return Err(DomainError::Conflict(format!(
                "user '{}' already exists in tenant",
                user.username
            )));
        }
        self.0
            .users
            .insert((tenant, user.id.clone()), user.clone());
        Ok(user)
    }

    async fn update(&self, mut user: User) -> DomainResult<User> {
        let tenant = bound_tenant()?;
        let key = (tenant, user.id.clone());
        let mut entry = self.0.users.get_mut(&key).ok_or_else(|| {
            DomainError::NotFound {
                entity: "User",
                field: "id",
                value: user.id.clone(),
            }
        })?;
        guard_update(&*entry, &mut user)?;
        *entry = user.clone();
        Ok(user)
    }

    async fn find_by_id(&self, id: &str) -> DomainResult<Option<User>> {
        let tenant = bound_tenant()?;
        Ok(self
            .0
            .users
            .get(&(tenant, id.to_string()))
            .filter(|u| !u.audit.deleted)
            .map(|u| u.clone()))
    }

    async fn find_by_username(&self, username: &str) -> DomainResult<Option<User>> {
        let tenant = bound_tenant()?;
        Ok(self
            .0
            .users
            .iter()
            .find(|e| owned_by(e.value(), &tenant) && !e.audit.deleted && e.username == username)
            .map(|e| e.clone()))
    }

    async fn find_by_email(&self, email: &str) -> DomainResult<Option<User>> {
        let tenant = bound_tenant()?;
        Ok(self
            .0
            .users
            .iter()
            .find(|e| owned_by(e.value(), &tenant) && !e.audit.deleted && e.email == email)
            .map(|e| e.clone()))
    }

    async fn find_all(&self) -> DomainResult<Vec<User>> {
        let tenant = bound_tenant()?;
        Ok(self
            .0
            .users
            .iter()
            .filter(|e| owned_by(e.value(), &tenant) && !e.audit.deleted)
            .map(|e| e.clone())
            .collect())
    }

    async fn delete(&self, id: &str) -> DomainResult<()> {
        let tenant = bound_tenant()?;
        match self.0.users.get_mut(&(tenant, id.to_string())) {
            Some(mut entry) => {
                entry.audit_mut().mark_deleted(None);
                Ok(())
            }
            None => Err(DomainError::NotFound {
                entity: "User",
                field: "id",
                value: id.to_string(),
            }),
        }
    }
}

// ── Auth tokens ────────────────────────────────────────────────

struct MemAuthTokenRepo(Arc<Store>);

#[async_trait]
impl AuthTokenRepository for MemAuthTokenRepo {
    async fn save(&self, mut token: AuthToken) -> DomainResult<AuthToken> {
        guard_insert(&mut token)?;
        let tenant = bound_tenant()?;
        let key = (tenant, token.token_value.clone());
        if self.0.auth_tokens.contains_key(&key) {
            return Err(DomainError::Conflict("token already registered".into()));
        }
        self.0.auth_tokens.insert(key, token.clone());
        Ok(token)
    }

    async fn update(&self, mut token: AuthToken) -> DomainResult<AuthToken> {
        let tenant = bound_tenant()?;
        let key = (tenant, token.token_value.clone());
        let mut entry = self.0.auth_tokens.get_mut(&key).ok_or_else(|| {
            DomainError::NotFound {
                entity: "AuthToken",
                field: "token_value",
                value: token.token_value.clone(),
            }
        })?;
        guard_update(&*entry, &mut token)?;
        *entry = token.clone();
        Ok(token)
    }

    async fn find_by_value(&self, token_value: &str) -> DomainResult<Option<AuthToken>> {
        let tenant = bound_tenant()?;
        Ok(self
            .0
            .auth_tokens
            .get(&(tenant, token_value.to_string()))
            .map(|t| t.clone()))
    }

    async fn find_all(&self) -> DomainResult<Vec<AuthToken>> {
        let tenant = bound_tenant()?;
        Ok(self
            .0
            .auth_tokens
            .iter()
            .filter(|e| owned_by(e.value(), &tenant))
            .map(|e| e.clone())
            .collect())
    }
}

// ── Provider ───────────────────────────────────────────────────

/// In-memory [`RepositoryProvider`]; one per process.
pub struct InMemoryRepositoryProvider {
    store: Arc<Store>,
    tenants: MemTenantRepo,
    stations: MemStationRepo,
    connectors: MemConnectorRepo,
    sessions: MemSessionRepo,
    tariffs: MemTariffRepo,
    users: MemUserRepo,
    auth_tokens: MemAuthTokenRepo,
}

impl InMemoryRepositoryProvider {
    pub fn new() -> Self {
        let store = Arc::new(Store::default());
        Self {
            tenants: MemTenantRepo(store.clone()),
            stations: MemStationRepo(store.clone()),
            connectors: MemConnectorRepo(store.clone()),
            sessions: MemSessionRepo(store.clone()),
            tariffs: MemTariffRepo(store.clone()),
            users: MemUserRepo(store.clone()),
            auth_tokens: MemAuthTokenRepo(store.clone()),
            store,
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Default for InMemoryRepositoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl RepositoryProvider for InMemoryRepositoryProvider {
    fn tenants(&self) -> &dyn TenantRepository {
        &self.tenants
    }

    fn stations(&self) -> &dyn StationRepository {
        &self.stations
    }

    fn connectors(&self) -> &dyn ConnectorRepository {
        &self.connectors
    }

    fn sessions(&self) -> &dyn SessionRepository {
        &self.sessions
    }

    fn tariffs(&self) -> &dyn TariffRepository {
        &self.tariffs
    }

    fn users(&self) -> &dyn UserRepository {
        &self.users
    }

    fn auth_tokens(&self) -> &dyn AuthTokenRepository {
        &self.auth_tokens
    }
}

#[async_trait]
impl TenantDirectory for InMemoryRepositoryProvider {
    async fn is_active_tenant(&self, code: &str) -> bool {
        self.store
            .tenants
            .get(code)
            .map(|t| t.active)
            .unwrap_or(false)
    }

    async fn tenant_for_domain(&self, host: &str) -> Option<String> {
        self.store
            .tenants
            .iter()
            .find(|t| t.custom_domain() == Some(host))
            .map(|t| t.code.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TenantType;

    fn provider() -> InMemoryRepositoryProvider {
        InMemoryRepositoryProvider::new()
    }

    async fn in_tenant<F, R>(code: &str, fut: F) -> R
    where
        F: std::future::Future<Output = R>,
    {
        TenantContext::new(code).scope(fut).await
    }

    #[tokio::test]
    async fn same_username_in_two_tenants_is_isolated() {
        let repos = provider();

        in_tenant("t1", async {
            repos
                .users()
                .save(User::new("u1", "alice", "alice@t1.example", "h"))
                .await
                .unwrap();
        })
        .await;
        in_tenant("t2", async {
            repos
                .users()
                .save(User::new("u2", "alice", "alice@t2.example", "h"))
                .await
                .unwrap();
        })
        .await;

        let t1_alice = in_tenant("t1", repos.users().find_by_username("alice"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(t1_alice.id, "u1");

        let t2_alice = in_tenant("t2", repos.users().find_by_username("alice"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(t2_alice.id, "u2");

        let t3_alice = in_tenant("t3", repos.users().find_by_username("alice"))
            .await
            .unwrap();
        assert!(t3_alice.is_none());
    }

    #[tokio::test]
    async fn moving_a_user_between_tenants_fails() {
        let repos = provider();

        let saved = in_tenant("t1", async {
            repos
                .users()
                .save(User::new("u1", "alice", "alice@t1.example", "h"))
                .await
                .unwrap()
        })
        .await;

        let result = in_tenant("t1", async {
            let mut moved = saved.clone();
            moved.audit.tenant_id = Some("t2".into());
            repos.users().update(moved).await
        })
        .await;
        let err = result.unwrap_err();
        assert!(err.to_string().contains("tenant immutable"), "{}", err);
    }

    #[tokio::test]
    async fn duplicate_username_within_tenant_conflicts() {
        let repos = provider();
        in_tenant("t1", async {
            repos
                .users()
                .save(User::new("u1", "alice", "alice@t1.example", "h"))
                .await
                .unwrap();
            let err = repos
                .users()
                .save(User::new("u2", "alice", "other@t1.example", "h"))
                .await
                .unwrap_err();
            assert!(matches!(err, DomainError::Conflict(_)));
        })
        .await;
    }

    #[tokio::test]
    async fn unbound_access_is_rejected() {
        let repos = provider();
        assert!(repos.stations().find_all().await.is_err());
    }

    #[tokio::test]
    async fn transaction_ids_are_per_tenant() {
        let repos = provider();
        let a = in_tenant("t1", repos.sessions().next_transaction_id())
            .await
            .unwrap();
        let b = in_tenant("t1", repos.sessions().next_transaction_id())
            .await
            .unwrap();
        let c = in_tenant("t2", repos.sessions().next_transaction_id())
            .await
            .unwrap();
        assert_eq!(a, 1);
        assert_eq!(b, 2);
        assert_eq!(c, 1);
    }

    #[tokio::test]
    async fn session_transaction_id_is_immutable_in_storage() {
        let repos = provider();
        in_tenant("t1", async {
            let mut session = ChargingSession::new("CP-1");
            session.ocpp_transaction_id = Some(10);
            let saved = repos.sessions().save(session).await.unwrap();

            let mut changed = saved.clone();
            changed.ocpp_transaction_id = Some(11);
            let err = repos.sessions().update(changed).await.unwrap_err();
            assert!(matches!(err, DomainError::InvalidState(_)));
        })
        .await;
    }

    #[tokio::test]
    async fn tenant_directory_checks_active_flag() {
        let repos = provider();
        let mut tenant = Tenant::new("acme", "Acme", TenantType::Cpo);
        tenant
            .metadata
            .insert("custom_domain".into(), "charge.acme.example".into());
        repos.tenants().save(tenant).await.unwrap();

        assert!(repos.is_active_tenant("acme").await);
        assert!(!repos.is_active_tenant("ghost").await);
        assert_eq!(
            repos.tenant_for_domain("charge.acme.example").await,
            Some("acme".into())
        );

        let mut t = repos.tenants().find_by_code("acme").await.unwrap().unwrap();
        t.suspend("testing");
        repos.tenants().update(t).await.unwrap();
        assert!(!repos.is_active_tenant("acme").await);
    }
}
