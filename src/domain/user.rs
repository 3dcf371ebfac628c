//! User, role and authorization-token domain entities

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::audit::{AuditRecord, TenantScoped};
use crate::shared::errors::{DomainError, DomainResult};

/// Failed logins tolerated before the account is locked.
const MAX_FAILED_LOGINS: u32 = 5;
/// Lock duration after too many failed logins.
const LOCK_MINUTES: i64 = 15;

/// A (resource, action) permission pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Permission {
    pub resource: String,
    pub action: String,
}

impl Permission {
    pub fn new(resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            action: action.into(),
        }
    }
}

/// Tenant-scoped named set of permissions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    pub description: Option<String>,
    /// Built-in roles cannot be edited by operators
    pub system_role: bool,
    pub permissions: Vec<Permission>,
    pub audit: AuditRecord,
}

impl Role {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            system_role: false,
            permissions: Vec::new(),
            audit: AuditRecord::new(),
        }
    }

    pub fn allows(&self, resource: &str, action: &str) -> bool {
        self.permissions
            .iter()
            .any(|p| p.resource == resource && p.action == action)
    }
}

impl TenantScoped for Role {
    fn audit(&self) -> &AuditRecord {
        &self.audit
    }

    fn audit_mut(&mut self) -> &mut AuditRecord {
        &mut self.audit
    }
}

/// Per-user UI preferences, stored opaquely.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserPreferences {
    pub language: Option<String>,
    pub timezone: Option<String>,
}

/// Tenant-scoped operator or driver account.
///
/// Unique per `(username, tenant_id)` and `(email, tenant_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub email_verified: bool,
    pub active: bool,
    pub roles: Vec<String>,
    pub failed_login_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub preferences: UserPreferences,
    pub audit: AuditRecord,
}

impl User {
    pub fn new(
        id: impl Into<String>,
        username: impl Into<String>,
        email: impl Into<String>,
        password_hash: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            email: email.into(),
            password_hash: password_hash.into(),
            email_verified: false,
            active: true,
            roles: Vec::new(),
            failed_login_attempts: 0,
            locked_until: None,
            last_login_at: None,
            preferences: UserPreferences::default(),
            audit: AuditRecord::new(),
        }
    }

    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| now < until)
    }

    /// Record a failed login; locks the account once the threshold is hit.
    pub fn record_failed_login(&mut self, now: DateTime<Utc>) {
        self.failed_login_attempts += 1;
        if self.failed_login_attempts >= MAX_FAILED_LOGINS {
            self.locked_until = Some(now + Duration::minutes(LOCK_MINUTES));
        }
    }

    pub fn record_successful_login(&mut self, now: DateTime<Utc>) {
        self.failed_login_attempts = 0;
        self.locked_until = None;
        self.last_login_at = Some(now);
    }

    pub fn ensure_can_login(&self, now: DateTime<Utc>) -> DomainResult<()> {
        if !self.active {
            return Err(DomainError::Unauthorized("account disabled".into()));
        }
        if self.is_locked(now) {
            return Err(DomainError::Unauthorized("account temporarily locked".into()));
        }
        Ok(())
    }
}

impl TenantScoped for User {
    fn audit(&self) -> &AuditRecord {
        &self.audit
    }

    fn audit_mut(&mut self) -> &mut AuditRecord {
        &mut self.audit
    }
}

// ── Authorization tokens (idTags) ──────────────────────────────

/// Physical form of a charging credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenType {
    Rfid,
    Nfc,
    MobileApp,
    ApiKey,
    CreditCard,
    Barcode,
    Biometric,
    VehicleId,
    Custom,
}

/// Outcome of validating an idTag, mirrored into OCPP `idTagInfo.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStatus {
    Accepted,
    Blocked,
    Expired,
    Invalid,
    /// The token already has an active transaction elsewhere.
    ConcurrentTx,
}

impl TokenStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "Accepted",
            Self::Blocked => "Blocked",
            Self::Expired => "Expired",
            Self::Invalid => "Invalid",
            Self::ConcurrentTx => "ConcurrentTx",
        }
    }
}

/// A charging credential bound to a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthToken {
    pub token_value: String,
    pub token_type: TokenType,
    pub user_id: Option<String>,
    pub active: bool,
    pub blocked: bool,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub audit: AuditRecord,
}

impl AuthToken {
    pub fn new(token_value: impl Into<String>, token_type: TokenType) -> Self {
        Self {
            token_value: token_value.into(),
            token_type,
            user_id: None,
            active: true,
            blocked: false,
            valid_from: None,
            valid_until: None,
            audit: AuditRecord::new(),
        }
    }

    /// A token is valid iff active, not blocked, not deleted and inside its
    /// validity window.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.status(now) == TokenStatus::Accepted
    }

    pub fn status(&self, now: DateTime<Utc>) -> TokenStatus {
        if self.audit.deleted || !self.active {
            return TokenStatus::Invalid;
        }
        if self.blocked {
            return TokenStatus::Blocked;
        }
        if self.valid_from.is_some_and(|from| now < from) {
            return TokenStatus::Invalid;
        }
        if self.valid_until.is_some_and(|until| now > until) {
            return TokenStatus::Expired;
        }
        TokenStatus::Accepted
    }
}

impl TenantScoped for AuthToken {
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
    fn failed_logins_lock_after_threshold() {
        let now = Utc::now();
        let mut u = User::new("u1", "alice", "alice@example.com", "$2b$hash");
        for _ in 0..4 {
            u.record_failed_login(now);
        }
        assert!(!u.is_locked(now));
        u.record_failed_login(now);
        assert!(u.is_locked(now));
        assert!(u.ensure_can_login(now).is_err());

        u.record_successful_login(now + Duration::minutes(20));
        assert_eq!(u.failed_login_attempts, 0);
        assert!(u.ensure_can_login(now + Duration::minutes(20)).is_ok());
    }

    #[test]
    fn lock_expires_with_time() {
        let now = Utc::now();
        let mut u = User::new("u1", "alice", "alice@example.com", "$2b$hash");
        for _ in 0..5 {
            u.record_failed_login(now);
        }
        assert!(u.is_locked(now + Duration::minutes(14)));
        assert!(!u.is_locked(now + Duration::minutes(16)));
    }

    #[test]
    fn token_status_progression() {
        let now = Utc::now();
        let mut token = AuthToken::new("RFID-ABC", TokenType::Rfid);
        assert_eq!(token.status(now), TokenStatus::Accepted);
        assert!(token.is_valid(now));

        token.blocked = true;
        assert_eq!(token.status(now), TokenStatus::Blocked);
        token.blocked = false;

        token.valid_until = Some(now - Duration::hours(1));
        assert_eq!(token.status(now), TokenStatus::Expired);
        token.valid_until = None;

        token.valid_from = Some(now + Duration::hours(1));
        assert_eq!(token.status(now), TokenStatus::Invalid);
        token.valid_from = None;

        token.active = false;
        assert_eq!(token.status(now), TokenStatus::Invalid);
        token.active = true;

        token.audit.mark_deleted(None);
        assert_eq!(token.status(now), TokenStatus::Invalid);
    }

    #[test]
    fn role_permission_check() {
        let mut role = Role::new("operator");
        role.permissions.push(Permission::new("stations", "read"));
        assert!(role.allows("stations", "read"));
        assert!(!role.allows("stations", "delete"));
    }
}
