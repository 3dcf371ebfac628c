//! Application configuration.
//!
//! A TOML file provides the base (path from `CSMS_CONFIG`, optional);
//! environment variables override it. `JWT_SECRET` (Base64) is required:
//! a missing or malformed secret is a configuration error and the process
//! exits with code 1.

use serde::Deserialize;

use crate::auth::jwt::{DEFAULT_ACCESS_EXPIRATION_SECS, DEFAULT_REFRESH_EXPIRATION_SECS};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("malformed config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub api_host: String,
    pub api_port: u16,
    pub ws_host: String,
    pub ws_port: u16,
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_host: "0.0.0.0".into(),
            api_port: 8080,
            ws_host: "0.0.0.0".into(),
            ws_port: 9000,
            shutdown_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Base64-encoded HS256 secret; required (env `JWT_SECRET`)
    pub jwt_secret: Option<String>,
    pub jwt_expiration_secs: Option<i64>,
    pub jwt_refresh_expiration_secs: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TenancyConfig {
    /// Resolve tenants from subdomains / custom domains
    pub domain_strategy: bool,
    /// Tenant assumed for stations that present no tenant at handshake
    pub default_tenant: Option<String>,
}

impl Default for TenancyConfig {
    fn default() -> Self {
        Self {
            domain_strategy: true,
            default_tenant: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub security: SecurityConfig,
    pub tenancy: TenancyConfig,
    pub logging: LoggingConfig,
    /// Deployment profile: `development` relaxes error detail redaction
    pub profile: Option<String>,
    pub database_url: Option<String>,
}

impl AppConfig {
    /// Load the optional TOML file, then apply env overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("CSMS_CONFIG") {
            Ok(path) => {
                let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
                    path: path.clone(),
                    source,
                })?;
                toml::from_str(&raw)?
            }
            Err(_) => AppConfig::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(secret) = std::env::var("JWT_SECRET") {
            self.security.jwt_secret = Some(secret);
        }
        if let Some(expiration) = env_i64("JWT_EXPIRATION") {
            self.security.jwt_expiration_secs = Some(expiration);
        }
        if let Some(expiration) = env_i64("JWT_REFRESH_EXPIRATION") {
            self.security.jwt_refresh_expiration_secs = Some(expiration);
        }
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.database_url = Some(url);
        }
        if let Ok(profile) = std::env::var("PROFILE") {
            self.profile = Some(profile);
        }
        if let Ok(strategy) = std::env::var("DOMAIN_STRATEGY") {
            self.tenancy.domain_strategy = strategy.eq_ignore_ascii_case("true");
        }
        if let Ok(tenant) = std::env::var("DEFAULT_TENANT") {
            self.tenancy.default_tenant = Some(tenant);
        }
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.security.jwt_secret.as_deref().unwrap_or("").is_empty() {
            return Err(ConfigError::Invalid(
                "JWT_SECRET is required (Base64-encoded signing key)".into(),
            ));
        }
        Ok(())
    }

    pub fn profile(&self) -> &str {
        self.profile.as_deref().unwrap_or("development")
    }

    pub fn jwt_expiration_secs(&self) -> i64 {
        self.security
            .jwt_expiration_secs
            .unwrap_or(DEFAULT_ACCESS_EXPIRATION_SECS)
    }

    pub fn jwt_refresh_expiration_secs(&self) -> i64 {
        self.security
            .jwt_refresh_expiration_secs
            .unwrap_or(DEFAULT_REFRESH_EXPIRATION_SECS)
    }

    pub fn api_addr(&self) -> String {
        format!("{}:{}", self.server.api_host, self.server.api_port)
    }

    pub fn ws_addr(&self) -> String {
        format!("{}:{}", self.server.ws_host, self.server.ws_port)
    }
}

fn env_i64(name: &str) -> Option<i64> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = AppConfig::default();
        assert_eq!(config.api_addr(), "0.0.0.0:8080");
        assert_eq!(config.ws_addr(), "0.0.0.0:9000");
        assert_eq!(config.profile(), "development");
        assert_eq!(config.jwt_expiration_secs(), 86_400);
        assert_eq!(config.jwt_refresh_expiration_secs(), 604_800);
    }

    #[test]
    fn missing_secret_is_invalid() {
        let config = AppConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_overrides_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [server]
            api_port = 8081
            [security]
            jwt_secret = "c2VjcmV0"
            [tenancy]
            domain_strategy = false
            default_tenant = "demo"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.api_port, 8081);
        assert!(!config.tenancy.domain_strategy);
        assert_eq!(config.tenancy.default_tenant.as_deref(), Some("demo"));
        assert!(config.validate().is_ok());
    }
}
