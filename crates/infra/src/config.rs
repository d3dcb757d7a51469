//! Configuration loading and representation.
//!
//! Values come from the process environment (and a `.env` file when present).
//! The resulting [`AppConfig`] is immutable and handed to components
//! explicitly.

use std::net::SocketAddr;
use std::time::Duration;

use folio_auth::{SecretError, SigningSecret};
use folio_observability::LogFormat;
use thiserror::Error;

use crate::auth_service::AuthSettings;

const DEV_JWT_SECRET: &str = "folio-dev-secret-do-not-use-in-production";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: '{value}'")]
    Invalid { key: &'static str, value: String },

    #[error("invalid JWT_SECRET: {0}")]
    Secret(#[from] SecretError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

/// Initial super admin seeded at startup.
#[derive(Clone, PartialEq, Eq)]
pub struct BootstrapAdmin {
    pub email: String,
    pub password: String,
}

impl core::fmt::Debug for BootstrapAdmin {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BootstrapAdmin")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub bind_addr: SocketAddr,
    /// `None` selects the in-memory credential store.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub jwt_secret: SigningSecret,
    pub access_token_ttl: chrono::Duration,
    pub session_ttl: chrono::Duration,
    pub store_timeout: Duration,
    pub log_format: LogFormat,
    pub bootstrap_admin: Option<BootstrapAdmin>,
    /// Set when no `JWT_SECRET` was given and the built-in dev secret is in use.
    pub insecure_dev_secret: bool,
}

impl AppConfig {
    /// Load from the environment, reading `.env` first if it exists.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let environment = match get("FOLIO_ENV").as_deref() {
            None | Some("development") | Some("dev") => Environment::Development,
            Some("production") | Some("prod") => Environment::Production,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "FOLIO_ENV",
                    value: other.to_string(),
                });
            }
        };

        let (jwt_secret, insecure_dev_secret) = match (get("JWT_SECRET"), environment) {
            (Some(secret), Environment::Production) => (SigningSecret::strict(secret)?, false),
            (Some(secret), Environment::Development) => (SigningSecret::new(secret)?, false),
            (None, Environment::Production) => return Err(ConfigError::Missing("JWT_SECRET")),
            (None, Environment::Development) => (SigningSecret::new(DEV_JWT_SECRET)?, true),
        };

        let bind_addr: SocketAddr = parse_or(&get, "BIND_ADDR", "0.0.0.0:8080".parse().ok())?;
        let access_ttl_secs: i64 = parse_or(&get, "ACCESS_TOKEN_TTL_SECS", Some(15 * 60))?;
        let session_ttl_secs: i64 = parse_or(&get, "REFRESH_SESSION_TTL_SECS", Some(7 * 24 * 60 * 60))?;
        let store_timeout_ms: u64 = parse_or(&get, "STORE_TIMEOUT_MS", Some(5_000))?;
        let db_max_connections: u32 = parse_or(&get, "DB_MAX_CONNECTIONS", Some(10))?;
        let log_format: LogFormat = parse_or(&get, "LOG_FORMAT", Some(LogFormat::Json))?;

        if access_ttl_secs <= 0 {
            return Err(ConfigError::Invalid {
                key: "ACCESS_TOKEN_TTL_SECS",
                value: access_ttl_secs.to_string(),
            });
        }
        if session_ttl_secs <= 0 {
            return Err(ConfigError::Invalid {
                key: "REFRESH_SESSION_TTL_SECS",
                value: session_ttl_secs.to_string(),
            });
        }

        let bootstrap_admin = match (get("BOOTSTRAP_ADMIN_EMAIL"), get("BOOTSTRAP_ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(BootstrapAdmin { email, password }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing("BOOTSTRAP_ADMIN_PASSWORD")),
            (None, Some(_)) => return Err(ConfigError::Missing("BOOTSTRAP_ADMIN_EMAIL")),
        };

        Ok(Self {
            environment,
            bind_addr,
            database_url: get("DATABASE_URL"),
            db_max_connections,
            jwt_secret,
            access_token_ttl: chrono::Duration::seconds(access_ttl_secs),
            session_ttl: chrono::Duration::seconds(session_ttl_secs),
            store_timeout: Duration::from_millis(store_timeout_ms),
            log_format,
            bootstrap_admin,
            insecure_dev_secret,
        })
    }

    pub fn auth_settings(&self) -> AuthSettings {
        AuthSettings {
            session_ttl: self.session_ttl,
            store_timeout: self.store_timeout,
        }
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: Option<T>) -> Result<T, ConfigError>
where
    T: core::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => default.ok_or(ConfigError::Missing(key)),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_match_documented_lifetimes() {
        let cfg = load(&[]).unwrap();
        assert_eq!(cfg.environment, Environment::Development);
        assert_eq!(cfg.access_token_ttl, chrono::Duration::minutes(15));
        assert_eq!(cfg.session_ttl, chrono::Duration::days(7));
        assert_eq!(cfg.store_timeout, Duration::from_secs(5));
        assert_eq!(cfg.log_format, LogFormat::Json);
        assert_eq!(cfg.bind_addr, "0.0.0.0:8080".parse::<SocketAddr>().unwrap());
        assert!(cfg.database_url.is_none());
        assert!(cfg.bootstrap_admin.is_none());
        assert!(cfg.insecure_dev_secret);
    }

    #[test]
    fn production_requires_a_strong_secret() {
        assert_eq!(
            load(&[("FOLIO_ENV", "production")]).unwrap_err(),
            ConfigError::Missing("JWT_SECRET")
        );
        assert_eq!(
            load(&[("FOLIO_ENV", "production"), ("JWT_SECRET", "short")]).unwrap_err(),
            ConfigError::Secret(SecretError::TooShort(5))
        );
        let long = "k".repeat(48);
        assert!(load(&[("FOLIO_ENV", "production"), ("JWT_SECRET", long.as_str())]).is_ok());
    }

    #[test]
    fn malformed_numbers_name_the_key() {
        assert_eq!(
            load(&[("STORE_TIMEOUT_MS", "soon")]).unwrap_err(),
            ConfigError::Invalid {
                key: "STORE_TIMEOUT_MS",
                value: "soon".into()
            }
        );
        assert!(matches!(
            load(&[("ACCESS_TOKEN_TTL_SECS", "0")]),
            Err(ConfigError::Invalid { key: "ACCESS_TOKEN_TTL_SECS", .. })
        ));
    }

    #[test]
    fn bootstrap_admin_needs_both_halves() {
        assert_eq!(
            load(&[("BOOTSTRAP_ADMIN_EMAIL", "root@x.com")]).unwrap_err(),
            ConfigError::Missing("BOOTSTRAP_ADMIN_PASSWORD")
        );
        let cfg = load(&[
            ("BOOTSTRAP_ADMIN_EMAIL", "root@x.com"),
            ("BOOTSTRAP_ADMIN_PASSWORD", "hunter2"),
        ])
        .unwrap();
        let admin = cfg.bootstrap_admin.unwrap();
        assert_eq!(admin.email, "root@x.com");
        assert!(!format!("{admin:?}").contains("hunter2"));
    }
}
