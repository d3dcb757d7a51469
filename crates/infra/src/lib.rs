//! Infrastructure layer: credential storage, session lifecycle, auth
//! orchestration, configuration.

pub mod auth_service;
pub mod config;
pub mod sessions;
pub mod store;

pub use auth_service::{AccessGrant, AuthError, AuthService, AuthSettings, LoginOutcome, NewUser, TokenPair};
pub use config::{AppConfig, BootstrapAdmin, ConfigError, Environment};
pub use sessions::{ResolvedSession, SessionError, SessionManager, SessionRejection};
pub use store::{CredentialStore, InMemoryCredentialStore, PostgresCredentialStore, SessionLookup, StoreError};
