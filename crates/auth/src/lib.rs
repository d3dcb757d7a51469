//! `folio-auth`: pure authentication/authorization boundary.
//!
//! This crate is intentionally decoupled from HTTP and storage: it knows how to
//! hash passwords, sign and verify access tokens, and decide whether a role may
//! call a route. Persisting users and sessions is the infra layer's job.

pub mod authorize;
pub mod claims;
pub mod password;
pub mod principal;
pub mod roles;
pub mod session;
pub mod token;
pub mod user;

pub use authorize::{AllowList, AuthzError, authorize, authorize_bearer, authorize_target, manageable_roles};
pub use claims::{AccessClaims, TokenValidationError, validate_claims};
pub use password::{PasswordHashError, PasswordHasher};
pub use principal::Principal;
pub use roles::{Role, UnknownRole};
pub use session::Session;
pub use token::{InvalidToken, IssuedToken, SecretError, SigningSecret, TokenSigner, TokenSubject};
pub use user::{PublicUser, User};

pub use folio_core::{SessionId, UserId};
