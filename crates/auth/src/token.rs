//! Access-token signing and verification.
//!
//! Tokens are compact HS256 JWTs carrying [`AccessClaims`]. They are never
//! persisted: a token is valid iff its signature checks out against the
//! process secret and `now` falls inside its `[iat, exp)` window. That makes
//! verification stateless, and it also means an access token cannot be revoked
//! before it expires. Only refresh sessions are revocable.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;

use crate::{AccessClaims, Role, UserId, validate_claims};

/// Minimum secret length accepted by [`SigningSecret::strict`].
pub const MIN_STRICT_SECRET_LEN: usize = 32;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SecretError {
    #[error("signing secret must not be empty")]
    Empty,

    #[error("signing secret must be at least 32 bytes (got {0})")]
    TooShort(usize),
}

/// Process-wide HMAC secret.
///
/// Built once from configuration and shared read-only. Every instance of a
/// horizontally scaled deployment must be given the same secret.
#[derive(Clone)]
pub struct SigningSecret(Arc<[u8]>);

impl SigningSecret {
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, SecretError> {
        let bytes = secret.as_ref();
        if bytes.is_empty() {
            return Err(SecretError::Empty);
        }
        Ok(Self(Arc::from(bytes)))
    }

    /// Like [`SigningSecret::new`], but also enforces a production-grade length.
    pub fn strict(secret: impl AsRef<[u8]>) -> Result<Self, SecretError> {
        let len = secret.as_ref().len();
        if len > 0 && len < MIN_STRICT_SECRET_LEN {
            return Err(SecretError::TooShort(len));
        }
        Self::new(secret)
    }

    fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl core::fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("SigningSecret(<redacted>)")
    }
}

/// Identity an access token is minted for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSubject {
    pub user_id: UserId,
    pub email: String,
    pub role: Role,
}

/// A freshly signed access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    /// Lifetime in whole seconds from issuance.
    pub expires_in: i64,
}

/// Verification failure.
///
/// Bad signature, malformed structure and expiry all collapse into this one
/// value so callers cannot tell which check failed.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("invalid token")]
pub struct InvalidToken;

#[derive(Debug, Error)]
#[error("failed to sign access token: {0}")]
pub struct SignError(#[from] jsonwebtoken::errors::Error);

pub struct TokenSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenSigner {
    pub fn new(secret: &SigningSecret, ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // The time window is checked by `validate_claims` against an explicit `now`.
        validation.validate_exp = false;
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
        }
    }

    pub fn issue(&self, subject: &TokenSubject, now: DateTime<Utc>) -> Result<IssuedToken, SignError> {
        let iat = now.timestamp();
        let exp = (now + self.ttl).timestamp();
        let claims = AccessClaims {
            sub: subject.user_id,
            email: subject.email.clone(),
            role: subject.role,
            iat,
            exp,
        };

        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        Ok(IssuedToken {
            token,
            expires_in: exp - iat,
        })
    }

    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<AccessClaims, InvalidToken> {
        let data = jsonwebtoken::decode::<AccessClaims>(token, &self.decoding, &self.validation)
            .map_err(|e| {
                tracing::debug!(error = %e, "access token rejected");
                InvalidToken
            })?;

        validate_claims(&data.claims, now).map_err(|e| {
            tracing::debug!(error = %e, user_id = %data.claims.sub, "access token rejected");
            InvalidToken
        })?;

        Ok(data.claims)
    }
}

impl core::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenSigner").field("ttl", &self.ttl).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer(secret: &str) -> TokenSigner {
        TokenSigner::new(&SigningSecret::new(secret).unwrap(), Duration::minutes(15))
    }

    fn subject() -> TokenSubject {
        TokenSubject {
            user_id: UserId::new(),
            email: "admin@x.com".into(),
            role: Role::Admin,
        }
    }

    #[test]
    fn issued_token_verifies_with_original_claims() {
        let signer = signer("unit-test-secret");
        let subject = subject();
        let now = Utc::now();

        let issued = signer.issue(&subject, now).unwrap();
        assert_eq!(issued.expires_in, 900);

        let claims = signer.verify(&issued.token, now).unwrap();
        assert_eq!(claims.sub, subject.user_id);
        assert_eq!(claims.email, subject.email);
        assert_eq!(claims.role, Role::Admin);
        assert_eq!(claims.exp - claims.iat, 900);
    }

    #[test]
    fn expired_token_is_rejected() {
        let signer = signer("unit-test-secret");
        let issued_at = Utc::now() - Duration::minutes(16);
        let issued = signer.issue(&subject(), issued_at).unwrap();

        assert_eq!(signer.verify(&issued.token, Utc::now()), Err(InvalidToken));
        assert!(signer.verify(&issued.token, issued_at + Duration::minutes(14)).is_ok());
    }

    #[test]
    fn token_from_another_secret_is_rejected() {
        let issued = signer("secret-a").issue(&subject(), Utc::now()).unwrap();
        assert_eq!(signer("secret-b").verify(&issued.token, Utc::now()), Err(InvalidToken));
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        let signer = signer("unit-test-secret");
        for token in ["", "abc", "a.b.c", "Bearer x.y.z"] {
            assert_eq!(signer.verify(token, Utc::now()), Err(InvalidToken), "{token:?}");
        }
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let signer = signer("unit-test-secret");
        let issued = signer.issue(&subject(), Utc::now()).unwrap();
        let mut parts: Vec<&str> = issued.token.split('.').collect();
        let other = signer
            .issue(
                &TokenSubject {
                    role: Role::SuperAdmin,
                    ..subject()
                },
                Utc::now(),
            )
            .unwrap();
        let other_payload = other.token.split('.').nth(1).unwrap().to_string();
        parts[1] = &other_payload;

        assert_eq!(signer.verify(&parts.join("."), Utc::now()), Err(InvalidToken));
    }

    #[test]
    fn secrets_are_validated_and_redacted() {
        assert_eq!(SigningSecret::new("").unwrap_err(), SecretError::Empty);
        assert_eq!(SigningSecret::strict("short").unwrap_err(), SecretError::TooShort(5));
        assert!(SigningSecret::strict("x".repeat(32)).is_ok());

        let secret = SigningSecret::new("super-secret-value").unwrap();
        assert!(!format!("{secret:?}").contains("super-secret-value"));
    }
}
