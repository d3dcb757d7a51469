//! Password hashing and verification using Argon2id.
//!
//! Hashes are PHC strings, so the salt and cost parameters travel with the
//! hash and older hashes keep verifying after the default cost changes.

use argon2::{
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher as _, PasswordVerifier as _, Version,
    password_hash::{SaltString, rand_core::OsRng},
};
use thiserror::Error;

/// Memory cost in KiB for the default work factor.
pub const DEFAULT_MEMORY_KIB: u32 = 19 * 1024;
/// Iteration count for the default work factor.
pub const DEFAULT_ITERATIONS: u32 = 2;
/// Degree of parallelism for the default work factor.
pub const DEFAULT_LANES: u32 = 1;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PasswordHashError {
    #[error("invalid hashing parameters: {0}")]
    InvalidParams(String),

    #[error("failed to hash password: {0}")]
    Hash(String),
}

/// Salted, work-factor-tunable one-way password hasher.
#[derive(Clone)]
pub struct PasswordHasher {
    argon2: Argon2<'static>,
}

impl PasswordHasher {
    /// Build a hasher with an explicit work factor.
    pub fn with_cost(memory_kib: u32, iterations: u32, lanes: u32) -> Result<Self, PasswordHashError> {
        let params = Params::new(memory_kib, iterations, lanes, None)
            .map_err(|e| PasswordHashError::InvalidParams(e.to_string()))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Hash a plaintext password with a fresh random salt.
    pub fn hash(&self, plaintext: &str) -> Result<String, PasswordHashError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| PasswordHashError::Hash(e.to_string()))
    }

    /// Verify a plaintext password against a stored PHC hash.
    ///
    /// Never fails: a wrong password and an unreadable stored hash both yield `false`.
    pub fn verify(&self, plaintext: &str, hash: &str) -> bool {
        let parsed = match PasswordHash::new(hash) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(error = %e, "stored password hash is not a valid PHC string");
                return false;
            }
        };

        self.argon2.verify_password(plaintext.as_bytes(), &parsed).is_ok()
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        let params = Params::new(DEFAULT_MEMORY_KIB, DEFAULT_ITERATIONS, DEFAULT_LANES, None)
            .unwrap_or(Params::DEFAULT);
        Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        }
    }
}

impl core::fmt::Debug for PasswordHasher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PasswordHasher").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> PasswordHasher {
        PasswordHasher::with_cost(1024, 1, 1).unwrap()
    }

    #[test]
    fn test_hash_and_verify() {
        let hasher = cheap();
        let hash = hasher.hash("correct-horse-battery-staple").unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify("correct-horse-battery-staple", &hash));
        assert!(!hasher.verify("wrong-password", &hash));
    }

    #[test]
    fn test_different_salts() {
        let hasher = cheap();
        let hash1 = hasher.hash("same-password").unwrap();
        let hash2 = hasher.hash("same-password").unwrap();

        assert_ne!(hash1, hash2);
        assert!(hasher.verify("same-password", &hash1));
        assert!(hasher.verify("same-password", &hash2));
    }

    #[test]
    fn malformed_hash_is_a_plain_mismatch() {
        assert!(!cheap().verify("password", "not-a-valid-hash"));
        assert!(!cheap().verify("password", ""));
    }

    #[test]
    fn hashes_from_other_cost_settings_still_verify() {
        let hash = cheap().hash("pw").unwrap();
        let stronger = PasswordHasher::with_cost(2048, 2, 1).unwrap();
        assert!(stronger.verify("pw", &hash));
    }

    #[test]
    fn default_cost_is_encoded_in_hash() {
        let hash = PasswordHasher::default().hash("pw").unwrap();
        assert!(hash.contains(&format!("m={DEFAULT_MEMORY_KIB},t={DEFAULT_ITERATIONS},p={DEFAULT_LANES}")));
    }

    #[test]
    fn invalid_cost_is_rejected() {
        assert!(matches!(
            PasswordHasher::with_cost(1, 1, 1),
            Err(PasswordHashError::InvalidParams(_))
        ));
    }
}
