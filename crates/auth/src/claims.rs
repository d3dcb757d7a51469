use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Role, UserId};

/// Access-token claims.
///
/// Field names follow the registered JWT claim names so the encoded token is
/// readable by standard tooling. Timestamps are Unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject: the user the token was issued to.
    pub sub: UserId,

    pub email: String,

    pub role: Role,

    /// Issued-at (Unix seconds).
    pub iat: i64,

    /// Expiration (Unix seconds).
    pub exp: i64,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (iat is in the future)")]
    NotYetValid,

    #[error("invalid token time window (exp <= iat)")]
    InvalidTimeWindow,
}

/// Deterministically validate the time window of access-token claims.
///
/// A token is valid for `iat <= now < exp`. Signature verification happens
/// before this in [`crate::TokenSigner::verify`].
pub fn validate_claims(claims: &AccessClaims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    let now = now.timestamp();
    if claims.exp <= claims.iat {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now < claims.iat {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.exp {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn claims(iat: i64, exp: i64) -> AccessClaims {
        AccessClaims {
            sub: UserId::new(),
            email: "editor@example.com".into(),
            role: Role::Editor,
            iat,
            exp,
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn expiry_instant_itself_is_rejected() {
        let c = claims(1_000, 1_900);
        assert_eq!(validate_claims(&c, at(1_899)), Ok(()));
        assert_eq!(validate_claims(&c, at(1_900)), Err(TokenValidationError::Expired));
    }

    #[test]
    fn inverted_window_is_rejected_before_clock_checks() {
        let c = claims(2_000, 2_000);
        assert_eq!(
            validate_claims(&c, at(2_000)),
            Err(TokenValidationError::InvalidTimeWindow)
        );
    }

    proptest! {
        #[test]
        fn valid_exactly_inside_window(iat in 0i64..1_000_000, ttl in 1i64..100_000, offset in -200_000i64..200_000) {
            let c = claims(iat, iat + ttl);
            let now = iat + offset;
            let result = validate_claims(&c, at(now));
            if offset < 0 {
                prop_assert_eq!(result, Err(TokenValidationError::NotYetValid));
            } else if offset >= ttl {
                prop_assert_eq!(result, Err(TokenValidationError::Expired));
            } else {
                prop_assert_eq!(result, Ok(()));
            }
        }
    }
}
