use serde::Serialize;

use crate::{AccessClaims, Role, UserId};

/// Identity proven by a verified access token.
///
/// This is what the authorization gate hands to downstream handlers. It is
/// derived from claims alone; no storage lookup is involved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub user_id: UserId,
    pub email: String,
    pub role: Role,
}

impl From<AccessClaims> for Principal {
    fn from(claims: AccessClaims) -> Self {
        Self {
            user_id: claims.sub,
            email: claims.email,
            role: claims.role,
        }
    }
}
