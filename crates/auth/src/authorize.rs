use std::collections::HashSet;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{Principal, Role, TokenSigner};

/// Explicit set of roles a route accepts.
///
/// Membership is the only test; roles are not ranked, so a route open to
/// `ADMIN` does not implicitly admit `SUPER_ADMIN`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowList {
    roles: HashSet<Role>,
}

impl AllowList {
    pub fn of(roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            roles: roles.into_iter().collect(),
        }
    }

    /// Every role; the route only needs a valid identity.
    pub fn any_role() -> Self {
        Self::of(Role::ALL)
    }

    pub fn permits(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthzError {
    /// No usable identity: missing token, bad signature, malformed, or expired.
    #[error("unauthorized")]
    Unauthorized,

    /// Identity is valid but its role is not on the route's allow-list.
    #[error("forbidden")]
    Forbidden,
}

/// Check an already-verified principal against an allow-list.
///
/// - No IO
/// - No panics
pub fn authorize(principal: &Principal, allow: &AllowList) -> Result<(), AuthzError> {
    if allow.permits(principal.role) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden)
    }
}

/// Account roles an `actor` may administer: reset credentials, change
/// activation, revoke sessions or delete.
///
/// `SUPER_ADMIN` accounts are only reachable by another `SUPER_ADMIN`, and
/// `ADMIN` cannot act on its peers, so no one can take over an account with
/// more reach than their own.
pub fn manageable_roles(actor: Role) -> AllowList {
    match actor {
        Role::SuperAdmin => AllowList::any_role(),
        Role::Admin => AllowList::of([Role::Editor, Role::Viewer]),
        Role::Editor | Role::Viewer => AllowList::of(std::iter::empty::<Role>()),
    }
}

/// `Forbidden` unless `actor` may administer an account holding `target`.
pub fn authorize_target(actor: Role, target: Role) -> Result<(), AuthzError> {
    if manageable_roles(actor).permits(target) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden)
    }
}

/// Verify a bearer token and check its role against `allow`.
///
/// Stateless: a user deactivated after the token was issued keeps access until
/// the token itself expires.
pub fn authorize_bearer(
    signer: &TokenSigner,
    token: Option<&str>,
    allow: &AllowList,
    now: DateTime<Utc>,
) -> Result<Principal, AuthzError> {
    let token = token.ok_or(AuthzError::Unauthorized)?;
    let claims = signer
        .verify(token, now)
        .map_err(|_| AuthzError::Unauthorized)?;

    let principal = Principal::from(claims);
    authorize(&principal, allow)?;
    Ok(principal)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::{SigningSecret, TokenSubject, UserId};

    fn signer() -> TokenSigner {
        TokenSigner::new(&SigningSecret::new("authz-test").unwrap(), Duration::minutes(15))
    }

    fn token_for(signer: &TokenSigner, role: Role) -> String {
        signer
            .issue(
                &TokenSubject {
                    user_id: UserId::new(),
                    email: format!("{}@x.com", role.as_str().to_lowercase()),
                    role,
                },
                Utc::now(),
            )
            .unwrap()
            .token
    }

    #[test]
    fn admins_cannot_administer_peers_or_super_admins() {
        assert_eq!(authorize_target(Role::Admin, Role::SuperAdmin), Err(AuthzError::Forbidden));
        assert_eq!(authorize_target(Role::Admin, Role::Admin), Err(AuthzError::Forbidden));
        assert_eq!(authorize_target(Role::Admin, Role::Editor), Ok(()));
        assert_eq!(authorize_target(Role::Admin, Role::Viewer), Ok(()));
    }

    #[test]
    fn super_admin_reaches_every_role_and_others_reach_none() {
        for target in Role::ALL {
            assert_eq!(authorize_target(Role::SuperAdmin, target), Ok(()));
            assert_eq!(authorize_target(Role::Editor, target), Err(AuthzError::Forbidden));
            assert_eq!(authorize_target(Role::Viewer, target), Err(AuthzError::Forbidden));
        }
    }

    #[test]
    fn viewer_is_forbidden_on_admin_route() {
        let signer = signer();
        let token = token_for(&signer, Role::Viewer);
        let allow = AllowList::of([Role::Admin]);

        assert_eq!(
            authorize_bearer(&signer, Some(&token), &allow, Utc::now()),
            Err(AuthzError::Forbidden)
        );
    }

    #[test]
    fn allow_list_is_not_a_hierarchy() {
        let signer = signer();
        let token = token_for(&signer, Role::SuperAdmin);
        let allow = AllowList::of([Role::Admin]);

        assert_eq!(
            authorize_bearer(&signer, Some(&token), &allow, Utc::now()),
            Err(AuthzError::Forbidden)
        );
    }

    #[test]
    fn invalid_or_missing_token_is_unauthorized_not_forbidden() {
        let signer = signer();
        let allow = AllowList::of([Role::Admin]);

        assert_eq!(
            authorize_bearer(&signer, None, &allow, Utc::now()),
            Err(AuthzError::Unauthorized)
        );
        assert_eq!(
            authorize_bearer(&signer, Some("not.a.jwt"), &allow, Utc::now()),
            Err(AuthzError::Unauthorized)
        );

        let token = token_for(&signer, Role::Admin);
        let later = Utc::now() + Duration::minutes(16);
        assert_eq!(
            authorize_bearer(&signer, Some(&token), &allow, later),
            Err(AuthzError::Unauthorized)
        );
    }

    #[test]
    fn permitted_role_exposes_principal() {
        let signer = signer();
        let token = token_for(&signer, Role::Editor);
        let allow = AllowList::of([Role::Admin, Role::Editor]);

        let principal = authorize_bearer(&signer, Some(&token), &allow, Utc::now()).unwrap();
        assert_eq!(principal.role, Role::Editor);
        assert_eq!(principal.email, "editor@x.com");
    }

    #[test]
    fn any_role_admits_everyone() {
        let allow = AllowList::any_role();
        assert!(Role::ALL.into_iter().all(|r| allow.permits(r)));
    }
}
