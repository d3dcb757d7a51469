use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use folio_auth::{AllowList, AuthzError, TokenSigner, authorize_bearer};

use crate::app::errors::json_error;
use crate::context::PrincipalContext;

/// Per-route gate: a token verifier plus the roles admitted by the route.
#[derive(Clone)]
pub struct Gate {
    signer: Arc<TokenSigner>,
    allow: Arc<AllowList>,
}

impl Gate {
    pub fn new(signer: Arc<TokenSigner>, allow: AllowList) -> Self {
        Self {
            signer,
            allow: Arc::new(allow),
        }
    }

    /// Any authenticated principal.
    pub fn authenticated(signer: Arc<TokenSigner>) -> Self {
        Self::new(signer, AllowList::any_role())
    }
}

/// 401 when no valid identity is presented, 403 when the identity's role is
/// not admitted. On success the handler sees a [`PrincipalContext`].
pub async fn require_role(
    State(gate): State<Gate>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let token = extract_bearer(req.headers());

    match authorize_bearer(&gate.signer, token, &gate.allow, Utc::now()) {
        Ok(principal) => {
            req.extensions_mut().insert(PrincipalContext::from(principal));
            next.run(req).await
        }
        Err(AuthzError::Unauthorized) => {
            json_error(StatusCode::UNAUTHORIZED, "unauthorized", "authentication required")
        }
        Err(AuthzError::Forbidden) => {
            tracing::debug!(path = %req.uri().path(), "role not admitted");
            json_error(StatusCode::FORBIDDEN, "forbidden", "insufficient role")
        }
    }
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?;
    let header = header.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();

    if token.is_empty() { None } else { Some(token) }
}
