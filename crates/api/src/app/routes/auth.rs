use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    body::Bytes,
    extract::rejection::JsonRejection,
    response::{IntoResponse, Response},
    routing::{get, post},
};

use crate::app::dto::{LoginRequest, LogoutRequest, MessageResponse, RefreshRequest, RevokedResponse};
use crate::app::errors::auth_error_to_response;
use crate::app::routes::common::json_body;
use crate::app::services::AppServices;
use crate::context::PrincipalContext;
use crate::middleware::{self, Gate};

pub fn router(services: &AppServices) -> Router {
    let authenticated = Router::new()
        .route("/me", get(me))
        .route("/logout-all", post(logout_all))
        .route_layer(axum::middleware::from_fn_with_state(
            Gate::authenticated(services.signer()),
            middleware::require_role,
        ));

    Router::new()
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .merge(authenticated)
}

pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Response {
    let req = match json_body(body) {
        Ok(req) => req,
        Err(res) => return res,
    };

    match services.auth().login(&req.email, &req.password).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => auth_error_to_response(e),
    }
}

pub async fn refresh(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<RefreshRequest>, JsonRejection>,
) -> Response {
    let req = match json_body(body) {
        Ok(req) => req,
        Err(res) => return res,
    };

    match services.auth().refresh_access_token(&req.refresh_token).await {
        Ok(grant) => Json(grant).into_response(),
        Err(e) => auth_error_to_response(e),
    }
}

/// Always 200: an unknown, expired or missing refresh token is not an error.
pub async fn logout(Extension(services): Extension<Arc<AppServices>>, body: Bytes) -> Response {
    let req: LogoutRequest = serde_json::from_slice(&body).unwrap_or_default();

    if let Some(token) = req.refresh_token.as_deref() {
        services.auth().logout(token).await;
    }

    Json(MessageResponse {
        message: "logged out",
    })
    .into_response()
}

pub async fn me(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    match services.auth().get_current_user(principal.user_id()).await {
        Ok(user) => Json(user).into_response(),
        Err(e) => auth_error_to_response(e),
    }
}

pub async fn logout_all(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    match services.auth().logout_all(principal.user_id()).await {
        Ok(revoked_sessions) => Json(RevokedResponse {
            message: "all sessions revoked",
            revoked_sessions,
        })
        .into_response(),
        Err(e) => auth_error_to_response(e),
    }
}
