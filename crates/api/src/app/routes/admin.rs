use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::{Path, rejection::JsonRejection},
    response::{IntoResponse, Response},
    routing::{delete, post},
};

use folio_auth::{AllowList, Role};

use crate::app::dto::{MessageResponse, ResetPasswordRequest, RevokedResponse};
use crate::app::errors::auth_error_to_response;
use crate::app::routes::common::{json_body, parse_user_id};
use crate::app::services::AppServices;
use crate::context::PrincipalContext;
use crate::middleware::{self, Gate};

pub fn router(services: &AppServices) -> Router {
    let admins = Gate::new(services.signer(), AllowList::of([Role::SuperAdmin, Role::Admin]));
    let super_admins = Gate::new(services.signer(), AllowList::of([Role::SuperAdmin]));

    let user_management = Router::new()
        .route("/users/:id/sessions/revoke", post(revoke_sessions))
        .route("/users/:id/deactivate", post(deactivate_user))
        .route("/users/:id/activate", post(activate_user))
        .route("/users/:id/password", post(reset_password))
        .route_layer(axum::middleware::from_fn_with_state(admins, middleware::require_role));

    let destructive = Router::new()
        .route("/users/:id", delete(delete_user))
        .route_layer(axum::middleware::from_fn_with_state(
            super_admins,
            middleware::require_role,
        ));

    user_management.merge(destructive)
}

pub async fn revoke_sessions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let user_id = match parse_user_id(&id) {
        Ok(id) => id,
        Err(res) => return res,
    };

    // Also makes an unknown id a 404 rather than "0 revoked".
    if let Err(e) = services.auth().authorize_management(principal.role(), user_id).await {
        return auth_error_to_response(e);
    }

    match services.auth().logout_all(user_id).await {
        Ok(revoked_sessions) => {
            tracing::info!(actor = %principal.user_id(), target = %user_id, "sessions revoked by admin");
            Json(RevokedResponse {
                message: "sessions revoked",
                revoked_sessions,
            })
            .into_response()
        }
        Err(e) => auth_error_to_response(e),
    }
}

pub async fn deactivate_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    set_active(&services, &principal, &id, false).await
}

pub async fn activate_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    set_active(&services, &principal, &id, true).await
}

async fn set_active(
    services: &AppServices,
    principal: &PrincipalContext,
    id: &str,
    active: bool,
) -> Response {
    let user_id = match parse_user_id(id) {
        Ok(id) => id,
        Err(res) => return res,
    };
    if let Err(e) = services.auth().authorize_management(principal.role(), user_id).await {
        return auth_error_to_response(e);
    }

    match services.auth().set_user_active(user_id, active).await {
        Ok(revoked_sessions) => {
            tracing::info!(actor = %principal.user_id(), target = %user_id, active, "activation changed by admin");
            Json(RevokedResponse {
                message: if active { "user activated" } else { "user deactivated" },
                revoked_sessions,
            })
            .into_response()
        }
        Err(e) => auth_error_to_response(e),
    }
}

pub async fn reset_password(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Result<Json<ResetPasswordRequest>, JsonRejection>,
) -> Response {
    let user_id = match parse_user_id(&id) {
        Ok(id) => id,
        Err(res) => return res,
    };
    let req = match json_body(body) {
        Ok(req) => req,
        Err(res) => return res,
    };
    if let Err(e) = services.auth().authorize_management(principal.role(), user_id).await {
        return auth_error_to_response(e);
    }

    match services.auth().reset_password(user_id, req.password).await {
        Ok(revoked_sessions) => {
            tracing::info!(actor = %principal.user_id(), target = %user_id, "password reset by admin");
            Json(RevokedResponse {
                message: "password reset",
                revoked_sessions,
            })
            .into_response()
        }
        Err(e) => auth_error_to_response(e),
    }
}

pub async fn delete_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let user_id = match parse_user_id(&id) {
        Ok(id) => id,
        Err(res) => return res,
    };

    if let Err(e) = services.auth().authorize_management(principal.role(), user_id).await {
        return auth_error_to_response(e);
    }

    match services.auth().delete_user(user_id).await {
        Ok(()) => {
            tracing::info!(actor = %principal.user_id(), target = %user_id, "user deleted by admin");
            Json(MessageResponse {
                message: "user deleted",
            })
            .into_response()
        }
        Err(e) => auth_error_to_response(e),
    }
}
