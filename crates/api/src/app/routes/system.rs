use axum::{
    Extension, Json, Router,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};

use crate::app::services::AppServices;
use crate::context::PrincipalContext;
use crate::middleware::{self, Gate};

pub fn router(services: &AppServices) -> Router {
    Router::new()
        .route("/whoami", get(whoami))
        .route_layer(axum::middleware::from_fn_with_state(
            Gate::authenticated(services.signer()),
            middleware::require_role,
        ))
}

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// Echo the identity the gate derived from the access token. No store lookup.
pub async fn whoami(Extension(principal): Extension<PrincipalContext>) -> impl IntoResponse {
    Json(serde_json::json!({
        "userId": principal.user_id().to_string(),
        "email": principal.email(),
        "role": principal.role().as_str(),
    }))
}
