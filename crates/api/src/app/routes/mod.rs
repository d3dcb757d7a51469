use axum::Router;

use crate::app::services::AppServices;

pub mod admin;
pub mod auth;
pub mod common;
pub mod system;

/// Routes that sit behind `/auth` and `/admin`. Each group installs its own
/// gates, so the allow-lists live next to the handlers they protect.
pub fn router(services: &AppServices) -> Router {
    Router::new()
        .nest("/auth", auth::router(services))
        .nest("/admin", admin::router(services))
        .merge(system::router(services))
}
