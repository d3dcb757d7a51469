//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: credential store selection and the auth service
//! - `routes/`: HTTP routes + handlers, each group with its own role gates
//! - `dto.rs`: request/response bodies
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(services: Arc<services::AppServices>) -> Router {
    let gated = routes::router(&services);

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(gated)
        .layer(Extension(services))
}
