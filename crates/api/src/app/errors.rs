use axum::http::{HeaderValue, StatusCode, header};
use axum::response::IntoResponse;
use serde_json::json;

use folio_infra::{AuthError, StoreError};

pub fn auth_error_to_response(err: AuthError) -> axum::response::Response {
    match err {
        AuthError::InvalidCredentials => json_error(
            StatusCode::UNAUTHORIZED,
            "invalid_credentials",
            "invalid email or password",
        ),
        AuthError::InvalidOrExpiredRefreshToken => json_error(
            StatusCode::UNAUTHORIZED,
            "invalid_refresh_token",
            "invalid or expired refresh token",
        ),
        AuthError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "user not found"),
        AuthError::Forbidden => json_error(
            StatusCode::FORBIDDEN,
            "forbidden",
            "not permitted to manage this account",
        ),
        AuthError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        AuthError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        AuthError::Internal(msg) => {
            tracing::error!(error = %msg, "internal auth failure");
            internal_error()
        }
        AuthError::Store(e) => store_error_to_response(e),
    }
}

fn store_error_to_response(err: StoreError) -> axum::response::Response {
    if err.is_transient() {
        tracing::warn!(error = %err, "credential store unavailable");
        let mut res = json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "store_timeout",
            "credential store did not respond in time",
        );
        res.headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        return res;
    }

    tracing::error!(error = %err, "credential store failure");
    internal_error()
}

fn internal_error() -> axum::response::Response {
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "internal error")
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
