use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;

use folio_auth::UserId;

use crate::app::errors::json_error;

/// Unwrap a JSON body, turning extractor rejections into our error shape.
pub fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, axum::response::Response> {
    body.map(|Json(value)| value).map_err(|rejection| {
        json_error(StatusCode::BAD_REQUEST, "validation_error", rejection.body_text())
    })
}

pub fn parse_user_id(raw: &str) -> Result<UserId, axum::response::Response> {
    raw.parse::<UserId>()
        .map_err(|e| json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string()))
}
