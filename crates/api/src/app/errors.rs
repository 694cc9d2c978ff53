use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use warden_auth::AuthFailure;

/// Render an authorization failure as the JSON error envelope.
///
/// Only the status and the failure's description are exposed; the cause
/// stays in the logs.
pub fn auth_failure_response(failure: &AuthFailure) -> Response {
    let status =
        StatusCode::from_u16(failure.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    json_error(status, failure.description())
}

/// `{"success": false, "error": <status>, "message": <message>}`
pub fn json_error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "success": false,
            "error": status.as_u16(),
            "message": message.into(),
        })),
    )
        .into_response()
}

pub async fn not_found() -> Response {
    json_error(StatusCode::NOT_FOUND, "resource not found")
}
