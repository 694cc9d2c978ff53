use axum::{Json, http::StatusCode};
use serde::Serialize;

use warden_auth::Permission;

use crate::context::Caller;

pub const WHOAMI_PERMISSION: Permission = Permission::from_static("read:whoami");

pub async fn health() -> StatusCode {
    StatusCode::OK
}

#[derive(Debug, Serialize)]
pub struct WhoAmI {
    pub sub: Option<String>,
    pub permissions: Vec<String>,
    pub audience: Vec<String>,
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

pub async fn whoami(caller: Caller) -> Json<WhoAmI> {
    let claims = caller.claims();
    Json(WhoAmI {
        sub: caller.subject().map(str::to_string),
        permissions: claims
            .permissions
            .iter()
            .flatten()
            .cloned()
            .collect(),
        audience: claims.aud.iter().map(str::to_string).collect(),
        expires_at: claims.expires_at(),
    })
}
