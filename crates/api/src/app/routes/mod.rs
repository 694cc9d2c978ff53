use std::sync::Arc;

use axum::{Router, routing::get};

use warden_auth::AuthorizationGuard;

use crate::authz::require_permission;

pub mod system;

/// Routes that require a verified caller. Each declares its own permission.
pub fn router(guard: Arc<AuthorizationGuard>) -> Router {
    Router::new().route(
        "/whoami",
        get(system::whoami).route_layer(require_permission(guard, system::WHOAMI_PERMISSION)),
    )
}
