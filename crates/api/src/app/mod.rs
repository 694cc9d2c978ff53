//! HTTP application wiring (axum router).
//!
//! - `routes/`: handlers, one file per area
//! - `errors.rs`: the JSON error envelope

use std::sync::Arc;

use axum::{Router, routing::get};
use tower::ServiceBuilder;

use warden_auth::AuthorizationGuard;

use crate::middleware;

pub mod errors;
pub mod routes;

/// Build the full HTTP router (used by `main.rs` and the black-box tests).
pub fn build_app(guard: Arc<AuthorizationGuard>) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router(guard))
        .fallback(errors::not_found)
        .layer(ServiceBuilder::new().layer(axum::middleware::from_fn(middleware::request_context)))
}
