//! Per-route permission enforcement.
//!
//! ```ignore
//! Router::new().route(
//!     "/items",
//!     get(list_items).route_layer(require_permission(guard.clone(), "read:items")),
//! )
//! ```
//!
//! The wrapped handler runs only after the guard approved the request; the
//! verified [`ClaimsRecord`](warden_auth::ClaimsRecord) is then available in
//! request extensions (see [`Caller`](crate::context::Caller)).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::{
    body::Body,
    http::{Request, header::AUTHORIZATION},
    response::Response,
};
use tower::{Layer, Service};

use warden_auth::{AuthFailure, AuthorizationGuard, Permission, log_rejection};

use crate::app::errors::auth_failure_response;

/// Wrap a route so that it requires `permission`.
pub fn require_permission(
    guard: Arc<AuthorizationGuard>,
    permission: impl Into<Permission>,
) -> RequirePermissionLayer {
    RequirePermissionLayer {
        guard,
        permission: permission.into(),
    }
}

#[derive(Debug, Clone)]
pub struct RequirePermissionLayer {
    guard: Arc<AuthorizationGuard>,
    permission: Permission,
}

impl<S> Layer<S> for RequirePermissionLayer {
    type Service = RequirePermission<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequirePermission {
            inner,
            guard: self.guard.clone(),
            permission: self.permission.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RequirePermission<S> {
    inner: S,
    guard: Arc<AuthorizationGuard>,
    permission: Permission,
}

impl<S> Service<Request<Body>> for RequirePermission<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        // Take the service that was driven to readiness; leave a fresh clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let guard = self.guard.clone();
        let permission = self.permission.clone();

        Box::pin(async move {
            let header = match authorization_header(&req) {
                Ok(header) => header,
                Err(failure) => {
                    log_rejection(&failure, &permission);
                    return Ok(auth_failure_response(&failure));
                }
            };

            let outcome = guard
                .invoke(header.as_deref(), &permission, |claims| async move {
                    let mut req = req;
                    req.extensions_mut().insert(claims);
                    inner.call(req).await
                })
                .await;

            match outcome {
                Ok(response) => response,
                Err(failure) => Ok(auth_failure_response(&failure)),
            }
        })
    }
}

/// The `Authorization` header as text. Absent is fine; non-UTF-8 is not.
fn authorization_header(req: &Request<Body>) -> Result<Option<String>, AuthFailure> {
    match req.headers().get(AUTHORIZATION) {
        None => Ok(None),
        Some(value) => value.to_str().map(|s| Some(s.to_string())).map_err(|_| {
            AuthFailure::malformed_scheme("Authorization header must be a bearer token.")
        }),
    }
}
