use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::Response,
};
use uuid::Uuid;

use warden_auth::ClaimsRecord;

use crate::app::errors::json_error;

/// The verified caller of a protected route.
///
/// Only available behind [`require_permission`](crate::authz::require_permission);
/// extracting it elsewhere is a wiring error and yields a 500.
#[derive(Debug, Clone, PartialEq)]
pub struct Caller(ClaimsRecord);

impl Caller {
    pub fn claims(&self) -> &ClaimsRecord {
        &self.0
    }

    pub fn subject(&self) -> Option<&str> {
        self.0.sub.as_deref()
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<ClaimsRecord>() {
            Some(claims) => Ok(Self(claims.clone())),
            None => {
                tracing::error!(path = %parts.uri.path(), "Caller extracted on an unprotected route");
                Err(json_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error",
                ))
            }
        }
    }
}

/// Correlation id assigned to each request.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for RequestId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.0.fmt(f)
    }
}
