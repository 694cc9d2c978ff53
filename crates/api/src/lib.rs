//! HTTP boundary for the authorization gate: routing, per-route permission
//! layers and the JSON error envelope.

pub mod app;
pub mod authz;
pub mod config;
pub mod context;
pub mod middleware;

pub use authz::{RequirePermissionLayer, require_permission};
pub use config::ServerConfig;
pub use context::{Caller, RequestId};
