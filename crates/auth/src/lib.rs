//! `warden-auth`: bearer-token authorization gate.
//!
//! Extracts a bearer credential, resolves the identity provider's signing
//! key, verifies the token, validates its claims and checks a required
//! permission before a protected operation runs. Transport-agnostic: the
//! HTTP boundary lives in `warden-api`.

pub mod authorize;
pub mod claims;
pub mod config;
pub mod error;
pub mod extract;
pub mod guard;
pub mod jwks;
pub mod key_store;
pub mod permissions;
pub mod verify;

#[cfg(any(test, feature = "test-util"))]
pub mod testutil;

pub use authorize::authorize;
pub use claims::{Audience, ClaimsRecord};
pub use config::AuthConfig;
pub use error::{AuthFailure, AuthFailureKind, ConfigError, KeyFetchError, SharedError};
pub use extract::{RawCredential, extract_bearer};
pub use guard::{AuthorizationGuard, GuardStage, log_rejection};
pub use jwks::{HttpKeySetProvider, JwksDocument, KeyDescriptor, KeySet, KeySetProvider};
pub use key_store::KeyStore;
pub use permissions::Permission;
pub use verify::TokenVerifier;
