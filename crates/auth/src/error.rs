//! Failure taxonomy for the authorization pipeline.
//!
//! Every stage constructs its [`AuthFailure`] at the point of detection; the
//! failure then travels unchanged to the transport boundary, which renders it
//! with [`AuthFailure::status`] and [`AuthFailure::description`].

use std::borrow::Cow;
use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::guard::GuardStage;

/// Shared, cloneable error cause.
pub type SharedError = Arc<dyn StdError + Send + Sync>;

/// Kind of authorization failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthFailureKind {
    MissingCredential,
    MalformedScheme,
    MissingToken,
    MalformedToken,
    KeyNotFound,
    KeyResolutionFailed,
    InvalidSignature,
    TokenExpired,
    InvalidClaims,
    UnparseableToken,
    MissingPermissionsClaim,
    PermissionDenied,
}

impl AuthFailureKind {
    /// Transport status code suggested for this kind.
    pub fn status_code(self) -> u16 {
        match self {
            Self::MissingCredential
            | Self::MalformedScheme
            | Self::MissingToken
            | Self::MalformedToken
            | Self::InvalidSignature
            | Self::TokenExpired
            | Self::InvalidClaims => 401,
            Self::KeyNotFound
            | Self::KeyResolutionFailed
            | Self::UnparseableToken
            | Self::MissingPermissionsClaim => 400,
            Self::PermissionDenied => 403,
        }
    }

    /// Stable identifier used in logs.
    pub fn code(self) -> &'static str {
        match self {
            Self::MissingCredential => "missing_credential",
            Self::MalformedScheme => "malformed_scheme",
            Self::MissingToken => "missing_token",
            Self::MalformedToken => "malformed_token",
            Self::KeyNotFound => "key_not_found",
            Self::KeyResolutionFailed => "key_resolution_failed",
            Self::InvalidSignature => "invalid_signature",
            Self::TokenExpired => "token_expired",
            Self::InvalidClaims => "invalid_claims",
            Self::UnparseableToken => "unparseable_token",
            Self::MissingPermissionsClaim => "missing_permissions_claim",
            Self::PermissionDenied => "permission_denied",
        }
    }

    /// The pipeline stage that was being attempted when this kind is raised.
    pub fn rejected_at(self) -> GuardStage {
        match self {
            Self::MissingCredential | Self::MalformedScheme | Self::MissingToken => {
                GuardStage::Start
            }
            Self::MalformedToken | Self::KeyNotFound | Self::KeyResolutionFailed => {
                GuardStage::CredentialExtracted
            }
            Self::InvalidSignature | Self::UnparseableToken => GuardStage::KeyResolved,
            Self::TokenExpired | Self::InvalidClaims => GuardStage::SignatureVerified,
            Self::MissingPermissionsClaim | Self::PermissionDenied => GuardStage::ClaimsValidated,
        }
    }

    fn default_description(self) -> &'static str {
        match self {
            Self::MissingCredential => "Authorization header is missing.",
            Self::MalformedScheme => "Authorization header must be a bearer token.",
            Self::MissingToken => "Token not found.",
            Self::MalformedToken => "Authorization malformed.",
            Self::KeyNotFound => "Unable to find the appropriate key.",
            Self::KeyResolutionFailed => "Unable to fetch the identity provider's signing keys.",
            Self::InvalidSignature => "Token signature is invalid.",
            Self::TokenExpired => "Token expired.",
            Self::InvalidClaims => "Incorrect claims. Please, check the audience and issuer.",
            Self::UnparseableToken => "Unable to parse authentication token.",
            Self::MissingPermissionsClaim => "Permissions not included in JWT.",
            Self::PermissionDenied => "Permission not found.",
        }
    }
}

impl core::fmt::Display for AuthFailureKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.code())
    }
}

/// Terminal value of a failed pipeline stage.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {description}")]
pub struct AuthFailure {
    kind: AuthFailureKind,
    description: Cow<'static, str>,
    #[source]
    source: Option<SharedError>,
}

impl AuthFailure {
    pub fn new(kind: AuthFailureKind) -> Self {
        Self {
            kind,
            description: Cow::Borrowed(kind.default_description()),
            source: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<Cow<'static, str>>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    pub fn kind(&self) -> AuthFailureKind {
        self.kind
    }

    pub fn status(&self) -> u16 {
        self.kind.status_code()
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Human-readable description, safe to show to callers.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Underlying cause kept for diagnostics; never rendered to callers.
    pub fn cause(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    pub fn missing_credential() -> Self {
        Self::new(AuthFailureKind::MissingCredential)
    }

    pub fn malformed_scheme(description: &'static str) -> Self {
        Self::new(AuthFailureKind::MalformedScheme).with_description(description)
    }

    pub fn missing_token() -> Self {
        Self::new(AuthFailureKind::MissingToken)
    }

    pub fn malformed_token(description: impl Into<Cow<'static, str>>) -> Self {
        Self::new(AuthFailureKind::MalformedToken).with_description(description)
    }

    pub fn key_not_found(kid: &str) -> Self {
        Self::new(AuthFailureKind::KeyNotFound)
            .with_description(format!("Unable to find the appropriate key (kid '{kid}')."))
    }

    pub fn key_resolution_failed(cause: KeyFetchError) -> Self {
        Self::new(AuthFailureKind::KeyResolutionFailed).with_source(cause)
    }

    pub fn invalid_signature() -> Self {
        Self::new(AuthFailureKind::InvalidSignature)
    }

    pub fn token_expired() -> Self {
        Self::new(AuthFailureKind::TokenExpired)
    }

    pub fn invalid_claims() -> Self {
        Self::new(AuthFailureKind::InvalidClaims)
    }

    pub fn unparseable(cause: impl StdError + Send + Sync + 'static) -> Self {
        Self::new(AuthFailureKind::UnparseableToken).with_source(cause)
    }

    pub fn missing_permissions_claim() -> Self {
        Self::new(AuthFailureKind::MissingPermissionsClaim)
    }

    pub fn permission_denied(required: &str) -> Self {
        Self::new(AuthFailureKind::PermissionDenied)
            .with_description(format!("Permission not found: '{required}'."))
    }
}

impl From<jsonwebtoken::errors::Error> for AuthFailure {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                AuthFailure::invalid_signature().with_source(err)
            }
            ErrorKind::ExpiredSignature => AuthFailure::token_expired(),
            ErrorKind::InvalidAudience
            | ErrorKind::InvalidIssuer
            | ErrorKind::ImmatureSignature
            | ErrorKind::MissingRequiredClaim(_) => AuthFailure::invalid_claims().with_source(err),
            _ => AuthFailure::unparseable(err),
        }
    }
}

/// Failure to obtain the identity provider's key set.
#[derive(Debug, Clone, Error)]
pub enum KeyFetchError {
    #[error("key set request failed: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<SharedError>,
    },

    #[error("key set endpoint answered with status {0}")]
    Status(u16),

    #[error("malformed key set document: {0}")]
    Malformed(String),

    #[error("key set fetch timed out after {0:?}")]
    Timeout(Duration),
}

impl KeyFetchError {
    pub fn transport(err: impl StdError + Send + Sync + 'static) -> Self {
        Self::Transport {
            message: err.to_string(),
            source: Some(Arc::new(err)),
        }
    }
}

/// Startup configuration problems.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration from environment: {0}")]
    Env(#[from] envy::Error),

    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("algorithm '{0}' is not permitted")]
    ForbiddenAlgorithm(String),

    #[error("unknown algorithm '{0}'")]
    UnknownAlgorithm(String),

    #[error("at least one signature algorithm must be allowed")]
    NoAlgorithms,

    #[error("key fetch timeout must be greater than zero")]
    ZeroFetchTimeout,
}
