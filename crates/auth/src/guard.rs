//! The authorization pipeline wrapped around a protected operation.
//!
//! ```text
//! Start → CredentialExtracted → KeyResolved → SignatureVerified
//!       → ClaimsValidated → PermissionGranted → Invoked
//! ```
//!
//! Any failing stage ends the pipeline with its [`AuthFailure`]; no later
//! stage runs. The protected operation's own result is returned untouched.

use std::future::Future;
use std::sync::Arc;

use crate::{
    AuthConfig, AuthFailure, ClaimsRecord, HttpKeySetProvider, KeyStore, Permission,
    TokenVerifier, authorize, extract_bearer,
};

/// Pipeline stage reached by a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuardStage {
    Start,
    CredentialExtracted,
    KeyResolved,
    SignatureVerified,
    ClaimsValidated,
    PermissionGranted,
    Invoked,
}

impl GuardStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::CredentialExtracted => "credential_extracted",
            Self::KeyResolved => "key_resolved",
            Self::SignatureVerified => "signature_verified",
            Self::ClaimsValidated => "claims_validated",
            Self::PermissionGranted => "permission_granted",
            Self::Invoked => "invoked",
        }
    }
}

impl core::fmt::Display for GuardStage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extraction, verification and permission check composed into one gate.
///
/// Cheap to share: wrap in an `Arc` and hand it to every request path.
#[derive(Debug, Clone)]
pub struct AuthorizationGuard {
    verifier: TokenVerifier,
}

impl AuthorizationGuard {
    pub fn new(config: &AuthConfig, key_store: Arc<KeyStore>) -> Self {
        Self {
            verifier: TokenVerifier::new(config, key_store),
        }
    }

    /// Guard backed by the provider's HTTPS key set endpoint.
    pub fn from_config(config: &AuthConfig) -> Self {
        let provider = Arc::new(HttpKeySetProvider::new(config.jwks_url()));
        let key_store = Arc::new(KeyStore::with_settings(
            provider,
            config.key_cache_ttl,
            config.key_fetch_timeout,
        ));
        Self::new(config, key_store)
    }

    pub fn key_store(&self) -> &Arc<KeyStore> {
        self.verifier.key_store()
    }

    /// Run the pipeline up to `PermissionGranted` and return the claims.
    pub async fn authorize(
        &self,
        header: Option<&str>,
        required: &Permission,
    ) -> Result<ClaimsRecord, AuthFailure> {
        match self.run(header, required).await {
            Ok(claims) => {
                tracing::debug!(
                    permission = %required,
                    sub = claims.sub.as_deref().unwrap_or("-"),
                    stage = %GuardStage::PermissionGranted,
                    "request authorized"
                );
                Ok(claims)
            }
            Err(failure) => {
                log_rejection(&failure, required);
                Err(failure)
            }
        }
    }

    /// Authorize, then call `operation` with the verified claims.
    ///
    /// `operation` runs only when every stage passed. Its output, including
    /// any domain error it carries, is returned as is.
    pub async fn invoke<F, Fut>(
        &self,
        header: Option<&str>,
        required: &Permission,
        operation: F,
    ) -> Result<Fut::Output, AuthFailure>
    where
        F: FnOnce(ClaimsRecord) -> Fut,
        Fut: Future,
    {
        let claims = self.authorize(header, required).await?;
        Ok(operation(claims).await)
    }

    async fn run(
        &self,
        header: Option<&str>,
        required: &Permission,
    ) -> Result<ClaimsRecord, AuthFailure> {
        let credential = extract_bearer(header)?;
        let claims = self.verifier.verify(&credential).await?;
        authorize(&claims, required)?;
        Ok(claims)
    }
}

/// Log a rejection once with its kind, status, stage and cause.
///
/// Used by the guard itself and by transports that reject a request before
/// it reaches the guard.
pub fn log_rejection(failure: &AuthFailure, required: &Permission) {
    let stage = failure.kind().rejected_at();
    match failure.cause() {
        Some(cause) if failure.status() == 400 => tracing::warn!(
            kind = failure.code(),
            status = failure.status(),
            %stage,
            permission = %required,
            cause = %cause,
            "request rejected"
        ),
        Some(cause) => tracing::info!(
            kind = failure.code(),
            status = failure.status(),
            %stage,
            permission = %required,
            cause = %cause,
            "request rejected"
        ),
        None => tracing::info!(
            kind = failure.code(),
            status = failure.status(),
            %stage,
            permission = %required,
            "request rejected"
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use chrono::Utc;
    use serde_json::json;

    use super::*;
    use crate::AuthFailureKind;
    use crate::testutil::{ScriptedKeySetProvider, TestKey, test_config, valid_claims};

    fn guard() -> (Arc<ScriptedKeySetProvider>, AuthorizationGuard) {
        let provider = Arc::new(ScriptedKeySetProvider::new(vec![TestKey::primary().descriptor()]));
        let store = Arc::new(KeyStore::with_settings(
            provider.clone(),
            Duration::from_secs(600),
            Duration::from_secs(5),
        ));
        (provider, AuthorizationGuard::new(&test_config(), store))
    }

    fn bearer(token: &str) -> String {
        format!("Bearer {token}")
    }

    const READ: Permission = Permission::from_static("read:items");
    const WRITE: Permission = Permission::from_static("write:items");

    #[tokio::test]
    async fn header_problems_never_reach_the_key_store() {
        let (provider, guard) = guard();

        let cases = [
            (None, AuthFailureKind::MissingCredential),
            (Some(""), AuthFailureKind::MissingCredential),
            (Some("Bearer "), AuthFailureKind::MissingToken),
            (Some("Basic abc"), AuthFailureKind::MalformedScheme),
            (Some("Bearer a b"), AuthFailureKind::MalformedScheme),
        ];
        for (header, expected) in cases {
            let err = guard.authorize(header, &READ).await.unwrap_err();
            assert_eq!(err.kind(), expected, "{header:?}");
            assert_eq!(err.status(), 401);
            assert_eq!(err.kind().rejected_at(), GuardStage::Start);
        }
        assert_eq!(provider.fetch_count(), 0);
    }

    #[tokio::test]
    async fn read_permission_passes_and_write_is_denied() {
        let (_, guard) = guard();
        let header = bearer(&TestKey::primary().sign(&valid_claims(&["read:items"])));

        let claims = guard.authorize(Some(header.as_str()), &READ).await.unwrap();
        assert!(claims.has_permission("read:items"));

        let err = guard.authorize(Some(header.as_str()), &WRITE).await.unwrap_err();
        assert_eq!(err.kind(), AuthFailureKind::PermissionDenied);
        assert_eq!(err.status(), 403);
    }

    #[tokio::test]
    async fn expired_token_is_401_token_expired() {
        let (_, guard) = guard();
        let mut claims = valid_claims(&["read:items"]);
        claims["exp"] = json!(Utc::now().timestamp() - 60);
        let header = bearer(&TestKey::primary().sign(&claims));

        let err = guard.authorize(Some(header.as_str()), &READ).await.unwrap_err();
        assert_eq!(err.kind(), AuthFailureKind::TokenExpired);
        assert_eq!(err.status(), 401);
    }

    #[tokio::test]
    async fn token_without_permissions_claim_is_400() {
        let (_, guard) = guard();
        let mut claims = valid_claims(&[]);
        claims.as_object_mut().unwrap().remove("permissions");
        let header = bearer(&TestKey::primary().sign(&claims));

        let err = guard.authorize(Some(header.as_str()), &READ).await.unwrap_err();
        assert_eq!(err.kind(), AuthFailureKind::MissingPermissionsClaim);
        assert_eq!(err.status(), 400);
        assert_eq!(err.description(), "Permissions not included in JWT.");
    }

    #[tokio::test]
    async fn forged_token_is_rejected_before_permission_check() {
        let (_, guard) = guard();
        let forged = TestKey::rogue().sign_with(
            jsonwebtoken::Algorithm::RS256,
            Some(TestKey::PRIMARY_KID),
            &valid_claims(&["read:items"]),
        );

        let err = guard.authorize(Some(bearer(&forged).as_str()), &READ).await.unwrap_err();
        assert_eq!(err.kind(), AuthFailureKind::InvalidSignature);
        assert_eq!(err.kind().rejected_at(), GuardStage::KeyResolved);
    }

    #[tokio::test]
    async fn operation_result_is_returned_unchanged() {
        let (_, guard) = guard();
        let header = bearer(&TestKey::primary().sign(&valid_claims(&["read:items"])));

        let ok = guard
            .invoke(Some(header.as_str()), &READ, |claims| async move { claims.sub })
            .await
            .unwrap();
        assert_eq!(ok.as_deref(), Some("auth0|test-user"));

        let domain_err: Result<(), &str> = guard
            .invoke(Some(header.as_str()), &READ, |_| async { Err("item not found") })
            .await
            .unwrap();
        assert_eq!(domain_err, Err("item not found"));
    }

    #[tokio::test]
    async fn operation_is_not_invoked_on_rejection() {
        let (_, guard) = guard();
        let header = bearer(&TestKey::primary().sign(&valid_claims(&["read:items"])));
        let called = AtomicBool::new(false);

        let err = guard
            .invoke(Some(header.as_str()), &WRITE, |_| async {
                called.store(true, Ordering::SeqCst);
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), AuthFailureKind::PermissionDenied);
        assert!(!called.load(Ordering::SeqCst));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_with_unknown_kid_fetch_once() {
        let provider = Arc::new(
            ScriptedKeySetProvider::new(vec![TestKey::primary().descriptor()])
                .with_delay(Duration::from_millis(50)),
        );
        let store = Arc::new(KeyStore::with_settings(
            provider.clone(),
            Duration::from_secs(600),
            Duration::from_secs(5),
        ));
        let guard = Arc::new(AuthorizationGuard::new(&test_config(), store));
        let header = bearer(&TestKey::rogue().sign(&valid_claims(&["read:items"])));

        let tasks: Vec<_> = (0..12)
            .map(|_| {
                let guard = guard.clone();
                let header = header.clone();
                tokio::spawn(async move { guard.authorize(Some(header.as_str()), &READ).await })
            })
            .collect();

        for task in tasks {
            let err = task.await.unwrap().unwrap_err();
            assert_eq!(err.kind(), AuthFailureKind::KeyNotFound);
        }
        assert_eq!(provider.fetch_count(), 1);
    }

    #[test]
    fn every_failure_kind_reports_a_pre_grant_stage() {
        use AuthFailureKind::*;

        for kind in [
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
        ] {
            let stage = kind.rejected_at();
            assert_ne!(stage, GuardStage::PermissionGranted, "{kind}");
            assert_ne!(stage, GuardStage::Invoked, "{kind}");
        }
    }
}
