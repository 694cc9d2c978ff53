//! Test helpers: fixture RSA keys, token minting and an in-memory key set
//! provider that counts fetches.
//!
//! Compiled for this crate's own tests and, for other crates, behind the
//! `test-util` feature:
//!
//! ```toml
//! [dev-dependencies]
//! warden-auth = { path = "../auth", features = ["test-util"] }
//! ```

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{Value, json};

use crate::{AuthConfig, KeyDescriptor, KeyFetchError, KeySetProvider};

pub const TEST_DOMAIN: &str = "warden-test.example.com";
pub const TEST_AUDIENCE: &str = "movies-api";

/// Issuer matching [`test_config`].
pub fn test_issuer() -> String {
    format!("https://{TEST_DOMAIN}/")
}

/// Configuration matching tokens minted by [`TestKey`].
pub fn test_config() -> AuthConfig {
    AuthConfig::new(TEST_DOMAIN, TEST_AUDIENCE)
}

/// A fixture RSA key pair with its published (JWK) form.
#[derive(Debug, Clone)]
pub struct TestKey {
    pub kid: &'static str,
    pem: &'static str,
    n: &'static str,
    e: &'static str,
}

impl TestKey {
    pub const PRIMARY_KID: &'static str = "primary-2024";
    pub const ROGUE_KID: &'static str = "rogue-2024";

    /// The key the test provider publishes and signs with.
    pub fn primary() -> Self {
        Self {
            kid: Self::PRIMARY_KID,
            pem: include_str!("../fixtures/primary.pem"),
            n: "nHDv9l5CoYN6XpPLU0dLCFspRxTU68gHFO2T1Er36xpbKS9ovp5QRqsFx4LDp7yGIuPlW-SbHLZggkfNIufIgaoxySA7tqXGDRmYqzVghn-cUo8aDUEQRN1In9PcWXkCpEdl5W3NnVqUabh0VntRDOsPlxS6TVAueecOWQ-_izaXiyt0lvQHjZHUhnnC9zQU0H6XJOh-hSWZY_jZht9Ave67wnXhRtlmO0fL5Xf7zA0SiocmHDoJXJa9zok5o9xmK5w6wTEjGiyc9Sz9GdFsqI4O5PdZvSTWERt_tmBWPLVAnHIPnRIaH7ld--V6seGywrIOPGA5IcnCMDG1nxAZvQ",
            e: "AQAB",
        }
    }

    /// A key that is not published by default; used to forge tokens.
    pub fn rogue() -> Self {
        Self {
            kid: Self::ROGUE_KID,
            pem: include_str!("../fixtures/rogue.pem"),
            n: "q4apkAhxSamCXaL0_MJAOuYZK8EIKXMPIfAjzNwg_dFKrV52BB91KfKRpU5c2Akl54C2VqyUec5at21IsPuLnzjSnwVI9QhQlILmauEW22rAUD_GdvfOGpL-X8hG2i-P7Ape-1F0bckCyZhVbl25D2WI8Y8tChlsa_MMwktIYdTvYcHknNTuj6mRGm_31JBOtgwah4VMbGXIuDBbQUW8lYMrk7u6jGNk4SFa-i-tYCeFzA9V8EVJ1RcZ9RaYTaWj5113GA8vZJoXYI_Bc3bVl21W7vjQrXhEHHyLdJDWb4cw2WVa3C5pREZEjYefo3wd7Bi9HnTBoBSOe1h0zF_pBQ",
            e: "AQAB",
        }
    }

    pub fn descriptor(&self) -> KeyDescriptor {
        KeyDescriptor {
            kty: "RSA".to_string(),
            kid: self.kid.to_string(),
            key_use: Some("sig".to_string()),
            n: self.n.to_string(),
            e: self.e.to_string(),
        }
    }

    /// JWK object as a provider would publish it.
    pub fn jwk(&self) -> Value {
        json!({
            "kty": "RSA",
            "kid": self.kid,
            "use": "sig",
            "alg": "RS256",
            "n": self.n,
            "e": self.e,
        })
    }

    /// # Panics
    ///
    /// Panics if the fixture PEM is unreadable.
    pub fn encoding_key(&self) -> EncodingKey {
        EncodingKey::from_rsa_pem(self.pem.as_bytes()).expect("fixture key must parse")
    }

    /// RS256 token with this key's `kid`.
    pub fn sign(&self, claims: &Value) -> String {
        self.sign_with(Algorithm::RS256, Some(self.kid), claims)
    }

    /// # Panics
    ///
    /// Panics if encoding fails.
    pub fn sign_with(&self, alg: Algorithm, kid: Option<&str>, claims: &Value) -> String {
        let mut header = Header::new(alg);
        header.kid = kid.map(str::to_string);
        jsonwebtoken::encode(&header, claims, &self.encoding_key()).expect("failed to encode test JWT")
    }
}

/// `{"keys": [...]}` for the given keys.
pub fn jwks_document(keys: &[TestKey]) -> Value {
    json!({ "keys": keys.iter().map(TestKey::jwk).collect::<Vec<_>>() })
}

/// Claims valid for one hour against [`test_config`].
pub fn valid_claims(permissions: &[&str]) -> Value {
    let now = Utc::now().timestamp();
    json!({
        "iss": test_issuer(),
        "sub": "auth0|test-user",
        "aud": TEST_AUDIENCE,
        "iat": now,
        "exp": now + 3600,
        "permissions": permissions,
    })
}

/// Assemble a token from raw header/claims JSON with an arbitrary signature
/// segment. Used for `alg: none` and malformed-header cases.
pub fn craft_token(header: &Value, claims: &Value, signature: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(header.to_string());
    let claims = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{claims}.{signature}")
}

/// In-memory [`KeySetProvider`] with a fetch counter, optional latency and
/// switchable failure.
#[derive(Debug, Default)]
pub struct ScriptedKeySetProvider {
    keys: Mutex<Vec<KeyDescriptor>>,
    failing: AtomicBool,
    delay: Option<Duration>,
    fetches: AtomicUsize,
}

impl ScriptedKeySetProvider {
    pub fn new(keys: Vec<KeyDescriptor>) -> Self {
        Self {
            keys: Mutex::new(keys),
            ..Self::default()
        }
    }

    /// A provider whose every fetch fails.
    pub fn failing() -> Self {
        let provider = Self::default();
        provider.fail_next_fetches();
        provider
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Replace the published key set.
    pub fn publish(&self, keys: Vec<KeyDescriptor>) {
        *self.keys.lock().expect("provider lock poisoned") = keys;
    }

    pub fn fail_next_fetches(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeySetProvider for ScriptedKeySetProvider {
    async fn fetch_key_set(&self) -> Result<Vec<KeyDescriptor>, KeyFetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(KeyFetchError::Status(503));
        }

        Ok(self.keys.lock().expect("provider lock poisoned").clone())
    }
}
