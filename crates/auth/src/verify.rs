//! Token verification against the identity provider's published keys.
//!
//! Order of checks:
//! 1. Structure and header (`kid` required, `alg` allow-listed)
//! 2. Key resolution by `kid`
//! 3. Signature
//! 4. Registered claims (`exp`, `nbf`, `aud`, `iss`)
//! 5. Conversion into [`ClaimsRecord`]
//!
//! Claims are decoded into an untyped object first so that an expired token
//! is always reported as expired, whatever else is wrong with its payload.

use std::str::FromStr;
use std::sync::Arc;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::{AuthConfig, AuthFailure, ClaimsRecord, KeyStore, RawCredential};

/// The parts of the unverified JOSE header the gate looks at.
#[derive(Debug, Deserialize)]
struct UnverifiedHeader {
    alg: String,
    #[serde(default)]
    kid: Option<String>,
}

/// Verifies bearer tokens and yields their claims.
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    algorithms: Vec<Algorithm>,
    validation: Validation,
    key_store: Arc<KeyStore>,
}

impl TokenVerifier {
    pub fn new(config: &AuthConfig, key_store: Arc<KeyStore>) -> Self {
        let algorithms = config.algorithms.clone();

        let mut validation = Validation::new(Algorithm::RS256);
        validation.algorithms = algorithms.clone();
        validation.leeway = config.leeway.as_secs();
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_audience(&[config.audience.as_str()]);
        validation.set_issuer(&[config.issuer()]);
        validation.set_required_spec_claims(&["exp"]);

        Self {
            algorithms,
            validation,
            key_store,
        }
    }

    pub fn key_store(&self) -> &Arc<KeyStore> {
        &self.key_store
    }

    /// Verify `credential` and return its claims.
    pub async fn verify(&self, credential: &RawCredential) -> Result<ClaimsRecord, AuthFailure> {
        let token = credential.as_str();
        let header = decode_header(token)?;

        let kid = match header.kid.as_deref() {
            Some(kid) if !kid.is_empty() => kid,
            _ => return Err(AuthFailure::malformed_token("Authorization malformed.")),
        };

        // Reject before any key lookup so a forged header cannot trigger fetches.
        let alg = match Algorithm::from_str(&header.alg) {
            Ok(alg) if self.algorithms.contains(&alg) => alg,
            _ => {
                tracing::debug!(alg = %header.alg, "token algorithm not allowed");
                return Err(AuthFailure::invalid_signature()
                    .with_description(format!("Token algorithm '{}' is not allowed.", header.alg)));
            }
        };

        let key = self.key_store.resolve(kid).await?;
        let decoding_key =
            DecodingKey::from_rsa_components(&key.n, &key.e).map_err(AuthFailure::unparseable)?;

        let data = jsonwebtoken::decode::<Map<String, Value>>(token, &decoding_key, &self.validation)?;
        tracing::trace!(kid, ?alg, "token signature and claims verified");

        // `decode` only checks `iss`/`aud` when they are present.
        require_claims(&data.claims, &["iss", "aud"])?;

        ClaimsRecord::from_verified(data.claims)
    }
}

fn require_claims(claims: &Map<String, Value>, names: &[&str]) -> Result<(), AuthFailure> {
    match names
        .iter()
        .find(|name| claims.get(**name).is_none_or(Value::is_null))
    {
        Some(missing) => {
            tracing::debug!(claim = *missing, "required claim absent");
            Err(AuthFailure::invalid_claims())
        }
        None => Ok(()),
    }
}

fn decode_header(token: &str) -> Result<UnverifiedHeader, AuthFailure> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(AuthFailure::malformed_token("Authorization malformed."));
    }

    let raw = URL_SAFE_NO_PAD
        .decode(segments[0])
        .map_err(|e| AuthFailure::malformed_token("Authorization malformed.").with_source(e))?;

    serde_json::from_slice(&raw)
        .map_err(|e| AuthFailure::malformed_token("Authorization malformed.").with_source(e))
}
