//! Identity provider key set: wire format, immutable snapshot and the fetch seam.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::KeyFetchError;

/// One entry of the provider's published key set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyDescriptor {
    pub kty: String,
    pub kid: String,
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
    /// RSA modulus, base64url.
    pub n: String,
    /// RSA exponent, base64url.
    pub e: String,
}

/// Raw JWKS document (`{"keys": [...]}`).
///
/// Entries are parsed loosely so that one key the gate cannot use does not
/// invalidate the whole set.
#[derive(Debug, Deserialize)]
pub struct JwksDocument {
    pub keys: Vec<JwkEntry>,
}

#[derive(Debug, Deserialize)]
pub struct JwkEntry {
    pub kty: String,
    #[serde(default)]
    pub kid: Option<String>,
    #[serde(rename = "use", default)]
    pub key_use: Option<String>,
    #[serde(default)]
    pub n: Option<String>,
    #[serde(default)]
    pub e: Option<String>,
}

impl JwksDocument {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyFetchError> {
        serde_json::from_slice(bytes).map_err(|e| KeyFetchError::Malformed(e.to_string()))
    }

    /// Keep entries that carry a key id and RSA components, in published order.
    pub fn into_descriptors(self) -> Vec<KeyDescriptor> {
        self.keys
            .into_iter()
            .filter_map(|entry| match (entry.kid, entry.n, entry.e) {
                (Some(kid), Some(n), Some(e)) if !kid.is_empty() => Some(KeyDescriptor {
                    kty: entry.kty,
                    kid,
                    key_use: entry.key_use,
                    n,
                    e,
                }),
                (kid, _, _) => {
                    tracing::debug!(kid = ?kid, kty = %entry.kty, "skipping unusable key set entry");
                    None
                }
            })
            .collect()
    }
}

/// Immutable snapshot of the provider's key set.
///
/// Replaced wholesale on refresh, never mutated in place.
#[derive(Debug, Clone)]
pub struct KeySet {
    keys: Vec<KeyDescriptor>,
    fetched_at: Instant,
}

impl KeySet {
    pub fn new(keys: Vec<KeyDescriptor>) -> Self {
        Self {
            keys,
            fetched_at: Instant::now(),
        }
    }

    /// Exact key id match; there is no fallback.
    pub fn find(&self, kid: &str) -> Option<&KeyDescriptor> {
        self.keys.iter().find(|key| key.kid == kid)
    }

    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Source of the provider's key set.
///
/// Production uses [`HttpKeySetProvider`]; tests substitute an in-memory
/// provider to observe fetch counts.
#[async_trait]
pub trait KeySetProvider: Send + Sync {
    async fn fetch_key_set(&self) -> Result<Vec<KeyDescriptor>, KeyFetchError>;
}

/// Fetches `{"keys": [...]}` over HTTPS with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpKeySetProvider {
    client: reqwest::Client,
    url: String,
}

impl HttpKeySetProvider {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), url)
    }

    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl KeySetProvider for HttpKeySetProvider {
    async fn fetch_key_set(&self) -> Result<Vec<KeyDescriptor>, KeyFetchError> {
        let response = self
            .client
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(KeyFetchError::transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(KeyFetchError::Status(status.as_u16()));
        }

        let body = response.bytes().await.map_err(KeyFetchError::transport)?;
        let keys = JwksDocument::from_slice(&body)?.into_descriptors();

        tracing::debug!(url = %self.url, keys = keys.len(), "fetched key set");
        Ok(keys)
    }
}
