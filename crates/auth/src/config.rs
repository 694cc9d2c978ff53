//! Identity provider configuration.
//!
//! Read once at process start (see [`AuthConfig::from_env`]) and static
//! thereafter.

use std::str::FromStr;
use std::time::Duration;

use jsonwebtoken::Algorithm;
use serde::Deserialize;

use crate::ConfigError;

/// Default key set cache lifetime.
pub const DEFAULT_KEY_CACHE_TTL: Duration = Duration::from_secs(600);

/// Default upper bound for one key set fetch.
pub const DEFAULT_KEY_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Algorithms that may appear in the allow-list (RSA family only).
pub const PERMITTED_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    /// Identity provider domain, e.g. `tenant.eu.auth0.com`.
    pub domain: String,
    /// Expected `aud` value.
    pub audience: String,
    /// Signature algorithms tokens may be verified with.
    pub algorithms: Vec<Algorithm>,
    pub key_cache_ttl: Duration,
    pub key_fetch_timeout: Duration,
    /// Clock skew tolerated when checking `exp`/`nbf`.
    pub leeway: Duration,
    issuer: Option<String>,
    jwks_url: Option<String>,
}

impl AuthConfig {
    pub fn new(domain: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            audience: audience.into(),
            algorithms: vec![Algorithm::RS256],
            key_cache_ttl: DEFAULT_KEY_CACHE_TTL,
            key_fetch_timeout: DEFAULT_KEY_FETCH_TIMEOUT,
            leeway: Duration::ZERO,
            issuer: None,
            jwks_url: None,
        }
    }

    pub fn with_algorithms(mut self, algorithms: Vec<Algorithm>) -> Self {
        self.algorithms = algorithms;
        self
    }

    pub fn with_key_cache_ttl(mut self, ttl: Duration) -> Self {
        self.key_cache_ttl = ttl;
        self
    }

    pub fn with_key_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.key_fetch_timeout = timeout;
        self
    }

    pub fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }

    /// Override the issuer derived from the domain.
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Override the key set location derived from the domain.
    pub fn with_jwks_url(mut self, url: impl Into<String>) -> Self {
        self.jwks_url = Some(url.into());
        self
    }

    /// Expected `iss` claim: `https://{domain}/` unless overridden.
    pub fn issuer(&self) -> String {
        match &self.issuer {
            Some(issuer) => issuer.clone(),
            None => format!("https://{}/", self.domain),
        }
    }

    /// Key set location: `https://{domain}/.well-known/jwks.json` unless overridden.
    pub fn jwks_url(&self) -> String {
        match &self.jwks_url {
            Some(url) => url.clone(),
            None => format!("https://{}/.well-known/jwks.json", self.domain),
        }
    }

    /// Load from `AUTH_*` environment variables and validate.
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw: RawAuthEnv = envy::prefixed("AUTH_").from_env()?;
        raw.into_config()
    }

    /// Same as [`from_env`](Self::from_env) but over an explicit variable set.
    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let raw: RawAuthEnv = envy::prefixed("AUTH_").from_iter(vars)?;
        raw.into_config()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.domain.trim().is_empty() {
            return Err(ConfigError::Empty("AUTH_DOMAIN"));
        }
        if self.audience.trim().is_empty() {
            return Err(ConfigError::Empty("AUTH_AUDIENCE"));
        }
        if self.algorithms.is_empty() {
            return Err(ConfigError::NoAlgorithms);
        }
        if let Some(alg) = self
            .algorithms
            .iter()
            .find(|alg| !PERMITTED_ALGORITHMS.contains(alg))
        {
            return Err(ConfigError::ForbiddenAlgorithm(format!("{alg:?}")));
        }
        if self.key_fetch_timeout.is_zero() {
            return Err(ConfigError::ZeroFetchTimeout);
        }
        Ok(())
    }
}

/// Environment shape (`AUTH_` prefix stripped).
#[derive(Debug, Deserialize)]
struct RawAuthEnv {
    domain: String,
    audience: String,
    #[serde(default = "default_algorithms")]
    algorithms: Vec<String>,
    #[serde(default = "default_ttl_secs")]
    key_cache_ttl_secs: u64,
    #[serde(default = "default_timeout_ms")]
    key_fetch_timeout_ms: u64,
    #[serde(default)]
    leeway_secs: u64,
    issuer: Option<String>,
    jwks_url: Option<String>,
}

fn default_algorithms() -> Vec<String> {
    vec!["RS256".to_string()]
}

fn default_ttl_secs() -> u64 {
    DEFAULT_KEY_CACHE_TTL.as_secs()
}

fn default_timeout_ms() -> u64 {
    DEFAULT_KEY_FETCH_TIMEOUT.as_millis() as u64
}

impl RawAuthEnv {
    fn into_config(self) -> Result<AuthConfig, ConfigError> {
        let algorithms = self
            .algorithms
            .iter()
            .map(|name| name.trim())
            .filter(|name| !name.is_empty())
            .map(parse_algorithm)
            .collect::<Result<Vec<_>, _>>()?;

        let mut config = AuthConfig::new(self.domain, self.audience)
            .with_algorithms(algorithms)
            .with_key_cache_ttl(Duration::from_secs(self.key_cache_ttl_secs))
            .with_key_fetch_timeout(Duration::from_millis(self.key_fetch_timeout_ms))
            .with_leeway(Duration::from_secs(self.leeway_secs));
        config.issuer = self.issuer.filter(|s| !s.trim().is_empty());
        config.jwks_url = self.jwks_url.filter(|s| !s.trim().is_empty());

        config.validate()?;
        Ok(config)
    }
}

fn parse_algorithm(name: &str) -> Result<Algorithm, ConfigError> {
    if name.eq_ignore_ascii_case("none") {
        return Err(ConfigError::ForbiddenAlgorithm(name.to_string()));
    }
    let alg = Algorithm::from_str(name).map_err(|_| ConfigError::UnknownAlgorithm(name.to_string()))?;
    if !PERMITTED_ALGORITHMS.contains(&alg) {
        return Err(ConfigError::ForbiddenAlgorithm(name.to_string()));
    }
    Ok(alg)
}
