use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::AuthFailure;

/// `aud` claim: providers send either a single string or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Many(Vec<String>),
}

impl Audience {
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Audience::Single(aud) => aud == audience,
            Audience::Many(auds) => auds.iter().any(|aud| aud == audience),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let items: &[String] = match self {
            Audience::Single(aud) => core::slice::from_ref(aud),
            Audience::Many(auds) => auds,
        };
        items.iter().map(String::as_str)
    }
}

/// Verified token claims.
///
/// Produced once per successful verification and owned by the request that
/// presented the token. The registered fields the gate relies on are typed;
/// anything else the provider adds stays in [`extra`](Self::extra).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimsRecord {
    /// Issuer.
    pub iss: String,

    /// Audience.
    pub aud: Audience,

    /// Expiry, seconds since the Unix epoch.
    #[serde(deserialize_with = "numeric_date")]
    pub exp: u64,

    /// Subject, when the provider sends one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Issued-at, seconds since the Unix epoch.
    #[serde(
        default,
        deserialize_with = "optional_numeric_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub iat: Option<u64>,

    /// Granted permissions, taken verbatim from the token.
    ///
    /// `None` means the claim was absent, which is a structural defect and
    /// distinct from an empty grant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<BTreeSet<String>>,

    /// Provider-specific extension claims.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// NumericDate may carry a fractional part; it is truncated to whole seconds.
///
/// Note that signature validation itself only accepts an integer `exp`/`nbf`.
#[derive(Deserialize)]
#[serde(untagged)]
enum NumericDate {
    Seconds(u64),
    Fractional(f64),
}

impl NumericDate {
    fn into_seconds<E: serde::de::Error>(self) -> Result<u64, E> {
        match self {
            NumericDate::Seconds(secs) => Ok(secs),
            NumericDate::Fractional(secs) if secs.is_finite() && secs >= 0.0 => Ok(secs.trunc() as u64),
            NumericDate::Fractional(secs) => Err(E::custom(format!("invalid NumericDate {secs}"))),
        }
    }
}

fn numeric_date<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    NumericDate::deserialize(deserializer)?.into_seconds()
}

fn optional_numeric_date<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    Option::<NumericDate>::deserialize(deserializer)?
        .map(NumericDate::into_seconds)
        .transpose()
}

impl ClaimsRecord {
    /// Convert an already verified claims object into the typed record.
    pub fn from_verified(claims: Map<String, Value>) -> Result<Self, AuthFailure> {
        serde_json::from_value(Value::Object(claims)).map_err(AuthFailure::unparseable)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(i64::try_from(self.exp).ok()?, 0)
    }

    pub fn audience_contains(&self, audience: &str) -> bool {
        self.aud.contains(audience)
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions
            .as_ref()
            .is_some_and(|granted| granted.contains(permission))
    }

    /// Look up an extension claim by name.
    pub fn extra_claim(&self, name: &str) -> Option<&Value> {
        self.extra.get(name)
    }
}
