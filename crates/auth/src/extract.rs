//! Bearer credential extraction from an `Authorization` header value.

use crate::AuthFailure;

/// Opaque token taken from an `Authorization: Bearer <token>` header.
///
/// The raw value is never printed; `Debug` only reveals its length.
#[derive(Clone, PartialEq, Eq)]
pub struct RawCredential(String);

impl RawCredential {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl core::fmt::Debug for RawCredential {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "RawCredential(<redacted, {} bytes>)", self.0.len())
    }
}

/// Parse the header value (or its absence) into a [`RawCredential`].
///
/// - No IO
/// - Scheme comparison is case-insensitive
/// - An empty or whitespace-only header counts as absent
pub fn extract_bearer(header: Option<&str>) -> Result<RawCredential, AuthFailure> {
    let header = header.ok_or_else(AuthFailure::missing_credential)?;

    let mut parts = header.split_whitespace();
    let scheme = parts.next().ok_or_else(AuthFailure::missing_credential)?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthFailure::malformed_scheme(
            "Authorization header must start with \"Bearer\".",
        ));
    }

    let token = parts.next().ok_or_else(AuthFailure::missing_token)?;

    if parts.next().is_some() {
        return Err(AuthFailure::malformed_scheme(
            "Authorization header must be bearer token.",
        ));
    }

    Ok(RawCredential(token.to_string()))
}
