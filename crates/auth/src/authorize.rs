use crate::{AuthFailure, ClaimsRecord, Permission};

/// Check that verified claims grant `required`.
///
/// - No IO
/// - No panics
/// - The claim's set is used verbatim; nothing is inferred
pub fn authorize(claims: &ClaimsRecord, required: &Permission) -> Result<(), AuthFailure> {
    let granted = claims
        .permissions
        .as_ref()
        .ok_or_else(AuthFailure::missing_permissions_claim)?;

    if granted.contains(required.as_str()) {
        Ok(())
    } else {
        Err(AuthFailure::permission_denied(required.as_str()))
    }
}
