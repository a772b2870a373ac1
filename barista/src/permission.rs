//! Permission checks against verified claims

use aliri_braid::braid;
use serde_json::Value;

use crate::{jwt::DecodedPayload, AuthError};

/// The claim holding the permissions granted to a token
pub const PERMISSIONS_CLAIM: &str = "permissions";

/// A permission string, such as `post:drinks`
#[braid(serde, ref_doc = "A borrowed reference to a [`Permission`]")]
pub struct Permission;

/// Checks that the verified claims grant `required`
///
/// The `permissions` claim must be an array; non-string entries are
/// ignored. Matching is exact and case-sensitive.
///
/// ```
/// use barista::{permission::{check_permissions, PermissionRef}, DecodedPayload};
///
/// let payload: DecodedPayload = serde_json::from_value(serde_json::json!({
///     "permissions": ["get:drinks-detail", "post:drinks"]
/// })).unwrap();
///
/// assert!(check_permissions(&payload, PermissionRef::from_str("post:drinks")).is_ok());
/// assert!(check_permissions(&payload, PermissionRef::from_str("delete:drinks")).is_err());
/// ```
///
/// # Errors
///
/// Returns `unauthorized` (403) if the claim is missing, is not an array,
/// or does not contain `required`.
pub fn check_permissions(
    payload: &DecodedPayload,
    required: &PermissionRef,
) -> Result<(), AuthError> {
    let granted = match payload.get(PERMISSIONS_CLAIM) {
        Some(Value::Array(granted)) => granted,
        Some(_) => {
            tracing::debug!("permissions claim is not a list");
            return Err(AuthError::unauthorized());
        }
        None => {
            tracing::debug!("permissions claim missing");
            return Err(AuthError::unauthorized());
        }
    };

    if granted
        .iter()
        .filter_map(Value::as_str)
        .any(|p| p == required.as_str())
    {
        Ok(())
    } else {
        tracing::debug!(%required, "required permission not granted");
        Err(AuthError::unauthorized())
    }
}

#[cfg(test)]
mod tests {
    use color_eyre::Result;
    use serde_json::json;

    use super::*;

    fn payload(value: Value) -> Result<DecodedPayload> {
        Ok(serde_json::from_value(value)?)
    }

    #[test]
    fn grants_listed_permission() -> Result<()> {
        let payload = payload(json!({ "permissions": ["get:drinks-detail", "post:drinks"] }))?;

        check_permissions(&payload, PermissionRef::from_str("post:drinks"))?;
        Ok(())
    }

    #[test]
    fn denies_unlisted_permission() -> Result<()> {
        let payload = payload(json!({ "permissions": ["get:drinks-detail"] }))?;

        let err =
            check_permissions(&payload, PermissionRef::from_str("delete:drinks")).unwrap_err();
        assert_eq!(err, AuthError::unauthorized());
        Ok(())
    }

    #[test]
    fn denies_when_claim_missing() -> Result<()> {
        let payload = payload(json!({ "sub": "auth0|barista" }))?;

        let required = PermissionRef::from_str("get:drinks-detail");
        let err = check_permissions(&payload, required).unwrap_err();
        assert_eq!(err.status().as_u16(), 403);
        Ok(())
    }

    #[test]
    fn denies_when_claim_is_not_a_list() -> Result<()> {
        let payload = payload(json!({ "permissions": "get:drinks-detail" }))?;

        let required = PermissionRef::from_str("get:drinks-detail");
        let err = check_permissions(&payload, required).unwrap_err();
        assert_eq!(err, AuthError::unauthorized());
        Ok(())
    }

    #[test]
    fn matching_is_exact() -> Result<()> {
        let payload = payload(json!({
            "permissions": ["GET:drinks-detail", "get:drinks", 7, null]
        }))?;

        for required in ["get:drinks-detail", "get:drink", "get:drinks-detail "] {
            let err = check_permissions(&payload, PermissionRef::from_str(required));
            assert!(err.is_err(), "{required:?}");
        }

        check_permissions(&payload, PermissionRef::from_str("get:drinks"))?;
        Ok(())
    }

    #[test]
    fn empty_list_grants_nothing() -> Result<()> {
        let payload = payload(json!({ "permissions": [] }))?;

        assert!(check_permissions(&payload, PermissionRef::from_str("get:drinks")).is_err());
        Ok(())
    }
}
