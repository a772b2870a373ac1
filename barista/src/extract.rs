//! Bearer token extraction

use http::{header::AUTHORIZATION, HeaderMap};

use crate::{AuthError, Jwt};

const BEARER_PREFIX: &str = "Bearer ";

/// Extracts the bearer token from a request's `Authorization` header
///
/// The header must begin with `Bearer ` (case-sensitive). The token is the
/// second whitespace-separated segment; any further segments are ignored.
///
/// ```
/// use barista::extract::bearer_token;
/// use http::{header::AUTHORIZATION, HeaderMap, HeaderValue};
///
/// let mut headers = HeaderMap::new();
/// headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
///
/// assert_eq!(bearer_token(&headers).unwrap().as_str(), "abc.def.ghi");
/// ```
///
/// # Errors
///
/// * `bad_request` (400) if there is no `Authorization` header
/// * `invalid_token` (401) if the header is not a bearer token
pub fn bearer_token(headers: &HeaderMap) -> Result<Jwt, AuthError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or_else(AuthError::missing_authorization)?;

    let value = value.to_str().map_err(|_| AuthError::invalid_token())?;

    if !value.starts_with(BEARER_PREFIX) {
        return Err(AuthError::invalid_token());
    }

    value
        .split_whitespace()
        .nth(1)
        .map(|token| Jwt::new(token.to_owned()))
        .ok_or_else(AuthError::invalid_token)
}
