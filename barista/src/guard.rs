//! Route protection
//!
//! An [`AuthGuard`] composes bearer extraction, token verification, and the
//! permission check into a single step run before a protected operation.

use std::{fmt, future::Future};

use http::HeaderMap;

use crate::{
    error::KeySetError,
    extract,
    jwt::DecodedPayload,
    permission::{self, Permission, PermissionRef},
    verify::TokenVerifier,
    AuthConfig, AuthError,
};

/// Authorizes requests before protected operations run
#[derive(Clone, Debug)]
#[must_use]
pub struct AuthGuard {
    verifier: TokenVerifier,
}

impl AuthGuard {
    /// Guards with the given verifier
    pub fn new(verifier: TokenVerifier) -> Self {
        Self { verifier }
    }

    /// Guards with a verifier built from `config`
    ///
    /// # Errors
    ///
    /// Fails if the key set HTTP client cannot be constructed.
    pub fn from_config(config: &AuthConfig) -> Result<Self, KeySetError> {
        Ok(Self::new(TokenVerifier::from_config(config)?))
    }

    /// The underlying token verifier
    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    /// Authorizes a request for `required`, returning the verified claims
    ///
    /// Extraction and permission failures are returned as-is. Every token
    /// verification failure is reported as `invalid_token` (401); the
    /// specific cause is logged at debug level.
    ///
    /// # Errors
    ///
    /// * `bad_request` (400) if there is no `Authorization` header
    /// * `invalid_token` (401) if the header is malformed or the token fails verification
    /// * `unauthorized` (403) if the token does not grant `required`
    #[tracing::instrument(skip_all, fields(permission = %required))]
    pub async fn authorize(
        &self,
        headers: &HeaderMap,
        required: &PermissionRef,
    ) -> Result<DecodedPayload, AuthError> {
        let token = extract::bearer_token(headers)?;

        let payload = self.verifier.verify(&token).await.map_err(|err| {
            tracing::debug!(
                error.code = %err.code(),
                error.description = err.description(),
                "token rejected"
            );
            AuthError::invalid_token()
        })?;

        permission::check_permissions(&payload, required)?;

        Ok(payload)
    }

    /// Runs `operation` with the verified claims once the request is authorized
    ///
    /// `operation` is not invoked if authorization fails.
    ///
    /// # Errors
    ///
    /// See [`AuthGuard::authorize()`].
    pub async fn protect<F, Fut>(
        &self,
        headers: &HeaderMap,
        required: &PermissionRef,
        operation: F,
    ) -> Result<Fut::Output, AuthError>
    where
        F: FnOnce(DecodedPayload) -> Fut,
        Fut: Future,
    {
        let payload = self.authorize(headers, required).await?;
        Ok(operation(payload).await)
    }

    /// Binds `operation` to `required`, producing a reusable protected operation
    pub fn wrap<F>(&self, required: &PermissionRef, operation: F) -> Guarded<F> {
        Guarded {
            guard: self.clone(),
            permission: required.to_owned(),
            operation,
        }
    }
}

/// An operation that only runs for requests holding a particular permission
///
/// Produced by [`AuthGuard::wrap()`].
#[must_use]
pub struct Guarded<F> {
    guard: AuthGuard,
    permission: Permission,
    operation: F,
}

impl<F> Guarded<F> {
    /// The permission required to run the operation
    pub fn permission(&self) -> &PermissionRef {
        &self.permission
    }

    /// Authorizes the request and, if allowed, runs the operation
    ///
    /// # Errors
    ///
    /// See [`AuthGuard::authorize()`].
    pub async fn call<Fut>(&self, headers: &HeaderMap) -> Result<Fut::Output, AuthError>
    where
        F: Fn(DecodedPayload) -> Fut,
        Fut: Future,
    {
        self.guard
            .protect(headers, &self.permission, &self.operation)
            .await
    }
}

impl<F> fmt::Debug for Guarded<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guarded")
            .field("guard", &self.guard)
            .field("permission", &self.permission)
            .finish_non_exhaustive()
    }
}
