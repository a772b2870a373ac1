//! Token verification against the identity provider's key set

use std::sync::Arc;

use crate::{
    error::{JwtVerifyError, KeySetError},
    fetch::KeySetFetcher,
    jwa::Algorithm,
    jwt::{ClaimsValidator, DecodedPayload, JwtRef},
    AuthConfig, AuthError,
};

/// Verifies bearer tokens issued by the configured identity provider
///
/// Verification proceeds in a fixed order:
///
/// 1. the header is decoded without trusting it, and must name a `kid`
/// 2. the key set is obtained and searched for that `kid`
/// 3. the header's `alg` must be one of the configured algorithms
/// 4. the signature is checked against the matched key
/// 5. `exp`, `nbf`, `aud`, and `iss` are validated
///
/// If the key set came from cache and holds no matching key, it is fetched
/// once more before giving up, so that rotated keys are picked up. Such
/// refetches are limited to one per minimum refetch interval.
#[derive(Clone, Debug)]
#[must_use]
pub struct TokenVerifier {
    keys: KeySetFetcher,
    validator: Arc<ClaimsValidator>,
    algorithms: Arc<[Algorithm]>,
}

impl TokenVerifier {
    /// Verifies tokens described by `config` using keys from `keys`
    pub fn new(config: &AuthConfig, keys: KeySetFetcher) -> Self {
        let validator = ClaimsValidator::new(config.audience().to_owned(), config.issuer())
            .with_leeway(config.leeway());

        Self {
            keys,
            validator: Arc::new(validator),
            algorithms: config.algorithms().into(),
        }
    }

    /// Verifies tokens described by `config`, fetching keys from its key set URL
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be constructed.
    pub fn from_config(config: &AuthConfig) -> Result<Self, KeySetError> {
        Ok(Self::new(config, KeySetFetcher::new(config)?))
    }

    /// The source of verification keys
    pub fn key_set_fetcher(&self) -> &KeySetFetcher {
        &self.keys
    }

    /// The standard claims validator
    pub fn validator(&self) -> &ClaimsValidator {
        &self.validator
    }

    /// The accepted signing algorithms
    pub fn algorithms(&self) -> &[Algorithm] {
        &self.algorithms
    }

    /// Verifies `token` and returns its claims
    ///
    /// # Errors
    ///
    /// | Failure | Code | Status |
    /// |---|---|---|
    /// | header without `kid` | `invalid_header` | 401 |
    /// | no key with that `kid` | `invalid_header` | 400 |
    /// | `exp` elapsed | `token_expired` | 401 |
    /// | wrong `aud` or `iss` | `invalid_claims` | 401 |
    /// | anything else | `invalid_header` | 400 |
    pub async fn verify(&self, token: &JwtRef) -> Result<DecodedPayload, AuthError> {
        self.verify_jwt(token).await.map_err(|err| {
            let error: &dyn std::error::Error = &err;
            tracing::debug!(error, "JWT verification failed");
            AuthError::from(err)
        })
    }

    /// Verifies `token`, reporting the precise reason for any rejection
    ///
    /// # Errors
    ///
    /// Returns the first check that failed.
    pub async fn verify_jwt(&self, token: &JwtRef) -> Result<DecodedPayload, JwtVerifyError> {
        let decomposed = token.decompose()?;
        let kid = decomposed.kid().ok_or(JwtVerifyError::MissingKeyId)?;

        let mut key_set = self.keys.key_set().await?;
        if key_set.get_key_by_id(kid).is_none() && !key_set.is_live() {
            tracing::debug!(jwk.kid = %kid, "key not in cached JWKS; fetching");
            key_set = self.keys.refetch().await?;
        }

        let key = key_set.get_key_by_id(kid).ok_or_else(|| {
            tracing::debug!(jwk.kid = %kid, "unable to find matching key");
            JwtVerifyError::UnknownKeyId
        })?;

        let alg = decomposed.approved_algorithm(&self.algorithms)?;

        decomposed.verify(key, alg, &self.validator)
    }
}
