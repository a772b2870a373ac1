//! Common errors
//!
//! [`AuthError`] is the only error that leaves this crate's request path. The
//! lower-level errors describe _why_ a token was rejected and are mapped onto
//! an [`AuthError`] by the [`TokenVerifier`](crate::TokenVerifier).

use std::{borrow::Cow, error::Error as StdError, fmt};

use http::StatusCode;
use serde::Serialize;
use thiserror::Error;

use crate::jwa;

/// Machine-readable failure code carried by an [`AuthError`]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ErrorCode {
    /// The request did not carry an `Authorization` header
    BadRequest,
    /// The bearer token is missing, malformed, or was rejected
    InvalidToken,
    /// The token header or signature could not be processed
    InvalidHeader,
    /// The token's `exp` claim has elapsed
    TokenExpired,
    /// The token's audience or issuer is not acceptable
    InvalidClaims,
    /// The token does not grant the required permission
    Unauthorized,
}

impl ErrorCode {
    /// The wire representation of this code
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BadRequest => "bad_request",
            Self::InvalidToken => "invalid_token",
            Self::InvalidHeader => "invalid_header",
            Self::TokenExpired => "token_expired",
            Self::InvalidClaims => "invalid_claims",
            Self::Unauthorized => "unauthorized",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured authentication or authorization failure
///
/// Once constructed, the code, description, and status do not change. The
/// boundary layer is expected to render this as the JSON body produced by
/// [`AuthError::body()`] along with [`AuthError::status()`].
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{code}: {description}")]
#[must_use]
pub struct AuthError {
    code: ErrorCode,
    description: Cow<'static, str>,
    status: StatusCode,
}

impl AuthError {
    /// Constructs a custom authorization error
    pub fn new(
        code: ErrorCode,
        description: impl Into<Cow<'static, str>>,
        status: StatusCode,
    ) -> Self {
        Self {
            code,
            description: description.into(),
            status,
        }
    }

    /// No `Authorization` header was presented
    pub fn missing_authorization() -> Self {
        Self::new(
            ErrorCode::BadRequest,
            "Provide a valid token.",
            StatusCode::BAD_REQUEST,
        )
    }

    /// The bearer token was malformed or could not be verified
    pub fn invalid_token() -> Self {
        Self::new(
            ErrorCode::InvalidToken,
            "The provided token is invalid.",
            StatusCode::UNAUTHORIZED,
        )
    }

    /// The token header does not identify its signing key
    pub fn malformed_authorization() -> Self {
        Self::new(
            ErrorCode::InvalidHeader,
            "Authorization malformed.",
            StatusCode::UNAUTHORIZED,
        )
    }

    /// None of the published keys matches the token's key identifier
    pub fn unknown_signing_key() -> Self {
        Self::new(
            ErrorCode::InvalidHeader,
            "Unable to find the appropriate key.",
            StatusCode::BAD_REQUEST,
        )
    }

    /// The token could not be parsed or its signature did not verify
    pub fn unparseable_token() -> Self {
        Self::new(
            ErrorCode::InvalidHeader,
            "Unable to parse authentication token.",
            StatusCode::BAD_REQUEST,
        )
    }

    /// The identity provider's key set could not be retrieved
    pub fn key_set_unavailable() -> Self {
        Self::new(
            ErrorCode::InvalidHeader,
            "Unable to fetch the signing keys.",
            StatusCode::BAD_REQUEST,
        )
    }

    /// The token has expired
    pub fn token_expired() -> Self {
        Self::new(
            ErrorCode::TokenExpired,
            "Token expired.",
            StatusCode::UNAUTHORIZED,
        )
    }

    /// The token's audience or issuer did not match expectations
    pub fn invalid_claims() -> Self {
        Self::new(
            ErrorCode::InvalidClaims,
            "Incorrect claims. Please, check the audience and issuer.",
            StatusCode::UNAUTHORIZED,
        )
    }

    /// The token does not grant the required permission
    pub fn unauthorized() -> Self {
        Self::new(
            ErrorCode::Unauthorized,
            "You can not access this resource or page.",
            StatusCode::FORBIDDEN,
        )
    }

    /// The machine-readable failure code
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// The human-readable description
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The HTTP status that should be returned to the caller
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The JSON body that should be returned to the caller
    ///
    /// ```
    /// use barista::AuthError;
    ///
    /// let body = serde_json::to_value(AuthError::unauthorized().body()).unwrap();
    /// assert_eq!(body, serde_json::json!({
    ///     "success": false,
    ///     "message": "You can not access this resource or page.",
    ///     "error": "unauthorized",
    /// }));
    /// ```
    #[must_use]
    pub fn body(&self) -> ErrorBody<'_> {
        ErrorBody {
            success: false,
            message: &self.description,
            error: self.code,
        }
    }
}

/// The serialized form of an [`AuthError`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorBody<'a> {
    success: bool,
    message: &'a str,
    error: ErrorCode,
}

/// The provided name could not be matched with an accepted algorithm
#[derive(Debug, Error)]
#[error("'{alg}' does not match supported algorithms")]
pub struct UnknownAlgorithm {
    alg: String,
}

#[inline]
pub(crate) fn unknown_algorithm(alg: impl Into<String>) -> UnknownAlgorithm {
    UnknownAlgorithm { alg: alg.into() }
}

/// The signature did not match
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Error)]
#[error("signature mismatch")]
pub struct SignatureMismatch {
    _p: (),
}

pub(crate) const fn signature_mismatch() -> SignatureMismatch {
    SignatureMismatch { _p: () }
}

/// An error occurring while retrieving the identity provider's key set
#[derive(Debug, Error)]
pub enum KeySetError {
    /// The HTTP client could not be constructed
    #[error("unable to construct JWKS client")]
    Client(#[source] reqwest::Error),

    /// The key set endpoint could not be reached
    #[error("JWKS request failed")]
    Transport(#[source] reqwest::Error),

    /// The key set endpoint responded with an unexpected status
    #[error("JWKS endpoint responded with status {0}")]
    Status(StatusCode),

    /// The key set endpoint responded with something other than a key set
    #[error("JWKS response is not a valid key set")]
    Decode(#[from] serde_json::Error),
}

/// An error occurring when validating the claims of a JWT
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub enum ClaimsRejected {
    /// The token is expired according to the `exp` claim
    #[error("token expired")]
    TokenExpired,

    /// The token is not yet valid according to the `nbf` claim
    #[error("token not yet valid")]
    TokenNotYetValid,

    /// The token audience is not acceptable
    #[error("invalid audience")]
    InvalidAudience,

    /// The token issuer is not acceptable
    #[error("invalid issuer")]
    InvalidIssuer,

    /// A required claim is missing
    #[error("required {0} claim missing")]
    MissingRequiredClaim(&'static str),

    /// A claim is present but has the wrong shape
    #[error("{0} claim has an invalid value")]
    InvalidClaimValue(&'static str),
}

/// An error occurring while verifying a JWT
#[derive(Debug, Error)]
pub enum JwtVerifyError {
    /// The JWT is malformed, without a discernible header, payload, and signature
    #[error("malformed JWT")]
    MalformedToken,

    /// The JWT header is malformed
    #[error("malformed JWT header")]
    MalformedTokenHeader(#[source] Box<dyn StdError + Send + Sync + 'static>),

    /// The JWT payload is malformed
    #[error("malformed JWT payload")]
    MalformedTokenPayload(#[source] Box<dyn StdError + Send + Sync + 'static>),

    /// The JWT signature is malformed
    #[error("malformed JWT signature")]
    MalformedTokenSignature(#[source] Box<dyn StdError + Send + Sync + 'static>),

    /// The JWT header carries no `kid`
    #[error("JWT header does not identify a signing key")]
    MissingKeyId,

    /// No key in the key set matches the JWT's `kid`
    #[error("no matching key found to validate JWT")]
    UnknownKeyId,

    /// The JWT's `alg` is not one of the approved algorithms
    #[error("algorithm '{0}' is not approved")]
    AlgorithmRejected(String),

    /// The matched key cannot be used with the JWT's algorithm
    #[error("key incompatible with algorithm '{0}'")]
    IncompatibleKey(jwa::Algorithm),

    /// The signature did not verify against the matched key
    #[error(transparent)]
    SignatureMismatch(#[from] SignatureMismatch),

    /// The JWT was rejected by the claims validator
    #[error("token rejected by claims validator")]
    ClaimsRejected(#[from] ClaimsRejected),

    /// The key set could not be retrieved
    #[error("unable to retrieve the key set")]
    KeySetUnavailable(#[from] KeySetError),
}

pub(crate) fn malformed_jwt_header(
    source: impl Into<Box<dyn StdError + Send + Sync + 'static>>,
) -> JwtVerifyError {
    JwtVerifyError::MalformedTokenHeader(source.into())
}

pub(crate) fn malformed_jwt_payload(
    source: impl Into<Box<dyn StdError + Send + Sync + 'static>>,
) -> JwtVerifyError {
    JwtVerifyError::MalformedTokenPayload(source.into())
}

pub(crate) fn malformed_jwt_signature(
    source: impl Into<Box<dyn StdError + Send + Sync + 'static>>,
) -> JwtVerifyError {
    JwtVerifyError::MalformedTokenSignature(source.into())
}

impl From<JwtVerifyError> for AuthError {
    fn from(err: JwtVerifyError) -> Self {
        match err {
            JwtVerifyError::MissingKeyId => Self::malformed_authorization(),
            JwtVerifyError::UnknownKeyId => Self::unknown_signing_key(),
            JwtVerifyError::KeySetUnavailable(_) => Self::key_set_unavailable(),
            JwtVerifyError::ClaimsRejected(ClaimsRejected::TokenExpired) => Self::token_expired(),
            JwtVerifyError::ClaimsRejected(_) => Self::invalid_claims(),
            JwtVerifyError::MalformedToken
            | JwtVerifyError::MalformedTokenHeader(_)
            | JwtVerifyError::MalformedTokenPayload(_)
            | JwtVerifyError::MalformedTokenSignature(_)
            | JwtVerifyError::AlgorithmRejected(_)
            | JwtVerifyError::IncompatibleKey(_)
            | JwtVerifyError::SignatureMismatch(_) => Self::unparseable_token(),
        }
    }
}
