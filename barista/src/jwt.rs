//! JSON Web Tokens
//!
//! A compact JWT is three base64url sections separated by `.`: a JSON
//! header, a JSON payload, and a signature over the first two sections.
//! Nothing in the header or payload may be trusted until the signature has
//! been checked against a key published by the identity provider.
//!
//! ```
//! use barista::jwt::JwtRef;
//!
//! let token = JwtRef::from_str("eyJhbGciOiJSUzI1NiJ9.eyJzdWIiOiJhIn0.c2ln");
//! let decomposed = token.decompose().unwrap();
//!
//! assert_eq!(decomposed.alg(), Some("RS256"));
//! assert_eq!(decomposed.kid(), None);
//! ```

use std::{fmt, time::Duration};

use aliri_base64::Base64Url;
use aliri_braid::braid;
use aliri_clock::{Clock, System, UnixTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    error::{self, ClaimsRejected, JwtVerifyError},
    jwa::Algorithm,
    jwk::{KeyId, KeyIdRef},
    Jwk,
};

/// A JSON Web Token
///
/// The [`Display`][JwtRef#impl-Display] and [`Debug`][JwtRef#impl-Debug]
/// implementations hide the token unless the alternate form is requested.
#[braid(
    serde,
    debug = "owned",
    display = "owned",
    ord = "omit",
    ref_doc = "A borrowed reference to a JSON Web Token ([`Jwt`])"
)]
#[must_use]
pub struct Jwt;

/// Prints a placeholder. The alternate form, `{:#?}`, prints the header
/// and payload sections but never the signature.
///
/// ```
/// use barista::jwt::JwtRef;
///
/// let token = JwtRef::from_str("aGVhZGVy.cGF5bG9hZA.c2lnbmF0dXJl");
///
/// assert_eq!(format!("{:?}", token), "***JWT***");
/// assert_eq!(format!("{:#?}", token), "\"aGVhZGVy.cGF5bG9hZA.…\"");
/// ```
impl fmt::Debug for JwtRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if f.alternate() {
            match self.0.rfind('.') {
                Some(idx) => write!(f, "\"{}…\"", &self.0[..=idx]),
                None => f.write_str("\"…\""),
            }
        } else {
            f.write_str("***JWT***")
        }
    }
}

/// Prints a placeholder. The alternate form, `{:#}`, prints the whole token.
///
/// ```
/// use barista::jwt::JwtRef;
///
/// let token = JwtRef::from_str("aGVhZGVy.cGF5bG9hZA.c2lnbmF0dXJl");
///
/// assert_eq!(format!("{}", token), "***JWT***");
/// assert_eq!(format!("{:#}", token), "aGVhZGVy.cGF5bG9hZA.c2lnbmF0dXJl");
/// ```
impl fmt::Display for JwtRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if f.alternate() {
            f.write_str(&self.0)
        } else {
            f.write_str("***JWT***")
        }
    }
}

/// The audience a token is intended for
#[braid(serde, ref_doc = "A borrowed reference to an [`Audience`]")]
pub struct Audience;

/// The party that issued a token
#[braid(serde, ref_doc = "A borrowed reference to an [`Issuer`]")]
pub struct Issuer;

/// The unverified header of a JWT
///
/// `alg` is kept as a raw string so that unsupported algorithms surface as
/// a rejection rather than a parse failure.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
struct UntrustedHeader {
    #[serde(default)]
    alg: Option<String>,
    #[serde(default)]
    kid: Option<KeyId>,
}

/// A JWT split into its sections, with the header decoded
///
/// This structure is suitable for inspection to determine which key should
/// be used to verify the token.
#[derive(Clone, Debug, PartialEq, Eq)]
#[must_use]
pub struct Decomposed<'a> {
    header: UntrustedHeader,
    message: &'a str,
    payload: &'a str,
    signature: Base64Url,
}

macro_rules! expect_two {
    ($iter:expr) => {{
        let mut i = $iter;
        match (i.next(), i.next(), i.next()) {
            (Some(first), Some(second), None) => Some((first, second)),
            _ => None,
        }
    }};
}

impl JwtRef {
    /// Splits the token and decodes its header without verifying anything
    ///
    /// # Errors
    ///
    /// Fails unless the token has exactly three sections, with a base64url
    /// JSON object header and a base64url signature.
    pub fn decompose(&self) -> Result<Decomposed<'_>, JwtVerifyError> {
        let (s_str, message) =
            expect_two!(self.as_str().rsplitn(2, '.')).ok_or(JwtVerifyError::MalformedToken)?;
        let (payload, h_str) =
            expect_two!(message.rsplitn(2, '.')).ok_or(JwtVerifyError::MalformedToken)?;
        let h_raw = Base64Url::from_encoded(h_str).map_err(error::malformed_jwt_header)?;
        let signature = Base64Url::from_encoded(s_str).map_err(error::malformed_jwt_signature)?;
        let header: UntrustedHeader =
            serde_json::from_slice(h_raw.as_slice()).map_err(error::malformed_jwt_header)?;

        Ok(Decomposed {
            header,
            message,
            payload,
            signature,
        })
    }
}

impl<'a> Decomposed<'a> {
    /// The key identifier named by the unverified header
    pub fn kid(&self) -> Option<&KeyIdRef> {
        self.header.kid.as_deref()
    }

    /// The algorithm named by the unverified header
    pub fn alg(&self) -> Option<&str> {
        self.header.alg.as_deref()
    }

    /// Resolves the header's algorithm against the approved list
    ///
    /// # Errors
    ///
    /// Fails if the header names no algorithm, or one that is not approved.
    pub fn approved_algorithm(&self, approved: &[Algorithm]) -> Result<Algorithm, JwtVerifyError> {
        let alg = self
            .alg()
            .ok_or_else(|| error::malformed_jwt_header("missing alg"))?;

        alg.parse::<Algorithm>()
            .ok()
            .filter(|a| approved.contains(a))
            .ok_or_else(|| JwtVerifyError::AlgorithmRejected(alg.to_owned()))
    }

    /// Verifies the signature with `key`, then decodes and validates the payload
    ///
    /// # Errors
    ///
    /// Fails if the signature does not match, the payload is not a JSON
    /// object, or the claims are rejected by `validator`.
    pub fn verify(
        self,
        key: &Jwk,
        alg: Algorithm,
        validator: &ClaimsValidator,
    ) -> Result<DecodedPayload, JwtVerifyError> {
        self.verify_with_clock(key, alg, validator, &System)
    }

    pub(crate) fn verify_with_clock<C: Clock>(
        self,
        key: &Jwk,
        alg: Algorithm,
        validator: &ClaimsValidator,
        clock: &C,
    ) -> Result<DecodedPayload, JwtVerifyError> {
        key.verify(alg, self.message.as_bytes(), self.signature.as_slice())?;

        let p_raw = Base64Url::from_encoded(self.payload).map_err(error::malformed_jwt_payload)?;
        let payload: DecodedPayload =
            serde_json::from_slice(p_raw.as_slice()).map_err(error::malformed_jwt_payload)?;

        validator.validate_with_clock(&payload, clock)?;

        Ok(payload)
    }
}

/// The claims of a verified token
///
/// Only produced once the signature and standard claims have been checked.
/// Application-specific claims, such as `permissions`, are left for the
/// caller to interpret.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DecodedPayload(Map<String, Value>);

impl DecodedPayload {
    /// Gets a claim by name
    pub fn get(&self, claim: &str) -> Option<&Value> {
        self.0.get(claim)
    }

    /// The `sub` claim, if it is a string
    pub fn subject(&self) -> Option<&str> {
        self.get("sub").and_then(Value::as_str)
    }

    /// All claims in the payload
    pub fn claims(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Takes ownership of the claims
    pub fn into_claims(self) -> Map<String, Value> {
        self.0
    }

    /// Reads a NumericDate claim; fractional seconds are truncated
    fn timestamp(&self, claim: &'static str) -> Result<Option<UnixTime>, ClaimsRejected> {
        match self.get(claim) {
            None => Ok(None),
            Some(v) => v
                .as_u64()
                .or_else(|| {
                    v.as_f64()
                        .filter(|t| t.is_finite() && *t >= 0.0)
                        .map(|t| t.trunc() as u64)
                })
                .map(|t| Some(UnixTime(t)))
                .ok_or(ClaimsRejected::InvalidClaimValue(claim)),
        }
    }
}

impl From<Map<String, Value>> for DecodedPayload {
    fn from(claims: Map<String, Value>) -> Self {
        Self(claims)
    }
}

/// Validates the standard claims of a token
#[derive(Clone, Debug)]
pub struct ClaimsValidator {
    audience: Audience,
    issuer: Issuer,
    leeway: Duration,
}

impl ClaimsValidator {
    /// Requires the given audience and issuer, with no clock leeway
    pub fn new(audience: impl Into<Audience>, issuer: impl Into<Issuer>) -> Self {
        Self {
            audience: audience.into(),
            issuer: issuer.into(),
            leeway: Duration::ZERO,
        }
    }

    /// Sets the leeway allowed when checking `exp` and `nbf`
    #[must_use]
    pub fn with_leeway(self, leeway: Duration) -> Self {
        Self { leeway, ..self }
    }

    /// The required audience
    pub fn audience(&self) -> &AudienceRef {
        &self.audience
    }

    /// The required issuer
    pub fn issuer(&self) -> &IssuerRef {
        &self.issuer
    }

    /// Validates the claims against the system clock
    ///
    /// # Errors
    ///
    /// See [`ClaimsValidator::validate_with_clock()`].
    pub fn validate(&self, payload: &DecodedPayload) -> Result<(), ClaimsRejected> {
        self.validate_with_clock(payload, &System)
    }

    /// Validates the claims against the given clock
    ///
    /// Checks run in order: `exp` (required), `nbf` (if present), `aud`, `iss`.
    ///
    /// # Errors
    ///
    /// Returns the first failed check.
    pub fn validate_with_clock<C: Clock>(
        &self,
        payload: &DecodedPayload,
        clock: &C,
    ) -> Result<(), ClaimsRejected> {
        let now = clock.now();
        let leeway = self.leeway.as_secs();

        match payload.timestamp("exp")? {
            Some(exp) if exp.0 < now.0.saturating_sub(leeway) => {
                return Err(ClaimsRejected::TokenExpired)
            }
            Some(_) => {}
            None => return Err(ClaimsRejected::MissingRequiredClaim("exp")),
        }

        if let Some(nbf) = payload.timestamp("nbf")? {
            if nbf.0 > now.0.saturating_add(leeway) {
                return Err(ClaimsRejected::TokenNotYetValid);
            }
        }

        let expected_aud = self.audience.as_str();
        let aud_matches = match payload.get("aud") {
            None => return Err(ClaimsRejected::MissingRequiredClaim("aud")),
            Some(Value::String(aud)) => aud == expected_aud,
            Some(Value::Array(auds)) => auds.iter().any(|a| a.as_str() == Some(expected_aud)),
            Some(_) => return Err(ClaimsRejected::InvalidClaimValue("aud")),
        };

        if !aud_matches {
            return Err(ClaimsRejected::InvalidAudience);
        }

        match payload.get("iss") {
            None => Err(ClaimsRejected::MissingRequiredClaim("iss")),
            Some(Value::String(iss)) if iss == self.issuer.as_str() => Ok(()),
            Some(_) => Err(ClaimsRejected::InvalidIssuer),
        }
    }
}

#[cfg(test)]
mod tests {
    use aliri_clock::TestClock;
    use color_eyre::Result;
    use serde_json::json;

    use super::*;
    use crate::test::{self, rsa};

    const NOW: UnixTime = UnixTime(1_700_000_000);

    fn validator() -> ClaimsValidator {
        ClaimsValidator::new(
            Audience::from_static(test::AUDIENCE),
            Issuer::from_static(test::ISSUER),
        )
    }

    fn payload(value: Value) -> DecodedPayload {
        match value {
            Value::Object(map) => DecodedPayload::from(map),
            _ => panic!("payload must be an object"),
        }
    }

    fn valid_claims() -> Value {
        json!({
            "iss": test::ISSUER,
            "aud": test::AUDIENCE,
            "sub": "auth0|barista",
            "exp": NOW.0 + 60,
        })
    }

    #[test]
    fn decomposes_signed_token() -> Result<()> {
        let token = rsa::token(rsa::PRIMARY_PK8, Some(rsa::PRIMARY_KID), "RS256", &valid_claims());
        let decomposed = token.decompose()?;

        assert_eq!(decomposed.alg(), Some("RS256"));
        assert_eq!(decomposed.kid(), Some(KeyIdRef::from_str(rsa::PRIMARY_KID)));
        Ok(())
    }

    #[test]
    fn rejects_tokens_without_three_sections() {
        for raw in ["", "abc", "abc.def"] {
            let err = JwtRef::from_str(raw).decompose().unwrap_err();
            assert!(matches!(err, JwtVerifyError::MalformedToken), "{raw}: {err:?}");
        }
    }

    #[test]
    fn rejects_header_that_is_not_json() {
        let err = JwtRef::from_str("bm90IGpzb24.e30.c2ln").decompose().unwrap_err();
        assert!(matches!(err, JwtVerifyError::MalformedTokenHeader(_)));
    }

    #[test]
    fn rejects_header_with_bad_base64() {
        let err = JwtRef::from_str("!!!.e30.c2ln").decompose().unwrap_err();
        assert!(matches!(err, JwtVerifyError::MalformedTokenHeader(_)));
    }

    #[test]
    fn only_approved_algorithms_resolve() -> Result<()> {
        let approved = [Algorithm::RS256];

        let rs256 = rsa::unsigned_token(Some(rsa::PRIMARY_KID), "RS256", &valid_claims());
        assert_eq!(rs256.decompose()?.approved_algorithm(&approved)?, Algorithm::RS256);

        for alg in ["none", "HS256", "PS256"] {
            let token = rsa::unsigned_token(Some(rsa::PRIMARY_KID), alg, &valid_claims());
            let err = token.decompose()?.approved_algorithm(&approved).unwrap_err();
            assert!(matches!(err, JwtVerifyError::AlgorithmRejected(a) if a == alg));
        }

        Ok(())
    }

    #[test]
    fn verifies_and_decodes_payload() -> Result<()> {
        let claims = valid_claims();
        let token = rsa::token(rsa::PRIMARY_PK8, Some(rsa::PRIMARY_KID), "RS256", &claims);
        let key: Jwk = serde_json::from_str(rsa::PRIMARY_JWK)?;

        let decoded = token.decompose()?.verify_with_clock(
            &key,
            Algorithm::RS256,
            &validator(),
            &TestClock::new(NOW),
        )?;

        assert_eq!(decoded, payload(claims));
        assert_eq!(decoded.subject(), Some("auth0|barista"));
        Ok(())
    }

    #[test]
    fn tampered_payload_fails_signature() -> Result<()> {
        let token = rsa::token(rsa::PRIMARY_PK8, Some(rsa::PRIMARY_KID), "RS256", &valid_claims());
        let forged_payload = Base64Url::from_raw(serde_json::to_vec(&json!({
            "iss": test::ISSUER,
            "aud": test::AUDIENCE,
            "exp": NOW.0 + 60,
            "permissions": ["delete:drinks"],
        }))?)
        .to_string();
        let mut sections: Vec<&str> = token.as_str().split('.').collect();
        sections[1] = &forged_payload;
        let forged = Jwt::new(sections.join("."));

        let key: Jwk = serde_json::from_str(rsa::PRIMARY_JWK)?;
        let err = forged
            .decompose()?
            .verify_with_clock(&key, Algorithm::RS256, &validator(), &TestClock::new(NOW))
            .unwrap_err();

        assert!(matches!(err, JwtVerifyError::SignatureMismatch(_)));
        Ok(())
    }

    #[test]
    fn accepts_valid_claims() {
        let clock = TestClock::new(NOW);
        validator()
            .validate_with_clock(&payload(valid_claims()), &clock)
            .unwrap();
    }

    #[test]
    fn rejects_expired_token() {
        let mut claims = valid_claims();
        claims["exp"] = json!(NOW.0 - 1);

        let err = validator()
            .validate_with_clock(&payload(claims), &TestClock::new(NOW))
            .unwrap_err();
        assert_eq!(err, ClaimsRejected::TokenExpired);
    }

    #[test]
    fn expiry_is_checked_before_audience() {
        let mut claims = valid_claims();
        claims["exp"] = json!(NOW.0 - 1);
        claims["aud"] = json!("someone-else");

        let err = validator()
            .validate_with_clock(&payload(claims), &TestClock::new(NOW))
            .unwrap_err();
        assert_eq!(err, ClaimsRejected::TokenExpired);
    }

    #[test]
    fn leeway_extends_expiry() {
        let mut claims = valid_claims();
        claims["exp"] = json!(NOW.0 - 5);

        validator()
            .with_leeway(Duration::from_secs(10))
            .validate_with_clock(&payload(claims), &TestClock::new(NOW))
            .unwrap();
    }

    #[test]
    fn requires_expiry() {
        let mut claims = valid_claims();
        claims.as_object_mut().unwrap().remove("exp");

        let err = validator()
            .validate_with_clock(&payload(claims), &TestClock::new(NOW))
            .unwrap_err();
        assert_eq!(err, ClaimsRejected::MissingRequiredClaim("exp"));
    }

    #[test]
    fn rejects_non_numeric_expiry() {
        let mut claims = valid_claims();
        claims["exp"] = json!("tomorrow");

        let err = validator()
            .validate_with_clock(&payload(claims), &TestClock::new(NOW))
            .unwrap_err();
        assert_eq!(err, ClaimsRejected::InvalidClaimValue("exp"));
    }

    #[test]
    fn accepts_fractional_timestamps() {
        let mut claims = valid_claims();
        claims["exp"] = json!(NOW.0 as f64 + 0.75);
        claims["nbf"] = json!(NOW.0 as f64 - 10.5);

        validator()
            .validate_with_clock(&payload(claims), &TestClock::new(NOW))
            .unwrap();
    }

    #[test]
    fn fractional_expiry_is_truncated() {
        let mut claims = valid_claims();
        claims["exp"] = json!(NOW.0 as f64 - 0.5);

        let err = validator()
            .validate_with_clock(&payload(claims), &TestClock::new(NOW))
            .unwrap_err();
        assert_eq!(err, ClaimsRejected::TokenExpired);
    }

    #[test]
    fn rejects_negative_expiry() {
        let mut claims = valid_claims();
        claims["exp"] = json!(-1.0);

        let err = validator()
            .validate_with_clock(&payload(claims), &TestClock::new(NOW))
            .unwrap_err();
        assert_eq!(err, ClaimsRejected::InvalidClaimValue("exp"));
    }

    #[test]
    fn rejects_token_not_yet_valid() {
        let mut claims = valid_claims();
        claims["nbf"] = json!(NOW.0 + 30);

        let err = validator()
            .validate_with_clock(&payload(claims), &TestClock::new(NOW))
            .unwrap_err();
        assert_eq!(err, ClaimsRejected::TokenNotYetValid);
    }

    #[test]
    fn rejects_wrong_audience() {
        let mut claims = valid_claims();
        claims["aud"] = json!("https://other.api");

        let err = validator()
            .validate_with_clock(&payload(claims), &TestClock::new(NOW))
            .unwrap_err();
        assert_eq!(err, ClaimsRejected::InvalidAudience);
    }

    #[test]
    fn accepts_audience_within_list() {
        let mut claims = valid_claims();
        claims["aud"] = json!(["https://other.api", test::AUDIENCE]);

        validator()
            .validate_with_clock(&payload(claims), &TestClock::new(NOW))
            .unwrap();
    }

    #[test]
    fn requires_audience() {
        let mut claims = valid_claims();
        claims.as_object_mut().unwrap().remove("aud");

        let err = validator()
            .validate_with_clock(&payload(claims), &TestClock::new(NOW))
            .unwrap_err();
        assert_eq!(err, ClaimsRejected::MissingRequiredClaim("aud"));
    }

    #[test]
    fn rejects_wrong_issuer() {
        let mut claims = valid_claims();
        claims["iss"] = json!("https://evil.example/");

        let err = validator()
            .validate_with_clock(&payload(claims), &TestClock::new(NOW))
            .unwrap_err();
        assert_eq!(err, ClaimsRejected::InvalidIssuer);
    }

    #[test]
    fn issuer_requires_trailing_slash() {
        let mut claims = valid_claims();
        claims["iss"] = json!(test::ISSUER.trim_end_matches('/'));

        let err = validator()
            .validate_with_clock(&payload(claims), &TestClock::new(NOW))
            .unwrap_err();
        assert_eq!(err, ClaimsRejected::InvalidIssuer);
    }

    #[test]
    fn redacts_token_in_formatting() {
        let token = rsa::token(rsa::PRIMARY_PK8, Some(rsa::PRIMARY_KID), "RS256", &valid_claims());

        assert_eq!(format!("{:?}", token), "***JWT***");
        assert_eq!(token.to_string(), "***JWT***");
        assert!(!format!("{:#?}", token).contains(token.as_str()));
    }
}
