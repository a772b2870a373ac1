//! JSON Web Keys
//!
//! Only RSA public keys are understood. The key set deserializer skips any
//! other key type rather than failing the whole set.

use aliri_base64::{Base64Url, InvalidBase64Data};
use aliri_braid::braid;
use serde::{Deserialize, Serialize};

use crate::{error, jwa::Algorithm};

/// An identifier for a JWK
#[braid(serde, ref_doc = "A borrowed reference to a JWK identifier ([`KeyId`])")]
pub struct KeyId;

/// The intended use of a key
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub enum Usage {
    /// The key is used to verify signatures
    #[serde(rename = "sig")]
    Signing,

    /// The key is used for encryption
    #[serde(rename = "enc")]
    Encryption,
}

/// An RSA public key
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RsaPublicKeyDto")]
pub struct RsaPublicKey {
    #[serde(rename = "n")]
    modulus: Base64Url,
    #[serde(rename = "e")]
    exponent: Base64Url,
}

impl RsaPublicKey {
    /// Constructs a public key from its modulus and exponent
    pub fn from_components(modulus: impl Into<Base64Url>, exponent: impl Into<Base64Url>) -> Self {
        Self {
            modulus: modulus.into(),
            exponent: exponent.into(),
        }
    }

    /// The public modulus, `n`
    pub fn modulus(&self) -> &Base64Url {
        &self.modulus
    }

    /// The public exponent, `e`
    pub fn exponent(&self) -> &Base64Url {
        &self.exponent
    }

    fn verify(
        &self,
        alg: Algorithm,
        data: &[u8],
        signature: &[u8],
    ) -> Result<(), error::SignatureMismatch> {
        let components = ring::signature::RsaPublicKeyComponents {
            n: self.modulus.as_slice(),
            e: self.exponent.as_slice(),
        };

        components
            .verify(alg.verification_params(), data, signature)
            .map_err(|_| error::signature_mismatch())
    }
}

impl TryFrom<RsaPublicKeyDto> for RsaPublicKey {
    type Error = InvalidBase64Data;

    fn try_from(dto: RsaPublicKeyDto) -> Result<Self, Self::Error> {
        Ok(Self::from_components(
            Base64Url::from_encoded(dto.modulus)?,
            Base64Url::from_encoded(dto.exponent)?,
        ))
    }
}

/// Components as they appear in JSON; decoded once the strings are owned
#[derive(Deserialize)]
struct RsaPublicKeyDto {
    #[serde(rename = "n")]
    modulus: String,
    #[serde(rename = "e")]
    exponent: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kty")]
enum Key {
    #[serde(rename = "RSA")]
    Rsa(RsaPublicKey),
}

/// A JSON Web Key
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    #[serde(rename = "kid", default, skip_serializing_if = "Option::is_none")]
    key_id: Option<KeyId>,

    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    usage: Option<Usage>,

    #[serde(rename = "alg", default, skip_serializing_if = "Option::is_none")]
    algorithm: Option<Algorithm>,

    #[serde(flatten)]
    key: Key,
}

impl From<RsaPublicKey> for Jwk {
    fn from(key: RsaPublicKey) -> Self {
        Self {
            key_id: None,
            usage: None,
            algorithm: None,
            key: Key::Rsa(key),
        }
    }
}

impl Jwk {
    /// Sets the key identifier
    #[must_use]
    pub fn with_key_id(self, kid: impl Into<KeyId>) -> Self {
        Self {
            key_id: Some(kid.into()),
            ..self
        }
    }

    /// Sets the intended use of the key
    #[must_use]
    pub fn with_usage(self, usage: Usage) -> Self {
        Self {
            usage: Some(usage),
            ..self
        }
    }

    /// Restricts the key to a single algorithm
    #[must_use]
    pub fn with_algorithm(self, alg: Algorithm) -> Self {
        Self {
            algorithm: Some(alg),
            ..self
        }
    }

    /// The key identifier, if any
    pub fn key_id(&self) -> Option<&KeyIdRef> {
        self.key_id.as_deref()
    }

    /// The intended use of the key, if declared
    pub fn usage(&self) -> Option<Usage> {
        self.usage
    }

    /// The algorithm the key is restricted to, if declared
    pub fn algorithm(&self) -> Option<Algorithm> {
        self.algorithm
    }

    /// The RSA public key material
    pub fn rsa(&self) -> &RsaPublicKey {
        match &self.key {
            Key::Rsa(k) => k,
        }
    }

    /// Whether this key may be used to verify signatures made with `alg`
    pub fn is_compatible(&self, alg: Algorithm) -> bool {
        self.usage.map_or(true, |u| u == Usage::Signing)
            && self.algorithm.map_or(true, |a| a == alg)
    }

    /// Verifies `signature` over `data` using `alg`
    ///
    /// # Errors
    ///
    /// Fails if the key declares a different algorithm or a non-signing use,
    /// or if the signature does not match.
    pub fn verify(
        &self,
        alg: Algorithm,
        data: &[u8],
        signature: &[u8],
    ) -> Result<(), error::JwtVerifyError> {
        if !self.is_compatible(alg) {
            return Err(error::JwtVerifyError::IncompatibleKey(alg));
        }

        match &self.key {
            Key::Rsa(k) => k.verify(alg, data, signature)?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use color_eyre::Result;

    use super::*;
    use crate::test::rsa;

    #[test]
    fn decodes_rsa_jwk() -> Result<()> {
        let jwk: Jwk = serde_json::from_str(rsa::PRIMARY_JWK)?;

        assert_eq!(jwk.key_id(), Some(KeyIdRef::from_str(rsa::PRIMARY_KID)));
        assert_eq!(jwk.usage(), Some(Usage::Signing));
        assert_eq!(jwk.algorithm(), None);
        assert_eq!(jwk.rsa().exponent().as_slice(), &[0x01, 0x00, 0x01]);

        Ok(())
    }

    #[test]
    fn ignores_extra_members() -> Result<()> {
        let jwk: Jwk = serde_json::from_value(serde_json::json!({
            "kty": "RSA",
            "kid": "abc",
            "alg": "RS256",
            "n": "AQAB",
            "e": "AQAB",
            "x5t": "ignored",
            "x5c": ["ignored"],
        }))?;

        assert_eq!(jwk.algorithm(), Some(Algorithm::RS256));
        Ok(())
    }

    #[test]
    fn decodes_from_owned_and_streamed_input() -> Result<()> {
        let expected: Jwk = serde_json::from_str(rsa::PRIMARY_JWK)?;

        let value: serde_json::Value = serde_json::from_str(rsa::PRIMARY_JWK)?;
        assert_eq!(serde_json::from_value::<Jwk>(value)?, expected);
        assert_eq!(serde_json::from_reader::<_, Jwk>(rsa::PRIMARY_JWK.as_bytes())?, expected);
        Ok(())
    }

    #[test]
    fn decodes_escaped_components() -> Result<()> {
        let jwk: Jwk = serde_json::from_str(
            r#"{"kty":"RSA","kid":"esc","n":"AQAB","e":"AQ\u0041B"}"#,
        )?;

        assert_eq!(jwk.rsa().exponent().as_slice(), &[0x01, 0x00, 0x01]);
        Ok(())
    }

    #[test]
    fn rejects_invalid_base64_components() {
        let result = serde_json::from_value::<Jwk>(serde_json::json!({
            "kty": "RSA",
            "n": "not base64!",
            "e": "AQAB",
        }));

        assert!(result.is_err());
    }

    #[test]
    fn rejects_non_rsa_keys() {
        let result = serde_json::from_value::<Jwk>(serde_json::json!({
            "kty": "oct",
            "kid": "abc",
            "k": "c2VjcmV0",
        }));

        assert!(result.is_err());
    }

    #[test]
    fn key_restricted_to_other_algorithm_is_incompatible() -> Result<()> {
        let jwk: Jwk =
            serde_json::from_str::<Jwk>(rsa::PRIMARY_JWK)?.with_algorithm(Algorithm::PS256);

        assert!(!jwk.is_compatible(Algorithm::RS256));
        assert!(jwk.is_compatible(Algorithm::PS256));

        let err = jwk.verify(Algorithm::RS256, b"data", b"sig").unwrap_err();
        assert!(matches!(err, error::JwtVerifyError::IncompatibleKey(Algorithm::RS256)));

        Ok(())
    }

    #[test]
    fn encryption_key_is_not_used_for_signatures() -> Result<()> {
        let jwk: Jwk = serde_json::from_str::<Jwk>(rsa::PRIMARY_JWK)?.with_usage(Usage::Encryption);

        assert!(!jwk.is_compatible(Algorithm::RS256));
        Ok(())
    }

    #[test]
    fn verifies_signature_from_matching_private_key() -> Result<()> {
        let jwk: Jwk = serde_json::from_str(rsa::PRIMARY_JWK)?;
        let signature = rsa::sign(rsa::PRIMARY_PK8, Algorithm::RS256, b"brewing");

        jwk.verify(Algorithm::RS256, b"brewing", &signature)?;
        Ok(())
    }

    #[test]
    fn rejects_signature_from_other_private_key() -> Result<()> {
        let jwk: Jwk = serde_json::from_str(rsa::PRIMARY_JWK)?;
        let signature = rsa::sign(rsa::ROGUE_PK8, Algorithm::RS256, b"brewing");

        let err = jwk.verify(Algorithm::RS256, b"brewing", &signature).unwrap_err();
        assert!(matches!(err, error::JwtVerifyError::SignatureMismatch(_)));
        Ok(())
    }
}
