use serde::{Deserialize, Serialize};

use crate::{jwk, Jwk};

/// A JSON Web Key Set (JWKS)
///
/// Keys that cannot be understood are skipped with a warning when a set is
/// deserialized, so a single unsupported key never hides the usable ones.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwks {
    #[serde(deserialize_with = "deserialize_keys")]
    keys: Vec<Jwk>,
}

impl Jwks {
    /// Adds a key to the set
    pub fn add_key(&mut self, key: Jwk) {
        self.keys.push(key);
    }

    /// A view of the keys in this set
    pub fn keys(&self) -> &[Jwk] {
        &self.keys
    }

    /// Whether the set holds no keys
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Gets the first key carrying the given identifier
    pub fn get_key_by_id(&self, kid: &jwk::KeyIdRef) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.key_id() == Some(kid))
    }
}

impl FromIterator<Jwk> for Jwks {
    fn from_iter<T: IntoIterator<Item = Jwk>>(iter: T) -> Self {
        Self {
            keys: iter.into_iter().collect(),
        }
    }
}

fn deserialize_keys<'de, D>(deserializer: D) -> Result<Vec<Jwk>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct MaybeJwksVisitor;

    impl<'de> serde::de::Visitor<'de> for MaybeJwksVisitor {
        type Value = Vec<Jwk>;

        fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("a list of JWK objects")
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: serde::de::SeqAccess<'de>,
        {
            let mut values = Vec::with_capacity(seq.size_hint().unwrap_or_default());
            let mut index = 0_usize;

            while let Some(value) = seq.next_element()? {
                match value {
                    MaybeJwk::Jwk(jwk) => values.push(jwk),
                    MaybeJwk::Unknown(key) => {
                        tracing::warn!(
                            jwks.idx = index,
                            jwk.kty = ?key.kty,
                            jwk.kid = ?key.kid,
                            jwk.alg = ?key.alg,
                            "skipping unsupported JWK"
                        );
                    }
                }
                index += 1;
            }

            Ok(values)
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum MaybeJwk {
        Jwk(Jwk),
        Unknown(JwkLike),
    }

    #[derive(Deserialize)]
    struct JwkLike {
        #[serde(default)]
        kty: Option<String>,
        #[serde(default)]
        kid: Option<jwk::KeyId>,
        #[serde(default)]
        alg: Option<String>,
    }

    deserializer.deserialize_seq(MaybeJwksVisitor)
}
