//! JSON Web Key and JSON Web Key Set model, and conversions to and from [`KeyPair`] and
//! [`PublicKey`].

use base64::Engine;
use base64::prelude::{BASE64_STANDARD, BASE64_URL_SAFE_NO_PAD};
use p256::ecdsa::{SigningKey as P256SigningKey, VerifyingKey as P256VerifyingKey};
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{KeyAlgorithm, KeyPair, PublicKey};
use crate::error::{PkiError, Result};
use crate::jose::JwsAlgorithm;

const P256_COORDINATE_LEN: usize = 32;

/// A single JSON Web Key. Field names follow RFC 7517/7518 exactly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dq: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qi: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub use_: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    /// Base64 (not base64url) DER certificates, leaf first.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x5c: Option<Vec<String>>,
}

impl Jwk {
    /// The key algorithm this JWK describes.
    pub fn algorithm(&self) -> Result<KeyAlgorithm> {
        match (self.kty.as_str(), self.crv.as_deref()) {
            ("RSA", _) => Ok(KeyAlgorithm::Rsa2048),
            ("EC", Some("P-256")) => Ok(KeyAlgorithm::EcP256),
            ("EC", crv) => Err(PkiError::UnsupportedAlgorithm(format!(
                "EC curve {}",
                crv.unwrap_or("<missing>")
            ))),
            (kty, _) => Err(PkiError::InvalidKeyType(kty.to_string())),
        }
    }

    /// Whether the JWK carries private key material.
    pub fn is_private(&self) -> bool {
        self.d.is_some()
    }

    /// A copy with every private member removed.
    pub fn to_public(&self) -> Jwk {
        Jwk {
            d: None,
            p: None,
            q: None,
            dp: None,
            dq: None,
            qi: None,
            ..self.clone()
        }
    }

    /// RFC 7638 thumbprint: base64url SHA-256 of the required members in lexicographic order.
    pub fn thumbprint(&self) -> Result<String> {
        let canonical = match self.algorithm()? {
            KeyAlgorithm::Rsa2048 => serde_json::json!({
                "e": required(&self.e, "e")?,
                "kty": "RSA",
                "n": required(&self.n, "n")?,
            }),
            KeyAlgorithm::EcP256 => serde_json::json!({
                "crv": "P-256",
                "kty": "EC",
                "x": required(&self.x, "x")?,
                "y": required(&self.y, "y")?,
            }),
        };
        // serde_json's default map is ordered, so the members serialize sorted
        let digest = Sha256::digest(serde_json::to_vec(&canonical)?);
        Ok(BASE64_URL_SAFE_NO_PAD.encode(digest))
    }

    /// Attach a PEM certificate chain (leaf first) as `x5c`.
    pub fn with_x5c(mut self, chain: &[String]) -> Result<Self> {
        let x5c = chain
            .iter()
            .map(|pem| crate::convert::pem_to_der(pem).map(|der| BASE64_STANDARD.encode(der)))
            .collect::<Result<Vec<_>>>()?;
        self.x5c = Some(x5c);
        Ok(self)
    }

    /// The `x5c` chain as PEM certificates, ready for [`crate::chain::validate_x5c_chain`].
    pub fn x5c_pem_chain(&self) -> Result<Vec<String>> {
        let x5c = self
            .x5c
            .as_ref()
            .ok_or_else(|| PkiError::FieldNotFound("x5c".to_string()))?;
        x5c.iter()
            .map(|entry| {
                let der = BASE64_STANDARD.decode(entry)?;
                crate::convert::der_to_pem(&der)
            })
            .collect()
    }
}

fn required<'a>(field: &'a Option<String>, name: &str) -> Result<&'a str> {
    field
        .as_deref()
        .ok_or_else(|| PkiError::MalformedInput(format!("JWK is missing '{name}'")))
}

fn decode_uint(field: &Option<String>, name: &str) -> Result<BigUint> {
    let bytes = BASE64_URL_SAFE_NO_PAD.decode(required(field, name)?)?;
    Ok(BigUint::from_bytes_be(&bytes))
}

fn decode_fixed(field: &Option<String>, name: &str) -> Result<Vec<u8>> {
    let bytes = BASE64_URL_SAFE_NO_PAD.decode(required(field, name)?)?;
    if bytes.len() != P256_COORDINATE_LEN {
        return Err(PkiError::MalformedInput(format!(
            "JWK member '{name}' must be {P256_COORDINATE_LEN} bytes"
        )));
    }
    Ok(bytes)
}

fn encode_uint(value: &BigUint) -> String {
    BASE64_URL_SAFE_NO_PAD.encode(value.to_bytes_be())
}

/// A JSON Web Key Set. `kid` identifies a key uniquely within one set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

impl Jwks {
    /// Find a key by its ID.
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid.as_deref() == Some(kid))
    }
}

/// Publish a public JWK as a single-entry key set, tagging it with `alg`, `use: "sig"` and
/// a `kid` equal to its RFC 7638 thumbprint.
pub fn generate_jwks(public_key: &Jwk) -> Result<Jwks> {
    if public_key.is_private() {
        return Err(PkiError::InvalidKeyType(
            "refusing to publish a private JWK".to_string(),
        ));
    }
    let alg = JwsAlgorithm::for_key(public_key.algorithm()?);
    let key = Jwk {
        alg: Some(alg.to_string()),
        use_: Some("sig".to_string()),
        kid: Some(public_key.thumbprint()?),
        ..public_key.clone()
    };
    Ok(Jwks { keys: vec![key] })
}

impl PublicKey {
    pub fn to_jwk(&self) -> Result<Jwk> {
        match self {
            PublicKey::Rsa(public) => Ok(Jwk {
                kty: "RSA".to_string(),
                n: Some(encode_uint(public.n())),
                e: Some(encode_uint(public.e())),
                ..Default::default()
            }),
            PublicKey::EcdsaP256(verifying_key) => {
                let point = verifying_key.to_encoded_point(false);
                let (x, y) = point
                    .x()
                    .zip(point.y())
                    .ok_or_else(|| PkiError::EncodingError("EC point at infinity".to_string()))?;
                Ok(Jwk {
                    kty: "EC".to_string(),
                    crv: Some("P-256".to_string()),
                    x: Some(BASE64_URL_SAFE_NO_PAD.encode(x)),
                    y: Some(BASE64_URL_SAFE_NO_PAD.encode(y)),
                    ..Default::default()
                })
            }
        }
    }

    /// Build a public key from a JWK. Private members, if any, are ignored.
    pub fn from_jwk(jwk: &Jwk) -> Result<Self> {
        match jwk.algorithm()? {
            KeyAlgorithm::Rsa2048 => {
                let n = decode_uint(&jwk.n, "n")?;
                let e = decode_uint(&jwk.e, "e")?;
                Ok(PublicKey::Rsa(RsaPublicKey::new(n, e)?))
            }
            KeyAlgorithm::EcP256 => {
                let x = decode_fixed(&jwk.x, "x")?;
                let y = decode_fixed(&jwk.y, "y")?;
                let point = p256::EncodedPoint::from_affine_coordinates(
                    x.as_slice().into(),
                    y.as_slice().into(),
                    false,
                );
                let verifying_key = P256VerifyingKey::from_encoded_point(&point)
                    .map_err(|_| PkiError::MalformedInput("EC point not on P-256".to_string()))?;
                Ok(PublicKey::EcdsaP256(verifying_key))
            }
        }
    }
}

impl KeyPair {
    /// Export the private key as a JWK (RSA: kty/n/e/d/p/q/dp/dq/qi, EC: kty/crv/x/y/d).
    pub fn to_jwk(&self) -> Result<Jwk> {
        let public = self.public_key().to_jwk()?;
        match self {
            KeyPair::Rsa { private, .. } => {
                let mut private = (**private).clone();
                private.precompute()?;
                let [p, q] = private.primes() else {
                    return Err(PkiError::EncodingError(
                        "multi-prime RSA keys cannot be exported".to_string(),
                    ));
                };
                let (dp, dq, qi) = match (private.dp(), private.dq(), private.crt_coefficient()) {
                    (Some(dp), Some(dq), Some(qi)) => (dp, dq, qi),
                    _ => {
                        return Err(PkiError::EncodingError(
                            "missing RSA CRT parameters".to_string(),
                        ));
                    }
                };
                Ok(Jwk {
                    d: Some(encode_uint(private.d())),
                    p: Some(encode_uint(p)),
                    q: Some(encode_uint(q)),
                    dp: Some(encode_uint(dp)),
                    dq: Some(encode_uint(dq)),
                    qi: Some(encode_uint(&qi)),
                    ..public
                })
            }
            KeyPair::EcdsaP256 { signing_key, .. } => Ok(Jwk {
                d: Some(BASE64_URL_SAFE_NO_PAD.encode(signing_key.to_bytes())),
                ..public
            }),
        }
    }

    /// Import a private JWK. Fails with `InvalidKeyType` when `d` is absent.
    pub fn from_jwk(jwk: &Jwk) -> Result<Self> {
        if !jwk.is_private() {
            return Err(PkiError::InvalidKeyType(
                "a private JWK is required for signing".to_string(),
            ));
        }
        match (jwk.algorithm()?, PublicKey::from_jwk(jwk)?) {
            (KeyAlgorithm::Rsa2048, PublicKey::Rsa(public)) => {
                let primes = vec![decode_uint(&jwk.p, "p")?, decode_uint(&jwk.q, "q")?];
                let private = RsaPrivateKey::from_components(
                    public.n().clone(),
                    public.e().clone(),
                    decode_uint(&jwk.d, "d")?,
                    primes,
                )?;
                private.validate()?;
                Ok(KeyPair::Rsa {
                    private: Box::new(private),
                    public,
                })
            }
            (KeyAlgorithm::EcP256, PublicKey::EcdsaP256(verifying_key)) => {
                let d = decode_fixed(&jwk.d, "d")?;
                let signing_key = P256SigningKey::from_slice(&d)
                    .map_err(|_| PkiError::MalformedInput("invalid P-256 scalar".to_string()))?;
                if signing_key.verifying_key() != &verifying_key {
                    return Err(PkiError::MalformedInput(
                        "JWK private scalar does not match x/y".to_string(),
                    ));
                }
                Ok(KeyPair::EcdsaP256 {
                    signing_key,
                    verifying_key,
                })
            }
            _ => Err(PkiError::InvalidKeyType(jwk.kty.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_private_jwk_round_trip() {
        for algorithm in [KeyAlgorithm::Rsa2048, KeyAlgorithm::EcP256] {
            let key = KeyPair::generate(algorithm).unwrap();
            let jwk = key.to_jwk().unwrap();
            let restored = KeyPair::from_jwk(&jwk).unwrap();
            assert_eq!(restored.public_key(), key.public_key());
            assert_eq!(
                PublicKey::from_jwk(&jwk.to_public()).unwrap(),
                key.public_key()
            );
        }
    }

    #[test]
    fn test_public_jwk_cannot_sign() {
        let key = KeyPair::generate(KeyAlgorithm::EcP256).unwrap();
        let public = key.public_key().to_jwk().unwrap();
        assert!(matches!(
            KeyPair::from_jwk(&public),
            Err(PkiError::InvalidKeyType(_))
        ));
    }

    #[test]
    fn test_jwks_entries_are_tagged() {
        let key = KeyPair::generate(KeyAlgorithm::Rsa2048).unwrap();
        let public = key.public_key().to_jwk().unwrap();
        let jwks = generate_jwks(&public).unwrap();
        assert_eq!(jwks.keys.len(), 1);

        let entry = &jwks.keys[0];
        assert_eq!(entry.alg.as_deref(), Some("RS256"));
        assert_eq!(entry.use_.as_deref(), Some("sig"));
        let kid = entry.kid.clone().unwrap();
        assert_eq!(kid, public.thumbprint().unwrap());
        assert_eq!(jwks.find(&kid), Some(entry));

        let json = serde_json::to_value(&jwks).unwrap();
        let fields = json["keys"][0].as_object().unwrap();
        for name in ["kty", "e", "n", "alg", "use", "kid"] {
            assert!(fields.contains_key(name), "missing {name}");
        }
    }

    #[test]
    fn test_rfc7638_thumbprint_vector() {
        // RFC 7638 section 3.1
        let jwk: Jwk = serde_json::from_str(
            r#"{"kty":"RSA","n":"0vx7agoebGcQSuuPiLJXZptN9nndrQmbXEps2aiAFbWhM78LhWx4cbbfAAtVT86zwu1RK7aPFFxuhDR1L6tSoc_BJECPebWKRXjBZCiFV4n3oknjhMstn64tZ_2W-5JsGY4Hc5n9yBXArwl93lqt7_RN5w6Cf0h4QyQ5v-65YGjQR0_FDW2QvzqY368QQMicAtaSqzs8KJZgnYb9c7d0zgdAZHzu6qMQvRL5hajrn1n91CbOpbISD08qNLyrdkt-bFTWhAI4vMQFh6WeZu0fM4lFd2NcRwr3XPksINHaQ-G_xBniIqbw0Ls1jF44-csFCur-kEgU8awapJzKnqDKgw","e":"AQAB","alg":"RS256","kid":"2011-04-29"}"#,
        )
        .unwrap();
        assert_eq!(
            jwk.thumbprint().unwrap(),
            "NzbLsXh8uDCcd-6MNwXF4W_7noWXFZAfHkxZsRGC9Xs"
        );
    }

    #[test]
    fn test_unsupported_curve() {
        let jwk = Jwk {
            kty: "EC".to_string(),
            crv: Some("P-384".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            PublicKey::from_jwk(&jwk),
            Err(PkiError::UnsupportedAlgorithm(_))
        ));
    }
}
