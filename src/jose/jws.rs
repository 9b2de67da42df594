use std::str::FromStr;

use bon::Builder;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::fetch::JwksFetcher;
use super::{JwsAlgorithm, ProtectedHeader, b64_decode, b64_encode};
use crate::error::{PkiError, Result};
use crate::key::{Jwk, KeyPair, PublicKey};

/// JWS serializations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Serialization {
    /// `header.payload.signature`
    #[default]
    Compact,
    /// `{"protected", "payload", "signature"}` JSON object
    Flattened,
}

impl FromStr for Serialization {
    type Err = PkiError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "compact" => Ok(Serialization::Compact),
            "flattened" => Ok(Serialization::Flattened),
            other => Err(PkiError::UnsupportedSerialization(other.to_string())),
        }
    }
}

/// Options for [`sign_jws`].
///
/// `header.alg` is always overwritten with the signing algorithm. Without an explicit
/// `algorithm` the one bound to the signing key is used.
#[derive(Debug, Clone, Default, Builder)]
pub struct JwsOptions {
    #[builder(default)]
    pub header: ProtectedHeader,
    pub algorithm: Option<JwsAlgorithm>,
    #[builder(default)]
    pub serialization: Serialization,
}

#[derive(Debug, Serialize, Deserialize)]
struct FlattenedJws {
    protected: String,
    payload: String,
    signature: String,
}

/// A JWS whose signature has been verified.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedJws {
    pub payload: Vec<u8>,
    pub protected_header: ProtectedHeader,
}

impl VerifiedJws {
    /// The payload decoded as JSON.
    pub fn payload_json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.payload)?)
    }
}

/// Serializes `payload` to JSON and signs it with the private `jwk`.
pub fn sign_jws<T: Serialize + ?Sized>(jwk: &Jwk, payload: &T, options: &JwsOptions) -> Result<String> {
    let key = KeyPair::from_jwk(jwk)?;
    let payload = serde_json::to_vec(payload)?;
    sign_bytes(
        &key,
        &payload,
        options.header.clone(),
        options.algorithm,
        options.serialization,
    )
}

pub(crate) fn sign_bytes(
    key: &KeyPair,
    payload: &[u8],
    mut header: ProtectedHeader,
    algorithm: Option<JwsAlgorithm>,
    serialization: Serialization,
) -> Result<String> {
    let algorithm = algorithm.unwrap_or_else(|| JwsAlgorithm::for_key(key.algorithm()));
    if algorithm.key_algorithm() != key.algorithm() {
        return Err(PkiError::InvalidKeyType(format!(
            "{algorithm} cannot be used with a {} key",
            key.algorithm()
        )));
    }
    if header.jwk.as_ref().is_some_and(Jwk::is_private) {
        return Err(PkiError::InvalidKeyType(
            "embedded jwk must be a public key".to_string(),
        ));
    }
    header.alg = algorithm.to_string();

    let protected = b64_encode(serde_json::to_vec(&header)?);
    let payload = b64_encode(payload);
    let signing_input = format!("{protected}.{payload}");
    let signature = b64_encode(key.sign_compact(signing_input.as_bytes())?);

    match serialization {
        Serialization::Compact => Ok(format!("{signing_input}.{signature}")),
        Serialization::Flattened => Ok(serde_json::to_string(&FlattenedJws {
            protected,
            payload,
            signature,
        })?),
    }
}

struct ParsedJws {
    protected: String,
    payload: String,
    signature: String,
    header: ProtectedHeader,
}

impl ParsedJws {
    fn parse(jws: &str, serialization: Serialization) -> Result<Self> {
        let (protected, payload, signature) = match serialization {
            Serialization::Compact => {
                let mut parts = jws.trim().split('.');
                match (parts.next(), parts.next(), parts.next(), parts.next()) {
                    (Some(h), Some(p), Some(s), None) => (h.to_string(), p.to_string(), s.to_string()),
                    _ => {
                        return Err(PkiError::MalformedInput(
                            "compact JWS must have three segments".to_string(),
                        ));
                    }
                }
            }
            Serialization::Flattened => {
                let flattened: FlattenedJws = serde_json::from_str(jws)?;
                (flattened.protected, flattened.payload, flattened.signature)
            }
        };
        let header = serde_json::from_slice(&b64_decode(&protected)?)?;
        Ok(Self {
            protected,
            payload,
            signature,
            header,
        })
    }

    fn verify(self, key: &PublicKey) -> Result<VerifiedJws> {
        let algorithm: JwsAlgorithm = self.header.alg.parse()?;
        if algorithm.key_algorithm() != key.algorithm() {
            warn!(alg = %algorithm, "JWS algorithm does not match the verification key");
            return Err(PkiError::SignatureInvalid);
        }
        let signature = b64_decode(&self.signature).map_err(|_| PkiError::SignatureInvalid)?;
        let signing_input = format!("{}.{}", self.protected, self.payload);
        key.verify_compact(signing_input.as_bytes(), &signature)
            .inspect_err(|_| warn!("JWS signature did not verify"))?;

        Ok(VerifiedJws {
            payload: b64_decode(&self.payload)?,
            protected_header: self.header,
        })
    }
}

/// Verifies a JWS, resolving the key from its own protected header.
///
/// An embedded `jwk` is preferred and must be public. Otherwise the key set at `jku` is
/// fetched through `fetcher` and the entry matching `kid` is used. Without either source,
/// or without a matching entry, this fails with `KeyResolutionFailed`; transport failures
/// surface as `KeyFetch`.
pub fn verify_jws(
    jws: &str,
    serialization: Serialization,
    fetcher: &dyn JwksFetcher,
) -> Result<VerifiedJws> {
    let parsed = ParsedJws::parse(jws, serialization)?;
    let jwk = resolve_key(&parsed.header, fetcher)?;
    let key = PublicKey::from_jwk(&jwk).map_err(|e| PkiError::KeyResolutionFailed(e.to_string()))?;
    parsed.verify(&key)
}

fn resolve_key(header: &ProtectedHeader, fetcher: &dyn JwksFetcher) -> Result<Jwk> {
    if let Some(jwk) = &header.jwk {
        if jwk.is_private() {
            return Err(PkiError::KeyResolutionFailed(
                "embedded jwk must be a public key".to_string(),
            ));
        }
        return Ok(jwk.clone());
    }
    let Some(jku) = &header.jku else {
        return Err(PkiError::KeyResolutionFailed(
            "header carries neither jwk nor jku".to_string(),
        ));
    };
    let kid = header
        .kid
        .as_deref()
        .ok_or_else(|| PkiError::KeyResolutionFailed("jku requires a kid".to_string()))?;
    debug!(%jku, %kid, "resolving JWS key from key set");
    fetcher
        .fetch(jku)?
        .find(kid)
        .cloned()
        .ok_or_else(|| PkiError::KeyResolutionFailed(format!("no key with kid '{kid}' at {jku}")))
}

/// Verifies a JWS against a pinned key, ignoring any key hints in its header.
pub fn verify_jws_with_jwk(jws: &str, jwk: &Jwk, serialization: Serialization) -> Result<VerifiedJws> {
    verify_with_key(jws, &PublicKey::from_jwk(jwk)?, serialization)
}

pub(crate) fn verify_with_key(
    jws: &str,
    key: &PublicKey,
    serialization: Serialization,
) -> Result<VerifiedJws> {
    ParsedJws::parse(jws, serialization)?.verify(key)
}

/// Reads the protected header WITHOUT verifying the signature. For inspection only; never
/// base a trust decision on the result.
///
/// Flattened JSON input is recognized by its leading `{`.
pub fn decode_protected_header(jws: &str) -> Result<ProtectedHeader> {
    let serialization = if jws.trim_start().starts_with('{') {
        Serialization::Flattened
    } else {
        Serialization::Compact
    };
    Ok(ParsedJws::parse(jws, serialization)?.header)
}

/// Decodes verified payload bytes as UTF-8 text.
pub fn decode_jws_payload(payload: &[u8]) -> Result<String> {
    String::from_utf8(payload.to_vec()).map_err(|e| PkiError::MalformedInput(e.to_string()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::jose::StaticJwksFetcher;
    use crate::key::{KeyAlgorithm, generate_jwks};

    fn signer(algorithm: KeyAlgorithm) -> (Jwk, Jwk) {
        let key = KeyPair::generate(algorithm).unwrap();
        (key.to_jwk().unwrap(), key.public_key().to_jwk().unwrap())
    }

    fn embedded_header(public: &Jwk) -> ProtectedHeader {
        ProtectedHeader {
            jwk: Some(public.clone()),
            nonce: Some("abc123".to_string()),
            url: Some("https://ca.example.com/new-order".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_embedded_jwk_round_trip() {
        let (private, public) = signer(KeyAlgorithm::EcP256);
        for serialization in [Serialization::Compact, Serialization::Flattened] {
            let options = JwsOptions::builder()
                .header(embedded_header(&public))
                .serialization(serialization)
                .build();
            let jws = sign_jws(&private, &json!({"hello": "world"}), &options).unwrap();
            let verified = verify_jws(&jws, serialization, &StaticJwksFetcher::default()).unwrap();
            assert_eq!(verified.protected_header.alg, "ES256");
            assert_eq!(verified.protected_header.nonce.as_deref(), Some("abc123"));
            assert_eq!(
                decode_jws_payload(&verified.payload).unwrap(),
                r#"{"hello":"world"}"#
            );
            assert_eq!(decode_protected_header(&jws).unwrap(), verified.protected_header);
        }
    }

    #[test]
    fn test_altered_payload_fails() {
        let (private, public) = signer(KeyAlgorithm::Rsa2048);
        let options = JwsOptions::builder().header(embedded_header(&public)).build();
        let jws = sign_jws(&private, &json!({"amount": 1}), &options).unwrap();

        let parts: Vec<&str> = jws.split('.').collect();
        let forged = format!("{}.{}.{}", parts[0], b64_encode(br#"{"amount":1000}"#), parts[2]);
        assert_eq!(
            verify_jws(&forged, Serialization::Compact, &StaticJwksFetcher::default()),
            Err(PkiError::SignatureInvalid)
        );
    }

    #[test]
    fn test_jku_resolution() {
        let (private, public) = signer(KeyAlgorithm::EcP256);
        let jwks = generate_jwks(&public).unwrap();
        let kid = jwks.keys[0].kid.clone().unwrap();
        let fetcher = StaticJwksFetcher::default().with("https://keys.example.com/jwks.json", jwks);

        let header = ProtectedHeader {
            jku: Some("https://keys.example.com/jwks.json".to_string()),
            kid: Some(kid),
            ..Default::default()
        };
        let jws = sign_jws(&private, "payload", &JwsOptions::builder().header(header.clone()).build())
            .unwrap();
        let verified = verify_jws(&jws, Serialization::Compact, &fetcher).unwrap();
        assert_eq!(verified.payload_json::<String>().unwrap(), "payload");

        let unknown_kid = ProtectedHeader {
            kid: Some("missing".to_string()),
            ..header
        };
        let jws = sign_jws(&private, "payload", &JwsOptions::builder().header(unknown_kid).build())
            .unwrap();
        assert!(matches!(
            verify_jws(&jws, Serialization::Compact, &fetcher),
            Err(PkiError::KeyResolutionFailed(_))
        ));
    }

    #[test]
    fn test_fetch_failure_is_distinct() {
        let (private, _) = signer(KeyAlgorithm::EcP256);
        let header = ProtectedHeader {
            jku: Some("https://unreachable.example.com/jwks.json".to_string()),
            kid: Some("k1".to_string()),
            ..Default::default()
        };
        let jws = sign_jws(&private, "x", &JwsOptions::builder().header(header).build()).unwrap();
        assert!(matches!(
            verify_jws(&jws, Serialization::Compact, &StaticJwksFetcher::default()),
            Err(PkiError::KeyFetch(_))
        ));
    }

    #[test]
    fn test_key_resolution_fails_closed() {
        let (private, _) = signer(KeyAlgorithm::EcP256);
        let jws = sign_jws(&private, "x", &JwsOptions::default()).unwrap();
        assert!(matches!(
            verify_jws(&jws, Serialization::Compact, &StaticJwksFetcher::default()),
            Err(PkiError::KeyResolutionFailed(_))
        ));

        // A private jwk smuggled into a header signed elsewhere is still refused
        let header = ProtectedHeader {
            jwk: Some(private.clone()),
            alg: "ES256".to_string(),
            ..Default::default()
        };
        let key = KeyPair::from_jwk(&private).unwrap();
        let protected = b64_encode(serde_json::to_vec(&header).unwrap());
        let payload = b64_encode(br#""x""#);
        let signature = key
            .sign_compact(format!("{protected}.{payload}").as_bytes())
            .unwrap();
        let jws = format!("{protected}.{payload}.{}", b64_encode(signature));
        assert!(matches!(
            verify_jws(&jws, Serialization::Compact, &StaticJwksFetcher::default()),
            Err(PkiError::KeyResolutionFailed(_))
        ));
    }

    #[test]
    fn test_private_header_jwk_is_not_published() {
        let (private, _) = signer(KeyAlgorithm::EcP256);
        let header = ProtectedHeader {
            jwk: Some(private.clone()),
            ..Default::default()
        };
        for serialization in [Serialization::Compact, Serialization::Flattened] {
            let options = JwsOptions::builder()
                .header(header.clone())
                .serialization(serialization)
                .build();
            assert!(matches!(
                sign_jws(&private, "x", &options),
                Err(PkiError::InvalidKeyType(_))
            ));
        }
    }

    #[test]
    fn test_pinned_key_and_algorithm_binding() {
        let (private, public) = signer(KeyAlgorithm::EcP256);
        let (_, other_public) = signer(KeyAlgorithm::Rsa2048);
        let jws = sign_jws(&private, "x", &JwsOptions::default()).unwrap();

        assert!(verify_jws_with_jwk(&jws, &public, Serialization::Compact).is_ok());
        assert_eq!(
            verify_jws_with_jwk(&jws, &other_public, Serialization::Compact),
            Err(PkiError::SignatureInvalid)
        );
        assert!(matches!(
            sign_jws(
                &private,
                "x",
                &JwsOptions::builder().algorithm(JwsAlgorithm::RS256).build()
            ),
            Err(PkiError::InvalidKeyType(_))
        ));
    }

    #[test]
    fn test_unknown_serialization() {
        assert_eq!(
            "general".parse::<Serialization>(),
            Err(PkiError::UnsupportedSerialization("general".to_string()))
        );
    }
}
