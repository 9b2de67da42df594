//! Key generation, import/export and raw signing.
//!
//! Two algorithms are supported: RSA-2048 for general signing and CSR keys, and ECDSA
//! P-256 for fast JOSE signing. A generated pair can be exported as JWK, PEM
//! (SPKI `PUBLIC KEY` / PKCS#8 `PRIVATE KEY`) or raw DER, both halves in the same format.

pub mod jwk;

use std::fmt;
use std::str::FromStr;

use der::Encode;
use ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{
    Signature as P256Signature, SigningKey as P256SigningKey, VerifyingKey as P256VerifyingKey,
};
use pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rand_core::{CryptoRngCore, OsRng};
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs1v15::{
    Signature as RsaSignature, SigningKey as RsaSigningKey, VerifyingKey as RsaVerifyingKey,
};
use rsa::signature::SignatureEncoding;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use tracing::debug;
use x509_cert::spki::SubjectPublicKeyInfoOwned;

use crate::error::{PkiError, Result};

pub use jwk::{Jwk, Jwks, generate_jwks};

/// Modulus size of generated RSA keys.
pub const RSA_KEY_BITS: usize = 2048;

/// Supported asymmetric key algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAlgorithm {
    /// RSA with a 2048-bit modulus (imports accept larger moduli).
    Rsa2048,
    /// ECDSA over NIST P-256.
    EcP256,
}

impl FromStr for KeyAlgorithm {
    type Err = PkiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "rsa" | "rsa-2048" | "rsa2048" | "rs256" => Ok(KeyAlgorithm::Rsa2048),
            "ec" | "p-256" | "p256" | "ec-p256" | "es256" => Ok(KeyAlgorithm::EcP256),
            _ => Err(PkiError::UnsupportedAlgorithm(s.to_string())),
        }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyAlgorithm::Rsa2048 => f.write_str("RSA-2048"),
            KeyAlgorithm::EcP256 => f.write_str("EC P-256"),
        }
    }
}

/// Output representation for exported keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyFormat {
    #[default]
    Jwk,
    Pem,
    Der,
}

impl FromStr for KeyFormat {
    type Err = PkiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "jwk" => Ok(KeyFormat::Jwk),
            "pem" => Ok(KeyFormat::Pem),
            "der" => Ok(KeyFormat::Der),
            _ => Err(PkiError::MalformedInput(format!("unknown key format '{s}'"))),
        }
    }
}

/// A single key in one of the three interchangeable representations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodedKey {
    Jwk(Jwk),
    Pem(String),
    Der(Vec<u8>),
}

impl EncodedKey {
    pub fn as_jwk(&self) -> Option<&Jwk> {
        match self {
            EncodedKey::Jwk(jwk) => Some(jwk),
            _ => None,
        }
    }

    pub fn as_pem(&self) -> Option<&str> {
        match self {
            EncodedKey::Pem(pem) => Some(pem),
            _ => None,
        }
    }

    pub fn as_der(&self) -> Option<&[u8]> {
        match self {
            EncodedKey::Der(der) => Some(der),
            _ => None,
        }
    }
}

/// An exported key pair. Both halves always share the same representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedKeyPair {
    pub public_key: EncodedKey,
    pub private_key: EncodedKey,
}

/// Generates a fresh key pair and exports it in `format`, using the operating system RNG.
///
/// # Example
/// ```
/// use pkijose::key::{generate_key_pair, KeyAlgorithm, KeyFormat};
///
/// let pair = generate_key_pair(KeyAlgorithm::EcP256, KeyFormat::Jwk).unwrap();
/// let public = pair.public_key.as_jwk().unwrap();
/// assert_eq!(public.kty, "EC");
/// assert!(public.d.is_none());
/// ```
pub fn generate_key_pair(algorithm: KeyAlgorithm, format: KeyFormat) -> Result<EncodedKeyPair> {
    KeyPair::generate(algorithm)?.encode(format)
}

/// Generates an EC P-256 key pair, the usual choice for JWS signing.
pub fn generate_key_pair_ec(format: KeyFormat) -> Result<EncodedKeyPair> {
    generate_key_pair(KeyAlgorithm::EcP256, format)
}

/// Supported key pairs.
#[derive(Debug, Clone)]
pub enum KeyPair {
    Rsa {
        private: Box<RsaPrivateKey>,
        public: RsaPublicKey,
    },
    EcdsaP256 {
        signing_key: P256SigningKey,
        verifying_key: P256VerifyingKey,
    },
}

impl KeyPair {
    /// Generate a key pair with the operating system RNG.
    pub fn generate(algorithm: KeyAlgorithm) -> Result<Self> {
        Self::generate_with_rng(algorithm, &mut OsRng)
    }

    /// Generate a key pair drawing randomness from `rng`.
    ///
    /// Passing a seeded RNG makes generation reproducible, which is only ever appropriate
    /// in tests.
    pub fn generate_with_rng<R: CryptoRngCore>(algorithm: KeyAlgorithm, rng: &mut R) -> Result<Self> {
        debug!(%algorithm, "generating key pair");
        match algorithm {
            KeyAlgorithm::Rsa2048 => {
                let private = RsaPrivateKey::new(rng, RSA_KEY_BITS)
                    .map_err(|e| PkiError::KeyGenerationError(e.to_string()))?;
                let public = RsaPublicKey::from(&private);
                Ok(KeyPair::Rsa {
                    private: Box::new(private),
                    public,
                })
            }
            KeyAlgorithm::EcP256 => {
                let signing_key = P256SigningKey::random(rng);
                let verifying_key = *signing_key.verifying_key();
                Ok(KeyPair::EcdsaP256 {
                    signing_key,
                    verifying_key,
                })
            }
        }
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        match self {
            KeyPair::Rsa { .. } => KeyAlgorithm::Rsa2048,
            KeyPair::EcdsaP256 { .. } => KeyAlgorithm::EcP256,
        }
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_key_pair(self)
    }

    /// The SubjectPublicKeyInfo embedded in CSRs and certificates.
    pub fn as_spki(&self) -> Result<SubjectPublicKeyInfoOwned> {
        self.public_key().as_spki()
    }

    /// Export in the requested representation, public and private halves alike.
    pub fn encode(&self, format: KeyFormat) -> Result<EncodedKeyPair> {
        let public = self.public_key();
        Ok(match format {
            KeyFormat::Jwk => EncodedKeyPair {
                public_key: EncodedKey::Jwk(public.to_jwk()?),
                private_key: EncodedKey::Jwk(self.to_jwk()?),
            },
            KeyFormat::Pem => EncodedKeyPair {
                public_key: EncodedKey::Pem(public.to_pem()?),
                private_key: EncodedKey::Pem(self.to_pkcs8_pem()?),
            },
            KeyFormat::Der => EncodedKeyPair {
                public_key: EncodedKey::Der(public.to_der()?),
                private_key: EncodedKey::Der(self.to_pkcs8_der()?),
            },
        })
    }

    /// Rebuild a key pair from the private half of an [`EncodedKeyPair`].
    pub fn decode(private_key: &EncodedKey) -> Result<Self> {
        match private_key {
            EncodedKey::Jwk(jwk) => Self::from_jwk(jwk),
            EncodedKey::Pem(pem) => Self::from_pem(pem),
            EncodedKey::Der(der) => Self::from_pkcs8_der(der),
        }
    }

    pub fn to_pkcs8_der(&self) -> Result<Vec<u8>> {
        let doc = match self {
            KeyPair::Rsa { private, .. } => private.to_pkcs8_der(),
            KeyPair::EcdsaP256 { signing_key, .. } => signing_key.to_pkcs8_der(),
        }
        .map_err(|e| PkiError::EncodingError(e.to_string()))?;
        Ok(doc.as_bytes().to_vec())
    }

    pub fn to_pkcs8_pem(&self) -> Result<String> {
        let pem = match self {
            KeyPair::Rsa { private, .. } => private.to_pkcs8_pem(LineEnding::LF),
            KeyPair::EcdsaP256 { signing_key, .. } => signing_key.to_pkcs8_pem(LineEnding::LF),
        }
        .map_err(|e| PkiError::EncodingError(e.to_string()))?;
        Ok(pem.to_string())
    }

    /// Import a PKCS#8 DER private key.
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        let info = pkcs8::PrivateKeyInfo::try_from(der)?;
        match info.algorithm.oid {
            const_oid::db::rfc5912::RSA_ENCRYPTION => {
                let private = RsaPrivateKey::from_pkcs8_der(der)?;
                Ok(Self::from_rsa(private))
            }
            const_oid::db::rfc5912::ID_EC_PUBLIC_KEY => {
                let signing_key = P256SigningKey::from_pkcs8_der(der).map_err(|_| {
                    PkiError::UnsupportedAlgorithm("EC key on a curve other than P-256".to_string())
                })?;
                Ok(Self::from_p256(signing_key))
            }
            oid => Err(PkiError::UnsupportedAlgorithm(oid.to_string())),
        }
    }

    /// Import a PEM private key, either PKCS#8 `PRIVATE KEY` or PKCS#1 `RSA PRIVATE KEY`.
    pub fn from_pem(pem: &str) -> Result<Self> {
        let parsed = pem::parse(pem.trim())?;
        match parsed.tag() {
            "PRIVATE KEY" => Self::from_pkcs8_der(parsed.contents()),
            "RSA PRIVATE KEY" => Ok(Self::from_rsa(RsaPrivateKey::from_pkcs1_der(
                parsed.contents(),
            )?)),
            tag => Err(PkiError::InvalidKeyType(format!(
                "expected a private key PEM, found '{tag}'"
            ))),
        }
    }

    fn from_rsa(private: RsaPrivateKey) -> Self {
        let public = RsaPublicKey::from(&private);
        KeyPair::Rsa {
            private: Box::new(private),
            public,
        }
    }

    fn from_p256(signing_key: P256SigningKey) -> Self {
        let verifying_key = *signing_key.verifying_key();
        KeyPair::EcdsaP256 {
            signing_key,
            verifying_key,
        }
    }

    /// Sign `data` for X.509 use: PKCS#1 v1.5 with SHA-256, or a DER-encoded ECDSA
    /// SHA-256 signature.
    pub fn sign_data(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            KeyPair::Rsa { private, .. } => Ok(Self::sign_rsa(private, data)),
            KeyPair::EcdsaP256 { signing_key, .. } => {
                let signature: P256Signature = signing_key.sign(data);
                Ok(signature.to_der().as_bytes().to_vec())
            }
        }
    }

    /// Sign `data` for JOSE use: PKCS#1 v1.5 with SHA-256, or the fixed-size `r || s`
    /// ECDSA encoding required by JWA.
    pub fn sign_compact(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            KeyPair::Rsa { private, .. } => Ok(Self::sign_rsa(private, data)),
            KeyPair::EcdsaP256 { signing_key, .. } => {
                let signature: P256Signature = signing_key.sign(data);
                Ok(signature.to_bytes().to_vec())
            }
        }
    }

    fn sign_rsa(private: &RsaPrivateKey, data: &[u8]) -> Vec<u8> {
        let signing_key = RsaSigningKey::<Sha256>::new(private.clone());
        let signature: RsaSignature = signing_key.sign(data);
        signature.to_vec()
    }
}

/// Supported public keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    Rsa(RsaPublicKey),
    EcdsaP256(P256VerifyingKey),
}

impl PublicKey {
    pub fn from_key_pair(key_pair: &KeyPair) -> Self {
        match key_pair {
            KeyPair::Rsa { public, .. } => PublicKey::Rsa(public.clone()),
            KeyPair::EcdsaP256 { verifying_key, .. } => PublicKey::EcdsaP256(*verifying_key),
        }
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        match self {
            PublicKey::Rsa(_) => KeyAlgorithm::Rsa2048,
            PublicKey::EcdsaP256(_) => KeyAlgorithm::EcP256,
        }
    }

    /// Decode a public key from a SubjectPublicKeyInfo.
    pub fn from_x509spki(spki: &SubjectPublicKeyInfoOwned) -> Result<Self> {
        let der = spki.to_der()?;
        Self::from_der(&der)
    }

    /// Decode a DER SubjectPublicKeyInfo.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let spki = spki::SubjectPublicKeyInfoRef::try_from(der)?;
        match spki.algorithm.oid {
            const_oid::db::rfc5912::RSA_ENCRYPTION => {
                Ok(PublicKey::Rsa(RsaPublicKey::from_public_key_der(der)?))
            }
            const_oid::db::rfc5912::ID_EC_PUBLIC_KEY => {
                let curve = spki
                    .algorithm
                    .parameters_oid()
                    .map_err(|e| PkiError::MalformedInput(e.to_string()))?;
                if curve != const_oid::db::rfc5912::SECP_256_R_1 {
                    return Err(PkiError::UnsupportedAlgorithm(format!("EC curve {curve}")));
                }
                Ok(PublicKey::EcdsaP256(P256VerifyingKey::from_public_key_der(der)?))
            }
            oid => Err(PkiError::UnsupportedAlgorithm(oid.to_string())),
        }
    }

    /// Decode a PEM public key, either SPKI `PUBLIC KEY` or PKCS#1 `RSA PUBLIC KEY`.
    pub fn from_pem(pem: &str) -> Result<Self> {
        let parsed = pem::parse(pem.trim())?;
        match parsed.tag() {
            "PUBLIC KEY" => Self::from_der(parsed.contents()),
            "RSA PUBLIC KEY" => Ok(PublicKey::Rsa(RsaPublicKey::from_pkcs1_der(
                parsed.contents(),
            )?)),
            tag => Err(PkiError::InvalidKeyType(format!(
                "expected a public key PEM, found '{tag}'"
            ))),
        }
    }

    pub fn as_spki(&self) -> Result<SubjectPublicKeyInfoOwned> {
        let spki = match self {
            PublicKey::Rsa(public) => SubjectPublicKeyInfoOwned::from_key(public.clone()),
            PublicKey::EcdsaP256(verifying_key) => SubjectPublicKeyInfoOwned::from_key(*verifying_key),
        };
        spki.map_err(|e| PkiError::EncodingError(e.to_string()))
    }

    /// DER SubjectPublicKeyInfo.
    pub fn to_der(&self) -> Result<Vec<u8>> {
        let doc = match self {
            PublicKey::Rsa(public) => public.to_public_key_der(),
            PublicKey::EcdsaP256(verifying_key) => verifying_key.to_public_key_der(),
        }
        .map_err(|e| PkiError::EncodingError(e.to_string()))?;
        Ok(doc.as_bytes().to_vec())
    }

    pub fn to_pem(&self) -> Result<String> {
        match self {
            PublicKey::Rsa(public) => public.to_public_key_pem(LineEnding::LF),
            PublicKey::EcdsaP256(verifying_key) => verifying_key.to_public_key_pem(LineEnding::LF),
        }
        .map_err(|e| PkiError::EncodingError(e.to_string()))
    }

    /// Verify an X.509-style signature (see [`KeyPair::sign_data`]).
    pub fn verify_data(&self, data: &[u8], signature: &[u8]) -> Result<()> {
        match self {
            PublicKey::Rsa(public) => Self::verify_rsa(public, data, signature),
            PublicKey::EcdsaP256(verifying_key) => {
                let signature =
                    P256Signature::from_der(signature).map_err(|_| PkiError::SignatureInvalid)?;
                verifying_key
                    .verify(data, &signature)
                    .map_err(|_| PkiError::SignatureInvalid)
            }
        }
    }

    /// Verify a JOSE-style signature (see [`KeyPair::sign_compact`]).
    pub fn verify_compact(&self, data: &[u8], signature: &[u8]) -> Result<()> {
        match self {
            PublicKey::Rsa(public) => Self::verify_rsa(public, data, signature),
            PublicKey::EcdsaP256(verifying_key) => {
                let signature =
                    P256Signature::from_slice(signature).map_err(|_| PkiError::SignatureInvalid)?;
                verifying_key
                    .verify(data, &signature)
                    .map_err(|_| PkiError::SignatureInvalid)
            }
        }
    }

    fn verify_rsa(public: &RsaPublicKey, data: &[u8], signature: &[u8]) -> Result<()> {
        let verifying_key = RsaVerifyingKey::<Sha256>::new(public.clone());
        let signature =
            RsaSignature::try_from(signature).map_err(|_| PkiError::SignatureInvalid)?;
        verifying_key
            .verify(data, &signature)
            .map_err(|_| PkiError::SignatureInvalid)
    }
}

#[cfg(test)]
mod tests {
    use rand_chacha::ChaCha20Rng;
    use rand_core::SeedableRng;

    use super::*;

    #[test]
    fn test_rsa_jwk_has_required_fields() {
        let pair = generate_key_pair(KeyAlgorithm::Rsa2048, KeyFormat::Jwk).unwrap();
        let public = pair.public_key.as_jwk().unwrap();
        assert_eq!(public.kty, "RSA");
        assert!(public.n.is_some() && public.e.is_some());
        assert!(public.d.is_none() && public.p.is_none() && public.qi.is_none());

        let private = pair.private_key.as_jwk().unwrap();
        for field in [
            &private.n,
            &private.e,
            &private.d,
            &private.p,
            &private.q,
            &private.dp,
            &private.dq,
            &private.qi,
        ] {
            assert!(field.is_some());
        }
    }

    #[test]
    fn test_ec_jwk_has_required_fields() {
        let pair = generate_key_pair_ec(KeyFormat::Jwk).unwrap();
        let public = pair.public_key.as_jwk().unwrap();
        assert_eq!(public.kty, "EC");
        assert_eq!(public.crv.as_deref(), Some("P-256"));
        assert!(public.x.is_some() && public.y.is_some() && public.d.is_none());
        assert!(pair.private_key.as_jwk().unwrap().d.is_some());
    }

    #[test]
    fn test_pem_pair_shares_format() {
        let pair = generate_key_pair_ec(KeyFormat::Pem).unwrap();
        assert!(pair.public_key.as_pem().unwrap().contains("BEGIN PUBLIC KEY"));
        assert!(pair.private_key.as_pem().unwrap().contains("BEGIN PRIVATE KEY"));
    }

    #[test]
    fn test_seeded_rng_is_reproducible() {
        let a = KeyPair::generate_with_rng(KeyAlgorithm::EcP256, &mut ChaCha20Rng::seed_from_u64(7))
            .unwrap();
        let b = KeyPair::generate_with_rng(KeyAlgorithm::EcP256, &mut ChaCha20Rng::seed_from_u64(7))
            .unwrap();
        assert_eq!(a.public_key(), b.public_key());
    }

    #[test]
    fn test_der_and_pem_round_trip() {
        for algorithm in [KeyAlgorithm::Rsa2048, KeyAlgorithm::EcP256] {
            let key = KeyPair::generate(algorithm).unwrap();
            let from_der = KeyPair::from_pkcs8_der(&key.to_pkcs8_der().unwrap()).unwrap();
            let from_pem = KeyPair::from_pem(&key.to_pkcs8_pem().unwrap()).unwrap();
            assert_eq!(from_der.public_key(), key.public_key());
            assert_eq!(from_pem.public_key(), key.public_key());

            let public = key.public_key();
            assert_eq!(PublicKey::from_der(&public.to_der().unwrap()).unwrap(), public);
            assert_eq!(PublicKey::from_pem(&public.to_pem().unwrap()).unwrap(), public);
        }
    }

    #[test]
    fn test_sign_and_verify() {
        for algorithm in [KeyAlgorithm::Rsa2048, KeyAlgorithm::EcP256] {
            let key = KeyPair::generate(algorithm).unwrap();
            let public = key.public_key();
            let der_sig = key.sign_data(b"payload").unwrap();
            let compact_sig = key.sign_compact(b"payload").unwrap();
            assert!(public.verify_data(b"payload", &der_sig).is_ok());
            assert!(public.verify_compact(b"payload", &compact_sig).is_ok());
            assert_eq!(
                public.verify_data(b"tampered", &der_sig),
                Err(PkiError::SignatureInvalid)
            );
        }
    }

    #[test]
    fn test_unknown_algorithm_is_rejected() {
        assert!(matches!(
            "ed448".parse::<KeyAlgorithm>(),
            Err(PkiError::UnsupportedAlgorithm(_))
        ));
        assert_eq!("P-256".parse::<KeyAlgorithm>().unwrap(), KeyAlgorithm::EcP256);
    }
}
