//! PEM, DER and JWK conversions, and certificate thumbprints.

use std::str::FromStr;

use der::{Decode, Encode};
use sha2::{Digest, Sha256};
use x509_cert::Certificate as X509Certificate;

use crate::error::{PkiError, Result};
use crate::key::{Jwk, KeyPair, PublicKey};

/// PEM label used for certificates.
pub const CERTIFICATE_LABEL: &str = "CERTIFICATE";

/// Which half of a key [`pem_to_jwk`] should emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyType {
    #[default]
    Public,
    Private,
}

impl FromStr for KeyType {
    type Err = PkiError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "public" => Ok(KeyType::Public),
            "private" => Ok(KeyType::Private),
            other => Err(PkiError::InvalidKeyType(other.to_string())),
        }
    }
}

/// Convert a PEM key into the equivalent JWK.
///
/// For [`KeyType::Public`] the PEM may hold a public key, a private key (its public half is
/// emitted) or a certificate (its subject key is emitted). [`KeyType::Private`] requires a
/// private key.
pub fn pem_to_jwk(pem: &str, key_type: KeyType) -> Result<Jwk> {
    let parsed = pem::parse(pem.trim())?;
    match (key_type, parsed.tag()) {
        (KeyType::Public, "PUBLIC KEY" | "RSA PUBLIC KEY") => PublicKey::from_pem(pem)?.to_jwk(),
        (KeyType::Public, "PRIVATE KEY" | "RSA PRIVATE KEY") => {
            KeyPair::from_pem(pem)?.public_key().to_jwk()
        }
        (KeyType::Public, CERTIFICATE_LABEL) => {
            let cert = X509Certificate::from_der(parsed.contents())?;
            PublicKey::from_x509spki(&cert.tbs_certificate.subject_public_key_info)?.to_jwk()
        }
        (KeyType::Private, "PRIVATE KEY" | "RSA PRIVATE KEY") => KeyPair::from_pem(pem)?.to_jwk(),
        (_, tag) => Err(PkiError::InvalidKeyType(format!(
            "cannot produce a {key_type:?} JWK from a '{tag}' PEM"
        ))),
    }
}

/// Convert a PEM-encoded string to DER-encoded bytes.
pub fn pem_to_der(pem_str: &str) -> Result<Vec<u8>> {
    let pem = pem::parse(pem_str.trim())?;
    Ok(pem.into_contents())
}

/// Convert a DER-encoded certificate into a PEM-encoded string.
///
/// The DER must parse as an X.509 certificate; the output round-trips through
/// [`pem_to_der`] byte for byte.
pub fn der_to_pem(der: &[u8]) -> Result<String> {
    let cert = X509Certificate::from_der(der)?;
    let canonical = cert
        .to_der()
        .map_err(|e| PkiError::EncodingError(e.to_string()))?;
    Ok(encode_pem(CERTIFICATE_LABEL, canonical))
}

/// Hex SHA-256 thumbprint of a PEM certificate, computed over its DER bytes.
///
/// Matches thumbprints produced by hashing the DER hex text decoded back to bytes, the
/// convention existing stored thumbprints follow.
pub fn thumbprint_from_pem(pem: &str) -> Result<String> {
    let der = pem_to_der(pem)?;
    Ok(hex::encode(Sha256::digest(der)))
}

/// PEM encoding with LF line endings and 64-column wrapping.
pub(crate) fn encode_pem(label: &str, contents: Vec<u8>) -> String {
    let pem = pem::Pem::new(label, contents);
    pem::encode_config(
        &pem,
        pem::EncodeConfig::new().set_line_ending(pem::LineEnding::LF),
    )
}
