use std::fmt;
use std::str::FromStr;

use crate::error::{PkiError, Result};
use crate::key::KeyAlgorithm;

/// Narrows the supported signature algorithms to the ones the key types allow
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum JwsAlgorithm {
    /// RSASSA-PKCS1-v1_5 using SHA-256
    ///
    /// Specified in [RFC 7518 Section 3.3][1]
    ///
    /// [1]: https://tools.ietf.org/html/rfc7518#section-3.3
    RS256,
    /// ECDSA using P-256 and SHA-256
    ///
    /// Specified in [RFC 7518 Section 3.4: Digital Signature with ECDSA][1]
    ///
    /// [1]: https://tools.ietf.org/html/rfc7518#section-3.4
    ES256,
}

impl JwsAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            JwsAlgorithm::RS256 => "RS256",
            JwsAlgorithm::ES256 => "ES256",
        }
    }

    /// The algorithm bound to a key type.
    pub fn for_key(algorithm: KeyAlgorithm) -> Self {
        match algorithm {
            KeyAlgorithm::Rsa2048 => JwsAlgorithm::RS256,
            KeyAlgorithm::EcP256 => JwsAlgorithm::ES256,
        }
    }

    pub fn key_algorithm(&self) -> KeyAlgorithm {
        match self {
            JwsAlgorithm::RS256 => KeyAlgorithm::Rsa2048,
            JwsAlgorithm::ES256 => KeyAlgorithm::EcP256,
        }
    }
}

impl fmt::Display for JwsAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JwsAlgorithm {
    type Err = PkiError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "RS256" => Ok(JwsAlgorithm::RS256),
            "ES256" => Ok(JwsAlgorithm::ES256),
            other => Err(PkiError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}
