//! use pkijose::error::PkiError;

use thiserror::Error;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, PkiError>;

/// Represents errors that can occur in the pkijose library.
///
/// Every failure kind is distinct so callers can react differently, e.g. refresh a token
/// on [`PkiError::TokenExpired`] but hard-fail on [`PkiError::SignatureInvalid`].
/// Nothing in this crate retries: cryptographic failures are not transient.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PkiError {
    /// The requested key or signature algorithm is not supported.
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Unparsable PEM, DER, JWK or token input.
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Unrecognized key type, or a key of the wrong kind for the operation.
    #[error("Invalid key type: {0}")]
    InvalidKeyType(String),

    /// A CSR, certificate, JWS or JWT signature did not validate.
    #[error("Signature is invalid")]
    SignatureInvalid,

    /// The token `exp` claim is in the past.
    #[error("Token is expired")]
    TokenExpired,

    /// A registered claim did not match the expected value.
    #[error("Claim '{0}' does not match the expected value")]
    ClaimMismatch(&'static str),

    /// No usable verification key could be resolved from a JWS header.
    #[error("Key resolution failed: {0}")]
    KeyResolutionFailed(String),

    /// The remote key set could not be fetched. Transport failure, not a crypto failure.
    #[error("Failed to fetch key set: {0}")]
    KeyFetch(String),

    /// A requested subject field is absent.
    #[error("Field '{0}' not found")]
    FieldNotFound(String),

    /// A chain position past the end of the chain was requested.
    #[error("Index {index} out of range for chain of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// A link of a certificate chain failed validation.
    #[error("Chain broken at certificate {index}: {reason}")]
    ChainBroken { index: usize, reason: String },

    /// The requested JWS serialization is not supported.
    #[error("Unsupported serialization: {0}")]
    UnsupportedSerialization(String),

    /// Error during data encoding.
    #[error("Failed to encode data: {0}")]
    EncodingError(String),

    /// Error during key generation.
    #[error("Key generation error: {0}")]
    KeyGenerationError(String),
}

impl From<der::Error> for PkiError {
    /// Converts a `der::Error` into a `PkiError`.
    fn from(err: der::Error) -> Self {
        PkiError::MalformedInput(err.to_string())
    }
}

impl From<pem::PemError> for PkiError {
    fn from(err: pem::PemError) -> Self {
        PkiError::MalformedInput(err.to_string())
    }
}

impl From<pkcs8::Error> for PkiError {
    fn from(err: pkcs8::Error) -> Self {
        PkiError::MalformedInput(err.to_string())
    }
}

impl From<spki::Error> for PkiError {
    fn from(err: spki::Error) -> Self {
        PkiError::MalformedInput(err.to_string())
    }
}

impl From<rsa::Error> for PkiError {
    fn from(err: rsa::Error) -> Self {
        PkiError::MalformedInput(err.to_string())
    }
}

impl From<rsa::pkcs1::Error> for PkiError {
    fn from(err: rsa::pkcs1::Error) -> Self {
        PkiError::MalformedInput(err.to_string())
    }
}

impl From<serde_json::Error> for PkiError {
    fn from(err: serde_json::Error) -> Self {
        PkiError::MalformedInput(err.to_string())
    }
}

impl From<base64::DecodeError> for PkiError {
    fn from(err: base64::DecodeError) -> Self {
        PkiError::MalformedInput(err.to_string())
    }
}
