//! # pkijose - Keys, JOSE and X.509 in Pure Rust
//!
//! pkijose provides the primitive operations a certificate authority or token-issuing
//! service composes: key generation and conversion, JSON Web Keys, JSON Web Tokens and
//! Signatures, PKCS#10 certification requests, certificate issuance and certificate chain
//! validation. It is built on the RustCrypto crates, with no dependency on OpenSSL or ring
//! (except for tests).
//!
//! ## Supported Key Types
//!
//! - **RSA**: 2048-bit keys generated, RS256 / sha256WithRSAEncryption signatures
//! - **ECDSA**: P-256 curve, ES256 / ecdsa-with-SHA256 signatures
//!
//! Keys convert losslessly between JWK, PEM (PKCS#8 / SPKI) and DER.
//!
//! ## Quick Start
//!
//! ### Requesting and Issuing a Certificate
//!
//! ```rust,no_run
//! use pkijose::{
//!     cert::{Certificate, CertificateWithPrivateKey, params::{CertificationRequestInfo, DistinguishedName, Validity}},
//!     csr::{generate_csr, verify_csr},
//!     issuer::{ExtensionPolicy, ca_profile_extensions, issue_certificate_from_csr},
//!     key::{KeyAlgorithm, KeyPair},
//! };
//!
//! # fn main() -> Result<(), pkijose::error::PkiError> {
//! // A self-signed authority
//! let ca_key = KeyPair::generate(KeyAlgorithm::EcP256)?;
//! let ca_info = CertificationRequestInfo::builder()
//!     .subject(DistinguishedName::from_pairs([("CN", "Example CA")])?.as_x509_name()?)
//!     .subject_public_key_info(ca_key.as_spki()?)
//!     .extensions(ca_profile_extensions("Example CA")?)
//!     .build();
//! let ca_validity = Validity::for_days(3650)?;
//! let ca_cert = Certificate::new_self_signed(&ca_info, &ca_key, &[1], ca_validity)?;
//! let authority = CertificateWithPrivateKey { cert: ca_cert, key: ca_key };
//!
//! // A request from the subject, checked before issuance
//! let key = KeyPair::generate(KeyAlgorithm::Rsa2048)?;
//! let subject = DistinguishedName::from_pairs([("CN", "device.example.com"), ("O", "Example")])?;
//! let csr = generate_csr(&key, &subject.attributes, &[])?;
//! assert!(verify_csr(&csr)?);
//!
//! let cert_pem = issue_certificate_from_csr(
//!     &csr,
//!     &authority,
//!     &[0x01, 0x02],
//!     Validity::for_days(365)?,
//!     ExtensionPolicy::CaProfile,
//! )?;
//! println!("{cert_pem}");
//! # Ok(())
//! # }
//! ```
//!
//! ### Signing and Verifying a JWT
//!
//! ```rust
//! use pkijose::jose::{JwtClaims, generate_jwt, verify_jwt};
//! use pkijose::key::{KeyAlgorithm, KeyPair};
//!
//! # fn main() -> Result<(), pkijose::error::PkiError> {
//! let key = KeyPair::generate(KeyAlgorithm::EcP256)?;
//! let claims = JwtClaims::builder()
//!     .sub("device-1")
//!     .iss("issuer")
//!     .aud("api")
//!     .exp("1h")
//!     .build();
//! let jwt = generate_jwt(&key.to_jwk()?, &claims)?;
//! let verified = verify_jwt(&key.public_key().to_jwk()?, &jwt)?;
//! assert_eq!(verified.payload.sub.as_deref(), Some("device-1"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Every failure is a distinct [`error::PkiError`] kind:
//!
//! ```rust
//! use pkijose::{convert::{KeyType, pem_to_jwk}, error::PkiError};
//!
//! match pem_to_jwk("invalid pem data", KeyType::Public) {
//!     Ok(jwk) => println!("Converted: {jwk:?}"),
//!     Err(PkiError::MalformedInput(msg)) => println!("Failed to parse: {msg}"),
//!     Err(e) => println!("Other error: {e}"),
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`key`]: Key generation, JWK/PEM/DER import and export, signing primitives
//! - [`convert`]: PEM, DER and JWK conversions, certificate thumbprints
//! - [`jose`]: JWT and JWS signing and verification, remote key sets
//! - [`csr`]: Certification request construction and verification
//! - [`cert`]: Certificates, subject names and X.509 extensions
//! - [`issuer`]: Certificate issuance from requests
//! - [`chain`]: PEM chain handling and path validation
//! - [`error`]: Error kinds
//! - [`tbs_certificate`]: Low-level certificate structure manipulation

pub mod cert;
pub mod chain;
pub mod convert;
pub mod csr;
pub mod error;
pub mod issuer;
pub mod jose;
pub mod key;
pub mod tbs_certificate;
