pub mod extensions;
pub mod params;

use der::asn1::{Any, BitString};
use der::{Decode, Encode};
use extensions::BasicConstraints;
use params::{CertificationRequestInfo, DistinguishedName, ExtensionParam, Validity};
use x509_cert::certificate::CertificateInner;
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;

use crate::convert::{CERTIFICATE_LABEL, encode_pem};
use crate::error::{PkiError, Result};
use crate::issuer::Issuer;
use crate::key::{KeyPair, PublicKey};

/// Represents the supported signature algorithms for certificates and requests.
///
/// This enum provides a mapping to the corresponding OIDs for each algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    /// SHA-256 with RSA encryption.
    Sha256WithRSA,
    /// SHA-256 with ECDSA.
    Sha256WithECDSA,
}

impl SignatureAlgorithm {
    /// The algorithm a key pair signs X.509 structures with.
    pub fn for_key(key: &KeyPair) -> Self {
        match key {
            KeyPair::Rsa { .. } => SignatureAlgorithm::Sha256WithRSA,
            KeyPair::EcdsaP256 { .. } => SignatureAlgorithm::Sha256WithECDSA,
        }
    }

    pub fn from_oid(oid: &der::oid::ObjectIdentifier) -> Result<Self> {
        match *oid {
            const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION => {
                Ok(SignatureAlgorithm::Sha256WithRSA)
            }
            const_oid::db::rfc5912::ECDSA_WITH_SHA_256 => Ok(SignatureAlgorithm::Sha256WithECDSA),
            other => Err(PkiError::UnsupportedAlgorithm(format!(
                "signature algorithm {other}"
            ))),
        }
    }
}

impl From<SignatureAlgorithm> for x509_cert::spki::AlgorithmIdentifierOwned {
    /// Converts a `SignatureAlgorithm` into an `AlgorithmIdentifierOwned`.
    ///
    /// RSA identifiers carry explicit NULL parameters, ECDSA identifiers none (RFC 4055,
    /// RFC 5758).
    fn from(value: SignatureAlgorithm) -> Self {
        match value {
            SignatureAlgorithm::Sha256WithRSA => x509_cert::spki::AlgorithmIdentifierOwned {
                oid: const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION,
                parameters: Some(Any::null()),
            },
            SignatureAlgorithm::Sha256WithECDSA => x509_cert::spki::AlgorithmIdentifierOwned {
                oid: const_oid::db::rfc5912::ECDSA_WITH_SHA_256,
                parameters: None,
            },
        }
    }
}

/// Normalizes big-endian serial bytes into a positive INTEGER.
///
/// Leading zero bytes are dropped and a single zero is prepended when the top bit is
/// set, so `[0x80]` encodes as `00 80` rather than a negative number.
pub fn serial_number_from_bytes(bytes: &[u8]) -> Result<SerialNumber> {
    let trimmed: Vec<u8> = bytes.iter().copied().skip_while(|b| *b == 0).collect();
    let normalized = match trimmed.first() {
        None => vec![0],
        Some(first) if first & 0x80 != 0 => [&[0u8][..], &trimmed].concat(),
        Some(_) => trimmed,
    };
    SerialNumber::new(&normalized).map_err(|e| PkiError::MalformedInput(e.to_string()))
}

/// Represents an X.509 certificate.
///
/// This struct provides methods to encode the certificate into DER or PEM formats and to
/// read back the fields chain validation and issuance need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    /// The inner representation of the certificate.
    pub inner: CertificateInner,
}

impl Certificate {
    pub fn from_der(der: &[u8]) -> Result<Self> {
        Ok(Self {
            inner: CertificateInner::from_der(der)?,
        })
    }

    /// Parses a single `CERTIFICATE` PEM block.
    pub fn from_pem(pem: &str) -> Result<Self> {
        let parsed = pem::parse(pem.trim())?;
        if parsed.tag() != CERTIFICATE_LABEL {
            return Err(PkiError::MalformedInput(format!(
                "expected a CERTIFICATE PEM, found '{}'",
                parsed.tag()
            )));
        }
        Self::from_der(parsed.contents())
    }

    /// Encodes the certificate into DER format.
    ///
    /// # Returns
    /// A byte vector containing the DER-encoded certificate.
    pub fn to_der(&self) -> Result<Vec<u8>> {
        self.inner
            .to_der()
            .map_err(|e| PkiError::EncodingError(e.to_string()))
    }

    /// Encodes the certificate into PEM format.
    ///
    /// # Returns
    /// A string containing the PEM-encoded certificate.
    pub fn to_pem(&self) -> Result<String> {
        Ok(encode_pem(CERTIFICATE_LABEL, self.to_der()?))
    }

    pub fn subject(&self) -> &Name {
        &self.inner.tbs_certificate.subject
    }

    pub fn issuer(&self) -> &Name {
        &self.inner.tbs_certificate.issuer
    }

    /// Decoded subject attributes, in RDN order.
    pub fn subject_name(&self) -> Result<DistinguishedName> {
        DistinguishedName::from_x509_name(self.subject())
    }

    /// Serial number as lowercase hex of its encoded bytes.
    pub fn serial_hex(&self) -> String {
        hex::encode(self.inner.tbs_certificate.serial_number.as_bytes())
    }

    pub fn validity(&self) -> Result<Validity> {
        Validity::from_x509_validity(&self.inner.tbs_certificate.validity)
    }

    pub fn public_key(&self) -> Result<PublicKey> {
        PublicKey::from_x509spki(&self.inner.tbs_certificate.subject_public_key_info)
    }

    pub fn extensions(&self) -> Vec<ExtensionParam> {
        self.inner
            .tbs_certificate
            .extensions
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(ExtensionParam::from_x509)
            .collect()
    }

    /// Decodes the first extension of type `E`, if the certificate carries one.
    pub fn extension<E: extensions::ToAndFromX509Extension>(&self) -> Result<Option<E>> {
        params::find_extension(&self.extensions())
    }

    /// Whether basicConstraints marks this certificate as a CA.
    pub fn is_ca(&self) -> Result<bool> {
        Ok(self
            .extension::<BasicConstraints>()?
            .is_some_and(|bc| bc.is_ca))
    }

    /// Checks that `issuer_key` produced this certificate's signature over its TBS bytes.
    pub fn verify_signed_by(&self, issuer_key: &PublicKey) -> Result<()> {
        let algorithm = SignatureAlgorithm::from_oid(&self.inner.signature_algorithm.oid)?;
        let expected = match issuer_key {
            PublicKey::Rsa(_) => SignatureAlgorithm::Sha256WithRSA,
            PublicKey::EcdsaP256(_) => SignatureAlgorithm::Sha256WithECDSA,
        };
        if algorithm != expected {
            return Err(PkiError::SignatureInvalid);
        }
        let tbs = self
            .inner
            .tbs_certificate
            .to_der()
            .map_err(|e| PkiError::EncodingError(e.to_string()))?;
        let signature = self
            .inner
            .signature
            .as_bytes()
            .ok_or(PkiError::SignatureInvalid)?;
        issuer_key.verify_data(&tbs, signature)
    }

    /// Creates a new self-signed certificate, e.g. a trust anchor.
    ///
    /// # Arguments
    /// * `cert_info` - The subject, key and extensions of the certificate.
    /// * `key` - The key pair used to sign the certificate; its public half should be the
    ///   one in `cert_info`.
    /// * `serial_number` - Big-endian serial bytes.
    /// * `validity` - The validity window.
    pub fn new_self_signed(
        cert_info: &CertificationRequestInfo,
        key: &KeyPair,
        serial_number: &[u8],
        validity: Validity,
    ) -> Result<Self> {
        let self_issuer = SelfIssuer {
            name: cert_info.subject.clone(),
            key,
        };
        self_issuer.issue(cert_info, serial_number, validity)
    }

    /// Assembles the certificate from TBS bytes signed by `key`.
    pub(crate) fn sign(
        tbs_certificate: x509_cert::certificate::TbsCertificateInner,
        key: &KeyPair,
    ) -> Result<Self> {
        let tbs_der = tbs_certificate
            .to_der()
            .map_err(|e| PkiError::EncodingError(e.to_string()))?;
        let signature = key.sign_data(&tbs_der)?;
        Ok(Self {
            inner: CertificateInner {
                signature_algorithm: tbs_certificate.signature.clone(),
                tbs_certificate,
                signature: BitString::from_bytes(&signature)?,
            },
        })
    }
}

struct SelfIssuer<'a> {
    name: Name,
    key: &'a KeyPair,
}

impl Issuer for SelfIssuer<'_> {
    fn issuer_name(&self) -> Result<Name> {
        Ok(self.name.clone())
    }

    fn signing_key(&self) -> &KeyPair {
        self.key
    }
}

/// An issuing authority: its certificate and the matching private key.
#[derive(Debug, Clone)]
pub struct CertificateWithPrivateKey {
    pub cert: Certificate,
    pub key: KeyPair,
}

impl CertificateWithPrivateKey {
    /// Loads an authority from a certificate PEM and a PKCS#8 or PKCS#1 private key PEM.
    ///
    /// Fails with `InvalidKeyType` when the key does not belong to the certificate.
    pub fn from_pem(cert_pem: &str, key_pem: &str) -> Result<Self> {
        let cert = Certificate::from_pem(cert_pem)?;
        let key = KeyPair::from_pem(key_pem)?;
        if cert.public_key()? != key.public_key() {
            return Err(PkiError::InvalidKeyType(
                "private key does not match the certificate".to_string(),
            ));
        }
        Ok(Self { cert, key })
    }
}

impl Issuer for CertificateWithPrivateKey {
    fn issuer_name(&self) -> Result<Name> {
        // The name of the issuer is the subject of the certificate
        Ok(self.cert.subject().clone())
    }

    fn signing_key(&self) -> &KeyPair {
        &self.key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyAlgorithm;

    fn self_signed(algorithm: KeyAlgorithm) -> (Certificate, KeyPair) {
        let key = KeyPair::generate(algorithm).unwrap();
        let info = CertificationRequestInfo::builder()
            .subject(
                DistinguishedName::from_pairs([("CN", "Test Root"), ("O", "Test")])
                    .unwrap()
                    .as_x509_name()
                    .unwrap(),
            )
            .subject_public_key_info(key.as_spki().unwrap())
            .extensions(vec![
                ExtensionParam::from_extension(
                    BasicConstraints {
                        is_ca: true,
                        max_path_length: None,
                    },
                    true,
                )
                .unwrap(),
            ])
            .build();
        let validity = Validity::for_days(30).unwrap();
        let cert = Certificate::new_self_signed(&info, &key, &[0x2a], validity).unwrap();
        (cert, key)
    }

    #[test]
    fn test_serial_number_normalization() {
        let der = |bytes: &[u8]| serial_number_from_bytes(bytes).unwrap().to_der().unwrap();
        assert_eq!(der(&[0x00, 0x01]), [0x02, 0x01, 0x01]);
        assert_eq!(der(&[0x80]), [0x02, 0x02, 0x00, 0x80]);
        assert_eq!(der(&[]), [0x02, 0x01, 0x00]);
    }

    #[test]
    fn test_rsa_signature_algorithm_has_null_parameters() {
        let id: x509_cert::spki::AlgorithmIdentifierOwned = SignatureAlgorithm::Sha256WithRSA.into();
        assert_eq!(id.parameters, Some(Any::null()));
        let id: x509_cert::spki::AlgorithmIdentifierOwned =
            SignatureAlgorithm::Sha256WithECDSA.into();
        assert!(id.parameters.is_none());
    }

    #[test]
    fn test_self_signed_verifies_with_own_key() {
        for algorithm in [KeyAlgorithm::EcP256, KeyAlgorithm::Rsa2048] {
            let (cert, key) = self_signed(algorithm);
            cert.verify_signed_by(&key.public_key()).unwrap();
            assert_eq!(cert.subject(), cert.issuer());
            assert!(cert.is_ca().unwrap());
            assert_eq!(cert.serial_hex(), "2a");
            assert_eq!(
                cert.inner.signature_algorithm,
                cert.inner.tbs_certificate.signature
            );
        }
    }

    #[test]
    fn test_pem_round_trip_and_key_mismatch() {
        let (cert, key) = self_signed(KeyAlgorithm::EcP256);
        let pem = cert.to_pem().unwrap();
        assert_eq!(Certificate::from_pem(&pem).unwrap(), cert);

        let loaded = CertificateWithPrivateKey::from_pem(&pem, &key.to_pkcs8_pem().unwrap()).unwrap();
        assert_eq!(loaded.issuer_name().unwrap(), *cert.subject());

        let other = KeyPair::generate(KeyAlgorithm::EcP256).unwrap();
        assert!(matches!(
            CertificateWithPrivateKey::from_pem(&pem, &other.to_pkcs8_pem().unwrap()),
            Err(PkiError::InvalidKeyType(_))
        ));
    }

    #[test]
    fn test_signature_from_other_key_is_rejected() {
        let (cert, _) = self_signed(KeyAlgorithm::EcP256);
        let other = KeyPair::generate(KeyAlgorithm::EcP256).unwrap();
        assert_eq!(
            cert.verify_signed_by(&other.public_key()),
            Err(PkiError::SignatureInvalid)
        );
    }
}
