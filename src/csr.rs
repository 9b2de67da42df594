//! PKCS#10 certification requests: construction, proof-of-possession checks and field
//! extraction.

use const_oid::AssociatedOid;
use der::asn1::{Any, BitString, SetOfVec};
use der::{Decode, Encode, Tag, Tagged};
use tracing::{debug, warn};
use x509_cert::attr::Attribute;
use x509_cert::name::Name;
use x509_cert::request::{CertReq, CertReqInfo, ExtensionReq, Version};
use x509_cert::spki::SubjectPublicKeyInfoOwned;

use crate::cert::SignatureAlgorithm;
use crate::cert::params::{DistinguishedName, ExtensionParam, SubjectAttribute};
use crate::convert::encode_pem;
use crate::error::{PkiError, Result};
use crate::key::{KeyPair, PublicKey};

/// PEM label of a certification request.
pub const CSR_LABEL: &str = "CERTIFICATE REQUEST";

/// PKCS#9 challengePassword.
pub const CHALLENGE_PASSWORD: der::oid::ObjectIdentifier =
    der::oid::ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.7");

/// Attributes a request may carry alongside its subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CsrAttribute {
    /// Extensions the requester asks to have placed in the certificate.
    ExtensionRequest(Vec<ExtensionParam>),
    ChallengePassword(String),
}

impl CsrAttribute {
    fn to_x509(&self) -> Result<Attribute> {
        let (oid, value) = match self {
            CsrAttribute::ExtensionRequest(extensions) => {
                let request = ExtensionReq(
                    extensions
                        .iter()
                        .map(ExtensionParam::to_x509)
                        .collect::<Result<Vec<_>>>()?,
                );
                (ExtensionReq::OID, Any::encode_from(&request)?)
            }
            CsrAttribute::ChallengePassword(password) => (
                CHALLENGE_PASSWORD,
                Any::new(Tag::Utf8String, password.as_bytes())?,
            ),
        };
        Ok(Attribute {
            oid,
            values: SetOfVec::try_from(vec![value])?,
        })
    }
}

/// Builds a PEM certification request for `key_pair`, self-signed with its private key.
///
/// `subject` order is kept as the RDN sequence order. The public key is embedded as a
/// SubjectPublicKeyInfo for RSA and EC keys alike.
pub fn generate_csr(
    key_pair: &KeyPair,
    subject: &[SubjectAttribute],
    attributes: &[CsrAttribute],
) -> Result<String> {
    let info = CertReqInfo {
        version: Version::V1,
        subject: DistinguishedName::new(subject.to_vec()).as_x509_name()?,
        public_key: key_pair.as_spki()?,
        attributes: SetOfVec::try_from(
            attributes
                .iter()
                .map(CsrAttribute::to_x509)
                .collect::<Result<Vec<_>>>()?,
        )?,
    };
    let info_der = info
        .to_der()
        .map_err(|e| PkiError::EncodingError(e.to_string()))?;
    let signature = key_pair.sign_data(&info_der)?;

    let request = CertificationRequest {
        inner: CertReq {
            info,
            algorithm: SignatureAlgorithm::for_key(key_pair).into(),
            signature: BitString::from_bytes(&signature)?,
        },
    };
    debug!(algorithm = %key_pair.algorithm(), "generated certification request");
    request.to_pem()
}

/// Checks the self-signature of a PEM request against its embedded public key.
///
/// Returns `Ok(false)` for a well-formed request whose signature does not verify and an
/// error only when the input cannot be parsed. Subject and extensions are not inspected.
pub fn verify_csr(csr_pem: &str) -> Result<bool> {
    let request = CertificationRequest::from_pem(csr_pem)?;
    match request.verify() {
        Ok(()) => Ok(true),
        Err(PkiError::SignatureInvalid) => {
            warn!("certification request signature did not verify");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

/// The request subject's common name; `FieldNotFound` when absent.
pub fn get_common_name_from_csr(csr_pem: &str) -> Result<String> {
    CertificationRequest::from_pem(csr_pem)?.common_name()
}

/// A parsed PKCS#10 request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificationRequest {
    pub inner: CertReq,
}

impl CertificationRequest {
    pub fn from_der(der: &[u8]) -> Result<Self> {
        Ok(Self {
            inner: CertReq::from_der(der)?,
        })
    }

    /// Accepts both the `CERTIFICATE REQUEST` and legacy `NEW CERTIFICATE REQUEST` labels.
    pub fn from_pem(pem: &str) -> Result<Self> {
        let parsed = pem::parse(pem.trim())?;
        match parsed.tag() {
            CSR_LABEL | "NEW CERTIFICATE REQUEST" => Self::from_der(parsed.contents()),
            tag => Err(PkiError::MalformedInput(format!(
                "expected a {CSR_LABEL} PEM, found '{tag}'"
            ))),
        }
    }

    pub fn to_der(&self) -> Result<Vec<u8>> {
        self.inner
            .to_der()
            .map_err(|e| PkiError::EncodingError(e.to_string()))
    }

    pub fn to_pem(&self) -> Result<String> {
        Ok(encode_pem(CSR_LABEL, self.to_der()?))
    }

    pub fn subject(&self) -> &Name {
        &self.inner.info.subject
    }

    pub fn subject_name(&self) -> Result<DistinguishedName> {
        DistinguishedName::from_x509_name(self.subject())
    }

    pub fn common_name(&self) -> Result<String> {
        self.subject_name()?
            .common_name()
            .map(str::to_string)
            .ok_or_else(|| PkiError::FieldNotFound("commonName".to_string()))
    }

    pub fn subject_public_key_info(&self) -> &SubjectPublicKeyInfoOwned {
        &self.inner.info.public_key
    }

    pub fn public_key(&self) -> Result<PublicKey> {
        PublicKey::from_x509spki(self.subject_public_key_info())
    }

    fn attribute_values(
        &self,
        oid: der::oid::ObjectIdentifier,
    ) -> impl Iterator<Item = &Any> + '_ {
        self.inner
            .info
            .attributes
            .iter()
            .filter(move |attr| attr.oid == oid)
            .flat_map(|attr| attr.values.iter())
    }

    /// Extensions carried in the `extensionRequest` attribute, in request order.
    pub fn extension_request(&self) -> Result<Vec<ExtensionParam>> {
        let mut extensions = Vec::new();
        for value in self.attribute_values(ExtensionReq::OID) {
            let request = ExtensionReq::from_der(&value.to_der()?)?;
            extensions.extend(request.0.iter().map(ExtensionParam::from_x509));
        }
        Ok(extensions)
    }

    pub fn challenge_password(&self) -> Result<Option<String>> {
        self.attribute_values(CHALLENGE_PASSWORD)
            .next()
            .map(|value| match value.tag() {
                Tag::Utf8String | Tag::PrintableString | Tag::Ia5String => {
                    std::str::from_utf8(value.value())
                        .map(str::to_string)
                        .map_err(|e| PkiError::MalformedInput(e.to_string()))
                }
                tag => Err(PkiError::MalformedInput(format!(
                    "unsupported challengePassword type {tag}"
                ))),
            })
            .transpose()
    }

    /// Proof of possession: the request must be signed by the key it carries.
    pub fn verify(&self) -> Result<()> {
        let public_key = self.public_key()?;
        let algorithm = SignatureAlgorithm::from_oid(&self.inner.algorithm.oid)?;
        let expected = match public_key {
            PublicKey::Rsa(_) => SignatureAlgorithm::Sha256WithRSA,
            PublicKey::EcdsaP256(_) => SignatureAlgorithm::Sha256WithECDSA,
        };
        if algorithm != expected {
            return Err(PkiError::SignatureInvalid);
        }
        let info_der = self
            .inner
            .info
            .to_der()
            .map_err(|e| PkiError::EncodingError(e.to_string()))?;
        let signature = self
            .inner
            .signature
            .as_bytes()
            .ok_or(PkiError::SignatureInvalid)?;
        public_key.verify_data(&info_der, signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::extensions::{
        AltName, BasicConstraints, ExtendedKeyUsage, ExtendedKeyUsageOption, KeyUsage, KeyUsages,
        SubjectAltName,
    };
    use crate::key::KeyAlgorithm;

    fn subject() -> Vec<SubjectAttribute> {
        vec![
            SubjectAttribute::new("commonName", "test.domain.com").unwrap(),
            SubjectAttribute::new("countryName", "US").unwrap(),
            SubjectAttribute::new("ST", "Virginia").unwrap(),
            SubjectAttribute::new("localityName", "Blacksburg").unwrap(),
            SubjectAttribute::new("organizationName", "Test").unwrap(),
            SubjectAttribute::new("OU", "Test").unwrap(),
        ]
    }

    fn extensions() -> Vec<ExtensionParam> {
        vec![
            ExtensionParam::from_extension(
                BasicConstraints {
                    is_ca: true,
                    max_path_length: None,
                },
                true,
            )
            .unwrap(),
            ExtensionParam::from_extension(
                KeyUsage(KeyUsages::KeyCertSign | KeyUsages::DigitalSignature),
                true,
            )
            .unwrap(),
            ExtensionParam::from_extension(
                ExtendedKeyUsage {
                    usage: vec![
                        ExtendedKeyUsageOption::ServerAuth,
                        ExtendedKeyUsageOption::ClientAuth,
                    ],
                },
                false,
            )
            .unwrap(),
            ExtensionParam::from_extension(
                SubjectAltName {
                    names: vec![AltName::from_type(2, "test.domain.com").unwrap()],
                },
                false,
            )
            .unwrap(),
        ]
    }

    #[test]
    fn test_generated_csr_verifies() {
        for algorithm in [KeyAlgorithm::Rsa2048, KeyAlgorithm::EcP256] {
            let key = KeyPair::generate(algorithm).unwrap();
            let pem = generate_csr(
                &key,
                &subject(),
                &[CsrAttribute::ExtensionRequest(extensions())],
            )
            .unwrap();
            assert!(pem.starts_with("-----BEGIN CERTIFICATE REQUEST-----"));
            assert!(verify_csr(&pem).unwrap());

            let request = CertificationRequest::from_pem(&pem).unwrap();
            assert_eq!(request.public_key().unwrap(), key.public_key());
            assert_eq!(request.subject_name().unwrap().attributes, subject());
            assert_eq!(request.extension_request().unwrap(), extensions());
        }
    }

    #[test]
    fn test_common_name_extraction() {
        let key = KeyPair::generate(KeyAlgorithm::EcP256).unwrap();
        let pem = generate_csr(&key, &subject(), &[]).unwrap();
        assert_eq!(get_common_name_from_csr(&pem).unwrap(), "test.domain.com");

        let without_cn = generate_csr(&key, &subject()[1..], &[]).unwrap();
        assert_eq!(
            get_common_name_from_csr(&without_cn),
            Err(PkiError::FieldNotFound("commonName".to_string()))
        );
    }

    #[test]
    fn test_challenge_password_attribute() {
        let key = KeyPair::generate(KeyAlgorithm::EcP256).unwrap();
        let pem = generate_csr(
            &key,
            &subject(),
            &[
                CsrAttribute::ChallengePassword("s3cret".to_string()),
                CsrAttribute::ExtensionRequest(extensions()),
            ],
        )
        .unwrap();
        let request = CertificationRequest::from_pem(&pem).unwrap();
        assert_eq!(request.challenge_password().unwrap().as_deref(), Some("s3cret"));
        assert_eq!(request.extension_request().unwrap(), extensions());
        assert!(verify_csr(&pem).unwrap());
    }

    #[test]
    fn test_tampered_csr_fails_verification() {
        let key = KeyPair::generate(KeyAlgorithm::EcP256).unwrap();
        let pem = generate_csr(&key, &subject(), &[]).unwrap();
        let mut request = CertificationRequest::from_pem(&pem).unwrap();
        request.inner.info.subject = DistinguishedName::from_pairs([("CN", "evil.example.com")])
            .unwrap()
            .as_x509_name()
            .unwrap();
        assert!(!verify_csr(&request.to_pem().unwrap()).unwrap());
    }

    #[test]
    fn test_non_csr_pem_is_malformed() {
        let key = KeyPair::generate(KeyAlgorithm::EcP256).unwrap();
        assert!(matches!(
            verify_csr(&key.to_pkcs8_pem().unwrap()),
            Err(PkiError::MalformedInput(_))
        ));
    }
}
