use std::str::FromStr;

use tracing::debug;
use x509_cert::name::Name;

use crate::cert::Certificate;
use crate::cert::SignatureAlgorithm;
use crate::cert::extensions::{
    BasicConstraints, ExtendedKeyUsage, ExtendedKeyUsageOption, KeyUsage, KeyUsages,
    SubjectAltName,
};
use crate::cert::params::{CertificationRequestInfo, ExtensionParam, Validity};
use crate::cert::serial_number_from_bytes;
use crate::csr::CertificationRequest;
use crate::error::{PkiError, Result};
use crate::key::KeyPair;
use crate::tbs_certificate::TbsCertificate;

/// Represents an entity capable of issuing certificates.
///
/// This trait provides methods to retrieve issuer details and issue certificates.
pub trait Issuer {
    /// Returns the distinguished name of the issuer, placed verbatim in issued certificates.
    fn issuer_name(&self) -> Result<Name>;

    /// Returns the signing key of the issuer.
    fn signing_key(&self) -> &KeyPair;

    /// Issues a certificate based on the provided certification request information.
    ///
    /// # Arguments
    /// * `cert_request` - Subject, public key and the final extension set.
    /// * `serial_number` - Big-endian serial bytes; uniqueness is the caller's concern.
    /// * `validity` - The validity window.
    ///
    /// # Returns
    /// A `Certificate` signed with SHA-256 by the issuer's key.
    fn issue(
        &self,
        cert_request: &CertificationRequestInfo,
        serial_number: &[u8],
        validity: Validity,
    ) -> Result<Certificate> {
        let signing_key = self.signing_key();

        let tbs_cert = TbsCertificate {
            serial_number: serial_number_from_bytes(serial_number)?,
            signature_algorithm: SignatureAlgorithm::for_key(signing_key),
            issuer: self.issuer_name()?,
            validity,
            subject: cert_request.subject.clone(),
            subject_public_key_info: cert_request.subject_public_key_info.clone(),
            extensions: cert_request.extensions.clone(),
        };

        let cert = Certificate::sign(tbs_cert.to_tbs_certificate_inner()?, signing_key)?;
        debug!(
            serial = %cert.serial_hex(),
            extensions = tbs_cert.extensions.len(),
            "issued certificate"
        );
        Ok(cert)
    }
}

/// Where an issued certificate's extensions come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExtensionPolicy {
    /// Copy the request's `extensionRequest` attribute verbatim.
    #[default]
    CopyFromRequest,
    /// Ignore requested extensions and install the fixed CA profile, see
    /// [`ca_profile_extensions`].
    CaProfile,
}

impl FromStr for ExtensionPolicy {
    type Err = PkiError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "copy" | "copy-from-request" => Ok(ExtensionPolicy::CopyFromRequest),
            "ca" | "ca-profile" => Ok(ExtensionPolicy::CaProfile),
            other => Err(PkiError::MalformedInput(format!(
                "unknown extension policy '{other}'"
            ))),
        }
    }
}

/// The fixed CA profile: basicConstraints cA with pathLen 0, keyUsage
/// {digitalSignature, keyCertSign, cRLSign}, extKeyUsage {codeSigning, clientAuth} and a
/// DNS subjectAltName carrying `common_name`.
pub fn ca_profile_extensions(common_name: &str) -> Result<Vec<ExtensionParam>> {
    Ok(vec![
        ExtensionParam::from_extension(
            BasicConstraints {
                is_ca: true,
                max_path_length: Some(0),
            },
            true,
        )?,
        ExtensionParam::from_extension(
            KeyUsage(KeyUsages::DigitalSignature | KeyUsages::KeyCertSign | KeyUsages::CRLSign),
            true,
        )?,
        ExtensionParam::from_extension(
            ExtendedKeyUsage {
                usage: vec![
                    ExtendedKeyUsageOption::CodeSigning,
                    ExtendedKeyUsageOption::ClientAuth,
                ],
            },
            false,
        )?,
        ExtensionParam::from_extension(SubjectAltName::dns([common_name]), false)?,
    ])
}

/// Issues a PEM certificate for a PEM certification request.
///
/// Subject and public key are copied from the request and the issuer name from the
/// issuer's certificate. The request's self-signature is NOT checked here; call
/// [`crate::csr::verify_csr`] first.
pub fn issue_certificate_from_csr(
    csr_pem: &str,
    issuer: &impl Issuer,
    serial_number: &[u8],
    validity: Validity,
    policy: ExtensionPolicy,
) -> Result<String> {
    let request = CertificationRequest::from_pem(csr_pem)?;
    let extensions = match policy {
        ExtensionPolicy::CopyFromRequest => request.extension_request()?,
        ExtensionPolicy::CaProfile => ca_profile_extensions(&request.common_name()?)?,
    };
    debug!(?policy, "issuing certificate from request");

    let cert_info = CertificationRequestInfo::builder()
        .subject(request.subject().clone())
        .subject_public_key_info(request.subject_public_key_info().clone())
        .extensions(extensions)
        .build();
    issuer.issue(&cert_info, serial_number, validity)?.to_pem()
}

/// Parses a hex serial number (optionally `0x`-prefixed, odd lengths allowed) into bytes.
pub fn serial_from_hex(serial: &str) -> Result<Vec<u8>> {
    let digits = serial.trim();
    let digits = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
        .unwrap_or(digits);
    let padded = if digits.len() % 2 == 1 {
        format!("0{digits}")
    } else {
        digits.to_string()
    };
    hex::decode(padded).map_err(|e| PkiError::MalformedInput(format!("serial number: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::CertificateWithPrivateKey;
    use crate::cert::extensions::AltName;
    use crate::cert::params::{DistinguishedName, SubjectAttribute};
    use crate::csr::{CsrAttribute, generate_csr};
    use crate::key::KeyAlgorithm;

    fn authority() -> CertificateWithPrivateKey {
        let key = KeyPair::generate(KeyAlgorithm::EcP256).unwrap();
        let info = CertificationRequestInfo::builder()
            .subject(
                DistinguishedName::from_pairs([("CN", "Issuing CA"), ("O", "Test")])
                    .unwrap()
                    .as_x509_name()
                    .unwrap(),
            )
            .subject_public_key_info(key.as_spki().unwrap())
            .extensions(ca_profile_extensions("Issuing CA").unwrap())
            .build();
        let validity = Validity::for_days(10).unwrap();
        let cert = Certificate::new_self_signed(&info, &key, &[1], validity).unwrap();
        CertificateWithPrivateKey { cert, key }
    }

    fn request(attributes: &[CsrAttribute]) -> (String, KeyPair) {
        let key = KeyPair::generate(KeyAlgorithm::EcP256).unwrap();
        let subject = vec![
            SubjectAttribute::new("CN", "leaf.example.com").unwrap(),
            SubjectAttribute::new("O", "Leaf").unwrap(),
        ];
        (generate_csr(&key, &subject, attributes).unwrap(), key)
    }

    #[test]
    fn test_copy_policy_keeps_requested_extensions() {
        let requested = vec![
            ExtensionParam::from_extension(
                SubjectAltName {
                    names: vec![
                        AltName::Dns("leaf.example.com".to_string()),
                        AltName::Email("ops@example.com".to_string()),
                    ],
                },
                false,
            )
            .unwrap(),
        ];
        let (csr, key) = request(&[CsrAttribute::ExtensionRequest(requested.clone())]);
        let ca = authority();
        let pem = issue_certificate_from_csr(
            &csr,
            &ca,
            &[0x10, 0x01],
            Validity::for_days(1).unwrap(),
            ExtensionPolicy::CopyFromRequest,
        )
        .unwrap();

        let cert = Certificate::from_pem(&pem).unwrap();
        assert_eq!(cert.extensions(), requested);
        assert_eq!(cert.public_key().unwrap(), key.public_key());
        assert_eq!(cert.issuer(), ca.cert.subject());
        assert_eq!(cert.serial_hex(), "1001");
        cert.verify_signed_by(&ca.key.public_key()).unwrap();
    }

    #[test]
    fn test_ca_profile_replaces_extensions() {
        let (csr, _) = request(&[CsrAttribute::ExtensionRequest(vec![
            ExtensionParam::from_extension(BasicConstraints::default(), true).unwrap(),
        ])]);
        let pem = issue_certificate_from_csr(
            &csr,
            &authority(),
            &[7],
            Validity::for_days(1).unwrap(),
            ExtensionPolicy::CaProfile,
        )
        .unwrap();

        let cert = Certificate::from_pem(&pem).unwrap();
        assert_eq!(
            cert.extension::<BasicConstraints>().unwrap(),
            Some(BasicConstraints {
                is_ca: true,
                max_path_length: Some(0)
            })
        );
        assert_eq!(
            cert.extension::<SubjectAltName>().unwrap(),
            Some(SubjectAltName::dns(["leaf.example.com"]))
        );
        let ku = cert.extension::<KeyUsage>().unwrap().unwrap();
        assert!(ku.contains(KeyUsages::CRLSign));
    }

    #[test]
    fn test_serial_from_hex() {
        assert_eq!(serial_from_hex("0x0a1b").unwrap(), vec![0x0a, 0x1b]);
        assert_eq!(serial_from_hex("abc").unwrap(), vec![0x0a, 0xbc]);
        assert!(serial_from_hex("xyz").is_err());
    }

    #[test]
    fn test_extension_policy_from_str() {
        assert_eq!("ca".parse::<ExtensionPolicy>(), Ok(ExtensionPolicy::CaProfile));
        assert_eq!(
            "copy-from-request".parse::<ExtensionPolicy>(),
            Ok(ExtensionPolicy::CopyFromRequest)
        );
        assert!("merge".parse::<ExtensionPolicy>().is_err());
    }
}
