use der::Encode;
use x509_cert::Version;
use x509_cert::certificate::TbsCertificateInner;
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::SubjectPublicKeyInfoOwned;

use crate::cert::SignatureAlgorithm;
use crate::cert::params::{ExtensionParam, Validity};
use crate::error::{PkiError, Result};

/// Represents the "To Be Signed" (TBS) portion of an X.509 certificate.
/// This struct contains all the fields required to generate a valid X.509 certificate.
///
/// Names and the subject public key are carried in their encoded forms so that values
/// copied from a request or an issuer certificate land in the output byte for byte.
///
/// # Fields
/// * `serial_number` - The unique identifier for the certificate.
/// * `signature_algorithm` - The algorithm used to sign the certificate.
/// * `issuer` - The distinguished name of the certificate issuer.
/// * `validity` - The certificate's validity period.
/// * `subject` - The distinguished name of the certificate subject.
/// * `subject_public_key_info` - The public key of the certificate subject.
/// * `extensions` - Additional X.509 extensions for the certificate.
#[derive(Debug, Clone)]
pub struct TbsCertificate {
    /// Certificate serial number
    pub serial_number: SerialNumber,
    /// Certificate signature algorithm
    pub signature_algorithm: SignatureAlgorithm,
    /// Certificate issuer distinguished name
    pub issuer: Name,
    /// Validity window
    pub validity: Validity,
    /// Certificate subject distinguished name
    pub subject: Name,
    /// Subject's public key
    pub subject_public_key_info: SubjectPublicKeyInfoOwned,
    /// Certificate extensions
    pub extensions: Vec<ExtensionParam>,
}

impl TbsCertificate {
    /// Converts the `TbsCertificate` into a `TbsCertificateInner` for DER encoding.
    ///
    /// An empty extension list is omitted from the encoding entirely.
    pub fn to_tbs_certificate_inner(&self) -> Result<TbsCertificateInner> {
        let extensions = self
            .extensions
            .iter()
            .map(ExtensionParam::to_x509)
            .collect::<Result<Vec<_>>>()?;

        Ok(TbsCertificateInner {
            version: Version::V3,
            serial_number: self.serial_number.clone(),
            signature: self.signature_algorithm.into(),
            issuer: self.issuer.clone(),
            validity: self.validity.to_x509_validity()?,
            subject: self.subject.clone(),
            subject_public_key_info: self.subject_public_key_info.clone(),
            issuer_unique_id: None,
            subject_unique_id: None,
            extensions: if extensions.is_empty() {
                None
            } else {
                Some(extensions)
            },
        })
    }

    /// Creates a `TbsCertificate` from a `TbsCertificateInner`.
    pub fn from_tbs_certificate_inner(inner: &TbsCertificateInner) -> Result<Self> {
        let extensions = inner
            .extensions
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(ExtensionParam::from_x509)
            .collect();

        Ok(Self {
            serial_number: inner.serial_number.clone(),
            signature_algorithm: SignatureAlgorithm::from_oid(&inner.signature.oid)?,
            issuer: inner.issuer.clone(),
            validity: Validity::from_x509_validity(&inner.validity)?,
            subject: inner.subject.clone(),
            subject_public_key_info: inner.subject_public_key_info.clone(),
            extensions,
        })
    }

    /// Encodes the `TbsCertificate` into DER format.
    ///
    /// # Returns
    /// A byte vector containing the DER-encoded TBS structure, the input to the issuer's
    /// signature.
    pub fn to_der(&self) -> Result<Vec<u8>> {
        self.to_tbs_certificate_inner()?
            .to_der()
            .map_err(|e| PkiError::EncodingError(e.to_string()))
    }
}
