use bon::Builder;
use const_oid::ObjectIdentifier;
use der::asn1::{Any, SetOfVec};
use der::{Encode, Tag, Tagged};
use time::Duration;
use time::OffsetDateTime;
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::name::{RdnSequence, RelativeDistinguishedName};
use x509_cert::spki::SubjectPublicKeyInfoOwned;

use super::extensions::ToAndFromX509Extension;
use crate::error::{PkiError, Result};

/// Parameters for building an X.509 certificate.
///
/// # Fields
/// * `subject` - The subject name, kept in its encoded form so it is copied exactly.
/// * `subject_public_key_info` - The subject public key, copied verbatim from the request.
/// * `extensions` - X.509 extensions placed in the certificate as given.
#[derive(Clone, Debug, Builder)]
pub struct CertificationRequestInfo {
    pub subject: x509_cert::name::Name,
    pub subject_public_key_info: SubjectPublicKeyInfoOwned,
    #[builder(default)]
    pub extensions: Vec<ExtensionParam>,
}

/// `(long name, short name, OID)` for the attribute types accepted in subjects.
const ATTRIBUTE_NAMES: &[(&str, &str, ObjectIdentifier)] = &[
    ("commonName", "CN", ObjectIdentifier::new_unwrap("2.5.4.3")),
    ("countryName", "C", ObjectIdentifier::new_unwrap("2.5.4.6")),
    ("localityName", "L", ObjectIdentifier::new_unwrap("2.5.4.7")),
    ("stateOrProvinceName", "ST", ObjectIdentifier::new_unwrap("2.5.4.8")),
    ("streetAddress", "street", ObjectIdentifier::new_unwrap("2.5.4.9")),
    ("organizationName", "O", ObjectIdentifier::new_unwrap("2.5.4.10")),
    ("organizationalUnitName", "OU", ObjectIdentifier::new_unwrap("2.5.4.11")),
    ("title", "title", ObjectIdentifier::new_unwrap("2.5.4.12")),
    ("serialNumber", "serialNumber", ObjectIdentifier::new_unwrap("2.5.4.5")),
    ("emailAddress", "E", ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.1")),
];

/// OID of the common name attribute.
pub const COMMON_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");
const COUNTRY_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.6");
const EMAIL_ADDRESS: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.1");

/// One relative distinguished name component, e.g. `CN=example.com`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubjectAttribute {
    pub oid: ObjectIdentifier,
    pub value: String,
}

impl SubjectAttribute {
    /// Create an attribute from a long name (`commonName`), a short name (`CN`) or a dotted
    /// OID string.
    pub fn new(name: &str, value: impl Into<String>) -> Result<Self> {
        let oid = ATTRIBUTE_NAMES
            .iter()
            .find(|(long, short, _)| *long == name || *short == name)
            .map(|(_, _, oid)| *oid)
            .map_or_else(
                || {
                    ObjectIdentifier::new(name).map_err(|_| {
                        PkiError::MalformedInput(format!("unknown subject attribute '{name}'"))
                    })
                },
                Ok,
            )?;
        Ok(Self {
            oid,
            value: value.into(),
        })
    }

    pub fn common_name(value: impl Into<String>) -> Self {
        Self {
            oid: COMMON_NAME,
            value: value.into(),
        }
    }

    /// The long attribute name, when it is a well-known type.
    pub fn name(&self) -> Option<&'static str> {
        self.lookup().map(|(long, _, _)| *long)
    }

    /// The short attribute name, when it is a well-known type.
    pub fn short_name(&self) -> Option<&'static str> {
        self.lookup().map(|(_, short, _)| *short)
    }

    fn lookup(&self) -> Option<&'static (&'static str, &'static str, ObjectIdentifier)> {
        ATTRIBUTE_NAMES.iter().find(|(_, _, oid)| *oid == self.oid)
    }

    // countryName is PrintableString and emailAddress IA5String per RFC 5280;
    // everything else is UTF8String.
    fn to_x509_attribute(&self) -> Result<AttributeTypeAndValue> {
        let tag = match self.oid {
            COUNTRY_NAME => Tag::PrintableString,
            EMAIL_ADDRESS => Tag::Ia5String,
            _ => Tag::Utf8String,
        };
        let value = Any::new(tag, self.value.as_bytes())?;
        Ok(AttributeTypeAndValue {
            oid: self.oid,
            value,
        })
    }

    fn from_x509_attribute(atv: &AttributeTypeAndValue) -> Result<Self> {
        let value = match atv.value.tag() {
            Tag::Utf8String
            | Tag::PrintableString
            | Tag::Ia5String
            | Tag::TeletexString
            | Tag::VisibleString => std::str::from_utf8(atv.value.value())
                .map_err(|e| PkiError::MalformedInput(e.to_string()))?
                .to_string(),
            tag => {
                return Err(PkiError::MalformedInput(format!(
                    "unsupported string type {tag} for attribute {}",
                    atv.oid
                )));
            }
        };
        Ok(Self {
            oid: atv.oid,
            value,
        })
    }
}

/// An ordered subject or issuer name. Order is significant: it defines the RDN sequence.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DistinguishedName {
    pub attributes: Vec<SubjectAttribute>,
}

impl DistinguishedName {
    pub fn new(attributes: Vec<SubjectAttribute>) -> Self {
        Self { attributes }
    }

    /// Build from `(name, value)` pairs, names resolved as in [`SubjectAttribute::new`].
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<Self> {
        let attributes = pairs
            .into_iter()
            .map(|(name, value)| SubjectAttribute::new(name, value))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { attributes })
    }

    /// The first value of the given attribute type.
    pub fn get(&self, oid: ObjectIdentifier) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| attr.oid == oid)
            .map(|attr| attr.value.as_str())
    }

    pub fn common_name(&self) -> Option<&str> {
        self.get(COMMON_NAME)
    }

    /// Converts the distinguished name to an X.509-compatible format, one attribute per RDN.
    pub fn as_x509_name(&self) -> Result<x509_cert::name::Name> {
        let rdns = self
            .attributes
            .iter()
            .map(|attr| {
                let atv = attr.to_x509_attribute()?;
                let set = SetOfVec::try_from(vec![atv])?;
                Ok(RelativeDistinguishedName(set))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(RdnSequence(rdns))
    }

    /// Creates a `DistinguishedName` from an X.509 name, preserving attribute order.
    pub fn from_x509_name(x509dn: &x509_cert::name::Name) -> Result<Self> {
        let attributes = x509dn
            .0
            .iter()
            .flat_map(|rdn| rdn.0.iter())
            .map(SubjectAttribute::from_x509_attribute)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { attributes })
    }
}

/// Certificate validity period.
///
/// # Fields
/// * `not_before` - The start of the validity period.
/// * `not_after` - The end of the validity period.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Validity {
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
}

impl Validity {
    /// Creates a validity period starting now for the given number of days.
    pub fn for_days(days: i64) -> Result<Self> {
        let now = OffsetDateTime::now_utc();
        let not_after = days
            .checked_mul(86_400)
            .and_then(|seconds| now.checked_add(Duration::seconds(seconds)))
            .ok_or_else(|| PkiError::MalformedInput(format!("validity of {days} days is out of range")))?;
        Ok(Self {
            not_before: now,
            not_after,
        })
    }

    /// Whether `at` falls inside the window, bounds included.
    pub fn contains(&self, at: OffsetDateTime) -> bool {
        self.not_before <= at && at <= self.not_after
    }

    pub(crate) fn to_x509_validity(&self) -> Result<x509_cert::time::Validity> {
        Ok(x509_cert::time::Validity {
            not_before: to_x509_time(self.not_before)?,
            not_after: to_x509_time(self.not_after)?,
        })
    }

    pub(crate) fn from_x509_validity(validity: &x509_cert::time::Validity) -> Result<Self> {
        Ok(Self {
            not_before: from_x509_time(&validity.not_before)?,
            not_after: from_x509_time(&validity.not_after)?,
        })
    }
}

// RFC 5280: UTCTime through 2049, GeneralizedTime from 2050 on.
fn to_x509_time(at: OffsetDateTime) -> Result<x509_cert::time::Time> {
    let seconds = u64::try_from(at.unix_timestamp())
        .map_err(|_| PkiError::EncodingError("validity before 1970".to_string()))?;
    let date_time = der::DateTime::from_unix_duration(std::time::Duration::from_secs(seconds))?;
    if date_time.year() < 2050 {
        Ok(x509_cert::time::Time::UtcTime(
            der::asn1::UtcTime::from_date_time(date_time)?,
        ))
    } else {
        Ok(x509_cert::time::Time::GeneralTime(
            der::asn1::GeneralizedTime::from_date_time(date_time),
        ))
    }
}

fn from_x509_time(time: &x509_cert::time::Time) -> Result<OffsetDateTime> {
    let since_epoch = match time {
        x509_cert::time::Time::UtcTime(ut) => ut.to_unix_duration(),
        x509_cert::time::Time::GeneralTime(gt) => gt.to_unix_duration(),
    };
    let seconds = i64::try_from(since_epoch.as_secs())
        .map_err(|e| PkiError::MalformedInput(e.to_string()))?;
    OffsetDateTime::from_unix_timestamp(seconds).map_err(|e| PkiError::MalformedInput(e.to_string()))
}

/// Represents an X.509 extension.
///
/// # Fields
/// * `oid` - The object identifier of the extension.
/// * `critical` - Indicates if the extension is critical.
/// * `value` - The DER-encoded value of the extension.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtensionParam {
    pub oid: ObjectIdentifier,
    pub critical: bool,
    /// DER-encoded extension value
    pub value: Vec<u8>,
}

impl ExtensionParam {
    /// Creates an `ExtensionParam` from a specific extension.
    pub fn from_extension<E: ToAndFromX509Extension>(extension: E, critical: bool) -> Result<Self> {
        let value = extension.to_x509_extension_value()?;
        Ok(Self {
            oid: E::OID,
            critical,
            value,
        })
    }

    /// Decodes an `ExtensionParam` into a specific extension.
    pub fn to_extension<E: ToAndFromX509Extension>(&self) -> Result<E> {
        if self.oid != E::OID {
            return Err(PkiError::MalformedInput(format!(
                "extension {} is not {}",
                self.oid,
                E::OID
            )));
        }
        E::from_x509_extension_value(&self.value)
    }

    pub(crate) fn from_x509(ext: &x509_cert::ext::Extension) -> Self {
        Self {
            oid: ext.extn_id,
            critical: ext.critical,
            value: ext.extn_value.as_bytes().to_vec(),
        }
    }

    pub(crate) fn to_x509(&self) -> Result<x509_cert::ext::Extension> {
        Ok(x509_cert::ext::Extension {
            extn_id: self.oid,
            critical: self.critical,
            extn_value: der::asn1::OctetString::new(self.value.clone())?,
        })
    }
}

/// Finds and decodes the first extension of type `E`.
pub fn find_extension<E: ToAndFromX509Extension>(extensions: &[ExtensionParam]) -> Result<Option<E>> {
    extensions
        .iter()
        .find(|ext| ext.oid == E::OID)
        .map(ExtensionParam::to_extension)
        .transpose()
}

pub(crate) fn encoded_name_eq(a: &x509_cert::name::Name, b: &x509_cert::name::Name) -> Result<bool> {
    Ok(a.to_der()? == b.to_der()?)
}
