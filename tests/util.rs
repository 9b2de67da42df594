#![allow(dead_code)]

use pkijose::cert::extensions::{BasicConstraints, KeyUsage, KeyUsages};
use pkijose::cert::params::{
    CertificationRequestInfo, DistinguishedName, ExtensionParam, SubjectAttribute, Validity,
};
use pkijose::cert::{Certificate, CertificateWithPrivateKey};
use pkijose::csr::{CsrAttribute, generate_csr};
use pkijose::issuer::{ExtensionPolicy, issue_certificate_from_csr};
use pkijose::key::{KeyAlgorithm, KeyPair};

pub const FIXTURE_CA_CERT: &str = include_str!("fixtures/intermediate_ca.pem");
pub const FIXTURE_CA_KEY: &str = include_str!("fixtures/intermediate_ca.key");

/// The RSA-4096 intermediate authority shipped as a fixture.
pub fn fixture_ca() -> CertificateWithPrivateKey {
    CertificateWithPrivateKey::from_pem(FIXTURE_CA_CERT, FIXTURE_CA_KEY).unwrap()
}

/// A self-signed EC root, unconstrained in path length.
pub fn generate_ca_cert() -> CertificateWithPrivateKey {
    self_signed_root(vec![
        ExtensionParam::from_extension(
            BasicConstraints {
                is_ca: true,
                max_path_length: None,
            },
            true,
        )
        .unwrap(),
        ExtensionParam::from_extension(KeyUsage(KeyUsages::KeyCertSign | KeyUsages::CRLSign), true)
            .unwrap(),
    ])
}

/// A self-signed EC root named myca.local carrying exactly `extensions`.
pub fn self_signed_root(extensions: Vec<ExtensionParam>) -> CertificateWithPrivateKey {
    let ca_key = KeyPair::generate(KeyAlgorithm::EcP256).unwrap();

    let subject = DistinguishedName::from_pairs([("CN", "myca.local"), ("O", "My CA")])
        .unwrap()
        .as_x509_name()
        .unwrap();

    let ca_cert_info = CertificationRequestInfo::builder()
        .subject(subject)
        .subject_public_key_info(ca_key.as_spki().unwrap())
        .extensions(extensions)
        .build();

    CertificateWithPrivateKey {
        cert: Certificate::new_self_signed(
            &ca_cert_info,
            &ca_key,
            &[1],
            Validity::for_days(30).unwrap(),
        )
        .unwrap(),
        key: ca_key,
    }
}

pub fn subject(common_name: &str) -> Vec<SubjectAttribute> {
    vec![
        SubjectAttribute::new("commonName", common_name).unwrap(),
        SubjectAttribute::new("countryName", "US").unwrap(),
        SubjectAttribute::new("ST", "Virginia").unwrap(),
        SubjectAttribute::new("localityName", "Blacksburg").unwrap(),
        SubjectAttribute::new("organizationName", "Test").unwrap(),
        SubjectAttribute::new("OU", "Test").unwrap(),
    ]
}

/// Runs a fresh key through the request/issue flow under `issuer`.
pub fn issue_from(
    issuer: &CertificateWithPrivateKey,
    algorithm: KeyAlgorithm,
    common_name: &str,
    extensions: Vec<ExtensionParam>,
    policy: ExtensionPolicy,
    serial: &[u8],
) -> CertificateWithPrivateKey {
    let key = KeyPair::generate(algorithm).unwrap();
    let attributes = if extensions.is_empty() {
        vec![]
    } else {
        vec![CsrAttribute::ExtensionRequest(extensions)]
    };
    let csr = generate_csr(&key, &subject(common_name), &attributes).unwrap();
    let validity = Validity::for_days(7).unwrap();
    let pem = issue_certificate_from_csr(&csr, issuer, serial, validity, policy).unwrap();
    CertificateWithPrivateKey {
        cert: Certificate::from_pem(&pem).unwrap(),
        key,
    }
}

/// root -> intermediate (CA profile, pathLen 0) -> leaf.
pub struct Hierarchy {
    pub root: CertificateWithPrivateKey,
    pub intermediate: CertificateWithPrivateKey,
    pub leaf: CertificateWithPrivateKey,
}

impl Hierarchy {
    /// Leaf-first PEM chain.
    pub fn chain(&self) -> Vec<String> {
        [&self.leaf, &self.intermediate, &self.root]
            .iter()
            .map(|c| c.cert.to_pem().unwrap())
            .collect()
    }
}

pub fn generate_hierarchy() -> Hierarchy {
    let root = generate_ca_cert();
    let intermediate = issue_from(
        &root,
        KeyAlgorithm::Rsa2048,
        "intermediate.myca.local",
        vec![],
        ExtensionPolicy::CaProfile,
        &[2],
    );
    let leaf = issue_from(
        &intermediate,
        KeyAlgorithm::EcP256,
        "leaf.myca.local",
        vec![],
        ExtensionPolicy::CopyFromRequest,
        &[3],
    );
    Hierarchy {
        root,
        intermediate,
        leaf,
    }
}
