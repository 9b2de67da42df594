//! PEM certificate chains: splitting, indexing, prepending and path validation.
//!
//! Chains are ordered leaf first; each entry is issued by the one after it and the last
//! entry is the trust anchor.

use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::cert::Certificate;
use crate::cert::extensions::{BasicConstraints, KeyUsage, KeyUsages};
use crate::cert::params::encoded_name_eq;
use crate::convert::encode_pem;
use crate::error::{PkiError, Result};

/// Splits a concatenated PEM blob into its blocks, in order, each re-encoded with a single
/// trailing newline.
pub fn get_pem_chain_as_array(chain_pem: &str) -> Result<Vec<String>> {
    Ok(pem::parse_many(chain_pem)?
        .into_iter()
        .map(|block| {
            let label = block.tag().to_string();
            encode_pem(&label, block.into_contents())
        })
        .collect())
}

/// The PEM block at `position` (0 is the leaf).
pub fn get_cert_in_pem_chain(chain_pem: &str, position: usize) -> Result<String> {
    let mut blocks = get_pem_chain_as_array(chain_pem)?;
    let len = blocks.len();
    if position >= len {
        return Err(PkiError::IndexOutOfRange {
            index: position,
            len,
        });
    }
    Ok(blocks.swap_remove(position))
}

/// A new chain with the blocks of `cert_pem` first, followed by those of `chain_pem`.
pub fn prepend_cert_to_chain(cert_pem: &str, chain_pem: &str) -> Result<String> {
    let mut blocks = get_pem_chain_as_array(cert_pem)?;
    blocks.extend(get_pem_chain_as_array(chain_pem)?);
    Ok(blocks.concat())
}

/// Validates a leaf-first chain of PEM certificates against its last entry, now.
pub fn validate_x5c_chain<S: AsRef<str>>(chain: &[S]) -> Result<()> {
    validate_x5c_chain_at(chain, OffsetDateTime::now_utc())
}

/// Boolean form of [`validate_x5c_chain`]; the failing link is logged.
pub fn x5c_chain_is_valid<S: AsRef<str>>(chain: &[S]) -> bool {
    validate_x5c_chain(chain).is_ok()
}

/// Validates a leaf-first chain of PEM certificates at `at`.
///
/// The last entry is the trust anchor. For every link the child's issuer must equal the
/// parent's subject, the parent's key must verify the child's signature, and the parent
/// must be a CA (basicConstraints cA, pathLen respected, keyCertSign when keyUsage is
/// present). The anchor alone may lack basicConstraints, provided it has no keyUsage
/// either. Every certificate, the anchor included, must be within its validity window.
/// A self-issued anchor must also carry a valid self-signature.
pub fn validate_x5c_chain_at<S: AsRef<str>>(chain: &[S], at: OffsetDateTime) -> Result<()> {
    let result = check_chain(chain, at);
    match &result {
        Ok(()) => debug!(len = chain.len(), "certificate chain validated"),
        Err(PkiError::ChainBroken { index, reason }) => {
            warn!(index, %reason, "certificate chain validation failed")
        }
        Err(e) => warn!(error = %e, "certificate chain could not be parsed"),
    }
    result
}

fn broken(index: usize, reason: impl Into<String>) -> PkiError {
    PkiError::ChainBroken {
        index,
        reason: reason.into(),
    }
}

fn check_chain<S: AsRef<str>>(chain: &[S], at: OffsetDateTime) -> Result<()> {
    let certs = chain
        .iter()
        .map(|pem| Certificate::from_pem(pem.as_ref()))
        .collect::<Result<Vec<_>>>()?;
    let Some(anchor) = certs.last() else {
        return Err(broken(0, "empty chain"));
    };
    let anchor_index = certs.len() - 1;

    for (index, cert) in certs.iter().enumerate() {
        if !cert.validity()?.contains(at) {
            return Err(broken(index, format!("not valid at {at}")));
        }
    }

    if encoded_name_eq(anchor.subject(), anchor.issuer())? {
        anchor
            .verify_signed_by(&anchor.public_key()?)
            .map_err(|_| broken(anchor_index, "trust anchor self-signature is invalid"))?;
    }

    for (index, pair) in certs.windows(2).enumerate() {
        let (child, parent) = (&pair[0], &pair[1]);

        if !encoded_name_eq(child.issuer(), parent.subject())? {
            return Err(broken(index, "issuer does not match the next certificate's subject"));
        }
        child
            .verify_signed_by(&parent.public_key()?)
            .map_err(|_| broken(index, "signature does not verify with the issuer's key"))?;

        // An anchor may omit basicConstraints, unless it restricts its key usage.
        let usage = parent.extension::<KeyUsage>()?;
        let constraints = parent.extension::<BasicConstraints>()?;
        let is_anchor = index + 1 == anchor_index;
        match &constraints {
            Some(bc) if !bc.is_ca => return Err(broken(index + 1, "issuer is not a CA")),
            None if !is_anchor || usage.is_some() => {
                return Err(broken(index + 1, "issuer is not a CA"));
            }
            _ => {}
        }
        // Certificates strictly between the parent and the leaf.
        let intermediates_below = index;
        if let Some(max) = constraints.and_then(|bc| bc.max_path_length) {
            if intermediates_below > usize::from(max) {
                return Err(broken(
                    index + 1,
                    format!("path length {intermediates_below} exceeds pathLen {max}"),
                ));
            }
        }
        if let Some(usage) = usage {
            if !usage.contains(KeyUsages::KeyCertSign) {
                return Err(broken(index + 1, "issuer key usage lacks keyCertSign"));
            }
        }
    }
    Ok(())
}
