//! JSON Web Tokens and JSON Web Signatures over the keys in [`crate::key`].
//!
//! Only RS256 and ES256 are produced or accepted. The algorithm is always bound to the key
//! type; a header naming a different algorithm than the verification key supports fails
//! as [`crate::error::PkiError::SignatureInvalid`].

pub mod alg;
pub mod fetch;
pub mod header;
pub mod jws;
pub mod jwt;

use base64::Engine;
use base64::prelude::BASE64_URL_SAFE_NO_PAD;

pub use alg::JwsAlgorithm;
#[cfg(feature = "http")]
pub use fetch::HttpJwksFetcher;
pub use fetch::{FetcherConfig, JwksFetcher, StaticJwksFetcher};
pub use header::ProtectedHeader;
pub use jws::{
    JwsOptions, Serialization, VerifiedJws, decode_jws_payload, decode_protected_header,
    sign_jws, verify_jws, verify_jws_with_jwk,
};
pub use jwt::{
    Audience, Expiration, JwtClaims, JwtPayload, JwtValidation, VerifiedJwt, decode_jwt,
    generate_jwt, verify_jwt, verify_jwt_with,
};

pub(crate) fn b64_encode(bytes: impl AsRef<[u8]>) -> String {
    BASE64_URL_SAFE_NO_PAD.encode(bytes)
}

pub(crate) fn b64_decode(segment: &str) -> crate::error::Result<Vec<u8>> {
    Ok(BASE64_URL_SAFE_NO_PAD.decode(segment)?)
}
