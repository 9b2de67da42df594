use bon::Builder;
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::{Duration, OffsetDateTime};
use tracing::warn;

use super::jws::{Serialization, sign_bytes, verify_with_key};
use super::{ProtectedHeader, b64_decode};
use crate::error::{PkiError, Result};
use crate::key::{Jwk, KeyPair, PublicKey};

const SECONDS_PER_YEAR: f64 = 31_557_600.0;

/// When a token expires: a relative duration such as `"1h"`, `"30 minutes"` or
/// `"2 days ago"`, or an absolute instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expiration {
    Relative(String),
    At(OffsetDateTime),
}

impl Expiration {
    /// The absolute expiry for a token issued at `now`.
    pub fn resolve(&self, now: OffsetDateTime) -> Result<OffsetDateTime> {
        match self {
            Expiration::At(at) => Ok(*at),
            Expiration::Relative(text) => now.checked_add(parse_relative(text)?).ok_or_else(|| {
                PkiError::MalformedInput(format!("time period '{text}' is out of range"))
            }),
        }
    }
}

impl From<&str> for Expiration {
    fn from(value: &str) -> Self {
        Expiration::Relative(value.to_string())
    }
}

impl From<String> for Expiration {
    fn from(value: String) -> Self {
        Expiration::Relative(value)
    }
}

impl From<OffsetDateTime> for Expiration {
    fn from(value: OffsetDateTime) -> Self {
        Expiration::At(value)
    }
}

fn parse_relative(text: &str) -> Result<Duration> {
    let invalid = || PkiError::MalformedInput(format!("invalid time period '{text}'"));
    let pattern = RegexBuilder::new(
        r"^(\+|\-)? ?(\d+|\d+\.\d+) ?(seconds?|secs?|s|minutes?|mins?|m|hours?|hrs?|h|days?|d|weeks?|w|years?|yrs?|y)(?: (ago|from now))?$",
    )
    .case_insensitive(true)
    .build()
    .map_err(|e| PkiError::MalformedInput(e.to_string()))?;
    let captures = pattern.captures(text).ok_or_else(invalid)?;

    let value: f64 = captures[2].parse().map_err(|_| invalid())?;
    let unit = captures[3].to_ascii_lowercase();
    let unit_seconds = match unit.as_str() {
        "s" | "sec" | "secs" | "second" | "seconds" => 1.0,
        "m" | "min" | "mins" | "minute" | "minutes" => 60.0,
        "h" | "hr" | "hrs" | "hour" | "hours" => 3_600.0,
        "d" | "day" | "days" => 86_400.0,
        "w" | "week" | "weeks" => 604_800.0,
        _ => SECONDS_PER_YEAR,
    };
    let seconds = (value * unit_seconds).round();
    // Also bounds the negation below.
    if !seconds.is_finite() || seconds.abs() >= i64::MAX as f64 {
        return Err(invalid());
    }
    let seconds = seconds as i64;

    let negative_sign = captures.get(1).is_some_and(|m| m.as_str() == "-");
    let suffix = captures.get(4).map(|m| m.as_str().to_ascii_lowercase());
    match (negative_sign, suffix.as_deref()) {
        (true, Some("from now")) => Err(invalid()),
        (true, _) | (false, Some("ago")) => Ok(Duration::seconds(-seconds)),
        _ => Ok(Duration::seconds(seconds)),
    }
}

/// Audience claim: a single string or an array of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Audience::One(one) => one == audience,
            Audience::Many(many) => many.iter().any(|a| a == audience),
        }
    }
}

impl From<&str> for Audience {
    fn from(value: &str) -> Self {
        Audience::One(value.to_string())
    }
}

impl From<String> for Audience {
    fn from(value: String) -> Self {
        Audience::One(value)
    }
}

impl From<Vec<String>> for Audience {
    fn from(value: Vec<String>) -> Self {
        Audience::Many(value)
    }
}

/// Claims for [`generate_jwt`]. Everything beyond the registered claims goes in `custom`.
#[derive(Debug, Clone, Builder)]
pub struct JwtClaims {
    #[builder(into)]
    pub sub: String,
    #[builder(into)]
    pub iss: String,
    #[builder(into)]
    pub aud: Audience,
    #[builder(into)]
    pub exp: Expiration,
    #[builder(default)]
    pub custom: Map<String, Value>,
}

/// Decoded JWT claims.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JwtPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(flatten)]
    pub custom: Map<String, Value>,
}

/// What [`verify_jwt_with`] checks beyond the signature and time claims.
#[derive(Debug, Clone, Default, Builder)]
pub struct JwtValidation {
    /// Required `iss`, when set.
    #[builder(into)]
    pub issuer: Option<String>,
    /// Audience that `aud` must contain, when set.
    #[builder(into)]
    pub audience: Option<String>,
    #[builder(default)]
    pub clock_tolerance: Duration,
    /// Evaluation instant; defaults to the current time.
    pub now: Option<OffsetDateTime>,
}

/// A JWT whose signature and claims have been verified.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedJwt {
    pub payload: JwtPayload,
    pub protected_header: ProtectedHeader,
}

/// Signs `claims` into a compact JWT with the private `jwk`.
///
/// `iat` is set to the current time. The algorithm follows the key type (RS256 or ES256).
/// Registered claims take precedence over custom entries with the same name.
pub fn generate_jwt(jwk: &Jwk, claims: &JwtClaims) -> Result<String> {
    let key = KeyPair::from_jwk(jwk)?;
    let now = OffsetDateTime::now_utc();

    let mut custom = claims.custom.clone();
    for registered in ["iss", "sub", "aud", "exp", "iat"] {
        custom.remove(registered);
    }
    let payload = JwtPayload {
        iss: Some(claims.iss.clone()),
        sub: Some(claims.sub.clone()),
        aud: Some(claims.aud.clone()),
        exp: Some(claims.exp.resolve(now)?.unix_timestamp()),
        nbf: None,
        iat: Some(now.unix_timestamp()),
        custom,
    };

    sign_bytes(
        &key,
        &serde_json::to_vec(&payload)?,
        ProtectedHeader::default(),
        None,
        Serialization::Compact,
    )
}

/// Verifies signature and expiry of `jwt` against `jwk`.
pub fn verify_jwt(jwk: &Jwk, jwt: &str) -> Result<VerifiedJwt> {
    verify_jwt_with(jwk, jwt, &JwtValidation::default())
}

/// Verifies `jwt` against `jwk`, then the time claims and the expectations in `validation`.
///
/// Fails with `SignatureInvalid` before any claim is looked at, `TokenExpired` when `exp`
/// has passed, and `ClaimMismatch` naming the offending claim otherwise. A token without
/// `exp` is rejected.
pub fn verify_jwt_with(jwk: &Jwk, jwt: &str, validation: &JwtValidation) -> Result<VerifiedJwt> {
    let key = PublicKey::from_jwk(jwk)?;
    let verified = verify_with_key(jwt, &key, Serialization::Compact)?;
    let payload: JwtPayload = serde_json::from_slice(&verified.payload)?;

    check_claims(&payload, validation).inspect_err(|e| warn!(error = %e, "JWT rejected"))?;
    Ok(VerifiedJwt {
        payload,
        protected_header: verified.protected_header,
    })
}

fn check_claims(payload: &JwtPayload, validation: &JwtValidation) -> Result<()> {
    let now = validation
        .now
        .unwrap_or_else(OffsetDateTime::now_utc)
        .unix_timestamp();
    let tolerance = validation.clock_tolerance.whole_seconds();

    let exp = payload.exp.ok_or(PkiError::ClaimMismatch("exp"))?;
    if exp <= now.saturating_sub(tolerance) {
        return Err(PkiError::TokenExpired);
    }
    if payload.nbf.is_some_and(|nbf| nbf > now.saturating_add(tolerance)) {
        return Err(PkiError::ClaimMismatch("nbf"));
    }
    if let Some(issuer) = &validation.issuer {
        if payload.iss.as_ref() != Some(issuer) {
            return Err(PkiError::ClaimMismatch("iss"));
        }
    }
    if let Some(audience) = &validation.audience {
        if !payload.aud.as_ref().is_some_and(|aud| aud.contains(audience)) {
            return Err(PkiError::ClaimMismatch("aud"));
        }
    }
    Ok(())
}

/// Decodes the claims of `jwt` WITHOUT verifying its signature. For inspection only;
/// never base a trust decision on the result.
pub fn decode_jwt(jwt: &str) -> Result<JwtPayload> {
    let mut parts = jwt.trim().split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(payload), Some(_), None) => Ok(serde_json::from_slice(&b64_decode(payload)?)?),
        _ => Err(PkiError::MalformedInput(
            "JWT must have three segments".to_string(),
        )),
    }
}
