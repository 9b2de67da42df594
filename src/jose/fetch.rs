use std::collections::HashMap;
use std::time::Duration;

use bon::Builder;

use crate::error::{PkiError, Result};
use crate::key::Jwks;

/// Resolves a JWK set from the URL named by a JWS `jku` header.
///
/// Implementations must not retry: a failed fetch is a failed verification. Transport
/// failures are reported as [`PkiError::KeyFetch`] so callers can tell them apart from
/// cryptographic failures.
pub trait JwksFetcher {
    fn fetch(&self, url: &str) -> Result<Jwks>;
}

/// In-memory key sets keyed by URL. Unknown URLs fail as a fetch error.
#[derive(Debug, Clone, Default)]
pub struct StaticJwksFetcher {
    sets: HashMap<String, Jwks>,
}

impl StaticJwksFetcher {
    pub fn with(mut self, url: impl Into<String>, jwks: Jwks) -> Self {
        self.insert(url, jwks);
        self
    }

    pub fn insert(&mut self, url: impl Into<String>, jwks: Jwks) {
        self.sets.insert(url.into(), jwks);
    }
}

impl JwksFetcher for StaticJwksFetcher {
    fn fetch(&self, url: &str) -> Result<Jwks> {
        self.sets
            .get(url)
            .cloned()
            .ok_or_else(|| PkiError::KeyFetch(format!("no key set at {url}")))
    }
}

/// Redirect hops followed before a fetch is abandoned.
pub const MAX_REDIRECTS: usize = 10;

/// Settings for remote key set retrieval.
#[derive(Debug, Clone, Builder)]
pub struct FetcherConfig {
    /// Upper bound for the whole request.
    #[builder(default = Duration::from_secs(10))]
    pub timeout: Duration,
    /// Reject `jku` URLs, and redirect targets, that are not `https://`.
    #[builder(default = true)]
    pub require_https: bool,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl FetcherConfig {
    /// Applies the URL policy before any request is made.
    pub fn check_url(&self, url: &str) -> Result<()> {
        if self.require_https && !url.starts_with("https://") {
            return Err(PkiError::KeyResolutionFailed(format!(
                "refusing to fetch key set over a non-https URL: {url}"
            )));
        }
        Ok(())
    }

    /// Applies the URL policy to a redirect target; `hops` counts the URLs already requested.
    pub fn check_redirect(&self, target: &str, hops: usize) -> Result<()> {
        if hops > MAX_REDIRECTS {
            return Err(PkiError::KeyFetch(format!(
                "too many redirects fetching key set, last target {target}"
            )));
        }
        self.check_url(target)
    }
}

/// Blocking HTTP key set fetcher.
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpJwksFetcher {
    client: reqwest::blocking::Client,
    config: FetcherConfig,
}

#[cfg(feature = "http")]
impl HttpJwksFetcher {
    pub fn new(config: FetcherConfig) -> Result<Self> {
        let policy = config.clone();
        let redirects = reqwest::redirect::Policy::custom(move |attempt| {
            let checked = policy.check_redirect(attempt.url().as_str(), attempt.previous().len());
            match checked {
                Ok(()) => attempt.follow(),
                Err(e) => attempt.error(e),
            }
        });
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .redirect(redirects)
            .build()
            .map_err(|e| PkiError::KeyFetch(e.to_string()))?;
        Ok(Self { client, config })
    }
}

#[cfg(feature = "http")]
impl JwksFetcher for HttpJwksFetcher {
    fn fetch(&self, url: &str) -> Result<Jwks> {
        self.config.check_url(url)?;
        tracing::debug!(%url, "fetching key set");
        let body = self
            .client
            .get(url)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .and_then(reqwest::blocking::Response::text)
            .map_err(|e| {
                tracing::warn!(%url, error = %e, "key set fetch failed");
                PkiError::KeyFetch(e.to_string())
            })?;
        serde_json::from_str(&body)
            .map_err(|e| PkiError::KeyResolutionFailed(format!("invalid key set at {url}: {e}")))
    }
}
