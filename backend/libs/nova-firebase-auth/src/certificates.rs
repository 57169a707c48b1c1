//! Public key certificate cache
//!
//! Fetches the key-id → PEM certificate mapping used to verify token signatures
//! and keeps it in memory for as long as the endpoint's `Cache-Control: max-age`
//! allows. A refresh replaces the whole set; keys are never merged.

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{ACCEPT, CACHE_CONTROL, USER_AGENT};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{AuthError, AuthResult};

/// Key id → PEM encoded X.509 certificate
pub type CertificateSet = HashMap<String, String>;

pub(crate) const CLIENT_USER_AGENT: &str = concat!("nova-firebase-admin/", env!("CARGO_PKG_VERSION"));

// Upper bound on how far into the future a max-age can push expiry
const MAX_CACHE_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

static MAX_AGE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"max-age=([0-9]+)").expect("max-age pattern is valid"));

#[derive(Debug)]
struct CacheState {
    certificates: Arc<CertificateSet>,
    expires_at: Instant,
}

impl CacheState {
    fn should_refresh(&self, now: Instant) -> bool {
        self.certificates.is_empty() || now >= self.expires_at
    }
}

/// Fetches and caches signing certificates from a remote endpoint.
///
/// The staleness check, the network fetch and the state swap all happen while
/// holding one async mutex, so a single instance never has two fetches in flight
/// and callers never see a half-updated set.
#[derive(Debug)]
pub struct CertificatesFetcher {
    url: String,
    http_client: reqwest::Client,
    state: Mutex<CacheState>,
}

impl CertificatesFetcher {
    /// Create a fetcher with its own HTTP client
    pub fn new(url: impl Into<String>) -> AuthResult<Self> {
        Self::with_http_client(url, reqwest::Client::new())
    }

    /// Create a fetcher that issues requests through `http_client`
    pub fn with_http_client(url: impl Into<String>, http_client: reqwest::Client) -> AuthResult<Self> {
        let url = url.into();
        validate_url(&url)?;

        Ok(Self {
            url,
            http_client,
            state: Mutex::new(CacheState {
                certificates: Arc::new(CertificateSet::new()),
                expires_at: Instant::now(),
            }),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Return the current certificate set, refreshing it first when it is
    /// empty or past its expiry.
    ///
    /// A failed refresh propagates as [`AuthError::CertificateRequest`] and
    /// leaves the previously cached set in place; the next call retries.
    pub async fn fetch_certificates(&self) -> AuthResult<Arc<CertificateSet>> {
        let mut state = self.state.lock().await;

        if !state.should_refresh(Instant::now()) {
            debug!(url = %self.url, "Using cached certificates");
            return Ok(Arc::clone(&state.certificates));
        }

        let (certificates, ttl) = self.refresh().await.map_err(|e| {
            warn!(url = %self.url, error = %e, "Certificate refresh failed");
            e
        })?;

        let now = Instant::now();
        state.expires_at = now
            .checked_add(ttl.min(MAX_CACHE_TTL))
            .unwrap_or(now);
        state.certificates = Arc::new(certificates);

        info!(
            url = %self.url,
            keys = state.certificates.len(),
            ttl_secs = ttl.as_secs(),
            "Refreshed public key certificates"
        );

        Ok(Arc::clone(&state.certificates))
    }

    async fn refresh(&self) -> AuthResult<(CertificateSet, Duration)> {
        let response = self
            .http_client
            .get(&self.url)
            .header(ACCEPT, "application/json; charset=utf-8")
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .send()
            .await
            .map_err(|e| AuthError::CertificateRequest(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::CertificateRequest(format!(
                "the server responded with status {}",
                status
            )));
        }

        let ttl = response
            .headers()
            .get(CACHE_CONTROL)
            .and_then(|value| value.to_str().ok())
            .map(parse_max_age)
            .unwrap_or(0);

        let certificates: CertificateSet = response
            .json()
            .await
            .map_err(|e| AuthError::CertificateRequest(format!("malformed certificate response: {}", e)))?;

        Ok((certificates, Duration::from_secs(ttl)))
    }
}

/// Extract the `max-age` directive of a Cache-Control header, in seconds.
/// Missing or unparseable directives yield 0.
pub(crate) fn parse_max_age(cache_control: &str) -> u64 {
    MAX_AGE_PATTERN
        .captures(cache_control)
        .and_then(|captures| captures.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

fn validate_url(url: &str) -> AuthResult<()> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| AuthError::InvalidArgument(format!("certificates url is invalid: {}", e)))?;

    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(AuthError::InvalidArgument(format!(
            "certificates url is invalid: {}",
            url
        )));
    }

    Ok(())
}
